//! Document mode types

use serde::{Deserialize, Serialize};

/// Persisted key holding the active URL.
pub const URL_KEY: &str = "cvUrl";

/// Persisted key holding the mode tag.
pub const MODE_KEY: &str = "cvMode";

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Which backing source is authoritative for the current document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DocumentMode {
    #[default]
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "file")]
    File,
}

impl DocumentMode {
    /// Parse a persisted mode tag. Unknown tags yield `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "url" => Some(DocumentMode::Url),
            "file" => Some(DocumentMode::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentMode::Url => "url",
            DocumentMode::File => "file",
        }
    }
}

impl std::fmt::Display for DocumentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the persisted document configuration.
///
/// In `File` mode `url` is only the fallback; in `Url` mode any stored blob is
/// stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentState {
    pub mode: DocumentMode,
    pub url: String,
}

impl DocumentState {
    pub fn url_mode(url: impl Into<String>) -> Self {
        Self {
            mode: DocumentMode::Url,
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentMode;

    #[test]
    fn mode_tags_round_trip_through_display() {
        assert_eq!(DocumentMode::Url.to_string(), "url");
        assert_eq!(DocumentMode::File.to_string(), "file");
        assert_eq!(DocumentMode::parse("file"), Some(DocumentMode::File));
    }

    #[test]
    fn unknown_mode_tag_is_rejected() {
        assert_eq!(DocumentMode::parse("FILE"), None);
        assert_eq!(DocumentMode::parse(""), None);
    }
}
