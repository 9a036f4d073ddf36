//! Upload session state machine and event types

use crate::config::RetryPolicy;
use crate::error::{ErrorClass, TransportError, UploadError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UploadState {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadState::Idle => write!(f, "idle"),
            UploadState::Uploading => write!(f, "uploading"),
            UploadState::Completed => write!(f, "completed"),
            UploadState::Failed => write!(f, "failed"),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Fail(UploadError),
}

/// One upload call. Retried attempts reuse the same session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub file_path: String,
    /// 0-based index of the current attempt.
    pub attempt: u32,
    pub progress: u8,
    pub state: UploadState,
}

impl UploadSession {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            attempt: 0,
            progress: 0,
            state: UploadState::Idle,
        }
    }

    pub fn begin_attempt(&mut self) {
        self.state = UploadState::Uploading;
    }

    /// Attempts made so far, including the current one.
    pub fn attempts(&self) -> u32 {
        match self.state {
            UploadState::Idle => self.attempt,
            _ => self.attempt + 1,
        }
    }

    pub fn complete(&mut self) {
        self.progress = 100;
        self.state = UploadState::Completed;
    }

    /// Classify a failed attempt and advance the session.
    pub fn on_failure(&mut self, error: TransportError, policy: &RetryPolicy) -> RetryDecision {
        let decision = match error.class() {
            ErrorClass::Retryable if policy.allows_retry(self.attempt) => {
                let delay = policy.delay_for(self.attempt);
                self.attempt += 1;
                self.state = UploadState::Idle;
                return RetryDecision::RetryAfter(delay);
            }
            ErrorClass::Retryable => RetryDecision::Fail(UploadError::RetriesExhausted {
                attempts: self.attempt + 1,
                source: error,
            }),
            ErrorClass::Configuration => RetryDecision::Fail(UploadError::Configuration {
                path: self.file_path.clone(),
                source: error,
            }),
            ErrorClass::Fatal => RetryDecision::Fail(UploadError::Failed(error)),
        };
        self.state = UploadState::Failed;
        decision
    }
}

/// Broadcast after any upload finishes successfully.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadCompleted {
    pub path: String,
    pub attempts: u32,
}

/// Percentage of `sent` over `total`, rounded. Empty bodies count as done.
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = ((sent as f64 / total as f64) * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}
