//! Remote upload module
//!
//! - `types`: session state machine, completion events
//! - `pipeline`: retrying upload with a lazy progress stream

mod pipeline;
mod types;

pub use pipeline::{object_path, ProgressItem, ProgressStream, UploadPipeline};
pub use types::{percent, RetryDecision, UploadCompleted, UploadSession, UploadState};
