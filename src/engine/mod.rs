pub mod python;
pub mod types;

use std::path::Path;
use thiserror::Error;

pub use types::{EngineDiag, RawRecognition};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch recognition engine: {0}")]
    LaunchFailed(String),

    #[error("recognition engine exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },

    #[error("recognition timed out after {0}s")]
    Timeout(u64),

    #[error("recognition output exceeded {0} bytes")]
    OutputTooLarge(u64),

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A document recognition engine. The concrete subprocess driver can be
/// swapped for an in-process or remote implementation without touching the
/// pipeline.
pub trait Recognizer: Send + Sync {
    fn doctor(&self) -> Result<EngineDiag, EngineError>;

    /// Run recognition against one stored file. The target path is always
    /// explicit; there is no engine-side default target.
    fn recognize(&self, input: &Path) -> Result<RawRecognition, EngineError>;
}
