//! Error types for vidmill-av.

use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning or running media operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation parameters are missing, out of range, or contradictory.
    /// Raised before any process is spawned.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A required external executable could not be resolved.
    #[error("executable not found: {tool}")]
    ExecutableNotFound { tool: String },

    /// The external tool ran and reported failure.
    #[error("process failed (exit code {exit_code:?}): {stderr_tail}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    /// The external tool did not finish within its allotted time.
    #[error("process timed out after {after:?}")]
    ProcessTimedOut { after: Duration },

    /// Execution was cancelled by the caller or by shutdown.
    #[error("process cancelled")]
    ProcessCancelled,

    /// The probe tool's output could not be parsed into the metadata model.
    #[error("failed to parse probe output: {0}")]
    ProbeParse(String),

    /// A chapter index fell outside the current chapter sequence.
    #[error("chapter index {index} out of range (sequence has {len} chapters)")]
    ChapterIndexOutOfRange { index: usize, len: usize },

    /// The engine is shutting down and no longer accepts submissions.
    #[error("shutting down")]
    ShuttingDown,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid-parameters error.
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    /// Create an executable-not-found error.
    pub fn executable_not_found(tool: impl Into<String>) -> Self {
        Self::ExecutableNotFound { tool: tool.into() }
    }

    /// Create a probe parse error.
    pub fn probe_parse(message: impl Into<String>) -> Self {
        Self::ProbeParse(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = Error::invalid_parameters("end must be after start");
        assert_eq!(err.to_string(), "invalid parameters: end must be after start");

        let err = Error::executable_not_found("ffmpeg");
        assert_eq!(err.to_string(), "executable not found: ffmpeg");

        let err = Error::ChapterIndexOutOfRange { index: 7, len: 3 };
        assert!(err.to_string().contains("chapter index 7"));
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
