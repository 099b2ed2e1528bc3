//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
///
/// The conversation loop itself never fails; these cover setup around it.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Reading an attached file failed.
    #[error("Failed to read file context from {path}: {source}")]
    FileContext {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a file-context error.
    pub fn file_context(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileContext {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::file_context(
            "/tmp/missing.txt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to read file context from /tmp/missing.txt: not found"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: AgentError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, AgentError::Io(_)));
    }
}
