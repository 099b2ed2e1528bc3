//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to spawn the MCP server process.
    #[error("failed to spawn '{command}': {source}")]
    SpawnFailed {
        /// The program that was launched.
        command: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to communicate with the MCP server.
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server returned an error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// Server not initialized.
    #[error("server not initialized - call initialize() first")]
    NotInitialized,

    /// The server process closed its output stream.
    #[error("Transport closed: connection closed by server")]
    ConnectionClosed,

    /// Timeout waiting for a response.
    #[error("timeout waiting for '{method}' response after {}ms", after.as_millis())]
    Timeout {
        /// The RPC method that timed out.
        method: String,
        /// How long we waited.
        after: Duration,
    },
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Create a timeout error for the given method.
    pub fn timeout(method: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            method: method.into(),
            after,
        }
    }

    /// Classify this error for operator-facing diagnostics.
    pub fn hint(&self) -> FailureHint {
        match self {
            Self::SpawnFailed { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                FailureHint::MissingExecutable
            }
            Self::ConnectionClosed => FailureHint::ExitedImmediately,
            other => FailureHint::classify(&other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure hints
// ─────────────────────────────────────────────────────────────────────────────

/// Categorized reason a server failed to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureHint {
    /// The command could not be found on disk or in the search path.
    MissingExecutable,
    /// The process started but exited (or closed its pipes) right away.
    ExitedImmediately,
    /// Anything else.
    Other,
}

impl FailureHint {
    /// Classify a raw error message.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("enoent") || lower.contains("not found") {
            Self::MissingExecutable
        } else if lower.contains("closed") || lower.contains("econnrefused") {
            Self::ExitedImmediately
        } else {
            Self::Other
        }
    }

    /// Human-readable hint for log output.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::MissingExecutable => {
                "command not found; check that the runner or executable is installed and on PATH"
            }
            Self::ExitedImmediately => {
                "server process exited immediately; check its arguments and environment"
            }
            Self::Other => "unexpected failure while starting the server",
        }
    }
}

impl std::fmt::Display for FailureHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::MissingExecutable => "missing-executable",
            Self::ExitedImmediately => "exited-immediately",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::spawn_failed(
            "npx",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        );
        assert!(err.to_string().contains("spawn"));
        assert!(err.to_string().contains("npx"));

        let err = McpError::server_error(-32600, "Invalid Request", None);
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));

        let err = McpError::timeout("tools/list", Duration::from_millis(250));
        assert!(err.to_string().contains("tools/list"));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let mcp_err: McpError = json_err.into();
        assert!(matches!(mcp_err, McpError::Json(_)));
    }

    #[test]
    fn test_hint_for_missing_executable() {
        let err = McpError::spawn_failed(
            "nonexistent-command-12345",
            std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        );
        assert_eq!(err.hint(), FailureHint::MissingExecutable);
    }

    #[test]
    fn test_hint_for_closed_transport() {
        assert_eq!(McpError::ConnectionClosed.hint(), FailureHint::ExitedImmediately);
        assert_eq!(
            McpError::transport("write failed: Broken pipe, stream closed").hint(),
            FailureHint::ExitedImmediately
        );
    }

    #[test]
    fn test_classify_messages() {
        assert_eq!(
            FailureHint::classify("spawn npx ENOENT"),
            FailureHint::MissingExecutable
        );
        assert_eq!(
            FailureHint::classify("connect ECONNREFUSED 127.0.0.1"),
            FailureHint::ExitedImmediately
        );
        assert_eq!(
            FailureHint::classify("server error -32603: boom"),
            FailureHint::Other
        );
        assert_eq!(FailureHint::Other.to_string(), "other");
    }
}
