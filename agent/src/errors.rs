//! Error types for the server agent

use std::time::Duration;

use thiserror::Error;

/// Main error type for the server agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Network or lock contention failure that callers may retry.
    #[error("Transient failure: {0}")]
    TransientError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An external command exited non-zero, produced unexpected output,
    /// or could not be spawned at all.
    #[error("Command `{command}` failed: {detail}")]
    ToolError { command: String, detail: String },

    #[error("Command `{command}` timed out after {timeout:?}")]
    TimeoutError { command: String, timeout: Duration },

    /// Post-action state did not converge.
    #[error("Deployment verification failed: {0}")]
    VerificationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Notification error: {0}")]
    NotifyError(String),
}

impl AgentError {
    /// Whether the failure came from an expired command budget
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::TimeoutError { .. })
    }
}
