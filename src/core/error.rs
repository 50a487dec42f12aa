use thiserror::Error;

/// Core error types for fwctl
///
/// The taxonomy mirrors how failures propagate: engine invocation failures
/// are hard and abort the enclosing apply/rollback; validation rejections
/// surface at the DTO boundary; secondary-apply failures never appear here
/// because the orchestrator absorbs them into warnings.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External engine process exited non-zero
    #[error("{command} failed: {stderr}")]
    Engine {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// External engine process exceeded its deadline
    #[error("{command} timed out after {timeout_secs}s")]
    EngineTimeout { command: String, timeout_secs: u64 },

    /// Input validation failed at the DTO boundary
    #[error("validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Rollback requested but history is empty
    #[error("no snapshot available to roll back to")]
    NoSnapshot,

    /// Stored snapshot does not match its recorded checksum
    #[error("snapshot checksum mismatch: expected {expected}, got {actual}")]
    SnapshotIntegrity { expected: String, actual: String },

    /// Record lookup failed
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Internal logic error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for DTO validation failures
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
