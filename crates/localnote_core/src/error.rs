use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotifyError>;

#[derive(Error, Debug)]
pub enum NotifyError {
    /// Malformed or missing configuration field.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Unexpected failure inside a worker task or platform collaborator.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotifyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
