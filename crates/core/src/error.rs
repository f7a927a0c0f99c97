use thiserror::Error;

pub type SendcraftResult<T> = Result<T, SendcraftError>;

#[derive(Error, Debug)]
pub enum SendcraftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Mail delivery error: {0}")]
    Mail(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
