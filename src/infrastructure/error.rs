use crate::domain::update::UpdateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl From<UpdateError> for CoreError {
    fn from(error: UpdateError) -> Self {
        match error {
            UpdateError::Validation(message) => Self::Validation(message),
            UpdateError::Conflict(message) => Self::Conflict(message),
        }
    }
}
