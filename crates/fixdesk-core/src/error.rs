//! Error types for fixdesk

use crate::IssueId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Issue not found: {0}")]
    NotFound(IssueId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Invalid issue ID: {0}")]
    InvalidId(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid visibility: {0}")]
    InvalidVisibility(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Store not initialized. Run 'fixdesk init' first.")]
    NotInitialized,

    #[error("Store already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Timed out waiting for lock on {0}")]
    Locked(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Caller mistakes, as opposed to store failures
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidOperation(_)
                | Error::UnknownUser(_)
                | Error::InvalidId(_)
                | Error::InvalidStatus(_)
                | Error::InvalidVisibility(_)
                | Error::InvalidRole(_)
        )
    }
}
