//! Error types for chat session operations

use thiserror::Error;

/// Errors surfaced by the session engine and its collaborators
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Connection is not open")]
    NotConnected,

    #[error("No active peer selected")]
    NoActivePeer,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Invalid contact: {0:?}")]
    InvalidContact(String),

    #[error("You cannot add yourself as a contact")]
    SelfContact,

    #[error("Session is closed")]
    SessionClosed,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a [`Storage`](crate::storage::Storage) backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<url::ParseError> for ChatError {
    fn from(err: url::ParseError) -> Self {
        ChatError::InvalidEndpoint(err.to_string())
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
