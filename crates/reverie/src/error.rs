//! Error types for Reverie

use thiserror::Error;

use crate::agent::AgentError;
use crate::session::SessionError;

/// Main error type for Reverie operations
#[derive(Error, Debug)]
pub enum ReverieError {
    /// The persisted memory bank is present but unreadable. A missing file is
    /// not corrupt; it loads as an empty bank.
    #[error("Corrupt memory store: {0}")]
    CorruptStore(String),

    /// An operation referenced an entity id that is not in the bank
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// An entity was rejected at the store boundary (empty id, kind conflict)
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    /// A connection for this (source, target) pair already exists. The merge
    /// path dedups by pair key before inserting, so this surfacing indicates
    /// a merger bug.
    #[error("Duplicate connection: {src} -> {target}")]
    DuplicateConnection { src: String, target: String },

    /// No active session with this id
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Agent invocation errors
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Session lifecycle errors
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result type alias for Reverie operations
pub type Result<T> = std::result::Result<T, ReverieError>;
