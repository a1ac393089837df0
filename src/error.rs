//! Error types for the context stack.

use crate::types::{ContextId, ObjectId};
use std::thread::ThreadId;
use thiserror::Error;

/// Storage-related errors raised by store coordinators
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Version conflict on {id}: expected version {expected}, store has {found}")]
    Conflict {
        id: ObjectId,
        expected: u64,
        found: u64,
    },

    #[error("Unknown object identity: {0}")]
    UnknownIdentity(ObjectId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("sled: {}", err),
        ))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Context and registry errors
#[derive(Debug, Error)]
pub enum ContextError {
    /// A context was requested with neither (or both) of parent and store
    /// coordinator. Caller bug; no context is produced.
    #[error("Context configuration error: {0}")]
    Configuration(String),

    /// An operation was invoked in a way its contract forbids. Caller bug.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Confinement violation: {context} is confined to {expected:?}, accessed from {actual:?}")]
    ConfinementViolation {
        context: ContextId,
        expected: ThreadId,
        actual: ThreadId,
    },

    #[error("Confinement closed: {0}")]
    ConfinementClosed(String),

    /// A save returned without its changes reaching their destination
    #[error("Save incomplete: {0}")]
    SaveIncomplete(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        ContextError::Config(err.to_string())
    }
}

impl ContextError {
    /// Contract violations and bad construction are caller bugs, never retried.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ContextError::Configuration(_) | ContextError::ContractViolation(_)
        )
    }
}
