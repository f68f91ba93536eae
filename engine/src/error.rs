//! Error types for the jigsync engine.

use crate::{EntityType, QueueStatus};
use thiserror::Error;

/// All possible errors from the jigsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Envelope errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("entity type must not be empty")]
    EmptyEntityType,

    #[error("{operation} on '{entity_type}' requires an entity id")]
    MissingEntityId {
        operation: String,
        entity_type: EntityType,
    },

    #[error("payload schema version must be at least 1")]
    InvalidSchemaVersion,

    // Decoding of persisted values
    #[error("unknown operation type: {0}")]
    UnknownOperationType(String),

    #[error("unknown queue status: {0}")]
    UnknownStatus(String),

    #[error("unknown failure class: {0}")]
    UnknownFailureClass(String),

    // State errors
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: QueueStatus, to: QueueStatus },

    #[error("mutation {0} is already synced")]
    AlreadySynced(i64),

    // Migration plan errors
    #[error("column '{table}.{column}' is NOT NULL without a default")]
    NonAdditiveColumn { table: String, column: String },

    #[error("index '{index}' references unknown column '{column}'")]
    UnknownIndexColumn { index: String, column: String },

    #[error("table '{0}' is not declared in the migration plan")]
    UnknownTable(String),

    #[error("invalid export: {0}")]
    InvalidExport(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
