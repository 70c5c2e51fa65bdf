//! Error types for resource actions.

use relschema_core::SchemaError;
use serde_json::Value;
use thiserror::Error;

/// Resource-specific errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Schema or registry error.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A payload names an association the model does not declare.
    #[error("unknown association '{alias}' on {model}")]
    UnknownAssociation {
        /// The model being read or written.
        model: String,
        /// The alias that did not resolve.
        alias: String,
    },

    /// A payload has the wrong shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// No record found for the given key.
    #[error("{model} not found")]
    NotFound {
        /// The model searched.
        model: String,
    },

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),

    /// The parent record was written but a nested write failed. The parent
    /// stays committed.
    #[error("nested write failed after parent was saved: {source}")]
    PartialWrite {
        /// The committed parent record.
        parent: Value,
        /// The first nested failure.
        source: Box<ResourceError>,
    },
}

/// Result type alias for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;
