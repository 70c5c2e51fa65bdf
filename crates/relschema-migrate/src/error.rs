//! Error types for the migration system.

use std::path::PathBuf;

use relschema_core::SchemaError;

/// Errors raised while parsing migration source text.
///
/// Every variant carries the byte offset where parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// A character that starts no token.
    #[error("Unexpected character '{found}' at offset {offset}")]
    UnexpectedChar {
        /// The offending character.
        found: char,
        /// Byte offset.
        offset: usize,
    },

    /// A quoted string without its closing quote.
    #[error("Unterminated string starting at offset {offset}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        offset: usize,
    },

    /// A token that does not fit the grammar.
    #[error("Expected {expected}, found {found} at offset {offset}")]
    UnexpectedToken {
        /// What the parser was looking for.
        expected: String,
        /// What it found instead.
        found: String,
        /// Byte offset.
        offset: usize,
    },

    /// A call to an operation that does not exist.
    #[error("Unknown operation '{name}' at offset {offset}")]
    UnknownOperation {
        /// The operation name.
        name: String,
        /// Byte offset.
        offset: usize,
    },

    /// A known operation called with the wrong arguments.
    #[error("Invalid arguments for {operation} at offset {offset}: {message}")]
    InvalidArguments {
        /// The operation name.
        operation: String,
        /// Byte offset of the call.
        offset: usize,
        /// What was wrong.
        message: String,
    },
}

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A step of a migration run failed. Earlier steps stay applied.
    #[error("Migration '{migration}' failed at {operation}: {source}")]
    StepFailed {
        /// The migration whose step failed.
        migration: String,
        /// Description of the failing operation.
        operation: String,
        /// Migrations completed before the failure, in run order.
        completed: Vec<String>,
        /// The underlying error.
        source: Box<MigrateError>,
    },

    /// Failed to parse a migration file.
    #[error("Failed to parse migration file '{path}': {source}")]
    Load {
        /// Path to the migration file.
        path: PathBuf,
        /// Parse error.
        source: LoadError,
    },

    /// Database error during migration execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema or generator error.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Invalid migration state.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// Migration not found.
    #[error("Migration not found: {0}")]
    MigrationNotFound(String),

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),
}

impl MigrateError {
    /// Migrations that completed before a failed run, if this is a step
    /// failure.
    #[must_use]
    pub fn completed(&self) -> &[String] {
        match self {
            Self::StepFailed { completed, .. } => completed,
            _ => &[],
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
