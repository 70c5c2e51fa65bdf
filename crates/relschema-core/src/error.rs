//! Error types for schema normalization, diffing and migration generation.

/// Errors raised while turning JSON-Schema documents into relational models.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A root-level entity schema has no `id`.
    #[error("Entity schema has no 'id': {fragment}")]
    MissingId {
        /// The offending schema fragment.
        fragment: String,
    },

    /// An entity needs `properties` to render its columns.
    #[error("Entity '{entity}' has no 'properties' to render columns from: {fragment}")]
    MissingProperties {
        /// Entity name.
        entity: String,
        /// The offending schema fragment.
        fragment: String,
    },

    /// Two entities were registered under the same name.
    #[error("Entity '{0}' is already registered")]
    DuplicateEntity(String),

    /// An entity name was not found in the registry.
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    /// An association points to an entity that was never registered.
    #[error("Association '{source_entity}.{alias}' references unknown entity '{target}'")]
    UnresolvedAssociation {
        /// Entity declaring the association.
        source_entity: String,
        /// Property name of the association.
        alias: String,
        /// The referenced entity name.
        target: String,
    },

    /// Associations were queried before the resolution pass ran.
    #[error("Associations have not been resolved yet")]
    NotResolved,

    /// A `#/definitions/...` reference has no matching definition.
    #[error("Unresolved definition reference '{0}'")]
    UnresolvedDefinition(String),

    /// Local definitions reference each other in a cycle.
    #[error("Circular definition reference '{0}'")]
    CircularDefinition(String),

    /// A property's type/format combination has no column type.
    #[error("Unsupported type for property '{property}': {fragment}")]
    UnsupportedType {
        /// Property name.
        property: String,
        /// The offending schema fragment.
        fragment: String,
    },

    /// A `pattern` keyword is not a valid regular expression.
    #[error("Invalid pattern for property '{property}': {source}")]
    InvalidPattern {
        /// Property name.
        property: String,
        /// Regex compilation error.
        source: regex::Error,
    },

    /// A column definition could not be read back from its literal form.
    #[error("Invalid column definition: {0}")]
    InvalidColumn(String),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
