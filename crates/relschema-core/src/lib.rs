//! JSON-Schema driven relational models and migrations.
//!
//! `relschema-core` turns JSON-Schema entity documents into relational table
//! definitions and derives reversible migrations from the structural
//! difference between two schema versions.
//!
//! # Architecture
//!
//! - **Normalize** - Strips non-structural keywords, resolves `allOf` and
//!   local definitions, tags nodes with a [`NodeKind`]
//! - **Diff** - Compares two schema trees into a [`DiffNode`] tree
//! - **Rename** - Merges delete/create sibling pairs with equal values
//! - **Codegen** - Walks a diff tree and emits `up`/`down`/`change` operations
//! - **Registry** - Two-phase entity registration and association resolution
//!
//! # Example
//!
//! ```rust
//! use relschema_core::prelude::*;
//! use serde_json::json;
//!
//! let mut registry = ModelRegistry::new();
//! registry
//!     .register(&json!({
//!         "id": "Example",
//!         "properties": { "id": { "type": "integer", "primaryKey": true } },
//!     }))
//!     .unwrap();
//! registry.resolve_associations().unwrap();
//!
//! let generator = MigrationGenerator::new(&registry);
//! let migration = generator.generate_all(&json!({})).unwrap();
//! assert_eq!(migration.up.len(), 1);
//! assert_eq!(migration.down, vec![Operation::drop_table("Example")]);
//! ```

pub mod codegen;
pub mod column;
pub mod diff;
pub mod error;
pub mod literal;
pub mod normalize;
pub mod operations;
pub mod registry;
mod rename;

pub use error::{Result, SchemaError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::codegen::{MigrationGenerator, MigrationSet};
    pub use crate::column::{
        infer_column, ColumnDefinition, ColumnType, ForeignKeyAction, References, Validate,
    };
    pub use crate::diff::{diff, diff_optional, diff_with, ChangeKind, DiffData, DiffNode, DiffOptions};
    pub use crate::error::SchemaError;
    pub use crate::normalize::{classify, normalize, NodeKind, Reference};
    pub use crate::operations::{Column, Operation};
    pub use crate::registry::{Association, AssociationKind, Model, ModelRegistry};
}

#[doc(inline)]
pub use diff::DiffNode;
#[doc(inline)]
pub use normalize::NodeKind;
