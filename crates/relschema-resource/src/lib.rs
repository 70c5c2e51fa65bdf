//! # relschema-resource
//!
//! CRUD actions over models registered in a relschema
//! [`ModelRegistry`](relschema_core::registry::ModelRegistry).
//!
//! This crate provides:
//! - `build_read_options` to turn a JSON read payload into a validated
//!   options tree, with `include` expanded through the association map
//! - `plan_write` to split a write payload into own columns and nested
//!   records
//! - `Resource` for find/create/update/destroy against any [`Store`]
//! - `MemoryStore`, an in-process store
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use relschema_core::registry::ModelRegistry;
//! use relschema_resource::prelude::*;
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let mut registry = ModelRegistry::new();
//! registry.register_all(&[
//!     json!({ "id": "Author", "properties": {
//!         "id": { "type": "integer", "primaryKey": true },
//!         "name": { "type": "string" },
//!         "books": { "type": "array", "items": { "$ref": "Book" } },
//!     }}),
//!     json!({ "id": "Book", "properties": {
//!         "id": { "type": "integer", "primaryKey": true },
//!         "title": { "type": "string" },
//!     }}),
//! ])?;
//! registry.resolve_associations()?;
//!
//! let authors = Resource::new(Arc::new(registry), MemoryStore::new(), "Author")?;
//! authors
//!     .create(&json!({ "name": "Le Guin", "books": [{ "title": "Lathe of Heaven" }] }))
//!     .await?;
//!
//! let found = authors
//!     .find_one(&json!({ "attributes": ["name"], "include": ["books"] }))
//!     .await?;
//! assert_eq!(found["books"][0]["title"], "Lathe of Heaven");
//! # Ok::<(), ResourceError>(())
//! # }).unwrap();
//! ```
//!
//! ## Nested writes
//!
//! The parent row is written first. Nested records are then written
//! concurrently, each with the parent's key bound into its foreign key
//! (`hasOne`/`hasMany`), linked through the join table (`belongsToMany`),
//! or referenced from the parent's foreign key column (`belongsTo`). A
//! nested record carrying its primary key is updated instead of inserted.

pub mod error;
pub mod options;
pub mod resource;
pub mod store;
pub mod write;

pub use error::{ResourceError, Result};
pub use resource::Resource;
pub use store::{MemoryStore, Record, Store};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::ResourceError;
    pub use crate::options::{build_read_options, Include, ReadOptions, SortDirection, SortKey};
    pub use crate::resource::Resource;
    pub use crate::store::{MemoryStore, Record, Store};
    pub use crate::write::{plan_write, ChildTask, WriteAction, WritePlan};
}
