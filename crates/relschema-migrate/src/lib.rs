//! Migration files, logging and sequential execution for relschema.
//!
//! `relschema-migrate` takes the operation lists produced by
//! `relschema-core` and carries them to a database:
//!
//! - **Loader** - Parses migration source text back into operations
//! - **Generate** - Diffs a schema directory against the stored snapshot
//! - **History** - JSON migration log with executed/pending status
//! - **State** - Replays operations over an in-memory schema model
//! - **Dialect** - Database-specific SQL generation
//! - **Executor** - Runs migrations one at a time, stopping at the first failure
//!
//! # Example
//!
//! ```rust
//! use relschema_migrate::prelude::*;
//!
//! let set = parse_migration("up = [\n  dropTable('Legacy', {}),\n]\n").unwrap();
//! let migration = Migration::new("20240101000000_drop_legacy", set);
//!
//! let runner = MigrationRunner::new(SqliteDialect::new());
//! assert_eq!(
//!     runner.sql_for(&migration, Direction::Forward),
//!     vec!["DROP TABLE \"Legacy\""]
//! );
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Generate a migration from schema changes
//! relschema-migrate generate --name add_users
//!
//! # Apply pending migrations
//! relschema-migrate migrate
//!
//! # Show migration status
//! relschema-migrate status
//!
//! # Roll back the last migration
//! relschema-migrate migrate --reverse
//! ```

pub mod dialect;
pub mod error;
pub mod executor;
pub mod generate;
pub mod history;
pub mod loader;
pub mod state;

pub use error::{MigrateError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{MigrationDialect, SqliteDialect};
    pub use crate::error::{LoadError, MigrateError};
    pub use crate::executor::{Direction, MigrationRunner, MigrationTarget, RunReport, SqliteTarget};
    pub use crate::generate::{generate_migration, load_registry, migration_id, Generated};
    pub use crate::history::{status, MigrationLog, MigrationStatus};
    pub use crate::loader::{load_migrations, parse_migration, write_migration, Migration};
    pub use crate::state::SchemaState;
}
