//! Migration generation from a directory of schema files.
//!
//! Registers every `*.json` schema in the schemas directory, diffs the
//! registry against the snapshot stored next to the migrations, and writes
//! the difference as a new migration file plus a fresh snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use heck::ToSnakeCase;
use relschema_core::codegen::{MigrationGenerator, MigrationSet};
use relschema_core::registry::ModelRegistry;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::Result;
use crate::loader::write_migration;

/// File name of the schema snapshot inside the migrations directory.
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.json";

/// A migration written by [`generate_migration`].
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    /// Migration identifier.
    pub id: String,
    /// Path of the written migration file.
    pub path: PathBuf,
    /// The generated operations.
    pub set: MigrationSet,
}

/// Builds a migration identifier: `<YYYYmmddHHMMSS>_<name>`.
#[must_use]
pub fn migration_id(now: DateTime<Utc>, name: &str) -> String {
    format!("{}_{}", now.format("%Y%m%d%H%M%S"), name.to_snake_case())
}

/// Reads every `*.json` schema in `dir`, sorted by file name.
pub fn load_schemas(dir: &Path) -> Result<Vec<Value>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    paths
        .iter()
        .map(|path| {
            debug!(path = %path.display(), "Loading schema");
            Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
        })
        .collect()
}

/// Builds a resolved registry from a directory of schema files.
pub fn load_registry(dir: &Path) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    registry.register_all(&load_schemas(dir)?)?;
    registry.resolve_associations()?;
    Ok(registry)
}

/// Reads the stored snapshot. A missing file is the empty snapshot.
pub fn load_snapshot(path: &Path) -> Result<Value> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Object(Map::new())),
        Err(e) => Err(e.into()),
    }
}

/// Writes a snapshot as pretty-printed JSON.
pub fn save_snapshot(path: &Path, snapshot: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(snapshot)?)?;
    Ok(())
}

/// Diffs the schemas in `schemas_dir` against the stored snapshot and writes
/// a new migration when anything changed.
///
/// Returns `None` when the schemas match the snapshot.
pub fn generate_migration(
    schemas_dir: &Path,
    migrations_dir: &Path,
    name: &str,
    now: DateTime<Utc>,
) -> Result<Option<Generated>> {
    let registry = load_registry(schemas_dir)?;
    let snapshot_path = migrations_dir.join(SNAPSHOT_FILE_NAME);
    let previous = load_snapshot(&snapshot_path)?;

    let set = MigrationGenerator::new(&registry).generate_all(&previous)?;
    if set.is_empty() {
        info!("No changes detected");
        return Ok(None);
    }

    let id = migration_id(now, name);
    let path = write_migration(migrations_dir, &id, &set)?;
    save_snapshot(&snapshot_path, &registry.snapshot()?)?;
    info!(id = %id, path = %path.display(), "Created migration");
    Ok(Some(Generated { id, path, set }))
}
