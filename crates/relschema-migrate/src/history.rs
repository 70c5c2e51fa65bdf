//! Migration log.
//!
//! The log is a flat JSON array of applied migration identifiers, kept in
//! application order and persisted next to the migrations.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::loader::Migration;

/// Default file name of the migration log.
pub const LOG_FILE_NAME: &str = "migrations.json";

/// Applied migration identifiers, persisted as a JSON array.
#[derive(Debug, Clone, Default)]
pub struct MigrationLog {
    path: PathBuf,
    executed: Vec<String>,
}

impl MigrationLog {
    /// Creates an empty log stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            executed: Vec::new(),
        }
    }

    /// Loads the log from `path`. A missing file is an empty log.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let executed = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No migration log yet");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, executed })
    }

    /// Writes the log back to its file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.executed)?)?;
        Ok(())
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applied identifiers in application order.
    #[must_use]
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Returns true if `id` has been applied.
    #[must_use]
    pub fn is_applied(&self, id: &str) -> bool {
        self.executed.iter().any(|applied| applied == id)
    }

    /// Records `id` as applied. Recording twice is an error.
    pub fn record_applied(&mut self, id: &str) -> Result<()> {
        if self.is_applied(id) {
            return Err(MigrateError::InvalidState(format!(
                "Migration '{id}' is already applied"
            )));
        }
        self.executed.push(id.to_string());
        Ok(())
    }

    /// Removes `id` from the log (for rollback).
    pub fn record_unapplied(&mut self, id: &str) -> Result<()> {
        let idx = self
            .executed
            .iter()
            .position(|applied| applied == id)
            .ok_or_else(|| MigrateError::MigrationNotFound(id.to_string()))?;
        self.executed.remove(idx);
        Ok(())
    }
}

/// Executed and pending migration identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Applied migrations, in application order.
    pub executed: Vec<String>,
    /// Migrations not yet applied, in sequence order.
    pub pending: Vec<String>,
}

/// Splits `available` into executed and pending migrations.
#[must_use]
pub fn status(log: &MigrationLog, available: &[Migration]) -> MigrationStatus {
    let applied: HashSet<&str> = log.executed().iter().map(String::as_str).collect();
    MigrationStatus {
        executed: log.executed().to_vec(),
        pending: available
            .iter()
            .filter(|m| !applied.contains(m.id.as_str()))
            .map(|m| m.id.clone())
            .collect(),
    }
}
