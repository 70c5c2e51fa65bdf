//! Migration runner.
//!
//! This module applies and rolls back migrations against a database, one
//! migration and one statement at a time. The first failing statement stops
//! the run; everything applied before it stays applied.

use std::str::FromStr;

use relschema_core::operations::Operation;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};
use crate::history::MigrationLog;
use crate::loader::Migration;

/// Something that executes SQL statements.
#[allow(async_fn_in_trait)]
pub trait MigrationTarget {
    /// Executes one statement.
    async fn execute(&mut self, sql: &str) -> Result<()>;
}

/// A SQLite database reached through an `sqlx` pool.
#[derive(Debug, Clone)]
pub struct SqliteTarget {
    pool: SqlitePool,
}

impl SqliteTarget {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to `url`, creating the database file if it does not exist.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl MigrationTarget for SqliteTarget {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// Which way a run goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply pending migrations (`up` then `change`).
    Forward,
    /// Roll back applied migrations (`down`), latest first.
    Backward,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Migrations completed, in run order.
    pub completed: Vec<String>,
    /// Statements collected in dry-run mode.
    pub statements: Vec<String>,
}

/// Runs migrations strictly in sequence.
#[derive(Debug, Clone)]
pub struct MigrationRunner<D: MigrationDialect> {
    dialect: D,
    dry_run: bool,
}

impl<D: MigrationDialect> MigrationRunner<D> {
    /// Creates a new runner.
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            dry_run: false,
        }
    }

    /// Enables dry-run mode: SQL is collected but not executed and the log
    /// is left untouched.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub const fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Operations of `migration` in application order for `direction`.
    fn operations(migration: &Migration, direction: Direction) -> Vec<&Operation> {
        match direction {
            Direction::Forward => migration.set.forward().collect(),
            Direction::Backward => migration.set.down.iter().collect(),
        }
    }

    /// Generates SQL for a migration without executing it.
    #[must_use]
    pub fn sql_for(&self, migration: &Migration, direction: Direction) -> Vec<String> {
        Self::operations(migration, direction)
            .into_iter()
            .flat_map(|operation| self.dialect.generate_sql(operation))
            .collect()
    }

    /// Selects the migrations a run visits, in run order.
    ///
    /// Forward runs take pending migrations in sequence order; backward runs
    /// take applied migrations latest first. `count` limits either.
    pub fn plan<'a>(
        &self,
        log: &MigrationLog,
        available: &'a [Migration],
        direction: Direction,
        count: Option<usize>,
    ) -> Result<Vec<&'a Migration>> {
        let limit = count.unwrap_or(usize::MAX);
        match direction {
            Direction::Forward => Ok(available
                .iter()
                .filter(|m| !log.is_applied(&m.id))
                .take(limit)
                .collect()),
            Direction::Backward => log
                .executed()
                .iter()
                .rev()
                .take(limit)
                .map(|id| {
                    available
                        .iter()
                        .find(|m| &m.id == id)
                        .ok_or_else(|| MigrateError::MigrationNotFound(id.clone()))
                })
                .collect(),
        }
    }

    /// Runs the planned migrations one after the other.
    ///
    /// The log is saved after every completed migration. A failing statement
    /// aborts the run with [`MigrateError::StepFailed`].
    pub async fn run<T: MigrationTarget>(
        &self,
        target: &mut T,
        log: &mut MigrationLog,
        available: &[Migration],
        direction: Direction,
        count: Option<usize>,
    ) -> Result<RunReport> {
        let planned = self.plan(log, available, direction, count)?;
        if planned.is_empty() {
            info!("No migrations to run");
        }

        let mut report = RunReport::default();
        for migration in planned {
            info!(id = %migration.id, direction = ?direction, "Running migration");
            self.run_one(target, migration, direction, &mut report).await?;

            if !self.dry_run {
                match direction {
                    Direction::Forward => log.record_applied(&migration.id)?,
                    Direction::Backward => log.record_unapplied(&migration.id)?,
                }
                log.save()?;
            }
            report.completed.push(migration.id.clone());
            info!(id = %migration.id, "Migration finished");
        }
        Ok(report)
    }

    /// Applies pending migrations.
    pub async fn migrate<T: MigrationTarget>(
        &self,
        target: &mut T,
        log: &mut MigrationLog,
        available: &[Migration],
        count: Option<usize>,
    ) -> Result<RunReport> {
        self.run(target, log, available, Direction::Forward, count)
            .await
    }

    /// Rolls back applied migrations, latest first.
    pub async fn rollback<T: MigrationTarget>(
        &self,
        target: &mut T,
        log: &mut MigrationLog,
        available: &[Migration],
        count: Option<usize>,
    ) -> Result<RunReport> {
        self.run(target, log, available, Direction::Backward, count)
            .await
    }

    async fn run_one<T: MigrationTarget>(
        &self,
        target: &mut T,
        migration: &Migration,
        direction: Direction,
        report: &mut RunReport,
    ) -> Result<()> {
        for operation in Self::operations(migration, direction) {
            let statements = self.dialect.generate_sql(operation);
            if !self.dry_run
                && matches!(operation, Operation::ChangeColumn { .. })
                && !self.dialect.supports_alter_column()
            {
                warn!(
                    dialect = self.dialect.name(),
                    operation = %operation.description(),
                    "Skipping column change the dialect cannot alter in place"
                );
                continue;
            }
            for sql in statements {
                debug!(sql = %sql, "Executing SQL");

                if self.dry_run {
                    report.statements.push(sql);
                    continue;
                }
                if sql.starts_with("--") {
                    warn!(comment = %sql, "Skipping comment (unsupported operation)");
                    continue;
                }
                if let Err(source) = target.execute(&sql).await {
                    return Err(MigrateError::StepFailed {
                        migration: migration.id.clone(),
                        operation: operation.description(),
                        completed: report.completed.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(())
    }
}
