//! relschema-migrate CLI
//!
//! Command-line tool for generating and applying schema migrations.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use relschema_migrate::history::LOG_FILE_NAME;
use relschema_migrate::prelude::*;

/// JSON-Schema driven database migrations.
#[derive(Parser)]
#[command(name = "relschema-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Migrations directory.
    #[arg(short, long, default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Directory of JSON-Schema entity files.
    #[arg(short, long, default_value = "schemas")]
    schemas_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new migration from schema changes.
    Generate {
        /// Migration name/description.
        #[arg(short, long, default_value = "auto")]
        name: String,
    },

    /// Apply pending migrations.
    Migrate {
        /// Number of migrations to run (all pending, or 1 with --reverse).
        #[arg(short, long)]
        count: Option<usize>,

        /// Roll back migrations instead of applying.
        #[arg(short, long)]
        reverse: bool,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show executed and pending migrations.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let log_path = cli.migrations_dir.join(LOG_FILE_NAME);

    match cli.command {
        Commands::Generate { name } => {
            let generated = generate_migration(
                &cli.schemas_dir,
                &cli.migrations_dir,
                &name,
                chrono::Utc::now(),
            )?;
            if let Some(generated) = generated {
                println!("Created {}", generated.path.display());
            }
        }

        Commands::Migrate {
            count,
            reverse,
            dry_run,
        } => {
            let migrations = load_migrations(&cli.migrations_dir)?;
            let mut log = MigrationLog::load(&log_path)?;

            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            let url = if dry_run {
                "sqlite::memory:"
            } else {
                cli.database.as_str()
            };
            let mut target = SqliteTarget::connect(url).await?;
            let runner = MigrationRunner::new(SqliteDialect::new()).dry_run(dry_run);

            let report = if reverse {
                runner
                    .rollback(&mut target, &mut log, &migrations, Some(count.unwrap_or(1)))
                    .await?
            } else {
                runner.migrate(&mut target, &mut log, &migrations, count).await?
            };

            for sql in &report.statements {
                println!("{sql};");
            }
            info!(count = report.completed.len(), "Done");
        }

        Commands::Status => {
            let migrations = load_migrations(&cli.migrations_dir)?;
            let log = MigrationLog::load(&log_path)?;
            let status = status(&log, &migrations);

            if status.executed.is_empty() && status.pending.is_empty() {
                info!("No migrations found.");
                return Ok(());
            }
            println!("\nMigrations:");
            println!("{:-<60}", "");
            for id in &status.executed {
                println!(" [X] {id}");
            }
            for id in &status.pending {
                println!(" [ ] {id}");
            }
            println!();
        }
    }

    Ok(())
}
