//! # LP CRM CLI (`crm`)
//!
//! ## Usage
//!
//! ```bash
//! crm --config ./config/crm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crm init` | Create the SQLite database and schema |
//! | `crm serve` | Start the REST API |
//! | `crm import <kind> <file>` | Import one Notion JSON or CSV export |
//! | `crm import all` | Import the newest export of every kind |
//! | `crm exports` | List export files found per kind |
//! | `crm funnel refresh` | Recompute every funnel record |
//! | `crm stats` | Row counts and import history |

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lp_crm::config::{self, Config};
use lp_crm::import::{self, ImportFormat, ImportKind, ImportOptions};
use lp_crm::{db, exports, funnel, migrate, server, stats};

/// LP CRM: LPs, GPs, funds, notes and follow-ups, imported from Notion and
/// served over HTTP.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/crm.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "crm", version, about = "LP CRM: relationship tracking for fundraising")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it against an existing database is safe.
    Init,

    /// Start the REST API on `[server].bind`.
    Serve,

    /// Import a Notion export.
    ///
    /// Kinds: distributors, lps, gps, people, person-links, funds, notes,
    /// or `all` to import the newest file of each kind found under the
    /// export directory.
    Import {
        /// Import kind, or `all`.
        kind: String,

        /// Export file (required unless the kind is `all`).
        file: Option<PathBuf>,

        /// `notion` (JSON) or `csv`. Defaults to the file extension.
        #[arg(long)]
        format: Option<String>,

        /// Directory searched by `import all` (defaults to `import.export_dir`).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Run the import and roll it back, printing what would change.
        #[arg(long)]
        dry_run: bool,

        /// Import even if the file matches its last checkpoint.
        #[arg(long)]
        force: bool,
    },

    /// List export files discovered under `import.export_dir`.
    Exports,

    /// Sales funnel maintenance.
    Funnel {
        #[command(subcommand)]
        action: FunnelAction,
    },

    /// Show database statistics.
    Stats,
}

#[derive(Subcommand)]
enum FunnelAction {
    /// Recompute last-contact columns and create missing interest records.
    Refresh,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Import {
            kind,
            file,
            format,
            dir,
            dry_run,
            force,
        } => {
            let opts = ImportOptions { dry_run, force };
            let pool = db::connect(&cfg).await?;
            migrate::apply_schema(&pool).await?;

            if kind == "all" {
                let dir = dir.unwrap_or_else(|| cfg.import.export_dir.clone());
                let reports = import::run_all(&cfg, &pool, &dir, opts).await?;
                println!("{} export(s) processed", reports.len());
            } else {
                let kind: ImportKind = kind.parse().map_err(anyhow::Error::msg)?;
                let Some(path) = file else {
                    bail!("An export file is required: crm import {} <file>", kind);
                };
                let format = match format {
                    Some(f) => f.parse::<ImportFormat>().map_err(anyhow::Error::msg)?,
                    None => ImportFormat::from_path(&path),
                };
                let report = import::run_import(&pool, kind, &path, format, opts).await?;
                report.print(&path);
            }
            pool.close().await;
        }
        Commands::Exports => {
            exports::list_exports(&cfg)?;
        }
        Commands::Funnel {
            action: FunnelAction::Refresh,
        } => {
            let pool = db::connect(&cfg).await?;
            migrate::apply_schema(&pool).await?;
            let mut tx = db::begin_write(&pool).await?;
            let report = funnel::refresh_all(&mut *tx)
                .await
                .context("Funnel refresh failed")?;
            tx.commit().await?;
            println!("funnel refresh");
            println!("  interest records created: {}", report.created);
            println!("  interest records refreshed: {}", report.interests);
            println!("  roadshow statuses refreshed: {}", report.roadshow_statuses);
            println!("ok");
            pool.close().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
