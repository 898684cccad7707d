//! # Trendsnap CLI (`tsn`)
//!
//! The `tsn` binary triggers pipeline runs and inspects their output.
//!
//! ## Usage
//!
//! ```bash
//! tsn --config ./trendsnap.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tsn init` | Create the SQLite database and run schema migrations |
//! | `tsn run` | Execute one pipeline run from the configured feed |
//! | `tsn latest` | Print the most recent run's output contract as JSON |
//! | `tsn prune` | Delete snapshots older than the retention window |
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Run fully successful |
//! | 3 | Run completed, but some assets are pending or failed |
//! | 1 | Fatal failure (no snapshot was written for this run) |

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use trendsnap::config;
use trendsnap::db;
use trendsnap::fetch::JsonFeedFetcher;
use trendsnap::migrate;
use trendsnap::pipeline::{self, RunOptions};
use trendsnap::snapshot;

/// Exit code for a run that completed with pending or failed assets.
const EXIT_PARTIAL: i32 = 3;

/// Trendsnap — an idempotent trending-content ingestion and snapshot pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `trendsnap.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tsn",
    about = "Trendsnap — an idempotent trending-content ingestion and snapshot pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./trendsnap.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (stories, snapshots, runs). This command is idempotent — running
    /// it multiple times is safe.
    Init,

    /// Execute one pipeline run.
    ///
    /// Fetches the configured feed, assigns stable story identities, ranks
    /// the batch, resolves image assets for the top-N items, and persists
    /// one snapshot per item. Safe to re-run: every write is an idempotent
    /// upsert and valid assets are never regenerated.
    Run {
        /// Snapshot date for this run (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,

        /// Run identifier. Defaults to a fresh UUID; pass the same id to
        /// re-run and self-heal a partially completed run.
        #[arg(long)]
        run_id: Option<String>,

        /// Override the number of top-ranked items eligible for asset
        /// generation.
        #[arg(long)]
        top_n: Option<usize>,

        /// Regenerate assets even when a valid one exists. Bypasses the
        /// asset-immutability rule explicitly, on operator request only.
        #[arg(long)]
        force_regenerate: bool,

        /// Override the maximum generation retries per asset.
        #[arg(long)]
        max_retries: Option<u32>,

        /// Override the base backoff delay between retries, in milliseconds.
        #[arg(long)]
        backoff_ms: Option<u64>,

        /// Override the overall run deadline, in seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Maximum number of feed items to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Show planned counts without generating assets or writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the most recent run's output contract as JSON.
    Latest,

    /// Delete snapshots older than the retention window.
    ///
    /// The only destructive operation in Trendsnap: gated by age, never by
    /// content, and never touching canonical stories or assets.
    Prune {
        /// Override the retention window from config, in days.
        #[arg(long)]
        retention_days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Run {
            date,
            run_id,
            top_n,
            force_regenerate,
            max_retries,
            backoff_ms,
            deadline_secs,
            limit,
            dry_run,
        } => {
            let snapshot_date = match date {
                Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")?,
                None => Utc::now().date_naive(),
            };
            let opts = RunOptions {
                snapshot_date,
                run_id: run_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                top_n,
                force_regenerate,
                max_retries,
                backoff_ms,
                deadline_secs,
                limit,
                dry_run,
            };

            let fetcher = JsonFeedFetcher::new(cfg.feed.path.clone());
            let summary = pipeline::run_pipeline(&cfg, &fetcher, opts).await?;
            if summary.is_partial() {
                std::process::exit(EXIT_PARTIAL);
            }
        }
        Commands::Latest => {
            let pool = db::connect(&cfg).await?;
            let output = snapshot::latest_run_output(&pool).await?;
            pool.close().await;
            match output {
                Some(json) => println!("{}", json),
                None => anyhow::bail!("no runs recorded yet"),
            }
        }
        Commands::Prune { retention_days } => {
            let days = retention_days.unwrap_or(cfg.retention.days);
            let pool = db::connect(&cfg).await?;
            let removed = snapshot::prune_snapshots(&pool, days, Utc::now().date_naive()).await?;
            pool.close().await;
            println!("pruned {} snapshot rows older than {} days", removed, days);
        }
    }

    Ok(())
}
