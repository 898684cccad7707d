//! SQLite connection pool for the snapshot store.
//!
//! One WAL-mode database holds stories, snapshots, and runs. The pool is
//! sized to the configured asset concurrency plus one writer, and carries a
//! busy timeout so the persist stage waits out a concurrent reader instead
//! of surfacing `SQLITE_BUSY` to the run.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

use crate::config::Config;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if missing) the snapshot database for this configuration.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.pipeline.concurrency as u32 + 1)
        .connect_with(options)
        .await
        .with_context(|| format!("opening snapshot database {}", db_path.display()))?;

    Ok(pool)
}
