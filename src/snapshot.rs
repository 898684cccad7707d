//! Non-destructive persistence of stories and snapshots.
//!
//! This module owns all writes to the `stories`, `snapshots`, and `runs`
//! tables. The rules it enforces:
//!
//! - Story identity fields (`story_id`, `source_id`, `platform`,
//!   `publish_time`, `first_seen_at`) are write-once; later observations
//!   update only descriptive fields.
//! - Snapshot rows are keyed by `(story_id, snapshot_date, run_id)`.
//!   Re-persisting the same run updates that row in place; rows from other
//!   runs and days are never touched.
//! - Nothing is deleted in normal operation. The only destructive entry
//!   point is [`prune_snapshots`], which is gated by age and invoked
//!   explicitly by an operator.
//!
//! Every statement is an idempotent upsert executed inside one transaction,
//! so a retried run self-heals instead of duplicating history.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::info;

use crate::models::SnapshotRecord;

/// Persist one run's ranked batch as a single logical transaction.
pub async fn persist_run(
    pool: &SqlitePool,
    run_id: &str,
    snapshot_date: NaiveDate,
    records: &[SnapshotRecord],
) -> Result<()> {
    let now = Utc::now().timestamp();
    let date = snapshot_date.format("%Y-%m-%d").to_string();

    let mut tx = pool.begin().await.context("beginning snapshot transaction")?;

    for record in records {
        let item = &record.item.item;

        sqlx::query(
            r#"
            INSERT INTO stories (story_id, source_id, platform, publish_time, title,
                                 description, channel, category, first_seen_at, last_seen_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(story_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                channel = excluded.channel,
                category = excluded.category,
                last_seen_at = excluded.last_seen_at
            "#,
        )
        .bind(&item.story_id)
        .bind(&item.source_id)
        .bind(&item.platform)
        .bind(item.publish_time.timestamp())
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.channel)
        .bind(&item.category)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (story_id, snapshot_date, run_id, rank, score, views,
                                   image_status, image_url, image_updated_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(story_id, snapshot_date, run_id) DO UPDATE SET
                rank = excluded.rank,
                score = excluded.score,
                views = excluded.views,
                image_status = excluded.image_status,
                image_url = excluded.image_url,
                image_updated_at = excluded.image_updated_at
            "#,
        )
        .bind(&item.story_id)
        .bind(&date)
        .bind(run_id)
        .bind(record.item.rank)
        .bind(item.score)
        .bind(item.views.map(|v| v as i64))
        .bind(record.image_status.as_str())
        .bind(&record.image_url)
        .bind(record.image_updated_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await.context("committing snapshot transaction")?;
    info!(run_id, %date, records = records.len(), "snapshot persisted");
    Ok(())
}

/// Record one run's emitted output contract.
pub async fn insert_run(
    pool: &SqlitePool,
    run_id: &str,
    snapshot_date: NaiveDate,
    data_version: &str,
    output_json: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO runs (run_id, snapshot_date, data_version, output_json, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(run_id) DO UPDATE SET
            snapshot_date = excluded.snapshot_date,
            data_version = excluded.data_version,
            output_json = excluded.output_json
        "#,
    )
    .bind(run_id)
    .bind(snapshot_date.format("%Y-%m-%d").to_string())
    .bind(data_version)
    .bind(output_json)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(())
}

/// `data_version` of the most recent run, if any. Recency is the insertion
/// order (`seq`), not `created_at`, which only has second resolution.
pub async fn latest_data_version(pool: &SqlitePool) -> Result<Option<String>> {
    let version: Option<String> =
        sqlx::query_scalar("SELECT data_version FROM runs ORDER BY seq DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(version)
}

/// Output contract JSON of the most recent run, if any.
pub async fn latest_run_output(pool: &SqlitePool) -> Result<Option<String>> {
    let json: Option<String> =
        sqlx::query_scalar("SELECT output_json FROM runs ORDER BY seq DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(json)
}

/// Delete snapshots (and run records) older than `retention_days` before
/// `today`. Deletion is gated by age only, never by content; canonical
/// stories are kept regardless.
///
/// Returns the number of snapshot rows removed.
pub async fn prune_snapshots(
    pool: &SqlitePool,
    retention_days: u32,
    today: NaiveDate,
) -> Result<u64> {
    let cutoff = today - chrono::Duration::days(retention_days as i64);
    let cutoff_str = cutoff.format("%Y-%m-%d").to_string();

    let result = sqlx::query("DELETE FROM snapshots WHERE snapshot_date < ?")
        .bind(&cutoff_str)
        .execute(pool)
        .await?;

    sqlx::query("DELETE FROM runs WHERE snapshot_date < ?")
        .bind(&cutoff_str)
        .execute(pool)
        .await?;

    info!(cutoff = %cutoff_str, removed = result.rows_affected(), "snapshots pruned");
    Ok(result.rows_affected())
}
