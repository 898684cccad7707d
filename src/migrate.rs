use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Canonical stories: one row per real-world content item, never deleted
    // by the pipeline. story_id is a content hash, not a sequence.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stories (
            story_id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            platform TEXT NOT NULL,
            publish_time INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            channel TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            first_seen_at INTEGER NOT NULL,
            last_seen_at INTEGER NOT NULL,
            UNIQUE(source_id, platform, publish_time)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only per-run observations.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            story_id TEXT NOT NULL,
            snapshot_date TEXT NOT NULL,
            run_id TEXT NOT NULL,
            rank INTEGER NOT NULL,
            score REAL,
            views INTEGER,
            image_status TEXT NOT NULL,
            image_url TEXT,
            image_updated_at INTEGER,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (story_id, snapshot_date, run_id),
            FOREIGN KEY (story_id) REFERENCES stories(story_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per pipeline run, holding the emitted output contract.
    // seq is the ordering key: created_at has second resolution, so two
    // runs landing in the same second would otherwise tie.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL UNIQUE,
            snapshot_date TEXT NOT NULL,
            data_version TEXT NOT NULL,
            output_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_date ON snapshots(snapshot_date)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_story ON snapshots(story_id)")
        .execute(pool)
        .await?;
    Ok(())
}
