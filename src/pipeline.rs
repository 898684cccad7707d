//! Pipeline orchestration.
//!
//! Coordinates one run end to end: fetch → hash → rank → resolve assets →
//! persist → emit. Each run is a short-lived batch job; ranking happens only
//! after the full batch is materialized, and asset resolution for distinct
//! stories runs in parallel under a concurrency bound and a run deadline.
//!
//! Per-item problems (a malformed publish time, a failed generation) are
//! recovered locally and surfaced as statuses; only fetch-level and
//! store-level errors abort the run, and they do so before any partial
//! write for the affected stage.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::assets::{AssetResolution, AssetStore, RetryPolicy};
use crate::config::Config;
use crate::db;
use crate::fetch::SourceFetcher;
use crate::generate;
use crate::identity::compute_story_id;
use crate::migrate;
use crate::models::{AssetStatus, RankedItem, ScorableItem, SnapshotRecord};
use crate::output;
use crate::rank::rank_items;
use crate::score;
use crate::snapshot;

/// Stages of one run, in order. `Failed` is implicit: any stage can abort
/// by returning an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStage {
    Fetched,
    Hashed,
    Ranked,
    AssetsResolved,
    Persisted,
    Emitted,
}

impl RunStage {
    fn as_str(&self) -> &'static str {
        match self {
            RunStage::Fetched => "fetched",
            RunStage::Hashed => "hashed",
            RunStage::Ranked => "ranked",
            RunStage::AssetsResolved => "assets_resolved",
            RunStage::Persisted => "persisted",
            RunStage::Emitted => "emitted",
        }
    }
}

/// Per-run options, resolved from CLI flags with config defaults.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub snapshot_date: NaiveDate,
    pub run_id: String,
    pub top_n: Option<usize>,
    pub force_regenerate: bool,
    pub max_retries: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub limit: Option<usize>,
    pub dry_run: bool,
}

/// Outcome of one run. A run with pending or failed assets is a partial
/// success, distinct from both full success and fatal failure.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub snapshot_date: String,
    pub fetched: usize,
    pub excluded: usize,
    pub ranked: usize,
    pub ready: usize,
    pub pending: usize,
    pub failed: usize,
    pub na: usize,
    pub data_version: String,
    pub changed: bool,
}

impl RunSummary {
    pub fn is_partial(&self) -> bool {
        self.pending + self.failed > 0
    }
}

/// Execute one pipeline run.
pub async fn run_pipeline(
    config: &Config,
    fetcher: &dyn SourceFetcher,
    opts: RunOptions,
) -> Result<RunSummary> {
    let top_n = opts.top_n.unwrap_or(config.pipeline.top_n);
    let max_retries = opts.max_retries.unwrap_or(config.pipeline.max_retries);
    let backoff_ms = opts.backoff_ms.unwrap_or(config.pipeline.backoff_ms);
    let deadline_secs = opts.deadline_secs.unwrap_or(config.pipeline.deadline_secs);

    // Fetched
    let mut raw_items = fetcher
        .fetch()
        .await
        .with_context(|| format!("fetching batch from '{}'", fetcher.name()))?;
    if let Some(limit) = opts.limit {
        raw_items.truncate(limit);
    }
    let fetched = raw_items.len();
    info!(stage = RunStage::Fetched.as_str(), run_id = %opts.run_id, fetched, "batch fetched");

    // Hashed: identity + enrichment. A bad item excludes only itself.
    let mut scorable: Vec<ScorableItem> = Vec::with_capacity(raw_items.len());
    let mut seen: HashSet<String> = HashSet::new();
    let mut excluded = 0usize;
    for raw in &raw_items {
        match hash_item(raw) {
            Ok((story_id, publish_time)) => {
                if !seen.insert(story_id.clone()) {
                    warn!(
                        source_id = %raw.source_id,
                        %story_id, "duplicate story in batch, keeping first occurrence"
                    );
                    excluded += 1;
                    continue;
                }
                scorable.push(score::enrich(raw, story_id, publish_time));
            }
            Err(e) => {
                warn!(source_id = %raw.source_id, error = %e, "item excluded from run");
                excluded += 1;
            }
        }
    }
    if scorable.is_empty() {
        bail!(
            "no valid items in batch ({} fetched, {} excluded); aborting before any write",
            fetched,
            excluded
        );
    }
    info!(stage = RunStage::Hashed.as_str(), valid = scorable.len(), excluded, "identities assigned");

    // Ranked
    let ranked = rank_items(scorable);
    info!(stage = RunStage::Ranked.as_str(), ranked = ranked.len(), "batch ranked");

    if opts.dry_run {
        let eligible = ranked.len().min(top_n);
        println!("run {} (dry-run)", opts.snapshot_date.format("%Y-%m-%d"));
        println!("  fetched: {} items", fetched);
        println!("  excluded: {}", excluded);
        println!("  ranked: {}", ranked.len());
        println!("  asset-eligible (top {}): {}", top_n, eligible);
        return Ok(RunSummary {
            run_id: opts.run_id,
            snapshot_date: opts.snapshot_date.format("%Y-%m-%d").to_string(),
            fetched,
            excluded,
            ranked: ranked.len(),
            ready: 0,
            pending: 0,
            failed: 0,
            na: 0,
            data_version: String::new(),
            changed: false,
        });
    }

    // AssetsResolved: parallel per story under a concurrency bound and a
    // run deadline. Items outside top-N never reach the provider.
    let provider = generate::create_provider(&config.image)?;
    let store = Arc::new(AssetStore::new(
        config.assets.dir.clone(),
        config.assets.url_prefix.clone(),
        config.assets.min_bytes,
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(backoff_ms),
        },
        provider,
    ));
    let semaphore = Arc::new(Semaphore::new(config.pipeline.concurrency));
    let deadline = Instant::now() + Duration::from_secs(deadline_secs);

    let mut records: Vec<SnapshotRecord> = ranked
        .iter()
        .map(|item| SnapshotRecord {
            item: item.clone(),
            image_status: AssetStatus::NotApplicable,
            image_url: None,
            image_updated_at: None,
        })
        .collect();

    let mut handles = Vec::new();
    for (idx, item) in ranked.iter().enumerate() {
        if idx >= top_n {
            break;
        }
        let store = store.clone();
        let semaphore = semaphore.clone();
        let story_id = item.item.story_id.clone();
        let prompt = image_prompt(item);
        let force = opts.force_regenerate;
        handles.push((
            idx,
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("asset semaphore closed");
                resolve_one(&store, &story_id, &prompt, force, deadline).await
            }),
        ));
    }
    for (idx, handle) in handles {
        let resolution = handle.await.context("asset task panicked")?;
        let record = &mut records[idx];
        record.image_status = resolution.status;
        record.image_url = resolution.url;
        record.image_updated_at = resolution.updated_at;
    }
    info!(stage = RunStage::AssetsResolved.as_str(), "assets resolved");

    // Persisted. Migrations are idempotent, so a run works on a fresh
    // database without a separate init.
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;
    snapshot::persist_run(&pool, &opts.run_id, opts.snapshot_date, &records).await?;
    info!(stage = RunStage::Persisted.as_str(), "snapshot written");

    // Emitted
    let run_output = output::build_run_output(&opts.run_id, opts.snapshot_date, &records);
    let previous = snapshot::latest_data_version(&pool).await?;
    let changed = previous.as_deref() != Some(run_output.data_version.as_str());
    let output_json = serde_json::to_string(&run_output)?;
    snapshot::insert_run(
        &pool,
        &opts.run_id,
        opts.snapshot_date,
        &run_output.data_version,
        &output_json,
    )
    .await?;
    info!(
        stage = RunStage::Emitted.as_str(),
        data_version = %run_output.data_version,
        changed,
        "run output emitted"
    );
    pool.close().await;

    let summary = RunSummary {
        run_id: opts.run_id,
        snapshot_date: opts.snapshot_date.format("%Y-%m-%d").to_string(),
        fetched,
        excluded,
        ranked: records.len(),
        ready: count_status(&records, AssetStatus::Ready),
        pending: count_status(&records, AssetStatus::Pending),
        failed: count_status(&records, AssetStatus::Failed),
        na: count_status(&records, AssetStatus::NotApplicable),
        data_version: run_output.data_version,
        changed,
    };
    print_summary(&summary);
    Ok(summary)
}

/// Resolve one story's asset, mapping deadline expiry and store errors to
/// `pending` (both clear on a later run; neither corrupts the namespace).
async fn resolve_one(
    store: &AssetStore,
    story_id: &str,
    prompt: &str,
    force: bool,
    deadline: Instant,
) -> AssetResolution {
    let attempt = tokio::time::timeout_at(
        deadline,
        store.ensure_asset(story_id, prompt, force, Some(deadline)),
    )
    .await;
    match attempt {
        Ok(Ok(resolution)) => resolution,
        Ok(Err(e)) => {
            warn!(story_id, error = %e, "asset resolution error");
            pending_resolution(format!("asset store error: {}", e))
        }
        Err(_) => {
            warn!(story_id, "run deadline exceeded, abandoning generation");
            pending_resolution("run deadline exceeded")
        }
    }
}

fn pending_resolution(detail: impl Into<String>) -> AssetResolution {
    AssetResolution {
        status: AssetStatus::Pending,
        url: None,
        updated_at: None,
        detail: Some(detail.into()),
    }
}

fn image_prompt(item: &RankedItem) -> String {
    let item = &item.item;
    if item.category.is_empty() {
        format!(
            "Editorial illustration for a trending {} video titled \"{}\"",
            item.platform, item.title
        )
    } else {
        format!(
            "Editorial illustration for a trending {} video titled \"{}\" in the {} category",
            item.platform, item.title, item.category
        )
    }
}

fn hash_item(raw: &crate::models::RawItem) -> Result<(String, DateTime<Utc>)> {
    let publish_time = DateTime::parse_from_rfc3339(&raw.publish_time)
        .with_context(|| format!("unparseable publish_time {:?}", raw.publish_time))?
        .with_timezone(&Utc);
    let story_id = compute_story_id(&raw.source_id, &raw.platform, publish_time)?;
    Ok((story_id, publish_time))
}

fn count_status(records: &[SnapshotRecord], status: AssetStatus) -> usize {
    records.iter().filter(|r| r.image_status == status).count()
}

fn print_summary(summary: &RunSummary) {
    println!("run {} ({})", summary.snapshot_date, summary.run_id);
    println!("  fetched: {} items", summary.fetched);
    println!("  excluded: {}", summary.excluded);
    println!("  ranked: {}", summary.ranked);
    println!(
        "  assets: {} ready, {} pending, {} failed, {} n/a",
        summary.ready, summary.pending, summary.failed, summary.na
    );
    println!(
        "  data_version: {} ({})",
        summary.data_version,
        if summary.changed { "changed" } else { "unchanged" }
    );
    if summary.is_partial() {
        println!("partial");
    } else {
        println!("ok");
    }
}
