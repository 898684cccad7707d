//! Versioned run output contract.
//!
//! The presentation layer consumes one [`RunOutput`] per run. Its
//! `data_version` is a hash of the canonical serialization of `items`, so it
//! changes if and only if any emitted field changed since the previous run —
//! consumers detect "has anything changed" from one token instead of diffing
//! every field.
//!
//! Internal scores carry full `f64` precision through ranking; they are
//! rounded to two decimals here, at the contract boundary, and nowhere
//! earlier.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{AssetStatus, SnapshotRecord};

/// One item of the run output, ordered by `rank` ascending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputItem {
    pub story_id: String,
    pub rank: i64,
    /// Display score, rounded to two decimals.
    pub score: Option<f64>,
    pub title: String,
    pub description: String,
    pub channel: String,
    pub category: String,
    pub platform: String,
    pub source_id: String,
    pub publish_time: String,
    pub views: Option<u64>,
    pub image_status: AssetStatus,
    pub image_url: Option<String>,
    pub image_updated_at: Option<i64>,
}

/// The versioned contract emitted after a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub data_version: String,
    pub snapshot_date: String,
    pub run_id: String,
    pub items: Vec<OutputItem>,
}

/// Build the output contract for one persisted batch.
pub fn build_run_output(
    run_id: &str,
    snapshot_date: NaiveDate,
    records: &[SnapshotRecord],
) -> RunOutput {
    let mut items: Vec<OutputItem> = records.iter().map(output_item).collect();
    items.sort_by_key(|item| item.rank);
    let data_version = data_version(&items);

    RunOutput {
        data_version,
        snapshot_date: snapshot_date.format("%Y-%m-%d").to_string(),
        run_id: run_id.to_string(),
        items,
    }
}

fn output_item(record: &SnapshotRecord) -> OutputItem {
    let item = &record.item.item;
    OutputItem {
        story_id: item.story_id.clone(),
        rank: record.item.rank,
        score: item.score.map(round_display),
        title: item.title.clone(),
        description: item.description.clone(),
        channel: item.channel.clone(),
        category: item.category.clone(),
        platform: item.platform.clone(),
        source_id: item.source_id.clone(),
        publish_time: item.publish_time.to_rfc3339(),
        views: item.views,
        image_status: record.image_status,
        image_url: record.image_url.clone(),
        image_updated_at: record.image_updated_at,
    }
}

fn round_display(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Opaque change-detection token: SHA-256 over the canonical JSON of the
/// ordered items. Identical content always yields an identical token;
/// serde serializes struct fields in declaration order, so the encoding
/// is stable across runs and process restarts.
pub fn data_version(items: &[OutputItem]) -> String {
    let canonical = serde_json::to_string(items).expect("output items serialize to JSON");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RankedItem, ScorableItem};
    use chrono::{TimeZone, Utc};

    fn record(story_id: &str, rank: i64, score: f64) -> SnapshotRecord {
        SnapshotRecord {
            item: RankedItem {
                item: ScorableItem {
                    story_id: story_id.to_string(),
                    source_id: format!("src-{}", story_id),
                    platform: "youtube".to_string(),
                    publish_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                    title: format!("title {}", story_id),
                    description: "desc".to_string(),
                    channel: "chan".to_string(),
                    category: "cat".to_string(),
                    views: Some(500),
                    score: Some(score),
                },
                rank,
            },
            image_status: AssetStatus::Ready,
            image_url: Some(format!("https://assets.example.com/{}.png", story_id)),
            image_updated_at: Some(1_700_000_000),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()
    }

    #[test]
    fn items_are_ordered_by_rank_ascending() {
        let out = build_run_output(
            "run-a",
            day(),
            &[record("b", 2, 1.0), record("a", 1, 2.0), record("c", 3, 0.5)],
        );
        let ranks: Vec<i64> = out.items.iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn identical_content_yields_identical_version() {
        let records = vec![record("a", 1, 2.0), record("b", 2, 1.0)];
        let first = build_run_output("run-a", day(), &records);
        let second = build_run_output("run-b", day(), &records);
        // run_id and snapshot_date are not part of the content hash.
        assert_eq!(first.data_version, second.data_version);
    }

    #[test]
    fn changing_one_field_changes_the_version() {
        let base = build_run_output("run-a", day(), &[record("a", 1, 2.0)]);

        let mut retitled = record("a", 1, 2.0);
        retitled.item.item.title = "different".to_string();
        let changed = build_run_output("run-a", day(), &[retitled]);

        assert_ne!(base.data_version, changed.data_version);
    }

    #[test]
    fn image_status_change_changes_the_version() {
        let base = build_run_output("run-a", day(), &[record("a", 1, 2.0)]);

        let mut pending = record("a", 1, 2.0);
        pending.image_status = AssetStatus::Pending;
        pending.image_url = None;
        let changed = build_run_output("run-a", day(), &[pending]);

        assert_ne!(base.data_version, changed.data_version);
    }

    #[test]
    fn scores_are_rounded_only_for_display() {
        let out = build_run_output("run-a", day(), &[record("a", 1, 7.4567)]);
        assert_eq!(out.items[0].score, Some(7.46));
    }

    #[test]
    fn output_round_trips_through_json() {
        let out = build_run_output("run-a", day(), &[record("a", 1, 2.0)]);
        let json = serde_json::to_string(&out).unwrap();
        let back: RunOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.items, out.items);
        assert_eq!(back.data_version, out.data_version);
        assert!(json.contains("\"image_status\":\"ready\""));
    }
}
