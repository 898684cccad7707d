//! Core data models used throughout Trendsnap.
//!
//! These types represent the items that flow through the pipeline: raw feed
//! entries, enriched scorable items, ranked items, and the persisted
//! story/snapshot records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw item produced by a source fetcher before enrichment.
///
/// `publish_time` is kept as the upstream string; it is parsed and validated
/// during the hashing stage so that a malformed date excludes only the
/// offending item instead of failing the whole feed deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    pub source_id: String,
    pub platform: String,
    pub publish_time: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub comments: Option<u64>,
    /// Upstream-provided score, if the feed already carries one.
    #[serde(default)]
    pub score: Option<f64>,
}

/// An item that has passed identity hashing and enrichment and is ready
/// to be ranked.
#[derive(Debug, Clone)]
pub struct ScorableItem {
    pub story_id: String,
    pub source_id: String,
    pub platform: String,
    pub publish_time: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub channel: String,
    pub category: String,
    pub views: Option<u64>,
    /// Full-precision internal score. Missing scores rank below every
    /// present score; rounding for display happens only at the output
    /// contract boundary.
    pub score: Option<f64>,
}

/// A scorable item with its 1-based rank assigned for this run.
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub item: ScorableItem,
    pub rank: i64,
}

/// Resolution status of a story's image asset for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetStatus {
    /// A valid asset exists on disk and its URL is published.
    #[serde(rename = "ready")]
    Ready,
    /// Generation was not completed this run but may succeed later
    /// (retries exhausted on transient errors, deadline hit, or the
    /// provider is disabled).
    #[serde(rename = "pending")]
    Pending,
    /// The provider rejected the request permanently; retrying within
    /// the run would not help.
    #[serde(rename = "failed")]
    Failed,
    /// The item ranked outside top-N; no generation was attempted.
    #[serde(rename = "n/a")]
    NotApplicable,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Ready => "ready",
            AssetStatus::Pending => "pending",
            AssetStatus::Failed => "failed",
            AssetStatus::NotApplicable => "n/a",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(AssetStatus::Ready),
            "pending" => Ok(AssetStatus::Pending),
            "failed" => Ok(AssetStatus::Failed),
            "n/a" => Ok(AssetStatus::NotApplicable),
            other => Err(format!("unknown asset status: {}", other)),
        }
    }
}

/// One ranked item together with its resolved asset state — the unit of
/// persistence handed to the snapshot writer.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    pub item: RankedItem,
    pub image_status: AssetStatus,
    pub image_url: Option<String>,
    pub image_updated_at: Option<i64>,
}
