//! Source fetcher abstraction.
//!
//! The pipeline treats fetching as an external collaborator: anything that
//! can produce a batch of [`RawItem`]s can drive a run. The built-in
//! [`JsonFeedFetcher`] reads a JSON file that an upstream collector has
//! already written, which keeps the pipeline itself free of source-API
//! credentials and rate limits.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::models::RawItem;

/// A source of raw content items for one run.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetcher identifier for logs and summaries.
    fn name(&self) -> &str;

    /// Produce the full batch for this run. The pipeline materializes the
    /// result before ranking; nothing downstream runs incrementally.
    async fn fetch(&self) -> Result<Vec<RawItem>>;
}

/// Reads a batch from a JSON file containing an array of raw items.
pub struct JsonFeedFetcher {
    path: PathBuf,
}

impl JsonFeedFetcher {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SourceFetcher for JsonFeedFetcher {
    fn name(&self) -> &str {
        "json-feed"
    }

    async fn fetch(&self) -> Result<Vec<RawItem>> {
        if !self.path.exists() {
            bail!("feed file does not exist: {}", self.path.display());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading feed file {}", self.path.display()))?;
        let items: Vec<RawItem> = serde_json::from_str(&content)
            .with_context(|| format!("parsing feed file {}", self.path.display()))?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reads_a_json_array_of_items() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(
            &path,
            r#"[
                {"source_id": "v1", "platform": "youtube",
                 "publish_time": "2026-08-01T12:00:00Z", "title": "one",
                 "views": 1000},
                {"source_id": "v2", "platform": "youtube",
                 "publish_time": "2026-08-02T12:00:00Z", "title": "two"}
            ]"#,
        )
        .unwrap();

        let items = JsonFeedFetcher::new(path).fetch().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_id, "v1");
        assert_eq!(items[0].views, Some(1000));
        assert_eq!(items[1].views, None);
    }

    #[tokio::test]
    async fn missing_feed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let fetcher = JsonFeedFetcher::new(dir.path().join("nope.json"));
        assert!(fetcher.fetch().await.is_err());
    }

    #[tokio::test]
    async fn malformed_feed_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(JsonFeedFetcher::new(path).fetch().await.is_err());
    }
}
