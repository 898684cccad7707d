//! Durable per-story image assets.
//!
//! Assets are keyed by `story_id`, never by rank, and live at a
//! deterministic path under the configured assets directory. A valid asset
//! is immutable: the store never deletes or overwrites it once validation
//! passes, across any number of runs, no matter how the story's rank moves.
//! Regeneration happens only when the asset is missing or invalid, or when
//! an operator explicitly forces it.
//!
//! Writes follow a write-then-validate-then-commit pattern: bytes land in a
//! temp file, are validated there, and are renamed into place only after
//! passing. A failed generation attempt can therefore never corrupt the
//! asset namespace.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::generate::{GenerateError, ImageProvider};
use crate::models::AssetStatus;

/// Retry configuration for generation attempts.
///
/// A value object rather than hard-coded constants so tests can run with
/// zero delays. One initial attempt plus `max_retries` retries; the delay
/// before retry `n` (1-based) is `base_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        // Cap the shift so a large retry count cannot overflow.
        self.base_delay * 2u32.saturating_pow(retry.min(16))
    }
}

/// Outcome of resolving one story's asset.
#[derive(Debug, Clone)]
pub struct AssetResolution {
    pub status: AssetStatus,
    pub url: Option<String>,
    /// Unix seconds of the asset file's last modification, when ready.
    pub updated_at: Option<i64>,
    /// Operator-visible reason for a pending/failed outcome.
    pub detail: Option<String>,
}

impl AssetResolution {
    fn ready(url: String, updated_at: Option<i64>) -> Self {
        Self {
            status: AssetStatus::Ready,
            url: Some(url),
            updated_at,
            detail: None,
        }
    }

    fn pending(detail: impl Into<String>) -> Self {
        Self {
            status: AssetStatus::Pending,
            url: None,
            updated_at: None,
            detail: Some(detail.into()),
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: AssetStatus::Failed,
            url: None,
            updated_at: None,
            detail: Some(detail.into()),
        }
    }
}

/// Validates, persists, and retries generation of per-story image assets.
pub struct AssetStore {
    dir: PathBuf,
    url_prefix: String,
    min_bytes: u64,
    retry: RetryPolicy,
    provider: Box<dyn ImageProvider>,
    /// One async mutex per story id: at most one generation attempt may be
    /// in flight per asset key. This is the only shared mutable state in
    /// the pipeline that needs application-level locking.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AssetStore {
    pub fn new(
        dir: PathBuf,
        url_prefix: String,
        min_bytes: u64,
        retry: RetryPolicy,
        provider: Box<dyn ImageProvider>,
    ) -> Self {
        Self {
            dir,
            url_prefix,
            min_bytes,
            retry,
            provider,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Filesystem path for a story's asset.
    pub fn asset_path(&self, story_id: &str) -> PathBuf {
        self.dir.join(format!("{}.png", story_id))
    }

    /// Public URL for a story's asset.
    pub fn asset_url(&self, story_id: &str) -> String {
        format!("{}/{}.png", self.url_prefix.trim_end_matches('/'), story_id)
    }

    /// Ensure a valid asset exists for `story_id`, generating one if needed.
    ///
    /// - A valid existing asset short-circuits to `Ready` with no write,
    ///   unless `force_regenerate` is set.
    /// - Transient provider errors are retried per the [`RetryPolicy`];
    ///   exhausted retries resolve as `Pending`.
    /// - Permanent provider errors resolve as `Failed` without retry.
    /// - A `deadline` in the past, or one that would be crossed by the next
    ///   backoff sleep, resolves as `Pending` (the condition clears on a
    ///   later run).
    ///
    /// Concurrent callers for the same `story_id` serialize on a per-key
    /// lock; the waiter observes the winner's committed asset and returns
    /// `Ready` without a duplicate generation.
    pub async fn ensure_asset(
        &self,
        story_id: &str,
        prompt: &str,
        force_regenerate: bool,
        deadline: Option<Instant>,
    ) -> Result<AssetResolution> {
        let key_lock = self.lock_for(story_id);
        let _guard = key_lock.lock().await;

        let path = self.asset_path(story_id);

        if !force_regenerate && self.is_valid_file(&path) {
            debug!(story_id, "asset already valid, skipping generation");
            return Ok(AssetResolution::ready(
                self.asset_url(story_id),
                file_mtime(&path),
            ));
        }

        if !self.provider.is_enabled() {
            return Ok(AssetResolution::pending(format!(
                "image provider '{}' is disabled",
                self.provider.name()
            )));
        }

        let mut retries = 0u32;
        let mut last_err: Option<String> = None;

        loop {
            if deadline_passed(deadline) {
                return Ok(self.abandoned(story_id, force_regenerate, "run deadline exceeded"));
            }

            match self.provider.generate(prompt).await {
                Ok(bytes) => {
                    if self.validate_bytes(&bytes) {
                        self.commit(&path, &bytes)
                            .with_context(|| format!("committing asset for {}", story_id))?;
                        debug!(story_id, bytes = bytes.len(), "asset generated");
                        return Ok(AssetResolution::ready(
                            self.asset_url(story_id),
                            file_mtime(&path),
                        ));
                    }
                    warn!(
                        story_id,
                        bytes = bytes.len(),
                        "provider returned an invalid image payload"
                    );
                    last_err = Some("provider returned an invalid image payload".to_string());
                }
                Err(GenerateError::Permanent(msg)) => {
                    warn!(story_id, error = %msg, "permanent generation error, not retrying");
                    if force_regenerate && self.is_valid_file(&path) {
                        // Forced refresh failed but the old asset is intact.
                        return Ok(AssetResolution::ready(
                            self.asset_url(story_id),
                            file_mtime(&path),
                        ));
                    }
                    return Ok(AssetResolution::failed(msg));
                }
                Err(GenerateError::Transient(msg)) => {
                    warn!(story_id, retries, error = %msg, "transient generation error");
                    last_err = Some(msg);
                }
            }

            if retries >= self.retry.max_retries {
                let detail = last_err.unwrap_or_else(|| "generation retries exhausted".to_string());
                return Ok(self.abandoned(story_id, force_regenerate, detail));
            }
            let delay = self.retry.delay_for(retries);
            if let Some(d) = deadline {
                if Instant::now() + delay >= d {
                    return Ok(self.abandoned(
                        story_id,
                        force_regenerate,
                        "run deadline exceeded during backoff",
                    ));
                }
            }
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }

    /// Outcome when generation was abandoned on a transient condition.
    /// A forced refresh that still has a valid asset on disk stays `Ready`.
    fn abandoned(
        &self,
        story_id: &str,
        force_regenerate: bool,
        detail: impl Into<String>,
    ) -> AssetResolution {
        if force_regenerate && self.is_valid_file(&self.asset_path(story_id)) {
            return AssetResolution::ready(self.asset_url(story_id), file_mtime(&self.asset_path(story_id)));
        }
        AssetResolution::pending(detail)
    }

    /// Derived validity: exists, above the size floor, carries an image
    /// container magic.
    pub fn is_valid_file(&self, path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        if !meta.is_file() || meta.len() < self.min_bytes {
            return false;
        }
        match std::fs::read(path) {
            Ok(bytes) => has_image_magic(&bytes),
            Err(_) => false,
        }
    }

    fn validate_bytes(&self, bytes: &[u8]) -> bool {
        bytes.len() as u64 >= self.min_bytes && has_image_magic(bytes)
    }

    /// Write bytes to a temp file, re-validate on disk, then rename into
    /// place. The final rename is the commit point.
    fn commit(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating assets dir {}", self.dir.display()))?;

        let tmp = self.dir.join(format!(".tmp-{}", Uuid::new_v4()));
        std::fs::write(&tmp, bytes)?;

        if !self.is_valid_file(&tmp) {
            let _ = std::fs::remove_file(&tmp);
            anyhow::bail!("asset failed post-write validation");
        }

        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn lock_for(&self, story_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("asset lock map poisoned");
        locks
            .entry(story_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// PNG or JPEG container magic.
fn has_image_magic(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
        || bytes.starts_with(&[0xFF, 0xD8, 0xFF])
}

fn file_mtime(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_secs() as i64)
}
