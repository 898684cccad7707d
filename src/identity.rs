//! Stable story identity derivation.
//!
//! A story's canonical id is a SHA-256 over its immutable source attributes
//! (`source_id`, `platform`, `publish_time`). Re-ingesting the same item from
//! an unreliable upstream feed therefore converges on the same identity
//! without any lookup table, and descriptive-field changes never move a
//! story to a new id.

use anyhow::{bail, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Field separator for the canonical concatenation. Explicit separators
/// prevent ambiguous-concatenation collisions (`"ab" + "c"` vs `"a" + "bc"`),
/// so the separator must not appear inside any hashed field.
const FIELD_SEP: char = '|';

/// Compute the canonical story id for one content item.
///
/// The hash input is `source_id|platform|<publish_time as RFC 3339 UTC>`.
/// The result is a 64-character lowercase hex string.
///
/// # Errors
///
/// Fails fast instead of silently hashing a degenerate value:
/// - empty `source_id` or `platform`,
/// - a field containing the `|` separator,
/// - an epoch-zero or pre-epoch `publish_time` (the usual sentinel left
///   behind by an upstream parse failure).
pub fn compute_story_id(
    source_id: &str,
    platform: &str,
    publish_time: DateTime<Utc>,
) -> Result<String> {
    if source_id.is_empty() {
        bail!("source_id must not be empty");
    }
    if platform.is_empty() {
        bail!("platform must not be empty");
    }
    if source_id.contains(FIELD_SEP) || platform.contains(FIELD_SEP) {
        bail!(
            "identity fields must not contain '{}': source_id={:?} platform={:?}",
            FIELD_SEP,
            source_id,
            platform
        );
    }
    if publish_time.timestamp() <= 0 {
        bail!(
            "publish_time {} looks like an unparsed sentinel; refusing to hash it",
            publish_time.to_rfc3339()
        );
    }

    let canonical = format!(
        "{}{sep}{}{sep}{}",
        source_id,
        platform,
        publish_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        sep = FIELD_SEP,
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
