//! Deterministic batch ranking.
//!
//! Produces a total order over one run's batch with a fixed multi-key
//! comparator. Each key only breaks ties left by the previous one:
//!
//! 1. internal score, descending (full `f64` precision, `total_cmp`)
//! 2. view count, descending
//! 3. publish time, descending (newer wins)
//! 4. story id, ascending
//!
//! The final key makes the order exhaustive: even a batch where every
//! numeric signal is exactly equal ranks deterministically. Missing scores
//! and view counts sort as the lowest possible value for their key, never
//! as zero.

use std::cmp::Ordering;

use crate::models::{RankedItem, ScorableItem};

/// Sort a materialized batch and assign 1-based ranks.
///
/// Pure transformation: the output order depends only on the items'
/// contents, not on the input order (all ties are broken down to the
/// unique story id).
pub fn rank_items(mut items: Vec<ScorableItem>) -> Vec<RankedItem> {
    items.sort_by(compare);
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| RankedItem {
            item,
            rank: (i + 1) as i64,
        })
        .collect()
}

fn compare(a: &ScorableItem, b: &ScorableItem) -> Ordering {
    sort_score(b)
        .total_cmp(&sort_score(a))
        .then_with(|| b.views.cmp(&a.views))
        .then_with(|| b.publish_time.cmp(&a.publish_time))
        .then_with(|| a.story_id.cmp(&b.story_id))
}

/// Score as used for ordering: missing or NaN scores sort below every
/// real value.
fn sort_score(item: &ScorableItem) -> f64 {
    item.score
        .filter(|s| !s.is_nan())
        .unwrap_or(f64::NEG_INFINITY)
}
