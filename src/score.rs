//! Built-in enrichment: raw item → scorable item.
//!
//! A pure function mapping a raw feed entry plus its computed identity to a
//! [`ScorableItem`]. When the upstream feed already carries a score it wins;
//! otherwise a log-scaled engagement heuristic fills in. The heuristic is
//! deliberately a function of the item's fields alone (no wall-clock input),
//! so byte-identical feeds always produce byte-identical output contracts.
//! Items with no engagement signal at all stay unscored and rank below
//! everything scored; recency is already the third ranking key, so it is
//! not folded into the score.

use chrono::{DateTime, Utc};

use crate::models::{RawItem, ScorableItem};

/// Enrich one raw item into its scorable form.
///
/// `story_id` and `publish_time` come from the hashing stage, which has
/// already validated them.
pub fn enrich(raw: &RawItem, story_id: String, publish_time: DateTime<Utc>) -> ScorableItem {
    let score = raw.score.or_else(|| engagement_score(raw));

    ScorableItem {
        story_id,
        source_id: raw.source_id.clone(),
        platform: raw.platform.clone(),
        publish_time,
        title: raw.title.clone(),
        description: raw.description.clone(),
        channel: raw.channel.clone(),
        category: raw.category.clone(),
        views: raw.views,
        score,
    }
}

/// Log-scaled engagement. Comments weigh more than likes, likes more
/// than views.
fn engagement_score(raw: &RawItem) -> Option<f64> {
    if raw.views.is_none() && raw.likes.is_none() && raw.comments.is_none() {
        return None;
    }

    let views = raw.views.unwrap_or(0) as f64;
    let likes = raw.likes.unwrap_or(0) as f64;
    let comments = raw.comments.unwrap_or(0) as f64;

    Some((1.0 + views).ln() + 2.0 * (1.0 + likes).ln() + 3.0 * (1.0 + comments).ln())
}
