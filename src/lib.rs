//! # Trendsnap
//!
//! An idempotent ingestion and snapshot pipeline for trending content.
//!
//! Trendsnap turns a feed of externally sourced content items into a stable,
//! cacheable, rankable dataset with durable generated image assets. Re-running
//! the pipeline is always safe: every write is an idempotent upsert, history
//! is append-only, and a valid asset is never regenerated.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │  Fetcher │──▶│  Pipeline                     │──▶│  SQLite   │
//! │ JSON feed│   │ hash → rank → assets → write │   │ stories   │
//! └──────────┘   └──────────────┬───────────────┘   │ snapshots │
//!                               │                   │ runs      │
//!                               ▼                   └──────────┘
//!                        ┌────────────┐
//!                        │ AssetStore │──▶ <dir>/<story_id>.png
//!                        └────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Stable identity**: `story_id` is a content hash over immutable source
//!   attributes; re-ingestion converges on the same id.
//! - **No historical data loss**: each run appends snapshot rows; nothing is
//!   deleted except by explicit, age-gated pruning.
//! - **Deterministic ranking**: a fixed multi-key comparator with exhaustive
//!   tie-breaks, independent of input order.
//! - **Non-destructive assets**: valid assets are immutable; generation is
//!   retried with backoff only while missing or invalid.
//! - **Cache-safe contract**: `data_version` changes exactly when emitted
//!   content changes.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`identity`] | Stable story id derivation |
//! | [`rank`] | Deterministic batch ranking |
//! | [`generate`] | Image generation providers |
//! | [`assets`] | Durable per-story asset store |
//! | [`snapshot`] | Story/snapshot persistence and pruning |
//! | [`output`] | Versioned run output contract |
//! | [`fetch`] | Source fetcher abstraction |
//! | [`score`] | Enrichment and scoring |
//! | [`pipeline`] | Run orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assets;
pub mod config;
pub mod db;
pub mod fetch;
pub mod generate;
pub mod identity;
pub mod migrate;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod rank;
pub mod score;
pub mod snapshot;
