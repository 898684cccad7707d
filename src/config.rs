use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub feed: FeedConfig,
    pub assets: AssetsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetsConfig {
    pub dir: PathBuf,
    /// Base URL under which committed assets are reachable by consumers.
    pub url_prefix: String,
    /// Size floor for a valid asset; guards against zero-byte and
    /// truncated writes.
    #[serde(default = "default_min_bytes")]
    pub min_bytes: u64,
}

fn default_min_bytes() -> u64 {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Number of highest-ranked items eligible for asset generation.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Parallel asset generations across distinct story ids.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Overall run deadline; in-flight generations past it resolve as pending.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn default_top_n() -> usize {
    10
}
fn default_concurrency() -> usize {
    4
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_deadline_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            size: default_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_size() -> String {
    "1024x1024".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    90
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.pipeline.concurrency == 0 {
        anyhow::bail!("pipeline.concurrency must be >= 1");
    }
    if config.pipeline.deadline_secs == 0 {
        anyhow::bail!("pipeline.deadline_secs must be >= 1");
    }
    if config.assets.min_bytes == 0 {
        anyhow::bail!("assets.min_bytes must be >= 1");
    }
    if config.assets.url_prefix.trim().is_empty() {
        anyhow::bail!("assets.url_prefix must not be empty");
    }
    if config.retention.days == 0 {
        anyhow::bail!("retention.days must be >= 1");
    }

    match config.image.provider.as_str() {
        "disabled" | "stub" | "openai" => {}
        other => anyhow::bail!(
            "Unknown image provider: '{}'. Must be disabled, stub, or openai.",
            other
        ),
    }

    Ok(config)
}
