//! TOML configuration.
//!
//! Every section except `[db]` may be omitted; missing keys fall back to the
//! defaults below. [`load_config`] validates the chunking parameters after
//! parsing.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ragrag_core::backoff::BackoffPolicy;
use ragrag_core::chunk::{ChunkerConfig, DEFAULT_OVERLAP_FRACTION, DEFAULT_TARGET_SIZE};

/// Env var holding an optional Semantic Scholar API key.
pub const API_KEY_ENV: &str = "SEMANTIC_SCHOLAR_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_size")]
    pub target_size: usize,
    #[serde(default = "default_overlap_fraction")]
    pub overlap_fraction: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
            overlap_fraction: DEFAULT_OVERLAP_FRACTION,
        }
    }
}

impl ChunkingConfig {
    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig::new(self.target_size, self.overlap_fraction)
    }
}

fn default_target_size() -> usize {
    DEFAULT_TARGET_SIZE
}
fn default_overlap_fraction() -> f64 {
    DEFAULT_OVERLAP_FRACTION
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("./corpus")
}

fn default_include_globs() -> Vec<String> {
    ["md", "markdown", "html", "htm", "txt", "pdf"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_pdf_base")]
    pub pdf_base: String,
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "default_papers_per_topic")]
    pub papers_per_topic: usize,
    #[serde(default = "default_discovery_min_citations")]
    pub min_citations: u64,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            pdf_base: default_pdf_base(),
            topics: default_topics(),
            papers_per_topic: default_papers_per_topic(),
            min_citations: default_discovery_min_citations(),
            request_delay_ms: default_request_delay_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DiscoveryConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
    }
}

fn default_api_base() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}
fn default_pdf_base() -> String {
    "https://arxiv.org/pdf".to_string()
}
fn default_topics() -> Vec<String> {
    [
        "retrieval augmented generation",
        "dense passage retrieval",
        "vector database embedding",
        "chunking strategies NLP",
        "RAG evaluation metrics",
        "hybrid search retrieval",
        "reranking cross encoder",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}
fn default_papers_per_topic() -> usize {
    5
}
fn default_discovery_min_citations() -> u64 {
    50
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpgradeConfig {
    #[serde(default = "default_upgrade_min_citations")]
    pub min_citations: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_papers_dir")]
    pub papers_dir: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            min_citations: default_upgrade_min_citations(),
            batch_size: default_batch_size(),
            papers_dir: default_papers_dir(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_upgrade_min_citations() -> u64 {
    100
}
fn default_batch_size() -> usize {
    5
}
fn default_papers_dir() -> PathBuf {
    PathBuf::from("./corpus/papers")
}
fn default_concurrency() -> usize {
    2
}

impl Config {
    /// All defaults, with the database at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            corpus: CorpusConfig::default(),
            discovery: DiscoveryConfig::default(),
            upgrade: UpgradeConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.target_size == 0 {
            bail!("chunking.target_size must be > 0");
        }
        if !(0.0..1.0).contains(&self.chunking.overlap_fraction) {
            bail!("chunking.overlap_fraction must be in [0.0, 1.0)");
        }
        if self.upgrade.concurrency == 0 {
            bail!("upgrade.concurrency must be >= 1");
        }
        if self.discovery.max_retries == 0 {
            bail!("discovery.max_retries must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
