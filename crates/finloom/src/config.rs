//! Configuration loaded from YAML with environment overlays.
//!
//! Secrets (User-Agent contact, API keys, graph password) are never read
//! from the YAML file; they come from environment variables applied on top
//! of the parsed file.

use crate::error::{FinloomError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Archive (ingestion) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Descriptive User-Agent sent on every request (required, env `FINLOOM_USER_AGENT`)
    pub user_agent: String,
    /// Steady-state request rate per second
    pub rate_per_second: f64,
    /// Burst capacity (tokens)
    pub burst: f64,
    /// Floor the adaptive rate never drops below
    pub min_rate: f64,
    /// Bounded retry count for transient statuses
    pub max_retries: u32,
    /// Initial backoff in milliseconds
    pub backoff_initial_ms: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Timeout for raw document streams in seconds
    pub stream_timeout_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            rate_per_second: 8.0,
            burst: 16.0,
            min_rate: 1.0,
            max_retries: 5,
            backoff_initial_ms: 1000,
            timeout_secs: 30,
            stream_timeout_secs: 60,
        }
    }
}

/// One roster entry: a company the pipeline tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    /// CIK, padded or unpadded
    pub cik: String,
    /// Ticker symbol
    pub ticker: String,
    /// Company name
    pub name: String,
}

/// Filing year range to ingest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct YearRange {
    /// First filing year (inclusive)
    pub start: i32,
    /// Last filing year (inclusive)
    pub end: i32,
}

impl Default for YearRange {
    fn default() -> Self {
        Self { start: 2015, end: 2025 }
    }
}

/// Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root for raw downloaded filings
    pub raw_data_root: PathBuf,
    /// Embedded analytical database file
    pub db_path: PathBuf,
    /// Per-company download checkpoints
    pub checkpoint_dir: PathBuf,
    /// Long-running job progress files (embeddings, pseudo-queries)
    pub progress_dir: PathBuf,
    /// Built artifacts (passage graph blob)
    pub artifact_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_data_root: PathBuf::from("data/raw"),
            db_path: PathBuf::from("data/db/finloom.db"),
            checkpoint_dir: PathBuf::from("data/checkpoints"),
            progress_dir: PathBuf::from("data/progress"),
            artifact_dir: PathBuf::from("data/artifacts"),
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Endpoint URL
    pub url: String,
    /// Collection name
    pub collection: String,
    /// Embedding dimensionality
    pub dimension: u64,
    /// Upsert batch size
    pub batch_size: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection: "filing_chunks".to_string(),
            dimension: 1024,
            batch_size: 100,
        }
    }
}

/// Keyword index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// On-disk index directory
    pub index_dir: PathBuf,
    /// Document batch size per commit
    pub batch_size: usize,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("data/keyword_index"),
            batch_size: 1000,
        }
    }
}

/// Knowledge-graph store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Embedded graph database file
    pub db_path: PathBuf,
    /// Optional password for remote graph deployments (env `FINLOOM_GRAPH_PASSWORD`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Relationship write batch size
    pub batch_size: usize,
    /// Minimum members for a community to be summarized
    pub min_community_members: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/db/finloom_graph.db"),
            password: None,
            batch_size: 500,
            min_community_members: 3,
        }
    }
}

/// Chat-LLM provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// API key (env `FINLOOM_LLM_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Bounded retry count
    pub max_retries: u32,
    /// Concurrency bound for batched extraction jobs
    pub max_concurrency: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            max_retries: 3,
            max_concurrency: 20,
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// API key (env `FINLOOM_EMBEDDINGS_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Vector dimensionality
    pub dimension: usize,
    /// Texts per request
    pub batch_size: usize,
    /// Bounded retry count
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.voyageai.com/v1".to_string(),
            model: "voyage-3".to_string(),
            api_key: None,
            dimension: 1024,
            batch_size: 100,
            max_retries: 3,
        }
    }
}

/// Optional reranker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    /// Provider base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// API key (env `FINLOOM_RERANK_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.jina.ai/v1".to_string(),
            model: "jina-reranker-v2-base-multilingual".to_string(),
            api_key: None,
        }
    }
}

/// Section extraction thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    /// Default minimum words for a section to score full confidence
    pub min_words: usize,
    /// Confidence multiplier when below the minimum word count
    pub short_penalty: f64,
    /// Confidence multiplier when content was truncated at `max_chars`
    pub truncation_penalty: f64,
    /// Candidates below `candidacy_threshold * min_words` are discarded
    pub candidacy_threshold: f64,
    /// Hard cap on section content length
    pub max_chars: usize,
}

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            min_words: 100,
            short_penalty: 0.8,
            truncation_penalty: 0.8,
            candidacy_threshold: 0.1,
            max_chars: 500_000,
        }
    }
}

/// Chunking sizes (tokens).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size
    pub target_tokens: usize,
    /// Minimum chunk size
    pub min_tokens: usize,
    /// Maximum chunk size
    pub max_tokens: usize,
    /// Overlap between consecutive chunks
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 750,
            min_tokens: 500,
            max_tokens: 1000,
            overlap_tokens: 100,
        }
    }
}

/// Multi-hop retrieval knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HopConfig {
    /// Default hop budget for complex queries
    pub default_max_hops: u32,
    /// Seed retrieval budget
    pub initial_top_k: usize,
    /// Neighbors considered per seed
    pub neighbors_per_seed: usize,
    /// Candidate cap per hop
    pub max_candidates_per_hop: usize,
    /// Passages kept per hop after pruning
    pub keep_per_hop: usize,
    /// Edges below this weight are not traversed
    pub min_edge_weight: f64,
    /// Score decay per hop
    pub hop_decay: f64,
    /// Pseudo-query edges retained per node
    pub pseudo_query_max_per_node: usize,
    /// Similarity floor for pseudo-query edges
    pub pseudo_query_min_similarity: f64,
}

impl Default for HopConfig {
    fn default() -> Self {
        Self {
            default_max_hops: 2,
            initial_top_k: 10,
            neighbors_per_seed: 15,
            max_candidates_per_hop: 30,
            keep_per_hop: 5,
            min_edge_weight: 0.4,
            hop_decay: 0.85,
            pseudo_query_max_per_node: 10,
            pseudo_query_min_similarity: 0.60,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FinloomConfig {
    /// Archive/ingestion settings
    pub archive: ArchiveConfig,
    /// Tracked companies
    pub roster: Vec<RosterEntry>,
    /// Filing year range
    pub years: YearRange,
    /// Filesystem layout
    pub paths: PathsConfig,
    /// Vector index
    pub vector: VectorConfig,
    /// Keyword index
    pub keyword: KeywordConfig,
    /// Knowledge graph
    pub graph: GraphConfig,
    /// Chat LLM
    pub llm: LlmConfig,
    /// Embeddings
    pub embeddings: EmbeddingConfig,
    /// Optional reranker
    pub rerank: Option<RerankConfig>,
    /// Section extraction thresholds
    pub sections: SectionConfig,
    /// Chunking sizes
    pub chunking: ChunkingConfig,
    /// Multi-hop retrieval knobs
    pub hoprag: HopConfig,
}

impl FinloomConfig {
    /// Load configuration from a YAML file, then apply environment overlays.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the file cannot be parsed and
    /// `MissingConfig` when the archive User-Agent is absent after overlays.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| FinloomError::InvalidConfig(e.to_string()))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration entirely from defaults + environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay well-known environment variables onto the parsed file.
    pub fn apply_env(&mut self) {
        if let Ok(ua) = std::env::var("FINLOOM_USER_AGENT") {
            self.archive.user_agent = ua;
        }
        if let Ok(key) = std::env::var("FINLOOM_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("FINLOOM_EMBEDDINGS_API_KEY") {
            self.embeddings.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("FINLOOM_RERANK_API_KEY") {
            if let Some(rerank) = self.rerank.as_mut() {
                rerank.api_key = Some(key);
            }
        }
        if let Ok(pw) = std::env::var("FINLOOM_GRAPH_PASSWORD") {
            self.graph.password = Some(pw);
        }
    }

    /// Check required keys.
    pub fn validate(&self) -> Result<()> {
        if self.archive.user_agent.trim().is_empty() {
            return Err(FinloomError::MissingConfig(
                "archive.user_agent (set FINLOOM_USER_AGENT)".to_string(),
            ));
        }
        if self.years.start > self.years.end {
            return Err(FinloomError::InvalidConfig(format!(
                "year range start {} is after end {}",
                self.years.start, self.years.end
            )));
        }
        Ok(())
    }
}
