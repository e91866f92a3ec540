use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MentorError;

/// Top-level configuration loaded from `.mentor.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use mentor_core::MentorConfig;
///
/// let config = MentorConfig::default();
/// assert_eq!(config.ingestion.max_chars, 1200);
/// assert_eq!(config.retrieval.default_top_k, 5);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MentorConfig {
    /// Document fetching and chunking settings.
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Hybrid ranking policy.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// On-disk layout of caches, chunk files, and snapshots.
    #[serde(default)]
    pub paths: PathsConfig,
}

impl MentorConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Io`] if the file cannot be read, or
    /// [`MentorError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mentor_core::MentorConfig;
    /// use std::path::Path;
    ///
    /// let config = MentorConfig::from_file(Path::new(".mentor.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, MentorError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use mentor_core::MentorConfig;
    ///
    /// let toml = r#"
    /// [ingestion]
    /// max_chars = 800
    /// overlap = 100
    /// "#;
    /// let config = MentorConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.ingestion.max_chars, 800);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, MentorError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Document fetching and chunking configuration.
///
/// # Examples
///
/// ```
/// use mentor_core::IngestionConfig;
///
/// let config = IngestionConfig::default();
/// assert_eq!(config.overlap, 200);
/// assert_eq!(config.urls.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Documentation pages to fetch.
    #[serde(default = "default_urls")]
    pub urls: Vec<String>,
    /// Chunk window size in characters (default: 1200).
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Characters shared between consecutive windows (default: 200).
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// HTTP timeout per page in seconds (default: 30).
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// User-Agent header sent when fetching.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_urls() -> Vec<String> {
    vec![
        "https://scikit-learn.org/stable/user_guide.html".into(),
        "https://scikit-learn.org/stable/api/index.html".into(),
    ]
}

fn default_max_chars() -> usize {
    1200
}

fn default_overlap() -> usize {
    200
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("mentor/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            urls: default_urls(),
            max_chars: default_max_chars(),
            overlap: default_overlap(),
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Configuration for the embedding provider used at build and query time.
///
/// # Examples
///
/// ```
/// use mentor_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "voyage");
/// assert_eq!(config.batch_size, 32);
/// assert_eq!(config.api_key_env_var(), Some("VOYAGE_API_KEY"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: `"voyage"`, `"openai"`, or `"hash"` (offline).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// API key for the embedding provider.
    pub api_key: Option<String>,
    /// Model name (default: `"voyage-3"`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Custom base URL for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
    /// Embedding dimensions (default: 1024). The `hash` provider uses this
    /// as its bucket count.
    #[serde(default = "default_embedding_dimensions")]
    pub dimensions: usize,
    /// Texts per embedding request (default: 32).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// HTTP timeout per request in seconds (default: 60).
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    /// Environment variable consulted when `api_key` is unset.
    ///
    /// Returns `None` for providers that need no key.
    pub fn api_key_env_var(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "hash" => None,
            "openai" => Some("OPENAI_API_KEY"),
            _ => Some("VOYAGE_API_KEY"),
        }
    }
}

fn default_embedding_provider() -> String {
    "voyage".into()
}

fn default_embedding_model() -> String {
    "voyage-3".into()
}

fn default_embedding_dimensions() -> usize {
    1024
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    60
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: default_embedding_model(),
            base_url: None,
            dimensions: default_embedding_dimensions(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

/// Hybrid ranking policy constants.
///
/// `final = semantic * semantic_weight + keyword * keyword_weight + url * url_weight`,
/// where `keyword = text_hits * keyword_hit_score` and `url = url_hits * url_hit_score`.
///
/// # Examples
///
/// ```
/// use mentor_core::RetrievalConfig;
///
/// let config = RetrievalConfig::default();
/// assert_eq!(config.semantic_weight, 0.75);
/// assert_eq!(config.overfetch_factor, 3);
/// assert_eq!(config.min_candidates, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Results returned when the caller gives no limit (default: 5).
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Weight of the vector similarity (default: 0.75).
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    /// Weight of the text keyword score (default: 0.20).
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Weight of the URL boost (default: 0.05).
    #[serde(default = "default_url_weight")]
    pub url_weight: f64,
    /// Keyword score per token found in the chunk text (default: 0.05).
    #[serde(default = "default_keyword_hit_score")]
    pub keyword_hit_score: f64,
    /// URL boost per token found in the chunk URL (default: 0.10).
    #[serde(default = "default_url_hit_score")]
    pub url_hit_score: f64,
    /// Candidate pool multiplier over `top_k` (default: 3).
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    /// Minimum candidate pool size (default: 10).
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_semantic_weight() -> f64 {
    0.75
}

fn default_keyword_weight() -> f64 {
    0.20
}

fn default_url_weight() -> f64 {
    0.05
}

fn default_keyword_hit_score() -> f64 {
    0.05
}

fn default_url_hit_score() -> f64 {
    0.10
}

fn default_overfetch_factor() -> usize {
    3
}

fn default_min_candidates() -> usize {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            url_weight: default_url_weight(),
            keyword_hit_score: default_keyword_hit_score(),
            url_hit_score: default_url_hit_score(),
            overfetch_factor: default_overfetch_factor(),
            min_candidates: default_min_candidates(),
        }
    }
}

/// On-disk layout rooted at `data_dir`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use mentor_core::PathsConfig;
///
/// let paths = PathsConfig::default();
/// assert_eq!(paths.chunks_file(), Path::new("data/text/doc_chunks.jsonl"));
/// assert_eq!(paths.vectorstore_dir(), Path::new("data/vectorstore"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory for all pipeline artifacts (default: `data`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl PathsConfig {
    /// SQLite cache of fetched raw pages.
    pub fn raw_cache_db(&self) -> PathBuf {
        self.data_dir.join("raw").join("cache.db")
    }

    /// Chunks file written by ingestion and read by the index builder.
    pub fn chunks_file(&self) -> PathBuf {
        self.data_dir.join("text").join("doc_chunks.jsonl")
    }

    /// Directory holding the persisted snapshot.
    pub fn vectorstore_dir(&self) -> PathBuf {
        self.data_dir.join("vectorstore")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = MentorConfig::default();
        assert_eq!(config.ingestion.max_chars, 1200);
        assert_eq!(config.ingestion.overlap, 200);
        assert_eq!(config.ingestion.timeout_secs, 30);
        assert_eq!(config.embedding.provider, "voyage");
        assert_eq!(config.embedding.model, "voyage-3");
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.retrieval.default_top_k, 5);
        assert_eq!(config.retrieval.keyword_weight, 0.20);
        assert_eq!(config.retrieval.url_weight, 0.05);
        assert_eq!(config.retrieval.keyword_hit_score, 0.05);
        assert_eq!(config.retrieval.url_hit_score, 0.10);
        assert_eq!(config.paths.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[ingestion]
max_chars = 500
overlap = 50
"#;
        let config = MentorConfig::from_toml(toml).unwrap();
        assert_eq!(config.ingestion.max_chars, 500);
        assert_eq!(config.ingestion.overlap, 50);
        assert_eq!(config.ingestion.urls.len(), 2);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[ingestion]
urls = ["https://docs.rs/serde/latest/serde/"]
timeout_secs = 10

[embedding]
provider = "openai"
model = "text-embedding-3-small"
base_url = "http://localhost:11434/v1"
dimensions = 1536
batch_size = 16

[retrieval]
default_top_k = 8
semantic_weight = 0.6
overfetch_factor = 4

[paths]
data_dir = "/var/lib/mentor"
"#;
        let config = MentorConfig::from_toml(toml).unwrap();
        assert_eq!(config.ingestion.urls, vec!["https://docs.rs/serde/latest/serde/"]);
        assert_eq!(config.ingestion.timeout_secs, 10);
        assert_eq!(config.embedding.provider, "openai");
        assert_eq!(config.embedding.api_key_env_var(), Some("OPENAI_API_KEY"));
        assert_eq!(
            config.embedding.base_url.as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert_eq!(config.embedding.batch_size, 16);
        assert_eq!(config.retrieval.default_top_k, 8);
        assert_eq!(config.retrieval.semantic_weight, 0.6);
        assert_eq!(config.retrieval.keyword_weight, 0.20);
        assert_eq!(config.retrieval.overfetch_factor, 4);
        assert_eq!(
            config.paths.vectorstore_dir(),
            PathBuf::from("/var/lib/mentor/vectorstore")
        );
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = MentorConfig::from_toml("").unwrap();
        assert_eq!(config.ingestion.max_chars, 1200);
        assert_eq!(config.embedding.model, "voyage-3");
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = MentorConfig::from_toml("{{invalid}}");
        assert!(result.is_err());
    }

    #[test]
    fn hash_provider_needs_no_key() {
        let config = EmbeddingConfig {
            provider: "hash".into(),
            ..EmbeddingConfig::default()
        };
        assert_eq!(config.api_key_env_var(), None);
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mentor.toml");
        std::fs::write(&path, "[retrieval]\ndefault_top_k = 3\n").unwrap();
        let config = MentorConfig::from_file(&path).unwrap();
        assert_eq!(config.retrieval.default_top_k, 3);
    }
}
