//! Embedding models: map text to unit-length `f32` vectors.
//!
//! [`EmbeddingClient`] talks to an OpenAI-compatible `/embeddings` endpoint
//! (Voyage AI by default). [`HashEmbedder`] is a deterministic offline model
//! based on signed feature hashing. Both return L2-normalized vectors, so an
//! inner product between two outputs is their cosine similarity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mentor_core::{EmbeddingConfig, MentorError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A text embedding model producing unit-normalized vectors of fixed length.
///
/// Failures are returned as [`MentorError::Embedding`] and are never retried
/// by the pipeline.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Model identifier recorded in the snapshot manifest.
    fn model(&self) -> &str;

    /// Embed documents. Returns one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MentorError>;

    /// Embed a single search query.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, MentorError> {
        self.embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MentorError::Embedding("model returned no vector for query".into()))
    }
}

/// Scale `vector` to unit L2 norm in place. Zero vectors are left unchanged.
///
/// # Examples
///
/// ```
/// use mentor_index::embedding::normalize;
///
/// let mut v = vec![3.0, 4.0];
/// normalize(&mut v);
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// assert!((v[1] - 0.8).abs() < 1e-6);
/// ```
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Build the embedding model selected by `[embedding] provider`.
///
/// # Errors
///
/// Returns [`MentorError::Config`] for an unknown provider, a missing API
/// key, or zero `dimensions` with the `hash` provider.
///
/// # Examples
///
/// ```
/// use mentor_core::EmbeddingConfig;
/// use mentor_index::embedding::from_config;
///
/// let config = EmbeddingConfig {
///     provider: "hash".into(),
///     dimensions: 256,
///     ..EmbeddingConfig::default()
/// };
/// let model = from_config(&config).unwrap();
/// assert_eq!(model.model(), "hash-256");
/// ```
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingModel>, MentorError> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dimensions)?)),
        "voyage" | "openai" => Ok(Arc::new(EmbeddingClient::with_config(config)?)),
        other => Err(MentorError::Config(format!(
            "unknown embedding provider '{other}' (expected voyage, openai, or hash)"
        ))),
    }
}

/// Client for OpenAI-compatible embedding APIs.
///
/// # Examples
///
/// ```
/// use mentor_index::embedding::{EmbeddingClient, EmbeddingModel};
///
/// let client = EmbeddingClient::new("test-key");
/// assert_eq!(client.model(), "voyage-3");
/// ```
pub struct EmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    sends_input_type: bool,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "voyage-3";

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl EmbeddingClient {
    /// Create a Voyage AI client with the given API key.
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: VOYAGE_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            sends_input_type: true,
        }
    }

    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to the provider's env var (`VOYAGE_API_KEY` or
    /// `OPENAI_API_KEY`) if no key is in the config.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Config`] if no API key is available or the HTTP
    /// client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use mentor_core::EmbeddingConfig;
    /// use mentor_index::embedding::{EmbeddingClient, EmbeddingModel};
    ///
    /// let config = EmbeddingConfig {
    ///     provider: "openai".into(),
    ///     model: "text-embedding-3-small".into(),
    ///     api_key: Some("sk-test".into()),
    ///     ..EmbeddingConfig::default()
    /// };
    /// let client = EmbeddingClient::with_config(&config).unwrap();
    /// assert_eq!(client.model(), "text-embedding-3-small");
    /// ```
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, MentorError> {
        let env_var = config.api_key_env_var().unwrap_or("VOYAGE_API_KEY");
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| {
                MentorError::Config(format!(
                    "embedding API key not found: set embedding.api_key in .mentor.toml or {env_var} env var"
                ))
            })?;

        let is_voyage = config.provider == "voyage";
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| {
                if is_voyage {
                    VOYAGE_BASE_URL.to_string()
                } else {
                    OPENAI_BASE_URL.to_string()
                }
            })
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MentorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model: config.model.clone(),
            sends_input_type: is_voyage,
        })
    }

    fn build_request(&self, texts: &[String], input_type: &'static str) -> EmbedRequest {
        EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            input_type: self.sends_input_type.then_some(input_type),
        }
    }

    async fn post(&self, request: &EmbedRequest) -> Result<Vec<Vec<f32>>, MentorError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| MentorError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(MentorError::Embedding(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| MentorError::Embedding(format!("failed to parse response: {e}")))?;

        let vectors = into_ordered_vectors(embed_response, request.input.len())?;
        Ok(vectors)
    }
}

fn into_ordered_vectors(
    response: EmbedResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, MentorError> {
    let mut items = response.data;
    if items.len() != expected {
        return Err(MentorError::Embedding(format!(
            "expected {expected} embeddings, got {}",
            items.len()
        )));
    }
    if items.iter().all(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
    }
    Ok(items
        .into_iter()
        .map(|item| {
            let mut v = item.embedding;
            normalize(&mut v);
            v
        })
        .collect())
}

#[async_trait]
impl EmbeddingModel for EmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MentorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.build_request(texts, "document");
        self.post(&request).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, MentorError> {
        let request = self.build_request(&[query.to_string()], "query");
        self.post(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MentorError::Embedding("empty response from embedding API".into()))
    }
}

/// Offline embedding model using signed feature hashing.
///
/// Each lower-cased word token (`[A-Za-z0-9_]+`) is hashed with SHA-256 into
/// one of `dimensions` buckets with a sign taken from the hash, then the
/// vector is normalized. Texts sharing words get positive similarity; texts
/// sharing none score zero up to bucket collisions.
///
/// # Examples
///
/// ```
/// use mentor_index::embedding::{EmbeddingModel, HashEmbedder};
///
/// # async fn example() {
/// let model = HashEmbedder::new(128).unwrap();
/// let v = model.embed_query("LinearRegression").await.unwrap();
/// assert_eq!(v.len(), 128);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    name: String,
}

impl HashEmbedder {
    /// Create a hashing model with `dimensions` buckets.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Config`] if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Result<Self, MentorError> {
        if dimensions == 0 {
            return Err(MentorError::Config(
                "hash embedding dimensions must be greater than zero".into(),
            ));
        }
        Ok(Self {
            dimensions,
            name: format!("hash-{dimensions}"),
        })
    }

    /// Output vector length.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let words = text
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty());
        for word in words {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let h = u64::from_le_bytes(bytes);
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbedder {
    fn model(&self) -> &str {
        &self.name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MentorError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn voyage_request_carries_input_type() {
        let client = EmbeddingClient::new("test-key");
        let texts = vec!["fit a model".to_string(), "predict".to_string()];
        let request = client.build_request(&texts, "document");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "voyage-3");
        assert_eq!(json["input_type"], "document");
        assert_eq!(json["input"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn openai_request_omits_input_type() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            api_key: Some("sk-test".into()),
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::with_config(&config).unwrap();
        let request = client.build_request(&["q".to_string()], "query");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("input_type").is_none());
        assert_eq!(client.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn custom_base_url_drops_trailing_slash() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            api_key: Some("k".into()),
            base_url: Some("http://localhost:11434/v1/".into()),
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::with_config(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn response_is_reordered_and_normalized() {
        let json = r#"{
            "data": [
                {"embedding": [0.0, 2.0], "index": 1},
                {"embedding": [3.0, 4.0], "index": 0}
            ]
        }"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        let vectors = into_ordered_vectors(response, 2).unwrap();
        assert!((vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((vectors[0][1] - 0.8).abs() < 1e-6);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn response_count_mismatch_is_an_error() {
        let json = r#"{"data": [{"embedding": [1.0]}]}"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        let err = into_ordered_vectors(response, 2).unwrap_err();
        assert!(matches!(err, MentorError::Embedding(_)));
    }

    #[test]
    fn missing_api_key_gives_clear_error() {
        std::env::remove_var("VOYAGE_API_KEY");
        let config = EmbeddingConfig {
            api_key: None,
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingClient::with_config(&config).unwrap_err().to_string();
        assert!(err.contains("API key"), "error should mention API key: {err}");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(from_config(&config), Err(MentorError::Config(_))));
    }

    #[test]
    fn zero_hash_dimensions_rejected() {
        assert!(HashEmbedder::new(0).is_err());
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn hash_vectors_are_unit_length_and_deterministic() {
        let model = HashEmbedder::new(64).unwrap();
        let texts = vec!["train_test_split usage".to_string()];
        let a = model.embed(&texts).await.unwrap();
        let b = model.embed(&texts).await.unwrap();
        assert_eq!(a, b);
        assert!((dot(&a[0], &a[0]) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_similarity_prefers_shared_words() {
        let model = HashEmbedder::new(512).unwrap();
        let query = model.embed_query("LinearRegression").await.unwrap();
        let docs = model
            .embed(&[
                "fit a LinearRegression model".to_string(),
                "unrelated topic".to_string(),
            ])
            .await
            .unwrap();
        assert!(dot(&query, &docs[0]) > dot(&query, &docs[1]));
    }

    #[tokio::test]
    async fn hash_is_case_insensitive() {
        let model = HashEmbedder::new(32).unwrap();
        let a = model.embed_query("Pipeline").await.unwrap();
        let b = model.embed_query("pipeline").await.unwrap();
        assert_eq!(a, b);
    }
}
