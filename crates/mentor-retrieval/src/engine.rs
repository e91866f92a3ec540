//! Query-time retrieval over a persisted snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mentor_core::{DocSnippet, MentorConfig, MentorError, TextChunk};
use mentor_index::embedding::{self, EmbeddingModel};
use mentor_index::{load_snapshot, LoadedSnapshot};
use tokio::sync::OnceCell;

use crate::ranking::{score_candidates, RankingPolicy, ScoredCandidate};
use crate::tokens::extract_api_tokens;

const FALLBACK_TITLE: &str = "documentation";

/// Parameters of one retrieval request.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub query_text: String,
    pub top_k: usize,
    /// User code whose API tokens boost matching chunks.
    pub code_text: Option<String>,
}

impl QueryContext {
    pub fn new(query_text: impl Into<String>, top_k: usize) -> Self {
        Self {
            query_text: query_text.into(),
            top_k,
            code_text: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code_text = Some(code.into());
        self
    }
}

/// Hybrid search over a snapshot directory.
///
/// The snapshot is read from disk on the first search and then shared
/// read-only by all later searches on this engine. Concurrent first searches
/// wait for a single load.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mentor_index::HashEmbedder;
/// use mentor_retrieval::RetrievalEngine;
///
/// # async fn example() {
/// let engine = RetrievalEngine::new(
///     "data/vectorstore",
///     Arc::new(HashEmbedder::new(256).unwrap()),
/// );
/// let snippets = engine.search("ordinary least squares", 5, None).await.unwrap();
/// for s in &snippets {
///     println!("{:.3} {}", s.score, s.title);
/// }
/// # }
/// ```
pub struct RetrievalEngine {
    snapshot_dir: PathBuf,
    model: Arc<dyn EmbeddingModel>,
    policy: RankingPolicy,
    snapshot: OnceCell<Arc<LoadedSnapshot>>,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("snapshot_dir", &self.snapshot_dir)
            .field("model", &self.model.model())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl RetrievalEngine {
    /// Create an engine with the default ranking policy. Nothing is loaded yet.
    pub fn new(snapshot_dir: impl Into<PathBuf>, model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            model,
            policy: RankingPolicy::default(),
            snapshot: OnceCell::new(),
        }
    }

    /// Create an engine from configuration: snapshot under
    /// `paths.data_dir/vectorstore`, model from `[embedding]`, policy from
    /// `[retrieval]`.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Config`] if the embedding model cannot be built.
    pub fn from_config(config: &MentorConfig) -> Result<Self, MentorError> {
        let model = embedding::from_config(&config.embedding)?;
        Ok(Self::new(config.paths.vectorstore_dir(), model)
            .with_policy(RankingPolicy::from(&config.retrieval)))
    }

    pub fn with_policy(mut self, policy: RankingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.initialized()
    }

    /// Drop the cached snapshot so the next search reads it from disk again.
    pub fn invalidate(&mut self) {
        self.snapshot.take();
    }

    /// Load the snapshot if this engine has not loaded it yet.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::SnapshotNotFound`] if an artifact is missing,
    /// or the error from reading a malformed artifact. A failed load is not
    /// cached; the next call tries again.
    pub async fn ensure_loaded(&self) -> Result<Arc<LoadedSnapshot>, MentorError> {
        let snapshot = self
            .snapshot
            .get_or_try_init(|| async {
                let dir = self.snapshot_dir.clone();
                let loaded = tokio::task::spawn_blocking(move || load_snapshot(&dir))
                    .await
                    .map_err(|e| MentorError::Io(std::io::Error::other(e)))??;
                Ok::<_, MentorError>(Arc::new(loaded))
            })
            .await?;
        Ok(Arc::clone(snapshot))
    }

    /// Return up to `top_k` snippets for `query_text`, boosted by API tokens
    /// found in `code_text`.
    ///
    /// `top_k == 0` returns immediately without loading or embedding.
    ///
    /// # Errors
    ///
    /// Propagates snapshot load and embedding errors unchanged.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        code_text: Option<&str>,
    ) -> Result<Vec<DocSnippet>, MentorError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let snapshot = self.ensure_loaded().await?;
        let query = self.model.embed_query(query_text).await?;
        let tokens = code_text.map(extract_api_tokens).unwrap_or_default();

        let pool = self.policy.candidate_pool(top_k, snapshot.index.len());
        let hits = snapshot.index.search(&query, pool)?;
        let mut ranked = score_candidates(&self.policy, &hits, &snapshot.metadata, &tokens);
        ranked.truncate(top_k);

        tracing::debug!(
            candidates = hits.len(),
            returned = ranked.len(),
            tokens = tokens.len(),
            "search complete"
        );

        let boosted = !tokens.is_empty();
        Ok(ranked
            .iter()
            .filter_map(|c| {
                snapshot
                    .metadata
                    .get(c.index)
                    .map(|chunk| to_snippet(chunk, c, boosted))
            })
            .collect())
    }

    /// [`search`](Self::search) taking a [`QueryContext`].
    pub async fn search_context(&self, ctx: &QueryContext) -> Result<Vec<DocSnippet>, MentorError> {
        self.search(&ctx.query_text, ctx.top_k, ctx.code_text.as_deref())
            .await
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn to_snippet(chunk: &TextChunk, candidate: &ScoredCandidate, boosted: bool) -> DocSnippet {
    let title = chunk
        .title
        .as_deref()
        .and_then(non_empty)
        .or_else(|| non_empty(&chunk.source))
        .or_else(|| non_empty(&chunk.url))
        .unwrap_or(FALLBACK_TITLE)
        .to_string();

    DocSnippet {
        id: non_empty(&chunk.id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("chunk-{}", candidate.index)),
        title,
        url: non_empty(&chunk.url).map(str::to_string),
        text: chunk.text.clone(),
        score: if boosted {
            candidate.final_score
        } else {
            candidate.semantic_score
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> ScoredCandidate {
        ScoredCandidate {
            index: 0,
            semantic_score: 0.8,
            keyword_score: 0.1,
            url_boost: 0.0,
            final_score: 0.62,
        }
    }

    #[test]
    fn title_falls_back_to_source_then_url() {
        let chunk = TextChunk::new("linear_model", "https://example.org/lm", 0, "text");
        assert_eq!(to_snippet(&chunk, &candidate(), false).title, "linear_model");

        let chunk = TextChunk::new("", "https://example.org/lm", 0, "text");
        assert_eq!(
            to_snippet(&chunk, &candidate(), false).title,
            "https://example.org/lm"
        );

        let chunk = TextChunk::new("", "", 0, "text");
        let snippet = to_snippet(&chunk, &candidate(), false);
        assert_eq!(snippet.title, "documentation");
        assert_eq!(snippet.url, None);
    }

    #[test]
    fn blank_id_falls_back_to_position() {
        let mut chunk = TextChunk::new("lm", "https://example.org/lm", 0, "text");
        chunk.id.clear();
        let mut hit = candidate();
        hit.index = 7;
        assert_eq!(to_snippet(&chunk, &hit, false).id, "chunk-7");
    }

    #[test]
    fn explicit_title_wins() {
        let chunk = TextChunk::new("lm", "https://example.org/lm", 0, "text")
            .with_title(Some("Linear Models".into()));
        assert_eq!(to_snippet(&chunk, &candidate(), false).title, "Linear Models");
    }

    #[test]
    fn score_depends_on_boosting() {
        let chunk = TextChunk::new("lm", "https://example.org/lm", 0, "text");
        assert_eq!(to_snippet(&chunk, &candidate(), false).score, 0.8);
        assert_eq!(to_snippet(&chunk, &candidate(), true).score, 0.62);
    }

    #[test]
    fn query_context_builder() {
        let ctx = QueryContext::new("pipelines", 3).with_code("make_pipeline()");
        assert_eq!(ctx.top_k, 3);
        assert_eq!(ctx.code_text.as_deref(), Some("make_pipeline()"));
    }
}
