//! Turn a chunk list into an [`IndexSnapshot`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mentor_core::{jsonl, MentorError, TextChunk};

use crate::embedding::EmbeddingModel;
use crate::snapshot::{IndexSnapshot, SnapshotManifest};
use crate::vector::FlatIpIndex;

/// Default number of texts per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Summary of a [`IndexBuilder::build_from_file`] run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildStats {
    pub chunks: usize,
    pub dimensions: usize,
    pub output_dir: PathBuf,
    pub manifest: SnapshotManifest,
}

type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Embeds chunks in batches and assembles the vector index.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use mentor_core::TextChunk;
/// use mentor_index::embedding::HashEmbedder;
/// use mentor_index::IndexBuilder;
///
/// # async fn example() {
/// let builder = IndexBuilder::new(Arc::new(HashEmbedder::new(64).unwrap()));
/// let chunks = vec![TextChunk::new("lm", "https://example.org/lm", 0, "LinearRegression")];
/// let snapshot = builder.build(chunks).await.unwrap();
/// assert_eq!(snapshot.len(), 1);
/// assert_eq!(snapshot.dimensions(), 64);
/// # }
/// ```
pub struct IndexBuilder {
    model: Arc<dyn EmbeddingModel>,
    batch_size: usize,
    progress: Option<Box<ProgressFn>>,
}

impl IndexBuilder {
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            model,
            batch_size: DEFAULT_BATCH_SIZE,
            progress: None,
        }
    }

    /// Set the embedding batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Call `progress(done, total)` after each embedded batch.
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Embed `chunks` and build the in-memory snapshot.
    ///
    /// An empty chunk list produces an empty snapshot with zero dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Index`] on a duplicate chunk id, and
    /// [`MentorError::Embedding`] if the model fails, returns the wrong number
    /// of vectors, or returns vectors of differing lengths.
    pub async fn build(&self, chunks: Vec<TextChunk>) -> Result<IndexSnapshot, MentorError> {
        check_unique_ids(&chunks)?;

        let total = chunks.len();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);
        let mut dims: Option<usize> = None;

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.model.embed(&texts).await?;
            if embedded.len() != batch.len() {
                return Err(MentorError::Embedding(format!(
                    "batch {batch_no}: model returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            for vector in embedded {
                let expected = *dims.get_or_insert(vector.len());
                if vector.len() != expected {
                    return Err(MentorError::Embedding(format!(
                        "model returned mixed dimensionalities: {} and {expected}",
                        vector.len()
                    )));
                }
                vectors.push(vector);
            }
            tracing::debug!(batch = batch_no, done = vectors.len(), total, "embedded batch");
            if let Some(progress) = &self.progress {
                progress(vectors.len(), total);
            }
        }

        let mut index = FlatIpIndex::new(dims.unwrap_or(0));
        for vector in &vectors {
            index.add(vector)?;
        }

        Ok(IndexSnapshot {
            vectors,
            metadata: chunks,
            index,
            model: self.model.model().to_string(),
        })
    }

    /// Read chunks from a JSONL file, build, and persist into `out_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::InputNotFound`] before any embedding work if
    /// `chunks_path` does not exist; otherwise as [`build`](Self::build) and
    /// [`IndexSnapshot::persist`].
    pub async fn build_from_file(
        &self,
        chunks_path: &Path,
        out_dir: &Path,
    ) -> Result<BuildStats, MentorError> {
        if !chunks_path.exists() {
            return Err(MentorError::InputNotFound(chunks_path.to_path_buf()));
        }
        let chunks: Vec<TextChunk> = jsonl::read_jsonl(chunks_path)?;
        tracing::info!(
            chunks = chunks.len(),
            model = self.model.model(),
            input = %chunks_path.display(),
            "building index"
        );

        let snapshot = self.build(chunks).await?;
        let manifest = snapshot.persist(out_dir)?;

        Ok(BuildStats {
            chunks: snapshot.len(),
            dimensions: snapshot.dimensions(),
            output_dir: out_dir.to_path_buf(),
            manifest,
        })
    }
}

fn check_unique_ids(chunks: &[TextChunk]) -> Result<(), MentorError> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        if !seen.insert(chunk.id.as_str()) {
            return Err(MentorError::Index(format!("duplicate chunk id '{}'", chunk.id)));
        }
    }
    Ok(())
}
