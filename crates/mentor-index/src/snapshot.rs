//! Snapshot persistence: the four files that make up a searchable index.
//!
//! A snapshot directory holds:
//! - `doc_embeddings.npy`: `(N, D)` float32 vectors
//! - `doc_metadata.jsonl`: one [`TextChunk`] per line, aligned with the vectors
//! - `doc_index.flatip`: the [`FlatIpIndex`] over the same vectors
//! - `manifest.json`: a [`SnapshotManifest`] written after everything else
//!
//! [`IndexSnapshot::persist`] stages all artifacts before publishing any of
//! them, so a failed write leaves the previous snapshot in place.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use mentor_core::jsonl::{self, stage_file, write_atomic};
use mentor_core::{MentorError, TextChunk};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::npy;
use crate::vector::FlatIpIndex;

pub const EMBEDDINGS_FILE: &str = "doc_embeddings.npy";
pub const METADATA_FILE: &str = "doc_metadata.jsonl";
pub const INDEX_FILE: &str = "doc_index.flatip";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Current snapshot format version recorded in the manifest.
pub const FORMAT_VERSION: u32 = 1;

/// Paths of the artifacts inside a snapshot directory.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub embeddings: PathBuf,
    pub metadata: PathBuf,
    pub index: PathBuf,
    pub manifest: PathBuf,
}

impl SnapshotPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            embeddings: dir.join(EMBEDDINGS_FILE),
            metadata: dir.join(METADATA_FILE),
            index: dir.join(INDEX_FILE),
            manifest: dir.join(MANIFEST_FILE),
        }
    }

    /// The first required artifact that does not exist, if any.
    ///
    /// The manifest is optional; snapshots without one still load.
    pub fn first_missing(&self) -> Option<&Path> {
        [&self.embeddings, &self.metadata, &self.index]
            .into_iter()
            .find(|p| !p.exists())
            .map(PathBuf::as_path)
    }
}

/// Build information written alongside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub model: String,
    pub dimensions: usize,
    pub count: usize,
    /// Hex SHA-256 of `doc_metadata.jsonl`.
    pub metadata_sha256: String,
    /// RFC 3339 build timestamp.
    pub built_at: String,
}

/// An in-memory snapshot produced by [`IndexBuilder`](crate::IndexBuilder).
///
/// `vectors[i]`, `metadata[i]` and index position `i` describe the same chunk.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub vectors: Vec<Vec<f32>>,
    pub metadata: Vec<TextChunk>,
    pub index: FlatIpIndex,
    pub model: String,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dims()
    }

    /// Write all artifacts into `dir`, replacing any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError`] if any artifact fails to serialize or write.
    /// Staged files are removed on failure and nothing is published.
    pub fn persist(&self, dir: &Path) -> Result<SnapshotManifest, MentorError> {
        let paths = SnapshotPaths::new(dir);
        let dims = self.dimensions();

        let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(3);
        let result = (|| {
            let tmp = stage_file(&paths.embeddings, |out| {
                npy::write_f32_matrix(out, &self.vectors, dims)
            })?;
            staged.push((tmp, paths.embeddings.as_path()));

            let mut hasher = Sha256::new();
            let tmp = stage_file(&paths.metadata, |out| {
                for chunk in &self.metadata {
                    let mut line = serde_json::to_vec(chunk)?;
                    line.push(b'\n');
                    hasher.update(&line);
                    out.write_all(&line)?;
                }
                Ok(())
            })?;
            staged.push((tmp, paths.metadata.as_path()));

            let tmp = stage_file(&paths.index, |out| self.index.write_to(out))?;
            staged.push((tmp, paths.index.as_path()));

            Ok::<_, MentorError>(format!("{:x}", hasher.finalize()))
        })();

        let metadata_sha256 = match result {
            Ok(hash) => hash,
            Err(e) => {
                for (tmp, _) in &staged {
                    let _ = std::fs::remove_file(tmp);
                }
                return Err(e);
            }
        };

        for (tmp, target) in &staged {
            std::fs::rename(tmp, target)?;
        }

        let manifest = SnapshotManifest {
            format_version: FORMAT_VERSION,
            model: self.model.clone(),
            dimensions: dims,
            count: self.len(),
            metadata_sha256,
            built_at: chrono::Utc::now().to_rfc3339(),
        };
        write_atomic(&paths.manifest, |out| {
            serde_json::to_writer_pretty(&mut *out, &manifest)?;
            out.write_all(b"\n")?;
            Ok(())
        })?;

        tracing::info!(
            dir = %dir.display(),
            count = manifest.count,
            dimensions = dims,
            "snapshot persisted"
        );
        Ok(manifest)
    }
}

/// A snapshot loaded for querying.
#[derive(Debug)]
pub struct LoadedSnapshot {
    pub index: FlatIpIndex,
    pub metadata: Vec<TextChunk>,
    pub manifest: Option<SnapshotManifest>,
}

impl LoadedSnapshot {
    /// Whether index and metadata have the same number of entries.
    pub fn is_aligned(&self) -> bool {
        self.index.len() == self.metadata.len()
    }
}

/// Load the index, metadata and (if present) manifest from `dir`.
///
/// A count mismatch between index and metadata is logged and tolerated;
/// callers skip index positions without metadata.
///
/// # Errors
///
/// Returns [`MentorError::SnapshotNotFound`] naming the first missing
/// artifact, or [`MentorError::Index`] / [`MentorError::Serialization`] for
/// malformed files.
pub fn load_snapshot(dir: &Path) -> Result<LoadedSnapshot, MentorError> {
    let paths = SnapshotPaths::new(dir);
    if let Some(missing) = paths.first_missing() {
        return Err(MentorError::SnapshotNotFound(missing.to_path_buf()));
    }

    let metadata: Vec<TextChunk> = jsonl::read_jsonl(&paths.metadata)?;
    let index = FlatIpIndex::read_from(&mut BufReader::new(File::open(&paths.index)?))?;
    let manifest = read_manifest(&paths.manifest)?;

    let snapshot = LoadedSnapshot {
        index,
        metadata,
        manifest,
    };
    if !snapshot.is_aligned() {
        tracing::warn!(
            vectors = snapshot.index.len(),
            metadata = snapshot.metadata.len(),
            "snapshot index and metadata counts differ; unmatched positions will be skipped"
        );
    }
    tracing::info!(
        dir = %dir.display(),
        count = snapshot.metadata.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}

fn read_manifest(path: &Path) -> Result<Option<SnapshotManifest>, MentorError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Result of [`verify_snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotReport {
    pub embeddings: usize,
    pub metadata: usize,
    pub index: usize,
    pub dimensions: usize,
    pub manifest: Option<SnapshotManifest>,
    /// `false` if the manifest hash differs from the metadata on disk.
    pub metadata_hash_ok: bool,
}

impl SnapshotReport {
    /// All artifacts agree on count and dimensions, and the manifest (if any)
    /// matches the files on disk.
    pub fn is_consistent(&self) -> bool {
        let counts = self.embeddings == self.metadata && self.index == self.metadata;
        let manifest = self
            .manifest
            .as_ref()
            .map(|m| m.count == self.metadata && m.dimensions == self.dimensions)
            .unwrap_or(true);
        counts && manifest && self.metadata_hash_ok
    }
}

/// Read every artifact in `dir` and compare counts, dimensions and hashes.
///
/// # Errors
///
/// Same as [`load_snapshot`], plus [`MentorError::Index`] for a malformed
/// `.npy` file.
pub fn verify_snapshot(dir: &Path) -> Result<SnapshotReport, MentorError> {
    let paths = SnapshotPaths::new(dir);
    let loaded = load_snapshot(dir)?;
    let matrix = npy::read_f32_matrix(&mut BufReader::new(File::open(&paths.embeddings)?))?;

    let metadata_hash_ok = match &loaded.manifest {
        Some(manifest) => {
            let bytes = std::fs::read(&paths.metadata)?;
            format!("{:x}", Sha256::digest(&bytes)) == manifest.metadata_sha256
        }
        None => true,
    };

    let dimensions = if matrix.rows > 0 {
        matrix.cols
    } else {
        loaded.index.dims()
    };
    Ok(SnapshotReport {
        embeddings: matrix.rows,
        metadata: loaded.metadata.len(),
        index: loaded.index.len(),
        dimensions,
        manifest: loaded.manifest,
        metadata_hash_ok,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> IndexSnapshot {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let mut index = FlatIpIndex::new(2);
        for v in &vectors {
            index.add(v).unwrap();
        }
        IndexSnapshot {
            vectors,
            metadata: vec![
                TextChunk::new("linear_model", "https://example.org/lm", 0, "LinearRegression fits"),
                TextChunk::new("linear_model", "https://example.org/lm", 1, "Ridge adds a penalty"),
            ],
            index,
            model: "hash-2".into(),
        }
    }

    #[test]
    fn persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = snapshot().persist(dir.path()).unwrap();
        assert_eq!(manifest.count, 2);
        assert_eq!(manifest.dimensions, 2);
        assert_eq!(manifest.model, "hash-2");

        let loaded = load_snapshot(dir.path()).unwrap();
        assert!(loaded.is_aligned());
        assert_eq!(loaded.metadata[1].id, "linear_model__1");
        assert_eq!(loaded.manifest, Some(manifest));

        for name in [EMBEDDINGS_FILE, METADATA_FILE, INDEX_FILE, MANIFEST_FILE] {
            assert!(dir.path().join(name).exists(), "{name} missing");
            assert!(!jsonl::temp_path(&dir.path().join(name)).exists());
        }
    }

    #[test]
    fn verify_reports_consistent_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        snapshot().persist(dir.path()).unwrap();
        let report = verify_snapshot(dir.path()).unwrap();
        assert_eq!(report.embeddings, 2);
        assert_eq!(report.index, 2);
        assert_eq!(report.dimensions, 2);
        assert!(report.is_consistent());
    }

    #[test]
    fn verify_detects_edited_metadata() {
        let dir = tempfile::tempdir().unwrap();
        snapshot().persist(dir.path()).unwrap();
        let path = dir.path().join(METADATA_FILE);
        let mut text = std::fs::read_to_string(&path).unwrap();
        text = text.replace("Ridge", "Lasso");
        std::fs::write(&path, text).unwrap();

        let report = verify_snapshot(dir.path()).unwrap();
        assert!(!report.metadata_hash_ok);
        assert!(!report.is_consistent());
    }

    #[test]
    fn missing_artifact_is_snapshot_not_found() {
        let dir = tempfile::tempdir().unwrap();
        snapshot().persist(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();

        match load_snapshot(dir.path()) {
            Err(MentorError::SnapshotNotFound(path)) => assert!(path.ends_with(INDEX_FILE)),
            other => panic!("expected SnapshotNotFound, got {other:?}"),
        }
    }

    #[test]
    fn load_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        snapshot().persist(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();
        let loaded = load_snapshot(dir.path()).unwrap();
        assert!(loaded.manifest.is_none());
        assert_eq!(loaded.index.len(), 2);
    }

    #[test]
    fn misaligned_snapshot_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mut snap = snapshot();
        snap.metadata.pop();
        snap.persist(dir.path()).unwrap();

        let loaded = load_snapshot(dir.path()).unwrap();
        assert!(!loaded.is_aligned());
        assert!(!verify_snapshot(dir.path()).unwrap().is_consistent());
    }

    #[test]
    fn failed_persist_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        snapshot().persist(dir.path()).unwrap();
        let before = std::fs::read(dir.path().join(METADATA_FILE)).unwrap();

        let mut broken = snapshot();
        broken.vectors[1] = vec![1.0];
        assert!(broken.persist(dir.path()).is_err());

        assert_eq!(std::fs::read(dir.path().join(METADATA_FILE)).unwrap(), before);
        assert!(!jsonl::temp_path(&dir.path().join(EMBEDDINGS_FILE)).exists());
        assert!(load_snapshot(dir.path()).unwrap().is_aligned());
    }
}
