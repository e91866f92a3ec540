//! Embedding, vector indexing, and snapshot persistence for mentor.
//!
//! [`IndexBuilder`] embeds a chunk list with an [`EmbeddingModel`], builds a
//! [`FlatIpIndex`](vector::FlatIpIndex) and persists the result as a snapshot
//! directory. [`load_snapshot`] reads it back for retrieval.

pub mod builder;
pub mod embedding;
pub mod npy;
pub mod snapshot;
pub mod vector;

pub use builder::{BuildStats, IndexBuilder};
pub use embedding::{EmbeddingClient, EmbeddingModel, HashEmbedder};
pub use snapshot::{
    load_snapshot, verify_snapshot, IndexSnapshot, LoadedSnapshot, SnapshotManifest,
    SnapshotReport,
};
