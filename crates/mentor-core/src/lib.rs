//! Core types, configuration, and error handling for the mentor pipeline.
//!
//! This crate provides the shared foundation used by all other mentor crates:
//! - [`MentorError`]: unified error type using `thiserror`
//! - [`MentorConfig`]: configuration loaded from `.mentor.toml`
//! - Shared types: [`RawDocument`], [`TextChunk`], [`DocSnippet`], [`OutputFormat`]
//! - [`jsonl`]: newline-delimited JSON readers and atomic writers

mod config;
mod error;
pub mod jsonl;
mod types;

pub use config::{
    EmbeddingConfig, IngestionConfig, MentorConfig, PathsConfig, RetrievalConfig,
};
pub use error::MentorError;
pub use types::{DocSnippet, OutputFormat, RawDocument, TextChunk};

/// A convenience `Result` type for mentor operations.
pub type Result<T> = std::result::Result<T, MentorError>;
