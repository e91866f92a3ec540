//! Hybrid documentation retrieval for mentor.
//!
//! [`RetrievalEngine`] embeds a query, pulls nearest neighbours from the
//! snapshot's vector index and re-ranks them with lexical hits on API tokens
//! extracted from the user's code.

pub mod engine;
pub mod ranking;
pub mod tokens;

pub use engine::{QueryContext, RetrievalEngine};
pub use ranking::{RankingPolicy, ScoredCandidate};
pub use tokens::{extract_api_tokens, TokenExtractor};
