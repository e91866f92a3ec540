//! Hybrid scoring: blend vector similarity with lexical token hits.

use std::collections::HashSet;

use mentor_core::{RetrievalConfig, TextChunk};

/// Blending weights and candidate pool sizing.
///
/// # Examples
///
/// ```
/// use mentor_retrieval::RankingPolicy;
///
/// let policy = RankingPolicy::default();
/// assert_eq!(policy.candidate_pool(5, 1000), 15);
/// assert_eq!(policy.candidate_pool(1, 1000), 10);
/// assert_eq!(policy.candidate_pool(5, 4), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RankingPolicy {
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub url_weight: f64,
    pub keyword_hit_score: f64,
    pub url_hit_score: f64,
    pub overfetch_factor: usize,
    pub min_candidates: usize,
}

impl From<&RetrievalConfig> for RankingPolicy {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            semantic_weight: config.semantic_weight,
            keyword_weight: config.keyword_weight,
            url_weight: config.url_weight,
            keyword_hit_score: config.keyword_hit_score,
            url_hit_score: config.url_hit_score,
            overfetch_factor: config.overfetch_factor,
            min_candidates: config.min_candidates,
        }
    }
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl RankingPolicy {
    /// Number of nearest neighbours to fetch before re-ranking.
    pub fn candidate_pool(&self, top_k: usize, total: usize) -> usize {
        top_k
            .saturating_mul(self.overfetch_factor)
            .max(self.min_candidates)
            .min(total)
    }

    /// Blend the three component scores.
    pub fn blend(&self, semantic: f64, keyword: f64, url: f64) -> f64 {
        semantic * self.semantic_weight + keyword * self.keyword_weight + url * self.url_weight
    }
}

/// One re-ranked vector search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    /// Index position, also the metadata row.
    pub index: usize,
    pub semantic_score: f64,
    pub keyword_score: f64,
    pub url_boost: f64,
    pub final_score: f64,
}

/// Number of `tokens` found in `haystack`, ignoring case.
///
/// `tokens` must already be lower-cased.
fn count_hits(haystack: &str, tokens: &[String]) -> usize {
    if tokens.is_empty() || haystack.is_empty() {
        return 0;
    }
    let haystack = haystack.to_lowercase();
    tokens.iter().filter(|t| haystack.contains(t.as_str())).count()
}

/// Score vector hits against `metadata` and order them by blended score.
///
/// Hits whose position has no metadata row are dropped. Equal scores keep
/// the vector search order. The result is not truncated.
pub fn score_candidates(
    policy: &RankingPolicy,
    hits: &[(usize, f32)],
    metadata: &[TextChunk],
    tokens: &HashSet<String>,
) -> Vec<ScoredCandidate> {
    let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

    let mut scored: Vec<ScoredCandidate> = hits
        .iter()
        .filter_map(|&(index, semantic)| {
            let chunk = metadata.get(index)?;
            let semantic_score = f64::from(semantic);
            let keyword_score = count_hits(&chunk.text, &lowered) as f64 * policy.keyword_hit_score;
            let url_boost = count_hits(&chunk.url, &lowered) as f64 * policy.url_hit_score;
            Some(ScoredCandidate {
                index,
                semantic_score,
                keyword_score,
                url_boost,
                final_score: policy.blend(semantic_score, keyword_score, url_boost),
            })
        })
        .collect();

    scored.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    scored
}
