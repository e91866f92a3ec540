//! Lexical extraction of API identifiers from user code.
//!
//! This is a heuristic, not a parser: it picks up imported modules, imported
//! names, call targets and dotted identifiers, and accepts both false
//! positives and misses.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Tokens shorter than this are discarded.
const MIN_TOKEN_CHARS: usize = 3;

/// Compiled patterns applied in order to the input code.
#[derive(Debug)]
pub struct TokenExtractor {
    patterns: Vec<Regex>,
    separators: Regex,
}

static DEFAULT_EXTRACTOR: OnceLock<TokenExtractor> = OnceLock::new();

impl TokenExtractor {
    pub fn new() -> Self {
        let patterns = [
            r"from\s+([\w\.]+)\s+import\s+([\w\*, ]+)",
            r"import\s+([\w\.]+)",
            r"([\w\.]+)\(",
            r"\b([\w\.]+)\b",
        ]
        .into_iter()
        .map(|p| Regex::new(p).expect("static token pattern is valid"))
        .collect();
        Self {
            patterns,
            separators: Regex::new(r"[\s,\.\(\)\[\]]+").expect("static separator pattern is valid"),
        }
    }

    /// Shared extractor, compiled on first use.
    pub fn global() -> &'static TokenExtractor {
        DEFAULT_EXTRACTOR.get_or_init(TokenExtractor::new)
    }

    /// Collect candidate API tokens from `code`.
    ///
    /// Every capture group of every pattern is split on whitespace, commas,
    /// dots, parentheses and brackets; pieces longer than two characters are
    /// kept.
    pub fn extract(&self, code: &str) -> HashSet<String> {
        let mut found = HashSet::new();
        for pattern in &self.patterns {
            for caps in pattern.captures_iter(code) {
                for group in caps.iter().skip(1).flatten() {
                    for piece in self.separators.split(group.as_str()) {
                        let piece = piece.trim();
                        if piece.chars().count() >= MIN_TOKEN_CHARS {
                            found.insert(piece.to_string());
                        }
                    }
                }
            }
        }
        found
    }
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract candidate API tokens from `code` with the shared extractor.
///
/// # Examples
///
/// ```
/// use mentor_retrieval::extract_api_tokens;
///
/// let tokens = extract_api_tokens(
///     "from sklearn.linear_model import LinearRegression\nmodel = LinearRegression()",
/// );
/// assert!(tokens.contains("sklearn"));
/// assert!(tokens.contains("linear_model"));
/// assert!(tokens.contains("LinearRegression"));
/// assert!(!tokens.contains("from"));
/// ```
pub fn extract_api_tokens(code: &str) -> HashSet<String> {
    TokenExtractor::global().extract(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_code_has_no_tokens() {
        assert!(extract_api_tokens("").is_empty());
        assert!(extract_api_tokens("   \n\t").is_empty());
    }

    #[test]
    fn short_tokens_are_dropped() {
        let tokens = extract_api_tokens("import np as pd\nx = a.b(c)");
        assert!(tokens.contains("import"));
        assert!(!tokens.contains("np"));
        assert!(!tokens.contains("as"));
        assert!(!tokens.contains("x"));
    }

    #[test]
    fn three_character_tokens_are_kept() {
        let tokens = extract_api_tokens("clf = SVC()");
        assert!(tokens.contains("clf"));
        assert!(tokens.contains("SVC"));
    }

    #[test]
    fn multiple_imported_names() {
        let tokens = extract_api_tokens("from sklearn.model_selection import train_test_split, KFold");
        for expected in ["sklearn", "model_selection", "train_test_split", "KFold"] {
            assert!(tokens.contains(expected), "missing {expected}: {tokens:?}");
        }
    }

    #[test]
    fn call_targets_and_attributes() {
        let tokens = extract_api_tokens("clf = make_pipeline(StandardScaler(), SVC())\nclf.fit(X, y)");
        assert!(tokens.contains("make_pipeline"));
        assert!(tokens.contains("StandardScaler"));
        assert!(tokens.contains("SVC"));
        assert!(tokens.contains("clf"));
        assert!(tokens.contains("fit"));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let tokens = extract_api_tokens("ñé = ñéü()");
        assert!(!tokens.contains("ñé"));
        assert!(tokens.contains("ñéü"));
    }

    #[test]
    fn extraction_is_deterministic() {
        let code = "import numpy\nnumpy.linalg.norm(v)";
        assert_eq!(extract_api_tokens(code), extract_api_tokens(code));
    }
}
