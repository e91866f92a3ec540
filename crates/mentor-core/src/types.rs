use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// A fetched documentation page, immutable once cached.
///
/// # Examples
///
/// ```
/// use mentor_core::RawDocument;
///
/// let doc = RawDocument {
///     source_id: "scikit-learn.org_stable_user_guide.html".into(),
///     url: "https://scikit-learn.org/stable/user_guide.html".into(),
///     bytes: b"<html></html>".to_vec(),
/// };
/// assert_eq!(doc.bytes.len(), 13);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Filesystem-safe identifier derived from the URL.
    pub source_id: String,
    /// Where the page was fetched from.
    pub url: String,
    /// Response body as received.
    pub bytes: Vec<u8>,
}

/// One overlapping window of a source document; the unit of retrieval.
///
/// This is also the record shape of the chunks file and of the snapshot
/// metadata file: `{id, url, source, text, title?}`. Missing or `null`
/// string fields read back as empty strings.
///
/// # Examples
///
/// ```
/// use mentor_core::TextChunk;
///
/// let chunk = TextChunk::new("docs_page", "https://example.com/page", 3, "some text");
/// assert_eq!(chunk.id, "docs_page__3");
/// assert!(chunk.title.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Deterministic identifier: `{source}__{sequence_index}`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    /// URL of the page the chunk came from.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    /// Source identifier shared by all chunks of one page.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source: String,
    /// Chunk text, trimmed.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
    /// Page title, when the page declared one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TextChunk {
    /// Build a chunk with an id derived from `source` and `index`.
    pub fn new(source: &str, url: &str, index: usize, text: impl Into<String>) -> Self {
        Self {
            id: chunk_id(source, index),
            url: url.to_string(),
            source: source.to_string(),
            text: text.into(),
            title: None,
        }
    }

    /// Attach a page title.
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn chunk_id(source: &str, index: usize) -> String {
    format!("{source}__{index}")
}

/// A ranked retrieval result handed to downstream consumers.
///
/// `url: None` means "no source link"; consumers must not invent one.
///
/// # Examples
///
/// ```
/// use mentor_core::DocSnippet;
///
/// let snippet = DocSnippet {
///     id: "guide__0".into(),
///     title: "User Guide".into(),
///     url: None,
///     text: "fit a LinearRegression model".into(),
///     score: 0.81,
/// };
/// let json = serde_json::to_value(&snippet).unwrap();
/// assert!(json["url"].is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSnippet {
    /// Chunk identifier, copied from metadata.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Source link, if known.
    pub url: Option<String>,
    /// Chunk text, copied from metadata.
    pub text: String,
    /// Blended score when lexical boosting applied, raw similarity otherwise.
    pub score: f64,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use mentor_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
