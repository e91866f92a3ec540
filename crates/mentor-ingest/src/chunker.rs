//! Overlapping fixed-window text chunking.
//!
//! Windows are measured in characters (Unicode scalar values), so a window
//! boundary never splits a code point. The same `(text, max_chars, overlap)`
//! always yields the same chunk boundaries.

use mentor_core::{IngestionConfig, MentorError, TextChunk};

/// Validated window parameters.
///
/// # Examples
///
/// ```
/// use mentor_ingest::chunker::ChunkParams;
///
/// let params = ChunkParams::new(1200, 200).unwrap();
/// assert_eq!(params.max_chars(), 1200);
/// assert!(ChunkParams::new(100, 100).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_chars: usize,
    overlap: usize,
}

impl ChunkParams {
    /// Validate `max_chars > overlap`.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Config`] when `overlap >= max_chars`, since the
    /// window would never advance.
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self, MentorError> {
        if overlap >= max_chars {
            return Err(MentorError::Config(format!(
                "chunk overlap ({overlap}) must be smaller than max_chars ({max_chars})"
            )));
        }
        Ok(Self { max_chars, overlap })
    }

    /// Read and validate the `[ingestion]` chunking settings.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Config`] for invalid settings.
    pub fn from_config(config: &IngestionConfig) -> Result<Self, MentorError> {
        Self::new(config.max_chars, config.overlap)
    }

    /// Window size in characters.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Characters shared by consecutive windows.
    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

/// Split `text` into overlapping windows of at most `max_chars` characters.
///
/// Each window is trimmed and empty windows are dropped, so a trimmed chunk
/// may be shorter than `max_chars`.
///
/// # Errors
///
/// Returns [`MentorError::Config`] when `overlap >= max_chars`.
///
/// # Examples
///
/// ```
/// use mentor_ingest::chunker::chunk_text;
///
/// let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
/// assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
///
/// assert!(chunk_text("   ", 4, 1).unwrap().is_empty());
/// assert!(chunk_text("abc", 4, 4).is_err());
/// ```
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Result<Vec<String>, MentorError> {
    let params = ChunkParams::new(max_chars, overlap)?;
    Ok(split_windows(text, params))
}

fn split_windows(text: &str, params: ChunkParams) -> Vec<String> {
    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < n {
        let end = (start + params.max_chars).min(n);
        let window = text[bounds[start]..bounds[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        if end >= n {
            break;
        }
        start = end - params.overlap;
    }
    chunks
}

/// Chunk one page's cleaned text into addressable [`TextChunk`]s.
///
/// Chunk ids are `{source_id}__{index}` in window order.
///
/// # Examples
///
/// ```
/// use mentor_ingest::chunker::{chunk_document, ChunkParams};
///
/// let params = ChunkParams::new(10, 2).unwrap();
/// let chunks = chunk_document(
///     "example.com_guide",
///     "https://example.com/guide",
///     "0123456789abcdef",
///     Some("Guide"),
///     params,
/// );
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[1].id, "example.com_guide__1");
/// assert_eq!(chunks[1].title.as_deref(), Some("Guide"));
/// ```
pub fn chunk_document(
    source_id: &str,
    url: &str,
    text: &str,
    title: Option<&str>,
    params: ChunkParams,
) -> Vec<TextChunk> {
    split_windows(text, params)
        .into_iter()
        .enumerate()
        .map(|(i, window)| {
            TextChunk::new(source_id, url, i, window).with_title(title.map(str::to_string))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_equal_to_window_is_rejected() {
        let err = chunk_text("anything", 10, 10).unwrap_err();
        assert!(matches!(err, MentorError::Config(_)));
        assert!(chunk_text("anything", 10, 25).is_err());
        assert!(chunk_text("anything", 0, 0).is_err());
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = chunk_text("  fit a model  ", 1200, 200).unwrap();
        assert_eq!(chunks, vec!["fit a model"]);
    }

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        assert!(chunk_text("", 50, 5).unwrap().is_empty());
        assert!(chunk_text("\n\t   \n", 50, 5).unwrap().is_empty());
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let first = chunk_text(&text, 120, 30).unwrap();
        let second = chunk_text(&text, 120, 30).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_chunk_exceeds_window() {
        let text = "lorem ipsum dolor sit amet ".repeat(100);
        for chunk in chunk_text(&text, 64, 16).unwrap() {
            assert!(chunk.chars().count() <= 64, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn consecutive_windows_share_overlap() {
        let text: String = ('a'..='z').cycle().take(100).collect();
        let chunks = chunk_text(&text, 30, 10).unwrap();
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(pair[0].chars().count() - 10).collect();
            assert!(pair[1].starts_with(&tail), "{:?} / {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn windows_cover_the_whole_text() {
        let text: String = ('a'..='z').cycle().take(257).collect();
        let chunks = chunk_text(&text, 40, 8).unwrap();

        // Drop the overlapping prefix of every chunk after the first.
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(8));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "héllo wörld ünïcode ".repeat(20);
        let chunks = chunk_text(&text, 7, 2).unwrap();
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 7);
        }
    }

    #[test]
    fn zero_overlap_tiles_text() {
        let chunks = chunk_text("aaaabbbbcc", 4, 0).unwrap();
        assert_eq!(chunks, vec!["aaaa", "bbbb", "cc"]);
    }

    #[test]
    fn document_chunks_get_sequential_ids() {
        let params = ChunkParams::new(5, 1).unwrap();
        let chunks = chunk_document("src", "https://u", "abcdefghijklm", None, params);
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["src__0", "src__1", "src__2"]);
        assert!(chunks.iter().all(|c| c.source == "src" && c.url == "https://u"));
    }

    #[test]
    fn params_from_config_validates() {
        let mut config = IngestionConfig::default();
        assert!(ChunkParams::from_config(&config).is_ok());
        config.overlap = config.max_chars;
        assert!(ChunkParams::from_config(&config).is_err());
    }
}
