//! Document ingestion: fetch, cache, clean, and chunk documentation pages.
//!
//! The output of this crate is the chunks file, one [`TextChunk`] per line,
//! which the index builder consumes.

pub mod cache;
pub mod chunker;
pub mod clean;
pub mod fetch;

use std::collections::HashSet;
use std::path::PathBuf;

use mentor_core::{MentorConfig, MentorError, RawDocument, TextChunk};
use tracing::{info, warn};

use crate::cache::DocCache;
use crate::chunker::{chunk_document, ChunkParams};
use crate::clean::clean_html;
use crate::fetch::{source_id_for, Fetcher};

/// Per-page ingestion outcome.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SourceReport {
    /// Page URL.
    pub url: String,
    /// Source id used as the chunk id prefix.
    pub source_id: String,
    /// Chunks produced from the page.
    pub chunks: usize,
    /// Whether the page came from the cache instead of the network.
    pub cached: bool,
    /// Whether the cached body changed during this run.
    pub changed: bool,
}

/// Summary of an ingestion run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReport {
    /// One entry per configured URL, in configuration order.
    pub sources: Vec<SourceReport>,
    /// Total chunks written.
    pub total_chunks: usize,
    /// Where the chunks were written.
    pub chunks_file: PathBuf,
}

/// Return the cached page for `url`, fetching and caching it on a miss.
///
/// The boolean is `true` when the page was served from the cache.
///
/// # Errors
///
/// Returns [`MentorError::Fetch`] or [`MentorError::Database`].
pub async fn load_or_fetch(
    cache: &DocCache,
    fetcher: &Fetcher,
    url: &str,
) -> Result<(RawDocument, bool), MentorError> {
    let source_id = source_id_for(url);
    if let Some(doc) = cache.get(&source_id)? {
        info!(url, "using cached page");
        return Ok((doc, true));
    }

    let doc = fetcher.fetch(url).await?;
    cache.put(&doc)?;
    Ok((doc, false))
}

/// Refetch `url` and update the cache if the page body changed.
///
/// The boolean is `true` when the cached bytes changed, including the
/// first time a page is cached.
///
/// # Errors
///
/// Returns [`MentorError::Fetch`] or [`MentorError::Database`].
pub async fn refetch(
    cache: &DocCache,
    fetcher: &Fetcher,
    url: &str,
) -> Result<(RawDocument, bool), MentorError> {
    let doc = fetcher.fetch(url).await?;
    let changed = cache.replace(&doc)?;
    if changed {
        info!(url, "page content changed");
    }
    Ok((doc, changed))
}

/// Clean and chunk one raw page.
///
/// # Examples
///
/// ```
/// use mentor_core::RawDocument;
/// use mentor_ingest::chunker::ChunkParams;
/// use mentor_ingest::chunk_page;
///
/// let doc = RawDocument {
///     source_id: "example.com_guide".into(),
///     url: "https://example.com/guide".into(),
///     bytes: b"<title>Guide</title><body><p>fit a LinearRegression model</p></body>".to_vec(),
/// };
/// let chunks = chunk_page(&doc, ChunkParams::new(1200, 200).unwrap());
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].id, "example.com_guide__0");
/// assert_eq!(chunks[0].text, "fit a LinearRegression model");
/// ```
pub fn chunk_page(doc: &RawDocument, params: ChunkParams) -> Vec<TextChunk> {
    let page = clean_html(&doc.bytes);
    chunk_document(
        &doc.source_id,
        &doc.url,
        &page.text,
        page.title.as_deref(),
        params,
    )
}

/// Run ingestion for every configured URL and write the chunks file.
///
/// Chunking parameters are validated before any page is fetched. With
/// `refresh`, every page is downloaded again and cached copies whose body
/// changed are replaced. URLs that map to an already seen source id are
/// skipped. A fetch failure aborts the run; pages fetched so far stay cached.
///
/// # Errors
///
/// Returns [`MentorError::Config`] for invalid chunking settings, or any
/// fetch, cache, or I/O error.
pub async fn ingest(config: &MentorConfig, refresh: bool) -> Result<IngestReport, MentorError> {
    let params = ChunkParams::from_config(&config.ingestion)?;
    if config.ingestion.urls.is_empty() {
        warn!("no ingestion URLs configured");
    }

    let cache = DocCache::open(&config.paths.raw_cache_db())?;
    let fetcher = Fetcher::new(&config.ingestion)?;

    let mut all_chunks = Vec::new();
    let mut sources = Vec::with_capacity(config.ingestion.urls.len());
    let mut seen = HashSet::new();
    for url in &config.ingestion.urls {
        if !seen.insert(source_id_for(url)) {
            warn!(url = %url, "skipping duplicate source");
            continue;
        }

        let (doc, cached, changed) = if refresh {
            let (doc, changed) = refetch(&cache, &fetcher, url).await?;
            (doc, false, changed)
        } else {
            let (doc, cached) = load_or_fetch(&cache, &fetcher, url).await?;
            (doc, cached, !cached)
        };
        let chunks = chunk_page(&doc, params);
        info!(url = %url, chunks = chunks.len(), "chunked page");

        sources.push(SourceReport {
            url: url.clone(),
            source_id: doc.source_id.clone(),
            chunks: chunks.len(),
            cached,
            changed,
        });
        all_chunks.extend(chunks);
    }

    let chunks_file = config.paths.chunks_file();
    mentor_core::jsonl::write_jsonl(&chunks_file, &all_chunks)?;
    info!(
        total = all_chunks.len(),
        path = %chunks_file.display(),
        "wrote chunks file"
    );

    Ok(IngestReport {
        sources,
        total_chunks: all_chunks.len(),
        chunks_file,
    })
}
