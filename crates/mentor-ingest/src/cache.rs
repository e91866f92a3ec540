//! SQLite cache of fetched raw pages.
//!
//! A page is fetched once; later ingestion runs read it back from the cache
//! instead of hitting the network. Cached bodies are never rewritten in place.

use std::path::Path;

use mentor_core::{MentorError, RawDocument};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};

/// Cache statistics.
///
/// # Examples
///
/// ```
/// use mentor_ingest::cache::CacheStats;
///
/// let stats = CacheStats { documents: 2, total_bytes: 4096 };
/// assert_eq!(stats.documents, 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached pages.
    pub documents: usize,
    /// Sum of cached body sizes.
    pub total_bytes: u64,
}

/// Raw page cache backed by SQLite.
///
/// # Examples
///
/// ```
/// use mentor_ingest::cache::DocCache;
///
/// let cache = DocCache::in_memory().unwrap();
/// assert_eq!(cache.stats().unwrap().documents, 0);
/// ```
pub struct DocCache {
    conn: Connection,
}

impl DocCache {
    /// Open or create a cache database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Database`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use mentor_ingest::cache::DocCache;
    ///
    /// let cache = DocCache::open(Path::new("data/raw/cache.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self, MentorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MentorError::Database(format!("failed to create cache directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MentorError::Database(format!("failed to open database: {e}")))?;

        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, MentorError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            MentorError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), MentorError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS documents (
                    source_id TEXT PRIMARY KEY,
                    url TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    fetched_at TEXT NOT NULL,
                    body BLOB NOT NULL
                );
                ",
            )
            .map_err(|e| MentorError::Database(format!("failed to create schema: {e}")))?;

        Ok(())
    }

    /// Look up a cached page.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Database`] on query failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use mentor_core::RawDocument;
    /// use mentor_ingest::cache::DocCache;
    ///
    /// let cache = DocCache::in_memory().unwrap();
    /// let doc = RawDocument {
    ///     source_id: "example.com_index.html".into(),
    ///     url: "https://example.com/index.html".into(),
    ///     bytes: b"<p>hi</p>".to_vec(),
    /// };
    /// cache.put(&doc).unwrap();
    /// assert_eq!(cache.get("example.com_index.html").unwrap(), Some(doc));
    /// ```
    pub fn get(&self, source_id: &str) -> Result<Option<RawDocument>, MentorError> {
        let result = self.conn.query_row(
            "SELECT url, body FROM documents WHERE source_id = ?1",
            params![source_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)),
        );

        match result {
            Ok((url, bytes)) => Ok(Some(RawDocument {
                source_id: source_id.to_string(),
                url,
                bytes,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MentorError::Database(format!(
                "failed to read cached document '{source_id}': {e}"
            ))),
        }
    }

    /// Store a page unless one with the same source id is already cached.
    ///
    /// Returns `true` when the page was inserted.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Database`] on insert failure.
    pub fn put(&self, doc: &RawDocument) -> Result<bool, MentorError> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO documents (source_id, url, content_hash, fetched_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    doc.source_id,
                    doc.url,
                    compute_hash(&doc.bytes),
                    chrono::Utc::now().to_rfc3339(),
                    doc.bytes,
                ],
            )
            .map_err(|e| MentorError::Database(format!("failed to cache document: {e}")))?;

        Ok(inserted > 0)
    }

    /// SHA-256 of a cached page body, if cached.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Database`] on query failure.
    pub fn content_hash(&self, source_id: &str) -> Result<Option<String>, MentorError> {
        let result = self.conn.query_row(
            "SELECT content_hash FROM documents WHERE source_id = ?1",
            params![source_id],
            |row| row.get(0),
        );

        match result {
            Ok(hash) => Ok(Some(hash)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MentorError::Database(format!(
                "failed to get content hash: {e}"
            ))),
        }
    }

    /// Drop a cached page.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Database`] on delete failure.
    pub fn remove(&self, source_id: &str) -> Result<(), MentorError> {
        self.conn
            .execute(
                "DELETE FROM documents WHERE source_id = ?1",
                params![source_id],
            )
            .map_err(|e| MentorError::Database(format!("failed to delete document: {e}")))?;
        Ok(())
    }

    /// Store a freshly fetched page, replacing the cached copy when its body
    /// changed.
    ///
    /// Returns `true` when the cache now holds different bytes than before.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Database`] on query, delete, or insert failure.
    pub fn replace(&self, doc: &RawDocument) -> Result<bool, MentorError> {
        let fresh = compute_hash(&doc.bytes);
        if self.content_hash(&doc.source_id)?.as_deref() == Some(fresh.as_str()) {
            return Ok(false);
        }
        self.remove(&doc.source_id)?;
        self.put(doc)
    }

    /// Get cache statistics.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Database`] on query failure.
    pub fn stats(&self) -> Result<CacheStats, MentorError> {
        let (documents, total_bytes): (i64, i64) = self
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(body)), 0) FROM documents",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| MentorError::Database(format!("failed to count documents: {e}")))?;

        Ok(CacheStats {
            documents: documents as usize,
            total_bytes: total_bytes as u64,
        })
    }
}

fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc(id: &str, body: &str) -> RawDocument {
        RawDocument {
            source_id: id.into(),
            url: format!("https://{id}"),
            bytes: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn missing_document_is_none() {
        let cache = DocCache::in_memory().unwrap();
        assert_eq!(cache.get("nope").unwrap(), None);
        assert_eq!(cache.content_hash("nope").unwrap(), None);
    }

    #[test]
    fn put_then_get_returns_same_bytes() {
        let cache = DocCache::in_memory().unwrap();
        let doc = sample_doc("a", "<html>a</html>");
        assert!(cache.put(&doc).unwrap());
        assert_eq!(cache.get("a").unwrap(), Some(doc));
    }

    #[test]
    fn cached_document_is_immutable() {
        let cache = DocCache::in_memory().unwrap();
        cache.put(&sample_doc("a", "first")).unwrap();
        assert!(!cache.put(&sample_doc("a", "second")).unwrap());
        assert_eq!(cache.get("a").unwrap().unwrap().bytes, b"first");
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        let cache = DocCache::in_memory().unwrap();
        cache.put(&sample_doc("a", "abc")).unwrap();
        assert_eq!(
            cache.content_hash("a").unwrap().as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn remove_allows_refetch() {
        let cache = DocCache::in_memory().unwrap();
        cache.put(&sample_doc("a", "old")).unwrap();
        cache.remove("a").unwrap();
        assert!(cache.put(&sample_doc("a", "new")).unwrap());
        assert_eq!(cache.get("a").unwrap().unwrap().bytes, b"new");
    }

    #[test]
    fn replace_only_reports_changed_bodies() {
        let cache = DocCache::in_memory().unwrap();
        assert!(cache.replace(&sample_doc("a", "v1")).unwrap());
        assert!(!cache.replace(&sample_doc("a", "v1")).unwrap());
        assert_eq!(cache.stats().unwrap().documents, 1);

        assert!(cache.replace(&sample_doc("a", "v2")).unwrap());
        assert_eq!(cache.get("a").unwrap().unwrap().bytes, b"v2");
        assert_eq!(cache.stats().unwrap().documents, 1);
    }

    #[test]
    fn stats_count_documents_and_bytes() {
        let cache = DocCache::in_memory().unwrap();
        assert_eq!(
            cache.stats().unwrap(),
            CacheStats {
                documents: 0,
                total_bytes: 0
            }
        );
        cache.put(&sample_doc("a", "1234")).unwrap();
        cache.put(&sample_doc("b", "123456")).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.total_bytes, 10);
    }

    #[test]
    fn open_creates_database_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw/cache.db");
        {
            let cache = DocCache::open(&path).unwrap();
            cache.put(&sample_doc("a", "persisted")).unwrap();
        }
        let cache = DocCache::open(&path).unwrap();
        assert_eq!(cache.get("a").unwrap().unwrap().bytes, b"persisted");
    }
}
