//! HTTP fetching of documentation pages.

use std::time::{Duration, Instant};

use mentor_core::{IngestionConfig, MentorError, RawDocument};
use tracing::info;

/// Derive a filesystem-safe source id from a URL.
///
/// # Examples
///
/// ```
/// use mentor_ingest::fetch::source_id_for;
///
/// assert_eq!(
///     source_id_for("https://scikit-learn.org/stable/user_guide.html"),
///     "scikit-learn.org_stable_user_guide.html"
/// );
/// ```
pub fn source_id_for(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped.replace('/', "_")
}

/// Downloads documentation pages.
///
/// # Examples
///
/// ```
/// use mentor_core::IngestionConfig;
/// use mentor_ingest::fetch::Fetcher;
///
/// let fetcher = Fetcher::new(&IngestionConfig::default()).unwrap();
/// ```
pub struct Fetcher {
    client: reqwest::Client,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher").finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Build a fetcher using the configured timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Fetch`] if the HTTP client cannot be built.
    pub fn new(config: &IngestionConfig) -> Result<Self, MentorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| MentorError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Download `url`.
    ///
    /// # Errors
    ///
    /// Returns [`MentorError::Fetch`] on transport failure or a non-success
    /// status.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mentor_core::IngestionConfig;
    /// use mentor_ingest::fetch::Fetcher;
    ///
    /// # async fn example() {
    /// let fetcher = Fetcher::new(&IngestionConfig::default()).unwrap();
    /// let doc = fetcher.fetch("https://scikit-learn.org/stable/user_guide.html").await.unwrap();
    /// assert!(!doc.bytes.is_empty());
    /// # }
    /// ```
    pub async fn fetch(&self, url: &str) -> Result<RawDocument, MentorError> {
        info!(url, "fetching");
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MentorError::Fetch(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MentorError::Fetch(format!("GET {url} returned {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MentorError::Fetch(format!("failed to read body of {url}: {e}")))?;

        info!(
            url,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(RawDocument {
            source_id: source_id_for(url),
            url: url.to_string(),
            bytes: bytes.to_vec(),
        })
    }
}
