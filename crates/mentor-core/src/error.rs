use std::path::PathBuf;

/// Errors that can occur across the mentor pipeline.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use mentor_core::MentorError;
///
/// let err = MentorError::Config("overlap must be smaller than max_chars".into());
/// assert!(err.to_string().contains("overlap"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum MentorError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration, including bad chunking parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// A build input (the chunks file) does not exist.
    #[error("input not found: {}", .0.display())]
    #[diagnostic(help("run `mentor fetch` to produce the chunks file"))]
    InputNotFound(PathBuf),

    /// A persisted snapshot artifact does not exist.
    #[error("snapshot artifact not found: {}", .0.display())]
    #[diagnostic(help("run `mentor build` to create the snapshot"))]
    SnapshotNotFound(PathBuf),

    /// Embedding provider call or response failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Document download failure.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Raw document cache failure.
    #[error("database error: {0}")]
    Database(String),

    /// Malformed snapshot artifact or vector dimension mismatch.
    #[error("index error: {0}")]
    Index(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MentorError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = MentorError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn input_not_found_shows_path() {
        let err = MentorError::InputNotFound(PathBuf::from("/tmp/doc_chunks.jsonl"));
        assert!(err.to_string().contains("/tmp/doc_chunks.jsonl"));
    }

    #[test]
    fn snapshot_not_found_hints_at_build() {
        let err = MentorError::SnapshotNotFound(PathBuf::from("data/vectorstore/doc_index.flatip"));
        assert!(err.to_string().contains("doc_index.flatip"));
        let help = miette::Diagnostic::help(&err).unwrap().to_string();
        assert!(help.contains("mentor build"));
    }
}
