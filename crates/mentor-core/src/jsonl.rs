//! Newline-delimited JSON files and write-then-rename persistence.
//!
//! The chunks file and the snapshot metadata file share this format: one
//! JSON object per line, blank lines ignored.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MentorError;

/// Read every record from a JSONL file, in file order.
///
/// # Errors
///
/// Returns [`MentorError::Io`] if the file cannot be read, or
/// [`MentorError::Serialization`] if a line is not a valid record.
///
/// # Examples
///
/// ```
/// use mentor_core::{jsonl, TextChunk};
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("chunks.jsonl");
/// let chunks = vec![TextChunk::new("a", "https://a", 0, "hello")];
/// jsonl::write_jsonl(&path, &chunks).unwrap();
///
/// let back: Vec<TextChunk> = jsonl::read_jsonl(&path).unwrap();
/// assert_eq!(back, chunks);
/// ```
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, MentorError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

/// Write `records` as JSONL, replacing `path` atomically.
///
/// # Errors
///
/// Returns [`MentorError`] if serialization or any filesystem step fails.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), MentorError> {
    write_atomic(path, |out| {
        for record in records {
            serde_json::to_writer(&mut *out, record)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    })
}

/// Write a file through a sibling `.tmp` file, then rename it over `path`.
///
/// Parent directories are created as needed. Readers never observe a
/// half-written `path`; on failure the temporary file is removed.
///
/// # Errors
///
/// Returns [`MentorError`] from `write` or from the filesystem.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), MentorError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), MentorError>,
{
    let staged = stage_file(path, write)?;
    std::fs::rename(&staged, path)?;
    Ok(())
}

/// Write the staging file for `path` without publishing it.
///
/// Returns the staging path; rename it over `path` to publish. Use this to
/// stage several files before publishing any of them.
///
/// # Errors
///
/// Returns [`MentorError`] from `write` or from the filesystem. The staging
/// file is removed on failure.
pub fn stage_file<F>(path: &Path, write: F) -> Result<PathBuf, MentorError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), MentorError>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    if let Err(e) = write_temp(&tmp, write) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(tmp)
}

fn write_temp<F>(tmp: &Path, write: F) -> Result<(), MentorError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), MentorError>,
{
    let mut out = BufWriter::new(File::create(tmp)?);
    write(&mut out)?;
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// The staging path used by [`write_atomic`] for `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
