use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Read buffer for hashing and copying (1 MiB).
const CHUNK_SIZE: usize = 1024 * 1024;

/// Extension used when the source file has none.
const DEFAULT_EXTENSION: &str = ".mp3";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors raised while staging files. Staging is fail-fast: the first error
/// aborts the whole call.
#[derive(Debug, Error)]
pub enum StageError {
    /// Source unreadable, storage root not creatable, or copy failed
    #[error("Failed to stage '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Source exists but is a directory or other non-regular entry
    #[error("Not a regular file: {0}")]
    NotAFile(PathBuf),
}

impl StageError {
    fn io(path: &Path, source: io::Error) -> Self {
        StageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A file copied into the storage root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedFile {
    /// File name as the user provided it, kept for display only.
    pub original_name: String,
    /// Location of the managed copy. Its mtime drives retention.
    pub storage_path: PathBuf,
    /// Lowercase hex SHA-256 of the content; also the stored file stem.
    pub content_key: String,
    pub created_at: DateTime<Utc>,
    /// Playing time read from the MPEG frame headers. `None` for non-MP3
    /// content or when no frames could be decoded.
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

/// Copies source files into a storage root under content-addressed names.
///
/// Identical bytes always land at `{sha256}{ext}`, so staging the same
/// content twice keeps a single physical copy.
#[derive(Debug, Clone)]
pub struct ContentStager {
    root: PathBuf,
}

impl ContentStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stages every source path, in order.
    ///
    /// Each input maps to exactly one [`StagedFile`]; any failure aborts the
    /// call and nothing after the failing path is staged. Sources are never
    /// modified or deleted.
    ///
    /// # Errors
    ///
    /// - [`StageError::Io`] if the storage root cannot be created or a source
    ///   cannot be read or copied
    /// - [`StageError::NotAFile`] if a source is a directory
    pub fn stage<P: AsRef<Path>>(&self, sources: &[P]) -> Result<Vec<StagedFile>, StageError> {
        if sources.is_empty() {
            tracing::warn!("stage called with no source paths");
            return Ok(Vec::new());
        }

        fs::create_dir_all(&self.root).map_err(|e| StageError::io(&self.root, e))?;
        tracing::debug!(root = %self.root.display(), count = sources.len(), "Staging files");

        sources
            .iter()
            .map(|source| self.stage_one(source.as_ref()))
            .collect()
    }

    fn stage_one(&self, source: &Path) -> Result<StagedFile, StageError> {
        let metadata = fs::metadata(source).map_err(|e| StageError::io(source, e))?;
        if !metadata.is_file() {
            return Err(StageError::NotAFile(source.to_path_buf()));
        }

        // Copy into a unique temp file while hashing, then move it onto the
        // content name. Readers of the root never see a partial file.
        let temp_path = self.temp_path();
        let content_key = match copy_hashing(source, &temp_path) {
            Ok(key) => key,
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                return Err(StageError::io(source, e));
            }
        };

        let storage_path = self
            .root
            .join(format!("{}{}", content_key, staged_extension(source)));

        if storage_path.is_file() {
            match touch(&storage_path) {
                Ok(()) => {
                    let _ = fs::remove_file(&temp_path);
                    tracing::debug!(
                        source = %source.display(),
                        content_key = %content_key,
                        "Content already staged, reusing existing copy"
                    );
                    return Ok(self.staged_file(source, storage_path, content_key));
                }
                // Swept between the check and the touch; fall through to rename
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    let _ = fs::remove_file(&temp_path);
                    return Err(StageError::io(&storage_path, e));
                }
            }
        }

        if let Err(e) = fs::rename(&temp_path, &storage_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StageError::io(&storage_path, e));
        }

        tracing::info!(
            source = %source.display(),
            stored = %storage_path.display(),
            bytes = metadata.len(),
            "Staged file"
        );
        Ok(self.staged_file(source, storage_path, content_key))
    }

    fn staged_file(&self, source: &Path, storage_path: PathBuf, content_key: String) -> StagedFile {
        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let duration_seconds = mp3_seconds(&storage_path);
        StagedFile {
            original_name,
            storage_path,
            content_key,
            created_at: Utc::now(),
            duration_seconds,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".staging.{}.{:x}.{}.tmp", std::process::id(), nanos, seq))
    }

    /// Deletes a staged copy.
    ///
    /// Returns `Ok(false)` if the file was already gone (swept or removed by
    /// another actor).
    pub fn remove(&self, staged: &StagedFile) -> io::Result<bool> {
        match fs::remove_file(&staged.storage_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Streams `source` into a freshly created `dest`, returning the hex SHA-256.
fn copy_hashing(source: &Path, dest: &Path) -> io::Result<String> {
    let mut input = File::open(source)?;
    let mut output = OpenOptions::new().write(true).create_new(true).open(dest)?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        output.write_all(&buf[..n])?;
    }
    output.sync_all()?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Resets the modification time so the retention TTL restarts.
fn touch(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}

/// Duration of a staged `.mp3` copy, summed over its frames.
fn mp3_seconds(path: &Path) -> Option<f64> {
    if path.extension().and_then(|e| e.to_str()) != Some("mp3") {
        return None;
    }
    match mp3_duration::from_path(path) {
        Ok(duration) if !duration.is_zero() => Some(duration.as_secs_f64()),
        Ok(_) => {
            tracing::debug!(path = %path.display(), "No MPEG frames found, duration unknown");
            None
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Could not read MP3 duration");
            None
        }
    }
}

/// Lowercased extension with leading dot, or `.mp3` when the source has none.
fn staged_extension(source: &Path) -> String {
    source
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
