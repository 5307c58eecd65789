//! Upload ingestion.
//!
//! Two modes share the same chunked writer and collision handling:
//! - batch: several named files against one free-space budget
//! - stream: a single file named outside the body
//!
//! Either way a file is consumed chunk by chunk and never held in memory.
//!
//! Destination names are claimed with create-exclusive opens, so two
//! concurrent uploads of `photo.jpg` end up as `photo.jpg` and `photo_1.jpg`
//! instead of overwriting each other.

use std::convert::Infallible;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use futures::{future, stream, Stream, StreamExt};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use super::quota::QuotaAccountant;
use super::resolver::Sandbox;
use crate::{FileShareError, Result};

/// Write buffer size for streamed uploads (1 MiB).
pub const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

/// Attempts at finding a free `name_N.ext` before giving up.
pub const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Maximum stored filename length in bytes.
pub const MAX_FILENAME_BYTES: usize = 255;

/// A fully received file of a batch upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Filename declared by the client, unsanitized.
    pub name: String,
    /// File content.
    pub content: Vec<u8>,
}

impl UploadFile {
    /// Create a new upload file.
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

/// Why a file was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The name was empty after sanitization.
    InvalidName,
    /// The file is larger than the remaining free space.
    QuotaExceeded,
    /// Writing failed.
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidName => write!(f, "invalid filename"),
            SkipReason::QuotaExceeded => write!(f, "not enough free space"),
            SkipReason::Failed(msg) => write!(f, "write failed: {msg}"),
        }
    }
}

/// A file that was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    /// Name as declared (or sanitized, when sanitization succeeded).
    pub name: String,
    /// Reason.
    pub reason: SkipReason,
}

/// Outcome of an upload. Skipped files do not make the upload fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Names the files were stored under, in request order.
    pub written: Vec<String>,
    /// Files that were not written.
    pub skipped: Vec<SkippedFile>,
}

impl UploadReport {
    /// Number of files actually written.
    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    /// Whether some but not all files were written.
    pub fn is_partial(&self) -> bool {
        !self.written.is_empty() && !self.skipped.is_empty()
    }

    fn skip(&mut self, name: impl Into<String>, reason: SkipReason) {
        self.skipped.push(SkippedFile {
            name: name.into(),
            reason,
        });
    }
}

/// Longest extension kept intact when a name has to be shortened.
const MAX_EXTENSION_BYTES: usize = 32;

/// Make a client-supplied filename safe to store.
///
/// Path separators, whitespace and any character other than letters, digits,
/// `.`, `-` and `_` become `_`. Leading and trailing dots and underscores are
/// stripped, which also rules out `.` and `..`. Names longer than
/// [`MAX_FILENAME_BYTES`] lose bytes from the stem, not the extension.
/// Returns `None` when nothing usable remains.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return None;
    }

    Some(fit_name(trimmed, ""))
}

/// The `counter`-th candidate for `name`: `photo.jpg`, `photo_1.jpg`, ...
///
/// The stem is shortened when the suffix would push the name past
/// [`MAX_FILENAME_BYTES`].
pub fn candidate_name(name: &str, counter: u32) -> String {
    if counter == 0 {
        return fit_name(name, "");
    }
    fit_name(name, &format!("_{counter}"))
}

/// Split `name` into stem and extension, keeping short extensions only.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= MAX_EXTENSION_BYTES => {
            (stem, Some(ext))
        }
        _ => (name, None),
    }
}

/// Build `stem + suffix + .ext`, shortening the stem to stay within
/// [`MAX_FILENAME_BYTES`].
fn fit_name(name: &str, suffix: &str) -> String {
    let (stem, ext) = split_extension(name);
    let ext_len = ext.map_or(0, |e| e.len() + 1);
    let budget = MAX_FILENAME_BYTES.saturating_sub(suffix.len() + ext_len);
    let stem = truncate_bytes(stem, budget);

    match ext {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    }
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Claim the first free candidate name in `dir` and open it for writing.
async fn create_exclusive(dir: &Path, name: &str) -> Result<(File, String)> {
    for counter in 0..MAX_NAME_ATTEMPTS {
        let candidate = candidate_name(name, counter);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
            .await
        {
            Ok(file) => return Ok((file, candidate)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(FileShareError::from_io(e, format!("File '{candidate}'"))),
        }
    }

    Err(FileShareError::Conflict(format!(
        "no free name for '{name}' after {MAX_NAME_ATTEMPTS} attempts"
    )))
}

/// How a chunked write ended when it did not fail.
enum WriteOutcome {
    /// Stored under this name with this many bytes.
    Written(String, u64),
    /// Ran past the free space; the partial file was removed.
    OverQuota,
}

/// Whether `err` must end a multi-file upload instead of skipping one file.
fn aborts_batch(err: &FileShareError) -> bool {
    match err {
        FileShareError::TooLarge(_) => true,
        FileShareError::Io(e) => e.kind() == io::ErrorKind::ConnectionAborted,
        _ => false,
    }
}

/// Writes uploads into directories of the sandbox.
#[derive(Debug, Clone)]
pub struct UploadIngestor {
    sandbox: Sandbox,
    quota: QuotaAccountant,
    max_file_size: u64,
}

impl UploadIngestor {
    /// Create a new ingestor with no per-file size limit.
    pub fn new(sandbox: Sandbox, quota: QuotaAccountant) -> Self {
        Self {
            sandbox,
            quota,
            max_file_size: u64::MAX,
        }
    }

    /// Reject any single upload larger than `bytes`.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    async fn available_bytes(&self) -> Result<u64> {
        let quota = self.quota.clone();
        tokio::task::spawn_blocking(move || quota.available_bytes())
            .await
            .map_err(|e| FileShareError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    async fn ensure_directory(&self, dir: &Path) -> Result<()> {
        let rel = self.sandbox.relative_of(dir);
        match fs::metadata(dir).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(FileShareError::NotADirectory(rel)),
            Err(e) => Err(FileShareError::from_io(e, format!("Directory '{rel}'"))),
        }
    }

    fn check_declared_size(&self, name: &str, declared_len: Option<u64>) -> Result<()> {
        match declared_len {
            Some(len) if len > self.max_file_size => Err(FileShareError::TooLarge(format!(
                "'{name}' is {len} bytes, limit is {}",
                self.max_file_size
            ))),
            _ => Ok(()),
        }
    }

    /// Start a multi-file upload into `dir`.
    ///
    /// The free-space budget is taken once here and shared by every file
    /// added to the batch.
    pub async fn begin_batch(&self, dir: &Path) -> Result<BatchUpload<'_>> {
        self.ensure_directory(dir).await?;
        let remaining = self.available_bytes().await?;
        Ok(BatchUpload {
            ingestor: self,
            dir: dir.to_path_buf(),
            remaining,
            report: UploadReport::default(),
        })
    }

    /// Write every file of a batch into `dir`.
    ///
    /// Files are processed in order against a free-space budget taken once at
    /// the start. A file that does not fit is skipped and the rest continue.
    pub async fn ingest_batch(&self, dir: &Path, files: Vec<UploadFile>) -> Result<UploadReport> {
        let mut batch = self.begin_batch(dir).await?;
        for file in files {
            let size = file.content.len() as u64;
            let content = stream::once(future::ready(Ok::<_, Infallible>(file.content)));
            batch.add_file(&file.name, Some(size), content).await?;
        }
        Ok(batch.finish())
    }

    /// Write one streamed file into `dir`.
    ///
    /// When `declared_len` is known and larger than the free space the file is
    /// skipped without creating anything. Otherwise the running byte count is
    /// checked per chunk, and overrunning the free space removes the partial
    /// file. Exceeding the per-file limit removes the partial file and fails
    /// with [`FileShareError::TooLarge`]. A stream error (client gone) leaves
    /// the partial file on disk and is returned as an I/O error.
    pub async fn ingest_stream<S, B, E>(
        &self,
        dir: &Path,
        declared_name: &str,
        declared_len: Option<u64>,
        stream: S,
    ) -> Result<UploadReport>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let name = sanitize_filename(declared_name).ok_or_else(|| {
            FileShareError::Validation(format!("invalid filename '{declared_name}'"))
        })?;
        self.check_declared_size(&name, declared_len)?;
        self.ensure_directory(dir).await?;

        let remaining = self.available_bytes().await?;
        let mut report = UploadReport::default();

        if let Some(len) = declared_len {
            if len > remaining {
                tracing::warn!(file = %name, size = len, remaining, "Rejecting stream over quota");
                report.skip(name, SkipReason::QuotaExceeded);
                return Ok(report);
            }
        }

        match self.write_chunks(dir, &name, remaining, stream).await? {
            WriteOutcome::Written(stored, _) => report.written.push(stored),
            WriteOutcome::OverQuota => report.skip(name, SkipReason::QuotaExceeded),
        }
        Ok(report)
    }

    /// Claim a name for `name` in `dir` and copy `stream` into it through a
    /// [`STREAM_CHUNK_SIZE`] buffer.
    async fn write_chunks<S, B, E>(
        &self,
        dir: &Path,
        name: &str,
        remaining: u64,
        stream: S,
    ) -> Result<WriteOutcome>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let (file, stored) = create_exclusive(dir, name).await?;
        let path = dir.join(&stored);
        let mut writer = BufWriter::with_capacity(STREAM_CHUNK_SIZE, file);
        let mut written: u64 = 0;
        let mut stream = std::pin::pin!(stream);

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = writer.flush().await;
                    self.quota.record_write(written);
                    tracing::warn!(
                        file = %stored,
                        written,
                        error = %e,
                        "Upload stream interrupted, partial file left on disk"
                    );
                    return Err(FileShareError::Io(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        format!("upload of '{stored}' interrupted: {e}"),
                    )));
                }
            };

            let bytes = chunk.as_ref();
            written += bytes.len() as u64;
            if written > self.max_file_size {
                drop(writer);
                discard_partial(&path).await;
                tracing::warn!(
                    file = %stored,
                    limit = self.max_file_size,
                    "Upload over size limit, discarded"
                );
                return Err(FileShareError::TooLarge(format!(
                    "'{stored}' exceeds the {} byte limit",
                    self.max_file_size
                )));
            }
            if written > remaining {
                drop(writer);
                discard_partial(&path).await;
                tracing::warn!(file = %stored, remaining, "Upload exceeded free space, discarded");
                return Ok(WriteOutcome::OverQuota);
            }

            if let Err(e) = writer.write_all(bytes).await {
                drop(writer);
                discard_partial(&path).await;
                return Err(FileShareError::from_io(e, format!("File '{stored}'")));
            }
        }

        if let Err(e) = writer.flush().await {
            drop(writer);
            discard_partial(&path).await;
            return Err(FileShareError::from_io(e, format!("File '{stored}'")));
        }

        self.quota.record_write(written);
        tracing::info!(
            dir = %self.sandbox.relative_of(dir),
            file = %stored,
            size = written,
            "Saved upload"
        );
        Ok(WriteOutcome::Written(stored, written))
    }

    /// Create the subdirectory `name` inside `parent`.
    ///
    /// Returns the sanitized name that was created.
    pub async fn create_directory(&self, parent: &Path, name: &str) -> Result<String> {
        let name = sanitize_filename(name)
            .ok_or_else(|| FileShareError::Validation(format!("invalid directory name '{name}'")))?;
        self.ensure_directory(parent).await?;

        let target: PathBuf = parent.join(&name);
        let rel = self.sandbox.relative_of(&target);
        fs::create_dir(&target)
            .await
            .map_err(|e| FileShareError::from_io(e, format!("'{rel}'")))?;

        tracing::info!(dir = %rel, "Created directory");
        Ok(name)
    }
}

/// A multi-file upload in progress.
///
/// Each file is streamed to disk as it arrives, so nothing larger than one
/// chunk is held in memory.
pub struct BatchUpload<'a> {
    ingestor: &'a UploadIngestor,
    dir: PathBuf,
    remaining: u64,
    report: UploadReport,
}

impl BatchUpload<'_> {
    /// Write the next file of the batch.
    ///
    /// Invalid names, files over the remaining free space and failed writes
    /// are recorded as skipped. An interrupted stream or a file over the size
    /// limit ends the whole batch with an error.
    pub async fn add_file<S, B, E>(
        &mut self,
        declared_name: &str,
        declared_len: Option<u64>,
        stream: S,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let Some(name) = sanitize_filename(declared_name) else {
            tracing::warn!(declared = %declared_name, "Skipping file with invalid name");
            self.report.skip(declared_name, SkipReason::InvalidName);
            return Ok(());
        };
        self.ingestor.check_declared_size(&name, declared_len)?;

        if let Some(size) = declared_len.filter(|len| *len > self.remaining) {
            tracing::warn!(
                file = %name,
                size,
                remaining = self.remaining,
                "Skipping file over quota"
            );
            self.report.skip(name, SkipReason::QuotaExceeded);
            return Ok(());
        }

        match self
            .ingestor
            .write_chunks(&self.dir, &name, self.remaining, stream)
            .await
        {
            Ok(WriteOutcome::Written(stored, size)) => {
                self.remaining -= size;
                self.report.written.push(stored);
            }
            Ok(WriteOutcome::OverQuota) => self.report.skip(name, SkipReason::QuotaExceeded),
            Err(e) if aborts_batch(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Failed to save upload");
                self.report.skip(name, SkipReason::Failed(e.to_string()));
            }
        }
        Ok(())
    }

    /// End the batch and return what happened to each file.
    pub fn finish(self) -> UploadReport {
        self.report
    }
}

async fn discard_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
    }
}
