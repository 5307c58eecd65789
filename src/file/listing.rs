//! Directory listing with deterministic ordering.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use serde::Serialize;

use super::resolver::Sandbox;
use crate::{FileShareError, Result};

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

/// One entry of a directory listing.
///
/// Recomputed on every request; nothing here is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// File or directory name.
    pub name: String,
    /// Path relative to the sandbox root, slash-separated.
    pub relative_path: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Size in bytes (files only).
    pub size: Option<u64>,
    /// Last modification time.
    pub modified: SystemTime,
}

impl DirectoryEntry {
    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Directories first, then case-insensitive name, then exact name.
fn entry_order(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

/// List the entries of `dir`, which must already be resolved through the sandbox.
///
/// Entries that disappear while the directory is being read are skipped.
/// A missing or non-directory `dir` is reported, not retried.
pub fn list_directory(sandbox: &Sandbox, dir: &Path) -> Result<Vec<DirectoryEntry>> {
    let rel = sandbox.relative_of(dir);

    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FileShareError::NotFound(format!("Directory '{rel}'")));
        }
        Err(e) if dir.exists() && !dir.is_dir() => {
            tracing::debug!(error = %e, "Listing target is not a directory");
            return Err(FileShareError::NotADirectory(rel));
        }
        Err(e) => return Err(FileShareError::from_io(e, format!("Directory '{rel}'"))),
    };

    let mut entries = Vec::new();
    for item in read_dir {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let path = item.path();
        // Follows symlinks; a vanished or dangling entry fails here
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping vanished entry");
                continue;
            }
        };

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            continue;
        };

        entries.push(DirectoryEntry {
            name: item.file_name().to_string_lossy().into_owned(),
            relative_path: sandbox.relative_of(&path),
            kind,
            size: (kind == EntryKind::File).then(|| metadata.len()),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    entries.sort_by(entry_order);
    Ok(entries)
}
