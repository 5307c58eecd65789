//! File service for fileshare.
//!
//! This module ties the sandbox components together into the operations the
//! transport layer exposes:
//! - Browse with pagination and breadcrumbs
//! - Download as an open file handle
//! - Batch and streamed upload
//! - Delete, directory creation and storage checks

use std::fmt;
use std::io;
use std::time::SystemTime;

use futures::Stream;
use tokio::fs::File;

use super::deletion::DeletionGuard;
use super::ingest::{BatchUpload, UploadFile, UploadIngestor, UploadReport};
use super::listing::{list_directory, DirectoryEntry};
use super::quota::{QuotaAccountant, QuotaState};
use super::resolver::{Breadcrumb, Sandbox};
use crate::config::{DeletePolicy, StorageConfig};
use crate::format::human_size;
use crate::{FileShareError, Result};

/// Default number of entries per browse page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Maximum number of entries per browse page.
pub const MAX_PAGE_SIZE: u32 = 500;

/// One page of a directory listing.
#[derive(Debug, Clone)]
pub struct BrowseResult {
    /// Directory path relative to the root.
    pub current_path: String,
    /// Entries on this page.
    pub entries: Vec<DirectoryEntry>,
    /// Number of entries in the whole directory.
    pub total_count: usize,
    /// Path segments from the root.
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Free bytes under the capacity policy.
    pub free_bytes: u64,
    /// Free bytes, human readable.
    pub free_bytes_human: String,
    /// Page number (1-based).
    pub page: u32,
    /// Entries per page.
    pub per_page: u32,
    /// Number of pages.
    pub total_pages: u32,
}

/// An opened file ready to be streamed to a client.
#[derive(Debug)]
pub struct DownloadFile {
    /// Open handle.
    pub file: File,
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: Option<SystemTime>,
}

/// Answer to a pre-upload storage check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCheck {
    /// Whether a file of the requested size fits.
    pub available: bool,
    /// Free bytes.
    pub free_bytes: u64,
}

/// Clamp a requested page and page size to sane values.
fn normalize_page(page: u32, per_page: u32) -> (u32, u32) {
    let page = page.max(1);
    let per_page = match per_page {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    };
    (page, per_page)
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FileShareError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

/// High-level operations on the shared directory.
#[derive(Debug, Clone)]
pub struct FileService {
    sandbox: Sandbox,
    quota: QuotaAccountant,
    ingestor: UploadIngestor,
    deletion: DeletionGuard,
}

impl FileService {
    /// Create the service from configuration, creating the root if needed.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let sandbox = Sandbox::new(&config.root)?;
        let mut quota =
            QuotaAccountant::new(sandbox.root(), config.capacity, config.capacity_bytes);
        if config.track_usage {
            quota = quota.with_tracking();
        }

        Ok(Self::from_parts(sandbox, quota, config.delete_policy)
            .with_max_upload_size(config.max_upload_size_bytes()))
    }

    /// Assemble the service from already built components.
    pub fn from_parts(
        sandbox: Sandbox,
        quota: QuotaAccountant,
        delete_policy: DeletePolicy,
    ) -> Self {
        let ingestor = UploadIngestor::new(sandbox.clone(), quota.clone());
        let deletion = DeletionGuard::new(sandbox.clone(), quota.clone(), delete_policy);
        Self {
            sandbox,
            quota,
            ingestor,
            deletion,
        }
    }

    /// Reject any single uploaded file larger than `bytes`.
    pub fn with_max_upload_size(mut self, bytes: u64) -> Self {
        self.ingestor = self.ingestor.with_max_file_size(bytes);
        self
    }

    /// Get the sandbox.
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Get the quota accountant.
    pub fn quota(&self) -> &QuotaAccountant {
        &self.quota
    }

    /// List one page of the directory at `relative`.
    pub async fn browse(&self, relative: &str, page: u32, per_page: u32) -> Result<BrowseResult> {
        let (page, per_page) = normalize_page(page, per_page);
        let sandbox = self.sandbox.clone();
        let quota = self.quota.clone();
        let relative = relative.to_string();

        run_blocking(move || {
            let dir = sandbox.resolve(&relative);
            let entries = list_directory(&sandbox, &dir)?;
            let free_bytes = quota.available_bytes()?;

            let total_count = entries.len();
            let total_pages = total_count.div_ceil(per_page as usize) as u32;
            let start = (page as usize - 1).saturating_mul(per_page as usize);
            let entries = entries
                .into_iter()
                .skip(start)
                .take(per_page as usize)
                .collect();

            Ok(BrowseResult {
                current_path: sandbox.relative_of(&dir),
                entries,
                total_count,
                breadcrumbs: sandbox.breadcrumbs(&dir),
                free_bytes,
                free_bytes_human: human_size(free_bytes),
                page,
                per_page,
                total_pages,
            })
        })
        .await
    }

    /// Open the file at `relative` for download.
    pub async fn download(&self, relative: &str) -> Result<DownloadFile> {
        let path = self.sandbox.resolve(relative);
        let rel = self.sandbox.relative_of(&path);

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| FileShareError::from_io(e, format!("File '{rel}'")))?;
        if metadata.is_dir() {
            return Err(FileShareError::IsADirectory(rel));
        }

        let file = File::open(&path)
            .await
            .map_err(|e| FileShareError::from_io(e, format!("File '{rel}'")))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::info!(path = %rel, size = metadata.len(), "Download started");
        Ok(DownloadFile {
            file,
            name,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    /// Store a batch of files in the directory at `target`.
    pub async fn upload_batch(&self, target: &str, files: Vec<UploadFile>) -> Result<UploadReport> {
        let dir = self.sandbox.resolve(target);
        self.ingestor.ingest_batch(&dir, files).await
    }

    /// Start a multi-file upload into the directory at `target`.
    ///
    /// Files are added one at a time as they arrive.
    pub async fn begin_batch(&self, target: &str) -> Result<BatchUpload<'_>> {
        let dir = self.sandbox.resolve(target);
        self.ingestor.begin_batch(&dir).await
    }

    /// Store one streamed file in the directory at `target`.
    pub async fn upload_stream<S, B, E>(
        &self,
        target: &str,
        name: &str,
        declared_len: Option<u64>,
        stream: S,
    ) -> Result<UploadReport>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let dir = self.sandbox.resolve(target);
        self.ingestor
            .ingest_stream(&dir, name, declared_len, stream)
            .await
    }

    /// Delete the file (or directory, if the policy allows) at `relative`.
    pub async fn delete(&self, relative: &str) -> Result<u64> {
        let path = self.sandbox.resolve(relative);
        let deletion = self.deletion.clone();
        run_blocking(move || deletion.delete(&path)).await
    }

    /// Create the subdirectory `name` inside `target`.
    pub async fn create_directory(&self, target: &str, name: &str) -> Result<String> {
        let parent = self.sandbox.resolve(target);
        let created = self.ingestor.create_directory(&parent, name).await?;
        let parent_rel = self.sandbox.relative_of(&parent);
        Ok(if parent_rel.is_empty() {
            created
        } else {
            format!("{parent_rel}/{created}")
        })
    }

    /// Whether a file of `size` bytes would currently fit.
    pub async fn storage_check(&self, size: u64) -> Result<StorageCheck> {
        let free_bytes = self.usage().await?.free_bytes;
        Ok(StorageCheck {
            available: free_bytes > size,
            free_bytes,
        })
    }

    /// Current capacity, usage and free space.
    pub async fn usage(&self) -> Result<QuotaState> {
        let quota = self.quota.clone();
        run_blocking(move || quota.usage()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CapacityPolicy;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn setup_service(capacity: u64) -> (TempDir, FileService) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            root: temp_dir.path().join("share"),
            capacity: CapacityPolicy::Fixed,
            capacity_bytes: capacity,
            ..Default::default()
        };
        let service = FileService::new(&config).unwrap();
        (temp_dir, service)
    }

    #[test]
    fn test_normalize_page() {
        assert_eq!(normalize_page(0, 0), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(normalize_page(3, 10), (3, 10));
        assert_eq!(normalize_page(1, 10_000), (1, MAX_PAGE_SIZE));
    }

    #[tokio::test]
    async fn test_new_creates_root() {
        let (temp_dir, service) = setup_service(1000);
        assert!(temp_dir.path().join("share").is_dir());
        assert_eq!(service.quota().policy(), CapacityPolicy::Fixed);
    }

    #[tokio::test]
    async fn test_browse_paginates() {
        let (_temp_dir, service) = setup_service(1_000_000);
        for i in 0..7 {
            std::fs::write(service.sandbox().root().join(format!("f{i}.txt")), b"x").unwrap();
        }

        let first = service.browse("", 1, 3).await.unwrap();
        assert_eq!(first.total_count, 7);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.entries.len(), 3);
        assert_eq!(first.entries[0].name, "f0.txt");

        let last = service.browse("", 3, 3).await.unwrap();
        assert_eq!(last.entries.len(), 1);
        assert_eq!(last.entries[0].name, "f6.txt");

        let beyond = service.browse("", 9, 3).await.unwrap();
        assert!(beyond.entries.is_empty());
    }

    #[tokio::test]
    async fn test_browse_breadcrumbs_and_free_space() {
        let (_temp_dir, service) = setup_service(2048);
        std::fs::create_dir_all(service.sandbox().root().join("a").join("b")).unwrap();
        std::fs::write(service.sandbox().root().join("a").join("f.bin"), vec![0; 1024]).unwrap();

        let result = service.browse("a/b", 1, 50).await.unwrap();

        assert_eq!(result.current_path, "a/b");
        assert_eq!(result.breadcrumbs.len(), 2);
        assert_eq!(result.breadcrumbs[1].path, "a/b");
        assert_eq!(result.free_bytes, 1024);
        assert_eq!(result.free_bytes_human, "1.0 KB");
    }

    #[tokio::test]
    async fn test_browse_traversal_shows_root() {
        let (_temp_dir, service) = setup_service(1000);

        let result = service.browse("../../..", 1, 50).await.unwrap();

        assert_eq!(result.current_path, "");
        assert!(result.breadcrumbs.is_empty());
    }

    #[tokio::test]
    async fn test_browse_missing_directory() {
        let (_temp_dir, service) = setup_service(1000);

        let result = service.browse("missing", 1, 50).await;

        assert!(matches!(result, Err(FileShareError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_download_reads_content() {
        let (_temp_dir, service) = setup_service(1000);
        std::fs::write(service.sandbox().root().join("song.mp3"), b"ID3data").unwrap();

        let mut download = service.download("song.mp3").await.unwrap();
        let mut content = Vec::new();
        download.file.read_to_end(&mut content).await.unwrap();

        assert_eq!(download.name, "song.mp3");
        assert_eq!(download.size, 7);
        assert_eq!(content, b"ID3data");
    }

    #[tokio::test]
    async fn test_download_errors() {
        let (_temp_dir, service) = setup_service(1000);
        std::fs::create_dir(service.sandbox().root().join("dir")).unwrap();

        assert!(matches!(
            service.download("nope.txt").await,
            Err(FileShareError::NotFound(_))
        ));
        assert!(matches!(
            service.download("dir").await,
            Err(FileShareError::IsADirectory(_))
        ));
        // Traversal lands on the root, which is a directory
        assert!(matches!(
            service.download("../etc/passwd").await,
            Err(FileShareError::IsADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_then_delete_roundtrip() {
        let (_temp_dir, service) = setup_service(1000);

        let report = service
            .upload_batch("", vec![UploadFile::new("notes.txt", b"hello".to_vec())])
            .await
            .unwrap();
        assert_eq!(report.written_count(), 1);

        assert_eq!(service.delete("notes.txt").await.unwrap(), 5);
        assert!(matches!(
            service.delete("notes.txt").await,
            Err(FileShareError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_directory_returns_relative_path() {
        let (_temp_dir, service) = setup_service(1000);

        assert_eq!(service.create_directory("", "X").await.unwrap(), "X");
        assert_eq!(service.create_directory("X", "Y").await.unwrap(), "X/Y");
        assert!(matches!(
            service.create_directory("", "X").await,
            Err(FileShareError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_check() {
        let (_temp_dir, service) = setup_service(1000);
        std::fs::write(service.sandbox().root().join("f"), vec![0; 400]).unwrap();

        let check = service.storage_check(100).await.unwrap();
        assert!(check.available);
        assert_eq!(check.free_bytes, 600);

        // Strictly greater than is required
        assert!(!service.storage_check(600).await.unwrap().available);
        assert!(!service.storage_check(5000).await.unwrap().available);
    }

    #[tokio::test]
    async fn test_recursive_policy_from_parts() {
        let temp_dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(temp_dir.path()).unwrap();
        let quota = QuotaAccountant::new(sandbox.root(), CapacityPolicy::Fixed, 1000);
        let service = FileService::from_parts(sandbox, quota, DeletePolicy::Recursive);
        std::fs::create_dir_all(temp_dir.path().join("d").join("e")).unwrap();

        service.delete("d").await.unwrap();

        assert!(!temp_dir.path().join("d").exists());
    }
}
