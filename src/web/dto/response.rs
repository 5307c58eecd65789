//! Response DTOs for the file API.

use serde::Serialize;
use utoipa::ToSchema;

use crate::file::{Breadcrumb, BrowseResult, DirectoryEntry, StorageCheck, UploadReport};
use crate::format::{format_mtime, human_size, to_rfc3339};

// ============================================================================
// Generic Response Wrappers
// ============================================================================

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Pagination metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u32,
}

// ============================================================================
// Browse
// ============================================================================

/// One directory entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct EntryResponse {
    /// Entry name.
    pub name: String,
    /// Path relative to the shared root, `/`-separated.
    pub path: String,
    /// Whether this entry is a directory.
    pub is_dir: bool,
    /// Size in bytes (files only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Human-readable size (files only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_human: Option<String>,
    /// Modification time in RFC 3339.
    pub modified: String,
    /// Modification time for display, local time.
    pub modified_display: String,
}

impl From<DirectoryEntry> for EntryResponse {
    fn from(entry: DirectoryEntry) -> Self {
        Self {
            is_dir: entry.is_dir(),
            size_human: entry.size.map(human_size),
            size: entry.size,
            modified: to_rfc3339(entry.modified),
            modified_display: format_mtime(entry.modified),
            path: entry.relative_path,
            name: entry.name,
        }
    }
}

/// One breadcrumb segment.
#[derive(Debug, Serialize, ToSchema)]
pub struct BreadcrumbResponse {
    /// Segment name.
    pub name: String,
    /// Path of this segment relative to the shared root.
    pub path: String,
}

impl From<Breadcrumb> for BreadcrumbResponse {
    fn from(crumb: Breadcrumb) -> Self {
        Self {
            name: crumb.name,
            path: crumb.path,
        }
    }
}

/// Directory listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct BrowseResponse {
    /// Listed directory relative to the shared root (empty for the root).
    pub current_path: String,
    /// Entries on this page, directories first.
    pub entries: Vec<EntryResponse>,
    /// Path from the root to the listed directory.
    pub breadcrumbs: Vec<BreadcrumbResponse>,
    /// Free bytes under the capacity policy.
    pub free: u64,
    /// Free space, human-readable.
    pub free_human: String,
    /// Pagination metadata.
    pub meta: PaginationMeta,
}

impl From<BrowseResult> for BrowseResponse {
    fn from(result: BrowseResult) -> Self {
        Self {
            current_path: result.current_path,
            entries: result.entries.into_iter().map(Into::into).collect(),
            breadcrumbs: result.breadcrumbs.into_iter().map(Into::into).collect(),
            free: result.free_bytes,
            free_human: result.free_bytes_human,
            meta: PaginationMeta {
                page: result.page,
                per_page: result.per_page,
                total: result.total_count as u64,
                total_pages: result.total_pages,
            },
        }
    }
}

// ============================================================================
// Upload
// ============================================================================

/// A file the upload did not store.
#[derive(Debug, Serialize, ToSchema)]
pub struct SkippedFileResponse {
    /// Name as sent by the client.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Upload outcome.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// Number of files stored.
    pub written_count: usize,
    /// Stored names, after collision renaming.
    pub written: Vec<String>,
    /// Files that were not stored.
    pub skipped: Vec<SkippedFileResponse>,
}

impl From<UploadReport> for UploadResponse {
    fn from(report: UploadReport) -> Self {
        Self {
            written_count: report.written_count(),
            skipped: report
                .skipped
                .into_iter()
                .map(|s| SkippedFileResponse {
                    name: s.name,
                    reason: s.reason.to_string(),
                })
                .collect(),
            written: report.written,
        }
    }
}

// ============================================================================
// Directories, deletion, storage
// ============================================================================

/// Created directory.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateDirectoryResponse {
    /// Path of the new directory relative to the shared root.
    pub path: String,
}

/// Deletion outcome.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    /// Deleted path relative to the shared root.
    pub path: String,
    /// File bytes freed.
    pub freed: u64,
}

/// Storage pre-flight result.
#[derive(Debug, Serialize, ToSchema)]
pub struct StorageCheckResponse {
    /// Whether the upload fits.
    pub available: bool,
    /// Free bytes under the capacity policy.
    pub free: u64,
    /// Free space, human-readable.
    pub free_human: String,
}

impl From<StorageCheck> for StorageCheckResponse {
    fn from(check: StorageCheck) -> Self {
        Self {
            available: check.available,
            free: check.free_bytes,
            free_human: human_size(check.free_bytes),
        }
    }
}
