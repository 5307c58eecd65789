//! File repository and transfer engine for fileshare.
//!
//! This module provides:
//! - Path containment for the shared root
//! - Capacity accounting (fixed ceiling or device free space)
//! - Ordered directory listings
//! - Batch and streamed uploads with collision-free naming
//! - Guarded deletion

mod deletion;
mod ingest;
mod listing;
mod quota;
mod resolver;
mod service;

pub use deletion::DeletionGuard;
pub use ingest::{
    candidate_name, sanitize_filename, BatchUpload, SkipReason, SkippedFile, UploadFile,
    UploadIngestor, UploadReport, MAX_FILENAME_BYTES, MAX_NAME_ATTEMPTS, STREAM_CHUNK_SIZE,
};
pub use listing::{list_directory, DirectoryEntry, EntryKind};
pub use quota::{used_bytes_on_disk, QuotaAccountant, QuotaState};
pub use resolver::{Breadcrumb, Sandbox};
pub use service::{
    BrowseResult, DownloadFile, FileService, StorageCheck, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
