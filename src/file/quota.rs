//! Capacity and free-space accounting.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use walkdir::WalkDir;

use crate::config::CapacityPolicy;
use crate::Result;

/// Snapshot of capacity, usage and free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaState {
    /// Total capacity in bytes.
    pub capacity_bytes: u64,
    /// Bytes in use.
    pub used_bytes: u64,
    /// Bytes still available, never negative.
    pub free_bytes: u64,
}

impl QuotaState {
    /// Build a state from capacity and usage, clamping free space at zero.
    pub fn new(capacity_bytes: u64, used_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            used_bytes,
            free_bytes: capacity_bytes.saturating_sub(used_bytes),
        }
    }
}

/// Computes free space for the share under one capacity policy.
///
/// Without tracking, every call under [`CapacityPolicy::Fixed`] walks the
/// whole tree. With tracking enabled the used-byte figure comes from a
/// counter adjusted by the ingest and delete paths, and
/// [`QuotaAccountant::reconcile`] corrects any drift.
#[derive(Debug, Clone)]
pub struct QuotaAccountant {
    root: PathBuf,
    policy: CapacityPolicy,
    capacity_bytes: u64,
    tracked_used: Option<Arc<AtomicU64>>,
}

impl QuotaAccountant {
    /// Create an accountant for `root`.
    ///
    /// `capacity_bytes` is only consulted under [`CapacityPolicy::Fixed`].
    pub fn new(root: impl Into<PathBuf>, policy: CapacityPolicy, capacity_bytes: u64) -> Self {
        Self {
            root: root.into(),
            policy,
            capacity_bytes,
            tracked_used: None,
        }
    }

    /// Enable the incremental used-byte counter, seeded by a full scan.
    pub fn with_tracking(mut self) -> Self {
        let used = used_bytes_on_disk(&self.root);
        self.tracked_used = Some(Arc::new(AtomicU64::new(used)));
        self
    }

    /// Get the capacity policy.
    pub fn policy(&self) -> CapacityPolicy {
        self.policy
    }

    /// Whether the incremental counter is active.
    pub fn is_tracking(&self) -> bool {
        self.tracked_used.is_some()
    }

    /// Current capacity, usage and free space.
    pub fn usage(&self) -> Result<QuotaState> {
        match self.policy {
            CapacityPolicy::Fixed => {
                let used = match &self.tracked_used {
                    Some(counter) => counter.load(Ordering::Relaxed),
                    None => used_bytes_on_disk(&self.root),
                };
                Ok(QuotaState::new(self.capacity_bytes, used))
            }
            CapacityPolicy::Device => device_usage(&self.root),
        }
    }

    /// Bytes still available for uploads.
    pub fn available_bytes(&self) -> Result<u64> {
        Ok(self.usage()?.free_bytes)
    }

    /// Account for `bytes` newly written under the root.
    pub fn record_write(&self, bytes: u64) {
        if let Some(counter) = &self.tracked_used {
            counter.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Account for `bytes` removed from under the root.
    pub fn record_removal(&self, bytes: u64) {
        if let Some(counter) = &self.tracked_used {
            // The closure always returns Some, so the update cannot fail
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_sub(bytes))
            });
        }
    }

    /// Replace the tracked counter with a fresh full scan.
    ///
    /// Returns the scanned used-byte figure. Without tracking this only scans.
    pub fn reconcile(&self) -> u64 {
        let scanned = used_bytes_on_disk(&self.root);
        if let Some(counter) = &self.tracked_used {
            let previous = counter.swap(scanned, Ordering::Relaxed);
            if previous != scanned {
                tracing::debug!(previous, scanned, "Usage counter drift corrected");
            }
        }
        scanned
    }
}

/// Sum the sizes of all regular files below `root`.
///
/// Unreadable directories and entries contribute zero instead of failing the
/// whole walk. Symlinks are not followed.
pub fn used_bytes_on_disk(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable entry in usage scan");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.metadata().map(|m| m.len()).unwrap_or(0))
        .sum()
}

#[cfg(unix)]
fn device_usage(root: &Path) -> Result<QuotaState> {
    let stat = nix::sys::statvfs::statvfs(root).map_err(std::io::Error::from)?;
    let fragment = stat.fragment_size() as u64;
    let capacity = (stat.blocks() as u64).saturating_mul(fragment);
    let available = (stat.blocks_available() as u64).saturating_mul(fragment);

    Ok(QuotaState::new(capacity, capacity.saturating_sub(available)))
}

#[cfg(not(unix))]
fn device_usage(_root: &Path) -> Result<QuotaState> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "device capacity policy requires a unix platform",
    )
    .into())
}
