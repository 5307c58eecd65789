//! Removal of a single file or directory.

use std::fs;
use std::io;
use std::path::Path;

use super::quota::{used_bytes_on_disk, QuotaAccountant};
use super::resolver::Sandbox;
use crate::config::DeletePolicy;
use crate::{FileShareError, Result};

/// Validates and performs deletions under one explicit policy.
///
/// The sandbox root itself is never removable, whatever the policy.
#[derive(Debug, Clone)]
pub struct DeletionGuard {
    sandbox: Sandbox,
    quota: QuotaAccountant,
    policy: DeletePolicy,
}

impl DeletionGuard {
    /// Create a new guard.
    pub fn new(sandbox: Sandbox, quota: QuotaAccountant, policy: DeletePolicy) -> Self {
        Self {
            sandbox,
            quota,
            policy,
        }
    }

    /// Get the delete policy.
    pub fn policy(&self) -> DeletePolicy {
        self.policy
    }

    /// Delete `path`, which must already be resolved through the sandbox.
    ///
    /// Returns the number of file bytes removed. Symlinks are removed
    /// themselves, never their targets.
    pub fn delete(&self, path: &Path) -> Result<u64> {
        let rel = self.sandbox.relative_of(path);

        if self.sandbox.is_root(path) {
            return Err(FileShareError::PermissionDenied(
                "the shared root cannot be deleted".to_string(),
            ));
        }

        let metadata = fs::symlink_metadata(path)
            .map_err(|e| FileShareError::from_io(e, format!("'{rel}'")))?;

        let removed = if metadata.is_dir() {
            if self.policy == DeletePolicy::FilesOnly {
                return Err(FileShareError::IsADirectory(rel));
            }
            let bytes = used_bytes_on_disk(path);
            fs::remove_dir_all(path).map_err(|e| self.removal_error(e, &rel))?;
            bytes
        } else {
            let bytes = if metadata.is_file() { metadata.len() } else { 0 };
            fs::remove_file(path).map_err(|e| self.removal_error(e, &rel))?;
            bytes
        };

        self.quota.record_removal(removed);
        tracing::info!(path = %rel, bytes = removed, "Deleted");
        Ok(removed)
    }

    fn removal_error(&self, err: io::Error, rel: &str) -> FileShareError {
        tracing::warn!(path = %rel, error = %err, "Delete failed");
        FileShareError::from_io(err, format!("'{rel}'"))
    }
}
