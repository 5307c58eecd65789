//! Request DTOs for the file API.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::validation::{no_control_chars, not_empty_trimmed};
use crate::file::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Pagination for directory listings.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BrowseQuery {
    /// Page number (1-based).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Entries per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for BrowseQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl BrowseQuery {
    /// Clamp to the accepted range.
    pub fn normalized(&self) -> (u32, u32) {
        (self.page.max(1), self.per_page.clamp(1, MAX_PAGE_SIZE))
    }
}

/// Target directory for a streamed upload.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Directory relative to the shared root.
    #[serde(default)]
    pub path: String,
}

/// Create-directory request.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDirectoryRequest {
    /// Parent directory relative to the shared root.
    #[serde(default)]
    #[validate(custom(function = "no_control_chars"))]
    pub path: String,
    /// Name of the new directory.
    #[validate(
        length(max = 255, message = "Must be at most 255 characters"),
        custom(function = "not_empty_trimmed"),
        custom(function = "no_control_chars")
    )]
    pub name: String,
}

/// Storage pre-flight request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StorageCheckRequest {
    /// Size of the intended upload in bytes.
    #[serde(default)]
    pub size: u64,
}
