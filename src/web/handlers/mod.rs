//! API handlers for the file server.

pub mod file;

pub use file::*;

use crate::FileService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// File repository and transfer engine.
    pub service: FileService,
    /// Maximum accepted upload body in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: FileService, max_upload_size: u64) -> Self {
        Self {
            service,
            max_upload_size,
        }
    }
}
