//! fileshare - a home file server for one shared directory.
//!
//! Browse, upload, download and delete files under a single sandboxed root,
//! served over a small JSON API.

pub mod config;
pub mod error;
pub mod file;
pub mod format;
pub mod logging;
pub mod web;

pub use config::Config;
pub use error::{FileShareError, Result};
pub use file::{FileService, Sandbox};
pub use web::WebServer;
