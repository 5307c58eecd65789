//! Web API module for fileshare.
//!
//! A JSON-over-HTTP transport for the [`FileService`](crate::FileService)
//! operations: browse, download, upload, delete, directory creation and the
//! storage pre-flight check.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::{create_health_router, create_router, ApiDoc};
pub use server::WebServer;
