//! Router configuration for the web API.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::dto::{
    BreadcrumbResponse, BrowseResponse, CreateDirectoryRequest, CreateDirectoryResponse,
    DeleteResponse, EntryResponse, PaginationMeta, SkippedFileResponse, StorageCheckRequest,
    StorageCheckResponse, UploadResponse,
};
use super::handlers::{self, AppState};
use super::middleware::create_cors_layer;

/// OpenAPI description of the file API.
#[derive(OpenApi)]
#[openapi(
    info(title = "fileshare", description = "Home file server API"),
    paths(
        handlers::browse_root,
        handlers::browse,
        handlers::download,
        handlers::upload,
        handlers::delete,
        handlers::create_directory,
        handlers::storage_check,
    ),
    components(schemas(
        BrowseResponse,
        EntryResponse,
        BreadcrumbResponse,
        PaginationMeta,
        UploadResponse,
        SkippedFileResponse,
        CreateDirectoryRequest,
        CreateDirectoryResponse,
        DeleteResponse,
        StorageCheckRequest,
        StorageCheckResponse,
    )),
    tags(
        (name = "files", description = "Browse, transfer and delete files"),
        (name = "storage", description = "Free space")
    )
)]
pub struct ApiDoc;

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    // Multipart bodies are capped here; streamed bodies are checked by the handler
    let body_limit = usize::try_from(app_state.max_upload_size).unwrap_or(usize::MAX);

    let api_routes = Router::new()
        .route("/browse", get(handlers::browse_root))
        .route("/browse/*path", get(handlers::browse))
        .route("/download/*path", get(handlers::download))
        .route("/upload", post(handlers::upload))
        .route("/delete/*path", post(handlers::delete))
        .route("/directories", post(handlers::create_directory))
        .route("/storage-check", post(handlers::storage_check))
        .route("/openapi.json", get(openapi_json));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

/// Serve the OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_file_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/api/browse",
            "/api/browse/{path}",
            "/api/download/{path}",
            "/api/upload",
            "/api/delete/{path}",
            "/api/directories",
            "/api/storage-check",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }
}
