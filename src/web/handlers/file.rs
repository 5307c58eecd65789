//! File handlers for the web API.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap},
    response::Response,
    Json,
};
use tokio_util::io::ReaderStream;

use crate::file::{UploadReport, STREAM_CHUNK_SIZE};
use crate::web::dto::{
    ApiResponse, BrowseQuery, BrowseResponse, CreateDirectoryRequest, CreateDirectoryResponse,
    DeleteResponse, StorageCheckRequest, StorageCheckResponse, UploadQuery, UploadResponse,
    ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Header carrying the filename of a streamed upload.
pub const FILENAME_HEADER: &str = "x-filename";

/// Multipart field naming the target directory of a batch upload.
const CURRENT_PATH_FIELD: &str = "current_path";

/// Multipart field carrying one uploaded file.
const FILES_FIELD: &str = "files";

/// Build a Content-Disposition value for a download.
///
/// The quoted `filename` is an ASCII-only fallback: control characters are
/// dropped and quotes, backslashes and non-ASCII characters become `_`.
/// Anything that needed replacing is also sent as an RFC 5987 `filename*`.
fn content_disposition_header(filename: &str) -> String {
    let needs_encoding = filename
        .chars()
        .any(|c| !c.is_ascii() || c.is_control() || c == '"' || c == '\\');

    if !needs_encoding {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let fallback: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    let encoded = urlencoding::encode(filename);

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

/// Filename of a streamed upload, percent-decoded when the client encoded it.
fn streamed_filename(headers: &HeaderMap) -> Result<String, ApiError> {
    let raw = headers
        .get(FILENAME_HEADER)
        .ok_or_else(|| ApiError::bad_request("Missing X-Filename header"))?
        .to_str()
        .map_err(|_| ApiError::bad_request("Invalid X-Filename header"))?;

    let name = urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string());

    if name.trim().is_empty() {
        return Err(ApiError::bad_request("Empty X-Filename header"));
    }
    Ok(name)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

async fn browse_dir(
    state: &AppState,
    path: &str,
    query: &BrowseQuery,
) -> Result<Json<ApiResponse<BrowseResponse>>, ApiError> {
    let (page, per_page) = query.normalized();
    let result = state.service.browse(path, page, per_page).await?;
    Ok(Json(ApiResponse::new(result.into())))
}

/// GET /api/browse - List the shared root.
#[utoipa::path(
    get,
    path = "/api/browse",
    tag = "files",
    params(BrowseQuery),
    responses(
        (status = 200, description = "Directory listing", body = BrowseResponse)
    )
)]
pub async fn browse_root(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<ApiResponse<BrowseResponse>>, ApiError> {
    browse_dir(&state, "", &query).await
}

/// GET /api/browse/*path - List a directory.
///
/// Paths that would leave the shared root list the root instead.
#[utoipa::path(
    get,
    path = "/api/browse/{path}",
    tag = "files",
    params(
        ("path" = String, Path, description = "Directory relative to the shared root"),
        BrowseQuery
    ),
    responses(
        (status = 200, description = "Directory listing", body = BrowseResponse),
        (status = 400, description = "Not a directory"),
        (status = 404, description = "Directory not found")
    )
)]
pub async fn browse(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<ApiResponse<BrowseResponse>>, ApiError> {
    browse_dir(&state, &path, &query).await
}

/// GET /api/download/*path - Stream a file.
#[utoipa::path(
    get,
    path = "/api/download/{path}",
    tag = "files",
    params(
        ("path" = String, Path, description = "File relative to the shared root")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Path is a directory"),
        (status = 404, description = "File not found")
    )
)]
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.service.download(&path).await?;

    let mime_type = mime_guess::from_path(&download.name)
        .first_or_octet_stream()
        .to_string();
    let stream = ReaderStream::with_capacity(download.file, STREAM_CHUNK_SIZE);

    Response::builder()
        .header(header::CONTENT_TYPE, mime_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&download.name),
        )
        .header(header::CONTENT_LENGTH, download.size)
        .body(Body::from_stream(stream))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// POST /api/upload - Upload files.
///
/// A `multipart/form-data` body is a batch: an optional `current_path` text
/// field followed by any number of `files` fields, each written to disk as it
/// arrives. Any other body is one streamed file named
/// by the `X-Filename` header and stored in the directory given by `?path=`.
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "files",
    params(UploadQuery),
    responses(
        (status = 200, description = "Upload processed; see skipped for files not stored", body = UploadResponse),
        (status = 400, description = "Malformed upload"),
        (status = 413, description = "Upload too large")
    )
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    request: Request,
) -> Result<Json<ApiResponse<UploadResponse>>, ApiError> {
    if let Some(len) = declared_length(&headers) {
        if len > state.max_upload_size {
            return Err(ApiError::payload_too_large(format!(
                "Upload too large (max {}MB)",
                state.max_upload_size / 1024 / 1024
            )));
        }
    }

    let report = if is_multipart(&headers) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {}", e)))?;
        write_batch(&state, multipart, query.path).await?
    } else {
        let name = streamed_filename(&headers)?;
        let stream = request.into_body().into_data_stream();
        state
            .service
            .upload_stream(&query.path, &name, declared_length(&headers), stream)
            .await?
    };

    Ok(Json(ApiResponse::new(report.into())))
}

/// Stream every `files` field of a batch upload to disk as it arrives.
///
/// The target directory is `current_path` when that field comes before the
/// first file, else `default_target`.
async fn write_batch(
    state: &AppState,
    mut multipart: Multipart,
    default_target: String,
) -> Result<UploadReport, ApiError> {
    let mut target = default_target;
    let mut batch = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        match field.name().unwrap_or("") {
            CURRENT_PATH_FIELD => {
                if batch.is_some() {
                    return Err(ApiError::bad_request(
                        "current_path must come before the files",
                    ));
                }
                target = field
                    .text()
                    .await
                    .map_err(|_| ApiError::bad_request("Invalid current_path"))?;
            }
            FILES_FIELD => {
                // A file input left empty still posts a part with no filename
                let Some(name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                if name.is_empty() {
                    continue;
                }
                if batch.is_none() {
                    batch = Some(state.service.begin_batch(&target).await?);
                }
                if let Some(upload) = batch.as_mut() {
                    upload.add_file(&name, None, field).await?;
                }
            }
            other => tracing::debug!(field = other, "Ignoring multipart field"),
        }
    }

    match batch {
        Some(batch) => Ok(batch.finish()),
        None => Err(ApiError::bad_request("No files provided")),
    }
}

/// POST /api/delete/*path - Delete a file (or a directory, when allowed).
#[utoipa::path(
    post,
    path = "/api/delete/{path}",
    tag = "files",
    params(
        ("path" = String, Path, description = "Entry relative to the shared root")
    ),
    responses(
        (status = 200, description = "Deleted", body = DeleteResponse),
        (status = 400, description = "Directory deletion not allowed"),
        (status = 403, description = "The shared root cannot be deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    let sandbox = state.service.sandbox();
    let display = sandbox.relative_of(&sandbox.resolve(&path));
    let freed = state.service.delete(&path).await?;
    Ok(Json(ApiResponse::new(DeleteResponse {
        path: display,
        freed,
    })))
}

/// POST /api/directories - Create a subdirectory.
#[utoipa::path(
    post,
    path = "/api/directories",
    tag = "files",
    request_body = CreateDirectoryRequest,
    responses(
        (status = 200, description = "Directory created", body = CreateDirectoryResponse),
        (status = 409, description = "Name already taken"),
        (status = 422, description = "Invalid name")
    )
)]
pub async fn create_directory(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateDirectoryRequest>,
) -> Result<Json<ApiResponse<CreateDirectoryResponse>>, ApiError> {
    let path = state
        .service
        .create_directory(&req.path, req.name.trim())
        .await?;
    Ok(Json(ApiResponse::new(CreateDirectoryResponse { path })))
}

/// POST /api/storage-check - Check whether an upload of a given size fits.
#[utoipa::path(
    post,
    path = "/api/storage-check",
    tag = "storage",
    request_body = StorageCheckRequest,
    responses(
        (status = 200, description = "Free space report", body = StorageCheckResponse)
    )
)]
pub async fn storage_check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StorageCheckRequest>,
) -> Result<Json<ApiResponse<StorageCheckResponse>>, ApiError> {
    let check = state.service.storage_check(req.size).await?;
    Ok(Json(ApiResponse::new(check.into())))
}
