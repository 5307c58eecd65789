//! Concurrency tests for fileshare.
//!
//! Uploads racing for the same name must each end up in a distinct file,
//! and racing directory creation must succeed exactly once.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use fileshare::config::{CapacityPolicy, DeletePolicy};
use fileshare::file::{QuotaAccountant, Sandbox, UploadFile};
use fileshare::web::handlers::AppState;
use fileshare::web::router::create_router;
use fileshare::{FileService, FileShareError};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Setup a service over a fresh shared directory.
fn setup_service(track_usage: bool) -> (TempDir, FileService) {
    let temp_dir = TempDir::new().unwrap();
    let sandbox = Sandbox::new(temp_dir.path()).unwrap();
    let mut quota = QuotaAccountant::new(sandbox.root(), CapacityPolicy::Fixed, 1024 * 1024);
    if track_usage {
        quota = quota.with_tracking();
    }
    let service = FileService::from_parts(sandbox, quota, DeletePolicy::FilesOnly);
    (temp_dir, service)
}

/// Test concurrent batch uploads of the same filename.
///
/// Every upload must claim its own name; none may overwrite another.
#[tokio::test]
async fn test_concurrent_same_name_uploads() {
    let (temp_dir, service) = setup_service(false);

    const NUM_UPLOADS: usize = 16;

    let mut handles = Vec::new();
    for i in 0..NUM_UPLOADS {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let content = format!("upload {i}").into_bytes();
            service
                .upload_batch("", vec![UploadFile::new("photo.jpg", content)])
                .await
                .unwrap()
        }));
    }

    let mut names = HashSet::new();
    for handle in handles {
        let report = handle.await.unwrap();
        assert_eq!(report.written_count(), 1);
        names.insert(report.written[0].clone());
    }

    assert_eq!(names.len(), NUM_UPLOADS);
    assert!(names.contains("photo.jpg"));
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), NUM_UPLOADS);

    // Each file still holds exactly what one uploader wrote
    let contents: HashSet<String> = names
        .iter()
        .map(|n| fs::read_to_string(temp_dir.path().join(n)).unwrap())
        .collect();
    assert_eq!(contents.len(), NUM_UPLOADS);
}

/// Test concurrent streamed uploads through the HTTP router.
#[tokio::test]
async fn test_concurrent_streamed_uploads_over_http() {
    let (temp_dir, service) = setup_service(false);
    let router = create_router(Arc::new(AppState::new(service, 1024 * 1024)), &[]);

    const NUM_UPLOADS: usize = 8;

    let mut handles = Vec::new();
    for _ in 0..NUM_UPLOADS {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header("x-filename", "backup.tar")
                .body(Body::from(vec![0u8; 4096]))
                .unwrap();

            let response = router.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let json: Value = serde_json::from_slice(&body).unwrap();
            json["data"]["written"][0].as_str().unwrap().to_string()
        }));
    }

    let mut names = HashSet::new();
    for handle in handles {
        names.insert(handle.await.unwrap());
    }

    assert_eq!(names.len(), NUM_UPLOADS);
    for name in &names {
        assert_eq!(fs::metadata(temp_dir.path().join(name)).unwrap().len(), 4096);
    }
}

/// Test racing creation of one directory name.
#[tokio::test]
async fn test_concurrent_create_directory() {
    let (temp_dir, service) = setup_service(false);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.create_directory("", "Shared").await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(path) => {
                assert_eq!(path, "Shared");
                created += 1;
            }
            Err(FileShareError::AlreadyExists(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(created, 1);
    assert!(temp_dir.path().join("Shared").is_dir());
}

/// Test that tracked usage stays exact under concurrent uploads and deletes.
#[tokio::test]
async fn test_tracked_usage_under_concurrency() {
    let (_temp_dir, service) = setup_service(true);

    let mut handles = Vec::new();
    for i in 0..10 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("file{i}.bin");
            service
                .upload_batch("", vec![UploadFile::new(name.clone(), vec![0u8; 100])])
                .await
                .unwrap();
            if i % 2 == 0 {
                service.delete(&name).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let tracked = service.usage().await.unwrap().used_bytes;
    assert_eq!(tracked, 500);
    assert_eq!(service.quota().reconcile(), 500);
}
