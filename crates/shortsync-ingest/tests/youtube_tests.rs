//! YouTube resumable upload tests against a mock API server

#![allow(clippy::unwrap_used, clippy::expect_used)]

use reqwest::Client;
use serde_json::json;
use shortsync_ingest::credentials::StaticCredential;
use shortsync_ingest::error::{PublishError, PublishErrorKind};
use shortsync_ingest::models::{PublishRequest, Visibility};
use shortsync_ingest::sink::{PublishSink, YouTubeClient, YouTubeConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_bytes, body_partial_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const UPLOAD_PATH: &str = "/upload/youtube/v3/videos";
const SESSION_PATH: &str = "/upload/session/abc123";

fn client(server: &MockServer) -> YouTubeClient {
    YouTubeClient::new(
        Client::new(),
        YouTubeConfig {
            upload_url: server.uri(),
        },
        Arc::new(StaticCredential::new("ya29.test")),
    )
}

fn request() -> PublishRequest {
    PublishRequest {
        title: "Riddle 3".to_string(),
        description: "Auto-uploaded from Dropbox: Riddle 3.mp4".to_string(),
        category_id: "22".to_string(),
        visibility: Visibility::Private,
        tags: vec!["shorts".to_string()],
    }
}

fn staged_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("Riddle 3.mp4");
    std::fs::write(&path, b"fake video bytes").unwrap();
    path
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .and(query_param("uploadType", "resumable"))
        .and(query_param("part", "snippet,status"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(header("x-upload-content-length", "16"))
        .and(body_partial_json(json!({
            "snippet": {
                "title": "Riddle 3",
                "categoryId": "22",
                "tags": ["shorts"]
            },
            "status": { "privacyStatus": "private" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Location", format!("{}{}", server.uri(), SESSION_PATH).as_str()),
        )
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn test_resumable_upload_returns_video_id() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_session(&server).await;

    Mock::given(method("PUT"))
        .and(path(SESSION_PATH))
        .and(body_bytes(b"fake video bytes".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "youtube#video",
            "id": "dQw4w9WgXcQ",
            "status": { "uploadStatus": "uploaded", "privacyStatus": "private" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server)
        .publish(&staged_file(&dir), &request())
        .await
        .unwrap();
    assert_eq!(id, "dQw4w9WgXcQ");
}

#[tokio::test]
async fn test_missing_session_location_is_generic_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish(&staged_file(&dir), &request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), PublishErrorKind::Generic);
}

#[tokio::test]
async fn test_missing_local_file_is_io_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let err = client(&server)
        .publish(&dir.path().join("gone.mp4"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Io { .. }));
}

// ============================================================================
// Error classification
// ============================================================================

fn google_error(code: u16, reason: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": code,
            "message": "Request failed",
            "errors": [{ "domain": "youtube.quota", "reason": reason, "message": "Request failed" }]
        }
    })
}

#[tokio::test]
async fn test_quota_exceeded_on_initiation() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(google_error(403, "quotaExceeded")))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish(&staged_file(&dir), &request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), PublishErrorKind::Quota);
    assert!(err.to_string().contains("quotaExceeded"));
}

#[tokio::test]
async fn test_upload_limit_on_body_is_generic() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_session(&server).await;

    Mock::given(method("PUT"))
        .and(path(SESSION_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(google_error(400, "uploadLimitExceeded")),
        )
        .mount(&server)
        .await;

    // only 403 and 429 carry quota meaning
    let err = client(&server)
        .publish(&staged_file(&dir), &request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), PublishErrorKind::Generic);
}

#[tokio::test]
async fn test_unauthorized_is_auth() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(google_error(401, "authError")))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish(&staged_file(&dir), &request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), PublishErrorKind::Auth);
}

#[tokio::test]
async fn test_server_error_is_generic() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_session(&server).await;

    Mock::given(method("PUT"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_json(google_error(503, "backendError")))
        .mount(&server)
        .await;

    let err = client(&server)
        .publish(&staged_file(&dir), &request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), PublishErrorKind::Generic);
}
