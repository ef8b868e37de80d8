//! YouTube Data API v3 resumable upload
//!
//! An upload is two requests: an initiation `POST` carrying the video
//! resource as JSON, which answers with the session URI in `Location`, and a
//! `PUT` of the raw file to that URI, which answers with the created video.

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::PublishSink;
use crate::credentials::CredentialProvider;
use crate::error::PublishError;
use crate::models::PublishRequest;

/// Production upload host.
pub const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com";

/// Google OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// 403 reasons that mean "try again later" rather than "not allowed".
const QUOTA_REASONS: &[&str] = &[
    "quotaExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "uploadLimitExceeded",
    "dailyLimitExceeded",
];

const VIDEO_CONTENT_TYPE: &str = "video/*";

#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub upload_url: String,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    category_id: &'a str,
    tags: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Status<'a> {
    privacy_status: &'a str,
    self_declared_made_for_kids: bool,
}

#[derive(Debug, Serialize)]
struct VideoInsert<'a> {
    snippet: Snippet<'a>,
    status: Status<'a>,
}

impl<'a> VideoInsert<'a> {
    fn from_request(request: &'a PublishRequest) -> Self {
        Self {
            snippet: Snippet {
                title: &request.title,
                description: &request.description,
                category_id: &request.category_id,
                tags: &request.tags,
            },
            status: Status {
                privacy_status: request.visibility.as_str(),
                self_declared_made_for_kids: false,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorItem {
    #[serde(default)]
    reason: String,
}

/// YouTube client implementing [`PublishSink`]
pub struct YouTubeClient {
    client: Client,
    config: YouTubeConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl YouTubeClient {
    pub fn new(
        client: Client,
        config: YouTubeConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            config,
            credentials,
        }
    }

    /// Initiate a resumable session and return its URI
    async fn start_session(
        &self,
        token: &str,
        size: u64,
        request: &PublishRequest,
    ) -> Result<String, PublishError> {
        let url = format!(
            "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
            self.config.upload_url
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("X-Upload-Content-Length", size)
            .header("X-Upload-Content-Type", VIDEO_CONTENT_TYPE)
            .json(&VideoInsert::from_request(request))
            .send()
            .await?;

        let response = check_status(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                PublishError::Remote("upload session response had no Location header".to_string())
            })
    }
}

#[async_trait]
impl PublishSink for YouTubeClient {
    async fn publish(&self, file: &Path, request: &PublishRequest) -> Result<String, PublishError> {
        let io_err = |source| PublishError::Io {
            path: file.to_path_buf(),
            source,
        };

        let size = tokio::fs::metadata(file).await.map_err(io_err)?.len();
        let credential = self.credentials.valid_credential().await?;

        let session = self
            .start_session(&credential.access_token, size, request)
            .await?;
        debug!(title = %request.title, size, "Upload session opened");

        let handle = tokio::fs::File::open(file).await.map_err(io_err)?;
        let response = self
            .client
            .put(&session)
            .bearer_auth(&credential.access_token)
            .header(CONTENT_LENGTH, size)
            .header(CONTENT_TYPE, VIDEO_CONTENT_TYPE)
            .body(Body::wrap_stream(ReaderStream::new(handle)))
            .send()
            .await?;

        let response = check_status(response).await?;
        let video: VideoResource = response
            .json()
            .await
            .map_err(|e| PublishError::Remote(format!("unexpected upload response: {}", e)))?;

        info!(title = %request.title, video_id = %video.id, visibility = %request.visibility, "Video uploaded");
        Ok(video.id)
    }
}

async fn check_status(response: Response) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify(status.as_u16(), &body))
}

/// Map a failed response onto auth, quota or generic failure
fn classify(status: u16, body: &str) -> PublishError {
    let (reason, message) = match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(parsed) => {
            let reason = parsed
                .error
                .errors
                .into_iter()
                .map(|e| e.reason)
                .find(|r| !r.is_empty())
                .unwrap_or_default();
            (reason, parsed.error.message)
        },
        Err(_) => (String::new(), body.trim().to_string()),
    };

    let detail = if reason.is_empty() {
        format!("HTTP {}: {}", status, message)
    } else {
        format!("HTTP {} {}: {}", status, reason, message)
    };

    match status {
        401 => PublishError::Auth(detail),
        403 if QUOTA_REASONS.contains(&reason.as_str()) => PublishError::Quota(detail),
        403 => PublishError::Auth(detail),
        429 => PublishError::Quota(detail),
        _ => PublishError::Remote(detail),
    }
}
