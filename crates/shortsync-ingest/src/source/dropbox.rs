//! Dropbox HTTP API v2 listing source
//!
//! Listing goes through `files/list_folder` (following `has_more` cursors) on
//! the API host; downloads go through `files/download` on the content host,
//! with the request argument carried in the `Dropbox-API-Arg` header.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ByteStream, RemoteSource};
use crate::credentials::CredentialProvider;
use crate::error::SourceError;
use crate::models::RemoteEntry;

/// Production API host.
pub const DEFAULT_API_URL: &str = "https://api.dropboxapi.com";

/// Production content (upload/download) host.
pub const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com";

/// Page size requested from `list_folder`.
pub const LIST_PAGE_LIMIT: u32 = 2000;

/// Dropbox endpoints
#[derive(Debug, Clone)]
pub struct DropboxConfig {
    pub api_url: String,
    pub content_url: String,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            content_url: DEFAULT_CONTENT_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<RawEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = ".tag")]
    tag: String,
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    path_lower: Option<String>,
    #[serde(default)]
    client_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    content_hash: Option<String>,
}

impl RawEntry {
    fn into_remote_entry(self) -> Option<RemoteEntry> {
        if self.tag != "file" {
            return None;
        }

        let Some(locator) = self.id.or(self.path_lower) else {
            warn!(name = %self.name, "Dropbox entry has neither id nor path, ignoring");
            return None;
        };

        Some(RemoteEntry {
            name: self.name,
            locator,
            modified_at: self
                .client_modified
                .or(self.server_modified)
                .unwrap_or_default(),
            size: self.size,
            content_hash: self.content_hash,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error_summary: String,
}

/// Dropbox API client implementing [`RemoteSource`]
pub struct DropboxClient {
    client: Client,
    config: DropboxConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl DropboxClient {
    pub fn new(
        client: Client,
        config: DropboxConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            config,
            credentials,
        }
    }

    async fn post_json(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<ListFolderResponse, SourceError> {
        let credential = self.credentials.valid_credential().await?;
        let url = format!("{}/2/{}", self.config.api_url, endpoint);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credential.access_token)
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| SourceError::Decode(format!("{} response: {}", endpoint, e)))
    }
}

#[async_trait]
impl RemoteSource for DropboxClient {
    async fn list(&self, folder: &str) -> Result<Vec<RemoteEntry>, SourceError> {
        let mut page = self
            .post_json(
                "files/list_folder",
                &json!({
                    "path": normalize_folder(folder),
                    "recursive": false,
                    "include_deleted": false,
                    "limit": LIST_PAGE_LIMIT,
                }),
            )
            .await?;

        let mut raw = std::mem::take(&mut page.entries);
        let mut pages = 1;

        while page.has_more {
            debug!(pages, cursor = %page.cursor, "Fetching next listing page");
            page = self
                .post_json("files/list_folder/continue", &json!({ "cursor": page.cursor }))
                .await?;
            raw.append(&mut page.entries);
            pages += 1;
        }

        let total = raw.len();
        let entries: Vec<RemoteEntry> = raw
            .into_iter()
            .filter_map(RawEntry::into_remote_entry)
            .collect();

        info!(
            folder,
            pages,
            files = entries.len(),
            ignored = total - entries.len(),
            "Listed Dropbox folder"
        );

        Ok(entries)
    }

    async fn fetch(&self, locator: &str) -> Result<ByteStream, SourceError> {
        let credential = self.credentials.valid_credential().await?;
        let url = format!("{}/2/files/download", self.config.content_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credential.access_token)
            .header("Dropbox-API-Arg", header_safe_json(&json!({ "path": locator })))
            .send()
            .await?;

        let response = check_status(response).await?;
        debug!(locator, content_length = ?response.content_length(), "Download started");

        Ok(response
            .bytes_stream()
            .map_err(SourceError::from)
            .boxed())
    }
}

/// Map non-success responses onto [`SourceError`]
async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let summary = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.error_summary)
        .unwrap_or_else(|_| body.trim().to_string());

    Err(match status.as_u16() {
        401 => SourceError::Auth(summary),
        409 if summary.contains("not_found") => SourceError::NotFound(summary),
        429 => SourceError::RateLimited(summary),
        code => SourceError::Remote {
            status: code,
            message: summary,
        },
    })
}

/// Dropbox addresses the root folder as the empty string
fn normalize_folder(folder: &str) -> String {
    let trimmed = folder.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') || trimmed.starts_with("id:") {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Serialize for an HTTP header: every non-ASCII or DEL character is escaped
fn header_safe_json(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folder() {
        assert_eq!(normalize_folder("/"), "");
        assert_eq!(normalize_folder(""), "");
        assert_eq!(normalize_folder("/Riddles Shorts/"), "/Riddles Shorts");
        assert_eq!(normalize_folder("Riddles Shorts"), "/Riddles Shorts");
        assert_eq!(normalize_folder("id:a4ayc_80_OEAAAAAAAAAXw"), "id:a4ayc_80_OEAAAAAAAAAXw");
    }

    #[test]
    fn test_header_safe_json_escapes_non_ascii() {
        let header = header_safe_json(&json!({ "path": "/Rätsel/🎬.mp4" }));
        assert!(header.is_ascii());
        assert_eq!(header, r#"{"path":"/R\u00e4tsel/\ud83c\udfac.mp4"}"#);

        // escaped header decodes back to the original value
        let decoded: serde_json::Value = serde_json::from_str(&header).unwrap();
        assert_eq!(decoded["path"], "/Rätsel/🎬.mp4");
    }

    #[test]
    fn test_listing_entries_are_converted() {
        let page: ListFolderResponse = serde_json::from_value(json!({
            "entries": [
                {
                    ".tag": "file",
                    "name": "b.mp4",
                    "id": "id:bbb",
                    "path_lower": "/riddles shorts/b.mp4",
                    "client_modified": "2024-03-01T10:00:00Z",
                    "server_modified": "2024-03-02T10:00:00Z",
                    "rev": "a1c10ce0dd78",
                    "size": 1024,
                    "content_hash": "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
                },
                { ".tag": "folder", "name": "archive", "id": "id:dir", "path_lower": "/riddles shorts/archive" },
                { ".tag": "deleted", "name": "gone.mp4", "path_lower": "/riddles shorts/gone.mp4" },
                { ".tag": "file", "name": "c.mp4", "path_lower": "/riddles shorts/c.mp4", "server_modified": "2024-01-01T00:00:00Z" }
            ],
            "cursor": "AAF",
            "has_more": false
        }))
        .unwrap();

        let entries: Vec<RemoteEntry> = page
            .entries
            .into_iter()
            .filter_map(RawEntry::into_remote_entry)
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "b.mp4");
        assert_eq!(entries[0].locator, "id:bbb");
        assert_eq!(entries[0].modified_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(entries[0].size, Some(1024));

        // no id: falls back to the lower-cased path and server time
        assert_eq!(entries[1].locator, "/riddles shorts/c.mp4");
        assert_eq!(entries[1].modified_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }
}
