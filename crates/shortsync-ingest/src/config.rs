//! Configuration
//!
//! Everything is read from environment variables, optionally seeded from a
//! `.env` file. [`IngestConfig::from_lookup`] does the actual parsing against
//! any key lookup so it can be exercised without touching the process
//! environment.

use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::credentials::RefreshTokenConfig;
use crate::error::{IngestError, Result};
use crate::models::{OrderingPolicy, PublishDefaults, Visibility};
use crate::pipeline::PipelineSettings;
use crate::scheduler::PollPolicy;
use crate::sink::youtube;
use crate::source::dropbox;

pub const DEFAULT_FOLDER: &str = "/Riddles Shorts";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_QUOTA_BACKOFF_SECS: u64 = 3600;
pub const DEFAULT_LEDGER_PATH: &str = "./uploaded.txt";
pub const DEFAULT_STAGING_DIR: &str = "./downloads";
pub const DEFAULT_TAGS: &str = "shorts";

/// How a client authenticates
#[derive(Clone)]
pub enum AuthSettings {
    /// Fixed bearer token
    Static { access_token: String },
    /// OAuth2 refresh-token exchange
    Refresh(RefreshTokenConfig),
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthSettings::Static { .. } => f.write_str("Static { access_token: \"***\" }"),
            AuthSettings::Refresh(config) => f
                .debug_struct("Refresh")
                .field("token_url", &config.token_url)
                .field("client_id", &config.client_id)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DropboxSettings {
    pub folder: String,
    pub auth: AuthSettings,
    pub api_url: String,
    pub content_url: String,
}

#[derive(Debug, Clone)]
pub struct YouTubeSettings {
    pub auth: AuthSettings,
    pub upload_url: String,
}

/// Complete runtime configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub dropbox: DropboxSettings,
    pub youtube: YouTubeSettings,
    pub http_timeout_secs: u64,
    pub ordering: OrderingPolicy,
    pub poll_interval_secs: u64,
    pub drain_before_sleep: bool,
    pub max_sweeps: Option<u64>,
    pub max_duration_secs: Option<u64>,
    pub quota_backoff_secs: u64,
    pub ledger_path: PathBuf,
    pub staging_dir: PathBuf,
    pub verify_content_hash: bool,
    pub show_progress: bool,
    pub publish: PublishDefaults,
}

/// Google client-secrets JSON, as downloaded from the cloud console
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    token_uri: Option<String>,
}

impl IngestConfig {
    /// Load from the process environment
    ///
    /// Dotenv files are not read here; seed the environment once with
    /// [`load_env_file`] beforehand.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let api_url = env.string_or("DROPBOX_API_URL", dropbox::DEFAULT_API_URL);
        let dropbox = DropboxSettings {
            folder: env.string_or("DROPBOX_FOLDER", DEFAULT_FOLDER),
            auth: dropbox_auth(&env, &api_url)?,
            content_url: env.string_or("DROPBOX_CONTENT_URL", dropbox::DEFAULT_CONTENT_URL),
            api_url,
        };

        let youtube = YouTubeSettings {
            auth: youtube_auth(&env)?,
            upload_url: env.string_or("YOUTUBE_UPLOAD_URL", youtube::DEFAULT_UPLOAD_URL),
        };

        let defaults = PublishDefaults::default();
        let publish = PublishDefaults {
            description: env.string_or("PUBLISH_DESCRIPTION", &defaults.description),
            category_id: env.string_or("PUBLISH_CATEGORY_ID", &defaults.category_id),
            visibility: env.parse_or("PUBLISH_VISIBILITY", Visibility::default())?,
            tags: parse_tags(&env.string_or("PUBLISH_TAGS", DEFAULT_TAGS)),
        };

        let config = Self {
            dropbox,
            youtube,
            http_timeout_secs: env.parse_or("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            ordering: env.parse_or("INGEST_ORDERING", OrderingPolicy::default())?,
            poll_interval_secs: env.parse_or("INGEST_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            drain_before_sleep: env.flag_or("INGEST_DRAIN_BEFORE_SLEEP", false)?,
            max_sweeps: env.parse_opt("INGEST_MAX_SWEEPS")?,
            max_duration_secs: env.parse_opt("INGEST_MAX_DURATION_SECS")?,
            quota_backoff_secs: env.parse_or("INGEST_QUOTA_BACKOFF_SECS", DEFAULT_QUOTA_BACKOFF_SECS)?,
            ledger_path: PathBuf::from(env.string_or("INGEST_LEDGER_PATH", DEFAULT_LEDGER_PATH)),
            staging_dir: PathBuf::from(env.string_or("INGEST_STAGING_DIR", DEFAULT_STAGING_DIR)),
            verify_content_hash: env.flag_or("INGEST_VERIFY_CONTENT_HASH", true)?,
            show_progress: env.flag_or("INGEST_SHOW_PROGRESS", false)?,
            publish,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.http_timeout_secs == 0 {
            return Err(IngestError::config("HTTP_TIMEOUT_SECS must be greater than 0"));
        }
        if self.poll_interval_secs == 0 {
            return Err(IngestError::config(
                "INGEST_POLL_INTERVAL_SECS must be greater than 0",
            ));
        }
        if self.quota_backoff_secs == 0 {
            return Err(IngestError::config(
                "INGEST_QUOTA_BACKOFF_SECS must be greater than 0",
            ));
        }
        if self.max_sweeps == Some(0) {
            return Err(IngestError::config("INGEST_MAX_SWEEPS must be greater than 0"));
        }
        if self.max_duration_secs == Some(0) {
            return Err(IngestError::config(
                "INGEST_MAX_DURATION_SECS must be greater than 0",
            ));
        }
        if self.publish.category_id.is_empty() {
            return Err(IngestError::config("PUBLISH_CATEGORY_ID must not be empty"));
        }
        if normalize(&self.ledger_path).starts_with(normalize(&self.staging_dir)) {
            return Err(IngestError::config(format!(
                "INGEST_LEDGER_PATH {} must not be inside INGEST_STAGING_DIR {}",
                self.ledger_path.display(),
                self.staging_dir.display()
            )));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            drain_before_sleep: self.drain_before_sleep,
            quota_backoff: Duration::from_secs(self.quota_backoff_secs),
            max_sweeps: self.max_sweeps,
            max_duration: self.max_duration_secs.map(Duration::from_secs),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            folder: self.dropbox.folder.clone(),
            ordering: self.ordering,
            defaults: self.publish.clone(),
        }
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                normalized.pop();
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Seed the process environment from a dotenv file
///
/// With `env_file` set, only that file is read and it must exist; otherwise
/// `./.env` is read if present. Variables already in the environment win over
/// the file.
pub fn load_env_file(env_file: Option<&Path>) -> Result<()> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                IngestError::config(format!("cannot load {}: {}", path.display(), e))
            })?;
        },
        None => {
            dotenvy::dotenv().ok();
        },
    }
    Ok(())
}

/// Ledger location alone, for commands that need no credentials
pub fn ledger_path_from_lookup<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    PathBuf::from(Env(&lookup).string_or("INGEST_LEDGER_PATH", DEFAULT_LEDGER_PATH))
}

/// Typed access to a key lookup
struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value, treating blank as unset
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_opt<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| IngestError::config(format!("{}={:?}: {}", key, raw, e)))
            })
            .transpose()
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn flag_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key).map(|v| v.to_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(IngestError::config(format!(
                    "{}={:?}: expected true or false",
                    key, v
                ))),
            },
        }
    }
}

fn dropbox_auth<F>(env: &Env<'_, F>, api_url: &str) -> Result<AuthSettings>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(access_token) = env.get("DROPBOX_ACCESS_TOKEN") {
        return Ok(AuthSettings::Static { access_token });
    }

    match (
        env.get("DROPBOX_REFRESH_TOKEN"),
        env.get("DROPBOX_APP_KEY"),
        env.get("DROPBOX_APP_SECRET"),
    ) {
        (Some(refresh_token), Some(client_id), Some(client_secret)) => {
            Ok(AuthSettings::Refresh(RefreshTokenConfig {
                token_url: format!("{}/oauth2/token", api_url),
                client_id,
                client_secret,
                refresh_token,
            }))
        },
        _ => Err(IngestError::config(
            "Dropbox credentials missing: set DROPBOX_ACCESS_TOKEN, or DROPBOX_REFRESH_TOKEN \
             with DROPBOX_APP_KEY and DROPBOX_APP_SECRET",
        )),
    }
}

fn youtube_auth<F>(env: &Env<'_, F>) -> Result<AuthSettings>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(access_token) = env.get("YOUTUBE_ACCESS_TOKEN") {
        return Ok(AuthSettings::Static { access_token });
    }

    let secrets = match env.get("CLIENT_SECRETS_FILE") {
        Some(path) => Some(read_client_secrets(Path::new(&path))?),
        None => None,
    };

    let client_id = env
        .get("YOUTUBE_CLIENT_ID")
        .or_else(|| secrets.as_ref().map(|s| s.client_id.clone()));
    let client_secret = env
        .get("YOUTUBE_CLIENT_SECRET")
        .or_else(|| secrets.as_ref().map(|s| s.client_secret.clone()));
    let token_url = env
        .get("YOUTUBE_TOKEN_URL")
        .or_else(|| secrets.as_ref().and_then(|s| s.token_uri.clone()))
        .unwrap_or_else(|| youtube::DEFAULT_TOKEN_URL.to_string());

    match (env.get("YOUTUBE_REFRESH_TOKEN"), client_id, client_secret) {
        (Some(refresh_token), Some(client_id), Some(client_secret)) => {
            Ok(AuthSettings::Refresh(RefreshTokenConfig {
                token_url,
                client_id,
                client_secret,
                refresh_token,
            }))
        },
        _ => Err(IngestError::config(
            "YouTube credentials missing: set YOUTUBE_ACCESS_TOKEN, or YOUTUBE_REFRESH_TOKEN \
             with YOUTUBE_CLIENT_ID and YOUTUBE_CLIENT_SECRET (or CLIENT_SECRETS_FILE)",
        )),
    }
}

fn read_client_secrets(path: &Path) -> Result<ClientSecrets> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        IngestError::config(format!("cannot read CLIENT_SECRETS_FILE {}: {}", path.display(), e))
    })?;
    let file: ClientSecretsFile = serde_json::from_str(&raw).map_err(|e| {
        IngestError::config(format!("invalid CLIENT_SECRETS_FILE {}: {}", path.display(), e))
    })?;

    file.installed.or(file.web).ok_or_else(|| {
        IngestError::config(format!(
            "CLIENT_SECRETS_FILE {} has neither an \"installed\" nor a \"web\" section",
            path.display()
        ))
    })
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
