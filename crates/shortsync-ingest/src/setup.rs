//! Construction of the production pipeline from configuration

use reqwest::Client;
use std::sync::Arc;
use tracing::info;

use crate::config::{AuthSettings, IngestConfig};
use crate::credentials::{CredentialProvider, RefreshTokenProvider, StaticCredential};
use crate::error::Result;
use crate::ledger::FileLedger;
use crate::pipeline::IngestionPipeline;
use crate::sink::{YouTubeClient, YouTubeConfig};
use crate::source::{DropboxClient, DropboxConfig};
use crate::staging::StagingStore;

/// Pipeline wired to Dropbox, YouTube and a file ledger
pub type DefaultPipeline = IngestionPipeline<DropboxClient, YouTubeClient, FileLedger>;

/// Shared HTTP client with the configured request timeout
pub fn http_client(config: &IngestConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!("shortsync/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub fn credential_provider(client: &Client, auth: &AuthSettings) -> Arc<dyn CredentialProvider> {
    match auth {
        AuthSettings::Static { access_token } => Arc::new(StaticCredential::new(access_token.clone())),
        AuthSettings::Refresh(refresh) => {
            Arc::new(RefreshTokenProvider::new(client.clone(), refresh.clone()))
        },
    }
}

/// Open the staging directory and clear anything a previous run left behind
pub fn open_staging(config: &IngestConfig) -> Result<StagingStore> {
    let staging = StagingStore::open(&config.staging_dir)?
        .with_content_hash(config.verify_content_hash)
        .with_progress(config.show_progress);
    staging.purge()?;
    Ok(staging)
}

/// Build the full pipeline
pub fn build_pipeline(config: &IngestConfig) -> Result<DefaultPipeline> {
    let client = http_client(config)?;

    let source = DropboxClient::new(
        client.clone(),
        DropboxConfig {
            api_url: config.dropbox.api_url.clone(),
            content_url: config.dropbox.content_url.clone(),
        },
        credential_provider(&client, &config.dropbox.auth),
    );

    let sink = YouTubeClient::new(
        client.clone(),
        YouTubeConfig {
            upload_url: config.youtube.upload_url.clone(),
        },
        credential_provider(&client, &config.youtube.auth),
    );

    let ledger = FileLedger::open(&config.ledger_path)?;
    let staging = open_staging(config)?;

    info!(
        folder = %config.dropbox.folder,
        ordering = %config.ordering,
        ledger = %config.ledger_path.display(),
        staging = %config.staging_dir.display(),
        visibility = %config.publish.visibility,
        "Pipeline ready"
    );

    Ok(IngestionPipeline::new(
        source,
        sink,
        ledger,
        staging,
        config.pipeline_settings(),
    ))
}
