//! The publish workflow: credentials → archive → upload → outcome.
//!
//! A [`Publisher`] owns its collaborators and exposes a single operation,
//! [`Publisher::publish`]. Each call:
//!   - loads the stored account and refuses to go further without a login
//!   - zips the source directory into a fresh temporary `.zip` file
//!   - uploads it through the [`WidgetUploader`]
//!   - maps the known API rejections to guidance messages
//!
//! The temporary archive is a [`NamedTempFile`] owned by the call, so it is
//! removed on every exit path, including archive and upload failures.
//!
//! # Error Handling
//! Every failure is returned as a [`PublishError`]; nothing in here panics or
//! exits the process.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use reqwest::Url;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::archive::{write_archive, ArchiveError, ArchiveRequest, ArchiveSummary};
use crate::config::PublishSettings;
use crate::contract::{CredentialError, CredentialProvider, UploadError, UploadRequest, WidgetUploader};

/// Message the API uses when the account does not belong to the organization.
///
/// Matching on it is a heuristic: the API sends no structured error code.
pub const INVALID_ORGANIZATION_MESSAGE: &str = "organizationId is not valid";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("You must log in first")]
    NotAuthenticated,
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("failed to create temporary archive file: {0}")]
    TempFile(#[source] std::io::Error),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("cannot build widgets endpoint: {0}")]
    Endpoint(String),
    #[error("You must set an organization you belong to")]
    InvalidOrganization,
    #[error(transparent)]
    Upload(UploadError),
}

impl From<UploadError> for PublishError {
    fn from(e: UploadError) -> Self {
        if e.upstream_message() == Some(INVALID_ORGANIZATION_MESSAGE) {
            PublishError::InvalidOrganization
        } else {
            PublishError::Upload(e)
        }
    }
}

/// `{api_base}v1/widgets?auth_token={auth_token}`
pub fn widgets_endpoint(api_base: &Url, auth_token: &str) -> Result<Url, PublishError> {
    let mut url = api_base
        .join("v1/widgets")
        .map_err(|e| PublishError::Endpoint(e.to_string()))?;
    url.query_pairs_mut().append_pair("auth_token", auth_token);
    Ok(url)
}

pub struct Publisher<C, U> {
    credentials: C,
    uploader: U,
    settings: PublishSettings,
    source_dir: PathBuf,
}

impl<C, U> Publisher<C, U>
where
    C: CredentialProvider,
    U: WidgetUploader,
{
    pub fn new(
        credentials: C,
        uploader: U,
        settings: PublishSettings,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            credentials,
            uploader,
            settings,
            source_dir: source_dir.into(),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Archive the source directory and upload it as a widget.
    ///
    /// Returns the JSON body the API answered with.
    pub async fn publish(&self) -> Result<serde_json::Value, PublishError> {
        info!("Publishing...");

        let account = self
            .credentials
            .credentials()
            .map_err(|e| {
                error!(error = ?e, "Failed to read stored credentials");
                e
            })?
            .into_account()
            .ok_or_else(|| {
                error!("No stored email or auth token, refusing to publish");
                PublishError::NotAuthenticated
            })?;
        info!(
            email = %account.email,
            organization_id = account.organization_id.as_deref().unwrap_or("none"),
            "Publishing as stored account"
        );

        let endpoint = widgets_endpoint(&self.settings.api_base, &account.auth_token)?;

        let archive = tempfile::Builder::new()
            .prefix("widget-")
            .suffix(".zip")
            .tempfile()
            .map_err(|e| {
                error!(error = ?e, "Failed to create temporary archive file");
                PublishError::TempFile(e)
            })?;
        debug!(path = %archive.path().display(), "Allocated temporary archive");

        let (archive, summary, content_hash) = self.build_archive(archive).await?;
        info!(
            entries = summary.entries,
            uncompressed_bytes = summary.uncompressed_bytes,
            content_hash = %content_hash,
            "Archive ready for upload"
        );

        let request = UploadRequest {
            endpoint,
            organization_id: account.organization_id.clone(),
            archive_path: archive.path().to_path_buf(),
            timeout: self.settings.timeout,
        };
        let outcome = self.uploader.upload_widget(request).await;

        let path = archive.path().to_path_buf();
        if let Err(e) = archive.close() {
            warn!(error = ?e, path = %path.display(), "Failed to remove temporary archive");
        }

        match outcome {
            Ok(response) => {
                info!("Widget published");
                Ok(response)
            }
            Err(e) => {
                let err = PublishError::from(e);
                error!(error = %err, "Widget upload failed");
                Err(err)
            }
        }
    }

    /// Runs the archiver on the blocking pool. The temp file travels with the
    /// job and comes back with it, so it is dropped (and deleted) on failure.
    async fn build_archive(
        &self,
        archive: NamedTempFile,
    ) -> Result<(NamedTempFile, ArchiveSummary, String), PublishError> {
        let request = ArchiveRequest::new(self.source_dir.clone()).skipping(archive.path());

        let job = tokio::task::spawn_blocking(move || {
            let file = archive.reopen().map_err(|source| ArchiveError::Io {
                path: archive.path().to_path_buf(),
                source,
            })?;
            let summary = write_archive(&request, file)?;
            let content_hash = file_sha256(archive.path())?;
            Ok::<_, ArchiveError>((archive, summary, content_hash))
        });

        match job.await {
            Ok(Ok(done)) => Ok(done),
            Ok(Err(e)) => {
                error!(error = ?e, "Archiving failed");
                Err(PublishError::Archive(e))
            }
            Err(e) => {
                error!(error = ?e, "Archive worker did not complete");
                Err(PublishError::Archive(ArchiveError::Worker(e.to_string())))
            }
        }
    }
}

fn file_sha256(path: &Path) -> Result<String, ArchiveError> {
    let io_err = |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
