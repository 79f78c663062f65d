//! Local credential store: a JSON file written by the login flow.
//!
//! ```json
//! { "email": "dev@example.com", "auth_token": "...", "organization": { "id": 42, "name": "Acme" } }
//! ```
//!
//! Lives at `<config_dir>/widget-publish/credentials.json` unless configured
//! otherwise. Unknown keys are ignored.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use widget_publish_core::contract::{CredentialError, CredentialProvider, StoredCredentials};

/// Default credential file location, if the platform has a config directory.
pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|c| c.join("widget-publish").join("credentials.json"))
}

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for FileCredentialStore {
    fn credentials(&self) -> Result<StoredCredentials, CredentialError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No credential store found, treating as logged out");
                return Ok(StoredCredentials::default());
            }
            Err(e) => {
                error!(error = ?e, path = %self.path.display(), "Failed to read credential store");
                return Err(CredentialError::Read {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        if contents.trim().is_empty() {
            return Ok(StoredCredentials::default());
        }

        let creds: StoredCredentials = serde_json::from_str(&contents).map_err(|e| {
            error!(error = ?e, path = %self.path.display(), "Credential store is not valid JSON");
            CredentialError::Parse {
                path: self.path.clone(),
                source: e,
            }
        })?;
        debug!(
            path = %self.path.display(),
            has_email = creds.email.is_some(),
            has_token = creds.auth_token.is_some(),
            has_organization = creds.organization.is_some(),
            "Read credential store"
        );
        Ok(creds)
    }
}
