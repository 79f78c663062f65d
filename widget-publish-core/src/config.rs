use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tracing::{debug, info};

/// Upload timeout used when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid API base URL {url:?}: {reason}")]
    InvalidApiBase { url: String, reason: String },
}

/// Where and how the publisher talks to the hosted API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    /// Always ends with `/`, so relative endpoint paths append to it.
    pub api_base: Url,
    pub timeout: Duration,
}

impl PublishSettings {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidApiBase {
            url: api_base.to_string(),
            reason,
        };

        let mut url = Url::parse(api_base).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot be used as a base".into()));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            api_base: url,
            timeout,
        })
    }

    pub fn trace_loaded(&self) {
        info!(
            api_base = %self.api_base,
            timeout_secs = self.timeout.as_secs(),
            "Loaded publish settings"
        );
        debug!(?self, "Publish settings loaded (full debug)");
    }
}
