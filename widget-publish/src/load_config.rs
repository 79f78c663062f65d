/// `load_config` module: resolves the CLI settings from an optional YAML file, the environment and built-in defaults.
///
/// # Sources, highest precedence first
/// - Environment: `WIDGET_API_URL`, `WIDGET_CREDENTIALS_PATH`, `WIDGET_TIMEOUT_SECS`
///   (a `.env` file is loaded by `main` before this runs)
/// - YAML file passed with `--config`:
///
/// ```yaml
/// api_url: https://api.fliplet.com/
/// credentials_path: /home/me/.config/widget-publish/credentials.json
/// timeout_secs: 300
/// ```
///
/// - Defaults: the public API, the platform credential path, a 5 minute timeout.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use widget_publish_core::config::{PublishSettings, DEFAULT_TIMEOUT};

use crate::credentials::default_credentials_path;

pub const DEFAULT_API_URL: &str = "https://api.fliplet.com/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub api_url: String,
    pub credentials_path: PathBuf,
    pub timeout: Duration,
}

impl CliConfig {
    pub fn publish_settings(&self) -> Result<PublishSettings> {
        let settings = PublishSettings::new(&self.api_url, self.timeout)?;
        settings.trace_loaded();
        Ok(settings)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    api_url: Option<String>,
    #[serde(default)]
    credentials_path: Option<PathBuf>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Loads the optional YAML config file and applies environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let raw = match path {
        Some(path) => read_config_file(path)?,
        None => {
            info!("No config file given, using environment and defaults");
            RawConfig::default()
        }
    };

    let api_url = env_var("WIDGET_API_URL")
        .or(raw.api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let credentials_path = match env_var("WIDGET_CREDENTIALS_PATH")
        .map(PathBuf::from)
        .or(raw.credentials_path)
    {
        Some(p) => p,
        None => default_credentials_path()
            .context("Could not determine config directory for the credential store")?,
    };

    let timeout = match env_var("WIDGET_TIMEOUT_SECS") {
        Some(var) => match var.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(e) => {
                error!(error = ?e, var = %var, "WIDGET_TIMEOUT_SECS must be a whole number of seconds");
                anyhow::bail!("WIDGET_TIMEOUT_SECS must be a whole number of seconds: {e}");
            }
        },
        None => raw
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
    };

    info!(
        api_url = %api_url,
        credentials_path = %credentials_path.display(),
        timeout_secs = timeout.as_secs(),
        "Config loaded and merged successfully"
    );

    Ok(CliConfig {
        api_url,
        credentials_path,
        timeout,
    })
}

fn read_config_file(path: &Path) -> Result<RawConfig> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path,
                e
            ));
        }
    };

    // An empty YAML document deserializes as unit, not as a mapping.
    if content.trim().is_empty() {
        return Ok(RawConfig::default());
    }

    match serde_yaml::from_str(&content) {
        Ok(conf) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
