///
/// This module implements the CLI interface for widget-publish: command parsing,
/// wiring the concrete credential store and HTTP client into the core
/// [`Publisher`], and user-visible output.
///
/// All workflow logic (credentials check, archiving, error mapping) lives in
/// the `widget-publish-core` crate. This module is strictly CLI glue.
///
/// ## How To Use
/// - For command-line users: run `widget-publish publish` inside the widget directory.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
use crate::credentials::FileCredentialStore;
use crate::load_config::load_config;
use crate::upload::ApiClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use widget_publish_core::Publisher;

/// CLI for widget-publish: package a directory and publish it as a widget.
#[derive(Parser)]
#[clap(
    name = "widget-publish",
    version,
    about = "Package the current directory as a widget and publish it to the hosted API"
)]
pub struct Cli {
    /// Optional YAML config file (api_url, credentials_path, timeout_secs)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Zip the widget directory and upload it
    Publish {
        /// Directory to publish (defaults to the current directory)
        #[clap(long)]
        dir: Option<PathBuf>,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("cli_started");

    match cli.command {
        Commands::Publish { dir } => {
            let config = load_config(cli.config.as_deref())?;
            let settings = config.publish_settings()?;
            let source_dir = match dir {
                Some(dir) => dir,
                None => std::env::current_dir().context("Failed to resolve current directory")?,
            };

            let credentials = FileCredentialStore::new(&config.credentials_path);
            let uploader = ApiClient::new().context("Failed to construct HTTP client")?;
            let publisher = Publisher::new(credentials, uploader, settings, source_dir);

            println!("Publishing...");
            tracing::info!(
                command = "publish",
                source_dir = %publisher.source_dir().display(),
                "Starting publish"
            );
            match publisher.publish().await {
                Ok(response) => {
                    tracing::info!(command = "publish", "Publish complete");
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&response)
                            .context("Failed to format API response")?
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "publish", error = %e, "Publish failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
