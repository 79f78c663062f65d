#![doc = "HTTP uploader: implements the core `WidgetUploader` contract with a reqwest multipart client."]
//
//! # Uploader Integration (CLI <-> Core)
//!
//! [`ApiClient`] is the networked implementation of
//! [`widget_publish_core::contract::WidgetUploader`]. It streams the archive
//! file as the `my_file` form field, adds `organizationId` when set, and turns
//! the HTTP outcome into either the parsed JSON body or an [`UploadError`].
//!
//! The endpoint carries the auth token in its query string, so only the path
//! is ever logged.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use widget_publish_core::contract::{UploadError, UploadRequest, WidgetUploader};

/// File name the archive is sent under.
pub const ARCHIVE_FILE_NAME: &str = "widget.zip";

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        tracing::info!("Initialized widget API client");
        Ok(Self { client })
    }

    async fn archive_part(req: &UploadRequest) -> Result<Part, UploadError> {
        let open_err = |source| UploadError::Archive {
            path: req.archive_path.clone(),
            source,
        };
        let file = tokio::fs::File::open(&req.archive_path)
            .await
            .map_err(open_err)?;
        let len = file.metadata().await.map_err(open_err)?.len();
        tracing::debug!(path = %req.archive_path.display(), bytes = len, "Streaming archive");

        Part::stream_with_length(file, len)
            .file_name(ARCHIVE_FILE_NAME)
            .mime_str("application/zip")
            .map_err(|e| UploadError::Transport(Box::new(e)))
    }
}

#[async_trait]
impl WidgetUploader for ApiClient {
    async fn upload_widget(&self, req: UploadRequest) -> Result<Value, UploadError> {
        tracing::info!(
            endpoint = req.endpoint.path(),
            organization_id = req.organization_id.as_deref().unwrap_or("none"),
            timeout_secs = req.timeout.as_secs(),
            "Uploading widget archive"
        );

        let mut form = Form::new().part("my_file", Self::archive_part(&req).await?);
        if let Some(org) = &req.organization_id {
            form = form.text("organizationId", org.clone());
        }

        let response = self
            .client
            .post(req.endpoint.clone())
            .header(ACCEPT, "application/json")
            .timeout(req.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(e, &req))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, &req))?;

        if !status.is_success() {
            let message = error_message(&body);
            tracing::error!(
                status = status.as_u16(),
                message = message.as_deref().unwrap_or(""),
                "API rejected widget upload"
            );
            return Err(UploadError::Status {
                status: status.as_u16(),
                message,
                body,
            });
        }

        if body.trim().is_empty() {
            tracing::info!(status = status.as_u16(), "Widget uploaded, empty response body");
            return Ok(Value::Null);
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = ?e, "API response is not valid JSON");
            UploadError::InvalidResponse(e)
        })?;
        tracing::info!(status = status.as_u16(), "Widget uploaded");
        Ok(parsed)
    }
}

fn transport_error(e: reqwest::Error, req: &UploadRequest) -> UploadError {
    if e.is_timeout() {
        tracing::error!(timeout_secs = req.timeout.as_secs(), "Widget upload timed out");
        UploadError::Timeout(req.timeout)
    } else {
        let e = e.without_url();
        tracing::error!(error = %e, "Widget upload transport error");
        UploadError::Transport(Box::new(e))
    }
}

/// The API reports failures as a JSON string, as `{"message": ...}` /
/// `{"error": ...}`, or as plain text.
fn error_message(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => Some(s),
        Ok(Value::Object(map)) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        Ok(_) => None,
        Err(_) => {
            let text = body.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
    }
}
