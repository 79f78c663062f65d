//! # contract: interfaces between the publish workflow and the outside world
//!
//! This module defines the two seams the [`crate::publisher::Publisher`] is
//! built on, plus the plain data that crosses them:
//! - [`CredentialProvider`] reads the locally stored account.
//! - [`WidgetUploader`] sends one archive to the widgets endpoint.
//!
//! Both traits are annotated for `mockall`, so tests can drive the workflow
//! without a credential file or a network.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Raw credentials as they sit in the store. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub organization: Option<Organization>,
}

/// Organization the account publishes under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Stored as a string or a number depending on who wrote the store.
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Credentials that are complete enough to publish with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub auth_token: String,
    pub organization_id: Option<String>,
}

impl StoredCredentials {
    /// Returns `None` unless both the email and the auth token are present
    /// and non-empty.
    pub fn into_account(self) -> Option<Account> {
        let email = self.email.filter(|e| !e.is_empty())?;
        let auth_token = self.auth_token.filter(|t| !t.is_empty())?;
        Some(Account {
            email,
            auth_token,
            organization_id: self.organization.map(|o| o.id),
        })
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("could not determine where credentials are stored")]
    Location,
    #[error("failed to read credential store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential store {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to the locally stored account.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Result<StoredCredentials, CredentialError>;
}

/// One multipart upload of a widget archive.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Full widgets URL, auth token included as a query parameter.
    pub endpoint: Url,
    /// Sent as the `organizationId` form field when present.
    pub organization_id: Option<String>,
    /// Zip file streamed as the `my_file` form field.
    pub archive_path: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to open archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
    #[error("upload request failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("API responded with {status}: {body}")]
    Status {
        status: u16,
        /// Error message the API put in the body, if one could be found.
        message: Option<String>,
        body: String,
    },
    #[error("API response is not valid JSON: {0}")]
    InvalidResponse(#[source] serde_json::Error),
}

impl UploadError {
    /// Message reported by the API itself, as opposed to transport failures.
    pub fn upstream_message(&self) -> Option<&str> {
        match self {
            UploadError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Sends widget archives to the hosted API.
///
/// Implementors own the transport; the request already carries the endpoint,
/// timeout and form fields.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WidgetUploader: Send + Sync {
    /// Upload the archive and return the parsed JSON response body.
    async fn upload_widget(&self, req: UploadRequest) -> Result<serde_json::Value, UploadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organization_id_accepts_numbers_and_strings() {
        let numeric: StoredCredentials = serde_json::from_str(
            r#"{"email":"a@b.c","auth_token":"t","organization":{"id":42,"name":"Acme"}}"#,
        )
        .unwrap();
        assert_eq!(numeric.organization.unwrap().id, "42");

        let text: StoredCredentials =
            serde_json::from_str(r#"{"organization":{"id":"org-7"}}"#).unwrap();
        assert_eq!(text.organization.unwrap().id, "org-7");
    }

    #[test]
    fn into_account_requires_email_and_token() {
        let missing_email = StoredCredentials {
            email: None,
            auth_token: Some("t".into()),
            organization: None,
        };
        assert!(missing_email.into_account().is_none());

        let empty_token = StoredCredentials {
            email: Some("dev@example.com".into()),
            auth_token: Some(String::new()),
            organization: None,
        };
        assert!(empty_token.into_account().is_none());

        let complete = StoredCredentials {
            email: Some("dev@example.com".into()),
            auth_token: Some("t".into()),
            organization: Some(Organization {
                id: "42".into(),
                name: None,
            }),
        };
        let account = complete.into_account().unwrap();
        assert_eq!(account.organization_id.as_deref(), Some("42"));
    }

    #[test]
    fn unknown_store_keys_are_ignored() {
        let creds: StoredCredentials =
            serde_json::from_str(r#"{"email":"x@y.z","theme":"dark"}"#).unwrap();
        assert_eq!(creds.email.as_deref(), Some("x@y.z"));
        assert!(creds.auth_token.is_none());
    }
}
