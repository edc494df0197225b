//! Dropbox remote store
//!
//! Implements [`RemoteStore`] against the Dropbox HTTP API using a long-lived
//! refresh token. Short-lived access tokens are cached until shortly before
//! they expire.
//!
//! # Example
//!
//! ```rust,ignore
//! use lims_mirror::DropboxMirror;
//!
//! let remote = DropboxMirror::new(credentials)?;
//! remote.connect().await?;
//! remote.upload("/Cases/Ana/estado.json", bytes).await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

use async_trait::async_trait;
use lims_core::{DropboxCredentials, LimsError, LimsResult, RemoteStore};
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Production API host (OAuth and RPC endpoints)
pub const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com";

/// Production content host (uploads)
pub const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com";

/// Refresh this long before the access token actually expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Errors talking to Dropbox
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Token refresh rejected
    #[error("token refresh rejected ({status}): {body}")]
    Auth {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// Upload rejected
    #[error("upload of {path} rejected ({status}): {body}")]
    Upload {
        /// Remote path
        path: String,
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },
}

impl From<MirrorError> for LimsError {
    fn from(err: MirrorError) -> Self {
        LimsError::RemoteUnavailable(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("value", &"<redacted>")
            .field("refresh_at", &self.refresh_at)
            .finish()
    }
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

/// Dropbox client for case mirroring
#[derive(Debug)]
pub struct DropboxMirror {
    credentials: DropboxCredentials,
    http: reqwest::Client,
    api_base: String,
    content_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl DropboxMirror {
    /// Create client against the production endpoints
    ///
    /// # Errors
    /// `LimsError::RemoteUnavailable` if the HTTP client cannot be built
    pub fn new(credentials: DropboxCredentials) -> LimsResult<Self> {
        Self::with_endpoints(credentials, DEFAULT_API_BASE, DEFAULT_CONTENT_BASE)
    }

    /// Create client against custom endpoints
    ///
    /// # Errors
    /// `LimsError::RemoteUnavailable` if the HTTP client cannot be built
    pub fn with_endpoints(
        credentials: DropboxCredentials,
        api_base: impl Into<String>,
        content_base: impl Into<String>,
    ) -> LimsResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(MirrorError::from)?;
        Ok(Self {
            credentials,
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            content_base: content_base.into().trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, MirrorError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.refresh().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn refresh(&self) -> Result<CachedToken, MirrorError> {
        let endpoint = format!("{}/oauth2/token", self.api_base);
        let response = self
            .http
            .post(endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("client_id", self.credentials.app_key.as_str()),
                ("client_secret", self.credentials.app_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read token response body".to_string());
            return Err(MirrorError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(14_400));
        tracing::debug!(lifetime_secs = lifetime.as_secs(), "dropbox access token refreshed");
        Ok(CachedToken {
            value: payload.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }

    async fn invalidate(&self) {
        *self.token.lock().await = None;
    }
}

#[async_trait]
impl RemoteStore for DropboxMirror {
    async fn connect(&self) -> LimsResult<()> {
        self.access_token().await?;
        Ok(())
    }

    async fn upload(&self, remote_path: &str, contents: Vec<u8>) -> LimsResult<()> {
        let token = self.access_token().await?;
        let endpoint = format!("{}/2/files/upload", self.content_base);
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(token)
            .header("Dropbox-API-Arg", api_arg(remote_path))
            .header("Content-Type", "application/octet-stream")
            .body(contents)
            .send()
            .await
            .map_err(MirrorError::from)?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(path = remote_path, "uploaded");
            return Ok(());
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate().await;
        }
        let body = response.text().await.unwrap_or_default();
        Err(MirrorError::Upload {
            path: remote_path.to_string(),
            status: status.as_u16(),
            body,
        }
        .into())
    }
}

/// `Dropbox-API-Arg` header value for an overwriting upload
///
/// HTTP headers must be ASCII, so every non-ASCII character is written as a
/// JSON `\uXXXX` escape (surrogate pairs outside the BMP).
#[must_use]
pub fn api_arg(remote_path: &str) -> String {
    let json = serde_json::json!({ "path": remote_path, "mode": "overwrite" }).to_string();
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_arg_escapes_non_ascii() {
        let arg = api_arg("/Casos/Juan Pérez/estado.json");
        assert!(arg.is_ascii());
        assert!(arg.contains("P\\u00e9rez"));

        let parsed: serde_json::Value = serde_json::from_str(&arg).unwrap();
        assert_eq!(parsed["path"], "/Casos/Juan Pérez/estado.json");
        assert_eq!(parsed["mode"], "overwrite");
    }

    #[test]
    fn api_arg_uses_surrogate_pairs() {
        let arg = api_arg("/a/\u{1F9B7}.txt");
        assert!(arg.contains("\\ud83e\\uddb7"));
    }

    #[test]
    fn mirror_error_maps_to_remote_unavailable() {
        let err: LimsError = MirrorError::Auth {
            status: 400,
            body: "invalid_grant".into(),
        }
        .into();
        assert!(matches!(err, LimsError::RemoteUnavailable(ref m) if m.contains("invalid_grant")));
    }
}
