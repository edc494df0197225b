//! Runtime configuration
//!
//! Layered, lowest precedence first: [`LimsConfig::default`], an optional TOML
//! file, then environment variables.

use crate::error::{LimsError, LimsResult};
use crate::types::{IN_PROCESS, RECEIVED};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default remote folder for mirrored cases
pub const DEFAULT_REMOTE_FOLDER: &str = "/IA AUTOMATIZATION CASES DAILY";

/// Identification sessions last eight hours
pub const DEFAULT_SESSION_TTL_SECS: u64 = 8 * 60 * 60;

/// LIMS configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimsConfig {
    /// Root folder holding one folder per case
    pub cases_root: PathBuf,
    /// Folder for generated QR images
    pub qr_dir: PathBuf,
    /// Append-only log file
    pub log_file: PathBuf,
    /// Host name encoded into QR URLs
    pub host: String,
    /// Address the server binds to
    pub bind_host: String,
    /// Server port
    pub port: u16,
    /// Overrides `http://{host}:{port}` in QR URLs
    pub public_base_url: Option<String>,
    /// Identification session lifetime in seconds
    pub session_ttl_secs: u64,
    /// Phase of a freshly registered case
    pub initial_phase: String,
    /// Phase recorded by scans that do not name one
    pub default_scan_phase: String,
    /// Remote mirror settings
    pub dropbox: DropboxSettings,
    /// Employee registry file; the built-in registry is used when unset
    pub employees_file: Option<PathBuf>,
    /// Mirror every case once at startup
    pub startup_sync: bool,
}

impl LimsConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With cases root
    #[inline]
    #[must_use]
    pub fn with_cases_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cases_root = root.into();
        self
    }

    /// With QR directory
    #[inline]
    #[must_use]
    pub fn with_qr_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.qr_dir = dir.into();
        self
    }

    /// With log file
    #[inline]
    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }

    /// With public base URL
    #[inline]
    #[must_use]
    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    /// With session lifetime
    #[inline]
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl_secs = ttl.as_secs();
        self
    }

    /// With remote mirror settings
    #[inline]
    #[must_use]
    pub fn with_dropbox(mut self, dropbox: DropboxSettings) -> Self {
        self.dropbox = dropbox;
        self
    }

    /// Parse a TOML document; absent keys keep their defaults
    ///
    /// # Errors
    /// `LimsError::Config` if the document is not valid TOML for this shape
    pub fn from_toml_str(text: &str) -> LimsResult<Self> {
        toml::from_str(text).map_err(|e| LimsError::Config(format!("invalid config: {e}")))
    }

    /// Load a TOML config file
    ///
    /// # Errors
    /// `LimsError::Io` when unreadable, `LimsError::Config` when malformed
    pub async fn load(path: impl AsRef<Path>) -> LimsResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LimsError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from a variable lookup
    ///
    /// # Errors
    /// `LimsError::Config` if `PORT` is not a port number
    pub fn apply_env<F>(mut self, lookup: F) -> LimsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("BASE_ROOT") {
            self.cases_root = v.into();
        }
        if let Some(v) = var("QR_DIR") {
            self.qr_dir = v.into();
        }
        if let Some(v) = var("LOG_FILE") {
            self.log_file = v.into();
        }
        if let Some(v) = var("HOST") {
            self.host = v;
        }
        if let Some(v) = var("BIND_HOST") {
            self.bind_host = v;
        }
        if let Some(v) = var("PORT") {
            self.port = v
                .trim()
                .parse()
                .map_err(|_| LimsError::Config(format!("PORT is not a port number: {v}")))?;
        }
        if let Some(v) = var("PUBLIC_BASE_URL") {
            self.public_base_url = Some(v);
        }
        if let Some(v) = var("DROPBOX_FOLDER") {
            self.dropbox.folder = v;
        }
        if let Some(v) = var("DROPBOX_APP_KEY") {
            self.dropbox.app_key = Some(v);
        }
        if let Some(v) = var("DROPBOX_APP_SECRET") {
            self.dropbox.app_secret = Some(v);
        }
        if let Some(v) = var("DROPBOX_REFRESH_TOKEN") {
            self.dropbox.refresh_token = Some(v);
        }
        if let Some(v) = var("EMPLOYEES_FILE") {
            self.employees_file = Some(v.into());
        }
        if let Some(v) = var("LIMS_STARTUP_SYNC") {
            self.startup_sync = !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        Ok(self)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// See [`LimsConfig::apply_env`]
    pub fn apply_process_env(self) -> LimsResult<Self> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Reject values the service cannot run with
    ///
    /// # Errors
    /// `LimsError::Config` naming the offending field
    pub fn validate(&self) -> LimsResult<()> {
        if self.session_ttl_secs == 0 {
            return Err(LimsError::Config("session_ttl_secs must be positive".into()));
        }
        if self.initial_phase.trim().is_empty() {
            return Err(LimsError::Config("initial_phase must not be empty".into()));
        }
        if self.default_scan_phase.trim().is_empty() {
            return Err(LimsError::Config("default_scan_phase must not be empty".into()));
        }
        Ok(())
    }

    /// Base of every URL encoded into a QR
    #[must_use]
    pub fn public_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Socket address to bind
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Session lifetime
    #[inline]
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Folder holding employee QR images
    #[inline]
    #[must_use]
    pub fn employee_qr_dir(&self) -> PathBuf {
        self.qr_dir.join("employees")
    }
}

impl Default for LimsConfig {
    fn default() -> Self {
        Self {
            cases_root: PathBuf::from("casos_descargados"),
            qr_dir: PathBuf::from("static/qrs"),
            log_file: PathBuf::from("lims_log.txt"),
            host: "127.0.0.1".to_string(),
            bind_host: "0.0.0.0".to_string(),
            port: 8000,
            public_base_url: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            initial_phase: RECEIVED.to_string(),
            default_scan_phase: IN_PROCESS.to_string(),
            dropbox: DropboxSettings::default(),
            employees_file: None,
            startup_sync: false,
        }
    }
}

/// Remote mirror settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxSettings {
    /// Remote folder that receives one sub-folder per case
    pub folder: String,
    /// OAuth app key
    pub app_key: Option<String>,
    /// OAuth app secret
    pub app_secret: Option<String>,
    /// Long-lived refresh token
    pub refresh_token: Option<String>,
}

impl DropboxSettings {
    /// Credentials, present only when key, secret and refresh token all are
    #[must_use]
    pub fn credentials(&self) -> Option<DropboxCredentials> {
        match (&self.app_key, &self.app_secret, &self.refresh_token) {
            (Some(app_key), Some(app_secret), Some(refresh_token)) => Some(DropboxCredentials {
                app_key: app_key.clone(),
                app_secret: app_secret.clone(),
                refresh_token: refresh_token.clone(),
            }),
            _ => None,
        }
    }

    /// Check if the mirror can be used at all
    #[inline]
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

impl Default for DropboxSettings {
    fn default() -> Self {
        Self {
            folder: DEFAULT_REMOTE_FOLDER.to_string(),
            app_key: None,
            app_secret: None,
            refresh_token: None,
        }
    }
}

/// Complete credential set for the remote mirror
#[derive(Clone, PartialEq, Eq)]
pub struct DropboxCredentials {
    /// OAuth app key
    pub app_key: String,
    /// OAuth app secret
    pub app_secret: String,
    /// Long-lived refresh token
    pub refresh_token: String,
}

impl std::fmt::Debug for DropboxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxCredentials")
            .field("app_key", &self.app_key)
            .field("app_secret", &"***")
            .field("refresh_token", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = LimsConfig::default();
        assert_eq!(config.session_ttl(), Duration::from_secs(8 * 3600));
        assert_eq!(config.initial_phase, RECEIVED);
        assert_eq!(config.default_scan_phase, IN_PROCESS);
        assert_eq!(config.public_base_url(), "http://127.0.0.1:8000");
        assert!(!config.dropbox.is_configured());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides() {
        let config = LimsConfig::default()
            .apply_env(env(&[
                ("BASE_ROOT", "/data/cases"),
                ("HOST", "lab.local"),
                ("PORT", "9000"),
                ("DROPBOX_FOLDER", "/mirror"),
                ("LIMS_STARTUP_SYNC", "yes"),
            ]))
            .unwrap();

        assert_eq!(config.cases_root, PathBuf::from("/data/cases"));
        assert_eq!(config.public_base_url(), "http://lab.local:9000");
        assert_eq!(config.dropbox.folder, "/mirror");
        assert!(config.startup_sync);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let config = LimsConfig::default()
            .apply_env(env(&[("HOST", "  ")]))
            .unwrap();
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = LimsConfig::default()
            .apply_env(env(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, LimsError::Config(_)));
    }

    #[test]
    fn dropbox_needs_all_three_credentials() {
        let partial = LimsConfig::default()
            .apply_env(env(&[("DROPBOX_APP_KEY", "k"), ("DROPBOX_APP_SECRET", "s")]))
            .unwrap();
        assert!(!partial.dropbox.is_configured());

        let full = partial
            .apply_env(env(&[("DROPBOX_REFRESH_TOKEN", "r")]))
            .unwrap();
        let creds = full.dropbox.credentials().unwrap();
        assert_eq!(creds.app_key, "k");
        assert!(!format!("{creds:?}").contains("\"r\""));
    }

    #[test]
    fn toml_partial_document() {
        let config = LimsConfig::from_toml_str(
            r#"
            cases_root = "/srv/casos"
            public_base_url = "https://lab.example.com/"
            default_scan_phase = "EN PROCESO"

            [dropbox]
            folder = "/Casos"
            "#,
        )
        .unwrap();

        assert_eq!(config.cases_root, PathBuf::from("/srv/casos"));
        assert_eq!(config.public_base_url(), "https://lab.example.com");
        assert_eq!(config.default_scan_phase, "EN PROCESO");
        assert_eq!(config.dropbox.folder, "/Casos");
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn validate_rejects_zero_ttl() {
        let config = LimsConfig::default().with_session_ttl(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
