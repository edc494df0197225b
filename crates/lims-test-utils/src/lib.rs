//! Testing utilities for the LIMS workspace
//!
//! Shared fixtures: a temp-dir backed service, a recording remote and a stub
//! QR renderer.

#![allow(missing_docs)]

use async_trait::async_trait;
use lims_core::{
    CaseService, EmployeeDirectory, LimsConfig, LimsError, LimsResult, QrRenderer, RemoteStore,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

/// Renders the payload inside an `<svg>` element
#[derive(Debug, Default)]
pub struct StubQrRenderer;

impl QrRenderer for StubQrRenderer {
    fn render(&self, payload: &str) -> LimsResult<String> {
        Ok(format!("<svg data-payload=\"{payload}\"/>"))
    }
}

/// Remote that remembers every upload
#[derive(Debug, Default)]
pub struct RecordingRemote {
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    failing: Mutex<HashSet<String>>,
    unreachable: Mutex<bool>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads to `remote_path` fail
    pub fn fail_path(&self, remote_path: impl Into<String>) {
        self.failing.lock().insert(remote_path.into());
    }

    /// Make `connect` fail
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock() = unreachable;
    }

    pub fn uploaded_paths(&self) -> Vec<String> {
        self.uploads.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }
}

#[async_trait]
impl RemoteStore for RecordingRemote {
    async fn connect(&self) -> LimsResult<()> {
        if *self.unreachable.lock() {
            return Err(LimsError::RemoteUnavailable("recording remote offline".into()));
        }
        Ok(())
    }

    async fn upload(&self, remote_path: &str, contents: Vec<u8>) -> LimsResult<()> {
        if self.failing.lock().contains(remote_path) {
            return Err(LimsError::RemoteUnavailable(format!("rejected {remote_path}")));
        }
        self.uploads.lock().push((remote_path.to_string(), contents));
        Ok(())
    }
}

/// A service rooted in a temporary directory
pub struct TestEnv {
    pub dir: TempDir,
    pub config: LimsConfig,
    pub service: Arc<CaseService>,
    pub remote: Arc<RecordingRemote>,
}

impl TestEnv {
    /// Session token for a built-in employee
    pub fn token_for(&self, employee_id: &str) -> String {
        let employee = self
            .service
            .directory()
            .get(employee_id)
            .unwrap_or_else(|| panic!("no employee {employee_id}"));
        self.service
            .identifier()
            .identify(employee_id, employee.pin())
            .unwrap()
            .token()
    }
}

pub fn test_config(dir: &TempDir) -> LimsConfig {
    LimsConfig::default()
        .with_cases_root(dir.path().join("casos"))
        .with_qr_dir(dir.path().join("static").join("qrs"))
        .with_log_file(dir.path().join("lims_log.txt"))
        .with_public_base_url("http://lab.test:8000")
}

/// Service with the built-in roster and no remote
pub fn setup_test_env() -> TestEnv {
    build_env(false)
}

/// Service with the built-in roster mirroring into a [`RecordingRemote`]
pub fn setup_mirrored_test_env() -> TestEnv {
    build_env(true)
}

fn build_env(mirrored: bool) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let remote = Arc::new(RecordingRemote::new());
    let remote_store: Option<Arc<dyn RemoteStore>> = if mirrored {
        Some(remote.clone())
    } else {
        None
    };
    let service = CaseService::new(
        &config,
        Arc::new(EmployeeDirectory::builtin()),
        Arc::new(StubQrRenderer),
        remote_store,
    );
    TestEnv {
        dir,
        config,
        service: Arc::new(service),
        remote,
    }
}
