//! QR artifacts
//!
//! Case QRs encode `{base}/case_track/{folder}`; employee QRs encode
//! `{base}/set_emp/{id}/{pin}`, so scanning one identifies the device.
//! Rendering is delegated to a [`QrRenderer`].

use crate::directory::{Employee, EmployeeDirectory};
use crate::error::{LimsError, LimsResult};
use crate::store::CaseStore;
use crate::types::{CaseRef, QR_EXTENSION};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Bytes escaped when a case name becomes one URL path segment
pub const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'\\')
    .add(b'|')
    .add(b'^');

/// Turns a payload into an SVG document
pub trait QrRenderer: Send + Sync + Debug {
    /// Render `payload` as SVG markup
    ///
    /// # Errors
    /// `LimsError::Validation` if the payload cannot be encoded
    fn render(&self, payload: &str) -> LimsResult<String>;
}

/// Where QR images live and what they encode
#[derive(Debug, Clone)]
pub struct QrArtifacts {
    renderer: Arc<dyn QrRenderer>,
    qr_dir: PathBuf,
    base_url: String,
}

impl QrArtifacts {
    /// Create QR artifact manager
    #[must_use]
    pub fn new(
        renderer: Arc<dyn QrRenderer>,
        qr_dir: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            qr_dir: qr_dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// URL scanned to track a case
    #[must_use]
    pub fn case_url(&self, case: &CaseRef) -> String {
        format!(
            "{}/case_track/{}",
            self.base_url,
            utf8_percent_encode(&case.name, PATH_SEGMENT)
        )
    }

    /// URL scanned to identify as an employee
    #[must_use]
    pub fn employee_url(&self, employee: &Employee) -> String {
        format!(
            "{}/set_emp/{}/{}",
            self.base_url,
            utf8_percent_encode(&employee.id, PATH_SEGMENT),
            employee.pin()
        )
    }

    /// Folder of employee QR images
    #[inline]
    #[must_use]
    pub fn employee_dir(&self) -> PathBuf {
        self.qr_dir.join("employees")
    }

    /// Image path for an employee QR
    #[must_use]
    pub fn employee_qr_path(&self, employee: &Employee) -> PathBuf {
        self.employee_dir()
            .join(format!("{}.{QR_EXTENSION}", employee.id))
    }

    /// Render and write the case QR; failures are logged and yield `None`
    pub async fn generate_case_qr(&self, case: &CaseRef) -> Option<PathBuf> {
        let url = self.case_url(case);
        match self.write(&case.qr_path, &url).await {
            Ok(()) => {
                tracing::info!(case = %case, path = %case.qr_path.display(), "case QR generated");
                Some(case.qr_path.clone())
            }
            Err(e) => {
                tracing::warn!(case = %case, error = %e, "cannot generate case QR");
                None
            }
        }
    }

    /// Render and write an employee QR; failures are logged and yield `None`
    pub async fn generate_employee_qr(&self, employee: &Employee) -> Option<PathBuf> {
        let path = self.employee_qr_path(employee);
        match self.write(&path, &self.employee_url(employee)).await {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(employee = %employee.id, error = %e, "cannot generate employee QR");
                None
            }
        }
    }

    /// Regenerate every employee QR; returns how many were written
    pub async fn generate_employee_qrs(&self, directory: &EmployeeDirectory) -> usize {
        let mut written = 0;
        for employee in directory.iter() {
            if self.generate_employee_qr(employee).await.is_some() {
                written += 1;
            }
        }
        written
    }

    /// Generate QRs for cases that have none; returns how many were written
    ///
    /// A case that fails is logged and skipped.
    pub async fn regenerate_missing(&self, store: &CaseStore) -> usize {
        let cases = match store.case_dirs().await {
            Ok(cases) => cases,
            Err(e) => {
                tracing::warn!(error = %e, "cannot scan cases for missing QRs");
                return 0;
            }
        };
        let mut written = 0;
        for case in cases {
            if tokio::fs::try_exists(&case.qr_path).await.unwrap_or(false) {
                continue;
            }
            if self.generate_case_qr(&case).await.is_some() {
                written += 1;
            }
        }
        written
    }

    async fn write(&self, path: &Path, payload: &str) -> LimsResult<()> {
        let svg = self.renderer.render(payload)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LimsError::io(parent, e))?;
        }
        tokio::fs::write(path, svg)
            .await
            .map_err(|e| LimsError::io(path, e))
    }
}
