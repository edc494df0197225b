//! Case Service - the workflow the HTTP surface drives
//!
//! Primary effects (registering a case, appending an event) propagate their
//! errors. Secondary effects (attachments on creation, QR images, mirroring)
//! are logged and never fail the request.

use crate::config::LimsConfig;
use crate::directory::{Employee, EmployeeDirectory};
use crate::error::{LimsError, LimsResult};
use crate::mirror::{Mirror, RemoteStore, SyncReport};
use crate::qr::{QrArtifacts, QrRenderer};
use crate::recorder::EventRecorder;
use crate::session::Identifier;
use crate::store::{CaseStore, DeleteReport};
use crate::types::{CaseRef, CaseSummary, Event};
use std::path::PathBuf;
use std::sync::Arc;

/// URL prefix under which QR images are served
pub const QR_URL_PREFIX: &str = "/static/qrs";

/// A file submitted with a case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Client-side file name
    pub file_name: String,
    /// File contents
    pub contents: Vec<u8>,
}

impl Attachment {
    /// Create attachment
    #[inline]
    #[must_use]
    pub fn new(file_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

/// Result of scanning a case QR
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The device is identified and the event was appended
    Recorded {
        /// Case that was touched
        case: CaseRef,
        /// Appended event
        event: Event,
        /// Mirror push that followed
        sync: SyncReport,
    },
    /// No live session: nothing was written
    IdentifyFirst {
        /// Case that was scanned
        case: CaseRef,
    },
}

/// Case tracking workflow
#[derive(Debug, Clone)]
pub struct CaseService {
    store: CaseStore,
    recorder: EventRecorder,
    identifier: Identifier,
    qr: QrArtifacts,
    mirror: Mirror,
    default_scan_phase: String,
}

impl CaseService {
    /// Assemble the service from its collaborators
    #[must_use]
    pub fn new(
        config: &LimsConfig,
        directory: Arc<EmployeeDirectory>,
        renderer: Arc<dyn QrRenderer>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Self {
        let store = CaseStore::new(&config.cases_root, &config.qr_dir)
            .with_initial_phase(&config.initial_phase);
        let mirror = match remote {
            Some(remote) => Mirror::new(remote, &config.dropbox.folder),
            None => Mirror::disabled(),
        };
        Self {
            recorder: EventRecorder::new(store.clone()),
            identifier: Identifier::new(directory, config.session_ttl()),
            qr: QrArtifacts::new(renderer, &config.qr_dir, config.public_base_url()),
            mirror,
            default_scan_phase: config.default_scan_phase.clone(),
            store,
        }
    }

    /// Case store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &CaseStore {
        &self.store
    }

    /// Event recorder
    #[inline]
    #[must_use]
    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// Session issuer
    #[inline]
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Employee registry
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &EmployeeDirectory {
        self.identifier.directory()
    }

    /// QR artifacts
    #[inline]
    #[must_use]
    pub fn qr(&self) -> &QrArtifacts {
        &self.qr
    }

    /// Remote mirror
    #[inline]
    #[must_use]
    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Register a case with its attachments
    ///
    /// The new case has no events. Attachments that cannot be stored, the QR
    /// and the mirror push are best-effort.
    ///
    /// # Errors
    /// - `LimsError::Validation` if the name is empty after trimming or is `.` or `..`
    /// - `LimsError::PermissionDenied` / `LimsError::Io` if the case folder or
    ///   state document cannot be written
    pub async fn create_case(
        &self,
        name: &str,
        notes: &str,
        attachments: Vec<Attachment>,
    ) -> LimsResult<CaseRef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LimsError::validation("case name is required"));
        }
        let case = self.store.ensure_case(name, notes).await?;

        for attachment in attachments {
            if attachment.file_name.trim().is_empty() {
                continue;
            }
            if let Err(e) = self
                .store
                .attach(&case, &attachment.file_name, &attachment.contents)
                .await
            {
                tracing::warn!(case = %case, file = %attachment.file_name, error = %e, "attachment skipped");
            }
        }

        self.qr.generate_case_qr(&case).await;
        self.mirror.sync_case(&self.store, &case).await;
        Ok(case)
    }

    /// Add a file to an existing case, then mirror it
    ///
    /// # Errors
    /// - `LimsError::NotFound` if the case does not exist
    /// - `LimsError::Validation` if the file name is empty
    /// - `LimsError::PermissionDenied` / `LimsError::Io` if the write fails
    pub async fn upload(&self, name: &str, file_name: &str, contents: &[u8]) -> LimsResult<PathBuf> {
        let case = self.store.open(name).await?;
        let path = self.store.attach(&case, file_name, contents).await?;
        self.mirror.sync_case(&self.store, &case).await;
        Ok(path)
    }

    /// Handle a case QR scan
    ///
    /// With a live session the employee's display name is recorded as the
    /// worker; without one nothing is written.
    ///
    /// # Errors
    /// - `LimsError::NotFound` if the case does not exist
    /// - `LimsError::PermissionDenied` / `LimsError::Io` if the event cannot be
    ///   persisted
    pub async fn track(
        &self,
        name: &str,
        session_token: Option<&str>,
        phase: Option<&str>,
        note: Option<&str>,
    ) -> LimsResult<TrackOutcome> {
        let case = self.store.open(name).await?;

        let Some(employee) = self.identifier.current_employee(session_token) else {
            tracing::info!(case = %case, "scan without identification ignored");
            return Ok(TrackOutcome::IdentifyFirst { case });
        };

        let phase = phase
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(self.default_scan_phase.as_str());
        let event = self
            .recorder
            .record(&case, phase, &employee.name, note.unwrap_or_default())
            .await?;
        let sync = self.mirror.sync_case(&self.store, &case).await;
        Ok(TrackOutcome::Recorded { case, event, sync })
    }

    /// Employee behind a session token, if live
    #[must_use]
    pub fn current_employee(&self, session_token: Option<&str>) -> Option<&Employee> {
        self.identifier.current_employee(session_token)
    }

    /// Remove a case and its QR; the remote copy is left alone
    ///
    /// # Errors
    /// `LimsError::NotFound` if the case does not exist
    pub async fn delete_case(&self, name: &str) -> LimsResult<DeleteReport> {
        self.store.delete(name).await
    }

    /// All cases, most recently modified first
    ///
    /// # Errors
    /// `LimsError::PermissionDenied` / `LimsError::Io` if the root cannot be read
    pub async fn list(&self) -> LimsResult<Vec<CaseSummary>> {
        self.store.list(QR_URL_PREFIX).await
    }

    /// Startup pass: employee QRs, missing case QRs, and optionally a full sync
    pub async fn startup(&self, sync_all: bool) {
        let employees = self.qr.generate_employee_qrs(self.directory()).await;
        let cases = self.qr.regenerate_missing(&self.store).await;
        tracing::info!(employees, cases, "QR images regenerated");

        if sync_all {
            let reports = self.mirror.sync_all(&self.store).await;
            let uploaded: usize = reports.iter().map(|(_, r)| r.uploaded()).sum();
            tracing::info!(cases = reports.len(), uploaded, "startup sync finished");
        }
    }
}
