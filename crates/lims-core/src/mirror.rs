//! Remote Mirror - best-effort copy of case folders
//!
//! Every file in a case folder is pushed to
//! `<remote folder>/<case>/<file>`, overwriting the remote copy. Nothing is
//! retried, deletions are not propagated, and no failure ever reaches the
//! caller as an error: outcomes are reported in a [`SyncReport`].

use crate::error::LimsResult;
use crate::store::CaseStore;
use crate::types::CaseRef;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Remote object store the mirror writes to
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync + Debug {
    /// Verify the remote is reachable and authorized
    ///
    /// # Errors
    /// `LimsError::RemoteUnavailable` when it is not
    async fn connect(&self) -> LimsResult<()>;

    /// Write `contents` at `remote_path`, replacing what is there
    ///
    /// # Errors
    /// `LimsError::RemoteUnavailable` on any upload failure
    async fn upload(&self, remote_path: &str, contents: Vec<u8>) -> LimsResult<()>;
}

/// Outcome of one mirror pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReport {
    /// Nothing was attempted
    Skipped {
        /// Why the pass did not run
        reason: String,
    },
    /// Files were attempted individually
    Completed {
        /// Files uploaded
        uploaded: usize,
        /// Files that failed
        failed: usize,
    },
}

impl SyncReport {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Files uploaded (zero when skipped)
    #[inline]
    #[must_use]
    pub fn uploaded(&self) -> usize {
        match self {
            Self::Completed { uploaded, .. } => *uploaded,
            Self::Skipped { .. } => 0,
        }
    }

    /// Check if every attempted file made it
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Completed { failed: 0, .. })
    }
}

/// Pushes case folders to an optional remote
#[derive(Debug, Clone)]
pub struct Mirror {
    remote: Option<Arc<dyn RemoteStore>>,
    folder: String,
}

impl Mirror {
    /// Create mirror writing below `folder`
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, folder: impl Into<String>) -> Self {
        Self {
            remote: Some(remote),
            folder: normalize_folder(&folder.into()),
        }
    }

    /// Mirror with no remote; every pass is skipped
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            remote: None,
            folder: String::new(),
        }
    }

    /// Check if a remote is configured
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.remote.is_some()
    }

    /// Remote path for a file of a case
    #[must_use]
    pub fn remote_path(&self, case: &CaseRef, file_name: &str) -> String {
        format!("{}/{}/{}", self.folder, case.name, file_name)
    }

    /// Push every file of one case
    pub async fn sync_case(&self, store: &CaseStore, case: &CaseRef) -> SyncReport {
        let Some(remote) = &self.remote else {
            tracing::info!(case = %case, "mirror not configured, skipping sync");
            return SyncReport::skipped("mirror not configured");
        };
        if let Err(e) = remote.connect().await {
            tracing::warn!(case = %case, error = %e, "mirror unreachable");
            return SyncReport::skipped(e.to_string());
        }
        self.push_files(remote.as_ref(), store, case).await
    }

    /// Push every case under the store root, one pass per case
    pub async fn sync_all(&self, store: &CaseStore) -> Vec<(String, SyncReport)> {
        let Some(remote) = &self.remote else {
            tracing::info!("mirror not configured, skipping full sync");
            return Vec::new();
        };
        let cases = match store.case_dirs().await {
            Ok(cases) => cases,
            Err(e) => {
                tracing::warn!(error = %e, "cannot scan cases for sync");
                return Vec::new();
            }
        };
        if let Err(e) = remote.connect().await {
            tracing::warn!(error = %e, "mirror unreachable");
            let reason = e.to_string();
            return cases
                .into_iter()
                .map(|c| (c.name, SyncReport::skipped(reason.clone())))
                .collect();
        }

        let mut reports = Vec::with_capacity(cases.len());
        for case in cases {
            let report = self.push_files(remote.as_ref(), store, &case).await;
            reports.push((case.name, report));
        }
        reports
    }

    async fn push_files(
        &self,
        remote: &dyn RemoteStore,
        store: &CaseStore,
        case: &CaseRef,
    ) -> SyncReport {
        let files = match store.files(case).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(case = %case, error = %e, "cannot list case files");
                return SyncReport::skipped(e.to_string());
            }
        };

        let (mut uploaded, mut failed) = (0, 0);
        for file in files {
            let Some(file_name) = file.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            let remote_path = self.remote_path(case, &file_name);
            let contents = match tokio::fs::read(&file).await {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "cannot read file for sync");
                    failed += 1;
                    continue;
                }
            };
            match remote.upload(&remote_path, contents).await {
                Ok(()) => {
                    tracing::info!(remote = %remote_path, "uploaded");
                    uploaded += 1;
                }
                Err(e) => {
                    tracing::warn!(remote = %remote_path, error = %e, "upload failed");
                    failed += 1;
                }
            }
        }
        SyncReport::Completed { uploaded, failed }
    }
}

fn normalize_folder(folder: &str) -> String {
    let trimmed = folder.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
