//! Case Store - folder-backed system of record
//!
//! Each case is one folder under the cases root, named by [`safe_name`]:
//!
//! ```text
//! <cases root>/<name>/estado.json          state document
//! <cases root>/<name>/INSTRUCCIONES.txt    work order, written once
//! <cases root>/<name>/<attachments>
//! <qr dir>/<name>.svg                      case QR
//! ```
//!
//! The state document is re-read and re-written on every operation; nothing
//! is cached in memory.

use crate::error::{LimsError, LimsResult};
use crate::naming::{is_usable, safe_name};
use crate::types::{
    now_stamp, CaseRef, CaseState, CaseSummary, QR_EXTENSION, RECEIVED, TIMESTAMP_FORMAT,
};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Outcome of deleting a case
///
/// Artifacts are removed one by one; a failure is recorded and the next
/// artifact is still attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Artifacts that are gone
    pub removed: Vec<PathBuf>,
    /// Artifacts that could not be removed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl DeleteReport {
    /// Check if every artifact was removed
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Folder-backed case store
#[derive(Debug, Clone)]
pub struct CaseStore {
    root: PathBuf,
    qr_dir: PathBuf,
    initial_phase: String,
}

impl CaseStore {
    /// Create store over a cases root and a QR directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, qr_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            qr_dir: qr_dir.into(),
            initial_phase: RECEIVED.to_string(),
        }
    }

    /// With phase for newly registered cases
    #[inline]
    #[must_use]
    pub fn with_initial_phase(mut self, phase: impl Into<String>) -> Self {
        self.initial_phase = phase.into();
        self
    }

    /// Cases root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// QR directory
    #[inline]
    #[must_use]
    pub fn qr_dir(&self) -> &Path {
        &self.qr_dir
    }

    /// Map a display name to its case location without touching disk
    #[must_use]
    pub fn resolve(&self, name: &str) -> CaseRef {
        let name = safe_name(name);
        CaseRef {
            dir: self.root.join(&name),
            qr_path: self.qr_dir.join(format!("{name}.{QR_EXTENSION}")),
            name,
        }
    }

    /// Resolve an existing case
    ///
    /// # Errors
    /// `LimsError::NotFound` if the case folder does not exist or the name is
    /// not a single path component
    pub async fn open(&self, name: &str) -> LimsResult<CaseRef> {
        let case = self.resolve(name);
        if !is_usable(&case.name) || !is_dir(&case.dir).await {
            return Err(LimsError::not_found(format!("case '{}'", name.trim())));
        }
        Ok(case)
    }

    /// Register a case, or do nothing if it already exists
    ///
    /// Creates the folder, writes the instructions artifact if absent (never
    /// overwritten) and initializes the state document if it is blank.
    ///
    /// # Errors
    /// - `LimsError::Validation` if the name sanitizes to nothing, `.` or `..`
    /// - `LimsError::PermissionDenied` / `LimsError::Io` if the folder or
    ///   state document cannot be written
    pub async fn ensure_case(&self, name: &str, notes: &str) -> LimsResult<CaseRef> {
        let case = self.resolve(name);
        if !is_usable(&case.name) {
            return Err(LimsError::validation(format!(
                "'{}' is not a usable case name",
                name.trim()
            )));
        }

        tokio::fs::create_dir_all(&case.dir).await.map_err(|e| {
            let err = LimsError::io(&case.dir, e);
            tracing::warn!(case = %case, error = %err, "cannot create case folder");
            err
        })?;

        let instructions = case.instructions_path();
        if !exists(&instructions).await {
            let text = format!(
                "ORDEN DE TRABAJO\nPACIENTE: {}\nCREADO: {}\n\nNOTAS:\n{}\n",
                name.trim(),
                now_stamp(),
                notes
            );
            if let Err(e) = tokio::fs::write(&instructions, text).await {
                tracing::warn!(
                    path = %instructions.display(),
                    error = %e,
                    "cannot write instructions"
                );
            }
        }

        let mut state = self.load(&case).await;
        if state.is_blank() {
            state = CaseState::initial(&self.initial_phase);
            tracing::info!(case = %case, "case registered");
        }
        self.save(&case, &mut state).await?;
        Ok(case)
    }

    /// Read the state document
    ///
    /// Absent or malformed documents read as blank; malformed content is
    /// dropped on the next write.
    pub async fn load(&self, case: &CaseRef) -> CaseState {
        let path = case.state_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CaseState::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read state");
                return CaseState::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed state, treating as empty");
                CaseState::default()
            }
        }
    }

    /// Write the state document, re-deriving its stored phase
    ///
    /// # Errors
    /// `LimsError::PermissionDenied` / `LimsError::Io` if the write fails
    pub async fn save(&self, case: &CaseRef, state: &mut CaseState) -> LimsResult<()> {
        state.normalize();
        let path = case.state_path();
        let json = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            let err = LimsError::io(&path, e);
            tracing::warn!(error = %err, "cannot write state");
            err
        })
    }

    /// Every case folder under the root
    ///
    /// A missing root yields no cases.
    ///
    /// # Errors
    /// `LimsError::PermissionDenied` / `LimsError::Io` if the root cannot be read
    pub async fn case_dirs(&self) -> LimsResult<Vec<CaseRef>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LimsError::io(&self.root, e)),
        };

        let mut cases = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LimsError::io(&self.root, e))?
        {
            let is_folder = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_folder {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            cases.push(CaseRef {
                dir: entry.path(),
                qr_path: self.qr_dir.join(format!("{name}.{QR_EXTENSION}")),
                name,
            });
        }
        Ok(cases)
    }

    /// Summaries of all cases, most recently modified first
    ///
    /// `qr_url` points below `qr_url_prefix` when the case QR exists.
    ///
    /// # Errors
    /// See [`CaseStore::case_dirs`]
    pub async fn list(&self, qr_url_prefix: &str) -> LimsResult<Vec<CaseSummary>> {
        let mut rows = Vec::new();
        for case in self.case_dirs().await? {
            let modified = tokio::fs::metadata(&case.dir)
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let state = self.load(&case).await;
            let qr_url = self.qr_url(&case, qr_url_prefix).await;
            let summary = CaseSummary {
                name: case.name.clone(),
                path: case.dir.display().to_string(),
                mtime: format_mtime(modified),
                qr_url,
                phase: state.phase().to_string(),
                events_count: state.events.len(),
                last_updated: state.created_at.clone(),
            };
            rows.push((modified, summary));
        }
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(rows.into_iter().map(|(_, s)| s).collect())
    }

    /// URL of the case QR below `qr_url_prefix`, empty when no QR exists
    pub async fn qr_url(&self, case: &CaseRef, qr_url_prefix: &str) -> String {
        if !exists(&case.qr_path).await {
            return String::new();
        }
        format!(
            "{}/{}.{QR_EXTENSION}",
            qr_url_prefix.trim_end_matches('/'),
            case.name
        )
    }

    /// Store an attachment in the case folder, replacing a same-named file
    ///
    /// # Errors
    /// - `LimsError::Validation` if the file name sanitizes to nothing
    /// - `LimsError::PermissionDenied` / `LimsError::Io` if the write fails
    pub async fn attach(&self, case: &CaseRef, file_name: &str, contents: &[u8]) -> LimsResult<PathBuf> {
        let file_name = safe_name(file_name);
        if !is_usable(&file_name) {
            return Err(LimsError::validation("attachment needs a file name"));
        }
        let dest = case.dir.join(&file_name);
        tokio::fs::write(&dest, contents)
            .await
            .map_err(|e| LimsError::io(&dest, e))?;
        tracing::info!(case = %case, file = %file_name, bytes = contents.len(), "file stored");
        Ok(dest)
    }

    /// Regular files directly inside the case folder
    ///
    /// # Errors
    /// `LimsError::PermissionDenied` / `LimsError::Io` if the folder cannot be read
    pub async fn files(&self, case: &CaseRef) -> LimsResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&case.dir)
            .await
            .map_err(|e| LimsError::io(&case.dir, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LimsError::io(&case.dir, e))?
        {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Instructions text, empty when absent
    pub async fn instructions(&self, case: &CaseRef) -> String {
        tokio::fs::read_to_string(case.instructions_path())
            .await
            .unwrap_or_default()
    }

    /// Remove a case folder and its QR image
    ///
    /// # Errors
    /// `LimsError::NotFound` if the case does not exist; removal failures are
    /// reported in the [`DeleteReport`] instead
    pub async fn delete(&self, name: &str) -> LimsResult<DeleteReport> {
        let case = self.open(name).await?;
        let mut report = DeleteReport::default();

        match tokio::fs::remove_dir_all(&case.dir).await {
            Ok(()) => report.removed.push(case.dir.clone()),
            Err(e) => {
                tracing::warn!(path = %case.dir.display(), error = %e, "cannot remove case folder");
                report.failed.push((case.dir.clone(), e.to_string()));
            }
        }

        match tokio::fs::remove_file(&case.qr_path).await {
            Ok(()) => report.removed.push(case.qr_path.clone()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %case.qr_path.display(), error = %e, "cannot remove case QR");
                report.failed.push((case.qr_path.clone(), e.to_string()));
            }
        }

        tracing::info!(case = %case, complete = report.is_complete(), "case deleted");
        Ok(report)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn format_mtime(modified: SystemTime) -> String {
    DateTime::<Local>::from(modified)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Event, STATE_FILE};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CaseStore {
        CaseStore::new(dir.path().join("casos"), dir.path().join("qrs"))
    }

    #[test]
    fn resolve_sanitizes() {
        let dir = TempDir::new().unwrap();
        let case = store(&dir).resolve(" a/b:c ");
        assert_eq!(case.name, "a_b_c");
        assert!(case.dir.ends_with("casos/a_b_c"));
        assert!(case.qr_path.ends_with("qrs/a_b_c.svg"));
    }

    #[tokio::test]
    async fn ensure_case_initializes_received() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let case = store.ensure_case("Juan Pérez", "crown 14").await.unwrap();
        let state = store.load(&case).await;

        assert_eq!(case.name, "Juan Pérez");
        assert_eq!(state.phase(), RECEIVED);
        assert!(state.events.is_empty());
        assert!(!state.created_at.is_empty());
        let instructions = store.instructions(&case).await;
        assert!(instructions.contains("PACIENTE: Juan Pérez"));
        assert!(instructions.contains("crown 14"));
    }

    #[tokio::test]
    async fn ensure_case_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let case = store.ensure_case("Ana", "first notes").await.unwrap();
        let mut state = store.load(&case).await;
        state.append(Event::now("WAXING", "Ana", ""));
        store.save(&case, &mut state).await.unwrap();

        store.ensure_case("Ana", "second notes").await.unwrap();

        let state = store.load(&case).await;
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.phase(), "WAXING");
        let instructions = store.instructions(&case).await;
        assert!(instructions.contains("first notes"));
        assert!(!instructions.contains("second notes"));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).ensure_case("   ", "").await.unwrap_err();
        assert!(matches!(err, LimsError::Validation(_)));
    }

    #[tokio::test]
    async fn malformed_state_reads_blank_and_is_replaced() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let case = store.ensure_case("Luis", "").await.unwrap();
        tokio::fs::write(case.state_path(), "{not json").await.unwrap();

        assert!(store.load(&case).await.is_blank());

        store.ensure_case("Luis", "").await.unwrap();
        let raw = tokio::fs::read_to_string(case.state_path()).await.unwrap();
        let state: CaseState = serde_json::from_str(&raw).unwrap();
        assert_eq!(state.current_phase, RECEIVED);
    }

    #[tokio::test]
    async fn open_missing_case_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).open("ghost").await.unwrap_err();
        assert!(matches!(err, LimsError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_skips_plain_files_and_missing_root() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.list("/static/qrs").await.unwrap().is_empty());

        store.ensure_case("Uno", "").await.unwrap();
        tokio::fs::write(store.root().join("stray.txt"), "x").await.unwrap();

        let rows = store.list("/static/qrs").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Uno");
        assert_eq!(rows[0].events_count, 0);
        assert_eq!(rows[0].qr_url, "");
    }

    #[tokio::test]
    async fn attach_sanitizes_file_name() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let case = store.ensure_case("Eva", "").await.unwrap();

        let path = store.attach(&case, "scan:1?.stl", b"solid").await.unwrap();
        assert!(path.ends_with("scan_1_.stl"));
        assert!(store.attach(&case, "  ", b"").await.is_err());

        let files = store.files(&case).await.unwrap();
        assert_eq!(files.len(), 3);
    }

    #[tokio::test]
    async fn delete_removes_folder_and_qr() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let case = store.ensure_case("Sol", "").await.unwrap();
        tokio::fs::create_dir_all(store.qr_dir()).await.unwrap();
        tokio::fs::write(&case.qr_path, "<svg/>").await.unwrap();

        let report = store.delete("Sol").await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.removed.len(), 2);
        assert!(!case.state_path().exists());
        assert!(!case.qr_path.exists());
        assert!(matches!(store.delete("Sol").await, Err(LimsError::NotFound(_))));
    }

    #[tokio::test]
    async fn dot_names_never_leave_the_root() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let real = store.ensure_case("Real", "").await.unwrap();
        let outside = dir.path().join("precious.txt");
        tokio::fs::write(&outside, "keep").await.unwrap();

        for name in [".", "..", " .. "] {
            let err = store.ensure_case(name, "").await.unwrap_err();
            assert!(matches!(err, LimsError::Validation(_)), "{name:?}");
            assert!(matches!(store.open(name).await, Err(LimsError::NotFound(_))));
            assert!(matches!(store.delete(name).await, Err(LimsError::NotFound(_))));
        }

        assert!(real.state_path().exists());
        assert!(outside.exists());
        assert!(!store.root().join(STATE_FILE).exists());
    }

    #[tokio::test]
    async fn delete_continues_past_an_unremovable_qr() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let case = store.ensure_case("Rosa", "").await.unwrap();
        // a non-empty directory where the QR image should be cannot be unlinked
        tokio::fs::create_dir_all(case.qr_path.join("inner")).await.unwrap();

        let report = store.delete("Rosa").await.unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.removed, vec![case.dir.clone()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, case.qr_path);
        assert!(!case.dir.exists());
    }
}
