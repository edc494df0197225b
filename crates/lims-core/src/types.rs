//! Core types for case tracking
//!
//! Defines:
//! - Case references and the on-disk layout of a case
//! - The persisted state document (`estado.json`)
//! - Events appended by scans
//! - Case summaries returned by listings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Phase of a case with no events
pub const RECEIVED: &str = "RECEIVED";

/// Phase recorded by a scan that does not name one
pub const IN_PROCESS: &str = "IN PROCESS";

/// Timestamp layout used throughout the state documents
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// State document file name inside a case folder
pub const STATE_FILE: &str = "estado.json";

/// Instructions artifact file name inside a case folder
pub const INSTRUCTIONS_FILE: &str = "INSTRUCCIONES.txt";

/// File extension of generated QR images
pub const QR_EXTENSION: &str = "svg";

/// Current local time in [`TIMESTAMP_FORMAT`]
#[must_use]
pub fn now_stamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Resolved location of a case
///
/// `name` is the sanitized folder name; it is the case's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseRef {
    /// Sanitized folder name
    pub name: String,
    /// Case folder
    pub dir: PathBuf,
    /// Generated QR image (lives outside the folder)
    pub qr_path: PathBuf,
}

impl CaseRef {
    /// Path of the state document
    #[inline]
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Path of the instructions artifact
    #[inline]
    #[must_use]
    pub fn instructions_path(&self) -> PathBuf {
        self.dir.join(INSTRUCTIONS_FILE)
    }

    /// Case folder
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Display for CaseRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// One recorded touch of a case
///
/// Immutable once appended; order in [`CaseState::events`] is authoritative,
/// `ts` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// When the event was recorded
    #[serde(default)]
    pub ts: String,
    /// Free-form phase label
    #[serde(default)]
    pub phase: String,
    /// Display name (or id) of whoever recorded it
    #[serde(default)]
    pub worker: String,
    /// Free-text note
    #[serde(default)]
    pub note: String,
}

impl Event {
    /// Create event stamped with the current time
    #[must_use]
    pub fn now(
        phase: impl Into<String>,
        worker: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            ts: now_stamp(),
            phase: phase.into(),
            worker: worker.into(),
            note: note.into(),
        }
    }
}

/// Persisted state of a case
///
/// Every field tolerates absence on read. `current_phase` is kept for readers
/// of the raw file; [`CaseState::phase`] is derived from the events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseState {
    /// When the case was first registered
    #[serde(default)]
    pub created_at: String,
    /// Events in append order
    #[serde(default)]
    pub events: Vec<Event>,
    /// Phase as last written
    #[serde(default)]
    pub current_phase: String,
}

impl CaseState {
    /// Fresh state for a newly registered case
    #[must_use]
    pub fn initial(phase: impl Into<String>) -> Self {
        Self {
            created_at: now_stamp(),
            events: Vec::new(),
            current_phase: phase.into(),
        }
    }

    /// Check if nothing was ever written (absent or unreadable document)
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.created_at.is_empty() && self.events.is_empty() && self.current_phase.is_empty()
    }

    /// Current phase: the last event wins
    ///
    /// Falls back to the stored field, then [`RECEIVED`].
    #[must_use]
    pub fn phase(&self) -> &str {
        if let Some(last) = self.events.last() {
            return &last.phase;
        }
        if self.current_phase.is_empty() {
            RECEIVED
        } else {
            &self.current_phase
        }
    }

    /// Append event and move the phase with it
    pub fn append(&mut self, event: Event) {
        self.current_phase = event.phase.clone();
        self.events.push(event);
    }

    /// Rewrite the stored phase from the events
    pub fn normalize(&mut self) {
        self.current_phase = self.phase().to_string();
    }

    /// Most recent event
    #[inline]
    #[must_use]
    pub fn last_event(&self) -> Option<&Event> {
        self.events.last()
    }
}

/// Listing entry for one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    /// Folder name
    pub name: String,
    /// Folder path
    pub path: String,
    /// Folder modification time
    pub mtime: String,
    /// URL of the case QR, empty when none was generated
    pub qr_url: String,
    /// Current phase
    pub phase: String,
    /// Number of events
    pub events_count: usize,
    /// Registration time, as stored in the state document
    pub last_updated: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_state_is_received() {
        let state = CaseState::default();
        assert!(state.is_blank());
        assert_eq!(state.phase(), RECEIVED);
    }

    #[test]
    fn last_event_wins() {
        let mut state = CaseState::initial(RECEIVED);
        state.append(Event::now("WAXING", "Ana", ""));
        state.append(Event::now("DONE", "Alice", "note"));

        assert_eq!(state.phase(), "DONE");
        assert_eq!(state.current_phase, "DONE");
        assert_eq!(state.last_event().map(|e| e.worker.as_str()), Some("Alice"));
    }

    #[test]
    fn phase_ignores_drifted_field() {
        let mut state = CaseState::initial(RECEIVED);
        state.events.push(Event::now("DONE", "Alice", ""));
        state.current_phase = "STALE".to_string();

        assert_eq!(state.phase(), "DONE");
        state.normalize();
        assert_eq!(state.current_phase, "DONE");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let state: CaseState =
            serde_json::from_str(r#"{"events": [{"phase": "X"}]}"#).unwrap();
        assert_eq!(state.created_at, "");
        assert_eq!(state.events[0].worker, "");
        assert_eq!(state.phase(), "X");
    }

    #[test]
    fn stored_phase_used_without_events() {
        let state: CaseState = serde_json::from_str(r#"{"current_phase": "RECIBIDO"}"#).unwrap();
        assert_eq!(state.phase(), "RECIBIDO");
    }

    #[test]
    fn timestamps_use_fixed_layout() {
        let stamp = now_stamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).is_ok());
    }
}
