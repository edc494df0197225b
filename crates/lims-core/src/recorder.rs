//! Event Recorder
//!
//! Appends events to a case's state document. Phases are free-form labels:
//! any phase may follow any other.
//!
//! The append is a read-modify-write of the whole document with no lock;
//! two simultaneous scans of the same case can lose one of the events.

use crate::error::LimsResult;
use crate::store::CaseStore;
use crate::types::{CaseRef, Event};

/// Appends events to cases
#[derive(Debug, Clone)]
pub struct EventRecorder {
    store: CaseStore,
}

impl EventRecorder {
    /// Create recorder over a store
    #[inline]
    #[must_use]
    pub fn new(store: CaseStore) -> Self {
        Self { store }
    }

    /// Append an event stamped now and make `phase` current
    ///
    /// # Errors
    /// `LimsError::PermissionDenied` / `LimsError::Io` if the state document
    /// cannot be written
    pub async fn record(
        &self,
        case: &CaseRef,
        phase: &str,
        actor: &str,
        note: &str,
    ) -> LimsResult<Event> {
        let mut state = self.store.load(case).await;
        let event = Event::now(phase, actor, note);
        state.append(event.clone());
        self.store.save(case, &mut state).await?;
        tracing::info!(case = %case, phase = %phase, worker = %actor, "event recorded");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn record_moves_phase_and_keeps_order() {
        let dir = TempDir::new().unwrap();
        let store = CaseStore::new(dir.path().join("casos"), dir.path().join("qrs"));
        let case = store.ensure_case("Juan", "").await.unwrap();
        let recorder = EventRecorder::new(store.clone());

        recorder.record(&case, "WAXING", "Bob", "").await.unwrap();
        let event = recorder.record(&case, "DONE", "Alice", "note").await.unwrap();

        let state = store.load(&case).await;
        assert_eq!(state.phase(), "DONE");
        assert_eq!(state.current_phase, "DONE");
        assert_eq!(state.events.len(), 2);
        assert_eq!(state.events[0].phase, "WAXING");
        assert_eq!(state.last_event(), Some(&event));
        assert_eq!(event.worker, "Alice");
        assert_eq!(event.note, "note");
    }

    #[tokio::test]
    async fn any_phase_may_follow_any_phase() {
        let dir = TempDir::new().unwrap();
        let store = CaseStore::new(dir.path().join("casos"), dir.path().join("qrs"));
        let case = store.ensure_case("Rosa", "").await.unwrap();
        let recorder = EventRecorder::new(store.clone());

        for phase in ["DONE", "RECEIVED", "DONE", "anything at all"] {
            recorder.record(&case, phase, "Ana", "").await.unwrap();
        }
        assert_eq!(store.load(&case).await.phase(), "anything at all");
    }
}
