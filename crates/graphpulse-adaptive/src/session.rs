use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use graphpulse_core::{AdaptiveSession, EventSink, PulseError, PulseEvent, Result};

use crate::emit_event;
use crate::store::AdaptiveStore;

/// Maintains time-bounded observation sessions. At most one session is the
/// "active" one: the most recently touched, until it goes quiet for the
/// configured timeout. Expired sessions lose active status but stay listed
/// until explicitly ended.
pub struct SessionTracker {
    store: Arc<AdaptiveStore>,
    timeout: Duration,
    sink: Option<Arc<dyn EventSink>>,
}

impl SessionTracker {
    pub fn new(
        store: Arc<AdaptiveStore>,
        timeout_ms: u64,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            store,
            timeout: Duration::from_millis(timeout_ms),
            sink,
        }
    }

    /// Resolve the session an observation belongs to.
    ///
    /// - known id: touch it and make it active again
    /// - unknown id: create a session under that id
    /// - no id: reuse the active session if still fresh, else start a new
    ///   one under a generated id
    pub fn get_or_create_session(&self, id: Option<&str>) -> AdaptiveSession {
        if let Some(id) = id {
            if let Some(mut session) = self.store.sessions.get_mut(id) {
                session.touch();
                let snapshot = session.clone();
                drop(session);
                *self.store.active_session.write() = Some(id.to_string());
                return snapshot;
            }
            return self.create_session(id.to_string());
        }

        if let Some(active_id) = self.active_session_id() {
            if let Some(mut session) = self.store.sessions.get_mut(&active_id) {
                session.touch();
                return session.clone();
            }
        }

        self.create_session(Uuid::new_v4().to_string())
    }

    /// The active session id, if the active session is still within its
    /// inactivity window. Expiry is lazy: the pointer is cleared on the read
    /// that discovers it, the session record survives for lookup/listing.
    pub fn active_session_id(&self) -> Option<String> {
        let active = self.store.active_session.read().clone()?;
        let fresh = self
            .store
            .sessions
            .get(&active)
            .map(|session| {
                if session.is_ended() {
                    return false;
                }
                let idle = Utc::now().signed_duration_since(session.last_activity_at);
                idle.to_std().map(|d| d < self.timeout).unwrap_or(true)
            })
            .unwrap_or(false);

        if fresh {
            Some(active)
        } else {
            debug!("active session {} expired", active);
            let mut pointer = self.store.active_session.write();
            if pointer.as_deref() == Some(active.as_str()) {
                *pointer = None;
            }
            None
        }
    }

    pub fn end_session(&self, id: &str) -> Result<AdaptiveSession> {
        let Some(mut session) = self.store.sessions.get_mut(id) else {
            return Err(PulseError::SessionNotFound(id.to_string()));
        };
        if session.ended_at.is_none() {
            session.ended_at = Some(Utc::now());
        }
        let snapshot = session.clone();
        drop(session);

        let mut pointer = self.store.active_session.write();
        if pointer.as_deref() == Some(id) {
            *pointer = None;
        }
        drop(pointer);

        emit_event(
            &self.sink,
            PulseEvent::SessionEnded {
                session_id: id.to_string(),
            },
        );
        Ok(snapshot)
    }

    /// Sessions ordered most-recent-activity first.
    pub fn list_sessions(&self, limit: usize) -> Vec<AdaptiveSession> {
        let mut sessions: Vec<AdaptiveSession> =
            self.store.sessions.iter().map(|s| s.clone()).collect();
        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        sessions.truncate(limit);
        sessions
    }

    fn create_session(&self, id: String) -> AdaptiveSession {
        let session = AdaptiveSession::new(id.clone());
        self.store.sessions.insert(id.clone(), session.clone());
        *self.store.active_session.write() = Some(id.clone());
        debug!("session started: {}", id);
        emit_event(&self.sink, PulseEvent::SessionStarted { session_id: id });
        session
    }
}
