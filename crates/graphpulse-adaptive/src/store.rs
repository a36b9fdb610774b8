use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use graphpulse_core::{
    AdaptiveReindexRequest, AdaptiveSession, IndexingPriority, ObservedChange, ObservedQuery,
    RequestStatus, SemanticCorrelation,
};

/// All in-memory state of one engine instance. Constructed per engine, never
/// global; mutation stays inside this crate, consumers get cloned reads.
#[derive(Default)]
pub struct AdaptiveStore {
    pub(crate) sessions: DashMap<String, AdaptiveSession>,
    pub(crate) active_session: RwLock<Option<String>>,
    pub(crate) queries: RwLock<Vec<ObservedQuery>>,
    pub(crate) changes: RwLock<Vec<ObservedChange>>,
    pub(crate) correlations: RwLock<Vec<SemanticCorrelation>>,
    pub(crate) priorities: DashMap<String, IndexingPriority>,
    pub(crate) requests: DashMap<Uuid, AdaptiveReindexRequest>,
}

impl AdaptiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: &str) -> Option<AdaptiveSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn queries(&self) -> Vec<ObservedQuery> {
        self.queries.read().clone()
    }

    pub fn queries_for_session(&self, session_id: &str) -> Vec<ObservedQuery> {
        self.queries
            .read()
            .iter()
            .filter(|q| q.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn changes(&self) -> Vec<ObservedChange> {
        self.changes.read().clone()
    }

    pub fn changes_for_session(&self, session_id: &str) -> Vec<ObservedChange> {
        self.changes
            .read()
            .iter()
            .filter(|c| c.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect()
    }

    pub fn correlations(&self) -> Vec<SemanticCorrelation> {
        self.correlations.read().clone()
    }

    pub fn priority(&self, entity_id: &str) -> Option<IndexingPriority> {
        self.priorities.get(entity_id).map(|p| p.clone())
    }

    pub fn request(&self, id: Uuid) -> Option<AdaptiveReindexRequest> {
        self.requests.get(&id).map(|r| r.clone())
    }

    pub fn requests(&self) -> Vec<AdaptiveReindexRequest> {
        self.requests.iter().map(|r| r.clone()).collect()
    }

    pub fn pending_request_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count()
    }

    /// Status moves strictly forward: pending -> processing -> completed |
    /// failed. Returns false (and leaves the record untouched) for any other
    /// transition.
    pub(crate) fn transition_request(&self, id: Uuid, next: RequestStatus) -> bool {
        let Some(mut request) = self.requests.get_mut(&id) else {
            return false;
        };
        let legal = matches!(
            (request.status, next),
            (RequestStatus::Pending, RequestStatus::Processing)
                | (RequestStatus::Processing, RequestStatus::Completed)
                | (RequestStatus::Processing, RequestStatus::Failed)
        );
        if legal {
            request.status = next;
        }
        legal
    }
}
