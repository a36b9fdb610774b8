use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::debug;
use uuid::Uuid;

use graphpulse_core::{
    AdaptiveConfig, AdaptiveReindexRequest, AdaptiveSession, ChangeObservation, EventSink,
    IndexingPriority, ObservedChange, ObservedQuery, PulseError, PulseEvent, QueryObservation,
    ReindexPriority, ReindexTrigger, Result, SemanticCorrelation,
};

use crate::correlation::CorrelationEngine;
use crate::debounce::Debouncer;
use crate::emit_event;
use crate::priority::{HotEntity, PriorityTracker};
use crate::scheduler::ReindexScheduler;
use crate::session::SessionTracker;
use crate::store::AdaptiveStore;

/// Quiet window before a scheduled correlation pass runs. Not part of the
/// public configuration surface; observation bursts are much denser than
/// reindex traffic, so a short fixed window is enough.
const CORRELATION_DEBOUNCE_MS: u64 = 500;

/// Facade over the adaptive pipeline: observes consumer activity, feeds the
/// session and priority trackers, and lets the correlation engine drive the
/// reindex scheduler. Owns all in-memory state; a fresh engine is a fresh
/// world.
pub struct AdaptiveIndexingEngine {
    config: AdaptiveConfig,
    store: Arc<AdaptiveStore>,
    sessions: SessionTracker,
    priorities: PriorityTracker,
    scheduler: ReindexScheduler,
    correlation: CorrelationEngine,
    correlation_debounce: Debouncer,
    paused: AtomicBool,
    sink: Option<Arc<dyn EventSink>>,
}

impl AdaptiveIndexingEngine {
    pub fn new(config: AdaptiveConfig) -> Result<Self> {
        Self::build(config, None)
    }

    pub fn with_event_sink(config: AdaptiveConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        Self::build(config, Some(sink))
    }

    fn build(config: AdaptiveConfig, sink: Option<Arc<dyn EventSink>>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(AdaptiveStore::new());
        let sessions =
            SessionTracker::new(Arc::clone(&store), config.session_timeout_ms, sink.clone());
        let priorities = PriorityTracker::new(Arc::clone(&store));
        let scheduler = ReindexScheduler::new(
            Arc::clone(&store),
            config.reindex_batch_size,
            config.max_pending_requests,
            config.reindex_debounce_ms,
            sink.clone(),
        );
        let correlation = CorrelationEngine::new(
            Arc::clone(&store),
            scheduler.clone(),
            priorities.clone(),
            config.correlation_window_ms,
            config.min_correlation_strength,
            sink.clone(),
        );
        Ok(Self {
            config,
            store,
            sessions,
            priorities,
            scheduler,
            correlation,
            correlation_debounce: Debouncer::new(Duration::from_millis(CORRELATION_DEBOUNCE_MS)),
            paused: AtomicBool::new(false),
            sink,
        })
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Globally disable observation side effects. Collected state survives.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        debug!("adaptive engine paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        debug!("adaptive engine resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_reindex_trigger(&self, trigger: Arc<dyn ReindexTrigger>) {
        self.scheduler.set_trigger(trigger);
    }

    /// Record one consumer query. While paused (or with query observation
    /// disabled) this is a pass-through: the record is constructed and
    /// returned but nothing is persisted or mutated.
    pub fn observe_query(&self, obs: QueryObservation) -> ObservedQuery {
        if self.is_paused() || !self.config.observe_queries {
            let session_id = obs.session_id.clone().unwrap_or_default();
            return ObservedQuery::from_observation(obs, session_id);
        }

        let session_id = self
            .sessions
            .get_or_create_session(obs.session_id.as_deref())
            .id;
        let query = ObservedQuery::from_observation(obs, session_id.clone());

        if let Some(mut session) = self.store.sessions.get_mut(&session_id) {
            session.query_count += 1;
            for file in &query.returned_files {
                if let Some(domain) = domain_of(file) {
                    session.active_domains.insert(domain);
                }
                session.active_files.insert(file.clone());
            }
            for entity_id in &query.returned_entity_ids {
                session.active_entities.insert(entity_id.clone());
            }
        }

        self.store.queries.write().push(query.clone());
        for entity_id in &query.returned_entity_ids {
            self.priorities.record_query_hit(entity_id);
        }

        counter!("queries_observed").increment(1);
        emit_event(
            &self.sink,
            PulseEvent::QueryObserved {
                query_id: query.id,
                session_id: session_id.clone(),
                tool_name: query.tool_name.clone(),
                result_count: query.result_count,
            },
        );

        if self.config.enable_correlation {
            self.schedule_correlation(session_id);
        }
        query
    }

    /// Record one observed graph change. A change carrying a session id is
    /// attributed there; an anonymous change joins the active session if one
    /// is fresh, otherwise it stays session-less.
    pub fn observe_change(&self, obs: ChangeObservation) -> ObservedChange {
        if self.is_paused() || !self.config.observe_changes {
            let session_id = obs.session_id.clone();
            return ObservedChange::from_observation(obs, session_id);
        }

        let session_id = match obs.session_id.clone() {
            Some(id) => Some(self.sessions.get_or_create_session(Some(&id)).id),
            None => self
                .sessions
                .active_session_id()
                .map(|id| self.sessions.get_or_create_session(Some(&id)).id),
        };
        let change = ObservedChange::from_observation(obs, session_id.clone());

        if let Some(session_id) = &session_id {
            if let Some(mut session) = self.store.sessions.get_mut(session_id) {
                session.change_count += 1;
                session.active_files.insert(change.file_path.clone());
                if let Some(previous) = &change.previous_file_path {
                    session.active_files.insert(previous.clone());
                }
                if let Some(domain) = domain_of(&change.file_path) {
                    session.active_domains.insert(domain);
                }
                for entity_id in change.touched_entities() {
                    session.active_entities.insert(entity_id.clone());
                }
            }
        }

        self.store.changes.write().push(change.clone());
        for entity_id in change.touched_entities() {
            self.priorities
                .record_modification(entity_id, Some(&change.file_path));
        }

        counter!("changes_observed").increment(1);
        emit_event(
            &self.sink,
            PulseEvent::ChangeObserved {
                change_id: change.id,
                session_id: session_id.clone(),
                file_path: change.file_path.clone(),
                kind: change.kind,
            },
        );

        if self.config.enable_correlation {
            if let Some(session_id) = session_id {
                self.schedule_correlation(session_id);
            }
        }
        change
    }

    /// Run one correlation pass now. Defaults to the active session; an
    /// explicitly named session must exist.
    pub fn analyze_correlations(
        &self,
        session_id: Option<&str>,
    ) -> Result<Vec<SemanticCorrelation>> {
        if !self.config.enable_correlation {
            return Ok(Vec::new());
        }
        let session_id = match session_id {
            Some(id) => {
                if self.store.session(id).is_none() {
                    return Err(PulseError::SessionNotFound(id.to_string()));
                }
                id.to_string()
            }
            None => match self.sessions.active_session_id() {
                Some(id) => id,
                None => return Ok(Vec::new()),
            },
        };
        Ok(self.correlation.analyze_session(&session_id))
    }

    /// Cancel the pending correlation timer and run the pass immediately.
    pub fn flush_correlation(&self) -> Vec<SemanticCorrelation> {
        self.correlation_debounce.cancel();
        match self.sessions.active_session_id() {
            Some(id) => self.correlation.analyze_session(&id),
            None => Vec::new(),
        }
    }

    pub fn request_reindex(
        &self,
        entity_ids: Vec<String>,
        file_paths: Vec<String>,
        reason: impl Into<String>,
        priority: ReindexPriority,
    ) -> Result<AdaptiveReindexRequest> {
        self.scheduler.request_reindex(
            entity_ids,
            file_paths,
            reason,
            priority,
            self.sessions.active_session_id(),
        )
    }

    pub async fn process_requests(&self) -> Result<usize> {
        self.scheduler.process_requests().await
    }

    /// Cancel the pending reindex timer and drain one batch immediately.
    pub async fn flush_reindex(&self) -> Result<usize> {
        self.scheduler.flush().await
    }

    pub fn cancel_request(&self, id: Uuid) -> bool {
        self.scheduler.cancel_request(id)
    }

    pub fn get_or_create_session(&self, id: Option<&str>) -> AdaptiveSession {
        self.sessions.get_or_create_session(id)
    }

    pub fn end_session(&self, id: &str) -> Result<AdaptiveSession> {
        self.sessions.end_session(id)
    }

    pub fn list_sessions(&self, limit: usize) -> Vec<AdaptiveSession> {
        self.sessions.list_sessions(limit)
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.sessions.active_session_id()
    }

    pub fn session(&self, id: &str) -> Option<AdaptiveSession> {
        self.store.session(id)
    }

    pub fn calculate_priority(&self, entity_id: &str) -> IndexingPriority {
        self.priorities.calculate_priority(entity_id)
    }

    pub fn boost_priority(&self, entity_ids: &[String], boost: f64, reason: &str) {
        self.priorities.boost_priority(entity_ids, boost, reason)
    }

    pub fn priority_queue(&self, limit: usize) -> Vec<IndexingPriority> {
        self.priorities.priority_queue(limit)
    }

    pub fn hot_entities(&self, limit: usize) -> Vec<HotEntity> {
        self.priorities.hot_entities(limit)
    }

    pub fn queries(&self) -> Vec<ObservedQuery> {
        self.store.queries()
    }

    pub fn changes(&self) -> Vec<ObservedChange> {
        self.store.changes()
    }

    pub fn correlations(&self) -> Vec<SemanticCorrelation> {
        self.store.correlations()
    }

    pub fn requests(&self) -> Vec<AdaptiveReindexRequest> {
        self.store.requests()
    }

    pub fn request(&self, id: Uuid) -> Option<AdaptiveReindexRequest> {
        self.store.request(id)
    }

    fn schedule_correlation(&self, session_id: String) {
        let correlation = self.correlation.clone();
        self.correlation_debounce.schedule(async move {
            correlation.analyze_session(&session_id);
        });
    }
}

/// First path segment of a file inside the project, e.g. `src` or `crates`.
/// Bare file names carry no domain.
fn domain_of(path: &str) -> Option<String> {
    let mut parts = path.split(['/', '\\']).filter(|s| !s.is_empty());
    let first = parts.next()?;
    parts.next().is_some().then(|| first.to_string())
}
