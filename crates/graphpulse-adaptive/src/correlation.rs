use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use graphpulse_core::{
    CorrelationKind, EventSink, ObservedChange, ObservedQuery, PulseEvent, ReindexPriority,
    SemanticCorrelation,
};

use crate::emit_event;
use crate::priority::PriorityTracker;
use crate::scheduler::ReindexScheduler;
use crate::store::AdaptiveStore;

// Strength weights: file overlap, entity overlap, recency.
const FILE_WEIGHT: f64 = 0.3;
const ENTITY_WEIGHT: f64 = 0.5;
const RECENCY_WEIGHT: f64 = 0.2;

/// Pairs observed queries with the changes that followed them inside the
/// correlation window, scores each pairing, and asks the scheduler to
/// reindex entities that both sides touched.
#[derive(Clone)]
pub struct CorrelationEngine {
    store: Arc<AdaptiveStore>,
    scheduler: ReindexScheduler,
    priorities: PriorityTracker,
    window_ms: u64,
    min_strength: f64,
    sink: Option<Arc<dyn EventSink>>,
}

impl CorrelationEngine {
    pub fn new(
        store: Arc<AdaptiveStore>,
        scheduler: ReindexScheduler,
        priorities: PriorityTracker,
        window_ms: u64,
        min_strength: f64,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            store,
            scheduler,
            priorities,
            window_ms,
            min_strength,
            sink,
        }
    }

    /// One correlation pass over a session. Pairs every query with every
    /// change that lands after it within the window. Passes are stateless:
    /// re-running over an unchanged session re-emits the same correlations
    /// (the debounced scheduler coalesces the duplicate reindex requests).
    pub fn analyze_session(&self, session_id: &str) -> Vec<SemanticCorrelation> {
        let queries = self.store.queries_for_session(session_id);
        let changes = self.store.changes_for_session(session_id);
        if queries.is_empty() || changes.is_empty() {
            return Vec::new();
        }

        let mut found = Vec::new();
        for query in &queries {
            for change in &changes {
                if let Some(correlation) = self.correlate(query, change) {
                    found.push(correlation);
                }
            }
        }

        if !found.is_empty() {
            if let Some(mut session) = self.store.sessions.get_mut(session_id) {
                session.correlation_count += found.len() as u64;
            }
            self.store
                .correlations
                .write()
                .extend(found.iter().cloned());
            counter!("correlations_found").increment(found.len() as u64);
        }

        for correlation in &found {
            for entity_id in &correlation.shared_entities {
                self.priorities.record_correlation(entity_id);
            }
            emit_event(
                &self.sink,
                PulseEvent::CorrelationFound {
                    correlation_id: correlation.id,
                    query_id: correlation.query_id,
                    kind: correlation.kind,
                    strength: correlation.strength,
                    suggested_entities: correlation.suggested_reindexing.len(),
                },
            );
            if !correlation.shared_entities.is_empty() {
                if let Err(e) = self.scheduler.request_reindex(
                    correlation.shared_entities.clone(),
                    correlation.shared_files.clone(),
                    "query-correlation",
                    ReindexPriority::High,
                    Some(session_id.to_string()),
                ) {
                    warn!("correlation-driven reindex request rejected: {}", e);
                }
            }
        }

        debug!(
            "correlation pass over session {}: {} pairings",
            session_id,
            found.len()
        );
        found
    }

    /// Score one (query, change) pairing. None when the change precedes the
    /// query, falls outside the window, shares nothing with the query, or
    /// scores under the configured minimum.
    fn correlate(
        &self,
        query: &ObservedQuery,
        change: &ObservedChange,
    ) -> Option<SemanticCorrelation> {
        if change.timestamp <= query.timestamp {
            return None;
        }
        let gap_ms = change
            .timestamp
            .signed_duration_since(query.timestamp)
            .num_milliseconds()
            .max(0) as u64;
        if gap_ms > self.window_ms {
            return None;
        }

        let shared_files: Vec<String> = if query.returned_files.contains(&change.file_path) {
            vec![change.file_path.clone()]
        } else {
            Vec::new()
        };

        let touched: HashSet<&String> = change.touched_entities().collect();
        let shared_entities: Vec<String> = query
            .returned_entity_ids
            .iter()
            .filter(|id| touched.contains(id))
            .cloned()
            .collect();

        if shared_files.is_empty() && shared_entities.is_empty() {
            return None;
        }

        let file_ratio = shared_files.len() as f64 / query.returned_files.len().max(1) as f64;
        let entity_ratio =
            shared_entities.len() as f64 / query.returned_entity_ids.len().max(1) as f64;
        let recency = (1.0 - gap_ms as f64 / self.window_ms.max(1) as f64).max(0.0);

        let strength = (FILE_WEIGHT * file_ratio
            + ENTITY_WEIGHT * entity_ratio
            + RECENCY_WEIGHT * recency)
            .min(1.0);
        if strength < self.min_strength {
            return None;
        }

        let kind = if !change.entities_added.is_empty() {
            CorrelationKind::QueryThenCreate
        } else if !change.entities_deleted.is_empty() {
            CorrelationKind::QueryThenDelete
        } else {
            CorrelationKind::QueryThenEdit
        };

        // confidence is pure overlap evidence, deliberately free of the
        // recency term so it does not decay with the time gap
        let confidence = 0.5 * file_ratio + 0.5 * entity_ratio;

        Some(SemanticCorrelation {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            query_id: query.id,
            change_ids: vec![change.id],
            kind,
            strength,
            confidence,
            shared_files,
            shared_entities: shared_entities.clone(),
            suggested_reindexing: shared_entities,
        })
    }
}
