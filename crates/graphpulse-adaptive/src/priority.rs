use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::gauge;
use serde::{Deserialize, Serialize};

use graphpulse_core::{IndexingPriority, PriorityFactor};

use crate::store::AdaptiveStore;

/// Score added when a query returns an entity.
pub const QUERY_BOOST: f64 = 5.0;
/// Score added when a change touches an entity. Edits outweigh reads.
pub const MODIFICATION_BOOST: f64 = 10.0;

/// Recomputed-on-demand popularity ranking, independent of the incremental
/// priority score so usage analytics are not gated on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotEntity {
    pub entity_id: String,
    pub heat: u64,
    pub query_count: u64,
    pub modification_count: u64,
}

/// Maintains per-entity freshness priorities: bounded additive increments
/// from observations plus arbitrary external boosts, never decayed.
#[derive(Clone)]
pub struct PriorityTracker {
    store: Arc<AdaptiveStore>,
}

impl PriorityTracker {
    pub fn new(store: Arc<AdaptiveStore>) -> Self {
        Self { store }
    }

    /// Read-or-create: lazily creates a record at the base score on first
    /// observation of an entity. Never recomputes.
    pub fn calculate_priority(&self, entity_id: &str) -> IndexingPriority {
        self.store
            .priorities
            .entry(entity_id.to_string())
            .or_insert_with(|| IndexingPriority::new(entity_id))
            .clone()
    }

    pub(crate) fn record_query_hit(&self, entity_id: &str) {
        let mut entry = self
            .store
            .priorities
            .entry(entity_id.to_string())
            .or_insert_with(|| IndexingPriority::new(entity_id));
        entry.apply_boost(QUERY_BOOST);
        entry.last_queried = Some(Utc::now());
        entry.query_count += 1;
        let count = entry.query_count;
        upsert_factor(&mut entry.factors, "query-activity", QUERY_BOOST, count as f64);
    }

    pub(crate) fn record_modification(&self, entity_id: &str, file_path: Option<&str>) {
        let mut entry = self
            .store
            .priorities
            .entry(entity_id.to_string())
            .or_insert_with(|| IndexingPriority::new(entity_id));
        entry.apply_boost(MODIFICATION_BOOST);
        entry.last_modified = Some(Utc::now());
        entry.modification_count += 1;
        if let Some(path) = file_path {
            entry.file_path = Some(path.to_string());
        }
        let count = entry.modification_count;
        upsert_factor(
            &mut entry.factors,
            "modification-activity",
            MODIFICATION_BOOST,
            count as f64,
        );
    }

    pub(crate) fn record_correlation(&self, entity_id: &str) {
        let mut entry = self
            .store
            .priorities
            .entry(entity_id.to_string())
            .or_insert_with(|| IndexingPriority::new(entity_id));
        entry.correlation_count += 1;
    }

    /// Apply an arbitrary external boost and remember it as a factor entry.
    pub fn boost_priority(&self, entity_ids: &[String], boost: f64, reason: &str) {
        for entity_id in entity_ids {
            let mut entry = self
                .store
                .priorities
                .entry(entity_id.clone())
                .or_insert_with(|| IndexingPriority::new(entity_id));
            entry.apply_boost(boost);
            let score = entry.priority_score;
            entry.factors.push(PriorityFactor {
                factor: reason.to_string(),
                weight: boost,
                value: score,
            });
        }
        gauge!("tracked_priorities").set(self.store.priorities.len() as f64);
    }

    /// Entities sorted by descending priority score.
    pub fn priority_queue(&self, limit: usize) -> Vec<IndexingPriority> {
        let mut all: Vec<IndexingPriority> =
            self.store.priorities.iter().map(|p| p.clone()).collect();
        all.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        all.truncate(limit);
        all
    }

    /// Heat ranking recomputed from the full observation logs:
    /// `2 * queries + 3 * modifications` per entity.
    pub fn hot_entities(&self, limit: usize) -> Vec<HotEntity> {
        let mut query_counts: HashMap<String, u64> = HashMap::new();
        for query in self.store.queries.read().iter() {
            for entity_id in &query.returned_entity_ids {
                *query_counts.entry(entity_id.clone()).or_default() += 1;
            }
        }

        let mut modification_counts: HashMap<String, u64> = HashMap::new();
        for change in self.store.changes.read().iter() {
            for entity_id in change.touched_entities() {
                *modification_counts.entry(entity_id.clone()).or_default() += 1;
            }
        }

        let mut entities: Vec<HotEntity> = query_counts
            .keys()
            .chain(modification_counts.keys())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .map(|entity_id| {
                let queries = query_counts.get(entity_id).copied().unwrap_or(0);
                let modifications = modification_counts.get(entity_id).copied().unwrap_or(0);
                HotEntity {
                    entity_id: entity_id.clone(),
                    heat: queries * 2 + modifications * 3,
                    query_count: queries,
                    modification_count: modifications,
                }
            })
            .collect();

        entities.sort_by(|a, b| {
            b.heat
                .cmp(&a.heat)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        entities.truncate(limit);
        entities
    }
}

fn upsert_factor(factors: &mut Vec<PriorityFactor>, name: &str, weight: f64, value: f64) {
    if let Some(existing) = factors.iter_mut().find(|f| f.factor == name) {
        existing.weight = weight;
        existing.value = value;
    } else {
        factors.push(PriorityFactor {
            factor: name.to_string(),
            weight,
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphpulse_core::{
        ChangeKind, ChangeObservation, ChangeSource, ObservedChange, ObservedQuery,
        QueryObservation, BASE_PRIORITY_SCORE, MAX_PRIORITY_SCORE,
    };

    fn tracker() -> (Arc<AdaptiveStore>, PriorityTracker) {
        let store = Arc::new(AdaptiveStore::new());
        let tracker = PriorityTracker::new(Arc::clone(&store));
        (store, tracker)
    }

    #[test]
    fn lazily_creates_at_base_score() {
        let (_store, tracker) = tracker();
        let p = tracker.calculate_priority("e1");
        assert_eq!(p.priority_score, BASE_PRIORITY_SCORE);
        assert!(p.factors.is_empty());
        // read again: same record, not a recompute
        let again = tracker.calculate_priority("e1");
        assert_eq!(again.priority_score, BASE_PRIORITY_SCORE);
    }

    #[test]
    fn query_and_modification_increments_differ() {
        let (_store, tracker) = tracker();
        tracker.record_query_hit("e1");
        tracker.record_modification("e1", Some("src/lib.rs"));

        let p = tracker.calculate_priority("e1");
        assert_eq!(
            p.priority_score,
            BASE_PRIORITY_SCORE + QUERY_BOOST + MODIFICATION_BOOST
        );
        assert_eq!(p.query_count, 1);
        assert_eq!(p.modification_count, 1);
        assert!(p.last_queried.is_some());
        assert!(p.last_modified.is_some());
        assert_eq!(p.file_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(p.factors.len(), 2);
    }

    #[test]
    fn score_saturates_at_cap_under_any_sequence() {
        let (_store, tracker) = tracker();
        for _ in 0..30 {
            tracker.record_modification("e1", None);
            tracker.record_query_hit("e1");
        }
        tracker.boost_priority(&["e1".to_string()], 500.0, "manual");
        let p = tracker.calculate_priority("e1");
        assert_eq!(p.priority_score, MAX_PRIORITY_SCORE);
    }

    #[test]
    fn boost_appends_factor_entries() {
        let (_store, tracker) = tracker();
        tracker.boost_priority(&["e1".to_string()], 7.5, "pinned-by-user");
        tracker.boost_priority(&["e1".to_string()], 2.5, "pinned-by-user");
        let p = tracker.calculate_priority("e1");
        assert_eq!(p.priority_score, 60.0);
        assert_eq!(p.factors.len(), 2);
        assert_eq!(p.factors[0].factor, "pinned-by-user");
        assert_eq!(p.factors[0].weight, 7.5);
    }

    #[test]
    fn priority_queue_sorts_descending() {
        let (_store, tracker) = tracker();
        tracker.record_query_hit("cold");
        tracker.record_modification("warm", None);
        tracker.boost_priority(&["hot".to_string()], 40.0, "boost");

        let queue = tracker.priority_queue(10);
        assert_eq!(queue[0].entity_id, "hot");
        assert_eq!(queue[1].entity_id, "warm");
        assert_eq!(queue[2].entity_id, "cold");
        assert_eq!(tracker.priority_queue(2).len(), 2);
    }

    #[test]
    fn heat_is_recomputed_from_logs_not_priorities() {
        let (store, tracker) = tracker();

        let query = ObservedQuery::from_observation(
            QueryObservation {
                returned_entity_ids: vec!["e1".into(), "e2".into()],
                ..Default::default()
            },
            "s1",
        );
        store.queries.write().push(query.clone());
        store.queries.write().push(query);

        store.changes.write().push(ObservedChange::from_observation(
            ChangeObservation {
                session_id: Some("s1".into()),
                kind: ChangeKind::Modified,
                file_path: "src/a.rs".into(),
                previous_file_path: None,
                entities_added: vec![],
                entities_modified: vec!["e2".into()],
                entities_deleted: vec![],
                lines_added: 1,
                lines_deleted: 0,
                source: ChangeSource::UserEdit,
            },
            Some("s1".into()),
        ));

        let hot = tracker.hot_entities(10);
        // e2: 2 queries * 2 + 1 modification * 3 = 7; e1: 2 queries * 2 = 4
        assert_eq!(hot[0].entity_id, "e2");
        assert_eq!(hot[0].heat, 7);
        assert_eq!(hot[1].entity_id, "e1");
        assert_eq!(hot[1].heat, 4);
        // no priority records were needed for the heat ranking
        assert!(store.priority("e1").is_none());
    }
}
