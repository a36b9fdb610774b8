use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use priority_queue::PriorityQueue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use graphpulse_core::{
    AdaptiveReindexRequest, EventSink, PulseError, PulseEvent, ReindexPriority, ReindexTrigger,
    RequestStatus, Result,
};

use crate::debounce::Debouncer;
use crate::emit_event;
use crate::store::AdaptiveStore;

/// Draw order for pending requests: higher priority score first, earlier
/// arrival breaking ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RequestRank {
    score: u8,
    arrival: Reverse<u64>,
}

struct Inner {
    store: Arc<AdaptiveStore>,
    pending: Mutex<PriorityQueue<Uuid, RequestRank>>,
    trigger: RwLock<Option<Arc<dyn ReindexTrigger>>>,
    debouncer: Debouncer,
    sink: Option<Arc<dyn EventSink>>,
    batch_size: usize,
    max_pending: usize,
    arrivals: AtomicU64,
}

/// Debounced, batched, cancellable queue of reindex requests. Bursts of
/// requests inside the debounce window coalesce into one processing pass;
/// each pass drains at most `batch_size` requests in descending priority
/// order and isolates per-request trigger failures.
#[derive(Clone)]
pub struct ReindexScheduler {
    inner: Arc<Inner>,
}

impl ReindexScheduler {
    pub fn new(
        store: Arc<AdaptiveStore>,
        batch_size: usize,
        max_pending: usize,
        debounce_ms: u64,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                pending: Mutex::new(PriorityQueue::new()),
                trigger: RwLock::new(None),
                debouncer: Debouncer::new(Duration::from_millis(debounce_ms)),
                sink,
                batch_size,
                max_pending,
                arrivals: AtomicU64::new(0),
            }),
        }
    }

    /// Install the externally supplied reindex executor.
    pub fn set_trigger(&self, trigger: Arc<dyn ReindexTrigger>) {
        *self.inner.trigger.write() = Some(trigger);
    }

    /// Enqueue one reindex request and (re)arm the debounce timer. At
    /// capacity the lowest-ranked pending request is evicted, which may be
    /// the incoming one.
    pub fn request_reindex(
        &self,
        entity_ids: Vec<String>,
        file_paths: Vec<String>,
        reason: impl Into<String>,
        priority: ReindexPriority,
        session_id: Option<String>,
    ) -> Result<AdaptiveReindexRequest> {
        if entity_ids.is_empty() && file_paths.is_empty() {
            return Err(PulseError::InvalidArgument(
                "reindex request needs at least one entity id or file path".into(),
            ));
        }

        let request =
            AdaptiveReindexRequest::new(session_id, entity_ids, file_paths, reason, priority);
        let rank = RequestRank {
            score: priority.score() as u8,
            arrival: Reverse(self.inner.arrivals.fetch_add(1, Ordering::Relaxed)),
        };

        self.inner.store.requests.insert(request.id, request.clone());
        let dropped = {
            let mut pending = self.inner.pending.lock();
            pending.push(request.id, rank);
            if pending.len() > self.inner.max_pending {
                let victim = pending
                    .iter()
                    .min_by_key(|(_, rank)| **rank)
                    .map(|(id, _)| *id);
                victim.and_then(|id| pending.remove(&id)).map(|(id, _)| id)
            } else {
                None
            }
        };

        if let Some(victim_id) = dropped {
            self.inner.store.requests.remove(&victim_id);
            counter!("reindex_requests_dropped").increment(1);
            warn!(
                "pending reindex queue at capacity ({}), dropped request {}",
                self.inner.max_pending, victim_id
            );
        }

        if dropped != Some(request.id) {
            counter!("reindex_requests_created").increment(1);
            debug!(
                "reindex requested: {} ({} entities, priority {})",
                request.id,
                request.entity_ids.len(),
                request.priority
            );
            emit_event(
                &self.inner.sink,
                PulseEvent::ReindexRequested {
                    request_id: request.id,
                    priority: request.priority,
                    reason: request.reason.clone(),
                    entities: request.entity_ids.len(),
                },
            );
        }

        gauge!("pending_reindex_requests").set(self.inner.pending.lock().len() as f64);
        Inner::schedule_processing(&self.inner);
        Ok(request)
    }

    /// Drain one batch of pending requests now. Usually reached through the
    /// debounce timer; exposed for direct calls and `flush`.
    pub async fn process_requests(&self) -> Result<usize> {
        Inner::process(Arc::clone(&self.inner)).await
    }

    /// Cancel the pending timer and run one pass immediately. Deterministic
    /// replacement for waiting out the debounce window.
    pub async fn flush(&self) -> Result<usize> {
        self.inner.debouncer.cancel();
        self.process_requests().await
    }

    /// Remove a request that has not been drawn into a batch yet. Returns
    /// false once the request is processing or finished.
    pub fn cancel_request(&self, id: Uuid) -> bool {
        let removed = self.inner.pending.lock().remove(&id).is_some();
        if removed {
            self.inner.store.requests.remove(&id);
            counter!("reindex_requests_cancelled").increment(1);
            debug!("reindex request cancelled: {}", id);
        }
        removed
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl Inner {
    fn schedule_processing(inner: &Arc<Inner>) {
        let this = Arc::clone(inner);
        inner.debouncer.schedule(async move {
            if let Err(e) = Inner::process(this).await {
                warn!("reindex processing pass failed: {}", e);
            }
        });
    }

    async fn process(this: Arc<Inner>) -> Result<usize> {
        let trigger = this.trigger.read().clone();
        let Some(trigger) = trigger else {
            warn!("no reindex trigger configured, nothing processed");
            return Ok(0);
        };

        let batch: Vec<Uuid> = {
            let mut pending = this.pending.lock();
            let mut drawn = Vec::with_capacity(this.batch_size);
            while drawn.len() < this.batch_size {
                match pending.pop() {
                    Some((id, _)) => drawn.push(id),
                    None => break,
                }
            }
            drawn
        };
        if batch.is_empty() {
            return Ok(0);
        }
        info!("processing {} reindex requests", batch.len());

        let mut processed = 0;
        for id in batch {
            if !this.store.transition_request(id, RequestStatus::Processing) {
                debug!("request {} is no longer pending, skipping", id);
                continue;
            }
            let Some(request) = this.store.request(id) else {
                continue;
            };

            match trigger.reindex(&request).await {
                Ok(()) => {
                    this.store.transition_request(id, RequestStatus::Completed);
                    let now = Utc::now();
                    if let Some(mut stored) = this.store.requests.get_mut(&id) {
                        stored.completed_at = Some(now);
                    }
                    for entity_id in &request.entity_ids {
                        if let Some(mut priority) = this.store.priorities.get_mut(entity_id) {
                            priority.last_indexed = Some(now);
                        }
                    }
                    if let Some(session_id) = &request.session_id {
                        if let Some(mut session) = this.store.sessions.get_mut(session_id) {
                            session.triggered_reindex_count += 1;
                            session.entities_reindexed += request.entity_ids.len() as u64;
                        }
                    }
                    counter!("reindex_completed").increment(1);
                    emit_event(
                        &this.sink,
                        PulseEvent::ReindexCompleted {
                            request_id: id,
                            entities: request.entity_ids.len(),
                        },
                    );
                }
                Err(e) => {
                    this.store.transition_request(id, RequestStatus::Failed);
                    let message = e.to_string();
                    if let Some(mut stored) = this.store.requests.get_mut(&id) {
                        stored.error = Some(message.clone());
                    }
                    counter!("reindex_failed").increment(1);
                    warn!("reindex request {} failed: {}", id, message);
                    emit_event(
                        &this.sink,
                        PulseEvent::ReindexFailed {
                            request_id: id,
                            error: message,
                        },
                    );
                }
            }
            processed += 1;
        }

        let leftover = this.pending.lock().len();
        gauge!("pending_reindex_requests").set(leftover as f64);
        if leftover > 0 {
            debug!("{} reindex requests remain pending", leftover);
            Inner::schedule_processing(&this);
        }
        Ok(processed)
    }
}
