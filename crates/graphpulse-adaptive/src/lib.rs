pub mod correlation;
pub mod debounce;
pub mod engine;
pub mod priority;
pub mod scheduler;
pub mod session;
pub mod store;

pub use correlation::CorrelationEngine;
pub use debounce::Debouncer;
pub use engine::AdaptiveIndexingEngine;
pub use priority::{HotEntity, PriorityTracker, MODIFICATION_BOOST, QUERY_BOOST};
pub use scheduler::ReindexScheduler;
pub use session::SessionTracker;
pub use store::AdaptiveStore;

use std::sync::Arc;

use graphpulse_core::{EventSink, PulseEvent};
use tracing::warn;

/// Best-effort emission: a failing sink is logged and swallowed, telemetry
/// never breaks the indexing path.
pub(crate) fn emit_event(sink: &Option<Arc<dyn EventSink>>, event: PulseEvent) {
    if let Some(sink) = sink {
        if let Err(e) = sink.emit(&event) {
            warn!("event sink error (ignored): {}", e);
        }
    }
}
