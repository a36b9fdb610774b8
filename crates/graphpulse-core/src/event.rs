use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ChangeKind, CorrelationKind, ReindexPriority};

/// One observability event per significant transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PulseEvent {
    SessionStarted {
        session_id: String,
    },
    SessionEnded {
        session_id: String,
    },
    QueryObserved {
        query_id: Uuid,
        session_id: String,
        tool_name: String,
        result_count: u64,
    },
    ChangeObserved {
        change_id: Uuid,
        session_id: Option<String>,
        file_path: String,
        kind: ChangeKind,
    },
    CorrelationFound {
        correlation_id: Uuid,
        query_id: Uuid,
        kind: CorrelationKind,
        strength: f64,
        suggested_entities: usize,
    },
    ReindexRequested {
        request_id: Uuid,
        priority: ReindexPriority,
        reason: String,
        entities: usize,
    },
    ReindexCompleted {
        request_id: Uuid,
        entities: usize,
    },
    ReindexFailed {
        request_id: Uuid,
        error: String,
    },
}
