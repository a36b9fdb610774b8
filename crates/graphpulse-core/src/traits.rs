use crate::{
    AdaptiveReindexRequest, ExtractionBatch, FileDescriptor, GraphStats, PulseEvent, Result,
};
use async_trait::async_trait;

/// Narrow, typed seam to the durable entity/relationship store. This core
/// reads file states for diffing and issues one logical write or removal per
/// file; the store's schema and query language stay on the other side.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Last-known `(file_id, path, content_hash)` rows. Read-only.
    async fn file_states(&self) -> Result<Vec<FileDescriptor>>;

    /// Upsert one file's extraction rows. Re-writing the same batch is safe.
    async fn write_batch(&self, batch: &ExtractionBatch) -> Result<()>;

    /// Remove a file and, transitively, the entities it owns.
    async fn remove_file_entities(&self, file_id: &str) -> Result<()>;

    async fn stats(&self) -> Result<GraphStats>;
}

/// Caller-supplied reindex executor invoked by the scheduler. Errors are
/// caught per request and recorded on it; they never abort a batch.
#[async_trait]
pub trait ReindexTrigger: Send + Sync {
    async fn reindex(&self, request: &AdaptiveReindexRequest) -> Result<()>;
}

/// Optional append-only observability sink. Emission is best-effort: a
/// failing sink is logged and swallowed, never surfaced to observers.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PulseEvent) -> Result<()>;
}
