use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use graphpulse_core::{
    ChangeSet, ExtractionBatch, FileDescriptor, GraphStats, GraphStore, Result,
};

use crate::diff::ContentDiffEngine;

/// Per-file outcome of an apply pass. A failed file never aborts siblings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileApplyResult {
    pub file_id: String,
    pub path: String,
    pub entities: usize,
    pub ok: bool,
    pub error: Option<String>,
}

impl FileApplyResult {
    fn success(file: &FileDescriptor, entities: usize) -> Self {
        Self {
            file_id: file.file_id.clone(),
            path: file.path.clone(),
            entities,
            ok: true,
            error: None,
        }
    }

    fn failure(file: &FileDescriptor, entities: usize, error: impl Into<String>) -> Self {
        Self {
            file_id: file.file_id.clone(),
            path: file.path.clone(),
            entities,
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Result of one diff-driven update pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub change_set: ChangeSet,
    pub applied: Vec<FileApplyResult>,
    pub removed: Vec<FileApplyResult>,
}

impl UpdateOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &FileApplyResult> {
        self.applied
            .iter()
            .chain(self.removed.iter())
            .filter(|r| !r.ok)
    }
}

/// Writes extraction batches to the graph store for files the diff engine
/// says actually changed, and removes entities of deleted files.
pub struct BatchApplier {
    store: Arc<dyn GraphStore>,
    diff: ContentDiffEngine,
}

impl BatchApplier {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        let diff = ContentDiffEngine::new(Arc::clone(&store));
        Self { store, diff }
    }

    pub fn diff_engine(&self) -> &ContentDiffEngine {
        &self.diff
    }

    /// Diff `current_files` against the store, then apply only what changed:
    /// batches for added/modified files are upserted, entities of deleted
    /// files are removed. Store errors are recorded per file.
    pub async fn update(
        &self,
        batches: &[ExtractionBatch],
        current_files: &[FileDescriptor],
    ) -> Result<UpdateOutcome> {
        let change_set = self.diff.diff(current_files).await?;
        let needs_apply = change_set.needs_apply();

        let mut applied = Vec::new();
        for batch in batches {
            if !needs_apply.contains(&batch.file.file_id) {
                debug!("skipping unchanged file: {}", batch.file.path);
                continue;
            }
            applied.push(self.write_one(batch).await);
        }

        // Batches the caller extracted but the diff says must be applied,
        // and vice versa: a changed file with no batch is a caller bug worth
        // surfacing rather than dropping.
        for missing in needs_apply
            .iter()
            .filter(|id| !batches.iter().any(|b| &&b.file.file_id == id))
        {
            let descriptor = change_set
                .added
                .iter()
                .find(|f| &f.file_id == missing)
                .cloned()
                .or_else(|| {
                    change_set
                        .modified
                        .iter()
                        .find(|m| &m.descriptor.file_id == missing)
                        .map(|m| m.descriptor.clone())
                });
            if let Some(descriptor) = descriptor {
                warn!("no extraction batch for changed file: {}", descriptor.path);
                applied.push(FileApplyResult::failure(
                    &descriptor,
                    0,
                    "no extraction batch supplied for changed file",
                ));
            }
        }

        let mut removed = Vec::new();
        for file in &change_set.deleted {
            match self.store.remove_file_entities(&file.file_id).await {
                Ok(()) => {
                    counter!("files_removed").increment(1);
                    removed.push(FileApplyResult::success(file, 0));
                }
                Err(e) => {
                    warn!("failed to remove entities for {}: {}", file.path, e);
                    counter!("apply_failures").increment(1);
                    removed.push(FileApplyResult::failure(file, 0, e.to_string()));
                }
            }
        }

        info!(
            "update applied {} files, removed {} files ({} failures)",
            applied.iter().filter(|r| r.ok).count(),
            removed.iter().filter(|r| r.ok).count(),
            applied.iter().chain(removed.iter()).filter(|r| !r.ok).count()
        );

        Ok(UpdateOutcome {
            change_set,
            applied,
            removed,
        })
    }

    /// Write every batch unconditionally, skipping the diff. First run and
    /// forced reindex path. Partial failures surface per file.
    pub async fn full_reindex(&self, batches: &[ExtractionBatch]) -> Result<Vec<FileApplyResult>> {
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            results.push(self.write_one(batch).await);
        }
        info!(
            "full reindex wrote {} of {} files",
            results.iter().filter(|r| r.ok).count(),
            results.len()
        );
        Ok(results)
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        self.store.stats().await
    }

    async fn write_one(&self, batch: &ExtractionBatch) -> FileApplyResult {
        match self.store.write_batch(batch).await {
            Ok(()) => {
                counter!("files_applied").increment(1);
                FileApplyResult::success(&batch.file, batch.entities.len())
            }
            Err(e) => {
                warn!("failed to write batch for {}: {}", batch.file.path, e);
                counter!("apply_failures").increment(1);
                FileApplyResult::failure(&batch.file, batch.entities.len(), e.to_string())
            }
        }
    }
}
