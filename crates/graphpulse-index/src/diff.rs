use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use graphpulse_core::{ChangeSet, FileDescriptor, GraphStore, ModifiedFile, Result};

/// Compares the caller's current view of files against the store's recorded
/// state and partitions every file into exactly one bucket. Read-only: no
/// store mutation happens during diffing.
pub struct ContentDiffEngine {
    store: Arc<dyn GraphStore>,
}

impl ContentDiffEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn diff(&self, current: &[FileDescriptor]) -> Result<ChangeSet> {
        let stored = self.store.file_states().await?;
        let stored_by_id: HashMap<&str, &FileDescriptor> = stored
            .iter()
            .map(|f| (f.file_id.as_str(), f))
            .collect();

        let mut set = ChangeSet::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(current.len());

        for file in current {
            if !seen.insert(file.file_id.as_str()) {
                warn!("duplicate file id in diff input, skipping: {}", file.file_id);
                continue;
            }
            match stored_by_id.get(file.file_id.as_str()) {
                None => set.added.push(file.clone()),
                Some(prev) if prev.content_hash != file.content_hash => {
                    set.modified.push(ModifiedFile {
                        descriptor: file.clone(),
                        previous_hash: prev.content_hash.clone(),
                        current_hash: file.content_hash.clone(),
                    });
                }
                Some(_) => set.unchanged.push(file.clone()),
            }
        }

        for stored_file in &stored {
            if !seen.contains(stored_file.file_id.as_str()) {
                set.deleted.push(stored_file.clone());
            }
        }

        debug!(
            "diff: {} added, {} modified, {} deleted, {} unchanged",
            set.added.len(),
            set.modified.len(),
            set.deleted.len(),
            set.unchanged.len()
        );

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graphpulse_core::{ExtractionBatch, GraphStats};
    use parking_lot::RwLock;

    struct InMemoryStore {
        files: RwLock<Vec<FileDescriptor>>,
    }

    impl InMemoryStore {
        fn with_files(files: Vec<FileDescriptor>) -> Arc<Self> {
            Arc::new(Self {
                files: RwLock::new(files),
            })
        }
    }

    #[async_trait]
    impl GraphStore for InMemoryStore {
        async fn file_states(&self) -> Result<Vec<FileDescriptor>> {
            Ok(self.files.read().clone())
        }
        async fn write_batch(&self, batch: &ExtractionBatch) -> Result<()> {
            let mut files = self.files.write();
            files.retain(|f| f.file_id != batch.file.file_id);
            files.push(batch.file.clone());
            Ok(())
        }
        async fn remove_file_entities(&self, file_id: &str) -> Result<()> {
            self.files.write().retain(|f| f.file_id != file_id);
            Ok(())
        }
        async fn stats(&self) -> Result<GraphStats> {
            Ok(GraphStats {
                files: self.files.read().len() as u64,
                entities: 0,
                relationships: 0,
            })
        }
    }

    fn fd(id: &str, path: &str, hash: &str) -> FileDescriptor {
        FileDescriptor::new(id, path, hash)
    }

    #[tokio::test]
    async fn first_run_marks_everything_added() {
        let store = InMemoryStore::with_files(vec![]);
        let engine = ContentDiffEngine::new(store);
        let set = engine
            .diff(&[fd("f1", "a.rs", "h1"), fd("f2", "b.rs", "h2")])
            .await
            .unwrap();
        assert_eq!(set.added.len(), 2);
        assert!(set.modified.is_empty());
        assert!(set.deleted.is_empty());
        assert!(set.unchanged.is_empty());
    }

    #[tokio::test]
    async fn hash_change_lands_in_modified_with_both_hashes() {
        let store = InMemoryStore::with_files(vec![fd("f1", "a.rs", "h1")]);
        let engine = ContentDiffEngine::new(store);

        let set = engine.diff(&[fd("f1", "a.rs", "h1")]).await.unwrap();
        assert_eq!(set.unchanged.len(), 1);
        assert!(set.is_empty());

        let set = engine.diff(&[fd("f1", "a.rs", "h2")]).await.unwrap();
        assert_eq!(set.modified.len(), 1);
        assert_eq!(set.modified[0].previous_hash, "h1");
        assert_eq!(set.modified[0].current_hash, "h2");
    }

    #[tokio::test]
    async fn missing_current_file_is_deleted() {
        let store =
            InMemoryStore::with_files(vec![fd("f1", "a.rs", "h1"), fd("f2", "b.rs", "h2")]);
        let engine = ContentDiffEngine::new(store);
        let set = engine.diff(&[fd("f1", "a.rs", "h1")]).await.unwrap();
        assert_eq!(set.deleted.len(), 1);
        assert_eq!(set.deleted[0].file_id, "f2");
    }

    #[tokio::test]
    async fn partition_is_complete_and_disjoint() {
        let store = InMemoryStore::with_files(vec![
            fd("kept", "kept.rs", "h1"),
            fd("edited", "edited.rs", "h2"),
            fd("gone", "gone.rs", "h3"),
        ]);
        let engine = ContentDiffEngine::new(store);
        let current = vec![
            fd("kept", "kept.rs", "h1"),
            fd("edited", "edited.rs", "h2x"),
            fd("new", "new.rs", "h4"),
        ];
        let set = engine.diff(&current).await.unwrap();

        let mut all_ids: Vec<String> = set
            .added
            .iter()
            .map(|f| f.file_id.clone())
            .chain(set.modified.iter().map(|m| m.descriptor.file_id.clone()))
            .chain(set.deleted.iter().map(|f| f.file_id.clone()))
            .chain(set.unchanged.iter().map(|f| f.file_id.clone()))
            .collect();
        all_ids.sort();
        assert_eq!(all_ids, vec!["edited", "gone", "kept", "new"]);
        assert_eq!(set.total(), 4);
    }

    #[tokio::test]
    async fn diff_is_idempotent_without_intervening_writes() {
        let store = InMemoryStore::with_files(vec![fd("f1", "a.rs", "h1")]);
        let engine = ContentDiffEngine::new(store);
        let current = vec![fd("f1", "a.rs", "h1")];

        let first = engine.diff(&current).await.unwrap();
        let second = engine.diff(&current).await.unwrap();
        for set in [first, second] {
            assert!(set.added.is_empty());
            assert!(set.modified.is_empty());
            assert!(set.deleted.is_empty());
        }
    }

    #[tokio::test]
    async fn duplicate_input_ids_are_counted_once() {
        let store = InMemoryStore::with_files(vec![]);
        let engine = ContentDiffEngine::new(store);
        let set = engine
            .diff(&[fd("f1", "a.rs", "h1"), fd("f1", "a.rs", "h1")])
            .await
            .unwrap();
        assert_eq!(set.added.len(), 1);
    }
}
