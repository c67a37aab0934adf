//! Snapshot store
//!
//! The persistence boundary of the declarative model. Readers take an
//! immutable [`Snapshot`]; writers supply a pure mutator that produces the
//! next snapshot, which the store persists atomically.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::Snapshot;

/// Pure transformation from the current snapshot to the next one.
pub type SnapshotMutator = Box<dyn FnOnce(&Snapshot) -> Result<Snapshot> + Send>;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Current snapshot.
    async fn get(&self) -> Result<Arc<Snapshot>>;

    /// Apply `mutator` to the current snapshot and persist the result.
    ///
    /// If the mutator fails nothing is persisted and its error is returned.
    async fn update(&self, mutator: SnapshotMutator) -> Result<Arc<Snapshot>>;
}

/// Process-local store, used by the agent and in tests.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get(&self) -> Result<Arc<Snapshot>> {
        Ok(self.current.read().await.clone())
    }

    async fn update(&self, mutator: SnapshotMutator) -> Result<Arc<Snapshot>> {
        // Held across the mutator so concurrent updates serialize.
        let mut guard = self.current.write().await;
        let next = Arc::new(mutator(&guard)?);
        *guard = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::ids::DataStoreId;
    use crate::model::DataStore;

    #[tokio::test]
    async fn test_update_persists_new_snapshot() {
        let store = InMemorySnapshotStore::default();
        let id = DataStoreId::new();

        store
            .update(Box::new(move |current: &Snapshot| {
                let mut next = current.clone();
                next.data_stores.push(DataStore {
                    id,
                    name: "orders".to_string(),
                });
                Ok(next)
            }))
            .await
            .unwrap();

        let snapshot = store.get().await.unwrap();
        assert_eq!(snapshot.data_stores.len(), 1);
        assert_eq!(snapshot.data_stores[0].id, id);
    }

    #[tokio::test]
    async fn test_failed_mutator_leaves_snapshot_untouched() {
        let store = InMemorySnapshotStore::default();
        let before = store.get().await.unwrap();

        let result = store
            .update(Box::new(|_: &Snapshot| Err(CoreError::validation("rejected"))))
            .await;

        assert!(result.is_err());
        let after = store.get().await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }
}
