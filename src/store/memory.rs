use super::{apply_update, AtomicUpdate, Document, PartialUpdate, ProfileStore, StoreError};
use crate::errors::ArcadeResult;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-local profile store. Read-modify-write holds the key's shard
/// lock, so updates to one user are serialized.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    docs: DashMap<String, Document>,
    offline: AtomicBool,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network outage: every write fails until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("profile store unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.docs.get(user).map(|doc| doc.clone()))
    }

    async fn set_merge(&self, user: &str, update: &PartialUpdate) -> Result<(), StoreError> {
        self.check_online()?;
        match self.docs.entry(user.to_string()) {
            Entry::Occupied(mut entry) => {
                let mut next = entry.get().clone();
                apply_update(&mut next, update)?;
                entry.insert(next);
            }
            Entry::Vacant(entry) => {
                let mut next = Document::new();
                apply_update(&mut next, update)?;
                entry.insert(next);
            }
        }
        Ok(())
    }

    async fn run_atomic(&self, user: &str, update: AtomicUpdate<'_>) -> ArcadeResult<()> {
        self.check_online()?;
        match self.docs.entry(user.to_string()) {
            Entry::Occupied(mut entry) => {
                let fields = update(Some(entry.get()))?;
                let mut next = entry.get().clone();
                apply_update(&mut next, &fields)?;
                entry.insert(next);
            }
            Entry::Vacant(entry) => {
                let fields = update(None)?;
                if !fields.is_empty() {
                    let mut next = Document::new();
                    apply_update(&mut next, &fields)?;
                    entry.insert(next);
                }
            }
        }
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<(String, Document)>, StoreError> {
        let mut docs: Vec<(String, Document)> = self
            .docs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        docs.truncate(limit);
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ArcadeError, PreconditionError};
    use crate::store::get_i64;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_merge_preserves_other_fields() {
        let store = MemoryProfileStore::new();
        store
            .set_merge("0xa", &PartialUpdate::new().set("email", "cat@example.com"))
            .await
            .unwrap();
        store.set_merge("0xa", &PartialUpdate::new().increment("miles", 10)).await.unwrap();

        let doc = store.get("0xa").await.unwrap().unwrap();
        assert_eq!(doc["email"], "cat@example.com");
        assert_eq!(get_i64(&doc, "miles"), Some(10));
    }

    #[tokio::test]
    async fn test_failed_merge_creates_no_document() {
        let store = MemoryProfileStore::new();
        let err = store
            .set_merge("0xa", &PartialUpdate::new().set("miles", 1).set("a..b", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
        assert!(store.get("0xa").await.unwrap().is_none());
        assert!(store.list(10).await.unwrap().is_empty());

        store.set_merge("0xb", &PartialUpdate::new().set("miles", 3)).await.unwrap();
        store
            .set_merge("0xb", &PartialUpdate::new().set("miles.extra", 1))
            .await
            .unwrap_err();
        assert_eq!(get_i64(&store.get("0xb").await.unwrap().unwrap(), "miles"), Some(3));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryProfileStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.set_merge("0xa", &PartialUpdate::new().increment("miles", 1)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let doc = store.get("0xa").await.unwrap().unwrap();
        assert_eq!(get_i64(&doc, "miles"), Some(400));
    }

    #[tokio::test]
    async fn test_atomic_abort_writes_nothing() {
        let store = MemoryProfileStore::new();
        store.set_merge("0xa", &PartialUpdate::new().increment("miles", 5)).await.unwrap();

        let result = store
            .run_atomic("0xa", &|_doc| Err(PreconditionError::ZeroAmount.into()))
            .await;
        assert!(matches!(result, Err(ArcadeError::Precondition(PreconditionError::ZeroAmount))));

        let doc = store.get("0xa").await.unwrap().unwrap();
        assert_eq!(get_i64(&doc, "miles"), Some(5));
    }

    #[tokio::test]
    async fn test_atomic_sees_missing_document() {
        let store = MemoryProfileStore::new();
        store
            .run_atomic("0xb", &|doc| {
                assert!(doc.is_none());
                Ok(PartialUpdate::new().max("bestScores.slots", 40))
            })
            .await
            .unwrap();

        let doc = store.get("0xb").await.unwrap().unwrap();
        assert_eq!(get_i64(&doc, "bestScores.slots"), Some(40));
    }

    #[tokio::test]
    async fn test_offline_store_rejects_writes() {
        let store = MemoryProfileStore::new();
        store.set_offline(true);

        let err = store.set_merge("0xa", &PartialUpdate::new().increment("miles", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed(_)));
        assert!(store.get("0xa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sorted_and_limited() {
        let store = MemoryProfileStore::new();
        for user in ["0xc", "0xa", "0xb"] {
            store.set_merge(user, &PartialUpdate::new().increment("miles", 1)).await.unwrap();
        }
        let users: Vec<String> = store.list(2).await.unwrap().into_iter().map(|(u, _)| u).collect();
        assert_eq!(users, vec!["0xa".to_string(), "0xb".to_string()]);
    }
}
