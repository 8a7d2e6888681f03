//! RocksDB-backed profile store

use super::{apply_update, AtomicUpdate, Document, PartialUpdate, ProfileStore, StoreError};
use crate::errors::ArcadeResult;
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

const PROFILE_PREFIX: &str = "profile:";

/// Open (creating if missing) the database shared by the profile and OAuth
/// state stores. `clear_on_start` destroys existing data first.
pub fn open_database<P: AsRef<Path>>(path: P, clear_on_start: bool) -> Result<Arc<DB>, StoreError> {
    let path = path.as_ref();
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_write_buffer_size(16 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

    if clear_on_start && path.exists() {
        info!(path = %path.display(), "clearing database on start");
        DB::destroy(&opts, path).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
    }

    let db = DB::open(&opts, path).map_err(|e| StoreError::ReadFailed(format!("open {}: {}", path.display(), e)))?;
    Ok(Arc::new(db))
}

fn profile_key(user: &str) -> Vec<u8> {
    format!("{}{}", PROFILE_PREFIX, user).into_bytes()
}

#[derive(Clone)]
pub struct RocksProfileStore {
    db: Arc<DB>,
    /// Serializes read-modify-write cycles; RocksDB itself has no merge
    /// semantics for JSON documents.
    write_lock: Arc<Mutex<()>>,
}

impl RocksProfileStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P, clear_on_start: bool) -> Result<Self, StoreError> {
        Ok(Self::new(open_database(path, clear_on_start)?))
    }

    pub fn database(&self) -> Arc<DB> {
        self.db.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self, user: &str) -> Result<Option<Document>, StoreError> {
        let Some(bytes) = self
            .db
            .get(profile_key(user))
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?
        else {
            return Ok(None);
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::CorruptedData(format!("profile {}: {}", user, e)))
    }

    fn save(&self, user: &str, doc: &Document) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(doc)
            .map_err(|e| StoreError::WriteFailed(format!("encode profile {}: {}", user, e)))?;
        self.db
            .put(profile_key(user), bytes)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
    }
}

#[async_trait]
impl ProfileStore for RocksProfileStore {
    async fn get(&self, user: &str) -> Result<Option<Document>, StoreError> {
        self.load(user)
    }

    async fn set_merge(&self, user: &str, update: &PartialUpdate) -> Result<(), StoreError> {
        let _guard = self.lock();
        let mut doc = self.load(user)?.unwrap_or_default();
        apply_update(&mut doc, update)?;
        self.save(user, &doc)
    }

    async fn run_atomic(&self, user: &str, update: AtomicUpdate<'_>) -> ArcadeResult<()> {
        let _guard = self.lock();
        let current = self.load(user)?;
        let fields = update(current.as_ref())?;
        if fields.is_empty() {
            return Ok(());
        }

        let mut doc = current.unwrap_or_default();
        apply_update(&mut doc, &fields)?;
        self.save(user, &doc)?;
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<(String, Document)>, StoreError> {
        let prefix = PROFILE_PREFIX.as_bytes();
        let mut docs = Vec::new();

        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            if docs.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(|e| StoreError::ReadFailed(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            let user = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            let doc: Document = serde_json::from_slice(&value)
                .map_err(|e| StoreError::CorruptedData(format!("profile {}: {}", user, e)))?;
            docs.push((user, doc));
        }
        Ok(docs)
    }
}
