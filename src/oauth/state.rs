//! OAuth state correlation
//!
//! Maps a state token to the wallet that started the flow. Entries expire
//! after a TTL and are consumed by the first lookup. The RocksDB store keeps
//! in-flight flows across restarts; keys are SHA-256 digests of the token so
//! the raw state never touches disk.

use super::{OAuthError, Provider};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rocksdb::{Direction, IteratorMode, DB};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const STATE_PREFIX: &str = "oauth:state:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLink {
    pub address: String,
    pub provider: Provider,
    /// PKCE verifier, kept for the token exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    /// Unix seconds
    pub expires_at: i64,
}

impl PendingLink {
    pub fn new(address: impl Into<String>, provider: Provider, code_verifier: Option<String>, ttl: Duration) -> Self {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            address: address.into(),
            provider,
            code_verifier,
            expires_at: Utc::now().timestamp().saturating_add(ttl),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

pub fn state_digest(state: &str) -> String {
    hex::encode(Sha256::digest(state.as_bytes()))
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, state: &str, link: PendingLink) -> Result<(), OAuthError>;

    /// Remove and return the link; `None` if unknown or expired
    async fn take(&self, state: &str) -> Result<Option<PendingLink>, OAuthError>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<usize, OAuthError>;
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    links: DashMap<String, PendingLink>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(&self, state: &str, link: PendingLink) -> Result<(), OAuthError> {
        self.links.insert(state_digest(state), link);
        Ok(())
    }

    async fn take(&self, state: &str) -> Result<Option<PendingLink>, OAuthError> {
        let now = Utc::now().timestamp();
        Ok(self
            .links
            .remove(&state_digest(state))
            .map(|(_, link)| link)
            .filter(|link| !link.is_expired(now)))
    }

    async fn purge_expired(&self) -> Result<usize, OAuthError> {
        let now = Utc::now().timestamp();
        let before = self.links.len();
        self.links.retain(|_, link| !link.is_expired(now));
        Ok(before - self.links.len())
    }
}

#[derive(Clone)]
pub struct RocksStateStore {
    db: Arc<DB>,
    /// Makes get-then-delete in `take` a single step
    take_lock: Arc<Mutex<()>>,
}

impl RocksStateStore {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            db,
            take_lock: Arc::new(Mutex::new(())),
        }
    }

    fn key(state: &str) -> Vec<u8> {
        format!("{}{}", STATE_PREFIX, state_digest(state)).into_bytes()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.take_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn store_err(e: impl ToString) -> OAuthError {
    OAuthError::StateStore(e.to_string())
}

#[async_trait]
impl StateStore for RocksStateStore {
    async fn put(&self, state: &str, link: PendingLink) -> Result<(), OAuthError> {
        let bytes = serde_json::to_vec(&link).map_err(store_err)?;
        self.db.put(Self::key(state), bytes).map_err(store_err)
    }

    async fn take(&self, state: &str) -> Result<Option<PendingLink>, OAuthError> {
        let key = Self::key(state);
        let _guard = self.lock();

        let Some(bytes) = self.db.get(&key).map_err(store_err)? else {
            return Ok(None);
        };
        self.db.delete(&key).map_err(store_err)?;

        let link: PendingLink = serde_json::from_slice(&bytes).map_err(store_err)?;
        Ok((!link.is_expired(Utc::now().timestamp())).then_some(link))
    }

    async fn purge_expired(&self) -> Result<usize, OAuthError> {
        let prefix = STATE_PREFIX.as_bytes();
        let now = Utc::now().timestamp();
        let _guard = self.lock();

        let mut expired = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(store_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            let stale = serde_json::from_slice::<PendingLink>(&value)
                .map(|link| link.is_expired(now))
                .unwrap_or(true);
            if stale {
                expired.push(key);
            }
        }

        for key in &expired {
            self.db.delete(key).map_err(store_err)?;
        }
        Ok(expired.len())
    }
}
