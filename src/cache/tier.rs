//! Remote cache tiers (L2/L3).
//!
//! Accessed through explicit client handles; the hierarchical cache owns the
//! handles and degrades gracefully when a tier is unavailable. `MemoryTier`
//! stands in for a networked key-value store (and gives tests call counters
//! and fault injection); `SledTier` is the durable tier of last resort.

use crate::error::{StorageError, SyncError};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// A shared key-value tier with per-entry TTL.
#[async_trait]
pub trait CacheTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError>;

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), SyncError>;

    async fn remove(&self, key: &str) -> Result<(), SyncError>;
}

/// In-memory stand-in for a networked key-value store.
pub struct MemoryTier {
    name: &'static str,
    entries: RwLock<HashMap<String, (Value, Option<i64>)>>,
    unavailable: AtomicBool,
    get_calls: AtomicU64,
    set_calls: AtomicU64,
}

impl MemoryTier {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            get_calls: AtomicU64::new(0),
            set_calls: AtomicU64::new(0),
        }
    }

    /// Simulate the tier going down.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> u64 {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), SyncError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::CacheUnavailable {
                tier: self.name,
                reason: "tier marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

fn expiry_millis(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| Utc::now().timestamp_millis() + ttl.as_millis() as i64)
}

fn expired(expires_at: Option<i64>) -> bool {
    expires_at
        .map(|at| at <= Utc::now().timestamp_millis())
        .unwrap_or(false)
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let entry = self.entries.read().get(key).cloned();
        match entry {
            Some((_, expires_at)) if expired(expires_at) => {
                self.entries.write().remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), SyncError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.entries
            .write()
            .insert(key.to_string(), (value.clone(), expiry_millis(ttl)));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SyncError> {
        self.check_available()?;
        self.entries.write().remove(key);
        Ok(())
    }
}

/// On-disk record for the durable tier.
#[derive(Serialize, Deserialize)]
struct DurableEntry {
    payload: String,
    expires_at: Option<i64>,
}

/// Sled-backed durable cache tier (L3). Expiry is lazy: an expired record is
/// dropped on the read that discovers it.
pub struct SledTier {
    db: sled::Db,
}

impl SledTier {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, SyncError> {
        let db = sled::open(path).map_err(|e| {
            SyncError::Persistence(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open cache database: {}", e),
            )))
        })?;
        Ok(Self { db })
    }

    fn io_error(&self, context: &str, error: impl std::fmt::Display) -> SyncError {
        SyncError::CacheUnavailable {
            tier: self.name(),
            reason: format!("{}: {}", context, error),
        }
    }
}

#[async_trait]
impl CacheTier for SledTier {
    fn name(&self) -> &'static str {
        "l3-durable"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        let raw = self
            .db
            .get(key.as_bytes())
            .map_err(|e| self.io_error("Failed to read cache entry", e))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let entry: DurableEntry = bincode::deserialize(&raw)
            .map_err(|e| self.io_error("Failed to decode cache entry", e))?;
        if expired(entry.expires_at) {
            self.db
                .remove(key.as_bytes())
                .map_err(|e| self.io_error("Failed to drop expired entry", e))?;
            return Ok(None);
        }
        let value = serde_json::from_str(&entry.payload)
            .map_err(|e| self.io_error("Failed to decode cached value", e))?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<(), SyncError> {
        let entry = DurableEntry {
            payload: serde_json::to_string(value)
                .map_err(|e| self.io_error("Failed to encode cached value", e))?,
            expires_at: expiry_millis(ttl),
        };
        let raw = bincode::serialize(&entry)
            .map_err(|e| self.io_error("Failed to encode cache entry", e))?;
        self.db
            .insert(key.as_bytes(), raw)
            .map_err(|e| self.io_error("Failed to write cache entry", e))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SyncError> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| self.io_error("Failed to remove cache entry", e))?;
        Ok(())
    }
}
