//! Bounded in-process cache tier (L1).
//!
//! A coarse-locked map with access ticks: lookups bump a monotonic counter
//! and eviction removes the entry with the oldest tick. Contention here is
//! low (one engine, short critical sections), so per-key locking is not
//! worth its complexity.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Entry {
    value: Value,
    last_used: u64,
    expires_at: Option<Instant>,
}

struct LruInner {
    entries: HashMap<String, Entry>,
    tick: u64,
}

pub struct LruTier {
    inner: Mutex<LruInner>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LruTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let expired = match inner.entries.get(key) {
            Some(entry) => entry
                .expires_at
                .map(|at| at <= Instant::now())
                .unwrap_or(false),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            inner.entries.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.last_used = tick;
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: String, value: Value, ttl: Option<Duration>) {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            {
                inner.entries.remove(&oldest);
            }
        }
        inner.entries.insert(
            key,
            Entry {
                value,
                last_used: tick,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
