//! Hierarchical read-through/write-through cache.
//!
//! Three tiers in front of context reads: a bounded in-process LRU (L1), an
//! optional shared key-value tier (L2), and an optional durable tier (L3).
//! Hits promote upward; writes go through L1 and L2 synchronously with L3 as
//! best effort, so a write never fails visibly because of the slowest tier.
//! The cache is constructed once and passed explicitly to its consumers.

use crate::document::{self, ContextDocument, ContextPath};
use crate::error::SyncError;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod lru;
pub mod tier;

pub use lru::LruTier;
pub use tier::{CacheTier, MemoryTier, SledTier};

struct RemoteTier {
    tier: Arc<dyn CacheTier>,
    ttl: Option<Duration>,
}

pub struct HierarchicalCache {
    l1: LruTier,
    l2: Option<RemoteTier>,
    l3: Option<RemoteTier>,
}

impl HierarchicalCache {
    /// L1-only cache; remote tiers attach via the builder methods.
    pub fn new(l1_capacity: usize) -> Self {
        Self {
            l1: LruTier::new(l1_capacity),
            l2: None,
            l3: None,
        }
    }

    pub fn with_l2(mut self, tier: Arc<dyn CacheTier>, ttl: Option<Duration>) -> Self {
        self.l2 = Some(RemoteTier { tier, ttl });
        self
    }

    pub fn with_l3(mut self, tier: Arc<dyn CacheTier>, ttl: Option<Duration>) -> Self {
        self.l3 = Some(RemoteTier { tier, ttl });
        self
    }

    /// Effective cache key: the base key alone, or the base key suffixed
    /// with a stable hash of the disambiguating context document.
    pub fn derive_key(base_key: &str, context: Option<&ContextDocument>) -> String {
        match context {
            Some(context) => {
                let digest = document::checksum(context);
                format!("{}:{}", base_key, &digest.to_hex()[..16])
            }
            None => base_key.to_string(),
        }
    }

    /// Read through the tiers, promoting on hit. A remote tier error logs
    /// and falls through to the next tier down; a full miss returns `None`
    /// and recomputation is the caller's responsibility.
    pub async fn get(&self, base_key: &str, context: Option<&ContextDocument>) -> Option<Value> {
        let key = Self::derive_key(base_key, context);

        if let Some(value) = self.l1.get(&key) {
            return Some(value);
        }

        if let Some(l2) = &self.l2 {
            match l2.tier.get(&key).await {
                Ok(Some(value)) => {
                    self.l1.insert(key, value.clone(), None);
                    return Some(value);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(tier = l2.tier.name(), %error, "Cache tier read failed; degrading");
                }
            }
        }

        if let Some(l3) = &self.l3 {
            match l3.tier.get(&key).await {
                Ok(Some(value)) => {
                    if let Some(l2) = &self.l2 {
                        if let Err(error) = l2.tier.set(&key, &value, l2.ttl).await {
                            warn!(tier = l2.tier.name(), %error, "Promotion to L2 failed");
                        }
                    }
                    self.l1.insert(key, value.clone(), None);
                    return Some(value);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(tier = l3.tier.name(), %error, "Cache tier read failed; degrading");
                }
            }
        }

        None
    }

    /// Write through every tier. L1 and L2 writes are synchronous and an L2
    /// failure surfaces to the caller; the L3 write is best-effort.
    pub async fn set(
        &self,
        base_key: &str,
        value: Value,
        context: Option<&ContextDocument>,
        ttl: Option<Duration>,
    ) -> Result<(), SyncError> {
        let key = Self::derive_key(base_key, context);
        self.l1.insert(key.clone(), value.clone(), ttl);

        if let Some(l2) = &self.l2 {
            l2.tier.set(&key, &value, ttl.or(l2.ttl)).await?;
        }
        if let Some(l3) = &self.l3 {
            if let Err(error) = l3.tier.set(&key, &value, ttl.or(l3.ttl)).await {
                warn!(tier = l3.tier.name(), %error, "Best-effort L3 write failed");
            }
        }
        Ok(())
    }

    /// Remove one derived key from every tier (best-effort on remote tiers).
    pub async fn invalidate(&self, base_key: &str, context: Option<&ContextDocument>) {
        let key = Self::derive_key(base_key, context);
        self.l1.remove(&key);
        for remote in [&self.l2, &self.l3].into_iter().flatten() {
            if let Err(error) = remote.tier.remove(&key).await {
                warn!(tier = remote.tier.name(), %error, "Cache invalidation failed");
            }
        }
    }

    /// Invalidate the entries derived from the given changed paths, rather
    /// than flushing the whole cache.
    pub async fn invalidate_paths(&self, paths: &[ContextPath]) {
        for path in paths {
            let key = format!("ctx:{}", path);
            debug!(%key, "Invalidating cache entry for changed path");
            self.invalidate(&key, None).await;
        }
    }

    /// L1 hit counter, exposed for promotion verification.
    pub fn l1_hits(&self) -> u64 {
        self.l1.hits()
    }

    pub fn l1_misses(&self) -> u64 {
        self.l1.misses()
    }

    pub fn l1_len(&self) -> usize {
        self.l1.len()
    }
}
