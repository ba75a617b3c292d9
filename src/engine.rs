//! Synchronization engine: the periodic merge cycle and its state machine.
//!
//! One cycle walks IDLE → FETCHING → DIFFING → RESOLVING → PERSISTING →
//! PROPAGATING → IDLE, with ERROR reachable from any active state. At most
//! one cycle is in flight per engine instance; triggers arriving mid-cycle
//! coalesce into a single follow-up cycle. Instances synchronizing the same
//! provider pair must be coordinated by an external lock — that is outside
//! this engine.

use crate::cache::HierarchicalCache;
use crate::config::SyncConfig;
use crate::diff::{detect, ChangeSet};
use crate::document::ContextDocument;
use crate::error::SyncError;
use crate::events::{EventBus, SyncCompleted};
use crate::provider::{read_with_timeout, write_with_timeout, ProviderHandle};
use crate::resolve::resolve;
use crate::store::VersionStore;
use crate::types::{ContextSource, VersionId};
use crate::version::ContextVersion;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

/// Cache key under which the latest unified document is kept.
const UNIFIED_CONTEXT_KEY: &str = "unified_context";

/// Engine state, visible for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Diffing,
    Resolving,
    Persisting,
    Propagating,
    Error,
}

/// Result of one synchronization cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Neither provider diverged and nobody is lagging; nothing happened.
    NoOp,
    /// No content change, but an existing version was re-pushed to
    /// providers that had not yet received it.
    Reconciled { version_id: VersionId, degraded: bool },
    /// A new unified version was persisted.
    Synced {
        version_id: VersionId,
        version_number: u64,
        change_count: usize,
        conflict_count: usize,
        /// True when at least one provider could not be updated; the
        /// version store remains the source of truth and the provider is
        /// reconciled on a later cycle.
        degraded: bool,
    },
}

impl CycleOutcome {
    fn degraded(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Reconciled { degraded: true, .. }
                | CycleOutcome::Synced { degraded: true, .. }
        )
    }
}

/// What the engine knows about a provider's copy of the context.
///
/// Absent entry: unknown (fresh engine); the provider is assumed to hold the
/// latest unified version. `None`: the provider is known to predate the
/// first version it ever acknowledged. `Some(id)`: the provider last
/// acknowledged that version, and its fetched document is diffed against it
/// rather than against a newer version it never received.
type AckMap = HashMap<ContextSource, Option<VersionId>>;

pub struct SyncEngine {
    config: SyncConfig,
    provider_a: ProviderHandle,
    provider_b: ProviderHandle,
    store: Arc<dyn VersionStore>,
    cache: Arc<HierarchicalCache>,
    bus: EventBus,
    state: parking_lot::Mutex<SyncState>,
    acked: parking_lot::Mutex<AckMap>,
    cycle_lock: tokio::sync::Mutex<()>,
    trigger: Notify,
    shutdown: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        provider_a: ProviderHandle,
        provider_b: ProviderHandle,
        store: Arc<dyn VersionStore>,
        cache: Arc<HierarchicalCache>,
    ) -> Self {
        Self {
            config,
            provider_a,
            provider_b,
            store,
            cache,
            bus: EventBus::new(),
            state: parking_lot::Mutex::new(SyncState::Idle),
            acked: parking_lot::Mutex::new(HashMap::new()),
            cycle_lock: tokio::sync::Mutex::new(()),
            trigger: Notify::new(),
            shutdown: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Current state-machine state.
    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    fn set_state(&self, state: SyncState) {
        debug!(state = ?state, "Engine state transition");
        *self.state.lock() = state;
    }

    /// Request an out-of-band cycle. Coalesced: a trigger arriving while a
    /// cycle is in flight schedules exactly one follow-up.
    pub fn trigger_sync(&self) {
        self.trigger.notify_one();
    }

    /// Subscribe to `SyncCompleted` events. Delivery is at-least-once for
    /// consumers that keep up; consumers must be idempotent on `version_id`.
    pub fn subscribe(&self) -> mpsc::Receiver<SyncCompleted> {
        self.bus.subscribe(self.config.event_queue_capacity)
    }

    /// Stop the run loop after the in-flight cycle, if any. There is no
    /// mid-cycle cancellation contract.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.trigger.notify_one();
    }

    /// Latest persisted unified context, read through the cache.
    pub async fn get_unified_context(&self) -> Result<Option<ContextDocument>, SyncError> {
        if let Some(document) = self.cache.get(UNIFIED_CONTEXT_KEY, None).await {
            return Ok(Some(document));
        }
        match self.store.latest_unified()? {
            Some(version) => {
                if let Err(cache_error) = self
                    .cache
                    .set(UNIFIED_CONTEXT_KEY, version.content.clone(), None, None)
                    .await
                {
                    warn!(%cache_error, "Failed to refill unified-context cache entry");
                }
                Ok(Some(version.content))
            }
            None => Ok(None),
        }
    }

    /// Timer-driven loop. Runs until `shutdown()`; errors never halt it,
    /// they only grow the delay before the next fetch attempt.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; consume it
        // so the engine waits one full period before its first cycle.
        interval.tick().await;

        info!(
            interval_secs = self.config.interval_secs,
            strategy = ?self.config.strategy,
            "Synchronization engine started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.trigger.notified() => {}
            }
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let failures = self.consecutive_failures.load(Ordering::SeqCst);
            if failures > 0 {
                let backoff = self.error_backoff(failures);
                debug!(failures, ?backoff, "Backing off before next fetch");
                tokio::time::sleep(backoff).await;
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::NoOp) => debug!("Sync cycle was a no-op"),
                Ok(CycleOutcome::Reconciled { version_id, .. }) => {
                    info!(%version_id, "Re-propagated existing version to lagging providers")
                }
                Ok(CycleOutcome::Synced {
                    version_number,
                    change_count,
                    ..
                }) => info!(version_number, change_count, "Sync cycle completed"),
                Err(cycle_error) => error!(%cycle_error, "Sync cycle failed"),
            }
        }

        info!("Synchronization engine stopped");
    }

    /// Run one synchronization cycle under the engine's mutual exclusion.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, SyncError> {
        let _guard = self.cycle_lock.lock().await;
        match self.execute_cycle().await {
            Ok(outcome) => {
                if outcome.degraded() {
                    // A degraded propagation earns an immediate follow-up
                    // cycle instead of waiting for the timer, bounded by the
                    // growing fetch backoff, so the lagging provider
                    // reconverges before its local state drifts further.
                    self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
                    self.trigger.notify_one();
                } else {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                }
                self.set_state(SyncState::Idle);
                Ok(outcome)
            }
            Err(cycle_error) => {
                self.set_state(SyncState::Error);
                self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
                self.set_state(SyncState::Idle);
                Err(cycle_error)
            }
        }
    }

    async fn execute_cycle(&self) -> Result<CycleOutcome, SyncError> {
        let timeout = self.config.provider_timeout();

        self.set_state(SyncState::Fetching);
        // Concurrent fetches are a latency optimization only; both must
        // complete before diffing, and either failure aborts the cycle —
        // the engine never merges with one provider's data missing.
        let (snapshot_a, snapshot_b) = tokio::join!(
            read_with_timeout(self.provider_a.as_ref(), timeout),
            read_with_timeout(self.provider_b.as_ref(), timeout),
        );
        let snapshot_a = snapshot_a?;
        let snapshot_b = snapshot_b?;

        self.set_state(SyncState::Diffing);
        let base = self.store.latest_unified()?;
        let base_a = self.provider_base(ContextSource::ProviderA, base.as_ref())?;
        let base_b = self.provider_base(ContextSource::ProviderB, base.as_ref())?;
        // A provider-reported modification time gives last-write-wins a
        // real ordering. Providers that report none fall back to a single
        // shared fetch timestamp, never to per-set clock reads: those would
        // bias resolution toward whichever set was built second.
        let fetched_at = Utc::now();
        let set_a = ChangeSet {
            source: ContextSource::ProviderA,
            observed_at: snapshot_a.modified_at.unwrap_or(fetched_at),
            changes: detect(base_a.as_ref().map(|v| &v.content), &snapshot_a.document)?,
        };
        let set_b = ChangeSet {
            source: ContextSource::ProviderB,
            observed_at: snapshot_b.modified_at.unwrap_or(fetched_at),
            changes: detect(base_b.as_ref().map(|v| &v.content), &snapshot_b.document)?,
        };

        self.set_state(SyncState::Resolving);
        if set_a.is_empty() && set_b.is_empty() {
            return self.finish_unchanged(base).await;
        }
        let strategy = self.config.strategy.strategy();
        let resolution = resolve(base.as_ref(), &set_a, &set_b, strategy)?;
        let merged_checksum = crate::document::checksum(&resolution.document);
        if let Some(latest) = &base {
            if merged_checksum == latest.checksum {
                return self.finish_unchanged(base).await;
            }
        }

        self.set_state(SyncState::Persisting);
        let version = match &base {
            Some(parent) => {
                ContextVersion::child_of(parent, resolution.document, ContextSource::Unified)
            }
            None => ContextVersion::initial(resolution.document, ContextSource::Unified),
        };
        // A failed append discards the attempted version entirely; nothing
        // is partially committed.
        self.store.append(&version)?;

        self.set_state(SyncState::Propagating);
        let applied = detect(base.as_ref().map(|v| &v.content), &version.content)?;
        let degraded = self.propagate_to_all(&version).await;

        let changed_paths: Vec<_> = applied.iter().map(|c| c.path.clone()).collect();
        self.cache.invalidate_paths(&changed_paths).await;
        if let Err(cache_error) = self
            .cache
            .set(UNIFIED_CONTEXT_KEY, version.content.clone(), None, None)
            .await
        {
            warn!(%cache_error, "Failed to refresh unified-context cache entry");
        }

        let event = SyncCompleted {
            version_id: version.id,
            version_number: version.version_number,
            change_count: applied.len(),
            conflict_count: resolution.conflicts.len(),
            timestamp: Utc::now(),
        };
        self.bus.publish(&event);

        Ok(CycleOutcome::Synced {
            version_id: version.id,
            version_number: version.version_number,
            change_count: applied.len(),
            conflict_count: resolution.conflicts.len(),
            degraded,
        })
    }

    /// Close out a cycle that produced no content change. If an earlier
    /// propagation failure left a provider behind, re-push the latest
    /// version to it (no new version, no event).
    async fn finish_unchanged(
        &self,
        latest: Option<ContextVersion>,
    ) -> Result<CycleOutcome, SyncError> {
        let Some(latest) = latest else {
            return Ok(CycleOutcome::NoOp);
        };
        let lagging: Vec<ProviderHandle> = [&self.provider_a, &self.provider_b]
            .into_iter()
            .filter(|p| !self.has_acked(p.source(), &latest.id))
            .cloned()
            .collect();
        if lagging.is_empty() {
            return Ok(CycleOutcome::NoOp);
        }

        self.set_state(SyncState::Propagating);
        let mut degraded = false;
        for provider in &lagging {
            if self.propagate(provider, &latest.content).await {
                self.record_ack(provider.source(), latest.id);
            } else {
                degraded = true;
            }
        }
        Ok(CycleOutcome::Reconciled {
            version_id: latest.id,
            degraded,
        })
    }

    /// Push a freshly persisted version to both providers, recording which
    /// of them acknowledged it. Returns true when anyone was left behind.
    async fn propagate_to_all(&self, version: &ContextVersion) -> bool {
        let mut degraded = false;
        for provider in [&self.provider_a, &self.provider_b] {
            if self.propagate(provider, &version.content).await {
                self.record_ack(provider.source(), version.id);
            } else {
                self.record_missed_ack(provider.source());
                degraded = true;
            }
        }
        degraded
    }

    /// Push the merged document to one provider with bounded exponential
    /// backoff. Returns false when the provider could not be updated; the
    /// persisted version is never rolled back.
    async fn propagate(&self, provider: &ProviderHandle, document: &ContextDocument) -> bool {
        let timeout = self.config.provider_timeout();
        for attempt in 0..self.config.propagate_max_attempts {
            match write_with_timeout(provider.as_ref(), document, timeout).await {
                Ok(()) => return true,
                Err(SyncError::ProviderWriteRejected { provider, reason }) => {
                    // The provider's own validation turned the payload down;
                    // retrying the same payload cannot succeed.
                    warn!(%provider, %reason, "Degraded sync: provider rejected merged context");
                    return false;
                }
                Err(propagate_error) => {
                    let backoff = self.config.backoff_base() * 2u32.saturating_pow(attempt);
                    warn!(
                        provider = %provider.source(),
                        attempt = attempt + 1,
                        %propagate_error,
                        "Propagation attempt failed; backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        warn!(
            provider = %provider.source(),
            attempts = self.config.propagate_max_attempts,
            "Degraded sync: propagation attempts exhausted; provider will be reconciled next cycle"
        );
        false
    }

    /// The version this provider's fetched document should be diffed
    /// against: the version it last acknowledged. With no acknowledgement
    /// on record (fresh engine) the provider is assumed current; a provider
    /// known to predate its first version diffs against an empty base.
    fn provider_base(
        &self,
        source: ContextSource,
        latest: Option<&ContextVersion>,
    ) -> Result<Option<ContextVersion>, SyncError> {
        let acked = self.acked.lock().get(&source).cloned();
        match acked {
            Some(Some(version_id)) => {
                if latest.map(|v| v.id) == Some(version_id) {
                    return Ok(latest.cloned());
                }
                Ok(self.store.get(&version_id)?)
            }
            Some(None) => Ok(None),
            None => Ok(latest.cloned()),
        }
    }

    fn has_acked(&self, source: ContextSource, version_id: &VersionId) -> bool {
        match self.acked.lock().get(&source) {
            Some(Some(acked)) => acked == version_id,
            Some(None) => false,
            // Unknown state is assumed current; see provider_base.
            None => true,
        }
    }

    fn record_ack(&self, source: ContextSource, version_id: VersionId) {
        self.acked.lock().insert(source, Some(version_id));
    }

    /// Mark a provider as known to have missed a version, preserving any
    /// earlier acknowledgement (its document still reflects that version).
    fn record_missed_ack(&self, source: ContextSource) {
        self.acked.lock().entry(source).or_insert(None);
    }

    fn error_backoff(&self, failures: u32) -> Duration {
        let base = self.config.backoff_base();
        let grown = base * 2u32.saturating_pow(failures.min(16));
        grown.min(self.config.error_backoff_cap())
    }
}
