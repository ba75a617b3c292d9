//! In-process provider backed by a shared document.
//!
//! Used by tests and embedded setups where one side of the sync lives in the
//! same process. Fault injection toggles let tests exercise the engine's
//! outage and rejected-write paths.

use crate::document::ContextDocument;
use crate::error::SyncError;
use crate::provider::{ContextProvider, ContextSnapshot};
use crate::types::ContextSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct MemoryProvider {
    source: ContextSource,
    document: RwLock<ContextDocument>,
    modified_at: RwLock<Option<DateTime<Utc>>>,
    fail_reads: AtomicBool,
    reject_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryProvider {
    pub fn new(source: ContextSource, document: ContextDocument) -> Self {
        Self {
            source,
            document: RwLock::new(document),
            modified_at: RwLock::new(None),
            fail_reads: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn empty(source: ContextSource) -> Self {
        Self::new(source, Value::Object(Map::new()))
    }

    /// Current document, as a consumer of this provider would see it.
    pub fn document(&self) -> ContextDocument {
        self.document.read().clone()
    }

    /// Apply a local edit, as the external system owning this provider
    /// would, stamping the modification time.
    pub fn edit(&self, mutate: impl FnOnce(&mut ContextDocument)) {
        let mut guard = self.document.write();
        mutate(&mut guard);
        *self.modified_at.write() = Some(Utc::now());
    }

    /// Override the reported modification time; tests use this to pin the
    /// ordering that last-write-wins resolution sees.
    pub fn set_modified_at(&self, timestamp: DateTime<Utc>) {
        *self.modified_at.write() = Some(timestamp);
    }

    /// Make subsequent reads fail with `ProviderUnavailable`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with `ProviderWriteRejected`.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextProvider for MemoryProvider {
    fn source(&self) -> ContextSource {
        self.source
    }

    async fn read_context(&self) -> Result<ContextSnapshot, SyncError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::ProviderUnavailable {
                provider: self.source,
                reason: "injected read failure".to_string(),
            });
        }
        Ok(ContextSnapshot {
            document: self.document.read().clone(),
            modified_at: *self.modified_at.read(),
        })
    }

    async fn write_context(&self, document: &ContextDocument) -> Result<(), SyncError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(SyncError::ProviderWriteRejected {
                provider: self.source,
                reason: "injected write rejection".to_string(),
            });
        }
        *self.document.write() = document.clone();
        *self.modified_at.write() = Some(Utc::now());
        Ok(())
    }
}
