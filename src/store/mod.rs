//! Append-only version store.
//!
//! Retains every synchronized version indefinitely; the latest unified
//! version is always derivable as the highest version number with
//! source `unified`. Appends validate lineage invariants; stored versions
//! are never mutated.

use crate::error::StorageError;
use crate::types::{ContextSource, VersionId};
use crate::version::ContextVersion;
use parking_lot::RwLock;
use std::collections::HashMap;

pub mod persistence;

pub use persistence::SledVersionStore;

/// Append-only store of immutable context versions.
///
/// Readers never block writers: implementations use snapshot reads or
/// short-lived locks, and writers only contend on version-number allocation.
pub trait VersionStore: Send + Sync {
    /// Append a version, validating lineage invariants:
    /// the id must be new, the version number must exceed the current
    /// latest, the parent must exist (when referenced), and the checksum
    /// must differ from the parent's (no-op cycles are never stored).
    fn append(&self, version: &ContextVersion) -> Result<(), StorageError>;

    /// Fetch a version by id.
    fn get(&self, id: &VersionId) -> Result<Option<ContextVersion>, StorageError>;

    /// Latest version with source `unified`, if any.
    fn latest_unified(&self) -> Result<Option<ContextVersion>, StorageError>;

    /// Highest version number stored so far (0 when empty).
    fn latest_version_number(&self) -> Result<u64, StorageError>;

    /// Walk the parent chain from `id` back to the lineage root,
    /// newest first.
    fn lineage(&self, id: &VersionId) -> Result<Vec<ContextVersion>, StorageError>;

    /// Number of stored versions.
    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

/// Validate lineage invariants shared by all store implementations.
fn validate_append(
    version: &ContextVersion,
    latest_number: u64,
    parent: Option<&ContextVersion>,
) -> Result<(), StorageError> {
    if version.version_number <= latest_number {
        return Err(StorageError::VersionOrder {
            attempted: version.version_number,
            latest: latest_number,
        });
    }
    if let Some(parent_id) = &version.parent_id {
        let parent = parent.ok_or(StorageError::MissingParent(*parent_id))?;
        if parent.checksum == version.checksum {
            return Err(StorageError::EmptyDelta);
        }
    }
    Ok(())
}

/// In-memory version store used by tests and embedded setups.
#[derive(Default)]
pub struct MemoryVersionStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    versions: HashMap<VersionId, ContextVersion>,
    // (source, version_number) ordering is maintained lazily at query time;
    // the map stays small enough that a scan per query is acceptable here.
    latest_number: u64,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for MemoryVersionStore {
    fn append(&self, version: &ContextVersion) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if inner.versions.contains_key(&version.id) {
            return Err(StorageError::DuplicateVersion(version.id));
        }
        let parent = version
            .parent_id
            .as_ref()
            .and_then(|id| inner.versions.get(id))
            .cloned();
        validate_append(version, inner.latest_number, parent.as_ref())?;
        inner.latest_number = version.version_number;
        inner.versions.insert(version.id, version.clone());
        Ok(())
    }

    fn get(&self, id: &VersionId) -> Result<Option<ContextVersion>, StorageError> {
        Ok(self.inner.read().versions.get(id).cloned())
    }

    fn latest_unified(&self) -> Result<Option<ContextVersion>, StorageError> {
        Ok(self
            .inner
            .read()
            .versions
            .values()
            .filter(|v| v.source == ContextSource::Unified)
            .max_by_key(|v| v.version_number)
            .cloned())
    }

    fn latest_version_number(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().latest_number)
    }

    fn lineage(&self, id: &VersionId) -> Result<Vec<ContextVersion>, StorageError> {
        let inner = self.inner.read();
        let mut chain = Vec::new();
        let mut cursor = Some(*id);
        while let Some(current) = cursor {
            let version = inner
                .versions
                .get(&current)
                .ok_or(StorageError::VersionNotFound(current))?;
            cursor = version.parent_id;
            chain.push(version.clone());
        }
        Ok(chain)
    }

    fn len(&self) -> Result<usize, StorageError> {
        Ok(self.inner.read().versions.len())
    }
}
