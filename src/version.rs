//! Immutable context version snapshots.

use crate::document::{self, ContextDocument};
use crate::types::{Checksum, ContextSource, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable snapshot in a synchronization lineage.
///
/// A version always carries the full document, never a delta: any version is
/// independently readable without replaying history. Versions are created
/// only by the synchronization engine after a successful merge cycle and are
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextVersion {
    pub id: VersionId,
    pub version_number: u64,
    pub content: ContextDocument,
    pub source: ContextSource,
    pub timestamp: DateTime<Utc>,
    pub checksum: Checksum,
    pub parent_id: Option<VersionId>,
}

impl ContextVersion {
    /// Create the first version of a lineage.
    pub fn initial(content: ContextDocument, source: ContextSource) -> Self {
        Self::build(content, source, 1, None, Utc::now())
    }

    /// Create the successor of `parent` with the given merged content.
    ///
    /// The child's timestamp is clamped to be non-decreasing relative to the
    /// parent, keeping lineage timestamps monotonic even under clock skew.
    pub fn child_of(parent: &ContextVersion, content: ContextDocument, source: ContextSource) -> Self {
        let timestamp = Utc::now().max(parent.timestamp);
        Self::build(
            content,
            source,
            parent.version_number + 1,
            Some(parent.id),
            timestamp,
        )
    }

    fn build(
        content: ContextDocument,
        source: ContextSource,
        version_number: u64,
        parent_id: Option<VersionId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let checksum = document::checksum(&content);
        let id = compute_version_id(parent_id.as_ref(), version_number, &checksum, source);
        Self {
            id,
            version_number,
            content,
            source,
            timestamp,
            checksum,
            parent_id,
        }
    }
}

/// Compute a VersionId from lineage position and content checksum.
///
/// VersionId = hash("context-version" || parent_id || version_number || checksum || source)
///
/// The same merge outcome at the same lineage position always produces the
/// same id, which makes duplicate-append detection trivial.
pub fn compute_version_id(
    parent_id: Option<&VersionId>,
    version_number: u64,
    checksum: &Checksum,
    source: ContextSource,
) -> VersionId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"context-version");
    match parent_id {
        Some(parent) => {
            hasher.update(&[1u8]);
            hasher.update(parent.as_bytes());
        }
        None => {
            hasher.update(&[0u8]);
        }
    }
    hasher.update(&version_number.to_be_bytes());
    hasher.update(checksum.as_bytes());
    hasher.update(source.as_str().as_bytes());
    VersionId(*hasher.finalize().as_bytes())
}
