//! Structural change detection between context documents.
//!
//! `detect` is a pure function: it walks the union of leaf paths in the base
//! and current documents and emits one add/modify/delete per path. Equality
//! is deep, order-insensitive for mapping keys and order-sensitive for list
//! elements (serde_json's `Value` equality already has those semantics).

use crate::document::{self, ContextDocument, ContextPath};
use crate::error::SyncError;
use crate::types::ContextSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Kind of change at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

/// One change at one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChange {
    pub path: ContextPath,
    pub kind: ChangeKind,
    /// New value for add/modify.
    pub value: Option<Value>,
    /// Previous value for modify/delete.
    pub old_value: Option<Value>,
}

impl ContextChange {
    pub fn add(path: ContextPath, value: Value) -> Self {
        Self {
            path,
            kind: ChangeKind::Add,
            value: Some(value),
            old_value: None,
        }
    }

    pub fn modify(path: ContextPath, old_value: Value, value: Value) -> Self {
        Self {
            path,
            kind: ChangeKind::Modify,
            value: Some(value),
            old_value: Some(old_value),
        }
    }

    pub fn delete(path: ContextPath, old_value: Value) -> Self {
        Self {
            path,
            kind: ChangeKind::Delete,
            value: None,
            old_value: Some(old_value),
        }
    }
}

/// A provider's changes for one cycle, relative to a common base.
///
/// `observed_at` is change-set-level rather than per-field: a provider's edit
/// batch is treated as atomic by the last-write-wins strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSet {
    pub source: ContextSource,
    pub observed_at: DateTime<Utc>,
    pub changes: Vec<ContextChange>,
}

impl ChangeSet {
    pub fn new(source: ContextSource, changes: Vec<ContextChange>) -> Self {
        Self {
            source,
            observed_at: Utc::now(),
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compute the structural diff from `base` to `current`.
///
/// With no base, every leaf of `current` is an add. Changes come out in
/// sorted path order with at most one change per path; a change whose path
/// sits under an already-reported add/modify of a compound value is
/// suppressed (the ancestor's value carries it).
pub fn detect(
    base: Option<&ContextDocument>,
    current: &ContextDocument,
) -> Result<Vec<ContextChange>, SyncError> {
    if !current.is_object() {
        return Err(SyncError::ContextFormat(
            "context document root must be a mapping".to_string(),
        ));
    }
    if let Some(base) = base {
        if !base.is_object() {
            return Err(SyncError::ContextFormat(
                "base document root must be a mapping".to_string(),
            ));
        }
    }

    let mut paths: BTreeSet<ContextPath> = document::leaf_paths(current).into_iter().collect();
    if let Some(base) = base {
        paths.extend(document::leaf_paths(base));
    }

    let mut changes: Vec<ContextChange> = Vec::new();
    for path in paths {
        // A leaf in one document may be a subtree in the other; in that case
        // the ancestor's modify already covers every descendant.
        if changes
            .last()
            .map(|prior| prior.kind != ChangeKind::Delete && prior.path.is_ancestor_of(&path))
            .unwrap_or(false)
        {
            continue;
        }
        let base_value = base.and_then(|b| document::get(b, &path));
        let current_value = document::get(current, &path);
        match (base_value, current_value) {
            (None, Some(value)) => changes.push(ContextChange::add(path, value.clone())),
            (Some(old), Some(new)) if old != new => {
                changes.push(ContextChange::modify(path, old.clone(), new.clone()))
            }
            (Some(old), None) => changes.push(ContextChange::delete(path, old.clone())),
            _ => {}
        }
    }
    Ok(changes)
}
