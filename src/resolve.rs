//! Deterministic conflict resolution between two divergent change sets.
//!
//! Given a common ancestor version and one change set per provider, the
//! resolver produces a single unified document. Paths touched by both sets
//! are decided by a pluggable strategy; everything else applies directly.
//! Given identical inputs and the same strategy, the output is byte-identical
//! on every call: conflicts are visited in sorted path order and no wall
//! clock or randomness is consulted.

use crate::diff::{ChangeKind, ChangeSet, ContextChange};
use crate::document::{self, ContextDocument, ContextPath};
use crate::error::SyncError;
use crate::types::ContextSource;
use crate::version::ContextVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Configured strategy, selected in `SyncConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    SourcePriority,
    LastWriteWins,
    StructuralMerge,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::SourcePriority
    }
}

impl ConflictStrategy {
    /// Strategy implementation for this configuration value.
    pub fn strategy(&self) -> &'static dyn ResolutionStrategy {
        match self {
            ConflictStrategy::SourcePriority => &SourcePriority,
            ConflictStrategy::LastWriteWins => &LastWriteWins,
            ConflictStrategy::StructuralMerge => &StructuralMerge,
        }
    }
}

/// Everything a strategy may consult for one conflicting path.
pub struct ConflictContext<'a> {
    pub path: &'a ContextPath,
    pub change_a: &'a ContextChange,
    pub change_b: &'a ContextChange,
    pub set_a: &'a ChangeSet,
    pub set_b: &'a ChangeSet,
}

/// Strategy verdict for one conflicting path.
pub enum ConflictOutcome {
    TakeA,
    TakeB,
    /// Replace the value at the path with a field-by-field merge.
    Merge(Value),
}

/// Pluggable per-path conflict resolution.
///
/// Implementations must be deterministic: the verdict may depend only on the
/// conflict context, never on ambient state.
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn resolve_conflict(&self, ctx: &ConflictContext<'_>) -> ConflictOutcome;
}

/// Provider A wins every conflict.
///
/// This is the default and is an explicit, documented tie-break rather than
/// a statement that provider A's edits are more trustworthy.
pub struct SourcePriority;

impl ResolutionStrategy for SourcePriority {
    fn name(&self) -> &'static str {
        "source_priority"
    }

    fn resolve_conflict(&self, _ctx: &ConflictContext<'_>) -> ConflictOutcome {
        ConflictOutcome::TakeA
    }
}

/// The change set observed later wins, compared at change-set level so a
/// provider's edit batch stays atomic. Ties fall to provider A to keep the
/// outcome deterministic.
pub struct LastWriteWins;

impl ResolutionStrategy for LastWriteWins {
    fn name(&self) -> &'static str {
        "last_write_wins"
    }

    fn resolve_conflict(&self, ctx: &ConflictContext<'_>) -> ConflictOutcome {
        if ctx.set_b.observed_at > ctx.set_a.observed_at {
            ConflictOutcome::TakeB
        } else {
            ConflictOutcome::TakeA
        }
    }
}

/// When both changes carry mapping values, merge them field by field,
/// recursing into shared sub-mappings; leaf collisions fall back to
/// provider A. Non-mapping conflicts fall back to source priority.
pub struct StructuralMerge;

impl ResolutionStrategy for StructuralMerge {
    fn name(&self) -> &'static str {
        "structural_merge"
    }

    fn resolve_conflict(&self, ctx: &ConflictContext<'_>) -> ConflictOutcome {
        match (&ctx.change_a.value, &ctx.change_b.value) {
            (Some(Value::Object(map_a)), Some(Value::Object(map_b))) => {
                ConflictOutcome::Merge(Value::Object(merge_maps(map_a, map_b)))
            }
            _ => ConflictOutcome::TakeA,
        }
    }
}

fn merge_maps(map_a: &Map<String, Value>, map_b: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = map_a.clone();
    for (key, value_b) in map_b {
        match merged.get_mut(key) {
            Some(Value::Object(existing)) => {
                if let Value::Object(nested_b) = value_b {
                    let nested = merge_maps(existing, nested_b);
                    merged.insert(key.clone(), Value::Object(nested));
                }
                // Non-mapping on B's side of a shared key: A's mapping stays.
            }
            Some(_) => {
                // Leaf collision: A's value stays.
            }
            None => {
                merged.insert(key.clone(), value_b.clone());
            }
        }
    }
    merged
}

/// Record of one decided conflict, for observability and the sync event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictDecision {
    pub path: String,
    pub winner: ContextSource,
    pub discarded: Option<Value>,
    pub strategy: String,
}

/// Outcome of a resolution pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub document: ContextDocument,
    pub conflicts: Vec<ConflictDecision>,
    /// Orphaned changes that were implicitly dropped (non-fatal).
    pub warnings: Vec<String>,
}

/// Merge two change sets over a common base into one unified document.
pub fn resolve(
    base: Option<&ContextVersion>,
    set_a: &ChangeSet,
    set_b: &ChangeSet,
    strategy: &dyn ResolutionStrategy,
) -> Result<Resolution, SyncError> {
    let mut unified = match base {
        Some(version) => version.content.clone(),
        None => Value::Object(Map::new()),
    };

    let index_a: BTreeMap<&ContextPath, &ContextChange> =
        set_a.changes.iter().map(|c| (&c.path, c)).collect();
    let index_b: BTreeMap<&ContextPath, &ContextChange> =
        set_b.changes.iter().map(|c| (&c.path, c)).collect();

    let mut conflicts = Vec::new();
    let mut resolved: BTreeMap<ContextPath, ContextChange> = BTreeMap::new();

    for (&path, &change_a) in &index_a {
        match index_b.get(path).copied() {
            Some(change_b) if change_a != change_b => {
                let ctx = ConflictContext {
                    path,
                    change_a,
                    change_b,
                    set_a,
                    set_b,
                };
                let (winner, kept, discarded) = match strategy.resolve_conflict(&ctx) {
                    ConflictOutcome::TakeA => {
                        (set_a.source, change_a.clone(), losing_value(change_b))
                    }
                    ConflictOutcome::TakeB => {
                        (set_b.source, change_b.clone(), losing_value(change_a))
                    }
                    ConflictOutcome::Merge(value) => (
                        ContextSource::Unified,
                        ContextChange::modify(
                            path.clone(),
                            change_a.old_value.clone().unwrap_or(Value::Null),
                            value,
                        ),
                        None,
                    ),
                };
                info!(
                    path = %path,
                    winner = %winner,
                    strategy = strategy.name(),
                    "Resolved context conflict"
                );
                conflicts.push(ConflictDecision {
                    path: path.to_string(),
                    winner,
                    discarded,
                    strategy: strategy.name().to_string(),
                });
                resolved.insert(path.clone(), kept);
            }
            // Identical change on both sides, or only A touched the path.
            _ => {
                resolved.insert(path.clone(), change_a.clone());
            }
        }
    }
    for (&path, &change_b) in &index_b {
        if !index_a.contains_key(path) {
            resolved.insert(path.clone(), change_b.clone());
        }
    }

    let delete_paths: Vec<ContextPath> = resolved
        .iter()
        .filter(|(_, change)| change.kind == ChangeKind::Delete)
        .map(|(path, _)| path.clone())
        .collect();

    let mut warnings = Vec::new();
    for (path, change) in &resolved {
        match change.kind {
            ChangeKind::Add | ChangeKind::Modify => {
                // A surviving child under a deleted parent would leave the
                // document in a dangling state; drop it instead.
                if delete_paths.iter().any(|deleted| deleted.is_ancestor_of(path)) {
                    let message = format!(
                        "dropped change at '{}' because an ancestor path was deleted",
                        path
                    );
                    warn!(path = %path, "Resolution ambiguity: {}", message);
                    warnings.push(message);
                    continue;
                }
                let value = change.value.clone().unwrap_or(Value::Null);
                document::set(&mut unified, path, value)?;
            }
            ChangeKind::Delete => {}
        }
    }
    // Deletes run after adds/modifies, highest path first: removing a low
    // list index shifts its later siblings, so sibling-index deletes must
    // go from the tail toward the head.
    for (path, change) in resolved.iter().rev() {
        if change.kind == ChangeKind::Delete {
            document::remove(&mut unified, path);
        }
    }

    Ok(Resolution {
        document: unified,
        conflicts,
        warnings,
    })
}

fn losing_value(change: &ContextChange) -> Option<Value> {
    change.value.clone().or_else(|| change.old_value.clone())
}
