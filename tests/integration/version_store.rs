//! Durable version store behavior

use coalesce::error::StorageError;
use coalesce::store::{SledVersionStore, VersionStore};
use coalesce::types::ContextSource;
use coalesce::version::ContextVersion;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn versions_survive_reopen() {
    let store_dir = TempDir::new().unwrap();
    let first = ContextVersion::initial(json!({"a": 1}), ContextSource::Unified);
    let second = ContextVersion::child_of(&first, json!({"a": 2}), ContextSource::Unified);

    {
        let store = SledVersionStore::new(store_dir.path()).unwrap();
        store.append(&first).unwrap();
        store.append(&second).unwrap();
    }

    let store = SledVersionStore::new(store_dir.path()).unwrap();
    assert_eq!(store.len().unwrap(), 2);
    assert_eq!(store.latest_version_number().unwrap(), 2);

    let latest = store.latest_unified().unwrap().unwrap();
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.content, json!({"a": 2}));
    assert_eq!(latest.parent_id, Some(first.id));

    let fetched = store.get(&first.id).unwrap().unwrap();
    assert_eq!(fetched.checksum, first.checksum);
    assert_eq!(fetched.timestamp, first.timestamp);
}

#[test]
fn latest_unified_ignores_provider_sourced_versions() {
    let store_dir = TempDir::new().unwrap();
    let store = SledVersionStore::new(store_dir.path()).unwrap();

    let unified = ContextVersion::initial(json!({"a": 1}), ContextSource::Unified);
    store.append(&unified).unwrap();
    let snapshot = ContextVersion::child_of(&unified, json!({"a": 2}), ContextSource::ProviderA);
    store.append(&snapshot).unwrap();

    let latest = store.latest_unified().unwrap().unwrap();
    assert_eq!(latest.id, unified.id);
    assert_eq!(store.latest_version_number().unwrap(), 2);
}

#[test]
fn lineage_is_stable_across_reopen() {
    let store_dir = TempDir::new().unwrap();
    let first = ContextVersion::initial(json!({"n": 1}), ContextSource::Unified);
    let second = ContextVersion::child_of(&first, json!({"n": 2}), ContextSource::Unified);
    let third = ContextVersion::child_of(&second, json!({"n": 3}), ContextSource::Unified);

    {
        let store = SledVersionStore::new(store_dir.path()).unwrap();
        store.append(&first).unwrap();
        store.append(&second).unwrap();
        store.append(&third).unwrap();
    }

    let store = SledVersionStore::new(store_dir.path()).unwrap();
    let chain = store.lineage(&third.id).unwrap();
    let ids: Vec<_> = chain.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![third.id, second.id, first.id]);
}

#[test]
fn invariants_hold_after_reopen() {
    let store_dir = TempDir::new().unwrap();
    let first = ContextVersion::initial(json!({"a": 1}), ContextSource::Unified);
    {
        let store = SledVersionStore::new(store_dir.path()).unwrap();
        store.append(&first).unwrap();
    }

    let store = SledVersionStore::new(store_dir.path()).unwrap();
    // Duplicate ids and stale numbers stay rejected against persisted state.
    assert!(matches!(
        store.append(&first),
        Err(StorageError::DuplicateVersion(_))
    ));
    let stale = ContextVersion::initial(json!({"b": 2}), ContextSource::Unified);
    assert!(matches!(
        store.append(&stale),
        Err(StorageError::VersionOrder { .. })
    ));
    let same_content = ContextVersion::child_of(&first, json!({"a": 1}), ContextSource::Unified);
    assert!(matches!(
        store.append(&same_content),
        Err(StorageError::EmptyDelta)
    ));
}
