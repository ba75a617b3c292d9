//! Hierarchical cache behavior across all three tiers

use coalesce::cache::{CacheTier, HierarchicalCache, MemoryTier, SledTier};
use coalesce::document::ContextPath;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn full_hierarchy_promotes_from_durable_tier() {
    let cache_dir = TempDir::new().unwrap();
    let l2 = Arc::new(MemoryTier::new("l2"));
    let l3 = Arc::new(SledTier::new(cache_dir.path()).unwrap());
    let cache = HierarchicalCache::new(4)
        .with_l2(l2.clone(), None)
        .with_l3(l3.clone(), None);

    // Seed only the durable tier, as if this process had restarted.
    l3.set("ctx:session", &json!({"topic": "sync"}), None)
        .await
        .unwrap();

    assert_eq!(
        cache.get("ctx:session", None).await,
        Some(json!({"topic": "sync"}))
    );
    // The hit was promoted into both upper tiers.
    assert_eq!(
        l2.get("ctx:session").await.unwrap(),
        Some(json!({"topic": "sync"}))
    );
    assert_eq!(cache.l1_len(), 1);

    // Subsequent reads come from L1.
    let l2_calls = l2.get_calls();
    cache.get("ctx:session", None).await;
    assert_eq!(l2.get_calls(), l2_calls);
}

#[tokio::test]
async fn l1_eviction_falls_back_to_lower_tiers() {
    let l2 = Arc::new(MemoryTier::new("l2"));
    let cache = HierarchicalCache::new(2).with_l2(l2.clone(), None);

    cache.set("a", json!(1), None, None).await.unwrap();
    cache.set("b", json!(2), None, None).await.unwrap();
    cache.set("c", json!(3), None, None).await.unwrap();

    // Capacity two: one of the earlier keys was evicted from L1, but every
    // key is still readable through L2.
    assert!(cache.l1_len() <= 2);
    for (key, expected) in [("a", json!(1)), ("b", json!(2)), ("c", json!(3))] {
        assert_eq!(cache.get(key, None).await, Some(expected));
    }
}

#[tokio::test]
async fn path_invalidation_clears_derived_entries() {
    let l2 = Arc::new(MemoryTier::new("l2"));
    let cache = HierarchicalCache::new(8).with_l2(l2.clone(), None);

    cache
        .set("ctx:session.topic", json!("old"), None, None)
        .await
        .unwrap();
    cache
        .set("ctx:session.owner", json!("alice"), None, None)
        .await
        .unwrap();

    let changed = vec![ContextPath::parse("session.topic").unwrap()];
    cache.invalidate_paths(&changed).await;

    assert_eq!(cache.get("ctx:session.topic", None).await, None);
    // Untouched paths survive.
    assert_eq!(cache.get("ctx:session.owner", None).await, Some(json!("alice")));
}

#[tokio::test]
async fn durable_tier_survives_reopen() {
    let cache_dir = TempDir::new().unwrap();
    {
        let l3 = SledTier::new(cache_dir.path()).unwrap();
        l3.set("k", &json!([1, 2, 3]), None).await.unwrap();
    }
    let l3 = SledTier::new(cache_dir.path()).unwrap();
    assert_eq!(l3.get("k").await.unwrap(), Some(json!([1, 2, 3])));
}

#[tokio::test]
async fn expired_remote_entries_miss() {
    let l2 = Arc::new(MemoryTier::new("l2"));
    let cache = HierarchicalCache::new(8).with_l2(l2.clone(), Some(Duration::from_millis(0)));

    // Default L2 TTL applies when the write carries none.
    cache.set("k", json!(1), None, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(l2.get("k").await.unwrap(), None);
}
