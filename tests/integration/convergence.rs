//! Convergence properties of repeated sync cycles

use super::test_utils::memory_engine;
use coalesce::engine::CycleOutcome;
use coalesce::resolve::ConflictStrategy;
use serde_json::json;

/// After any successful cycle both providers hold the same document, and an
/// immediately following cycle with no further edits is a no-op.
#[tokio::test]
async fn cycle_converges_and_stabilizes() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::SourcePriority,
        json!({"status": "open", "owner": "alice"}),
        json!({"status": "closed", "priority": "high"}),
    );

    engine.run_cycle().await.unwrap();
    assert_eq!(provider_a.document(), provider_b.document());

    let outcome = engine.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::NoOp));
    assert_eq!(provider_a.document(), provider_b.document());
}

/// Interleaved edits on both sides keep converging cycle after cycle.
#[tokio::test]
async fn interleaved_edits_converge_every_cycle() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::SourcePriority,
        json!({"counter": 0}),
        json!({}),
    );
    engine.run_cycle().await.unwrap();

    for round in 1..=5u64 {
        provider_a.edit(|doc| doc["counter"] = json!(round));
        provider_b.edit(|doc| doc[format!("note_{}", round)] = json!("added"));

        engine.run_cycle().await.unwrap();
        assert_eq!(provider_a.document(), provider_b.document());
        assert_eq!(provider_a.document()["counter"], json!(round));
        assert_eq!(provider_a.document()[format!("note_{}", round)], json!("added"));
    }
}

/// Truncating a list on one side propagates exactly, without resurrecting
/// removed elements, and the next cycle sees nothing left to do.
#[tokio::test]
async fn list_truncation_propagates_exactly() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::SourcePriority,
        json!({"items": [1, 2, 3]}),
        json!({}),
    );
    engine.run_cycle().await.unwrap();
    assert_eq!(provider_b.document(), json!({"items": [1, 2, 3]}));

    provider_a.edit(|doc| doc["items"] = json!([3]));
    engine.run_cycle().await.unwrap();

    assert_eq!(provider_a.document(), json!({"items": [3]}));
    assert_eq!(provider_b.document(), json!({"items": [3]}));

    let outcome = engine.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::NoOp));
}

/// A deletion on one side propagates to the other.
#[tokio::test]
async fn deletions_propagate() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::SourcePriority,
        json!({"keep": 1, "drop": 2}),
        json!({}),
    );
    engine.run_cycle().await.unwrap();
    assert_eq!(provider_b.document(), json!({"keep": 1, "drop": 2}));

    provider_a.edit(|doc| {
        doc.as_object_mut().unwrap().remove("drop");
    });
    engine.run_cycle().await.unwrap();

    assert_eq!(provider_a.document(), json!({"keep": 1}));
    assert_eq!(provider_b.document(), json!({"keep": 1}));
}

/// A provider that missed a propagation is caught up without its stale
/// document being misread as a batch of deletions.
#[tokio::test]
async fn missed_propagation_is_reconciled() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::SourcePriority,
        json!({"a": 1, "b": 2}),
        json!({}),
    );

    provider_b.set_reject_writes(true);
    let outcome = engine.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Synced { degraded: true, .. }));
    assert_eq!(provider_b.document(), json!({}));

    provider_b.set_reject_writes(false);
    engine.run_cycle().await.unwrap();
    assert_eq!(provider_b.document(), json!({"a": 1, "b": 2}));
    assert_eq!(provider_a.document(), provider_b.document());
}
