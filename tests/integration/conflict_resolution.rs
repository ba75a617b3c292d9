//! Strategy behavior exercised through whole sync cycles

use super::test_utils::memory_engine;
use coalesce::engine::CycleOutcome;
use coalesce::resolve::ConflictStrategy;
use serde_json::json;

#[tokio::test]
async fn source_priority_prefers_provider_a() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::SourcePriority,
        json!({"status": "open"}),
        json!({}),
    );
    engine.run_cycle().await.unwrap();

    provider_a.edit(|doc| doc["status"] = json!("in_progress"));
    provider_b.edit(|doc| doc["status"] = json!("closed"));

    let outcome = engine.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Synced { conflict_count, .. } => assert_eq!(conflict_count, 1),
        other => panic!("expected a synced cycle, got {:?}", other),
    }
    assert_eq!(provider_a.document()["status"], json!("in_progress"));
    assert_eq!(provider_b.document()["status"], json!("in_progress"));
}

/// The provider reporting the later modification time wins a
/// last-write-wins conflict, whichever side it is.
#[tokio::test]
async fn last_write_wins_prefers_later_edit() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::LastWriteWins,
        json!({"status": "open"}),
        json!({}),
    );
    engine.run_cycle().await.unwrap();

    let now = chrono::Utc::now();
    provider_a.edit(|doc| doc["status"] = json!("a_wrote"));
    provider_a.set_modified_at(now);
    provider_b.edit(|doc| doc["status"] = json!("b_wrote"));
    provider_b.set_modified_at(now - chrono::Duration::seconds(30));
    engine.run_cycle().await.unwrap();
    assert_eq!(provider_b.document()["status"], json!("a_wrote"));

    provider_a.edit(|doc| doc["status"] = json!("a_again"));
    provider_a.set_modified_at(now + chrono::Duration::seconds(10));
    provider_b.edit(|doc| doc["status"] = json!("b_again"));
    provider_b.set_modified_at(now + chrono::Duration::seconds(40));
    engine.run_cycle().await.unwrap();

    assert_eq!(provider_a.document()["status"], json!("b_again"));
    assert_eq!(provider_b.document()["status"], json!("b_again"));
}

/// Identical modification times fall back to provider A deterministically.
#[tokio::test]
async fn last_write_wins_tie_breaks_to_provider_a() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::LastWriteWins,
        json!({"status": "open"}),
        json!({}),
    );
    engine.run_cycle().await.unwrap();

    let now = chrono::Utc::now();
    provider_a.edit(|doc| doc["status"] = json!("a_wrote"));
    provider_a.set_modified_at(now);
    provider_b.edit(|doc| doc["status"] = json!("b_wrote"));
    provider_b.set_modified_at(now);
    engine.run_cycle().await.unwrap();

    assert_eq!(provider_a.document()["status"], json!("a_wrote"));
    assert_eq!(provider_b.document()["status"], json!("a_wrote"));
}

#[tokio::test]
async fn structural_merge_combines_nested_sections() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::StructuralMerge,
        json!({"meta": 0}),
        json!({}),
    );
    engine.run_cycle().await.unwrap();

    provider_a.edit(|doc| doc["meta"] = json!({"owner": "alice", "labels": {"team": "core"}}));
    provider_b.edit(|doc| doc["meta"] = json!({"priority": "high", "labels": {"area": "sync"}}));
    engine.run_cycle().await.unwrap();

    let expected = json!({"meta": {
        "owner": "alice",
        "priority": "high",
        "labels": {"team": "core", "area": "sync"}
    }});
    assert_eq!(provider_a.document(), expected);
    assert_eq!(provider_b.document(), expected);
}

/// Identical edits on both sides are not conflicts and cost one version.
#[tokio::test]
async fn identical_edits_produce_no_conflicts() {
    let (engine, provider_a, provider_b) = memory_engine(
        ConflictStrategy::SourcePriority,
        json!({"status": "open"}),
        json!({}),
    );
    engine.run_cycle().await.unwrap();

    provider_a.edit(|doc| doc["status"] = json!("closed"));
    provider_b.edit(|doc| doc["status"] = json!("closed"));

    let outcome = engine.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Synced {
            version_number,
            conflict_count,
            ..
        } => {
            assert_eq!(version_number, 2);
            assert_eq!(conflict_count, 0);
        }
        other => panic!("expected a synced cycle, got {:?}", other),
    }
}
