//! Property-based tests for checksum, version id, and resolver determinism

use coalesce::diff::{detect, ChangeSet};
use coalesce::document::{self, ContextPath};
use coalesce::resolve::{resolve, SourcePriority};
use coalesce::types::ContextSource;
use coalesce::version::ContextVersion;
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashMap;

fn to_document(fields: &HashMap<String, i64>) -> Value {
    let mut map = Map::new();
    for (key, value) in fields {
        map.insert(key.clone(), Value::from(*value));
    }
    Value::Object(map)
}

/// Reversed-insertion-order copy of the same logical document.
fn to_document_reversed(fields: &HashMap<String, i64>) -> Value {
    let mut keys: Vec<&String> = fields.keys().collect();
    keys.sort();
    keys.reverse();
    let mut map = Map::new();
    for key in keys {
        map.insert(key.clone(), Value::from(fields[key]));
    }
    Value::Object(map)
}

/// Checksums depend on content, not on mapping key insertion order.
#[test]
fn test_checksum_ignores_key_order_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<HashMap<String, i64>>(), |fields| {
            let forward = to_document(&fields);
            let reversed = to_document_reversed(&fields);
            assert_eq!(document::checksum(&forward), document::checksum(&reversed));
            assert_eq!(
                document::canonical_bytes(&forward),
                document::canonical_bytes(&reversed)
            );
            Ok(())
        })
        .unwrap();
}

/// Distinct documents get distinct checksums (modulo hash collisions).
#[test]
fn test_checksum_distinguishes_content_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(any::<HashMap<String, i64>>(), any::<HashMap<String, i64>>()),
            |(fields_a, fields_b)| {
                let doc_a = to_document(&fields_a);
                let doc_b = to_document(&fields_b);
                if doc_a == doc_b {
                    assert_eq!(document::checksum(&doc_a), document::checksum(&doc_b));
                } else {
                    prop_assume!(document::checksum(&doc_a) != document::checksum(&doc_b));
                }
                Ok(())
            },
        )
        .unwrap();
}

/// Version ids are a pure function of lineage position and content.
#[test]
fn test_version_id_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<HashMap<String, i64>>(), |fields| {
            let content = to_document(&fields);
            let first = ContextVersion::initial(content.clone(), ContextSource::Unified);
            let second = ContextVersion::initial(content, ContextSource::Unified);
            assert_eq!(first.id, second.id);
            assert_eq!(first.checksum, second.checksum);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_child_id_differs_from_parent() {
    let parent = ContextVersion::initial(
        serde_json::json!({"a": 1}),
        ContextSource::Unified,
    );
    let child = ContextVersion::child_of(&parent, serde_json::json!({"a": 2}), ContextSource::Unified);
    assert_ne!(parent.id, child.id);
    assert_eq!(child.parent_id, Some(parent.id));
}

/// Resolving the same divergence twice yields byte-identical documents and
/// the same conflict decisions.
#[test]
fn test_resolution_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                any::<HashMap<String, i64>>(),
                any::<HashMap<String, i64>>(),
                any::<HashMap<String, i64>>(),
            ),
            |(base_fields, fields_a, fields_b)| {
                let base_doc = to_document(&base_fields);
                let base = ContextVersion::initial(base_doc.clone(), ContextSource::Unified);
                let set_a = ChangeSet::new(
                    ContextSource::ProviderA,
                    detect(Some(&base_doc), &to_document(&fields_a)).unwrap(),
                );
                let set_b = ChangeSet::new(
                    ContextSource::ProviderB,
                    detect(Some(&base_doc), &to_document(&fields_b)).unwrap(),
                );

                let first = resolve(Some(&base), &set_a, &set_b, &SourcePriority).unwrap();
                let second = resolve(Some(&base), &set_a, &set_b, &SourcePriority).unwrap();

                assert_eq!(
                    document::canonical_bytes(&first.document),
                    document::canonical_bytes(&second.document)
                );
                let paths =
                    |r: &coalesce::resolve::Resolution| -> Vec<String> {
                        r.conflicts.iter().map(|c| c.path.clone()).collect()
                    };
                assert_eq!(paths(&first), paths(&second));
                Ok(())
            },
        )
        .unwrap();
}

/// Paths survive a parse/format round trip.
#[test]
fn test_path_round_trip_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    let segment = "[a-z][a-z0-9_]{0,8}";
    let strategy = (
        proptest::collection::vec(segment, 1..4),
        proptest::collection::vec(0usize..20, 0..3),
    );
    runner
        .run(&strategy, |(keys, indexes)| {
            let mut rendered = keys.join(".");
            for index in indexes {
                rendered.push_str(&format!("[{}]", index));
            }
            let parsed = ContextPath::parse(&rendered).unwrap();
            assert_eq!(parsed.to_string(), rendered);
            Ok(())
        })
        .unwrap();
}
