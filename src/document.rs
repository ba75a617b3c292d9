//! Context documents and path addressing.
//!
//! A context document is an arbitrary tree of string-keyed mappings, lists,
//! and scalar leaves, represented as `serde_json::Value`. Paths address
//! individual locations with dot/bracket syntax (`a.b[2].c`). Checksums are
//! computed over a canonical serialization with object keys sorted, so two
//! documents that differ only in key order hash identically.

use crate::error::SyncError;
use crate::types::Checksum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Arbitrary nested context document.
pub type ContextDocument = Value;

/// One step in a context path: a mapping key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parsed dot/bracket path into a context document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextPath(pub Vec<PathSegment>);

impl ContextPath {
    pub fn root() -> Self {
        ContextPath(Vec::new())
    }

    /// Parse a dot/bracket path such as `a.b[2].c`.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        if raw.is_empty() {
            return Err(SyncError::ContextFormat("empty path".to_string()));
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            let mut rest = part;
            // Leading name portion, then zero or more [n] index suffixes.
            let name_end = rest.find('[').unwrap_or(rest.len());
            let name = &rest[..name_end];
            if name.is_empty() && name_end == rest.len() {
                return Err(SyncError::ContextFormat(format!(
                    "empty segment in path '{}'",
                    raw
                )));
            }
            if !name.is_empty() {
                segments.push(PathSegment::Key(name.to_string()));
            }
            rest = &rest[name_end..];
            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    return Err(SyncError::ContextFormat(format!(
                        "malformed index in path '{}'",
                        raw
                    )));
                }
                let close = rest.find(']').ok_or_else(|| {
                    SyncError::ContextFormat(format!("unclosed index in path '{}'", raw))
                })?;
                let index: usize = rest[1..close].parse().map_err(|_| {
                    SyncError::ContextFormat(format!("non-numeric index in path '{}'", raw))
                })?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
            }
        }
        Ok(ContextPath(segments))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent path, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<ContextPath> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(ContextPath(self.0[..self.0.len() - 1].to_vec()))
    }

    /// True when `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &ContextPath) -> bool {
        self.0.len() < other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    fn child(&self, segment: PathSegment) -> ContextPath {
        let mut segments = self.0.clone();
        segments.push(segment);
        ContextPath(segments)
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            match segment {
                PathSegment::Key(key) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", key)?;
                }
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
            first = false;
        }
        Ok(())
    }
}

/// Read the value at `path`, if present.
pub fn get<'a>(doc: &'a ContextDocument, path: &ContextPath) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match segment {
            PathSegment::Key(key) => current.as_object()?.get(key)?,
            PathSegment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating intermediate mappings and extending
/// lists (with nulls) as needed. A scalar in the way of a compound segment
/// is replaced by the container the path requires.
pub fn set(doc: &mut ContextDocument, path: &ContextPath, value: Value) -> Result<(), SyncError> {
    if path.is_empty() {
        return Err(SyncError::ContextFormat(
            "cannot set the document root through a path".to_string(),
        ));
    }
    let mut current = doc;
    for (position, segment) in path.segments().iter().enumerate() {
        let last = position == path.segments().len() - 1;
        match segment {
            PathSegment::Key(key) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                let map = current
                    .as_object_mut()
                    .ok_or_else(|| SyncError::ContextFormat("expected mapping".to_string()))?;
                if last {
                    map.insert(key.clone(), value);
                    return Ok(());
                }
                current = map.entry(key.clone()).or_insert(Value::Null);
            }
            PathSegment::Index(index) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                let list = current
                    .as_array_mut()
                    .ok_or_else(|| SyncError::ContextFormat("expected list".to_string()))?;
                while list.len() <= *index {
                    list.push(Value::Null);
                }
                if last {
                    list[*index] = value;
                    return Ok(());
                }
                current = &mut list[*index];
            }
        }
    }
    Ok(())
}

/// Remove the value at `path` together with all of its descendants.
/// Removing a missing path is a no-op; returns whether anything was removed.
pub fn remove(doc: &mut ContextDocument, path: &ContextPath) -> bool {
    let Some((last, prefix)) = path.segments().split_last() else {
        return false;
    };
    let mut current = doc;
    for segment in prefix {
        let next = match segment {
            PathSegment::Key(key) => current.as_object_mut().and_then(|m| m.get_mut(key)),
            PathSegment::Index(index) => current.as_array_mut().and_then(|l| l.get_mut(*index)),
        };
        match next {
            Some(value) => current = value,
            None => return false,
        }
    }
    match last {
        PathSegment::Key(key) => current
            .as_object_mut()
            .map(|map| map.remove(key).is_some())
            .unwrap_or(false),
        PathSegment::Index(index) => match current.as_array_mut() {
            Some(list) if *index < list.len() => {
                list.remove(*index);
                true
            }
            _ => false,
        },
    }
}

/// Enumerate every leaf path in the document, sorted for determinism.
///
/// Scalars are leaves; an empty mapping or list is treated as a leaf so that
/// its presence is still visible to change detection.
pub fn leaf_paths(doc: &ContextDocument) -> Vec<ContextPath> {
    let mut paths = Vec::new();
    collect_leaves(doc, &ContextPath::root(), &mut paths);
    paths.sort();
    paths
}

fn collect_leaves(value: &Value, prefix: &ContextPath, out: &mut Vec<ContextPath>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                collect_leaves(child, &prefix.child(PathSegment::Key(key.clone())), out);
            }
        }
        Value::Array(list) if !list.is_empty() => {
            for (index, child) in list.iter().enumerate() {
                collect_leaves(child, &prefix.child(PathSegment::Index(index)), out);
            }
        }
        _ => {
            if !prefix.is_empty() {
                out.push(prefix.clone());
            }
        }
    }
}

/// Canonical serialization of a document: object keys sorted, list order
/// preserved, standard JSON escaping. Two documents equal up to mapping key
/// order produce identical canonical bytes.
pub fn canonical_bytes(doc: &ContextDocument) -> Vec<u8> {
    let mut buffer = String::new();
    write_canonical(doc, &mut buffer);
    buffer.into_bytes()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => out.push_str(&value.to_string()),
        Value::String(text) => {
            // serde_json string rendering handles escaping deterministically.
            out.push_str(&Value::String(text.clone()).to_string());
        }
        Value::Array(list) => {
            out.push('[');
            for (index, child) in list.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(child, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

/// Compute the BLAKE3 checksum of a document's canonical form.
///
/// checksum = hash("context-document" || content_len || content)
pub fn checksum(doc: &ContextDocument) -> Checksum {
    let canonical = canonical_bytes(doc);
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"context-document");
    hasher.update(&(canonical.len() as u64).to_be_bytes());
    hasher.update(&canonical);
    Checksum(*hasher.finalize().as_bytes())
}
