//! Path access on JSON documents.
//!
//! Uses the same path grammar as the compiler's tree builder, so a path that
//! addresses a field in emitted text addresses the same field here.
//!
//! Writing past the end of a list pads it with holes rather than nulls. A
//! list literal in emitted text only has the elements that were written, so
//! holes are dropped by [`compact`] once all ops have been applied.

use cuekit_compiler::path::{join_path, parse_path, Segment};
use serde_json::{Map, Value as JsonValue};

/// Look up `path` in `doc`.
pub fn get<'a>(doc: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    get_segments(doc, &parse_path(path))
}

pub fn get_segments<'a>(doc: &'a JsonValue, segments: &[Segment]) -> Option<&'a JsonValue> {
    segments
        .iter()
        .try_fold(doc, |current, seg| match (seg, current) {
            (Segment::Field(name) | Segment::Key(name), JsonValue::Object(map)) => map.get(name),
            (Segment::Index(i), JsonValue::Array(items)) => items.get(*i),
            _ => None,
        })
        .filter(|found| !is_hole(found))
}

const HOLE_KEY: &str = "\u{0}hole";

fn hole() -> JsonValue {
    let mut marker = Map::new();
    marker.insert(HOLE_KEY.to_string(), JsonValue::Bool(true));
    JsonValue::Object(marker)
}

/// Whether `value` is list padding that nothing has written to.
pub fn is_hole(value: &JsonValue) -> bool {
    matches!(value, JsonValue::Object(map) if map.len() == 1 && map.contains_key(HOLE_KEY))
}

/// Drop list padding everywhere in `doc`.
pub fn compact(doc: &mut JsonValue) {
    match doc {
        JsonValue::Object(map) => map.values_mut().for_each(compact),
        JsonValue::Array(items) => {
            items.retain(|item| !is_hole(item));
            items.iter_mut().for_each(compact);
        }
        _ => {}
    }
}

/// Assign `value` at `path`, creating intermediate structs and lists.
///
/// A non-container in the way is replaced, and so is whatever was at the
/// target: the last write wins.
pub fn set(doc: &mut JsonValue, path: &str, value: JsonValue) {
    let segments = parse_path(path);
    if segments.is_empty() {
        *doc = value;
        return;
    }
    *slot(doc, &segments) = value;
}

/// The mutable slot at `segments`, created if missing.
fn slot<'a>(doc: &'a mut JsonValue, segments: &[Segment]) -> &'a mut JsonValue {
    let mut current = doc;
    for seg in segments {
        current = match seg {
            Segment::Field(name) | Segment::Key(name) => {
                // Indexing null by key turns it into a struct.
                if !current.is_object() || is_hole(current) {
                    *current = JsonValue::Null;
                }
                &mut current[name.as_str()]
            }
            Segment::Index(i) => {
                match &mut *current {
                    JsonValue::Array(items) if items.len() <= *i => items.resize(*i + 1, hole()),
                    JsonValue::Array(_) => {}
                    other => *other = JsonValue::Array(vec![hole(); *i + 1]),
                }
                &mut current[*i]
            }
        };
    }
    current
}

/// Deep-merge `source` into `target`. Structs merge key by key; anything
/// else replaces the target.
pub fn merge(target: &mut JsonValue, source: &JsonValue) {
    match (target, source) {
        (JsonValue::Object(into), JsonValue::Object(from)) => {
            for (key, value) in from {
                match into.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        into.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Deep-merge `source` into the struct at `path`, creating it if needed.
pub fn merge_at(doc: &mut JsonValue, path: &str, source: &JsonValue) {
    let segments = parse_path(path);
    let target = if segments.is_empty() {
        doc
    } else {
        slot(doc, &segments)
    };
    if target.is_null() || is_hole(target) {
        *target = JsonValue::Object(Map::new());
    }
    merge(target, source);
}

/// Every leaf path in `doc`: scalars, nulls and empty containers.
pub fn leaf_paths(doc: &JsonValue) -> Vec<String> {
    let mut out = Vec::new();
    collect_leaves(doc, &mut Vec::new(), &mut out);
    out
}

fn collect_leaves(value: &JsonValue, path: &mut Vec<Segment>, out: &mut Vec<String>) {
    match value {
        JsonValue::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                path.push(Segment::Field(key.clone()));
                collect_leaves(child, path, out);
                path.pop();
            }
        }
        JsonValue::Array(items) if !items.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                path.push(Segment::Index(i));
                collect_leaves(child, path, out);
                path.pop();
            }
        }
        _ => out.push(join_path(path)),
    }
}
