//! Assembling flat path-addressed documents into a JSON tree.
//!
//! Backends store each written value under its full path. A read of a path
//! that has no document of its own returns the documents below it nested
//! by segment, so `requests/ROOM` yields `{ "<id>": envelope, ... }`.

use serde_json::{Map, Value};

/// Segments of `path` below `prefix`, or `None` if `path` is not a strict descendant.
pub fn relative_segments<'a>(prefix: &str, path: &'a str) -> Option<Vec<&'a str>> {
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    Some(rest.split('/').collect())
}

/// Strict ancestors of `path`, shortest first.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

/// Read `path` out of a set of documents.
pub fn assemble<'a, I>(path: &str, docs: I) -> Option<Value>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut root = Map::new();
    let mut found = false;

    for (doc_path, value) in docs {
        if doc_path == path {
            return Some(value.clone());
        }
        if let Some(segments) = relative_segments(path, doc_path) {
            insert_nested(&mut root, &segments, value.clone());
            found = true;
        }
    }

    found.then_some(Value::Object(root))
}

fn insert_nested(node: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            node.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let child = node
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                insert_nested(map, rest, value);
            }
        }
    }
}
