//! A depth-bounded view over arbitrary upstream JSON payloads.
//!
//! Upstream payloads are free-form and may nest structures that are expensive
//! or, in pathological cases, cyclic-looking (deeply repeated keys) to walk
//! naively. [`walk`] and [`Node`] give callers a depth-capped, allocation-light
//! way to search a tree for candidate strings without writing recursive
//! `serde_json::Value` matches at every call site.

use serde_json::Value as Json;

/// Maximum recursion depth when walking an upstream payload.
pub const MAX_WALK_DEPTH: usize = 12;

/// A borrowed view of a JSON node together with its key path, used while
/// walking a payload tree.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    /// Key this node was found under, if any (root has none).
    pub key: Option<&'a str>,
    /// The JSON value itself.
    pub value: &'a Json,
    /// Depth from the root (root is 0).
    pub depth: usize,
}

/// Walks `root` depth-first, invoking `visit` on every node up to
/// [`MAX_WALK_DEPTH`]. Returning `false` from `visit` stops the walk early.
pub fn walk<'a, F>(root: &'a Json, mut visit: F)
where
    F: FnMut(Node<'a>) -> bool,
{
    walk_inner(Node { key: None, value: root, depth: 0 }, &mut visit);
}

fn walk_inner<'a, F>(node: Node<'a>, visit: &mut F) -> bool
where
    F: FnMut(Node<'a>) -> bool,
{
    if !visit(node) {
        return false;
    }
    if node.depth >= MAX_WALK_DEPTH {
        return true;
    }
    match node.value {
        Json::Object(map) => {
            for (k, v) in map {
                let child = Node { key: Some(k.as_str()), value: v, depth: node.depth + 1 };
                if !walk_inner(child, visit) {
                    return false;
                }
            }
        }
        Json::Array(items) => {
            for v in items {
                let child = Node { key: node.key, value: v, depth: node.depth + 1 };
                if !walk_inner(child, visit) {
                    return false;
                }
            }
        }
        _ => {}
    }
    true
}

/// Returns `true` if any string anywhere in `value` case-insensitively equals
/// `needle`, or any object key equal to `needle` maps to a JSON `true`.
pub fn contains_truthy_flag(value: &Json, needle: &str) -> bool {
    let mut found = false;
    walk(value, |node| {
        if let Some(key) = node.key {
            if key.eq_ignore_ascii_case(needle) && node.value.as_bool() == Some(true) {
                found = true;
                return false;
            }
        }
        if let Json::String(s) = node.value {
            if s.eq_ignore_ascii_case(needle) {
                found = true;
                return false;
            }
        }
        true
    });
    found
}

/// Returns the first string value found under any of `keys` (checked
/// case-sensitively in the order given), searching breadth-first-ish via the
/// depth-bounded walk.
pub fn first_string_under<'a>(value: &'a Json, keys: &[&str]) -> Option<&'a str> {
    let mut found = None;
    walk(value, |node| {
        if let (Some(key), Json::String(s)) = (node.key, node.value) {
            if keys.contains(&key) {
                found = Some(s.as_str());
                return false;
            }
        }
        true
    });
    found
}
