//! Rename inference.
//!
//! After an object's children are diffed, a created child whose value is not
//! a plain scalar is matched against the deleted siblings of the `from` side.
//! The first sibling (in `from` key order) with an equal value turns the pair
//! into one renamed edge and its deleted entry is dropped.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::trace;

use crate::diff::{deep_equal, diff, is_scalar, ChangeKind, DiffNode};

pub(crate) fn detect_renames(
    children: &mut Vec<(String, DiffNode)>,
    from: &Map<String, Value>,
    to: &Map<String, Value>,
) {
    let deleted: Vec<&String> = children
        .iter()
        .filter(|(_, node)| node.kind == ChangeKind::Deleted)
        .map(|(key, _)| key)
        .filter(|key| from.contains_key(key.as_str()))
        .collect();
    if deleted.is_empty() {
        return;
    }
    let deleted: Vec<String> = deleted.into_iter().cloned().collect();

    let mut consumed: HashSet<String> = HashSet::new();
    for (key, node) in children.iter_mut() {
        if node.kind != ChangeKind::Created {
            continue;
        }
        let Some(value) = to.get(key.as_str()) else {
            continue;
        };
        if is_scalar(value) {
            continue;
        }
        let matched = from
            .iter()
            .filter(|(sibling, _)| deleted.contains(sibling) && !consumed.contains(*sibling))
            .find(|(_, previous)| deep_equal(previous, value))
            .map(|(sibling, previous)| (sibling.clone(), previous));

        if let Some((sibling, previous)) = matched {
            trace!(from = %sibling, to = %key, "Detected rename");
            let mut renamed = diff(previous, value);
            renamed.kind = ChangeKind::Renamed;
            renamed.prev = Some(sibling.clone());
            *node = renamed;
            consumed.insert(sibling);
        }
    }

    if !consumed.is_empty() {
        children.retain(|(key, node)| !(node.kind == ChangeKind::Deleted && consumed.contains(key)));
    }
}
