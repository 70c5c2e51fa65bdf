//! Structural diff of two schema trees.
//!
//! [`diff`] pairs two JSON values and returns a [`DiffNode`] tree where every
//! node carries a [`ChangeKind`]. Objects are compared per key, arrays as
//! bags, and everything else by deep equality. Renames are inferred per object
//! right after its children are diffed (see [`crate::rename`]).

use std::fmt;

use serde_json::{Map, Value};

use crate::rename::detect_renames;

/// Classification of one diff node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Present on both sides and structurally equal.
    Unchanged,
    /// Present only on the `to` side.
    Created,
    /// Present only on the `from` side.
    Deleted,
    /// Moved from a sibling key with an equal value.
    Renamed,
    /// Present on both sides with different content.
    Modified,
}

impl ChangeKind {
    /// Numeric code used by the `$type` wire form.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Unchanged => 0,
            Self::Created => 1,
            Self::Deleted => -1,
            Self::Renamed => 2,
            Self::Modified => 3,
        }
    }

    /// Returns true for anything but [`ChangeKind::Unchanged`].
    #[must_use]
    pub const fn is_changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unchanged => "UNCHANGED",
            Self::Created => "CREATED",
            Self::Deleted => "DELETED",
            Self::Renamed => "RENAMED",
            Self::Modified => "MODIFIED",
        };
        f.write_str(name)
    }
}

/// Payload of a diff node.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffData {
    /// Leaf value. Holds the `to` value, or the `from` value when deleted.
    Value(Value),
    /// Bag comparison entries.
    Set(Vec<DiffNode>),
    /// Per-key children, `from` keys first then `to`-only keys.
    Object(Vec<(String, DiffNode)>),
}

/// One node of a diff tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffNode {
    /// Change classification.
    pub kind: ChangeKind,
    /// Resulting value or children.
    pub data: DiffData,
    /// Previous key, set only on renamed nodes.
    pub prev: Option<String>,
}

/// Options controlling the differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Merge delete/create sibling pairs with equal values into renames.
    pub detect_renames: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            detect_renames: true,
        }
    }
}

impl DiffOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables rename inference.
    #[must_use]
    pub fn detect_renames(mut self, enabled: bool) -> Self {
        self.detect_renames = enabled;
        self
    }
}

impl DiffNode {
    fn leaf(kind: ChangeKind, value: Value) -> Self {
        Self {
            kind,
            data: DiffData::Value(value),
            prev: None,
        }
    }

    /// Builds a subtree where every node has the same classification. Used
    /// for values present on one side only.
    #[must_use]
    pub fn uniform(kind: ChangeKind, value: &Value) -> Self {
        let data = match value {
            Value::Object(map) => DiffData::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::uniform(kind, v)))
                    .collect(),
            ),
            Value::Array(items) => {
                DiffData::Set(items.iter().map(|v| Self::uniform(kind, v)).collect())
            }
            other => DiffData::Value(other.clone()),
        };
        Self {
            kind,
            data,
            prev: None,
        }
    }

    /// Returns true if this node is not unchanged.
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        self.kind.is_changed()
    }

    /// Object children, if this is an object node.
    #[must_use]
    pub fn children(&self) -> Option<&[(String, DiffNode)]> {
        match &self.data {
            DiffData::Object(children) => Some(children),
            _ => None,
        }
    }

    /// Looks up a descendant by path. Set entries are addressed by index.
    #[must_use]
    pub fn get(&self, path: &[&str]) -> Option<&Self> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        let child = match &self.data {
            DiffData::Object(children) => children.iter().find(|(k, _)| k == head).map(|(_, n)| n),
            DiffData::Set(entries) => head.parse::<usize>().ok().and_then(|i| entries.get(i)),
            DiffData::Value(_) => None,
        }?;
        child.get(rest)
    }

    /// Visits every node depth-first in pre-order with its path.
    pub fn walk<F: FnMut(&[String], &Self)>(&self, mut visit: F) {
        let mut path = Vec::new();
        self.walk_inner(&mut path, &mut visit);
    }

    fn walk_inner<F: FnMut(&[String], &Self)>(&self, path: &mut Vec<String>, visit: &mut F) {
        visit(path, self);
        match &self.data {
            DiffData::Object(children) => {
                for (key, child) in children {
                    path.push(key.clone());
                    child.walk_inner(path, visit);
                    path.pop();
                }
            }
            DiffData::Set(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    path.push(i.to_string());
                    entry.walk_inner(path, visit);
                    path.pop();
                }
            }
            DiffData::Value(_) => {}
        }
    }

    /// Renders the `{ "$type", "$data", "$prev" }` wire form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let data = match &self.data {
            DiffData::Value(value) => value.clone(),
            DiffData::Set(entries) => Value::Array(entries.iter().map(Self::to_json).collect()),
            DiffData::Object(children) => Value::Object(
                children
                    .iter()
                    .map(|(k, n)| (k.clone(), n.to_json()))
                    .collect(),
            ),
        };
        let mut out = Map::new();
        out.insert("$type".to_string(), Value::from(self.kind.code()));
        out.insert("$data".to_string(), data);
        if let Some(prev) = &self.prev {
            out.insert("$prev".to_string(), Value::String(prev.clone()));
        }
        Value::Object(out)
    }
}

/// Deep structural equality. Object keys are compared as sorted sets so key
/// order never matters.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            if a.len() != b.len() {
                return false;
            }
            let mut a_keys: Vec<&String> = a.keys().collect();
            let mut b_keys: Vec<&String> = b.keys().collect();
            a_keys.sort();
            b_keys.sort();
            a_keys == b_keys && a_keys.iter().all(|k| deep_equal(&a[k.as_str()], &b[k.as_str()]))
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_equal(x, y))
        }
        _ => a == b,
    }
}

/// Returns true if `value` is a plain scalar (not an object or array).
#[must_use]
pub const fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

/// Diffs two values with default options.
#[must_use]
pub fn diff(from: &Value, to: &Value) -> DiffNode {
    diff_with(Some(from), Some(to), &DiffOptions::default())
}

/// Diffs two optional values. A missing side yields a uniform created or
/// deleted subtree.
#[must_use]
pub fn diff_optional(from: Option<&Value>, to: Option<&Value>) -> DiffNode {
    diff_with(from, to, &DiffOptions::default())
}

/// Diffs two optional values with explicit options.
#[must_use]
pub fn diff_with(from: Option<&Value>, to: Option<&Value>, options: &DiffOptions) -> DiffNode {
    match (from, to) {
        (None, None) => DiffNode::leaf(ChangeKind::Unchanged, Value::Null),
        (None, Some(to)) => DiffNode::uniform(ChangeKind::Created, to),
        (Some(from), None) => DiffNode::uniform(ChangeKind::Deleted, from),
        (Some(Value::Object(a)), Some(Value::Object(b))) => diff_objects(a, b, options),
        (Some(a), Some(b)) if a.is_array() || b.is_array() => diff_sets(a, b),
        (Some(a), Some(b)) => {
            let kind = if deep_equal(a, b) {
                ChangeKind::Unchanged
            } else {
                ChangeKind::Modified
            };
            DiffNode::leaf(kind, b.clone())
        }
    }
}

fn aggregate<'a>(mut kinds: impl Iterator<Item = &'a DiffNode>) -> ChangeKind {
    if kinds.any(DiffNode::is_changed) {
        ChangeKind::Modified
    } else {
        ChangeKind::Unchanged
    }
}

fn diff_objects(from: &Map<String, Value>, to: &Map<String, Value>, options: &DiffOptions) -> DiffNode {
    let mut children: Vec<(String, DiffNode)> = Vec::with_capacity(from.len().max(to.len()));
    for (key, value) in from {
        children.push((key.clone(), diff_with(Some(value), to.get(key), options)));
    }
    for (key, value) in to {
        if !from.contains_key(key) {
            children.push((key.clone(), diff_with(None, Some(value), options)));
        }
    }

    if options.detect_renames {
        detect_renames(&mut children, from, to);
    }

    DiffNode {
        kind: aggregate(children.iter().map(|(_, n)| n)),
        data: DiffData::Object(children),
        prev: None,
    }
}

fn as_bag(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn diff_sets(from: &Value, to: &Value) -> DiffNode {
    let from = as_bag(from);
    let to = as_bag(to);
    let contains = |bag: &[&Value], value: &Value| bag.iter().any(|v| deep_equal(v, value));

    let mut entries: Vec<DiffNode> = Vec::new();
    let mut push = |kind: ChangeKind, value: &Value| {
        let duplicate = entries.iter().any(|e| {
            e.kind == kind && matches!(&e.data, DiffData::Value(v) if deep_equal(v, value))
        });
        if !duplicate {
            entries.push(DiffNode::leaf(kind, value.clone()));
        }
    };

    for value in &from {
        if !contains(&to, value) {
            push(ChangeKind::Deleted, value);
        }
    }
    for value in &to {
        let kind = if contains(&from, value) {
            ChangeKind::Unchanged
        } else {
            ChangeKind::Created
        };
        push(kind, value);
    }

    DiffNode {
        kind: aggregate(entries.iter()),
        data: DiffData::Set(entries),
        prev: None,
    }
}
