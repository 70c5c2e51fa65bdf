//! JSON-Schema normalization and node classification.
//!
//! [`normalize`] strips every keyword that does not describe structure,
//! resolves local `#/definitions/...` references and `allOf` composition, and
//! turns inline entity nodes into reference markers. [`classify`] tags a
//! normalized node with its [`NodeKind`] so consumers never re-inspect raw
//! keys.

use std::collections::HashSet;

use regex::Regex;
use serde_json::{Map, Value};

use crate::column::{scalar_type, ColumnType};
use crate::error::{Result, SchemaError};
use crate::registry::AssociationKind;

/// Structural keywords kept by normalization.
pub const STRUCTURAL_KEYWORDS: &[&str] = &[
    "id",
    "$ref",
    "type",
    "format",
    "title",
    "default",
    "enum",
    "items",
    "properties",
    "required",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
    "options",
];

/// Column-level keywords kept by normalization.
pub const COLUMN_KEYWORDS: &[&str] = &[
    "primaryKey",
    "autoIncrement",
    "unique",
    "allowNull",
    "references",
    "onDelete",
    "onUpdate",
    "comment",
];

/// Association-setting keywords carried by reference markers.
pub const ASSOCIATION_KEYWORDS: &[&str] = &[
    "hasOne",
    "hasMany",
    "belongsTo",
    "belongsToMany",
    "sourceKey",
    "targetKey",
    "foreignKey",
    "otherKey",
    "constraints",
    "scope",
    "through",
    "as",
];

const DEFINITIONS_PREFIX: &str = "#/definitions/";

fn is_kept(keyword: &str) -> bool {
    STRUCTURAL_KEYWORDS.contains(&keyword)
        || COLUMN_KEYWORDS.contains(&keyword)
        || ASSOCIATION_KEYWORDS.contains(&keyword)
}

/// An association reference found on a property node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Referenced entity name.
    pub target: String,
    /// True when the reference sits under `items` (plural association).
    pub many: bool,
}

impl Reference {
    /// Association kind for `node`: an explicit association keyword wins,
    /// otherwise the shape decides.
    #[must_use]
    pub fn kind(&self, node: &Map<String, Value>) -> AssociationKind {
        if let Some(kind) = AssociationKind::explicit(node) {
            return kind;
        }
        let through = node.contains_key("through")
            || node
                .get("items")
                .and_then(Value::as_object)
                .is_some_and(|items| items.contains_key("through"));
        match (self.many, through) {
            (true, true) => AssociationKind::BelongsToMany,
            (true, false) => AssociationKind::HasMany,
            (false, _) => AssociationKind::BelongsTo,
        }
    }

    /// Human-readable `<kind> <Target>` description.
    #[must_use]
    pub fn describe(&self, node: &Map<String, Value>) -> String {
        format!("{} {}", self.kind(node), self.target)
    }
}

/// Shape of a normalized schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Scalar column.
    Scalar(ColumnType),
    /// Enumerated literal values.
    Enum(Vec<Value>),
    /// Association to another entity.
    Reference(Reference),
    /// Composite node with `properties`.
    Object,
    /// Unknown type combination.
    Unresolved,
}

fn entity_ref(node: &Map<String, Value>) -> Option<&str> {
    node.get("$ref")
        .and_then(Value::as_str)
        .filter(|target| !target.starts_with('#'))
}

/// Classifies a normalized node.
#[must_use]
pub fn classify(node: &Value) -> NodeKind {
    let Value::Object(map) = node else {
        return NodeKind::Unresolved;
    };
    if let Some(target) = entity_ref(map) {
        return NodeKind::Reference(Reference {
            target: target.to_string(),
            many: false,
        });
    }
    if let Some(target) = map.get("items").and_then(Value::as_object).and_then(entity_ref) {
        return NodeKind::Reference(Reference {
            target: target.to_string(),
            many: true,
        });
    }
    if let Some(Value::Array(values)) = map.get("enum") {
        return NodeKind::Enum(values.clone());
    }
    if map.contains_key("properties")
        && matches!(map.get("type").and_then(Value::as_str), None | Some("object"))
    {
        return NodeKind::Object;
    }
    scalar_type(map).map_or(NodeKind::Unresolved, NodeKind::Scalar)
}

/// Returns the reference of an association property, if any.
#[must_use]
pub fn reference_of(node: &Value) -> Option<Reference> {
    match classify(node) {
        NodeKind::Reference(reference) => Some(reference),
        _ => None,
    }
}

struct Normalizer<'a> {
    definitions: Option<&'a Map<String, Value>>,
    resolving: HashSet<String>,
}

impl Normalizer<'_> {
    fn node(&mut self, node: &Value, at_root: bool) -> Result<Value> {
        match node {
            Value::Object(map) => self.object(map, at_root).map(Value::Object),
            Value::Array(items) => items
                .iter()
                .map(|item| self.node(item, false))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn object(&mut self, map: &Map<String, Value>, at_root: bool) -> Result<Map<String, Value>> {
        if let Some(name) = map
            .get("$ref")
            .and_then(Value::as_str)
            .and_then(|r| r.strip_prefix(DEFINITIONS_PREFIX))
        {
            let mut resolved = self.definition(name)?;
            let mut rest = map.clone();
            rest.remove("$ref");
            merge(&mut resolved, self.object(&rest, at_root)?);
            return Ok(resolved);
        }

        if !at_root {
            if let Some(id) = map.get("id").and_then(Value::as_str) {
                let mut marker = Map::new();
                marker.insert("$ref".to_string(), Value::String(id.to_string()));
                for keyword in ASSOCIATION_KEYWORDS {
                    if let Some(value) = map.get(*keyword) {
                        marker.insert((*keyword).to_string(), value.clone());
                    }
                }
                return Ok(marker);
            }
        }

        let mut out = Map::new();
        for (key, value) in map {
            if !is_kept(key) {
                continue;
            }
            let normalized = match key.as_str() {
                "properties" => Value::Object(self.properties(value)?),
                "items" => self.node(value, false)?,
                _ => value.clone(),
            };
            out.insert(key.clone(), normalized);
        }

        if let Some(Value::Array(members)) = map.get("allOf") {
            for member in members {
                let member = self.node(member, at_root)?;
                if let Value::Object(member) = member {
                    merge(&mut out, member);
                }
            }
        }
        Ok(out)
    }

    fn properties(&mut self, value: &Value) -> Result<Map<String, Value>> {
        let Value::Object(properties) = value else {
            return Ok(Map::new());
        };
        let mut out = Map::new();
        for (name, property) in properties {
            let normalized = self.node(property, false)?;
            if let Some(pattern) = normalized.get("pattern").and_then(Value::as_str) {
                Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
                    property: name.clone(),
                    source,
                })?;
            }
            out.insert(name.clone(), normalized);
        }
        Ok(out)
    }

    fn definition(&mut self, name: &str) -> Result<Map<String, Value>> {
        let definition = self
            .definitions
            .and_then(|defs| defs.get(name))
            .ok_or_else(|| SchemaError::UnresolvedDefinition(name.to_string()))?;
        if !self.resolving.insert(name.to_string()) {
            return Err(SchemaError::CircularDefinition(name.to_string()));
        }
        let resolved = match self.node(definition, false)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.resolving.remove(name);
        Ok(resolved)
    }
}

/// Merges `other` into `base`: `properties` key-wise, `required` as a
/// duplicate-free union, everything else last-writer-wins.
fn merge(base: &mut Map<String, Value>, other: Map<String, Value>) {
    for (key, value) in other {
        match (key.as_str(), base.get_mut(&key), value) {
            ("properties", Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (name, property) in incoming {
                    existing.insert(name, property);
                }
            }
            ("required", Some(Value::Array(existing)), Value::Array(incoming)) => {
                for name in incoming {
                    if !existing.contains(&name) {
                        existing.push(name);
                    }
                }
            }
            (_, _, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Normalizes a root-level schema document.
pub fn normalize(schema: &Value) -> Result<Value> {
    let definitions = schema.get("definitions").and_then(Value::as_object);
    let mut normalizer = Normalizer {
        definitions,
        resolving: HashSet::new(),
    };
    normalizer.node(schema, true)
}
