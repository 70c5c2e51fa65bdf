//! Read options.
//!
//! A read payload is a JSON object with optional `attributes`, `where`,
//! `order`, `limit`, `offset` and `include` keys. [`build_read_options`]
//! validates it against the registry and expands `include` into a tree that
//! mirrors the model's association map.

use std::cmp::Ordering;

use relschema_core::registry::{Association, ModelRegistry};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{ResourceError, Result};

/// Which way a [`SortKey`] sorts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Reads an `ASC`/`DESC` keyword, ignoring case.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        if keyword.eq_ignore_ascii_case("asc") {
            Some(Self::Ascending)
        } else if keyword.eq_ignore_ascii_case("desc") {
            Some(Self::Descending)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    /// Orients a column comparison.
    #[must_use]
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// One entry of a read's `order` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    #[must_use]
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    #[must_use]
    pub fn ascending(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Ascending)
    }

    #[must_use]
    pub fn descending(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Descending)
    }

    /// Reads one `order` entry: `"name"`, `"-name"`, `["name"]` or
    /// `["name", "DESC"]`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let bad = || invalid(format!("bad order entry {value}"));
        match value {
            Value::String(column) => Ok(match column.strip_prefix('-') {
                Some(column) => Self::descending(column),
                None => Self::ascending(column.as_str()),
            }),
            Value::Array(pair) => match pair.as_slice() {
                [Value::String(column)] => Ok(Self::ascending(column.as_str())),
                [Value::String(column), Value::String(keyword)] => {
                    let direction = SortDirection::from_keyword(keyword).ok_or_else(bad)?;
                    Ok(Self::new(column.as_str(), direction))
                }
                _ => Err(bad()),
            },
            _ => Err(bad()),
        }
    }

    /// Returns the `[column, direction]` pair form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!([self.column, self.direction.keyword()])
    }
}

/// One expanded association in a read.
#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    /// The association being followed.
    pub association: Association,
    /// Options applied to the associated records.
    pub options: ReadOptions,
}

impl Include {
    /// Property name the associated records are attached under.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.association.alias
    }
}

/// Validated options for reading one model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    /// Model (table) read.
    pub model: String,
    /// The model's primary key column.
    pub primary_key: String,
    /// Projected columns; `None` reads every column.
    pub attributes: Option<Vec<String>>,
    /// Column equality conditions (`where`). An array value matches any of
    /// its elements.
    pub filter: Map<String, Value>,
    /// Sort order.
    pub order: Vec<SortKey>,
    /// Maximum number of records.
    pub limit: Option<usize>,
    /// Records to skip.
    pub offset: Option<usize>,
    /// Associations to load.
    pub include: Vec<Include>,
}

impl ReadOptions {
    /// Options reading every column of `model`.
    #[must_use]
    pub fn new(model: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            primary_key: primary_key.into(),
            ..Self::default()
        }
    }

    /// Looks up an include by alias.
    #[must_use]
    pub fn include(&self, alias: &str) -> Option<&Include> {
        self.include.iter().find(|i| i.alias() == alias)
    }

    /// Renders the options as a JSON payload, includes nested under
    /// `{model, as, ...}` entries.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("model".into(), Value::String(self.model.clone()));
        if let Some(attributes) = &self.attributes {
            out.insert("attributes".into(), json!(attributes));
        }
        if !self.filter.is_empty() {
            out.insert("where".into(), Value::Object(self.filter.clone()));
        }
        if !self.order.is_empty() {
            out.insert(
                "order".into(),
                Value::Array(self.order.iter().map(SortKey::to_value).collect()),
            );
        }
        if let Some(limit) = self.limit {
            out.insert("limit".into(), json!(limit));
        }
        if let Some(offset) = self.offset {
            out.insert("offset".into(), json!(offset));
        }
        if !self.include.is_empty() {
            let include = self
                .include
                .iter()
                .map(|include| {
                    let mut nested = include.options.to_value();
                    if let Value::Object(map) = &mut nested {
                        map.insert("as".into(), Value::String(include.alias().to_string()));
                    }
                    nested
                })
                .collect();
            out.insert("include".into(), Value::Array(include));
        }
        Value::Object(out)
    }
}

fn invalid(message: impl Into<String>) -> ResourceError {
    ResourceError::InvalidPayload(message.into())
}

fn as_count(key: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(format!("{key} must be a non-negative integer, got {value}")))
}

/// Builds read options for `model` from a payload.
///
/// The primary key is prepended to every non-empty `attributes` list that
/// lacks it, at every include level.
///
/// # Errors
///
/// [`ResourceError::UnknownAssociation`] for an include alias the model does
/// not declare, [`ResourceError::InvalidPayload`] for malformed keys.
pub fn build_read_options(
    registry: &ModelRegistry,
    model: &str,
    payload: &Value,
) -> Result<ReadOptions> {
    let entity = registry.model(model)?;
    let mut options = ReadOptions::new(model, entity.primary_key.clone());

    let payload = match payload {
        Value::Null => return Ok(options),
        Value::Object(map) => map,
        other => return Err(invalid(format!("read payload must be an object, got {other}"))),
    };

    for (key, value) in payload {
        match key.as_str() {
            "attributes" => {
                let mut attributes = value
                    .as_array()
                    .ok_or_else(|| invalid("attributes must be an array"))?
                    .iter()
                    .map(|a| {
                        a.as_str()
                            .map(String::from)
                            .ok_or_else(|| invalid(format!("bad attribute {a}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                if !attributes.is_empty() && !attributes.contains(&options.primary_key) {
                    attributes.insert(0, options.primary_key.clone());
                }
                options.attributes = Some(attributes);
            }
            "where" => {
                options.filter = value
                    .as_object()
                    .cloned()
                    .ok_or_else(|| invalid("where must be an object"))?;
            }
            "order" => {
                options.order = match value {
                    Value::Array(entries) => entries
                        .iter()
                        .map(SortKey::from_value)
                        .collect::<Result<_>>()?,
                    other => vec![SortKey::from_value(other)?],
                };
            }
            "limit" => options.limit = Some(as_count(key, value)?),
            "offset" => options.offset = Some(as_count(key, value)?),
            "include" => options.include = build_includes(registry, model, value)?,
            _ => debug!(model = %model, key = %key, "Ignoring unknown read option"),
        }
    }
    Ok(options)
}

fn build_includes(registry: &ModelRegistry, model: &str, value: &Value) -> Result<Vec<Include>> {
    let mut includes = Vec::new();
    match value {
        Value::String(alias) => includes.push(build_include(registry, model, alias, &Value::Null)?),
        Value::Array(items) => {
            for item in items {
                includes.extend(build_includes(registry, model, item)?);
            }
        }
        Value::Object(entries) => {
            for (alias, nested) in entries {
                let nested = match nested {
                    Value::Bool(true) => &Value::Null,
                    other => other,
                };
                includes.push(build_include(registry, model, alias, nested)?);
            }
        }
        other => return Err(invalid(format!("bad include entry {other}"))),
    }
    Ok(includes)
}

fn build_include(
    registry: &ModelRegistry,
    model: &str,
    alias: &str,
    payload: &Value,
) -> Result<Include> {
    let association = registry
        .associations(model)?
        .iter()
        .find(|a| a.alias == alias)
        .cloned()
        .ok_or_else(|| ResourceError::UnknownAssociation {
            model: model.to_string(),
            alias: alias.to_string(),
        })?;
    let options = build_read_options(registry, &association.target, payload)?;
    Ok(Include {
        association,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register_all(&[
                json!({ "id": "Role", "properties": {
                    "key": { "type": "string", "primaryKey": true },
                    "label": { "type": "string" },
                }}),
                json!({ "id": "User", "properties": {
                    "id": { "type": "integer", "primaryKey": true },
                    "name": { "type": "string" },
                    "role": { "$ref": "Role" },
                    "posts": { "type": "array", "items": { "$ref": "Post" } },
                }}),
                json!({ "id": "Post", "properties": {
                    "id": { "type": "integer", "primaryKey": true },
                    "title": { "type": "string" },
                }}),
            ])
            .unwrap();
        registry.resolve_associations().unwrap();
        registry
    }

    #[test]
    fn test_primary_key_prepended_to_projection() {
        let options =
            build_read_options(&registry(), "User", &json!({ "attributes": ["name"] })).unwrap();
        assert_eq!(options.attributes, Some(vec!["id".to_string(), "name".to_string()]));

        let options =
            build_read_options(&registry(), "User", &json!({ "attributes": ["name", "id"] })).unwrap();
        assert_eq!(options.attributes, Some(vec!["name".to_string(), "id".to_string()]));
    }

    #[test]
    fn test_empty_payload_reads_everything() {
        let options = build_read_options(&registry(), "User", &Value::Null).unwrap();
        assert_eq!(options, ReadOptions::new("User", "id"));
    }

    #[test]
    fn test_nested_include_tree() {
        let payload = json!({
            "where": { "name": "alice" },
            "order": ["-id", ["name", "asc"]],
            "limit": 10,
            "include": [
                "role",
                { "posts": { "attributes": ["title"], "limit": 2 } },
            ],
        });
        let options = build_read_options(&registry(), "User", &payload).unwrap();

        assert_eq!(options.order, vec![SortKey::descending("id"), SortKey::ascending("name")]);
        let role = options.include("role").unwrap();
        assert_eq!(role.options.model, "Role");
        assert_eq!(role.options.primary_key, "key");

        let posts = options.include("posts").unwrap();
        assert_eq!(posts.association.foreign_key, "userId");
        assert_eq!(
            posts.options.attributes,
            Some(vec!["id".to_string(), "title".to_string()])
        );

        assert_eq!(
            options.to_value(),
            json!({
                "model": "User",
                "where": { "name": "alice" },
                "order": [["id", "DESC"], ["name", "ASC"]],
                "limit": 10,
                "include": [
                    { "model": "Role", "as": "role" },
                    { "model": "Post", "attributes": ["id", "title"], "limit": 2, "as": "posts" },
                ],
            })
        );
    }

    #[test]
    fn test_sort_key_forms() {
        assert_eq!(
            SortKey::from_value(&json!(["rank", "Desc"])).unwrap(),
            SortKey::descending("rank")
        );
        assert_eq!(SortKey::from_value(&json!(["rank"])).unwrap(), SortKey::ascending("rank"));
        assert!(SortKey::from_value(&json!(["rank", "sideways"])).is_err());
        assert!(SortKey::from_value(&json!(3)).is_err());

        assert_eq!(SortDirection::Descending.apply(Ordering::Less), Ordering::Greater);
        assert_eq!(SortDirection::default().keyword(), "ASC");
    }

    #[test]
    fn test_include_object_form() {
        let options =
            build_read_options(&registry(), "User", &json!({ "include": { "role": true } })).unwrap();
        assert_eq!(options.include.len(), 1);
        assert_eq!(options.include[0].alias(), "role");
    }

    #[test]
    fn test_unknown_alias() {
        let err = build_read_options(&registry(), "User", &json!({ "include": ["friends"] }))
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::UnknownAssociation { ref model, ref alias } if model == "User" && alias == "friends"
        ));
    }

    #[test]
    fn test_malformed_payloads() {
        let registry = registry();
        assert!(matches!(
            build_read_options(&registry, "User", &json!({ "limit": -1 })),
            Err(ResourceError::InvalidPayload(_))
        ));
        assert!(matches!(
            build_read_options(&registry, "User", &json!(["id"])),
            Err(ResourceError::InvalidPayload(_))
        ));
        assert!(matches!(
            build_read_options(&registry, "Ghost", &Value::Null),
            Err(ResourceError::Schema(_))
        ));
    }
}
