//! Column definitions.
//!
//! A [`ColumnDefinition`] is the relational rendering of one JSON-Schema
//! property. Every field is optional so the same type describes both a full
//! column (`createTable`, `addColumn`) and the partial definitions carried by
//! `changeColumn`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{Result, SchemaError};
use crate::literal::{parse_quoted_list, quote};
use crate::normalize::{classify, NodeKind};

/// Column types produced by type inference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// Variable-length string.
    String,
    /// 32-bit integer.
    Integer,
    /// Floating point.
    Float,
    /// Boolean.
    Boolean,
    /// Date and time.
    Date,
    /// Date without time.
    DateOnly,
    /// UUID.
    Uuid,
    /// JSON document (nested objects and arrays).
    Json,
    /// Enumerated literal values.
    Enum(Vec<String>),
    /// Placeholder for association properties. Never materialized.
    Virtual,
}

impl ColumnType {
    /// Maps a JSON-Schema `type` and optional `format` to a column type.
    #[must_use]
    pub fn from_schema_type(json_type: &str, format: Option<&str>) -> Option<Self> {
        let column_type = match (json_type, format) {
            ("string", Some("date-time")) => Self::Date,
            ("string", Some("date")) => Self::DateOnly,
            ("string", Some("uuid")) => Self::Uuid,
            ("string", _) => Self::String,
            ("integer", _) => Self::Integer,
            ("number", _) => Self::Float,
            ("boolean", _) => Self::Boolean,
            ("object" | "array", _) => Self::Json,
            _ => return None,
        };
        Some(column_type)
    }

    /// Builds an enum type from literal values. Non-string literals are
    /// stringified.
    #[must_use]
    pub fn enumeration(values: &[Value]) -> Self {
        Self::Enum(
            values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        )
    }

    /// Returns true for placeholder association columns.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("STRING"),
            Self::Integer => f.write_str("INTEGER"),
            Self::Float => f.write_str("FLOAT"),
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::Date => f.write_str("DATE"),
            Self::DateOnly => f.write_str("DATEONLY"),
            Self::Uuid => f.write_str("UUID"),
            Self::Json => f.write_str("JSON"),
            Self::Virtual => f.write_str("VIRTUAL"),
            Self::Enum(values) => {
                let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
                write!(f, "ENUM({})", quoted.join(", "))
            }
        }
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let column_type = match s {
            "STRING" => Self::String,
            "INTEGER" => Self::Integer,
            "FLOAT" => Self::Float,
            "BOOLEAN" => Self::Boolean,
            "DATE" => Self::Date,
            "DATEONLY" => Self::DateOnly,
            "UUID" => Self::Uuid,
            "JSON" => Self::Json,
            "VIRTUAL" => Self::Virtual,
            _ => {
                let inner = s
                    .strip_prefix("ENUM(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| SchemaError::InvalidColumn(format!("unknown type '{s}'")))?;
                let values = parse_quoted_list(inner)
                    .ok_or_else(|| SchemaError::InvalidColumn(format!("malformed enum '{s}'")))?;
                Self::Enum(values)
            }
        };
        Ok(column_type)
    }
}

impl TryFrom<String> for ColumnType {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.to_string()
    }
}

/// Foreign key action (`onDelete`, `onUpdate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    /// Cascade the delete/update to referencing rows.
    #[serde(rename = "CASCADE")]
    Cascade,
    /// Set the foreign key column to NULL.
    #[serde(rename = "SET NULL")]
    SetNull,
    /// Set the foreign key column to its default value.
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
    /// Reject the change.
    #[serde(rename = "RESTRICT")]
    Restrict,
    /// No action.
    #[serde(rename = "NO ACTION")]
    NoAction,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }

    /// Parses an action, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            "RESTRICT" => Some(Self::Restrict),
            "NO ACTION" => Some(Self::NoAction),
            _ => None,
        }
    }
}

/// Foreign key target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct References {
    /// Referenced table.
    pub model: String,
    /// Referenced column.
    pub key: String,
}

impl References {
    /// Creates a new reference.
    #[must_use]
    pub fn new(model: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            key: key.into(),
        }
    }
}

/// Validation options attached to a column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Validate {
    /// Length bounds `[min, max]` (or `[min]`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub len: Option<Vec<u64>>,
    /// Regular expression the value must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is: Option<String>,
    #[serde(rename = "isEmail", skip_serializing_if = "Option::is_none")]
    pub is_email: Option<bool>,
    #[serde(rename = "isDate", skip_serializing_if = "Option::is_none")]
    pub is_date: Option<bool>,
    #[serde(rename = "isIPv4", skip_serializing_if = "Option::is_none")]
    pub is_ipv4: Option<bool>,
    #[serde(rename = "isIPv6", skip_serializing_if = "Option::is_none")]
    pub is_ipv6: Option<bool>,
    #[serde(rename = "isNumeric", skip_serializing_if = "Option::is_none")]
    pub is_numeric: Option<bool>,
    #[serde(rename = "isInt", skip_serializing_if = "Option::is_none")]
    pub is_int: Option<bool>,
    /// Inclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Number>,
    /// Inclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Number>,
}

impl Validate {
    /// Returns true if no validator is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Relational column definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ColumnDefinition {
    /// Column type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_null: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<References>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignKeyAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ForeignKeyAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate: Option<Validate>,
}

impl ColumnDefinition {
    /// Creates a definition with only a type.
    #[must_use]
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type: Some(column_type),
            ..Self::default()
        }
    }

    /// Creates a placeholder column for an association.
    #[must_use]
    pub fn virtual_column(comment: impl Into<String>) -> Self {
        Self {
            column_type: Some(ColumnType::Virtual),
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = Some(true);
        self.allow_null = Some(false);
        self
    }

    /// Sets nullability.
    #[must_use]
    pub fn allow_null(mut self, allow: bool) -> Self {
        self.allow_null = Some(allow);
        self
    }

    /// Sets auto-increment.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = Some(true);
        self
    }

    /// Sets the foreign key target.
    #[must_use]
    pub fn references(mut self, model: impl Into<String>, key: impl Into<String>) -> Self {
        self.references = Some(References::new(model, key));
        self
    }

    /// Returns true for placeholder association columns.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.column_type.as_ref().is_some_and(ColumnType::is_virtual)
    }

    /// Returns true if the column is declared as the primary key.
    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.primary_key == Some(true)
    }

    /// Returns true if the column accepts NULL. Unspecified means nullable
    /// unless the column is the primary key.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.allow_null.unwrap_or(!self.is_primary_key())
    }

    /// Renders the definition as an ordered JSON object.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Reads a definition back from its JSON object form.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map.clone()))
            .map_err(|e| SchemaError::InvalidColumn(e.to_string()))
    }

    /// Returns the partial definition of `self` relative to `previous`: the
    /// type plus every field whose value differs.
    #[must_use]
    pub fn changes_from(&self, previous: &Self) -> Self {
        fn pick<T: Clone + PartialEq>(curr: &Option<T>, prev: &Option<T>) -> Option<T> {
            if curr == prev {
                None
            } else {
                curr.clone()
            }
        }

        Self {
            column_type: self.column_type.clone(),
            primary_key: pick(&self.primary_key, &previous.primary_key),
            auto_increment: pick(&self.auto_increment, &previous.auto_increment),
            allow_null: pick(&self.allow_null, &previous.allow_null),
            default_value: pick(&self.default_value, &previous.default_value),
            unique: pick(&self.unique, &previous.unique),
            references: pick(&self.references, &previous.references),
            on_delete: pick(&self.on_delete, &previous.on_delete),
            on_update: pick(&self.on_update, &previous.on_update),
            comment: pick(&self.comment, &previous.comment),
            validate: pick(&self.validate, &previous.validate),
        }
    }

    /// Returns `self` with every field set in `changes` overriding its own.
    #[must_use]
    pub fn merged_with(&self, changes: &Self) -> Self {
        fn or<T: Clone>(change: &Option<T>, base: &Option<T>) -> Option<T> {
            change.as_ref().or(base.as_ref()).cloned()
        }

        Self {
            column_type: or(&changes.column_type, &self.column_type),
            primary_key: or(&changes.primary_key, &self.primary_key),
            auto_increment: or(&changes.auto_increment, &self.auto_increment),
            allow_null: or(&changes.allow_null, &self.allow_null),
            default_value: or(&changes.default_value, &self.default_value),
            unique: or(&changes.unique, &self.unique),
            references: or(&changes.references, &self.references),
            on_delete: or(&changes.on_delete, &self.on_delete),
            on_update: or(&changes.on_update, &self.on_update),
            comment: or(&changes.comment, &self.comment),
            validate: or(&changes.validate, &self.validate),
        }
    }
}

fn bool_keyword(node: &Map<String, Value>, key: &str) -> Option<bool> {
    node.get(key).and_then(Value::as_bool)
}

fn number_keyword(node: &Map<String, Value>, key: &str) -> Option<Number> {
    match node.get(key) {
        Some(Value::Number(n)) => Some(n.clone()),
        _ => None,
    }
}

/// Returns the declared JSON type and whether `null` is allowed by a
/// `["string", "null"]` style union.
fn declared_type(node: &Map<String, Value>) -> (Option<&str>, bool) {
    match node.get("type") {
        Some(Value::String(t)) => (Some(t.as_str()), false),
        Some(Value::Array(types)) => {
            let nullable = types.iter().any(|t| t.as_str() == Some("null"));
            let first = types.iter().filter_map(Value::as_str).find(|t| *t != "null");
            (first, nullable)
        }
        _ => (None, false),
    }
}

/// Resolves the column type of a scalar node.
pub(crate) fn scalar_type(node: &Map<String, Value>) -> Option<ColumnType> {
    let (json_type, _) = declared_type(node);
    let format = node.get("format").and_then(Value::as_str);
    ColumnType::from_schema_type(json_type?, format)
}

fn validators(node: &Map<String, Value>) -> Validate {
    let mut validate = Validate::default();
    let (json_type, _) = declared_type(node);
    match json_type {
        Some("string") => {
            let min = node.get("minLength").and_then(Value::as_u64);
            let max = node.get("maxLength").and_then(Value::as_u64);
            validate.len = match (min, max) {
                (Some(min), Some(max)) => Some(vec![min, max]),
                (Some(min), None) => Some(vec![min]),
                (None, Some(max)) => Some(vec![0, max]),
                (None, None) => None,
            };
            validate.is = node.get("pattern").and_then(Value::as_str).map(String::from);
            match node.get("format").and_then(Value::as_str) {
                Some("email") => validate.is_email = Some(true),
                Some("ipv4") => validate.is_ipv4 = Some(true),
                Some("ipv6") => validate.is_ipv6 = Some(true),
                Some("date" | "date-time") => validate.is_date = Some(true),
                _ => {}
            }
        }
        Some("integer") => {
            validate.is_int = Some(true);
            validate.min = number_keyword(node, "minimum");
            validate.max = number_keyword(node, "maximum");
        }
        Some("number") => {
            validate.is_numeric = Some(true);
            validate.min = number_keyword(node, "minimum");
            validate.max = number_keyword(node, "maximum");
        }
        _ => {}
    }
    validate
}

/// Infers the column definition of a normalized property node.
///
/// `required` is whether the property is listed in the entity's `required`
/// set. Association properties yield a `VIRTUAL` placeholder.
pub fn infer_column(name: &str, node: &Value, required: bool) -> Result<ColumnDefinition> {
    let unsupported = || SchemaError::UnsupportedType {
        property: name.to_string(),
        fragment: node.to_string(),
    };
    let Value::Object(map) = node else {
        return Err(unsupported());
    };

    let mut column = match classify(node) {
        NodeKind::Scalar(column_type) => {
            let validate = validators(map);
            ColumnDefinition {
                validate: (!validate.is_empty()).then_some(validate),
                ..ColumnDefinition::new(column_type)
            }
        }
        NodeKind::Enum(values) => ColumnDefinition::new(ColumnType::enumeration(&values)),
        NodeKind::Reference(reference) => {
            return Ok(ColumnDefinition::virtual_column(reference.describe(map)));
        }
        NodeKind::Object => ColumnDefinition::new(ColumnType::Json),
        NodeKind::Unresolved => return Err(unsupported()),
    };

    column.primary_key = bool_keyword(map, "primaryKey");
    column.auto_increment = bool_keyword(map, "autoIncrement");
    column.unique = bool_keyword(map, "unique");
    column.default_value = map.get("default").cloned();
    column.comment = map.get("comment").and_then(Value::as_str).map(String::from);
    if let Some(Value::Object(target)) = map.get("references") {
        let model = target.get("model").and_then(Value::as_str);
        let key = target.get("key").and_then(Value::as_str).unwrap_or("id");
        column.references = model.map(|m| References::new(m, key));
    }
    column.on_delete = map
        .get("onDelete")
        .and_then(Value::as_str)
        .and_then(ForeignKeyAction::parse);
    column.on_update = map
        .get("onUpdate")
        .and_then(Value::as_str)
        .and_then(ForeignKeyAction::parse);

    let (_, null_in_type) = declared_type(map);
    column.allow_null = if let Some(explicit) = bool_keyword(map, "allowNull") {
        Some(explicit)
    } else if required || column.is_primary_key() {
        Some(false)
    } else if null_in_type {
        Some(true)
    } else {
        None
    };

    Ok(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_type_display_and_parse() {
        let enum_type = ColumnType::Enum(vec!["guest".into(), "it's".into()]);
        assert_eq!(enum_type.to_string(), "ENUM('guest', 'it\\'s')");
        assert_eq!(enum_type.to_string().parse::<ColumnType>().unwrap(), enum_type);
        assert_eq!("DATEONLY".parse::<ColumnType>().unwrap(), ColumnType::DateOnly);
        assert!("VARCHAR".parse::<ColumnType>().is_err());
    }

    #[test]
    fn test_infer_string_with_length_and_pattern() {
        let node = json!({ "type": "string", "minLength": 2, "maxLength": 40, "pattern": "^[a-z]+$" });
        let column = infer_column("name", &node, true).unwrap();
        assert_eq!(column.column_type, Some(ColumnType::String));
        assert_eq!(column.allow_null, Some(false));
        let validate = column.validate.unwrap();
        assert_eq!(validate.len, Some(vec![2, 40]));
        assert_eq!(validate.is.as_deref(), Some("^[a-z]+$"));
    }

    #[test]
    fn test_infer_formats() {
        let email = infer_column("email", &json!({ "type": "string", "format": "email" }), false)
            .unwrap();
        assert_eq!(email.column_type, Some(ColumnType::String));
        assert_eq!(email.validate.unwrap().is_email, Some(true));

        let created = infer_column("at", &json!({ "type": "string", "format": "date-time" }), false)
            .unwrap();
        assert_eq!(created.column_type, Some(ColumnType::Date));
        assert_eq!(created.validate.unwrap().is_date, Some(true));

        let ip = infer_column("ip", &json!({ "type": "string", "format": "ipv6" }), false).unwrap();
        assert_eq!(ip.validate.unwrap().is_ipv6, Some(true));

        let id = infer_column("uid", &json!({ "type": "string", "format": "uuid" }), false).unwrap();
        assert_eq!(id.column_type, Some(ColumnType::Uuid));
    }

    #[test]
    fn test_infer_integer_bounds_and_nullable_union() {
        let node = json!({ "type": ["integer", "null"], "minimum": 0, "maximum": 10 });
        let column = infer_column("score", &node, false).unwrap();
        assert_eq!(column.column_type, Some(ColumnType::Integer));
        assert_eq!(column.allow_null, Some(true));
        let validate = column.validate.unwrap();
        assert_eq!(validate.is_int, Some(true));
        assert_eq!(validate.min, Some(Number::from(0)));
        assert_eq!(validate.max, Some(Number::from(10)));
    }

    #[test]
    fn test_infer_enum_and_unsupported() {
        let column = infer_column("role", &json!({ "enum": ["a", "b", 3] }), false).unwrap();
        assert_eq!(
            column.column_type,
            Some(ColumnType::Enum(vec!["a".into(), "b".into(), "3".into()]))
        );

        let err = infer_column("blob", &json!({ "type": "binary" }), false).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedType { property, .. } if property == "blob"));
    }

    #[test]
    fn test_primary_key_is_not_null() {
        let column = infer_column("id", &json!({ "type": "integer", "primaryKey": true }), false)
            .unwrap();
        assert!(column.is_primary_key());
        assert!(!column.is_nullable());
    }

    #[test]
    fn test_map_field_order_and_round_trip() {
        let column = ColumnDefinition::new(ColumnType::Integer)
            .primary_key()
            .auto_increment();
        let map = column.to_map();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["type", "primaryKey", "autoIncrement", "allowNull"]);
        assert_eq!(map["type"], json!("INTEGER"));
        assert_eq!(ColumnDefinition::from_map(&map).unwrap(), column);
    }

    #[test]
    fn test_from_map_rejects_unknown_keys() {
        let map = json!({ "type": "INTEGER", "colour": "red" });
        let Value::Object(map) = map else { unreachable!() };
        assert!(ColumnDefinition::from_map(&map).is_err());
    }

    #[test]
    fn test_changes_from_keeps_type_and_differences() {
        let previous = ColumnDefinition::new(ColumnType::Integer).primary_key();
        let current = previous.clone().auto_increment();
        let change = current.changes_from(&previous);
        assert_eq!(change.column_type, Some(ColumnType::Integer));
        assert_eq!(change.auto_increment, Some(true));
        assert_eq!(change.primary_key, None);
        assert_eq!(change.allow_null, None);
    }

    #[test]
    fn test_merged_with_overrides_set_fields() {
        let previous = ColumnDefinition::new(ColumnType::Integer)
            .primary_key()
            .allow_null(false);
        let changes = ColumnDefinition::new(ColumnType::Integer).auto_increment();
        let merged = previous.merged_with(&changes);
        assert_eq!(merged.primary_key, Some(true));
        assert_eq!(merged.allow_null, Some(false));
        assert_eq!(merged.auto_increment, Some(true));
        assert_eq!(merged.column_type, Some(ColumnType::Integer));
    }

    #[test]
    fn test_foreign_key_action_serialization() {
        let column = ColumnDefinition {
            on_delete: Some(ForeignKeyAction::SetNull),
            ..ColumnDefinition::new(ColumnType::Integer).references("Role", "id")
        };
        let map = column.to_map();
        assert_eq!(map["onDelete"], json!("SET NULL"));
        assert_eq!(map["references"], json!({ "model": "Role", "key": "id" }));
    }
}
