//! Model and association registry.
//!
//! Registration is two-phase: [`ModelRegistry::register`] stores normalized
//! entity shells by name, and [`ModelRegistry::resolve_associations`] walks
//! every association property once all entities are known, so targets may
//! forward-reference entities registered later. Entities refer to each other
//! by name only.

use std::collections::HashMap;
use std::fmt;

use heck::ToLowerCamelCase;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::column::ForeignKeyAction;
use crate::error::{Result, SchemaError};
use crate::normalize::{normalize, reference_of};

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// One-to-one, foreign key on the target.
    HasOne,
    /// One-to-many, foreign key on the target.
    HasMany,
    /// Many-to-one, foreign key on the source.
    BelongsTo,
    /// Many-to-many through a join table.
    BelongsToMany,
}

impl AssociationKind {
    const KEYWORDS: [(&'static str, Self); 4] = [
        ("belongsToMany", Self::BelongsToMany),
        ("hasMany", Self::HasMany),
        ("hasOne", Self::HasOne),
        ("belongsTo", Self::BelongsTo),
    ];

    /// Kind named by an explicit association keyword on `node`.
    #[must_use]
    pub fn explicit(node: &Map<String, Value>) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| node.get(*keyword).is_some_and(|v| v != &Value::Bool(false)))
            .map(|(_, kind)| *kind)
    }

    /// Returns true for associations holding many records.
    #[must_use]
    pub const fn is_plural(self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany)
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::BelongsTo => "belongsTo",
            Self::BelongsToMany => "belongsToMany",
        };
        f.write_str(name)
    }
}

/// A registered entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Entity (and table) name.
    pub name: String,
    /// Normalized schema.
    pub schema: Value,
    /// Primary key column.
    pub primary_key: String,
}

impl Model {
    /// The entity's properties, if declared.
    #[must_use]
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.schema.get("properties").and_then(Value::as_object)
    }

    /// Names listed in `required`.
    #[must_use]
    pub fn required(&self) -> Vec<&str> {
        required_names(&self.schema)
    }
}

pub(crate) fn required_names(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// A resolved association edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    /// Entity declaring the association.
    pub source: String,
    /// Property name of the association on the source.
    pub alias: String,
    /// Referenced entity.
    pub target: String,
    /// Cardinality.
    pub kind: AssociationKind,
    /// Foreign key column name.
    pub foreign_key: String,
    /// Key on the source referenced by `hasOne`/`hasMany`/`belongsToMany`.
    pub source_key: String,
    /// Key on the target referenced by `belongsTo` and `belongsToMany`.
    pub target_key: String,
    /// Join table of a `belongsToMany`.
    pub through: Option<String>,
    /// Join table column referencing the target.
    pub other_key: Option<String>,
    pub on_delete: Option<ForeignKeyAction>,
    pub on_update: Option<ForeignKeyAction>,
    /// False when `constraints: false` was declared.
    pub constraints: bool,
    /// Free-form scope carried through untouched.
    pub scope: Option<Value>,
}

impl Association {
    /// Table holding the foreign key column.
    #[must_use]
    pub fn foreign_key_table(&self) -> &str {
        match self.kind {
            AssociationKind::BelongsTo => &self.source,
            AssociationKind::HasOne | AssociationKind::HasMany => &self.target,
            AssociationKind::BelongsToMany => self.through.as_deref().unwrap_or(&self.source),
        }
    }
}

/// Registry of entities and their associations.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<Model>,
    index: HashMap<String, usize>,
    associations: HashMap<String, Vec<Association>>,
    injected: HashMap<String, Vec<(String, Value)>>,
    through_tables: Vec<Model>,
    resolved: bool,
}

fn setting<'a>(node: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    node.get(key).or_else(|| {
        node.get("items")
            .and_then(Value::as_object)
            .and_then(|items| items.get(key))
    })
}

fn setting_name(node: &Map<String, Value>, key: &str, nested: &str) -> Option<String> {
    match setting(node, key)? {
        Value::String(name) => Some(name.clone()),
        Value::Object(obj) => obj.get(nested).and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

fn camel_key(prefix: &str, key: &str) -> String {
    format!("{prefix} {key}").to_lower_camel_case()
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes and stores an entity schema (phase 1).
    pub fn register(&mut self, schema: &Value) -> Result<()> {
        let schema = normalize(schema)?;
        let name = schema
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::MissingId {
                fragment: schema.to_string(),
            })?
            .to_string();
        if self.index.contains_key(&name) {
            return Err(SchemaError::DuplicateEntity(name));
        }

        let primary_key = schema
            .get("properties")
            .and_then(Value::as_object)
            .and_then(|props| {
                props
                    .iter()
                    .find(|(_, p)| p.get("primaryKey").and_then(Value::as_bool) == Some(true))
                    .map(|(k, _)| k.clone())
            })
            .unwrap_or_else(|| "id".to_string());

        debug!(entity = %name, primary_key = %primary_key, "Registered entity");
        self.index.insert(name.clone(), self.models.len());
        self.models.push(Model {
            name,
            schema,
            primary_key,
        });
        self.resolved = false;
        Ok(())
    }

    /// Registers several schemas in order.
    pub fn register_all<'a>(&mut self, schemas: impl IntoIterator<Item = &'a Value>) -> Result<()> {
        for schema in schemas {
            self.register(schema)?;
        }
        Ok(())
    }

    /// Returns true once associations are resolved.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Returns true if an entity with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered entity names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }

    fn ensure_resolved(&self) -> Result<()> {
        if self.resolved {
            Ok(())
        } else {
            Err(SchemaError::NotResolved)
        }
    }

    fn lookup(&self, name: &str) -> Option<&Model> {
        self.index.get(name).map(|&i| &self.models[i])
    }

    /// Returns a registered entity.
    pub fn model(&self, name: &str) -> Result<&Model> {
        self.ensure_resolved()?;
        self.lookup(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))
    }

    /// Returns the associations declared by an entity.
    pub fn associations(&self, name: &str) -> Result<&[Association]> {
        self.ensure_resolved()?;
        if !self.contains(name) {
            return Err(SchemaError::UnknownEntity(name.to_string()));
        }
        Ok(self.associations.get(name).map_or(&[][..], Vec::as_slice))
    }

    /// Looks up one association without requiring resolution.
    #[must_use]
    pub fn find_association(&self, name: &str, alias: &str) -> Option<&Association> {
        self.associations
            .get(name)
            .and_then(|assocs| assocs.iter().find(|a| a.alias == alias))
    }

    /// Resolves association edges (phase 2). Idempotent until the next
    /// registration.
    pub fn resolve_associations(&mut self) -> Result<()> {
        if self.resolved {
            return Ok(());
        }
        self.associations.clear();
        self.injected.clear();
        self.through_tables.clear();

        let mut edges = Vec::new();
        for model in &self.models {
            let Some(properties) = model.properties() else {
                continue;
            };
            for (alias, node) in properties {
                let Some(reference) = reference_of(node) else {
                    continue;
                };
                let Some(target) = self.lookup(&reference.target) else {
                    return Err(SchemaError::UnresolvedAssociation {
                        source_entity: model.name.clone(),
                        alias: alias.clone(),
                        target: reference.target,
                    });
                };
                let settings = node.as_object().cloned().unwrap_or_default();
                let kind = reference.kind(&settings);
                edges.push(build_association(model, alias, target, kind, &settings));
            }
        }

        for association in edges {
            self.inject_foreign_keys(&association);
            debug!(
                source = %association.source,
                alias = %association.alias,
                kind = %association.kind,
                target = %association.target,
                foreign_key = %association.foreign_key,
                "Resolved association"
            );
            self.associations
                .entry(association.source.clone())
                .or_default()
                .push(association);
        }

        self.resolved = true;
        info!(
            entities = self.models.len(),
            through_tables = self.through_tables.len(),
            "Associations resolved"
        );
        Ok(())
    }

    fn key_schema(&self, table: &str, key: &str) -> Value {
        let mut column = Map::new();
        let declared = self
            .lookup(table)
            .and_then(Model::properties)
            .and_then(|props| props.get(key));
        for keyword in ["type", "format"] {
            if let Some(value) = declared.and_then(|d| d.get(keyword)) {
                column.insert(keyword.to_string(), value.clone());
            }
        }
        column
            .entry("type")
            .or_insert_with(|| Value::String("integer".to_string()));
        Value::Object(column)
    }

    fn foreign_key_column(
        &self,
        association: &Association,
        model: &str,
        key: &str,
        primary_key: bool,
    ) -> Value {
        let mut column = self.key_schema(model, key);
        if let Value::Object(map) = &mut column {
            if primary_key {
                map.insert("primaryKey".to_string(), Value::Bool(true));
            }
            if association.constraints {
                map.insert("references".to_string(), json!({ "model": model, "key": key }));
                if let Some(action) = association.on_delete {
                    map.insert("onDelete".to_string(), json!(action.to_sql()));
                }
                if let Some(action) = association.on_update {
                    map.insert("onUpdate".to_string(), json!(action.to_sql()));
                }
            }
        }
        column
    }

    fn inject(&mut self, table: &str, column: String, schema: Value) {
        let declared = self
            .lookup(table)
            .and_then(Model::properties)
            .is_some_and(|props| props.contains_key(&column));
        let columns = self.injected.entry(table.to_string()).or_default();
        if declared || columns.iter().any(|(name, _)| *name == column) {
            return;
        }
        columns.push((column, schema));
    }

    fn inject_foreign_keys(&mut self, association: &Association) {
        match association.kind {
            AssociationKind::BelongsTo => {
                let column = self.foreign_key_column(
                    association,
                    &association.target,
                    &association.target_key,
                    false,
                );
                self.inject(&association.source, association.foreign_key.clone(), column);
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                let column = self.foreign_key_column(
                    association,
                    &association.source,
                    &association.source_key,
                    false,
                );
                self.inject(&association.target, association.foreign_key.clone(), column);
            }
            AssociationKind::BelongsToMany => {
                let Some(through) = association.through.clone() else {
                    return;
                };
                let source_column = self.foreign_key_column(
                    association,
                    &association.source,
                    &association.source_key,
                    true,
                );
                let target_column = self.foreign_key_column(
                    association,
                    &association.target,
                    &association.target_key,
                    true,
                );
                if !self.contains(&through) && !self.through_tables.iter().any(|t| t.name == through)
                {
                    self.through_tables.push(Model {
                        name: through.clone(),
                        schema: json!({ "id": through, "properties": {} }),
                        primary_key: association.foreign_key.clone(),
                    });
                }
                self.inject(&through, association.foreign_key.clone(), source_column);
                if let Some(other_key) = &association.other_key {
                    self.inject(&through, other_key.clone(), target_column);
                }
            }
        }
    }

    /// Join tables generated for `belongsToMany` associations.
    pub fn through_tables(&self) -> Result<&[Model]> {
        self.ensure_resolved()?;
        Ok(&self.through_tables)
    }

    /// Returns the table schema of an entity or join table, with the foreign
    /// key columns contributed by associations appended to its properties.
    pub fn table_schema(&self, name: &str) -> Result<Value> {
        self.ensure_resolved()?;
        let model = self
            .lookup(name)
            .or_else(|| self.through_tables.iter().find(|t| t.name == name))
            .ok_or_else(|| SchemaError::UnknownEntity(name.to_string()))?;
        let mut schema = model.schema.clone();
        if let (Some(columns), Some(Value::Object(properties))) =
            (self.injected.get(name), schema.get_mut("properties"))
        {
            for (column, definition) in columns {
                properties.insert(column.clone(), definition.clone());
            }
        }
        Ok(schema)
    }

    /// Returns `{ <table>: <table schema> }` for every entity and join
    /// table, in registration order.
    pub fn snapshot(&self) -> Result<Value> {
        self.ensure_resolved()?;
        let mut tables = Map::new();
        for name in self
            .models
            .iter()
            .chain(&self.through_tables)
            .map(|m| m.name.as_str())
        {
            tables.insert(name.to_string(), self.table_schema(name)?);
        }
        Ok(Value::Object(tables))
    }
}

fn build_association(
    source: &Model,
    alias: &str,
    target: &Model,
    kind: AssociationKind,
    settings: &Map<String, Value>,
) -> Association {
    let source_key = setting_name(settings, "sourceKey", "name")
        .unwrap_or_else(|| source.primary_key.clone());
    let target_key = setting_name(settings, "targetKey", "name")
        .unwrap_or_else(|| target.primary_key.clone());
    let explicit_fk = setting_name(settings, "foreignKey", "name");

    let foreign_key = explicit_fk.unwrap_or_else(|| match kind {
        AssociationKind::BelongsTo => camel_key(alias, &target_key),
        _ => camel_key(&source.name, &source_key),
    });

    let (through, other_key) = if kind == AssociationKind::BelongsToMany {
        let through = setting_name(settings, "through", "model")
            .unwrap_or_else(|| format!("{}{}", source.name, target.name));
        let other_key = setting_name(settings, "otherKey", "name")
            .unwrap_or_else(|| camel_key(&target.name, &target_key));
        (Some(through), Some(other_key))
    } else {
        (None, None)
    };

    let default_on_delete = if kind == AssociationKind::BelongsToMany {
        ForeignKeyAction::Cascade
    } else {
        ForeignKeyAction::SetNull
    };
    let action = |key: &str, default: ForeignKeyAction| {
        setting(settings, key)
            .and_then(Value::as_str)
            .and_then(ForeignKeyAction::parse)
            .or(Some(default))
    };

    Association {
        source: source.name.clone(),
        alias: alias.to_string(),
        target: target.name.clone(),
        kind,
        foreign_key,
        source_key,
        target_key,
        through,
        other_key,
        on_delete: action("onDelete", default_on_delete),
        on_update: action("onUpdate", ForeignKeyAction::Cascade),
        constraints: setting(settings, "constraints").and_then(Value::as_bool) != Some(false),
        scope: setting(settings, "scope").cloned(),
    }
}
