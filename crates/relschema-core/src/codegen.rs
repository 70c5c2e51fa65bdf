//! Migration code generation.
//!
//! [`MigrationGenerator`] walks a diff tree depth-first and emits reversible
//! operations. Every forward operation is recorded together with its inverse;
//! `down` is the list of inverses in reverse application order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::column::{infer_column, ColumnDefinition};
use crate::diff::{deep_equal, diff_with, ChangeKind, DiffNode, DiffOptions};
use crate::error::{Result, SchemaError};
use crate::normalize::{reference_of, Reference};
use crate::operations::{Column, Operation};
use crate::registry::{required_names, ModelRegistry};

/// The three operation lists of a migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationSet {
    /// Structural forward operations.
    pub up: Vec<Operation>,
    /// Inverse operations, in reverse application order.
    pub down: Vec<Operation>,
    /// Column changes, applied after `up`.
    pub change: Vec<Operation>,
}

impl MigrationSet {
    /// Returns true if the migration has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty() && self.change.is_empty()
    }

    /// Forward operations in application order (`up` then `change`).
    pub fn forward(&self) -> impl Iterator<Item = &Operation> {
        self.up.iter().chain(&self.change)
    }

    /// Renders the migration source text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, operations) in [("up", &self.up), ("down", &self.down), ("change", &self.change)] {
            out.push_str(name);
            out.push_str(" = [\n");
            for operation in operations {
                out.push_str("  ");
                out.push_str(&operation.render(2));
                out.push_str(",\n");
            }
            out.push_str("]\n");
        }
        out
    }
}

/// Forward operations paired with their inverses.
#[derive(Debug, Default)]
struct Plan {
    up: Vec<(Operation, Operation)>,
    change: Vec<(Operation, Operation)>,
}

impl Plan {
    fn push(&mut self, forward: Operation, inverse: Operation) {
        debug!(operation = %forward.description(), "Planned operation");
        if matches!(forward, Operation::ChangeColumn { .. }) {
            self.change.push((forward, inverse));
        } else {
            self.up.push((forward, inverse));
        }
    }

    /// Pushes an operation that derives its own inverse.
    fn push_reversible(&mut self, forward: Operation) {
        debug_assert!(forward.is_reversible(), "{forward:?} has no inverse");
        if let Some(inverse) = forward.reverse() {
            self.push(forward, inverse);
        }
    }

    fn finish(self) -> MigrationSet {
        let down = self
            .up
            .iter()
            .chain(&self.change)
            .rev()
            .map(|(_, inverse)| inverse.clone())
            .collect();
        MigrationSet {
            up: self.up.into_iter().map(|(forward, _)| forward).collect(),
            down,
            change: self.change.into_iter().map(|(forward, _)| forward).collect(),
        }
    }
}

/// Schema-side view of one table snapshot.
struct TableView<'a> {
    name: String,
    properties: Option<&'a Map<String, Value>>,
    required: HashSet<&'a str>,
    options: Map<String, Value>,
}

impl<'a> TableView<'a> {
    fn new(schema: &'a Value, fallback: &str) -> Self {
        Self {
            name: schema
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string(),
            properties: schema.get("properties").and_then(Value::as_object),
            required: required_names(schema).into_iter().collect(),
            options: schema
                .get("options")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn property(&self, name: &str) -> Option<&'a Value> {
        self.properties.and_then(|props| props.get(name))
    }

    fn column(&self, name: &str) -> Result<ColumnDefinition> {
        let node = self.property(name).unwrap_or(&Value::Null);
        infer_column(name, node, self.required.contains(name))
    }
}

fn missing_properties(entity: &str, schema: &Value) -> SchemaError {
    SchemaError::MissingProperties {
        entity: entity.to_string(),
        fragment: schema.to_string(),
    }
}

fn is_empty_schema(schema: &Value) -> bool {
    schema.as_object().map_or(true, Map::is_empty)
}

/// Generates migrations from schema diffs.
#[derive(Debug, Clone, Copy)]
pub struct MigrationGenerator<'a> {
    registry: &'a ModelRegistry,
    options: DiffOptions,
}

impl<'a> MigrationGenerator<'a> {
    /// Creates a generator with default diff options.
    #[must_use]
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self {
            registry,
            options: DiffOptions::default(),
        }
    }

    /// Sets the diff options.
    #[must_use]
    pub const fn with_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    /// Diffs two table schemas with this generator's options. An empty
    /// object on either side stands for an absent table.
    #[must_use]
    pub fn diff(&self, previous: &Value, current: &Value) -> DiffNode {
        diff_with(Some(previous), Some(current), &self.options)
    }

    /// Generates the operations turning `previous` into `current` for one
    /// entity, given their diff tree.
    pub fn generate(
        &self,
        entity: &str,
        previous: &Value,
        current: &Value,
        diff: &DiffNode,
    ) -> Result<MigrationSet> {
        let mut plan = Plan::default();
        self.plan_table(&mut plan, entity, previous, current, diff)?;
        Ok(plan.finish())
    }

    /// Like [`MigrationGenerator::generate`], rendered as migration source.
    pub fn generate_source(
        &self,
        entity: &str,
        previous: &Value,
        current: &Value,
        diff: &DiffNode,
    ) -> Result<String> {
        self.generate(entity, previous, current, diff)
            .map(|set| set.render())
    }

    /// Diffs every registered table (join tables included) against a
    /// previous `{ <table>: <schema> }` snapshot. Tables only present in the
    /// previous snapshot are dropped; a dropped table whose schema equals an
    /// added one (ignoring `id`) is renamed instead.
    pub fn generate_all(&self, previous_snapshot: &Value) -> Result<MigrationSet> {
        let current = self.registry.snapshot()?;
        let empty_tables = Map::new();
        let current = current.as_object().unwrap_or(&empty_tables);
        let previous = previous_snapshot.as_object().unwrap_or(&empty_tables);
        let empty = Value::Object(Map::new());

        let dropped: Vec<&String> = previous.keys().filter(|k| !current.contains_key(*k)).collect();
        let mut renamed_from: HashMap<&str, &str> = HashMap::new();
        for (name, schema) in current {
            if previous.contains_key(name) {
                continue;
            }
            let candidate = dropped.iter().find(|old| {
                !renamed_from.values().any(|used| used == &old.as_str())
                    && same_shape(&previous[old.as_str()], schema)
            });
            if let Some(old) = candidate {
                info!(from = %old, to = %name, "Detected table rename");
                renamed_from.insert(name.as_str(), old.as_str());
            }
        }

        let mut plan = Plan::default();
        for (name, schema) in current {
            let prev = renamed_from
                .get(name.as_str())
                .and_then(|old| previous.get(*old))
                .or_else(|| previous.get(name))
                .unwrap_or(&empty);
            let diff = self.diff(prev, schema);
            if diff.is_changed() {
                self.plan_table(&mut plan, name, prev, schema, &diff)?;
            }
        }
        for name in dropped {
            if renamed_from.values().any(|used| used == &name.as_str()) {
                continue;
            }
            let schema = &previous[name.as_str()];
            let diff = self.diff(schema, &empty);
            self.plan_table(&mut plan, name, schema, &empty, &diff)?;
        }

        let set = plan.finish();
        info!(
            up = set.up.len(),
            change = set.change.len(),
            down = set.down.len(),
            "Generated migration"
        );
        Ok(set)
    }

    fn association_comment(&self, table: &str, alias: &str, node: &Value, reference: &Reference) -> String {
        self.registry.find_association(table, alias).map_or_else(
            || reference.describe(node.as_object().unwrap_or(&Map::new())),
            |assoc| format!("{} {}", assoc.kind, assoc.target),
        )
    }

    fn create_table(&self, view: &TableView<'_>, schema: &Value) -> Result<Operation> {
        let properties = view
            .properties
            .ok_or_else(|| missing_properties(&view.name, schema))?;
        let mut columns = Vec::with_capacity(properties.len());
        for (name, node) in properties {
            let definition = match reference_of(node) {
                Some(reference) => ColumnDefinition::virtual_column(
                    self.association_comment(&view.name, name, node, &reference),
                ),
                None => view.column(name)?,
            };
            columns.push(Column::new(name.clone(), definition));
        }
        Ok(Operation::create_table(view.name.clone(), columns).with_options(view.options.clone()))
    }

    fn plan_table(
        &self,
        plan: &mut Plan,
        entity: &str,
        previous: &Value,
        current: &Value,
        diff: &DiffNode,
    ) -> Result<()> {
        if is_empty_schema(previous) && is_empty_schema(current) {
            return Ok(());
        }
        let prev = TableView::new(previous, entity);
        let curr = TableView::new(current, entity);

        let created = is_empty_schema(previous) && !is_empty_schema(current);
        let dropped = !is_empty_schema(previous) && is_empty_schema(current);
        let id_change = diff.get(&["id"]).map(|node| node.kind);

        if created || id_change == Some(ChangeKind::Created) {
            plan.push_reversible(self.create_table(&curr, current)?);
            return Ok(());
        }
        if dropped || id_change == Some(ChangeKind::Deleted) {
            let rebuild = self.create_table(&prev, previous)?;
            let teardown =
                Operation::drop_table(prev.name.clone()).with_options(prev.options.clone());
            plan.push(teardown, rebuild);
            return Ok(());
        }
        if id_change == Some(ChangeKind::Modified) {
            plan.push_reversible(Operation::rename_table(prev.name.clone(), curr.name.clone()));
        }
        if diff.get(&["options"]).is_some_and(DiffNode::is_changed) {
            debug!(table = %curr.name, "Table options changed, no operation emitted");
        }

        let Some(properties) = diff.get(&["properties"]).and_then(DiffNode::children) else {
            if curr.properties.is_none() {
                return Err(missing_properties(entity, current));
            }
            return Ok(());
        };
        self.plan_columns(plan, &prev, &curr, properties)
    }

    fn plan_columns(
        &self,
        plan: &mut Plan,
        prev: &TableView<'_>,
        curr: &TableView<'_>,
        properties: &[(String, DiffNode)],
    ) -> Result<()> {
        let table = curr.name.as_str();
        let is_association = |node: Option<&Value>| node.and_then(reference_of).is_some();
        let mut changed: HashSet<&str> = HashSet::new();
        let mut renamed: HashMap<&str, &str> = HashMap::new();

        for (name, node) in properties {
            let prev_assoc = is_association(prev.property(name));
            let curr_assoc = is_association(curr.property(name));
            match node.kind {
                ChangeKind::Unchanged => {}
                ChangeKind::Created if !curr_assoc => {
                    plan.push_reversible(Operation::add_column(
                        table,
                        name.clone(),
                        curr.column(name)?,
                    ));
                    changed.insert(name);
                }
                ChangeKind::Deleted if !prev_assoc => {
                    plan.push(
                        Operation::remove_column(table, name.clone()),
                        Operation::add_column(table, name.clone(), prev.column(name)?),
                    );
                    changed.insert(name);
                }
                ChangeKind::Renamed if !curr_assoc => {
                    let Some(old) = node.prev.as_deref() else {
                        continue;
                    };
                    plan.push_reversible(Operation::rename_column(table, old, name.clone()));
                    renamed.insert(name, old);
                }
                ChangeKind::Modified => match (prev_assoc, curr_assoc) {
                    (true, true) => {}
                    (true, false) => {
                        plan.push_reversible(Operation::add_column(
                            table,
                            name.clone(),
                            curr.column(name)?,
                        ));
                        changed.insert(name);
                    }
                    (false, true) => {
                        plan.push(
                            Operation::remove_column(table, name.clone()),
                            Operation::add_column(table, name.clone(), prev.column(name)?),
                        );
                        changed.insert(name);
                    }
                    (false, false) => {
                        let previous = prev.column(name)?;
                        let current = curr.column(name)?;
                        let additive = node.children().is_some_and(|attrs| {
                            attrs
                                .iter()
                                .all(|(_, a)| matches!(a.kind, ChangeKind::Created | ChangeKind::Unchanged))
                        });
                        let forward = if additive {
                            previous.merged_with(&current.changes_from(&previous))
                        } else {
                            current
                        };
                        plan.push(
                            Operation::change_column(table, name.clone(), forward),
                            Operation::change_column(table, name.clone(), previous),
                        );
                        changed.insert(name);
                    }
                },
                _ => debug!(table = %table, column = %name, "Association changed, no column operation"),
            }
        }

        let Some(current_properties) = curr.properties else {
            return Ok(());
        };
        for name in current_properties.keys() {
            let name = name.as_str();
            let old = renamed.get(name).copied().unwrap_or(name);
            if changed.contains(name)
                || prev.property(old).is_none()
                || is_association(curr.property(name))
                || prev.required.contains(old) == curr.required.contains(name)
            {
                continue;
            }
            let mut forward = curr.column(name)?;
            forward.allow_null = Some(forward.is_nullable());
            let mut inverse = prev.column(old)?;
            inverse.allow_null = Some(inverse.is_nullable());
            if forward.allow_null == inverse.allow_null {
                continue;
            }
            plan.push(
                Operation::change_column(table, name, forward),
                Operation::change_column(table, name, inverse),
            );
        }
        Ok(())
    }
}

fn same_shape(a: &Value, b: &Value) -> bool {
    let strip = |value: &Value| {
        let mut value = value.clone();
        if let Value::Object(map) = &mut value {
            map.remove("id");
        }
        value
    };
    deep_equal(&strip(a), &strip(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use serde_json::json;

    fn generate(previous: &Value, current: &Value) -> MigrationSet {
        let registry = ModelRegistry::new();
        let generator = MigrationGenerator::new(&registry);
        let diff = generator.diff(previous, current);
        generator.generate("Test", previous, current, &diff).unwrap()
    }

    #[test]
    fn test_create_from_empty() {
        let example = json!({ "id": "Example", "properties": { "id": { "type": "integer", "primaryKey": true } } });
        let set = generate(&json!({}), &example);
        assert_eq!(set.up.len(), 1);
        assert!(matches!(&set.up[0], Operation::CreateTable { name, .. } if name == "Example"));
        assert_eq!(set.down, vec![Operation::drop_table("Example")]);
        assert!(set.change.is_empty());

        let text = set.render();
        assert_eq!(
            text,
            "up = [\n  createTable('Example', {\n    id: {\n      type: INTEGER,\n      primaryKey: true,\n      allowNull: false,\n    },\n  }, {}),\n]\ndown = [\n  dropTable('Example', {}),\n]\nchange = [\n]\n"
        );
    }

    #[test]
    fn test_drop_to_empty_rebuilds_backward() {
        let example = json!({ "id": "Example", "properties": { "id": { "type": "integer", "primaryKey": true } } });
        let set = generate(&example, &json!({}));
        assert_eq!(set.up, vec![Operation::drop_table("Example")]);
        assert_eq!(set.down.len(), 1);
        assert!(matches!(&set.down[0], Operation::CreateTable { columns, .. } if columns.len() == 1));
    }

    #[test]
    fn test_add_remove_and_rename_columns() {
        let previous = json!({ "id": "User", "properties": {
            "id": { "type": "integer", "primaryKey": true },
            "nickname": { "type": "string" },
            "role": { "enum": ["guest", "admin"] },
        }});
        let current = json!({ "id": "User", "properties": {
            "id": { "type": "integer", "primaryKey": true },
            "roleType": { "enum": ["guest", "admin"] },
            "email": { "type": "string", "format": "email" },
        }});
        let set = generate(&previous, &current);
        assert_eq!(set.up.len(), 3);
        assert_eq!(set.up[0], Operation::remove_column("User", "nickname"));
        assert_eq!(set.up[1], Operation::rename_column("User", "role", "roleType"));
        assert!(matches!(&set.up[2], Operation::AddColumn { name, .. } if name == "email"));
        assert_eq!(set.down[0], Operation::remove_column("User", "email"));
        assert_eq!(set.down[1], Operation::rename_column("User", "roleType", "role"));
        assert!(matches!(&set.down[2], Operation::AddColumn { name, .. } if name == "nickname"));
    }

    #[test]
    fn test_rename_table() {
        let previous = json!({ "id": "Person", "properties": { "id": { "type": "integer" } } });
        let current = json!({ "id": "Human", "properties": { "id": { "type": "integer" } } });
        let set = generate(&previous, &current);
        assert_eq!(set.up, vec![Operation::rename_table("Person", "Human")]);
        assert_eq!(set.down, vec![Operation::rename_table("Human", "Person")]);
    }

    #[test]
    fn test_required_flip_changes_nullability() {
        let previous = json!({ "id": "T", "properties": { "name": { "type": "string" } } });
        let current = json!({ "id": "T", "properties": { "name": { "type": "string" } }, "required": ["name"] });
        let set = generate(&previous, &current);
        assert!(set.up.is_empty());
        assert_eq!(set.change.len(), 1);
        let Operation::ChangeColumn { definition, .. } = &set.change[0] else {
            panic!("expected changeColumn");
        };
        assert_eq!(definition.allow_null, Some(false));
        let Operation::ChangeColumn { definition, .. } = &set.down[0] else {
            panic!("expected changeColumn");
        };
        assert_eq!(definition.allow_null, Some(true));
    }

    #[test]
    fn test_association_properties_render_virtual_columns() {
        let mut registry = ModelRegistry::new();
        registry
            .register_all(&[
                json!({ "id": "Role", "properties": { "id": { "type": "integer", "primaryKey": true } } }),
                json!({ "id": "User", "properties": {
                    "id": { "type": "integer", "primaryKey": true },
                    "role": { "$ref": "Role" },
                }}),
            ])
            .unwrap();
        registry.resolve_associations().unwrap();
        let current = registry.table_schema("User").unwrap();
        let generator = MigrationGenerator::new(&registry);
        let diff = generator.diff(&json!({}), &current);
        let set = generator.generate("User", &json!({}), &current, &diff).unwrap();

        let Operation::CreateTable { columns, .. } = &set.up[0] else {
            panic!("expected createTable");
        };
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "role", "roleId"]);
        assert_eq!(columns[1].definition, ColumnDefinition::virtual_column("belongsTo Role"));
        assert_eq!(
            columns[2].definition.references.as_ref().map(|r| r.model.as_str()),
            Some("Role")
        );
    }

    #[test]
    fn test_association_changes_emit_no_column_operations() {
        let previous = json!({ "id": "User", "properties": { "team": { "$ref": "Team" } } });
        let current = json!({ "id": "User", "properties": { "team": { "$ref": "Squad" } } });
        assert!(generate(&previous, &current).is_empty());
    }

    #[test]
    fn test_two_absent_tables_generate_nothing() {
        let registry = ModelRegistry::new();
        let generator = MigrationGenerator::new(&registry);
        let diff = generator.diff(&json!({}), &json!({}));
        let set = generator.generate("Ghost", &json!({}), &json!({}), &diff).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_added_attribute_keeps_existing_ones() {
        let previous = json!({ "id": "T", "properties": {
            "id": { "type": "integer", "primaryKey": true },
        }});
        let current = json!({ "id": "T", "properties": {
            "id": { "type": "integer", "primaryKey": true, "unique": true },
        }});
        let set = generate(&previous, &current);
        let Operation::ChangeColumn { definition, .. } = &set.change[0] else {
            panic!("expected changeColumn");
        };
        assert_eq!(definition.primary_key, Some(true));
        assert_eq!(definition.unique, Some(true));
        assert_eq!(definition.allow_null, Some(false));
    }

    #[test]
    fn test_missing_properties_fails_fast() {
        let registry = ModelRegistry::new();
        let generator = MigrationGenerator::new(&registry);
        let current = json!({ "id": "Broken" });
        let diff = generator.diff(&json!({}), &current);
        let err = generator.generate("Broken", &json!({}), &current, &diff).unwrap_err();
        assert!(matches!(err, SchemaError::MissingProperties { entity, .. } if entity == "Broken"));
    }

    #[test]
    fn test_enum_change_lists_all_literals() {
        let previous = json!({ "id": "T", "properties": { "access": { "type": "string" } } });
        let current = json!({ "id": "T", "properties": { "access": { "enum": ["a", "b", "c"] } } });
        let set = generate(&previous, &current);
        assert_eq!(
            set.change,
            vec![Operation::change_column(
                "T",
                "access",
                ColumnDefinition::new(ColumnType::Enum(vec!["a".into(), "b".into(), "c".into()]))
            )]
        );
        assert_eq!(
            set.down,
            vec![Operation::change_column("T", "access", ColumnDefinition::new(ColumnType::String))]
        );
    }
}
