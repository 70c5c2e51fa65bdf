#![allow(dead_code)]

use relschema_core::prelude::*;
use serde_json::{json, Value};

/// Builds a resolved registry from entity schemas.
pub fn registry(schemas: &[Value]) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register_all(schemas)
        .unwrap_or_else(|e| panic!("Failed to register schemas: {e}"));
    registry
        .resolve_associations()
        .unwrap_or_else(|e| panic!("Failed to resolve associations: {e}"));
    registry
}

/// Diffs and generates a migration for a single entity.
pub fn migrate(entity: &str, previous: &Value, current: &Value) -> MigrationSet {
    let registry = ModelRegistry::new();
    let generator = MigrationGenerator::new(&registry);
    let diff = generator.diff(previous, current);
    generator
        .generate(entity, previous, current, &diff)
        .unwrap_or_else(|e| panic!("Failed to generate migration for {entity}: {e}"))
}

pub fn test_v1() -> Value {
    json!({
        "id": "Test",
        "properties": {
            "id": { "type": "integer", "primaryKey": true },
            "access": { "type": "integer", "autoIncrement": true },
        },
    })
}

pub fn test_v2() -> Value {
    json!({
        "id": "Test",
        "properties": {
            "id": { "type": "integer", "primaryKey": true, "autoIncrement": true },
            "access": { "enum": ["guest", "user", "admin"] },
        },
    })
}

pub fn change_of<'a>(set: &'a MigrationSet, column: &str) -> &'a ColumnDefinition {
    set.change
        .iter()
        .find_map(|op| match op {
            Operation::ChangeColumn { name, definition, .. } if name == column => Some(definition),
            _ => None,
        })
        .unwrap_or_else(|| panic!("No changeColumn for {column} in {:?}", set.change))
}
