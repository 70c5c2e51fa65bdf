//! End-to-end scenarios: schema snapshots in, migration operations out.

mod common;

use common::{change_of, migrate, registry, test_v1, test_v2};
use relschema_core::prelude::*;
use serde_json::json;

#[test]
fn test_v1_to_v2_changes_enum_and_auto_increment() {
    let set = migrate("Test", &test_v1(), &test_v2());

    assert!(set.up.is_empty(), "unexpected structural ops: {:?}", set.up);
    assert_eq!(set.change.len(), 2);

    let access = change_of(&set, "access");
    assert_eq!(
        access,
        &ColumnDefinition::new(ColumnType::Enum(vec![
            "guest".into(),
            "user".into(),
            "admin".into(),
        ]))
    );

    let id = change_of(&set, "id");
    assert_eq!(id.auto_increment, Some(true));
    assert_eq!(id.column_type, Some(ColumnType::Integer));
    assert_eq!(id.primary_key, Some(true));
    assert_eq!(id.allow_null, Some(false));

    let text = set.render();
    assert!(text.contains("changeColumn('Test', 'access', {\n    type: ENUM('guest', 'user', 'admin'),\n  })"));
    assert!(text.contains("changeColumn('Test', 'id', {\n    type: INTEGER,\n    primaryKey: true,\n    autoIncrement: true,"));
}

#[test]
fn test_v1_to_v2_down_restores_previous_definitions() {
    let set = migrate("Test", &test_v1(), &test_v2());
    assert_eq!(set.down.len(), 2);
    let Operation::ChangeColumn { name, definition, .. } = &set.down[0] else {
        panic!("expected changeColumn, got {:?}", set.down[0]);
    };
    assert_eq!(name, "access");
    assert_eq!(definition.column_type, Some(ColumnType::Integer));
    assert_eq!(definition.auto_increment, Some(true));
}

#[test]
fn test_empty_to_example_creates_and_drops_one_table() {
    let example = json!({ "id": "Example", "properties": { "id": { "type": "integer", "primaryKey": true } } });
    let set = migrate("Example", &json!({}), &example);
    assert_eq!(set.up.len(), 1);
    assert_eq!(set.up[0].kind(), "createTable");
    assert_eq!(set.up[0].table(), "Example");
    assert_eq!(set.down, vec![Operation::drop_table("Example")]);

    let teardown = migrate("Example", &example, &json!({}));
    assert_eq!(teardown.up, vec![Operation::drop_table("Example")]);
    assert_eq!(teardown.down, set.up);
}

#[test]
fn test_role_rename_uses_rename_column() {
    let previous = json!({ "id": "User", "properties": {
        "id": { "type": "integer", "primaryKey": true },
        "role": { "enum": ["guest", "user", "admin"] },
    }});
    let current = json!({ "id": "User", "properties": {
        "id": { "type": "integer", "primaryKey": true },
        "roleType": { "enum": ["guest", "user", "admin"] },
    }});

    let diff = relschema_core::diff::diff(&previous, &current);
    let node = diff.get(&["properties", "roleType"]).unwrap();
    assert_eq!(node.kind, ChangeKind::Renamed);
    assert_eq!(node.prev.as_deref(), Some("role"));

    let set = migrate("User", &previous, &current);
    assert_eq!(set.up, vec![Operation::rename_column("User", "role", "roleType")]);
    assert_eq!(set.down, vec![Operation::rename_column("User", "roleType", "role")]);
    assert!(set.change.is_empty());
}

#[test]
fn test_generation_is_deterministic() {
    let first = migrate("Test", &test_v1(), &test_v2()).render();
    for _ in 0..5 {
        assert_eq!(migrate("Test", &test_v1(), &test_v2()).render(), first);
    }
}

#[test]
fn test_generate_all_against_snapshots() {
    let schemas = [
        json!({ "id": "Role", "properties": { "id": { "type": "integer", "primaryKey": true } } }),
        json!({ "id": "User", "properties": {
            "id": { "type": "integer", "primaryKey": true },
            "role": { "$ref": "Role" },
            "groups": { "type": "array", "items": { "$ref": "Group" }, "through": "UserGroup" },
        }}),
        json!({ "id": "Group", "properties": { "id": { "type": "integer", "primaryKey": true } } }),
    ];
    let registry = registry(&schemas);
    let generator = MigrationGenerator::new(&registry);

    let initial = generator.generate_all(&json!({})).unwrap();
    let created: Vec<&str> = initial.up.iter().map(Operation::table).collect();
    assert_eq!(created, vec!["Role", "User", "Group", "UserGroup"]);
    assert_eq!(initial.down.len(), 4);
    assert_eq!(initial.down[0], Operation::drop_table("UserGroup"));

    let snapshot = registry.snapshot().unwrap();
    assert!(generator.generate_all(&snapshot).unwrap().is_empty());
}

#[test]
fn test_generate_all_drops_and_renames_tables() {
    let previous = json!({
        "Legacy": { "id": "Legacy", "properties": { "id": { "type": "integer" } } },
        "Person": { "id": "Person", "properties": { "name": { "type": "string" } } },
    });
    let registry = registry(&[json!({ "id": "Human", "properties": { "name": { "type": "string" } } })]);
    let set = MigrationGenerator::new(&registry).generate_all(&previous).unwrap();

    assert_eq!(
        set.up,
        vec![
            Operation::rename_table("Person", "Human"),
            Operation::drop_table("Legacy"),
        ]
    );
    assert_eq!(set.down[0].kind(), "createTable");
    assert_eq!(set.down[1], Operation::rename_table("Human", "Person"));
}

#[test]
fn test_rename_detection_can_be_disabled() {
    let previous = json!({ "id": "T", "properties": { "a": { "type": "string" } } });
    let current = json!({ "id": "T", "properties": { "b": { "type": "string" } } });
    let registry = ModelRegistry::new();
    let generator =
        MigrationGenerator::new(&registry).with_options(DiffOptions::new().detect_renames(false));
    let diff = generator.diff(&previous, &current);
    let set = generator.generate("T", &previous, &current, &diff).unwrap();
    assert_eq!(set.up[0], Operation::remove_column("T", "a"));
    assert_eq!(set.up[1].kind(), "addColumn");
}
