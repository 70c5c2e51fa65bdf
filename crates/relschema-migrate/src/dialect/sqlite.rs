//! SQLite dialect for migrations.
//!
//! SQLite cannot change a column in place, so `changeColumn` renders as a
//! comment the runner skips. Virtual columns (association placeholders)
//! never reach the database.

use relschema_core::column::ColumnType;
use relschema_core::operations::{Column, Operation};
use serde_json::Value;

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates SQL for creating a table.
    ///
    /// More than one primary key column becomes a table-level
    /// `PRIMARY KEY (...)` constraint.
    fn create_table_sql(&self, name: &str, columns: &[Column]) -> String {
        let columns: Vec<&Column> = columns.iter().filter(|c| !c.definition.is_virtual()).collect();
        let primary_key: Vec<&str> = columns
            .iter()
            .filter(|c| c.definition.is_primary_key())
            .map(|c| c.name.as_str())
            .collect();
        let composite = primary_key.len() > 1;

        let mut col_defs: Vec<String> = columns
            .iter()
            .map(|c| {
                if composite && c.definition.is_primary_key() {
                    let mut definition = c.definition.clone();
                    definition.allow_null = Some(definition.is_nullable());
                    definition.primary_key = None;
                    definition.auto_increment = None;
                    self.column_definition(&c.name, &definition)
                } else {
                    self.column_definition(&c.name, &c.definition)
                }
            })
            .collect();

        if composite {
            let quoted: Vec<String> = primary_key.iter().map(|c| self.quote_identifier(c)).collect();
            col_defs.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }

        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(name),
            col_defs.join(",\n  ")
        )
    }

    /// Generates SQL for renaming a table.
    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for dropping a column (SQLite 3.35.0+).
    fn drop_column_sql(&self, table: &str, column_name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column_name)
        )
    }

    /// Generates SQL for renaming a column (SQLite 3.25.0+).
    fn rename_column_sql(&self, table: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn generate_sql(&self, operation: &Operation) -> Vec<String> {
        match operation {
            Operation::CreateTable { name, columns, .. } => {
                vec![self.create_table_sql(name, columns)]
            }

            Operation::DropTable { name, .. } => {
                vec![format!("DROP TABLE {}", self.quote_identifier(name))]
            }

            Operation::RenameTable {
                old_name, new_name, ..
            } => vec![self.rename_table_sql(old_name, new_name)],

            Operation::AddColumn {
                table,
                name,
                definition,
            } => {
                if definition.is_virtual() {
                    return Vec::new();
                }
                vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.quote_identifier(table),
                    self.column_definition(name, definition)
                )]
            }

            Operation::RemoveColumn { table, name } => vec![self.drop_column_sql(table, name)],

            Operation::RenameColumn {
                table,
                old_name,
                new_name,
            } => vec![self.rename_column_sql(table, old_name, new_name)],

            Operation::ChangeColumn { table, name, .. } => vec![format!(
                "-- changeColumn not directly supported in SQLite. \
                 Table recreation required for: {table}.{name}"
            )],
        }
    }

    fn type_name(&self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::String
            | ColumnType::Date
            | ColumnType::DateOnly
            | ColumnType::Uuid
            | ColumnType::Json
            | ColumnType::Enum(_)
            | ColumnType::Virtual => "TEXT",
        }
        .to_string()
    }

    fn supports_alter_column(&self) -> bool {
        false
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Bool(b) => u8::from(*b).to_string(),
            Value::Null => "NULL".to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.quote_string(s),
            Value::Array(_) | Value::Object(_) => self.quote_string(&value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relschema_core::column::{ColumnDefinition, ForeignKeyAction};
    use serde_json::json;

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_create_table_simple() {
        let op = Operation::create_table(
            "users",
            vec![
                Column::new(
                    "id",
                    ColumnDefinition::new(ColumnType::Integer)
                        .primary_key()
                        .auto_increment(),
                ),
                Column::new("name", ColumnDefinition::new(ColumnType::String).allow_null(false)),
                Column::new("posts", ColumnDefinition::virtual_column("hasMany Post")),
            ],
        );

        let sql = dialect().generate_sql(&op);
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"users\" (\n  \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n  \"name\" TEXT NOT NULL\n)"
            ]
        );
    }

    #[test]
    fn test_create_table_composite_primary_key() {
        let key = |model: &str| {
            let mut definition = ColumnDefinition::new(ColumnType::Integer)
                .primary_key()
                .references(model, "id");
            definition.allow_null = None;
            definition.on_delete = Some(ForeignKeyAction::Cascade);
            definition
        };
        let op = Operation::create_table(
            "UserGroup",
            vec![Column::new("userId", key("User")), Column::new("groupId", key("Group"))],
        );

        let sql = dialect().generate_sql(&op);
        assert_eq!(
            sql[0],
            "CREATE TABLE \"UserGroup\" (\n  \
             \"userId\" INTEGER NOT NULL REFERENCES \"User\" (\"id\") ON DELETE CASCADE,\n  \
             \"groupId\" INTEGER NOT NULL REFERENCES \"Group\" (\"id\") ON DELETE CASCADE,\n  \
             PRIMARY KEY (\"userId\", \"groupId\")\n)"
        );
    }

    #[test]
    fn test_drop_and_rename_table() {
        assert_eq!(
            dialect().generate_sql(&Operation::drop_table("users")),
            vec!["DROP TABLE \"users\""]
        );
        assert_eq!(
            dialect().generate_sql(&Operation::rename_table("users", "accounts")),
            vec!["ALTER TABLE \"users\" RENAME TO \"accounts\""]
        );
    }

    #[test]
    fn test_add_column() {
        let mut definition = ColumnDefinition::new(ColumnType::String).allow_null(false);
        definition.unique = Some(true);
        let sql = dialect().generate_sql(&Operation::add_column("users", "email", definition));
        assert_eq!(
            sql,
            vec!["ALTER TABLE \"users\" ADD COLUMN \"email\" TEXT NOT NULL UNIQUE"]
        );
    }

    #[test]
    fn test_add_column_with_default() {
        let mut definition = ColumnDefinition::new(ColumnType::Boolean);
        definition.default_value = Some(json!(true));
        let sql = dialect().generate_sql(&Operation::add_column("users", "active", definition));
        assert!(sql[0].ends_with("\"active\" INTEGER DEFAULT 1"));

        let mut definition = ColumnDefinition::new(ColumnType::String);
        definition.default_value = Some(json!("it's"));
        let sql = dialect().generate_sql(&Operation::add_column("users", "motto", definition));
        assert!(sql[0].ends_with("DEFAULT 'it''s'"));
    }

    #[test]
    fn test_foreign_key_column() {
        let mut definition =
            ColumnDefinition::new(ColumnType::Integer).references("Role", "id");
        definition.on_delete = Some(ForeignKeyAction::SetNull);
        definition.on_update = Some(ForeignKeyAction::Cascade);
        let sql = dialect().generate_sql(&Operation::add_column("User", "roleId", definition));
        assert_eq!(
            sql[0],
            "ALTER TABLE \"User\" ADD COLUMN \"roleId\" INTEGER REFERENCES \"Role\" (\"id\") ON DELETE SET NULL ON UPDATE CASCADE"
        );
    }

    #[test]
    fn test_virtual_add_column_is_skipped() {
        let op = Operation::add_column("User", "role", ColumnDefinition::virtual_column("belongsTo Role"));
        assert!(dialect().generate_sql(&op).is_empty());
    }

    #[test]
    fn test_column_operations() {
        assert_eq!(
            dialect().generate_sql(&Operation::remove_column("users", "email")),
            vec!["ALTER TABLE \"users\" DROP COLUMN \"email\""]
        );
        assert_eq!(
            dialect().generate_sql(&Operation::rename_column("users", "role", "roleType")),
            vec!["ALTER TABLE \"users\" RENAME COLUMN \"role\" TO \"roleType\""]
        );
    }

    #[test]
    fn test_change_column_is_a_comment() {
        let op = Operation::change_column("Test", "access", ColumnDefinition::new(ColumnType::String));
        let sql = dialect().generate_sql(&op);
        assert!(sql[0].starts_with("--"));
        assert!(sql[0].contains("Test.access"));
        assert!(!dialect().supports_alter_column());
    }

    #[test]
    fn test_type_names() {
        let d = dialect();
        assert_eq!(d.type_name(&ColumnType::Integer), "INTEGER");
        assert_eq!(d.type_name(&ColumnType::Boolean), "INTEGER");
        assert_eq!(d.type_name(&ColumnType::Float), "REAL");
        assert_eq!(d.type_name(&ColumnType::Enum(vec!["a".into()])), "TEXT");
        assert_eq!(d.type_name(&ColumnType::Date), "TEXT");
    }
}
