//! Database dialect implementations.
//!
//! Each dialect knows how to generate SQL for migration operations
//! specific to that database system.

mod sqlite;

pub use sqlite::SqliteDialect;

use relschema_core::column::{ColumnDefinition, ColumnType};
use relschema_core::operations::Operation;
use serde_json::Value;

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Generates SQL for a migration operation.
    ///
    /// Statements starting with `--` describe operations the dialect cannot
    /// express; runners skip them.
    fn generate_sql(&self, operation: &Operation) -> Vec<String>;

    /// Returns the SQL type name for the given column type.
    fn type_name(&self, column_type: &ColumnType) -> String;

    /// Returns whether this dialect supports changing a column in place.
    fn supports_alter_column(&self) -> bool;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Generates column definition SQL.
    fn column_definition(&self, name: &str, column: &ColumnDefinition) -> String {
        let column_type = column.column_type.as_ref().unwrap_or(&ColumnType::String);
        let mut parts = vec![self.quote_identifier(name), self.type_name(column_type)];

        let primary_key = column.is_primary_key();
        if primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment == Some(true) {
                parts.push(self.auto_increment_keyword().to_string());
            }
        }

        if !column.is_nullable() && !primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.unique == Some(true) && !primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = column.default_value.as_ref().map(|v| self.literal(v)) {
            parts.push(format!("DEFAULT {default}"));
        }

        if let Some(references) = &column.references {
            parts.push(format!(
                "REFERENCES {} ({})",
                self.quote_identifier(&references.model),
                self.quote_identifier(&references.key)
            ));
            if let Some(action) = column.on_delete {
                parts.push(format!("ON DELETE {}", action.to_sql()));
            }
            if let Some(action) = column.on_update {
                parts.push(format!("ON UPDATE {}", action.to_sql()));
            }
        }

        parts.join(" ")
    }

    /// Renders a default value as a SQL literal.
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string().to_uppercase(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.quote_string(s),
            Value::Array(_) | Value::Object(_) => self.quote_string(&value.to_string()),
        }
    }

    /// Quotes a string literal.
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
