//! Migration operations.
//!
//! This module defines the table and column changes a migration can express,
//! along with their reversal and their source-text rendering.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::column::ColumnDefinition;
use crate::literal::{quote, render_column, render_columns, render_object};

/// A named column inside `createTable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column definition.
    pub definition: ColumnDefinition,
}

impl Column {
    /// Creates a new column.
    #[must_use]
    pub fn new(name: impl Into<String>, definition: ColumnDefinition) -> Self {
        Self {
            name: name.into(),
            definition,
        }
    }
}

/// A single migration operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    /// Create a new table.
    CreateTable {
        /// Table name.
        name: String,
        /// Column definitions, in declaration order.
        columns: Vec<Column>,
        /// Table-level options.
        options: Map<String, Value>,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        name: String,
        /// Table-level options.
        options: Map<String, Value>,
    },

    /// Rename a table.
    RenameTable {
        /// Old table name.
        old_name: String,
        /// New table name.
        new_name: String,
        /// Table-level options.
        options: Map<String, Value>,
    },

    /// Add a column to a table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        name: String,
        /// Column definition.
        definition: ColumnDefinition,
    },

    /// Remove a column from a table.
    RemoveColumn {
        /// Table name.
        table: String,
        /// Column name.
        name: String,
    },

    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Old column name.
        old_name: String,
        /// New column name.
        new_name: String,
    },

    /// Change a column's definition.
    ChangeColumn {
        /// Table name.
        table: String,
        /// Column name.
        name: String,
        /// New definition.
        definition: ColumnDefinition,
    },
}

impl Operation {
    /// Creates a `CreateTable` operation.
    #[must_use]
    pub fn create_table(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self::CreateTable {
            name: name.into(),
            columns,
            options: Map::new(),
        }
    }

    /// Creates a `DropTable` operation.
    #[must_use]
    pub fn drop_table(name: impl Into<String>) -> Self {
        Self::DropTable {
            name: name.into(),
            options: Map::new(),
        }
    }

    /// Creates a `RenameTable` operation.
    #[must_use]
    pub fn rename_table(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self::RenameTable {
            old_name: old_name.into(),
            new_name: new_name.into(),
            options: Map::new(),
        }
    }

    /// Creates an `AddColumn` operation.
    #[must_use]
    pub fn add_column(
        table: impl Into<String>,
        name: impl Into<String>,
        definition: ColumnDefinition,
    ) -> Self {
        Self::AddColumn {
            table: table.into(),
            name: name.into(),
            definition,
        }
    }

    /// Creates a `RemoveColumn` operation.
    #[must_use]
    pub fn remove_column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::RemoveColumn {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Creates a `RenameColumn` operation.
    #[must_use]
    pub fn rename_column(
        table: impl Into<String>,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self::RenameColumn {
            table: table.into(),
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    /// Creates a `ChangeColumn` operation.
    #[must_use]
    pub fn change_column(
        table: impl Into<String>,
        name: impl Into<String>,
        definition: ColumnDefinition,
    ) -> Self {
        Self::ChangeColumn {
            table: table.into(),
            name: name.into(),
            definition,
        }
    }

    /// Attaches table-level options. Ignored by column operations.
    #[must_use]
    pub fn with_options(mut self, table_options: Map<String, Value>) -> Self {
        match &mut self {
            Self::CreateTable { options, .. }
            | Self::DropTable { options, .. }
            | Self::RenameTable { options, .. } => *options = table_options,
            _ => {}
        }
        self
    }

    /// Operation name as written in migration source.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CreateTable { .. } => "createTable",
            Self::DropTable { .. } => "dropTable",
            Self::RenameTable { .. } => "renameTable",
            Self::AddColumn { .. } => "addColumn",
            Self::RemoveColumn { .. } => "removeColumn",
            Self::RenameColumn { .. } => "renameColumn",
            Self::ChangeColumn { .. } => "changeColumn",
        }
    }

    /// Table the operation applies to (the new name for renames).
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { name, .. } | Self::DropTable { name, .. } => name,
            Self::RenameTable { new_name, .. } => new_name,
            Self::AddColumn { table, .. }
            | Self::RemoveColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::ChangeColumn { table, .. } => table,
        }
    }

    /// Returns the reverse operation for rollback.
    ///
    /// Returns `None` when reversal needs a previous definition the
    /// operation does not carry (`dropTable`, `removeColumn`, `changeColumn`).
    #[must_use]
    pub fn reverse(&self) -> Option<Self> {
        match self {
            Self::CreateTable { name, options, .. } => {
                Some(Self::drop_table(name.clone()).with_options(options.clone()))
            }
            Self::RenameTable {
                old_name,
                new_name,
                options,
            } => Some(
                Self::rename_table(new_name.clone(), old_name.clone()).with_options(options.clone()),
            ),
            Self::AddColumn { table, name, .. } => {
                Some(Self::remove_column(table.clone(), name.clone()))
            }
            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => Some(Self::rename_column(
                table.clone(),
                new_name.clone(),
                old_name.clone(),
            )),
            Self::DropTable { .. } | Self::RemoveColumn { .. } | Self::ChangeColumn { .. } => None,
        }
    }

    /// Returns true if [`Operation::reverse`] can produce an inverse.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.reverse().is_some()
    }

    /// Returns a human-readable description of the operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { name, columns, .. } => {
                format!("Create table {name} ({} columns)", columns.len())
            }
            Self::DropTable { name, .. } => format!("Drop table {name}"),
            Self::RenameTable {
                old_name, new_name, ..
            } => format!("Rename table {old_name} to {new_name}"),
            Self::AddColumn { table, name, .. } => format!("Add column {name} to {table}"),
            Self::RemoveColumn { table, name } => format!("Remove column {name} from {table}"),
            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => format!("Rename column {old_name} to {new_name} on {table}"),
            Self::ChangeColumn { table, name, .. } => format!("Change column {name} on {table}"),
        }
    }

    /// Renders the operation as a call expression. `indent` is the column of
    /// the line the call starts on.
    #[must_use]
    pub fn render(&self, indent: usize) -> String {
        let kind = self.kind();
        match self {
            Self::CreateTable {
                name,
                columns,
                options,
            } => {
                let columns = columns
                    .iter()
                    .map(|c| (c.name.as_str(), c.definition.to_map()));
                format!(
                    "{kind}({}, {}, {})",
                    quote(name),
                    render_columns(columns, indent),
                    render_object(options, indent)
                )
            }
            Self::DropTable { name, options } => {
                format!("{kind}({}, {})", quote(name), render_object(options, indent))
            }
            Self::RenameTable {
                old_name,
                new_name,
                options,
            } => format!(
                "{kind}({}, {}, {})",
                quote(old_name),
                quote(new_name),
                render_object(options, indent)
            ),
            Self::AddColumn {
                table,
                name,
                definition,
            }
            | Self::ChangeColumn {
                table,
                name,
                definition,
            } => format!(
                "{kind}({}, {}, {})",
                quote(table),
                quote(name),
                render_column(&definition.to_map(), indent)
            ),
            Self::RemoveColumn { table, name } => {
                format!("{kind}({}, {})", quote(table), quote(name))
            }
            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => format!(
                "{kind}({}, {}, {})",
                quote(table),
                quote(old_name),
                quote(new_name)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    #[test]
    fn test_create_table_reverse() {
        let op = Operation::create_table(
            "users",
            vec![Column::new(
                "id",
                ColumnDefinition::new(ColumnType::Integer).primary_key(),
            )],
        );
        assert_eq!(op.reverse(), Some(Operation::drop_table("users")));
    }

    #[test]
    fn test_rename_reverses_swap_names() {
        let op = Operation::rename_table("old", "new");
        assert_eq!(op.reverse(), Some(Operation::rename_table("new", "old")));

        let op = Operation::rename_column("users", "role", "roleType");
        assert_eq!(
            op.reverse(),
            Some(Operation::rename_column("users", "roleType", "role"))
        );
    }

    #[test]
    fn test_drop_table_not_reversible() {
        assert!(!Operation::drop_table("users").is_reversible());
        assert!(!Operation::remove_column("users", "name").is_reversible());
        assert!(Operation::add_column("users", "name", ColumnDefinition::default()).is_reversible());
    }

    #[test]
    fn test_render_create_table() {
        let op = Operation::create_table(
            "Example",
            vec![Column::new(
                "id",
                ColumnDefinition::new(ColumnType::Integer).primary_key(),
            )],
        );
        assert_eq!(
            op.render(2),
            "createTable('Example', {\n    id: {\n      type: INTEGER,\n      primaryKey: true,\n      allowNull: false,\n    },\n  }, {})"
        );
    }

    #[test]
    fn test_render_column_operations() {
        let op = Operation::change_column(
            "Test",
            "access",
            ColumnDefinition::new(ColumnType::Enum(vec!["guest".into(), "user".into()])),
        );
        assert_eq!(
            op.render(2),
            "changeColumn('Test', 'access', {\n    type: ENUM('guest', 'user'),\n  })"
        );
        assert_eq!(
            Operation::rename_column("Test", "role", "roleType").render(2),
            "renameColumn('Test', 'role', 'roleType')"
        );
        assert_eq!(Operation::drop_table("Test").render(2), "dropTable('Test', {})");
    }

    #[test]
    fn test_description() {
        assert_eq!(
            Operation::remove_column("users", "email").description(),
            "Remove column email from users"
        );
    }
}
