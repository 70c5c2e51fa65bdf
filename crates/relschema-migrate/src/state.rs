//! Schema state reconstruction.
//!
//! [`SchemaState`] replays migration operations over an in-memory model of
//! tables and their ordered columns. Replaying `up` and `change` and then
//! `down` must land on a state equivalent to the starting one.

use std::collections::BTreeMap;

use relschema_core::codegen::MigrationSet;
use relschema_core::column::ColumnDefinition;
use relschema_core::operations::{Column, Operation};

use crate::error::{MigrateError, Result};

/// One table of the reconstructed schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TableState {
    /// Table name.
    pub name: String,
    /// Columns in creation order.
    pub columns: Vec<Column>,
}

impl TableState {
    /// Gets a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, table: &str, name: &str) -> Result<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| missing_column(table, name))
    }
}

/// Structural view of a schema: table → column → definition, sorted by name.
pub type Structure = BTreeMap<String, BTreeMap<String, ColumnDefinition>>;

/// Reconstructs database structure by replaying operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaState {
    tables: Vec<TableState>,
}

fn missing_table(name: &str) -> MigrateError {
    MigrateError::InvalidState(format!("Table '{name}' does not exist"))
}

fn missing_column(table: &str, name: &str) -> MigrateError {
    MigrateError::InvalidState(format!(
        "Column '{name}' does not exist in table '{table}'"
    ))
}

impl SchemaState {
    /// Creates a new empty schema state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables in creation order.
    #[must_use]
    pub fn tables(&self) -> &[TableState] {
        &self.tables
    }

    /// Gets a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.tables.iter().find(|t| t.name == name)
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableState> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| missing_table(name))
    }

    /// Applies a single operation to the schema state.
    pub fn apply_operation(&mut self, operation: &Operation) -> Result<()> {
        match operation {
            Operation::CreateTable { name, columns, .. } => {
                if self.table(name).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{name}' already exists"
                    )));
                }
                self.tables.push(TableState {
                    name: name.clone(),
                    columns: columns.clone(),
                });
            }

            Operation::DropTable { name, .. } => {
                let idx = self
                    .tables
                    .iter()
                    .position(|t| t.name == *name)
                    .ok_or_else(|| missing_table(name))?;
                self.tables.remove(idx);
            }

            Operation::RenameTable {
                old_name, new_name, ..
            } => {
                if self.table(new_name).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Table '{new_name}' already exists"
                    )));
                }
                self.table_mut(old_name)?.name = new_name.clone();
            }

            Operation::AddColumn {
                table,
                name,
                definition,
            } => {
                let t = self.table_mut(table)?;
                if t.column(name).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{name}' already exists in table '{table}'"
                    )));
                }
                t.columns.push(Column::new(name.clone(), definition.clone()));
            }

            Operation::RemoveColumn { table, name } => {
                let t = self.table_mut(table)?;
                let idx = t
                    .columns
                    .iter()
                    .position(|c| c.name == *name)
                    .ok_or_else(|| missing_column(table, name))?;
                t.columns.remove(idx);
            }

            Operation::RenameColumn {
                table,
                old_name,
                new_name,
            } => {
                let t = self.table_mut(table)?;
                if t.column(new_name).is_some() {
                    return Err(MigrateError::InvalidState(format!(
                        "Column '{new_name}' already exists in table '{table}'"
                    )));
                }
                t.column_mut(table, old_name)?.name = new_name.clone();
            }

            // The new definition replaces the old one as a whole.
            Operation::ChangeColumn {
                table,
                name,
                definition,
            } => {
                self.table_mut(table)?.column_mut(table, name)?.definition = definition.clone();
            }
        }
        Ok(())
    }

    /// Applies operations in order, stopping at the first failure.
    pub fn apply_all<'a>(&mut self, operations: impl IntoIterator<Item = &'a Operation>) -> Result<()> {
        for operation in operations {
            self.apply_operation(operation)?;
        }
        Ok(())
    }

    /// Applies a migration forward (`up` then `change`).
    pub fn apply_forward(&mut self, set: &MigrationSet) -> Result<()> {
        self.apply_all(set.forward())
    }

    /// Applies a migration backward (`down`).
    pub fn apply_backward(&mut self, set: &MigrationSet) -> Result<()> {
        self.apply_all(&set.down)
    }

    /// Order-insensitive structure of the state. Nullability is spelled out
    /// on every definition, so an implicit `allowNull` equals its default.
    #[must_use]
    pub fn structure(&self) -> Structure {
        self.tables
            .iter()
            .map(|t| {
                let columns = t
                    .columns
                    .iter()
                    .map(|c| {
                        let mut definition = c.definition.clone();
                        definition.allow_null = Some(definition.is_nullable());
                        (c.name.clone(), definition)
                    })
                    .collect();
                (t.name.clone(), columns)
            })
            .collect()
    }

    /// Returns true if both states hold the same tables, columns and
    /// definitions, regardless of order.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.structure() == other.structure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relschema_core::column::ColumnType;

    fn users_table() -> Operation {
        Operation::create_table(
            "users",
            vec![
                Column::new("id", ColumnDefinition::new(ColumnType::Integer).primary_key()),
                Column::new("username", ColumnDefinition::new(ColumnType::String)),
            ],
        )
    }

    #[test]
    fn test_create_table() {
        let mut state = SchemaState::new();
        state.apply_operation(&users_table()).unwrap();

        let table = state.table("users").unwrap();
        assert_eq!(table.columns.len(), 2);
        assert!(table.column("id").unwrap().definition.is_primary_key());
    }

    #[test]
    fn test_create_table_twice_fails() {
        let mut state = SchemaState::new();
        state.apply_operation(&users_table()).unwrap();
        let err = state.apply_operation(&users_table()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid migration state: Table 'users' already exists"
        );
    }

    #[test]
    fn test_column_operations() {
        let mut state = SchemaState::new();
        state
            .apply_all(&[
                users_table(),
                Operation::add_column("users", "email", ColumnDefinition::new(ColumnType::String)),
                Operation::rename_column("users", "username", "login"),
                Operation::remove_column("users", "id"),
            ])
            .unwrap();

        let names: Vec<&str> = state.table("users").unwrap().columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["login", "email"]);
    }

    #[test]
    fn test_change_column_replaces_definition() {
        let mut state = SchemaState::new();
        state.apply_operation(&users_table()).unwrap();
        state
            .apply_operation(&Operation::change_column(
                "users",
                "id",
                ColumnDefinition::new(ColumnType::Integer).auto_increment(),
            ))
            .unwrap();

        let id = &state.table("users").unwrap().column("id").unwrap().definition;
        assert_eq!(id.auto_increment, Some(true));
        assert_eq!(id.primary_key, None);
    }

    #[test]
    fn test_missing_targets_fail() {
        let mut state = SchemaState::new();
        assert!(state.apply_operation(&Operation::drop_table("ghost")).is_err());

        state.apply_operation(&users_table()).unwrap();
        let err = state
            .apply_operation(&Operation::remove_column("users", "ghost"))
            .unwrap_err();
        assert!(err.to_string().contains("Column 'ghost' does not exist in table 'users'"));
    }

    #[test]
    fn test_rename_table_and_equivalence() {
        let mut state = SchemaState::new();
        state.apply_operation(&users_table()).unwrap();
        let before = state.clone();

        state.apply_operation(&Operation::rename_table("users", "accounts")).unwrap();
        assert!(state.table("users").is_none());
        assert!(!state.is_equivalent(&before));

        state.apply_operation(&Operation::rename_table("accounts", "users")).unwrap();
        assert!(state.is_equivalent(&before));
    }

    #[test]
    fn test_implicit_nullability_is_equivalent() {
        let mut implicit = SchemaState::new();
        implicit.apply_operation(&users_table()).unwrap();

        let mut explicit = SchemaState::new();
        explicit
            .apply_operation(&Operation::create_table(
                "users",
                vec![
                    Column::new("username", ColumnDefinition::new(ColumnType::String).allow_null(true)),
                    Column::new(
                        "id",
                        ColumnDefinition::new(ColumnType::Integer).primary_key().allow_null(false),
                    ),
                ],
            ))
            .unwrap();
        assert!(implicit.is_equivalent(&explicit));

        explicit
            .apply_operation(&Operation::change_column(
                "users",
                "username",
                ColumnDefinition::new(ColumnType::String).allow_null(false),
            ))
            .unwrap();
        assert!(!implicit.is_equivalent(&explicit));
    }
}
