//! Record storage.
//!
//! [`Store`] is the seam between resource actions and a backing database.
//! [`MemoryStore`] keeps rows in process and evaluates [`ReadOptions`]
//! directly, including nested includes.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use relschema_core::registry::AssociationKind;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ResourceError, Result};
use crate::options::{Include, ReadOptions};

/// A row, keyed by column name.
pub type Record = Map<String, Value>;

/// Storage backend for resource actions.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// Returns the records matching `options`, with includes attached under
    /// their aliases.
    async fn find_all(&self, options: &ReadOptions) -> Result<Vec<Record>>;

    /// Inserts a record and returns it as stored, primary key included.
    async fn insert(&self, model: &str, primary_key: &str, data: Record) -> Result<Record>;

    /// Merges `data` into the record whose primary key equals `key`.
    async fn update(&self, model: &str, primary_key: &str, key: &Value, data: Record)
        -> Result<Record>;

    /// Deletes the record whose primary key equals `key`, returning the
    /// number of rows removed.
    async fn delete(&self, model: &str, primary_key: &str, key: &Value) -> Result<u64>;

    /// Inserts a join table row. Linking an already linked pair is a no-op.
    async fn link(&self, through: &str, row: Record) -> Result<()>;
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    sequences: HashMap<String, u64>,
}

/// In-process store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every row of a table, in insertion order.
    pub fn rows(&self, model: &str) -> Result<Vec<Record>> {
        Ok(self.lock()?.rows.get(model).cloned().unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| ResourceError::Store("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    async fn find_all(&self, options: &ReadOptions) -> Result<Vec<Record>> {
        let tables = self.lock()?;
        let candidates = tables.rows.get(&options.model).cloned().unwrap_or_default();
        Ok(select(&tables, options, candidates))
    }

    async fn insert(&self, model: &str, primary_key: &str, mut data: Record) -> Result<Record> {
        let mut tables = self.lock()?;
        let Tables { rows, sequences } = &mut *tables;
        let rows = rows.entry(model.to_string()).or_default();

        match data.get(primary_key).filter(|v| !v.is_null()) {
            Some(key) => {
                if rows.iter().any(|row| row.get(primary_key) == Some(key)) {
                    return Err(ResourceError::Store(format!(
                        "duplicate key {key} for {model}.{primary_key}"
                    )));
                }
                if let Some(n) = key.as_u64() {
                    let sequence = sequences.entry(model.to_string()).or_default();
                    *sequence = (*sequence).max(n);
                }
            }
            None => {
                let sequence = sequences.entry(model.to_string()).or_default();
                *sequence += 1;
                data.insert(primary_key.to_string(), Value::from(*sequence));
            }
        }

        debug!(model = %model, key = %data[primary_key], "Inserted record");
        rows.push(data.clone());
        Ok(data)
    }

    async fn update(
        &self,
        model: &str,
        primary_key: &str,
        key: &Value,
        data: Record,
    ) -> Result<Record> {
        let mut tables = self.lock()?;
        let row = tables
            .rows
            .get_mut(model)
            .and_then(|rows| rows.iter_mut().find(|row| row.get(primary_key) == Some(key)))
            .ok_or_else(|| ResourceError::NotFound {
                model: model.to_string(),
            })?;
        for (column, value) in data {
            row.insert(column, value);
        }
        debug!(model = %model, key = %key, "Updated record");
        Ok(row.clone())
    }

    async fn delete(&self, model: &str, primary_key: &str, key: &Value) -> Result<u64> {
        let mut tables = self.lock()?;
        let Some(rows) = tables.rows.get_mut(model) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| row.get(primary_key) != Some(key));
        Ok((before - rows.len()) as u64)
    }

    async fn link(&self, through: &str, row: Record) -> Result<()> {
        let mut tables = self.lock()?;
        let rows = tables.rows.entry(through.to_string()).or_default();
        if !rows.contains(&row) {
            rows.push(row);
        }
        Ok(())
    }
}

fn matches(row: &Record, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(column, expected)| {
        let actual = row.get(column).unwrap_or(&Value::Null);
        match expected {
            Value::Array(any) => any.contains(actual),
            other => other == actual,
        }
    })
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn select(tables: &Tables, options: &ReadOptions, candidates: Vec<Record>) -> Vec<Record> {
    let mut rows: Vec<Record> = candidates
        .into_iter()
        .filter(|row| matches(row, &options.filter))
        .collect();

    if !options.order.is_empty() {
        rows.sort_by(|a, b| {
            options
                .order
                .iter()
                .map(|order| {
                    order.direction.apply(compare(
                        a.get(&order.column).unwrap_or(&Value::Null),
                        b.get(&order.column).unwrap_or(&Value::Null),
                    ))
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }

    let rows = rows
        .into_iter()
        .skip(options.offset.unwrap_or(0))
        .take(options.limit.unwrap_or(usize::MAX));

    rows.map(|mut row| {
        for include in &options.include {
            let related = related(tables, include, &row);
            row.insert(include.alias().to_string(), related);
        }
        if let Some(attributes) = options.attributes.as_ref().filter(|a| !a.is_empty()) {
            row.retain(|column, _| {
                attributes.contains(column) || options.include(column).is_some()
            });
        }
        row
    })
    .collect()
}

fn related(tables: &Tables, include: &Include, row: &Record) -> Value {
    let association = &include.association;
    let table = |name: &str| tables.rows.get(name).cloned().unwrap_or_default();
    let value_of = |record: &Record, column: &str| record.get(column).cloned().unwrap_or(Value::Null);

    let candidates: Vec<Record> = match association.kind {
        AssociationKind::BelongsTo => {
            let key = value_of(row, &association.foreign_key);
            table(&association.target)
                .into_iter()
                .filter(|r| !key.is_null() && r.get(&association.target_key) == Some(&key))
                .collect()
        }
        AssociationKind::HasOne | AssociationKind::HasMany => {
            let key = value_of(row, &association.source_key);
            table(&association.target)
                .into_iter()
                .filter(|r| r.get(&association.foreign_key) == Some(&key))
                .collect()
        }
        AssociationKind::BelongsToMany => {
            let key = value_of(row, &association.source_key);
            let (Some(through), Some(other_key)) = (&association.through, &association.other_key)
            else {
                return Value::Array(Vec::new());
            };
            let linked: Vec<Value> = table(through)
                .into_iter()
                .filter(|link| link.get(&association.foreign_key) == Some(&key))
                .map(|link| value_of(&link, other_key))
                .collect();
            table(&association.target)
                .into_iter()
                .filter(|r| r.get(&association.target_key).is_some_and(|k| linked.contains(k)))
                .collect()
        }
    };

    let selected = select(tables, &include.options, candidates);
    if association.kind.is_plural() {
        Value::Array(selected.into_iter().map(Value::Object).collect())
    } else {
        selected.into_iter().next().map_or(Value::Null, Value::Object)
    }
}
