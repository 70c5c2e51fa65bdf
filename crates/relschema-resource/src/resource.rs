//! Resource actions over one model.

use std::sync::Arc;

use futures::future::{join_all, LocalBoxFuture};
use futures::FutureExt;
use relschema_core::registry::{Association, AssociationKind, ModelRegistry};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ResourceError, Result};
use crate::options::{build_read_options, ReadOptions};
use crate::store::{Record, Store};
use crate::write::{plan_write, ChildTask, WriteAction, WritePlan};

/// CRUD actions for one model, with nested association reads and writes.
#[derive(Debug)]
pub struct Resource<S> {
    registry: Arc<ModelRegistry>,
    store: S,
    model: String,
}

struct ChildOutcome {
    association: Association,
    record: Record,
}

impl<S: Store> Resource<S> {
    /// Creates a resource for a registered model.
    pub fn new(registry: Arc<ModelRegistry>, store: S, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        registry.model(&model)?;
        Ok(Self {
            registry,
            store,
            model,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates a read payload for this model.
    pub fn read_options(&self, payload: &Value) -> Result<ReadOptions> {
        build_read_options(&self.registry, &self.model, payload)
    }

    /// Returns every record matching the payload.
    pub async fn find_all(&self, payload: &Value) -> Result<Vec<Value>> {
        let options = self.read_options(payload)?;
        let rows = self.store.find_all(&options).await?;
        debug!(model = %self.model, count = rows.len(), "Found records");
        Ok(rows.into_iter().map(Value::Object).collect())
    }

    /// Returns the first record matching the payload.
    pub async fn find_one(&self, payload: &Value) -> Result<Value> {
        let mut options = self.read_options(payload)?;
        options.limit = Some(1);
        self.store
            .find_all(&options)
            .await?
            .into_iter()
            .next()
            .map(Value::Object)
            .ok_or_else(|| self.not_found())
    }

    /// Returns the record with the given primary key.
    pub async fn find_by_key(&self, key: &Value, payload: &Value) -> Result<Value> {
        let mut options = self.read_options(payload)?;
        options
            .filter
            .insert(options.primary_key.clone(), key.clone());
        options.limit = Some(1);
        self.store
            .find_all(&options)
            .await?
            .into_iter()
            .next()
            .map(Value::Object)
            .ok_or_else(|| self.not_found())
    }

    /// Creates a record and its nested records.
    ///
    /// The parent is stored first. Nested records are then written
    /// concurrently; when one fails the parent stays committed and the error
    /// is [`ResourceError::PartialWrite`].
    pub async fn create(&self, data: &Value) -> Result<Value> {
        let plan = plan_write(&self.registry, &self.model, data)?;
        let record = self.write(plan, WriteAction::Create).await?;
        info!(model = %self.model, "Created record");
        Ok(Value::Object(record))
    }

    /// Updates the record with the given primary key and writes nested
    /// records the same way [`Resource::create`] does.
    pub async fn update(&self, key: &Value, data: &Value) -> Result<Value> {
        let mut plan = plan_write(&self.registry, &self.model, data)?;
        plan.data.insert(plan.primary_key.clone(), key.clone());
        let record = self.write(plan, WriteAction::Update).await?;
        info!(model = %self.model, key = %key, "Updated record");
        Ok(Value::Object(record))
    }

    /// Deletes the record with the given primary key.
    pub async fn destroy(&self, key: &Value) -> Result<()> {
        let primary_key = &self.registry.model(&self.model)?.primary_key;
        match self.store.delete(&self.model, primary_key, key).await? {
            0 => Err(self.not_found()),
            _ => {
                info!(model = %self.model, key = %key, "Destroyed record");
                Ok(())
            }
        }
    }

    fn not_found(&self) -> ResourceError {
        ResourceError::NotFound {
            model: self.model.clone(),
        }
    }

    fn write(&self, plan: WritePlan, action: WriteAction) -> LocalBoxFuture<'_, Result<Record>> {
        self.write_record(plan, action).boxed_local()
    }

    async fn write_record(&self, plan: WritePlan, action: WriteAction) -> Result<Record> {
        let WritePlan {
            model,
            primary_key,
            mut data,
            children,
        } = plan;

        let mut record = match action {
            WriteAction::Create => self.store.insert(&model, &primary_key, data).await?,
            WriteAction::Update => {
                let key = data
                    .remove(&primary_key)
                    .filter(|k| !k.is_null())
                    .ok_or_else(|| {
                        ResourceError::InvalidPayload(format!("{model} update needs {primary_key}"))
                    })?;
                self.store.update(&model, &primary_key, &key, data).await?
            }
        };
        if children.is_empty() {
            return Ok(record);
        }

        let tasks = children.into_iter().map(|mut task| {
            task.bind(&record);
            let parent_key = record
                .get(&task.association.source_key)
                .cloned()
                .unwrap_or(Value::Null);
            self.write_child(task, parent_key)
        });
        let outcomes = match join_all(tasks).await.into_iter().collect::<Result<Vec<_>>>() {
            Ok(outcomes) => outcomes,
            Err(source) => return Err(partial(&model, record, source)),
        };

        for outcome in outcomes {
            let association = &outcome.association;
            if association.kind == AssociationKind::BelongsTo {
                let target_key = outcome
                    .record
                    .get(&association.target_key)
                    .cloned()
                    .unwrap_or(Value::Null);
                let key = record.get(&primary_key).cloned().unwrap_or(Value::Null);
                let mut link = Map::new();
                link.insert(association.foreign_key.clone(), target_key.clone());
                if let Err(source) = self.store.update(&model, &primary_key, &key, link).await {
                    return Err(partial(&model, record, source));
                }
                record.insert(association.foreign_key.clone(), target_key);
            }
            attach(&mut record, association, outcome.record);
        }
        Ok(record)
    }

    async fn write_child(&self, task: ChildTask, parent_key: Value) -> Result<ChildOutcome> {
        let ChildTask {
            association,
            action,
            plan,
        } = task;
        let record = self.write(plan, action).await?;

        if association.kind == AssociationKind::BelongsToMany {
            let (Some(through), Some(other_key)) = (&association.through, &association.other_key)
            else {
                return Err(ResourceError::InvalidPayload(format!(
                    "{}.{} has no join table",
                    association.source, association.alias
                )));
            };
            let mut link = Map::new();
            link.insert(association.foreign_key.clone(), parent_key);
            link.insert(
                other_key.clone(),
                record.get(&association.target_key).cloned().unwrap_or(Value::Null),
            );
            self.store.link(through, link).await?;
        }
        Ok(ChildOutcome {
            association,
            record,
        })
    }
}

fn partial(model: &str, parent: Record, source: ResourceError) -> ResourceError {
    warn!(model = %model, error = %source, "Nested write failed after parent was saved");
    ResourceError::PartialWrite {
        parent: Value::Object(parent),
        source: Box::new(source),
    }
}

fn attach(record: &mut Record, association: &Association, child: Record) {
    let alias = association.alias.clone();
    if association.kind.is_plural() {
        let entry = record
            .entry(alias)
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => items.push(Value::Object(child)),
            other => *other = Value::Array(vec![Value::Object(child)]),
        }
    } else {
        record.insert(alias, Value::Object(child));
    }
}
