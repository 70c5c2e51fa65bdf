//! Write planning.
//!
//! A write payload mixes the model's own columns with nested records keyed
//! by association alias. [`plan_write`] splits the two so the parent row can
//! be stored first and each nested record written afterwards with the
//! parent's keys in hand.

use relschema_core::registry::{Association, AssociationKind, ModelRegistry};
use serde_json::{Map, Value};

use crate::error::{ResourceError, Result};

/// How a nested record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// Insert a new record.
    Create,
    /// Update the existing record named by its primary key.
    Update,
}

/// A planned write of one record and its nested records.
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub model: String,
    pub primary_key: String,
    /// Own column values.
    pub data: Map<String, Value>,
    /// Nested records, in payload order.
    pub children: Vec<ChildTask>,
}

impl WritePlan {
    /// The record's primary key value, when present and not null.
    #[must_use]
    pub fn key(&self) -> Option<&Value> {
        self.data.get(&self.primary_key).filter(|v| !v.is_null())
    }

    /// Action implied by the payload: update when the key is given.
    #[must_use]
    pub fn action(&self) -> WriteAction {
        if self.key().is_some() {
            WriteAction::Update
        } else {
            WriteAction::Create
        }
    }
}

/// A nested record written after its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildTask {
    pub association: Association,
    pub action: WriteAction,
    pub plan: WritePlan,
}

impl ChildTask {
    /// Copies the parent's key into the child's foreign key column for
    /// `hasOne` and `hasMany` associations.
    pub fn bind(&mut self, parent: &Map<String, Value>) {
        if !matches!(
            self.association.kind,
            AssociationKind::HasOne | AssociationKind::HasMany
        ) {
            return;
        }
        if let Some(key) = parent.get(&self.association.source_key) {
            self.plan
                .data
                .insert(self.association.foreign_key.clone(), key.clone());
        }
    }
}

/// Splits a write payload for `model` into own data and nested tasks.
///
/// An array under an association alias fans out to one task per element;
/// a null value is skipped.
///
/// # Errors
///
/// [`ResourceError::InvalidPayload`] when the payload or a nested record is
/// not an object.
pub fn plan_write(registry: &ModelRegistry, model: &str, data: &Value) -> Result<WritePlan> {
    let entity = registry.model(model)?;
    let Value::Object(payload) = data else {
        return Err(ResourceError::InvalidPayload(format!(
            "{model} payload must be an object, got {data}"
        )));
    };

    let mut plan = WritePlan {
        model: model.to_string(),
        primary_key: entity.primary_key.clone(),
        data: Map::new(),
        children: Vec::new(),
    };

    for (key, value) in payload {
        let Some(association) = registry.find_association(model, key) else {
            plan.data.insert(key.clone(), value.clone());
            continue;
        };
        let records = match value {
            Value::Null => continue,
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for record in records {
            if record.is_null() {
                continue;
            }
            if !record.is_object() {
                return Err(ResourceError::InvalidPayload(format!(
                    "{model}.{key} must hold records, got {record}"
                )));
            }
            let child = plan_write(registry, &association.target, record)?;
            plan.children.push(ChildTask {
                association: association.clone(),
                action: child.action(),
                plan: child,
            });
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register_all(&[
                json!({ "id": "User", "properties": {
                    "id": { "type": "integer", "primaryKey": true },
                    "name": { "type": "string" },
                    "profile": { "$ref": "Profile", "hasOne": true },
                    "posts": { "type": "array", "items": { "$ref": "Post" } },
                }}),
                json!({ "id": "Profile", "properties": {
                    "id": { "type": "integer", "primaryKey": true },
                    "bio": { "type": "string" },
                }}),
                json!({ "id": "Post", "properties": {
                    "id": { "type": "integer", "primaryKey": true },
                    "title": { "type": "string" },
                }}),
            ])
            .unwrap();
        registry.resolve_associations().unwrap();
        registry
    }

    #[test]
    fn test_split_own_data_and_children() {
        let payload = json!({
            "name": "alice",
            "profile": { "bio": "hi" },
            "posts": [{ "title": "one" }, null, { "id": 7, "title": "two" }],
        });
        let plan = plan_write(&registry(), "User", &payload).unwrap();

        assert_eq!(plan.data, json!({ "name": "alice" }).as_object().cloned().unwrap());
        assert_eq!(plan.action(), WriteAction::Create);
        assert_eq!(plan.children.len(), 3);

        let kinds: Vec<_> = plan
            .children
            .iter()
            .map(|c| (c.association.alias.as_str(), c.action))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("profile", WriteAction::Create),
                ("posts", WriteAction::Create),
                ("posts", WriteAction::Update),
            ]
        );
    }

    #[test]
    fn test_bind_sets_foreign_key() {
        let plan = plan_write(&registry(), "User", &json!({ "posts": [{ "title": "x" }] })).unwrap();
        let mut task = plan.children[0].clone();
        let parent = json!({ "id": 3, "name": "bob" });
        task.bind(parent.as_object().unwrap());
        assert_eq!(task.plan.data["userId"], json!(3));
    }

    #[test]
    fn test_null_association_is_skipped() {
        let plan = plan_write(&registry(), "User", &json!({ "id": 1, "profile": null })).unwrap();
        assert!(plan.children.is_empty());
        assert_eq!(plan.action(), WriteAction::Update);
    }

    #[test]
    fn test_scalar_association_value_is_rejected() {
        let err = plan_write(&registry(), "User", &json!({ "posts": [1, 2] })).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidPayload(_)));
        let err = plan_write(&registry(), "User", &json!("alice")).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidPayload(_)));
    }
}
