//! Diff engine for comparing desired attributes against recorded state.
//!
//! Desired values may still be unknown during planning (they reference an
//! attribute that only exists after a dependency has been applied). An
//! unknown value always counts as a change.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::model::{AttributePath, Attributes};
use crate::provider::ResourceSchema;
use crate::state::StateEntry;

use super::plan::PlannedAction;

/// Desired attributes after evaluation; `None` marks a value known only after apply.
pub type DesiredAttributes = BTreeMap<String, Option<Value>>;

/// A single leaf-level attribute difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    /// Path of the changed value.
    pub path: AttributePath,
    /// Recorded value, `None` if the attribute was absent.
    pub old: Option<Value>,
    /// Desired value, `None` if known only after apply. Removed attributes
    /// are represented as `null`.
    pub new: Option<Value>,
}

/// Raw differ output, before lifecycle policy is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDiff {
    /// Action implied by the changes alone.
    pub action: PlannedAction,
    /// Every detected change.
    pub changes: Vec<AttributeChange>,
}

/// Engine for computing attribute diffs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the raw diff for one resource.
    ///
    /// `desired` is `None` for a resource that has left the model, `recorded`
    /// is `None` for a resource that was never applied.
    #[must_use]
    pub fn diff(
        &self,
        desired: Option<&DesiredAttributes>,
        recorded: Option<&StateEntry>,
        schema: &ResourceSchema,
    ) -> RawDiff {
        match (desired, recorded) {
            (Some(desired), None) => RawDiff {
                action: PlannedAction::Create,
                changes: desired
                    .iter()
                    .map(|(name, value)| AttributeChange {
                        path: AttributePath::root(name.clone()),
                        old: None,
                        new: value.clone(),
                    })
                    .collect(),
            },
            (None, Some(_)) => RawDiff {
                action: PlannedAction::Destroy,
                changes: Vec::new(),
            },
            (None, None) => RawDiff {
                action: PlannedAction::NoOp,
                changes: Vec::new(),
            },
            (Some(desired), Some(entry)) => {
                let changes = self.changes(desired, entry);
                RawDiff {
                    action: Self::classify(&changes, schema),
                    changes,
                }
            }
        }
    }

    /// Lists leaf changes between desired attributes and a recorded entry.
    ///
    /// Compared keys are the desired keys plus the keys last applied, so
    /// an attribute removed from the model shows up as a change to `null`.
    #[must_use]
    pub fn changes(&self, desired: &DesiredAttributes, entry: &StateEntry) -> Vec<AttributeChange> {
        let names: BTreeSet<&String> = desired.keys().chain(entry.inputs.keys()).collect();
        let mut changes = Vec::new();

        for name in names {
            let old = entry.recorded(name);
            let new = match desired.get(name.as_str()) {
                Some(value) => value.as_ref(),
                None => Some(&Value::Null),
            };
            compare(&AttributePath::root(name.clone()), old, new, &mut changes);
        }

        changes
    }

    /// Classifies changes against the provider's capabilities.
    ///
    /// No changes means `NoOp`; any change outside the updatable set means
    /// `Replace`, even when other changes could be applied in place.
    #[must_use]
    pub fn classify(changes: &[AttributeChange], schema: &ResourceSchema) -> PlannedAction {
        if changes.is_empty() {
            return PlannedAction::NoOp;
        }

        if let Some(blocking) = changes.iter().find(|c| !schema.is_updatable(&c.path)) {
            debug!("{} cannot be updated in place", blocking.path);
            return PlannedAction::Replace { create_first: false };
        }

        PlannedAction::UpdateInPlace(changes.to_vec())
    }
}

fn compare(path: &AttributePath, old: Option<&Value>, new: Option<&Value>, out: &mut Vec<AttributeChange>) {
    let Some(new) = new else {
        out.push(AttributeChange {
            path: path.clone(),
            old: old.cloned(),
            new: None,
        });
        return;
    };

    if let (Some(Value::Object(old_map)), Value::Object(new_map)) = (old, new) {
        let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
        for key in keys {
            compare(
                &path.child(key.clone()),
                old_map.get(key.as_str()),
                Some(new_map.get(key.as_str()).unwrap_or(&Value::Null)),
                out,
            );
        }
        return;
    }

    if old.unwrap_or(&Value::Null) != new {
        out.push(AttributeChange {
            path: path.clone(),
            old: old.cloned(),
            new: Some(new.clone()),
        });
    }
}

/// Converts fully known attributes to desired attributes.
#[must_use]
pub fn known(attributes: &Attributes) -> DesiredAttributes {
    attributes
        .iter()
        .map(|(k, v)| (k.clone(), Some(v.clone())))
        .collect()
}

impl AttributeChange {
    /// Returns true if the new value is only known after apply.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.new.is_none()
    }
}

impl fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let old = self.old.as_ref().map_or_else(|| String::from("(absent)"), Value::to_string);
        let new = self
            .new
            .as_ref()
            .map_or_else(|| String::from("(known after apply)"), Value::to_string);
        write!(f, "{}: {old} -> {new}", self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(attributes: Attributes) -> StateEntry {
        let inputs = attributes.clone();
        StateEntry::new("x_thing", "id-1", attributes).applied_with(inputs, vec![], Default::default())
    }

    fn desired(pairs: &[(&str, Option<Value>)]) -> DesiredAttributes {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    fn path(s: &str) -> AttributePath {
        s.parse().unwrap()
    }

    #[test]
    fn test_absent_entry_is_create() {
        let diff = DiffEngine::new().diff(
            Some(&desired(&[("name", Some(json!("a")))])),
            None,
            &ResourceSchema::default(),
        );
        assert_eq!(diff.action, PlannedAction::Create);
        assert_eq!(diff.changes.len(), 1);
    }

    #[test]
    fn test_identical_attributes_are_noop() {
        let recorded = entry([(String::from("name"), json!("a"))].into());
        let diff = DiffEngine::new().diff(
            Some(&desired(&[("name", Some(json!("a")))])),
            Some(&recorded),
            &ResourceSchema::default(),
        );
        assert_eq!(diff.action, PlannedAction::NoOp);
        assert!(diff.changes.is_empty());
    }

    #[test]
    fn test_computed_attributes_are_not_compared() {
        let mut recorded = entry([(String::from("name"), json!("a"))].into());
        recorded.attributes.insert(String::from("arn"), json!("arn:x"));

        let changes = DiffEngine::new().changes(&desired(&[("name", Some(json!("a")))]), &recorded);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_nested_maps_yield_leaf_paths() {
        let recorded = entry([(String::from("tags"), json!({"Name": "a", "Env": "dev"}))].into());
        let changes = DiffEngine::new().changes(
            &desired(&[("tags", Some(json!({"Name": "b", "Env": "dev", "Team": "x"})))]),
            &recorded,
        );

        let paths: Vec<String> = changes.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(paths, vec!["tags.Name", "tags.Team"]);
        assert_eq!(changes[1].old, None);
    }

    #[test]
    fn test_removed_attribute_becomes_null() {
        let recorded = entry([
            (String::from("name"), json!("a")),
            (String::from("description"), json!("old")),
        ]
        .into());
        let changes = DiffEngine::new().changes(&desired(&[("name", Some(json!("a")))]), &recorded);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, path("description"));
        assert_eq!(changes[0].new, Some(Value::Null));
    }

    #[test]
    fn test_unknown_value_is_always_a_change() {
        let recorded = entry([(String::from("vpc_id"), json!("vpc-1"))].into());
        let changes = DiffEngine::new().changes(&desired(&[("vpc_id", None)]), &recorded);

        assert_eq!(changes.len(), 1);
        assert!(changes[0].is_unknown());
        assert_eq!(changes[0].to_string(), "vpc_id: \"vpc-1\" -> (known after apply)");
    }

    #[test]
    fn test_replace_wins_over_update() {
        let schema = ResourceSchema::replace_only_by_default().with_updatable(path("tags"));
        let recorded = entry([
            (String::from("tags"), json!({"Name": "a"})),
            (String::from("instance_type"), json!("t3.micro")),
        ]
        .into());

        let only_tags = DiffEngine::new().diff(
            Some(&desired(&[
                ("tags", Some(json!({"Name": "b"}))),
                ("instance_type", Some(json!("t3.micro"))),
            ])),
            Some(&recorded),
            &schema,
        );
        assert!(matches!(only_tags.action, PlannedAction::UpdateInPlace(ref c) if c.len() == 1));

        let both = DiffEngine::new().diff(
            Some(&desired(&[
                ("tags", Some(json!({"Name": "b"}))),
                ("instance_type", Some(json!("t3.large"))),
            ])),
            Some(&recorded),
            &schema,
        );
        assert_eq!(both.action, PlannedAction::Replace { create_first: false });
        assert_eq!(both.changes.len(), 2);
    }

    #[test]
    fn test_removed_from_model_is_destroy() {
        let recorded = entry(Attributes::new());
        let diff = DiffEngine::new().diff(None, Some(&recorded), &ResourceSchema::default());
        assert_eq!(diff.action, PlannedAction::Destroy);
    }
}
