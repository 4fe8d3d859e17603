//! Plan computation.
//!
//! The default plan merges config into prior state following the schema:
//!
//! - settable attributes take the proposed (config) value
//! - optional+computed attributes left null in config keep their prior
//!   value, or become unknown on create
//! - computed-only attributes keep their prior value, or become unknown on
//!   create; when anything else changes they become unknown unless marked
//!   `UseStateForUnknown`
//!
//! Resources then adjust the plan through a [`PlanRequest`] before the
//! result is turned into a [`PlanResult`].

use std::collections::BTreeSet;

use crate::schema::{Diagnostic, PlanModifier, Schema};
use crate::value::{Dynamic, ValueTree};

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    /// The attribute that changed.
    pub path: String,
    /// The value before the change (`None` if creating).
    pub before: Option<Dynamic>,
    /// The value after the change (`None` if deleting).
    pub after: Option<Dynamic>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Dynamic>, after: Option<Dynamic>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: Dynamic) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Dynamic) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Dynamic, after: Dynamic) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanResult {
    /// The planned state; `None` when the resource is destroyed.
    pub planned_state: Option<ValueTree>,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Attributes whose change forces replacement.
    pub requires_replace: BTreeSet<String>,
    /// Warnings raised while planning.
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanResult {
    /// A plan result with no changes.
    pub fn no_change(state: ValueTree) -> Self {
        Self {
            planned_state: Some(state),
            changes: Vec::new(),
            requires_replace: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Whether the resource will be destroyed and recreated.
    pub fn is_replace(&self) -> bool {
        !self.requires_replace.is_empty()
    }

    /// Whether the resource will be destroyed.
    pub fn is_destroy(&self) -> bool {
        self.planned_state.is_none()
    }
}

/// A plan under construction, handed to resource plan modifiers.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Operator configuration; empty when destroying.
    pub config: ValueTree,
    /// Prior state; `None` when creating.
    pub state: Option<ValueTree>,
    /// Planned state; `None` when destroying.
    pub plan: Option<ValueTree>,
    /// Attributes forcing replacement.
    pub requires_replace: BTreeSet<String>,
    /// Diagnostics (usually warnings) to show with the plan.
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanRequest {
    /// Whether the plan creates a new object.
    pub fn is_create(&self) -> bool {
        self.state.is_none() && self.plan.is_some()
    }

    /// Whether the plan destroys the object.
    pub fn is_destroy(&self) -> bool {
        self.plan.is_none()
    }

    /// Whether the plan replaces an existing object.
    pub fn is_replace(&self) -> bool {
        self.state.is_some() && self.plan.is_some() && !self.requires_replace.is_empty()
    }

    /// Whether the existing object goes away, by destroy or replace.
    pub fn removes_existing(&self) -> bool {
        self.state.is_some() && (self.is_destroy() || self.is_replace())
    }

    /// Whether an attribute differs between prior state and plan.
    pub fn changed(&self, name: &str) -> bool {
        match (&self.state, &self.plan) {
            (Some(state), Some(plan)) => state.raw(name) != plan.raw(name),
            _ => false,
        }
    }

    /// Force replacement because of `name`.
    pub fn require_replace(&mut self, name: impl Into<String>) {
        self.requires_replace.insert(name.into());
    }

    /// Attach a warning to the plan.
    pub fn warn(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Compute the default planned state.
///
/// `proposed` is the host's proposed new state; values it leaves out fall
/// back to `config`.
pub fn default_plan(
    schema: &Schema,
    prior: Option<&ValueTree>,
    proposed: &ValueTree,
    config: &ValueTree,
) -> ValueTree {
    let mut planned = ValueTree::new();
    for (name, attr) in &schema.attributes {
        let configured = match proposed.raw(name) {
            Dynamic::Null => config.raw(name),
            value => value,
        };
        let value = if attr.flags.is_settable() && !configured.is_null() {
            configured.clone()
        } else if attr.flags.computed {
            match prior {
                Some(prior) => prior.raw(name).clone(),
                None => Dynamic::Unknown,
            }
        } else {
            Dynamic::Null
        };
        planned.insert_raw(name.clone(), value);
    }

    if let Some(prior) = prior {
        let settable_changed = schema
            .attributes
            .iter()
            .filter(|(_, attr)| attr.flags.is_settable())
            .any(|(name, _)| prior.raw(name) != planned.raw(name));
        if settable_changed {
            for (name, attr) in &schema.attributes {
                let from_config = attr.flags.is_settable() && !config.raw(name).is_null();
                if attr.flags.computed
                    && !from_config
                    && !attr.has_modifier(PlanModifier::UseStateForUnknown)
                {
                    planned.insert_raw(name.clone(), Dynamic::Unknown);
                }
            }
        }
    }
    planned
}

/// Attributes marked `RequiresReplace` whose planned value differs from prior state.
pub fn replace_triggers(schema: &Schema, prior: &ValueTree, planned: &ValueTree) -> BTreeSet<String> {
    schema
        .attributes
        .iter()
        .filter(|(_, attr)| attr.has_modifier(PlanModifier::RequiresReplace))
        .filter(|(name, _)| prior.raw(name) != planned.raw(name))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Mark every computed attribute not supplied by config as unknown, as a
/// replacement object will recompute them.
pub fn unknown_computed(schema: &Schema, config: &ValueTree, planned: &mut ValueTree) {
    for (name, attr) in &schema.attributes {
        let from_config = attr.flags.is_settable() && !config.raw(name).is_null();
        if attr.flags.computed && !from_config {
            planned.insert_raw(name.clone(), Dynamic::Unknown);
        }
    }
}

/// The attribute-level difference between prior state and plan.
pub fn diff(schema: &Schema, prior: Option<&ValueTree>, planned: Option<&ValueTree>) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    for name in schema.attributes.keys() {
        let before = prior.map(|p| p.raw(name)).filter(|v| !v.is_null());
        let after = planned.map(|p| p.raw(name)).filter(|v| !v.is_null());
        match (before, after) {
            (None, None) => {},
            (None, Some(after)) => changes.push(AttributeChange::added(name.clone(), after.clone())),
            (Some(before), None) => {
                changes.push(AttributeChange::removed(name.clone(), before.clone()))
            },
            (Some(before), Some(after)) if before != after => changes.push(
                AttributeChange::modified(name.clone(), before.clone(), after.clone()),
            ),
            _ => {},
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, AttributeType};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string().requires_replace())
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("arn", Attribute::computed_string().use_state_for_unknown())
            .with_attribute("in_use", Attribute::computed_bool())
    }

    fn tree(value: serde_json::Value) -> ValueTree {
        ValueTree::from_json(value).unwrap()
    }

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("name", Dynamic::String("test".to_string()));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(Dynamic::String("test".to_string())));

        let removed = AttributeChange::removed("name", Dynamic::String("old".to_string()));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("count", Dynamic::Int64(1), Dynamic::Int64(2));
        assert_eq!(modified.before, Some(Dynamic::Int64(1)));
        assert_eq!(modified.after, Some(Dynamic::Int64(2)));
    }

    #[test]
    fn test_create_plan_marks_computed_unknown() {
        let config = tree(json!({"name": "k1"}));
        let planned = default_plan(&schema(), None, &config, &config);
        assert_eq!(planned.raw("name"), &Dynamic::String("k1".to_string()));
        assert!(planned.raw("description").is_null());
        assert!(planned.raw("arn").is_unknown());
        assert!(planned.raw("in_use").is_unknown());
    }

    #[test]
    fn test_unchanged_plan_keeps_state() {
        let prior = tree(json!({"name": "k1", "description": null, "arn": "arn:k1", "in_use": false}));
        let config = tree(json!({"name": "k1"}));
        let planned = default_plan(&schema(), Some(&prior), &config, &config);
        assert_eq!(planned, prior);
        assert!(diff(&schema(), Some(&prior), Some(&planned)).is_empty());
    }

    #[test]
    fn test_update_plan_unknowns_volatile_computed() {
        let prior = tree(json!({"name": "k1", "description": null, "arn": "arn:k1", "in_use": false}));
        let config = tree(json!({"name": "k1", "description": "d"}));
        let planned = default_plan(&schema(), Some(&prior), &config, &config);
        assert_eq!(planned.raw("arn"), &Dynamic::String("arn:k1".to_string()));
        assert!(planned.raw("in_use").is_unknown());
        assert!(replace_triggers(&schema(), &prior, &planned).is_empty());

        let changes = diff(&schema(), Some(&prior), Some(&planned));
        assert!(changes.iter().any(|c| c.path == "description"));
    }

    #[test]
    fn test_replace_triggers() {
        let prior = tree(json!({"name": "k1", "arn": "arn:k1", "in_use": false}));
        let config = tree(json!({"name": "k2"}));
        let planned = default_plan(&schema(), Some(&prior), &config, &config);
        let triggers = replace_triggers(&schema(), &prior, &planned);
        assert!(triggers.contains("name"));
    }

    #[test]
    fn test_optional_computed_keeps_prior() {
        let schema = Schema::v0().with_attribute(
            "max_receive_count",
            Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed()),
        );
        let prior = tree(json!({"max_receive_count": 5}));
        let config = tree(json!({}));
        let planned = default_plan(&schema, Some(&prior), &config, &config);
        assert_eq!(planned.raw("max_receive_count"), &Dynamic::Int64(5));

        let planned = default_plan(&schema, None, &config, &config);
        assert!(planned.raw("max_receive_count").is_unknown());
    }

    #[test]
    fn test_plan_request_predicates() {
        let state = tree(json!({"name": "a"}));
        let mut req = PlanRequest {
            config: ValueTree::new(),
            state: Some(state.clone()),
            plan: None,
            requires_replace: BTreeSet::new(),
            diagnostics: Vec::new(),
        };
        assert!(req.is_destroy());
        assert!(req.removes_existing());

        req.plan = Some(tree(json!({"name": "b"})));
        assert!(req.changed("name"));
        assert!(!req.removes_existing());
        req.require_replace("name");
        assert!(req.is_replace());
        assert!(req.removes_existing());
    }
}
