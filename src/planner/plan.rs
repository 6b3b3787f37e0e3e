//! Plan types and construction.
//!
//! Planning is a pure function of the desired model, a state snapshot and
//! the provider schemas. It makes no remote calls and writes nothing, so it
//! backs both previews and the "no changes" check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

use crate::config::ConfigHasher;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::model::{LifecyclePolicy, Reference, ReferenceResolver, ResourceKey, ResourceModel};
use crate::provider::ProviderRegistry;
use crate::state::{StateEntry, StateSnapshot};

use super::diff::{AttributeChange, DesiredAttributes, DiffEngine};
use super::policy::{Evaluation, PolicyDecision, PolicyEngine};

/// Action computed for one resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum PlannedAction {
    /// Nothing to do.
    NoOp,
    /// Create a new remote object.
    Create,
    /// Apply the listed changes to the existing object.
    UpdateInPlace(Vec<AttributeChange>),
    /// Destroy and recreate the object.
    Replace {
        /// Create the replacement before destroying the original.
        create_first: bool,
    },
    /// Destroy the object.
    Destroy,
}

/// Planning mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Converge recorded state towards the model.
    #[default]
    Normal,
    /// Destroy everything recorded in state.
    Destroy,
}

/// Options for planning.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Planning mode.
    pub mode: PlanMode,
    /// Resources to replace even if unchanged.
    pub replace: BTreeSet<ResourceKey>,
}

/// Planned action for one resource.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    /// The resource.
    pub key: ResourceKey,
    /// Final action after policy evaluation.
    pub action: PlannedAction,
    /// Attribute changes behind the action.
    pub changes: Vec<AttributeChange>,
    /// What lifecycle policy did to the raw action.
    pub decision: PolicyDecision,
    /// Nodes that must succeed before this one runs.
    pub dependencies: BTreeSet<ResourceKey>,
    /// Topological layer.
    pub layer: usize,
    /// Identifier of the existing remote object, if any.
    pub remote_id: Option<String>,
}

/// A complete plan.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// Entries in topological order.
    pub entries: Vec<PlanEntry>,
    /// Topological layers.
    pub layers: Vec<Vec<ResourceKey>>,
    /// Fingerprint of the state snapshot the plan was computed against.
    pub state_fingerprint: String,
    /// Fingerprint of the model the plan was computed from.
    pub model_fingerprint: String,
    /// Planning mode.
    pub mode: PlanMode,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
}

impl PlannedAction {
    /// Short lowercase name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::UpdateInPlace(_) => "update",
            Self::Replace { .. } => "replace",
            Self::Destroy => "destroy",
        }
    }

    /// Returns true if the action destroys the existing object.
    #[must_use]
    pub const fn destroys(&self) -> bool {
        matches!(self, Self::Replace { .. } | Self::Destroy)
    }

    /// Returns true for `NoOp`.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace { create_first: true } => write!(f, "replace (create before destroy)"),
            Self::Replace { create_first: false } => write!(f, "replace (destroy before create)"),
            other => write!(f, "{}", other.label()),
        }
    }
}

impl Plan {
    /// Returns true when every action is `NoOp`.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.entries.iter().all(|e| e.action.is_noop())
    }

    /// Returns the entry for a resource.
    #[must_use]
    pub fn entry(&self, key: &ResourceKey) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }

    /// Number of creates.
    #[must_use]
    pub fn to_add(&self) -> usize {
        self.count(|a| matches!(a, PlannedAction::Create))
    }

    /// Number of in-place updates.
    #[must_use]
    pub fn to_change(&self) -> usize {
        self.count(|a| matches!(a, PlannedAction::UpdateInPlace(_)))
    }

    /// Number of replacements.
    #[must_use]
    pub fn to_replace(&self) -> usize {
        self.count(|a| matches!(a, PlannedAction::Replace { .. }))
    }

    /// Number of destroys.
    #[must_use]
    pub fn to_destroy(&self) -> usize {
        self.count(|a| matches!(a, PlannedAction::Destroy))
    }

    /// Entries that are not `NoOp`.
    pub fn actionable(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| !e.action.is_noop())
    }

    fn count(&self, f: impl Fn(&PlannedAction) -> bool) -> usize {
        self.entries.iter().filter(|e| f(&e.action)).count()
    }
}

/// Computes a plan.
///
/// # Errors
///
/// Fails without side effects on an inconsistent state entry, a dangling
/// reference or self-dependency, a resource type with no provider, a
/// dependency cycle, or a lifecycle policy veto.
pub fn plan(
    model: &ResourceModel,
    snapshot: &StateSnapshot,
    registry: &ProviderRegistry,
    options: &PlanOptions,
) -> Result<Plan> {
    for (key, entry) in snapshot {
        entry.check_consistency(key)?;
    }

    let dependencies = ReferenceResolver::new().resolve(model)?;
    let hasher = ConfigHasher::new();

    // Nodes that only exist in state are destroyed.
    let destroy_only: BTreeSet<&ResourceKey> = match options.mode {
        PlanMode::Normal => snapshot.keys().filter(|k| !model.contains(k)).collect(),
        PlanMode::Destroy => snapshot.keys().collect(),
    };

    let mut graph = DependencyGraph::new();
    if options.mode == PlanMode::Normal {
        for resource in model.iter() {
            registry.require(&resource.key)?;
            graph.add_node(resource.key.clone());
        }
        for (dependent, dependency) in dependencies.edges() {
            graph.add_edge(dependent, &dependency)?;
        }
    }

    let differ = DiffEngine::new();
    let policy = PolicyEngine::new();
    let mut actions: BTreeMap<ResourceKey, PlannedAction> = BTreeMap::new();
    let mut evaluations: BTreeMap<ResourceKey, Evaluation> = BTreeMap::new();

    // Desired nodes never wait for destroy-only ones, so they are planned
    // before those are added.
    for key in graph.topological_order()? {
        let provider = registry.require(&key)?;
        let schema = provider.schema();
        let recorded = snapshot.get(&key);
        let resource = model
            .get(&key)
            .ok_or_else(|| crate::error::ConvergeError::internal(format!("{key} missing from model")))?;

        let desired: DesiredAttributes = resource
            .attributes
            .iter()
            .map(|(name, expr)| {
                (
                    name.clone(),
                    expr.evaluate(&|r: &Reference| known_output(r, &actions, snapshot)),
                )
            })
            .collect();

        let raw = differ.diff(Some(&desired), recorded, &schema);
        let force_replace = recorded.is_some() && options.replace.contains(&key);
        let evaluation = policy.evaluate(&key, &resource.lifecycle, raw, &schema, force_replace)?;

        debug!("{key}: {}", evaluation.action);
        actions.insert(key.clone(), evaluation.action.clone());
        evaluations.insert(key, evaluation);
    }

    for key in &destroy_only {
        registry.require(key)?;
        graph.add_node((*key).clone());
    }
    // A destroy-only node goes before anything it depended on that is also
    // destroyed, whether that is another orphan or a replaced resource.
    for key in &destroy_only {
        for recorded in &snapshot[*key].dependencies {
            let destroyed = destroy_only.contains(recorded)
                || actions.get(recorded).is_some_and(PlannedAction::destroys);
            if destroyed {
                graph.add_edge(recorded, key)?;
            }
        }
    }
    for key in &destroy_only {
        let schema = registry.require(key)?.schema();
        let recorded = snapshot.get(*key);
        let lifecycle = recorded.map(|e| e.lifecycle.clone()).unwrap_or_default();
        let raw = differ.diff(None, recorded, &schema);
        let evaluation = policy.evaluate(key, &lifecycle, raw, &schema, false)?;

        debug!("{key}: {}", evaluation.action);
        evaluations.insert((*key).clone(), evaluation);
    }

    let layers = graph.layers()?;
    let mut entries = Vec::with_capacity(graph.len());
    for (layer, keys) in layers.iter().enumerate() {
        for key in keys {
            let evaluation = evaluations
                .remove(key)
                .ok_or_else(|| crate::error::ConvergeError::internal(format!("{key} was not planned")))?;
            entries.push(PlanEntry {
                key: key.clone(),
                action: evaluation.action,
                changes: evaluation.changes,
                decision: evaluation.decision,
                dependencies: graph.dependencies_of(key).unwrap_or_default(),
                layer,
                remote_id: snapshot.get(key).map(|e| e.remote_id.clone()),
            });
        }
    }

    let plan = Plan {
        entries,
        layers,
        state_fingerprint: hasher.hash_state(snapshot),
        model_fingerprint: hasher.hash_model(model),
        mode: options.mode,
        created_at: Utc::now(),
    };

    info!(
        "Plan: {} to add, {} to change, {} to replace, {} to destroy",
        plan.to_add(),
        plan.to_change(),
        plan.to_replace(),
        plan.to_destroy()
    );
    Ok(plan)
}

/// Value of a referenced attribute, known at plan time only if the target
/// keeps that attribute's recorded value.
///
/// A created or replaced target yields a new object, so all of its outputs
/// are unknown. An in-place update keeps the object and only the changed
/// paths are unknown.
fn known_output(
    reference: &Reference,
    actions: &BTreeMap<ResourceKey, PlannedAction>,
    snapshot: &StateSnapshot,
) -> Option<Value> {
    match actions.get(&reference.target)? {
        PlannedAction::NoOp => {}
        PlannedAction::UpdateInPlace(changes) => {
            let touched = changes
                .iter()
                .any(|c| c.path.covers(&reference.path) || reference.path.covers(&c.path));
            if touched {
                return None;
            }
        }
        PlannedAction::Create | PlannedAction::Replace { .. } | PlannedAction::Destroy => return None,
    }
    lookup_recorded(snapshot.get(&reference.target)?, reference)
}

/// Looks up a reference in a recorded entry.
pub(crate) fn lookup_recorded(entry: &StateEntry, reference: &Reference) -> Option<Value> {
    let segments = reference.path.segments();
    let root = entry.recorded(segments.first()?)?;
    let rest = crate::model::AttributePath::from_segments(segments[1..].to_vec());
    rest.lookup(root).cloned()
}

/// The lifecycle recorded for a destroy-only node, or the model's.
pub(crate) fn lifecycle_for(
    key: &ResourceKey,
    model: &ResourceModel,
    snapshot: &StateSnapshot,
) -> LifecyclePolicy {
    model
        .get(key)
        .map(|r| r.lifecycle.clone())
        .or_else(|| snapshot.get(key).map(|e| e.lifecycle.clone()))
        .unwrap_or_default()
}
