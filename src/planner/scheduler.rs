//! Concurrent plan execution.
//!
//! Nodes move `Pending -> Ready -> Running -> {Succeeded, Failed}`. A node
//! is ready once every dependency has succeeded; ready nodes are dispatched
//! onto a bounded set of tokio tasks, ordered by layer then key. Each task
//! writes its state entry before reporting success, so a dependent never
//! starts before the entry it may read is durable.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{ConvergeError, ProviderError, Result};
use crate::model::{AttributePath, Attributes, LifecyclePolicy, Reference, ResourceKey, ResourceModel};
use crate::provider::{Provider, ProviderRegistry};
use crate::state::{StateEntry, StateSnapshot, StateStore};

use super::diff::{known, DiffEngine};
use super::plan::{lifecycle_for, Plan, PlanEntry, PlannedAction};

/// Default number of concurrently running nodes.
pub const DEFAULT_PARALLELISM: usize = 10;

/// What to do when a node fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop dispatching new nodes; running nodes finish.
    #[default]
    Halt,
    /// Keep dispatching nodes that do not depend on a failed node.
    Continue,
}

/// Cooperative cancellation shared between the caller and the scheduler.
///
/// Checked at dispatch boundaries only; provider calls already in flight
/// are never interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

/// Execution status of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Waiting for dependencies.
    Pending,
    /// Dependencies satisfied, waiting for a worker.
    Ready,
    /// Provider call in flight.
    Running,
    /// Completed and recorded.
    Succeeded,
    /// The provider call or state write failed.
    Failed,
    /// Never dispatched.
    Skipped,
}

/// Final status of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeOutcome {
    /// The resource.
    pub key: ResourceKey,
    /// The planned action.
    pub action: PlannedAction,
    /// Final status.
    pub status: NodeStatus,
    /// Failure message, if any.
    pub error: Option<String>,
}

/// Result of executing a plan.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Per-node outcomes in plan order.
    pub outcomes: Vec<NodeOutcome>,
    /// Whether dispatch was stopped by the cancellation flag.
    pub cancelled: bool,
}

/// Executes plans with bounded concurrency.
#[derive(Debug, Clone)]
pub struct Scheduler {
    parallelism: usize,
    failure_policy: FailurePolicy,
    cancellation: CancellationFlag,
}

/// Everything one node task needs, owned.
struct NodeTask {
    key: ResourceKey,
    action: PlannedAction,
    provider: Arc<dyn Provider>,
    store: Arc<dyn StateStore>,
    attributes: Attributes,
    prior: Option<StateEntry>,
    lifecycle: LifecyclePolicy,
    dependencies: Vec<ResourceKey>,
}

impl CancellationFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl ExecutionResult {
    /// Returns true if any node failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.status == NodeStatus::Failed)
    }

    /// Returns the outcome for a resource.
    #[must_use]
    pub fn outcome(&self, key: &ResourceKey) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLELISM)
    }
}

impl Scheduler {
    /// Creates a scheduler with the given worker limit (at least one).
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            failure_policy: FailurePolicy::default(),
            cancellation: CancellationFlag::new(),
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Shares a cancellation flag with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Executes a plan.
    ///
    /// `snapshot` must be the state the plan was computed against.
    ///
    /// # Errors
    ///
    /// Node failures are reported in the result, not as errors. An error is
    /// returned only if a node task panics.
    pub async fn execute(
        &self,
        plan: &Plan,
        model: &ResourceModel,
        snapshot: &StateSnapshot,
        registry: &ProviderRegistry,
        store: Arc<dyn StateStore>,
    ) -> Result<ExecutionResult> {
        let index: BTreeMap<&ResourceKey, &PlanEntry> = plan.entries.iter().map(|e| (&e.key, e)).collect();
        let mut dependents: BTreeMap<&ResourceKey, Vec<&PlanEntry>> = BTreeMap::new();
        for entry in &plan.entries {
            for dependency in &entry.dependencies {
                dependents.entry(dependency).or_default().push(entry);
            }
        }

        let mut status: BTreeMap<ResourceKey, NodeStatus> = BTreeMap::new();
        let mut waiting: BTreeMap<ResourceKey, usize> = BTreeMap::new();
        let mut ready: BTreeSet<(usize, ResourceKey)> = BTreeSet::new();
        for entry in &plan.entries {
            waiting.insert(entry.key.clone(), entry.dependencies.len());
            if entry.dependencies.is_empty() {
                status.insert(entry.key.clone(), NodeStatus::Ready);
                ready.insert((entry.layer, entry.key.clone()));
            } else {
                status.insert(entry.key.clone(), NodeStatus::Pending);
            }
        }

        let mut outputs: HashMap<ResourceKey, Attributes> = snapshot
            .iter()
            .map(|(key, entry)| {
                let mut merged = entry.inputs.clone();
                merged.extend(entry.attributes.clone());
                (key.clone(), merged)
            })
            .collect();

        let mut errors: BTreeMap<ResourceKey, String> = BTreeMap::new();
        let mut tasks: JoinSet<(ResourceKey, Result<Option<Attributes>>)> = JoinSet::new();
        let mut halted = false;

        info!(
            "Executing {} node(s) with parallelism {}",
            plan.actionable().count(),
            self.parallelism
        );

        loop {
            while !halted && tasks.len() < self.parallelism {
                if self.cancellation.is_cancelled() {
                    break;
                }
                let Some((_, key)) = ready.pop_first() else {
                    break;
                };
                let Some(entry) = index.get(&key).copied() else {
                    continue;
                };

                if entry.action.is_noop() {
                    status.insert(key.clone(), NodeStatus::Succeeded);
                    release(&key, &dependents, &mut waiting, &mut status, &mut ready);
                    continue;
                }

                match prepare(entry, model, snapshot, registry, &store, &outputs) {
                    Ok(task) => {
                        debug!("{key}: dispatching {}", entry.action.label());
                        status.insert(key, NodeStatus::Running);
                        tasks.spawn(async move {
                            let key = task.key.clone();
                            let result = task.run().await;
                            (key, result)
                        });
                    }
                    Err(e) => {
                        error!("{key}: {e}");
                        status.insert(key.clone(), NodeStatus::Failed);
                        errors.insert(key, e.to_string());
                        halted |= self.failure_policy == FailurePolicy::Halt;
                    }
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (key, result) =
                joined.map_err(|e| ConvergeError::internal(format!("Node task did not complete: {e}")))?;

            match result {
                Ok(produced) => {
                    info!("{key}: {} complete", index.get(&key).map_or("apply", |e| e.action.label()));
                    match produced {
                        Some(attributes) => outputs.insert(key.clone(), attributes),
                        None => outputs.remove(&key),
                    };
                    status.insert(key.clone(), NodeStatus::Succeeded);
                    release(&key, &dependents, &mut waiting, &mut status, &mut ready);
                }
                Err(e) => {
                    error!("{key}: {e}");
                    status.insert(key.clone(), NodeStatus::Failed);
                    errors.insert(key, e.to_string());
                    if self.failure_policy == FailurePolicy::Halt && !halted {
                        warn!("Halting dispatch after failure; running nodes will finish");
                        halted = true;
                    }
                }
            }
        }

        let cancelled = self.cancellation.is_cancelled();
        if cancelled {
            warn!("Execution cancelled; undispatched nodes were skipped");
        }

        let outcomes = plan
            .entries
            .iter()
            .map(|entry| {
                let final_status = match status.get(&entry.key).copied() {
                    Some(s @ (NodeStatus::Succeeded | NodeStatus::Failed)) => s,
                    _ => NodeStatus::Skipped,
                };
                NodeOutcome {
                    key: entry.key.clone(),
                    action: entry.action.clone(),
                    status: final_status,
                    error: errors.remove(&entry.key),
                }
            })
            .collect();

        Ok(ExecutionResult { outcomes, cancelled })
    }
}

/// Marks dependents whose dependencies have all succeeded as ready.
fn release(
    key: &ResourceKey,
    dependents: &BTreeMap<&ResourceKey, Vec<&PlanEntry>>,
    waiting: &mut BTreeMap<ResourceKey, usize>,
    status: &mut BTreeMap<ResourceKey, NodeStatus>,
    ready: &mut BTreeSet<(usize, ResourceKey)>,
) {
    for dependent in dependents.get(key).into_iter().flatten() {
        let Some(count) = waiting.get_mut(&dependent.key) else {
            continue;
        };
        *count = count.saturating_sub(1);
        if *count == 0 && status.get(&dependent.key) == Some(&NodeStatus::Pending) {
            status.insert(dependent.key.clone(), NodeStatus::Ready);
            ready.insert((dependent.layer, dependent.key.clone()));
        }
    }
}

/// Resolves a node's attributes against produced outputs and packages the task.
fn prepare(
    entry: &PlanEntry,
    model: &ResourceModel,
    snapshot: &StateSnapshot,
    registry: &ProviderRegistry,
    store: &Arc<dyn StateStore>,
    outputs: &HashMap<ResourceKey, Attributes>,
) -> Result<NodeTask> {
    let provider = registry.require(&entry.key)?;

    let (attributes, dependencies) = match (&entry.action, model.get(&entry.key)) {
        (PlannedAction::Destroy, _) | (_, None) => (Attributes::new(), Vec::new()),
        (_, Some(resource)) => {
            let mut attributes = Attributes::new();
            for (name, expr) in &resource.attributes {
                let value = expr
                    .evaluate(&|r: &Reference| outputs.get(&r.target).and_then(|attrs| resolve_in(attrs, &r.path)))
                    .ok_or_else(|| {
                        ConvergeError::internal(format!(
                            "{}: attribute '{name}' references a value that was not produced",
                            entry.key
                        ))
                    })?;
                attributes.insert(name.clone(), value);
            }
            // Orphans a replacement waits for are ordering only.
            let dependencies = entry.dependencies.iter().filter(|k| model.contains(k)).cloned().collect();
            (attributes, dependencies)
        }
    };

    Ok(NodeTask {
        key: entry.key.clone(),
        action: entry.action.clone(),
        provider,
        store: Arc::clone(store),
        attributes,
        prior: snapshot.get(&entry.key).cloned(),
        lifecycle: lifecycle_for(&entry.key, model, snapshot),
        dependencies,
    })
}

/// Looks a path up in an attribute map.
fn resolve_in(attributes: &Attributes, path: &AttributePath) -> Option<Value> {
    let (first, rest) = path.segments().split_first()?;
    AttributePath::from_segments(rest.to_vec())
        .lookup(attributes.get(first)?)
        .cloned()
}

/// Writes `value` at `path`, creating intermediate maps.
fn set_path(attributes: &mut Attributes, path: &AttributePath, value: Value) {
    let Some((first, rest)) = path.segments().split_first() else {
        return;
    };
    let mut current = attributes.entry(first.clone()).or_insert(Value::Null);
    for segment in rest {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map.entry(segment.clone()).or_insert(Value::Null);
    }
    *current = value;
}

impl NodeTask {
    async fn run(self) -> Result<Option<Attributes>> {
        match self.action {
            PlannedAction::NoOp => Ok(None),
            PlannedAction::Create => self.create().await.map(Some),
            PlannedAction::UpdateInPlace(_) => self.update().await.map(Some),
            PlannedAction::Replace { create_first: true } => {
                let prior = self.prior()?;
                let produced = self.create().await?;
                self.destroy_remote(&prior.remote_id).await?;
                Ok(Some(produced))
            }
            PlannedAction::Replace { create_first: false } => {
                let prior = self.prior()?;
                self.destroy_remote(&prior.remote_id).await?;
                self.store.delete(&self.key).await?;
                self.create().await.map(Some)
            }
            PlannedAction::Destroy => {
                let prior = self.prior()?;
                self.destroy_remote(&prior.remote_id).await?;
                self.store.delete(&self.key).await?;
                Ok(None)
            }
        }
    }

    fn prior(&self) -> Result<StateEntry> {
        self.prior.clone().ok_or_else(|| {
            ConvergeError::internal(format!("{}: no recorded state for {}", self.key, self.action.label()))
        })
    }

    async fn create(&self) -> Result<Attributes> {
        let created = self.provider.create(&self.attributes).await?;
        debug!("{}: created {}", self.key, created.remote_id);

        let entry = StateEntry::new(&self.key.resource_type, created.remote_id, created.attributes.clone())
            .applied_with(self.attributes.clone(), self.dependencies.clone(), self.lifecycle.clone());
        self.store.put(&self.key, entry).await?;
        Ok(created.attributes)
    }

    async fn update(&self) -> Result<Attributes> {
        let prior = self.prior()?;

        let mut attributes = self.attributes.clone();
        for ignored in &self.lifecycle.ignore_changes {
            if let Some(recorded) = resolve_in(&prior.attributes, ignored).or_else(|| resolve_in(&prior.inputs, ignored)) {
                set_path(&mut attributes, ignored, recorded);
            }
        }

        let changes: Vec<_> = DiffEngine::new()
            .changes(&known(&attributes), &prior)
            .into_iter()
            .filter(|c| !self.lifecycle.ignores(&c.path))
            .collect();

        let produced = self.provider.update(&prior.remote_id, &attributes, &changes).await?;

        let mut entry = prior.applied_with(attributes, self.dependencies.clone(), self.lifecycle.clone());
        entry.set_attributes(produced.clone());
        self.store.put(&self.key, entry).await?;
        Ok(produced)
    }

    async fn destroy_remote(&self, remote_id: &str) -> Result<()> {
        match self.provider.destroy(remote_id).await {
            Ok(()) => Ok(()),
            Err(ProviderError::NotFound { .. }) => {
                debug!("{}: {remote_id} was already gone", self.key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
