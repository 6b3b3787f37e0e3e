//! Reconciliation engine.
//!
//! Ties the pure planner to the scheduler and a state store. The engine
//! owns no model: every call receives the desired model explicitly, and the
//! state store is the only thing that survives between calls.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ConfigHasher;
use crate::error::{PlanError, Result};
use crate::model::{ResourceKey, ResourceModel};
use crate::planner::{
    plan, CancellationFlag, FailurePolicy, NodeOutcome, NodeStatus, Plan, PlanOptions, PlannedAction,
    Scheduler, DEFAULT_PARALLELISM,
};
use crate::provider::ProviderRegistry;
use crate::state::{StateSnapshot, StateStore};

/// Execution settings for [`Engine::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum number of provider operations in flight.
    pub parallelism: usize,
    /// What to do when a resource fails.
    pub failure_policy: FailurePolicy,
}

/// Reconciles a desired model against a state store.
pub struct Engine {
    registry: ProviderRegistry,
    store: Arc<dyn StateStore>,
    options: EngineOptions,
    cancellation: CancellationFlag,
}

/// Overall result of an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every action was `NoOp`; nothing was executed.
    NoChanges,
    /// Every action succeeded.
    Succeeded,
    /// At least one resource failed. Completed resources keep their state.
    PartialFailure,
    /// Dispatch was cancelled before every resource ran.
    Cancelled,
}

/// Report of an apply.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// Overall outcome.
    pub outcome: RunOutcome,
    /// Per resource action and final status, in plan order.
    pub resources: Vec<NodeOutcome>,
}

/// Report of a refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    /// Entries whose recorded attributes changed.
    pub updated: Vec<ResourceKey>,
    /// Entries dropped because the remote object is gone.
    pub removed: Vec<ResourceKey>,
    /// Entries that matched the remote object.
    pub unchanged: usize,
    /// Entries that could not be read, with the reason. They are kept.
    pub errors: Vec<(ResourceKey, String)>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            failure_policy: FailurePolicy::Halt,
        }
    }
}

impl Engine {
    /// Creates an engine.
    #[must_use]
    pub fn new(registry: ProviderRegistry, store: Arc<dyn StateStore>) -> Self {
        Self {
            registry,
            store,
            options: EngineOptions::default(),
            cancellation: CancellationFlag::new(),
        }
    }

    /// Sets the execution options.
    #[must_use]
    pub const fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares a cancellation flag, e.g. with a Ctrl-C handler.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Returns the provider registry.
    #[must_use]
    pub const fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Returns the state store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Loads every state entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn snapshot(&self) -> Result<StateSnapshot> {
        self.store.snapshot().await
    }

    /// Computes a plan against the current state.
    ///
    /// # Errors
    ///
    /// Returns configuration, state and policy errors from planning.
    pub async fn plan(&self, model: &ResourceModel, options: &PlanOptions) -> Result<Plan> {
        let snapshot = self.store.snapshot().await?;
        debug!("Planning {} resource(s) against {} state entries", model.len(), snapshot.len());
        plan(model, &snapshot, &self.registry, options)
    }

    /// Plans and executes in one step.
    ///
    /// # Errors
    ///
    /// Planning errors abort before anything executes. Resource failures are
    /// reported in the [`ApplyReport`], not as errors.
    pub async fn apply(&self, model: &ResourceModel, options: &PlanOptions) -> Result<ApplyReport> {
        let snapshot = self.store.snapshot().await?;
        let plan = plan(model, &snapshot, &self.registry, options)?;
        self.execute(&plan, model, &snapshot).await
    }

    /// Executes a plan computed earlier, e.g. after the user confirmed it.
    ///
    /// # Errors
    ///
    /// Refuses a plan whose resources are missing from `model`, whose model
    /// fingerprint differs from `model`, or whose state fingerprint no longer
    /// matches the store.
    pub async fn apply_plan(&self, plan: &Plan, model: &ResourceModel) -> Result<ApplyReport> {
        if let Some(entry) = plan
            .entries
            .iter()
            .find(|e| !matches!(e.action, PlannedAction::Destroy) && !model.contains(&e.key))
        {
            return Err(PlanError::ModelMismatch { key: entry.key.clone() }.into());
        }

        let hasher = ConfigHasher::new();
        let model_fingerprint = hasher.hash_model(model);
        if !ConfigHasher::hashes_match(&plan.model_fingerprint, &model_fingerprint) {
            return Err(PlanError::ModelChanged {
                expected: hasher.short_hash(&plan.model_fingerprint),
                found: hasher.short_hash(&model_fingerprint),
            }
            .into());
        }

        let snapshot = self.store.snapshot().await?;
        let state_fingerprint = hasher.hash_state(&snapshot);
        if !ConfigHasher::hashes_match(&plan.state_fingerprint, &state_fingerprint) {
            return Err(PlanError::StalePlan {
                expected: hasher.short_hash(&plan.state_fingerprint),
                found: hasher.short_hash(&state_fingerprint),
            }
            .into());
        }

        self.execute(plan, model, &snapshot).await
    }

    async fn execute(&self, plan: &Plan, model: &ResourceModel, snapshot: &StateSnapshot) -> Result<ApplyReport> {
        if plan.is_converged() {
            info!("No changes required - state is converged");
            return Ok(ApplyReport {
                outcome: RunOutcome::NoChanges,
                resources: plan
                    .entries
                    .iter()
                    .map(|entry| NodeOutcome {
                        key: entry.key.clone(),
                        action: PlannedAction::NoOp,
                        status: NodeStatus::Succeeded,
                        error: None,
                    })
                    .collect(),
            });
        }

        info!(
            "Applying: {} to add, {} to change, {} to replace, {} to destroy",
            plan.to_add(),
            plan.to_change(),
            plan.to_replace(),
            plan.to_destroy()
        );

        let scheduler = Scheduler::new(self.options.parallelism)
            .with_failure_policy(self.options.failure_policy)
            .with_cancellation(self.cancellation.clone());
        let result = scheduler
            .execute(plan, model, snapshot, &self.registry, Arc::clone(&self.store))
            .await?;

        let skipped = result
            .outcomes
            .iter()
            .any(|o| o.status == NodeStatus::Skipped);
        let outcome = if result.cancelled && skipped {
            RunOutcome::Cancelled
        } else if result.has_failures() {
            RunOutcome::PartialFailure
        } else {
            RunOutcome::Succeeded
        };

        let report = ApplyReport {
            outcome,
            resources: result.outcomes,
        };
        info!(
            "Apply finished ({:?}): {} succeeded, {} failed, {} skipped",
            report.outcome,
            report.count(NodeStatus::Succeeded),
            report.count(NodeStatus::Failed),
            report.count(NodeStatus::Skipped)
        );
        Ok(report)
    }

    /// Reads every recorded object through its provider and updates state.
    ///
    /// Observed attributes are merged over the recorded ones. Entries whose
    /// remote object no longer exists are dropped. Read failures leave the
    /// entry untouched and are reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let snapshot = self.store.snapshot().await?;
        let mut report = RefreshReport::default();
        info!("Refreshing {} state entries", snapshot.len());

        for (key, mut entry) in snapshot {
            let Some(provider) = self.registry.get(&entry.resource_type) else {
                warn!("{key}: no provider for type '{}', skipping", entry.resource_type);
                report
                    .errors
                    .push((key, format!("no provider for type '{}'", entry.resource_type)));
                continue;
            };

            match provider.read(&entry.remote_id).await {
                Ok(Some(observed)) => {
                    let mut merged = entry.attributes.clone();
                    merged.extend(observed);
                    if merged == entry.attributes {
                        report.unchanged += 1;
                    } else {
                        debug!("{key}: recorded attributes drifted");
                        entry.set_attributes(merged);
                        self.store.put(&key, entry).await?;
                        report.updated.push(key);
                    }
                }
                Ok(None) => {
                    warn!("{key}: remote object {} is gone, dropping it from state", entry.remote_id);
                    self.store.delete(&key).await?;
                    report.removed.push(key);
                }
                Err(e) => {
                    warn!("{key}: read failed: {e}");
                    report.errors.push((key, e.to_string()));
                }
            }
        }

        info!(
            "Refresh complete: {} updated, {} removed, {} unchanged",
            report.updated.len(),
            report.removed.len(),
            report.unchanged
        );
        Ok(report)
    }

    /// Removes an entry from state without touching the remote object.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn forget(&self, key: &ResourceKey) -> Result<bool> {
        let removed = self.store.delete(key).await?;
        if removed {
            info!("{key}: removed from state");
        }
        Ok(removed)
    }
}

impl ApplyReport {
    /// Number of resources that ended with the given status.
    #[must_use]
    pub fn count(&self, status: NodeStatus) -> usize {
        self.resources.iter().filter(|r| r.status == status).count()
    }

    /// Returns true unless a resource failed or dispatch was cancelled.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::NoChanges | RunOutcome::Succeeded)
    }
}

impl RefreshReport {
    /// Returns true if any entry could not be read.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConvergeError, PolicyError};
    use crate::model::{Expr, LifecyclePolicy, ResourceInstance};
    use crate::planner::PlanMode;
    use crate::provider::testing::RecordingProvider;
    use crate::provider::{LocalFileProvider, Provider, ResourceSchema};
    use crate::state::{LocalStateStore, MemoryStateStore};
    use serde_json::json;

    fn key(s: &str) -> ResourceKey {
        s.parse().unwrap()
    }

    fn named(k: &str, name: &str) -> ResourceInstance {
        ResourceInstance::new(key(k)).with_attribute("name", json!(name))
    }

    fn engine(provider: Arc<RecordingProvider>) -> Engine {
        let mut registry = ProviderRegistry::new();
        registry.register("x_thing", provider as Arc<dyn Provider>);
        Engine::new(registry, Arc::new(MemoryStateStore::new()))
    }

    fn engine_with(providers: &[(&str, Arc<RecordingProvider>)]) -> Engine {
        let mut registry = ProviderRegistry::new();
        for (resource_type, provider) in providers {
            registry.register(*resource_type, Arc::clone(provider) as Arc<dyn Provider>);
        }
        Engine::new(registry, Arc::new(MemoryStateStore::new()))
    }

    fn network() -> ResourceModel {
        ResourceModel::from_resources([
            named("x_thing.vpc", "vpc").with_attribute("cidr", json!("10.0.0.0/16")),
            named("x_thing.subnet", "subnet")
                .with_attribute("vpc_id", Expr::parse(&json!("${x_thing.vpc.id}")).unwrap()),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_second_apply_is_noop() {
        let provider = Arc::new(RecordingProvider::updatable());
        let engine = engine(provider.clone());
        let model = network();

        let plan = engine.plan(&model, &PlanOptions::default()).await.unwrap();
        let order: Vec<String> = plan.entries.iter().map(|e| e.key.to_string()).collect();
        assert_eq!(order, vec!["x_thing.vpc", "x_thing.subnet"]);

        let first = engine.apply(&model, &PlanOptions::default()).await.unwrap();
        assert_eq!(first.outcome, RunOutcome::Succeeded);
        assert_eq!(first.count(NodeStatus::Succeeded), 2);

        let second = engine.plan(&model, &PlanOptions::default()).await.unwrap();
        assert!(second.is_converged());

        let calls = provider.mutations().len();
        let again = engine.apply(&model, &PlanOptions::default()).await.unwrap();
        assert_eq!(again.outcome, RunOutcome::NoChanges);
        assert_eq!(provider.mutations().len(), calls);
        let rows: Vec<(String, &PlannedAction, NodeStatus)> = again
            .resources
            .iter()
            .map(|r| (r.key.to_string(), &r.action, r.status))
            .collect();
        assert_eq!(
            rows,
            vec![
                (String::from("x_thing.vpc"), &PlannedAction::NoOp, NodeStatus::Succeeded),
                (String::from("x_thing.subnet"), &PlannedAction::NoOp, NodeStatus::Succeeded),
            ]
        );
    }

    #[tokio::test]
    async fn test_in_place_update_leaves_referencing_resource_alone() {
        let vpcs = Arc::new(RecordingProvider::updatable());
        let subnets = Arc::new(RecordingProvider::new(ResourceSchema::replace_only_by_default()));
        let engine = engine_with(&[("x_vpc", vpcs.clone()), ("x_subnet", subnets.clone())]);
        let model = |tag: &str| {
            ResourceModel::from_resources([
                named("x_vpc.main", "vpc").with_attribute("tags", json!({ "Name": tag })),
                named("x_subnet.a", "subnet")
                    .with_attribute("vpc_id", Expr::parse(&json!("${x_vpc.main.id}")).unwrap()),
            ])
            .unwrap()
        };

        engine.apply(&model("a"), &PlanOptions::default()).await.unwrap();
        let subnet_calls = subnets.mutations();

        let plan = engine.plan(&model("b"), &PlanOptions::default()).await.unwrap();
        assert!(matches!(
            plan.entry(&key("x_vpc.main")).unwrap().action,
            PlannedAction::UpdateInPlace(_)
        ));
        assert_eq!(plan.entry(&key("x_subnet.a")).unwrap().action, PlannedAction::NoOp);

        let report = engine.apply(&model("b"), &PlanOptions::default()).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(subnets.mutations(), subnet_calls);
        assert!(engine.plan(&model("b"), &PlanOptions::default()).await.unwrap().is_converged());
    }

    #[tokio::test]
    async fn test_removed_dependent_is_destroyed_before_replacement() {
        let provider = Arc::new(RecordingProvider::new(ResourceSchema::replace_only_by_default()));
        let engine = engine(provider.clone());
        let v1 = ResourceModel::from_resources([
            named("x_thing.a_vpc", "vpc"),
            named("x_thing.z_subnet", "subnet")
                .with_attribute("vpc_id", Expr::parse(&json!("${x_thing.a_vpc.id}")).unwrap()),
        ])
        .unwrap();
        engine.apply(&v1, &PlanOptions::default()).await.unwrap();
        let created = provider.mutations().len();

        let v2 = ResourceModel::from_resources([named("x_thing.a_vpc", "vpc2")]).unwrap();
        let report = engine.apply(&v2, &PlanOptions::default()).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Succeeded);

        let mutations: Vec<(&str, String)> = provider.mutations().split_off(created);
        assert_eq!(
            mutations,
            vec![
                ("destroy", String::from("subnet-1")),
                ("destroy", String::from("vpc-0")),
                ("create", String::from("vpc2")),
            ]
        );

        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[&key("x_thing.a_vpc")].dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_prevent_destroy_aborts_whole_run() {
        let provider = Arc::new(RecordingProvider::updatable());
        let engine = engine(provider.clone());
        let protected = named("x_thing.bucket", "bucket").with_lifecycle(LifecyclePolicy {
            prevent_destroy: true,
            ..Default::default()
        });
        engine
            .apply(&ResourceModel::from_resources([protected]).unwrap(), &PlanOptions::default())
            .await
            .unwrap();
        let before = engine.snapshot().await.unwrap();
        let calls = provider.mutations().len();

        // The bucket leaves the model while an unrelated resource is added
        let next = ResourceModel::from_resources([named("x_thing.queue", "queue")]).unwrap();
        let err = engine.apply(&next, &PlanOptions::default()).await.unwrap_err();

        assert!(matches!(
            err,
            ConvergeError::Policy(PolicyError::ProtectedResource { ref resource, .. }) if *resource == key("x_thing.bucket")
        ));
        assert_eq!(provider.mutations().len(), calls);
        assert_eq!(engine.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_ignored_change_converges_other_change_updates() {
        let provider = Arc::new(RecordingProvider::updatable());
        let engine = engine(provider.clone());
        let lifecycle = LifecyclePolicy {
            ignore_changes: ["tags".parse().unwrap()].into(),
            ..Default::default()
        };
        let thing = |tag: &str, size: i64| {
            named("x_thing.web", "web")
                .with_attribute("tags", json!({ "Name": tag }))
                .with_attribute("size", json!(size))
                .with_lifecycle(lifecycle.clone())
        };

        engine
            .apply(&ResourceModel::from_resources([thing("a", 1)]).unwrap(), &PlanOptions::default())
            .await
            .unwrap();

        let ignored = engine
            .plan(&ResourceModel::from_resources([thing("b", 1)]).unwrap(), &PlanOptions::default())
            .await
            .unwrap();
        assert!(ignored.is_converged());

        let updated = engine
            .plan(&ResourceModel::from_resources([thing("b", 2)]).unwrap(), &PlanOptions::default())
            .await
            .unwrap();
        let entry = updated.entry(&key("x_thing.web")).unwrap();
        assert!(matches!(entry.action, PlannedAction::UpdateInPlace(ref c) if c.len() == 1));
    }

    #[tokio::test]
    async fn test_trigger_replaces_updatable_attribute() {
        let provider = Arc::new(RecordingProvider::updatable());
        let engine = engine(provider.clone());
        let thing = |data: &str| {
            named("x_thing.web", "web")
                .with_attribute("user_data", json!(data))
                .with_lifecycle(LifecyclePolicy {
                    replace_triggered_by: ["user_data".parse().unwrap()].into(),
                    create_before_destroy: true,
                    ..Default::default()
                })
        };

        engine
            .apply(&ResourceModel::from_resources([thing("v1")]).unwrap(), &PlanOptions::default())
            .await
            .unwrap();
        let old_id = engine.snapshot().await.unwrap()[&key("x_thing.web")].remote_id.clone();

        let report = engine
            .apply(&ResourceModel::from_resources([thing("v2")]).unwrap(), &PlanOptions::default())
            .await
            .unwrap();
        assert_eq!(report.resources[0].action, PlannedAction::Replace { create_first: true });

        let new_id = engine.snapshot().await.unwrap()[&key("x_thing.web")].remote_id.clone();
        assert_ne!(old_id, new_id);
        assert_eq!(provider.remote_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_completed_state() {
        let provider = Arc::new(RecordingProvider::updatable());
        provider.fail_on("subnet");
        let engine = engine(provider.clone());

        let report = engine.apply(&network(), &PlanOptions::default()).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::PartialFailure);
        assert!(!report.is_success());

        let snapshot = engine.snapshot().await.unwrap();
        assert!(snapshot.contains_key(&key("x_thing.vpc")));
        assert!(!snapshot.contains_key(&key("x_thing.subnet")));
    }

    #[tokio::test]
    async fn test_cancelled_engine_reports_cancelled() {
        let provider = Arc::new(RecordingProvider::updatable());
        let flag = CancellationFlag::new();
        let engine = engine(provider.clone()).with_cancellation(flag.clone());
        flag.cancel();

        let report = engine.apply(&network(), &PlanOptions::default()).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert!(provider.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_stale_plan_is_refused() {
        let provider = Arc::new(RecordingProvider::updatable());
        let engine = engine(provider.clone());
        let model = network();

        let plan = engine.plan(&model, &PlanOptions::default()).await.unwrap();
        engine.apply(&model, &PlanOptions::default()).await.unwrap();

        let err = engine.apply_plan(&plan, &model).await.unwrap_err();
        assert!(matches!(err, ConvergeError::Plan(PlanError::StalePlan { .. })));
    }

    #[tokio::test]
    async fn test_plan_for_other_model_is_refused() {
        let provider = Arc::new(RecordingProvider::updatable());
        let engine = engine(provider.clone());
        let model = network();
        let plan = engine.plan(&model, &PlanOptions::default()).await.unwrap();

        let smaller = ResourceModel::from_resources([named("x_thing.vpc", "vpc")]).unwrap();
        let err = engine.apply_plan(&plan, &smaller).await.unwrap_err();
        assert!(matches!(err, ConvergeError::Plan(PlanError::ModelMismatch { .. })));

        let edited = ResourceModel::from_resources([
            named("x_thing.vpc", "vpc").with_attribute("cidr", json!("10.1.0.0/16")),
            named("x_thing.subnet", "subnet"),
        ])
        .unwrap();
        let err = engine.apply_plan(&plan, &edited).await.unwrap_err();
        assert!(matches!(err, ConvergeError::Plan(PlanError::ModelChanged { .. })));

        let report = engine.apply_plan(&plan, &model).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_destroy_mode_empties_state() {
        let provider = Arc::new(RecordingProvider::updatable());
        let engine = engine(provider.clone());
        let model = network();
        engine.apply(&model, &PlanOptions::default()).await.unwrap();

        let options = PlanOptions {
            mode: PlanMode::Destroy,
            ..Default::default()
        };
        let report = engine.apply(&model, &options).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Succeeded);

        let destroys: Vec<(&str, String)> = provider
            .mutations()
            .into_iter()
            .filter(|(op, _)| *op == "destroy")
            .map(|(op, subject)| (op, subject.split('-').next().unwrap_or_default().to_string()))
            .collect();
        assert_eq!(
            destroys,
            vec![("destroy", String::from("subnet")), ("destroy", String::from("vpc"))]
        );
        assert!(engine.snapshot().await.unwrap().is_empty());
        assert_eq!(provider.remote_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_drops_vanished_objects() {
        let provider = Arc::new(RecordingProvider::updatable());
        let engine = engine(provider.clone());
        let model = network();
        engine.apply(&model, &PlanOptions::default()).await.unwrap();

        let vpc_id = engine.snapshot().await.unwrap()[&key("x_thing.vpc")].remote_id.clone();
        provider.forget(&vpc_id);

        let report = engine.refresh().await.unwrap();
        assert_eq!(report.removed, vec![key("x_thing.vpc")]);
        assert_eq!(report.unchanged, 1);
        assert!(!report.has_errors());

        let plan = engine.plan(&model, &PlanOptions::default()).await.unwrap();
        assert_eq!(plan.entry(&key("x_thing.vpc")).unwrap().action, PlannedAction::Create);
        assert!(matches!(
            plan.entry(&key("x_thing.subnet")).unwrap().action,
            PlannedAction::UpdateInPlace(_)
        ));
    }

    #[tokio::test]
    async fn test_refresh_records_drift_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(
            LocalFileProvider::RESOURCE_TYPE,
            Arc::new(LocalFileProvider::new(dir.path())) as Arc<dyn Provider>,
        );
        let store = Arc::new(LocalStateStore::with_base_dir(dir.path().join(".converge")));
        let engine = Engine::new(registry, store);

        let model = ResourceModel::from_resources([ResourceInstance::new(key("local_file.motd"))
            .with_attribute("filename", json!("motd.txt"))
            .with_attribute("content", json!("hello"))])
        .unwrap();
        engine.apply(&model, &PlanOptions::default()).await.unwrap();

        std::fs::write(dir.path().join("motd.txt"), "tampered").unwrap();
        let report = engine.refresh().await.unwrap();
        assert_eq!(report.updated, vec![key("local_file.motd")]);

        let plan = engine.plan(&model, &PlanOptions::default()).await.unwrap();
        let entry = plan.entry(&key("local_file.motd")).unwrap();
        assert!(matches!(entry.action, PlannedAction::UpdateInPlace(_)));

        engine.apply(&model, &PlanOptions::default()).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("motd.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_forget_removes_entry_only() {
        let provider = Arc::new(RecordingProvider::new(ResourceSchema::updatable_by_default()));
        let engine = engine(provider.clone());
        engine.apply(&network(), &PlanOptions::default()).await.unwrap();

        assert!(engine.forget(&key("x_thing.subnet")).await.unwrap());
        assert!(!engine.forget(&key("x_thing.subnet")).await.unwrap());
        assert_eq!(provider.remote_count(), 2);
    }
}
