//! Planning and execution module.
//!
//! This module turns a desired model and recorded state into a plan and
//! executes it:
//! - Attribute diffing against the state store
//! - Lifecycle policy evaluation
//! - Pure plan construction in dependency order
//! - Bounded concurrent execution

mod diff;
mod policy;
mod plan;
mod scheduler;

pub use diff::{AttributeChange, DesiredAttributes, DiffEngine, RawDiff};
pub use policy::{Evaluation, PolicyDecision, PolicyEngine};
pub use plan::{plan, Plan, PlanEntry, PlanMode, PlanOptions, PlannedAction};
pub use scheduler::{
    CancellationFlag, ExecutionResult, FailurePolicy, NodeOutcome, NodeStatus, Scheduler,
    DEFAULT_PARALLELISM,
};
