//! Lifecycle policy evaluation.
//!
//! Runs on every raw diff before it becomes a planned action. A policy may
//! suppress ignored changes, upgrade an update to a replacement, set the
//! replacement order, or veto anything that destroys a protected resource.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::error::PolicyError;
use crate::model::{AttributePath, LifecyclePolicy, ResourceKey};
use crate::provider::ResourceSchema;

use super::diff::{AttributeChange, DiffEngine, RawDiff};
use super::plan::PlannedAction;

/// What the policy engine did to the raw action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The raw action stands.
    Unchanged,
    /// Changes under `ignore_changes` were dropped, downgrading the action.
    Suppressed {
        /// The ignored paths.
        ignored: BTreeSet<AttributePath>,
    },
    /// The action was upgraded to a replacement.
    Upgraded {
        /// Changed paths that forced the replacement.
        triggers: BTreeSet<AttributePath>,
    },
}

/// Outcome of evaluating one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Final action.
    pub action: PlannedAction,
    /// Changes remaining after masking.
    pub changes: Vec<AttributeChange>,
    /// What the policy did.
    pub decision: PolicyDecision,
}

/// Engine evaluating lifecycle policies.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Creates a new policy engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Applies a lifecycle policy to a raw diff.
    ///
    /// `force_replace` upgrades any action on an existing object to a
    /// replacement.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ProtectedResource`] if the final action would
    /// destroy a resource with `prevent_destroy`.
    pub fn evaluate(
        &self,
        key: &ResourceKey,
        lifecycle: &LifecyclePolicy,
        raw: RawDiff,
        schema: &ResourceSchema,
        force_replace: bool,
    ) -> Result<Evaluation, PolicyError> {
        let RawDiff { action, changes } = raw;
        let mut decision = PolicyDecision::Unchanged;

        let (action, changes) = match action {
            PlannedAction::UpdateInPlace(_) | PlannedAction::Replace { .. } => {
                let (ignored, kept): (Vec<_>, Vec<_>) =
                    changes.into_iter().partition(|c| lifecycle.ignores(&c.path));

                if ignored.is_empty() {
                    (action, kept)
                } else {
                    let action = DiffEngine::classify(&kept, schema);
                    debug!("{key}: ignoring {} change(s), now {}", ignored.len(), action.label());
                    decision = PolicyDecision::Suppressed {
                        ignored: ignored.into_iter().map(|c| c.path).collect(),
                    };
                    (action, kept)
                }
            }
            other => (other, changes),
        };

        let (action, decision) = match action {
            PlannedAction::UpdateInPlace(ref updates) => {
                let triggers: BTreeSet<AttributePath> = updates
                    .iter()
                    .filter(|c| lifecycle.triggers_replace(&c.path))
                    .map(|c| c.path.clone())
                    .collect();

                if triggers.is_empty() && !force_replace {
                    (action, decision)
                } else {
                    debug!("{key}: replacement forced");
                    (
                        PlannedAction::Replace { create_first: false },
                        PolicyDecision::Upgraded { triggers },
                    )
                }
            }
            PlannedAction::NoOp if force_replace => (
                PlannedAction::Replace { create_first: false },
                PolicyDecision::Upgraded {
                    triggers: BTreeSet::new(),
                },
            ),
            other => (other, decision),
        };

        let action = match action {
            PlannedAction::Replace { .. } => PlannedAction::Replace {
                create_first: lifecycle.create_before_destroy,
            },
            other => other,
        };

        if lifecycle.prevent_destroy && action.destroys() {
            return Err(PolicyError::ProtectedResource {
                resource: key.clone(),
                action: action.label().to_string(),
            });
        }

        Ok(Evaluation {
            action,
            changes,
            decision,
        })
    }
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |paths: &BTreeSet<AttributePath>| {
            paths.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        };
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::Suppressed { ignored } => write!(f, "ignored changes to {}", join(ignored)),
            Self::Upgraded { triggers } if triggers.is_empty() => write!(f, "replacement requested"),
            Self::Upgraded { triggers } => write!(f, "replacement triggered by {}", join(triggers)),
        }
    }
}
