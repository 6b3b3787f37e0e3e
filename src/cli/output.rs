//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ModelConfig, ValidationResult};
use crate::engine::{ApplyReport, RefreshReport, RunOutcome};
use crate::model::{DependencySet, ResourceKey};
use crate::planner::{NodeStatus, Plan, PlanMode, PlannedAction, PolicyDecision};
use crate::state::{StateEntry, StateSnapshot};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Apply outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// State entry row for table display.
#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Remote ID")]
    remote_id: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

#[derive(Serialize)]
struct PlanSummaryJson<'a> {
    converged: bool,
    to_add: usize,
    to_change: usize,
    to_replace: usize,
    to_destroy: usize,
    plan: &'a Plan,
}

#[derive(Serialize)]
struct GraphJson<'a> {
    layers: &'a [Vec<ResourceKey>],
    edges: Vec<(&'a ResourceKey, ResourceKey)>,
}

#[derive(Serialize)]
struct ValidationJson<'a> {
    valid: bool,
    project: &'a str,
    environment: &'a str,
    resources: usize,
    warnings: &'a [String],
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the configured format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&PlanSummaryJson {
                converged: plan.is_converged(),
                to_add: plan.to_add(),
                to_change: plan.to_change(),
                to_replace: plan.to_replace(),
                to_destroy: plan.to_destroy(),
                plan,
            }),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    fn format_plan_text(plan: &Plan, detailed: bool) -> String {
        if plan.is_converged() {
            return format!("{} No changes. Infrastructure matches the configuration.\n", "✓".green());
        }

        let mut output = String::new();
        let title = match plan.mode {
            PlanMode::Normal => "Plan",
            PlanMode::Destroy => "Destroy plan",
        };
        let _ = write!(output, "\n{title}\n");
        let _ = write!(output, "   State: {}\n\n", short(&plan.state_fingerprint));

        let rows: Vec<PlanActionRow> = plan
            .actionable()
            .enumerate()
            .map(|(i, entry)| PlanActionRow {
                index: i + 1,
                action: Self::format_action(&entry.action),
                resource: entry.key.to_string(),
                reason: Self::truncate(&Self::reason(entry.changes.len(), &entry.decision), 50),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for entry in plan.actionable().filter(|e| !e.changes.is_empty()) {
                let _ = write!(output, "\n  {} {}\n", Self::format_action(&entry.action), entry.key);
                for change in &entry.changes {
                    let _ = writeln!(output, "      {change}");
                }
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to add, {} to change, {} to replace, {} to destroy.\n",
            plan.to_add().to_string().green(),
            plan.to_change().to_string().yellow(),
            plan.to_replace().to_string().yellow(),
            plan.to_destroy().to_string().red()
        );

        output
    }

    fn reason(changes: usize, decision: &PolicyDecision) -> String {
        match decision {
            PolicyDecision::Unchanged if changes == 0 => String::new(),
            PolicyDecision::Unchanged => format!("{changes} attribute(s) changed"),
            other => other.to_string(),
        }
    }

    /// Formats an apply report.
    #[must_use]
    pub fn format_apply(&self, report: &ApplyReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                let headline = match report.outcome {
                    RunOutcome::NoChanges => format!("{} No changes to apply.", "✓".green()),
                    RunOutcome::Succeeded => format!("{} Apply complete.", "✓".green()),
                    RunOutcome::PartialFailure => format!("{} Apply finished with failures.", "✗".red()),
                    RunOutcome::Cancelled => format!("{} Apply cancelled.", "⚠".yellow()),
                };

                let mut output = format!("{headline}\n");
                if report.outcome == RunOutcome::NoChanges {
                    return output;
                }

                let rows: Vec<OutcomeRow> = report
                    .resources
                    .iter()
                    .filter(|r| !r.action.is_noop())
                    .map(|r| OutcomeRow {
                        resource: r.key.to_string(),
                        action: r.action.label().to_string(),
                        status: Self::format_status(r.status),
                        error: r.error.as_deref().map(|e| Self::truncate(e, 60)).unwrap_or_default(),
                    })
                    .collect();
                output.push('\n');
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');

                let _ = write!(
                    output,
                    "\n{} succeeded, {} failed, {} skipped.\n",
                    report.count(NodeStatus::Succeeded),
                    report.count(NodeStatus::Failed),
                    report.count(NodeStatus::Skipped)
                );
                output
            }
        }
    }

    /// Formats a refresh report.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                let mut output = format!(
                    "{} Refresh complete: {} updated, {} removed, {} unchanged.\n",
                    "✓".green(),
                    report.updated.len(),
                    report.removed.len(),
                    report.unchanged
                );
                for key in &report.updated {
                    let _ = writeln!(output, "   {} {key}", "~".yellow());
                }
                for key in &report.removed {
                    let _ = writeln!(output, "   {} {key} (gone)", "-".red());
                }
                for (key, error) in &report.errors {
                    let _ = writeln!(output, "   {} {key}: {error}", "⚠".yellow());
                }
                output
            }
        }
    }

    /// Formats the dependency graph.
    #[must_use]
    pub fn format_graph(&self, layers: &[Vec<ResourceKey>], dependencies: &DependencySet) -> String {
        match self.format {
            OutputFormat::Json => to_json(&GraphJson {
                layers,
                edges: dependencies.edges().collect(),
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                for (i, layer) in layers.iter().enumerate() {
                    let _ = writeln!(output, "Layer {i}:");
                    for key in layer {
                        let _ = write!(output, "   {key}");
                        if let Some(deps) = dependencies.get(key) {
                            let mut parts = Vec::new();
                            if !deps.implicit.is_empty() {
                                parts.push(format!("refs {}", join(&deps.implicit)));
                            }
                            if !deps.explicit.is_empty() {
                                parts.push(format!("depends_on {}", join(&deps.explicit)));
                            }
                            if !parts.is_empty() {
                                let _ = write!(output, " {}", format!("({})", parts.join("; ")).dimmed());
                            }
                        }
                        output.push('\n');
                    }
                }
                if layers.is_empty() {
                    output.push_str("No resources declared.\n");
                }
                output
            }
        }
    }

    /// Formats the list of recorded resources.
    #[must_use]
    pub fn format_state_list(&self, snapshot: &StateSnapshot) -> String {
        match self.format {
            OutputFormat::Json => to_json(snapshot),
            OutputFormat::Text => {
                if snapshot.is_empty() {
                    return String::from("No resources in state.\n");
                }
                let rows: Vec<StateRow> = snapshot
                    .iter()
                    .map(|(key, entry)| StateRow {
                        resource: key.to_string(),
                        remote_id: Self::truncate(&entry.remote_id, 40),
                        updated: entry.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats one recorded resource.
    #[must_use]
    pub fn format_state_entry(&self, key: &ResourceKey, entry: &StateEntry) -> String {
        match self.format {
            OutputFormat::Json => to_json(entry),
            OutputFormat::Text => {
                let mut output = format!("{}\n", key.to_string().bold());
                let _ = writeln!(output, "   Remote ID: {}", entry.remote_id);
                let _ = writeln!(output, "   Created: {}", entry.created_at);
                let _ = writeln!(output, "   Updated: {}", entry.updated_at);
                if !entry.dependencies.is_empty() {
                    let deps: Vec<String> = entry.dependencies.iter().map(ToString::to_string).collect();
                    let _ = writeln!(output, "   Depends on: {}", deps.join(", "));
                }
                if entry.lifecycle.prevent_destroy {
                    let _ = writeln!(output, "   Protected: prevent_destroy");
                }
                output.push_str("   Attributes:\n");
                for (name, value) in &entry.attributes {
                    let _ = writeln!(output, "      {name} = {value}");
                }
                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, config: &ModelConfig, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ValidationJson {
                valid: result.is_valid(),
                project: &config.project.name,
                environment: &config.project.environment,
                resources: config.resources.len(),
                warnings: &result.warnings,
            }),
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid.\n", "✓".green());
                if show_warnings && !result.warnings.is_empty() {
                    output.push_str("\nWarnings:\n");
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   {} {warning}", "⚠".yellow());
                    }
                }
                output.push_str("\nConfiguration summary:\n");
                let _ = writeln!(output, "   Project: {}", config.project.name);
                let _ = writeln!(output, "   Environment: {}", config.project.environment);
                let _ = writeln!(output, "   Resources: {}", config.resources.len());
                let _ = writeln!(output, "   Parallelism: {}", config.execution.parallelism);
                output
            }
        }
    }

    /// Formats a plain message, e.g. the result of `state rm`.
    #[must_use]
    pub fn message(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "message": message })),
            OutputFormat::Text => format!("{message}\n"),
        }
    }

    /// Formats an action with color.
    fn format_action(action: &PlannedAction) -> String {
        match action {
            PlannedAction::NoOp => "no-op".dimmed().to_string(),
            PlannedAction::Create => "+create".green().to_string(),
            PlannedAction::UpdateInPlace(_) => "~update".yellow().to_string(),
            PlannedAction::Replace { create_first: true } => "+/-replace".yellow().to_string(),
            PlannedAction::Replace { create_first: false } => "-/+replace".yellow().to_string(),
            PlannedAction::Destroy => "-destroy".red().to_string(),
        }
    }

    /// Formats a node status with color.
    fn format_status(status: NodeStatus) -> String {
        match status {
            NodeStatus::Succeeded => "succeeded".green().to_string(),
            NodeStatus::Failed => "failed".red().to_string(),
            NodeStatus::Skipped => "skipped".dimmed().to_string(),
            NodeStatus::Pending | NodeStatus::Ready | NodeStatus::Running => "pending".yellow().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn join(keys: &std::collections::BTreeSet<ResourceKey>) -> String {
    keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
