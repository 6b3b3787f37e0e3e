// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items should be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Converge
//!
//! A declarative, idempotent reconciliation engine for arbitrary resources.
//!
//! ## Overview
//!
//! Converge reads a model of named resources, compares it with the state
//! recorded by the last run and drives provider adapters until the real
//! world matches the model:
//!
//! - Resources reference each other's attributes, which orders the work
//! - Values only known after creation flow to dependents at apply time
//! - Lifecycle rules guard against destruction and force replacements
//! - Independent resources are applied concurrently
//!
//! ## Architecture
//!
//! 1. **Model**: resources declared in `converge.yaml`
//! 2. **State**: what the last run recorded for each resource
//! 3. **Plan**: one action per resource, derived from the diff and lifecycle
//! 4. **Apply**: a scheduler walks the dependency graph and calls providers
//!
//! ## Modules
//!
//! - [`model`]: Resource keys, expressions and reference resolution
//! - [`graph`]: Dependency graph and cycle detection
//! - [`planner`]: Diff, lifecycle policy, plans and the scheduler
//! - [`provider`]: Provider adapters and the registry
//! - [`state`]: State storage backends (local, memory)
//! - [`engine`]: Plan and apply orchestration
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: web-stack
//!
//! resources:
//!   - type: null_resource
//!     name: release
//!     attributes:
//!       triggers:
//!         version: "1"
//!   - type: local_file
//!     name: motd
//!     attributes:
//!       filename: motd.txt
//!       content: "release ${null_resource.release.id}"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod planner;
pub mod provider;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, ModelConfig};
pub use engine::{ApplyReport, Engine, EngineOptions, RefreshReport, RunOutcome};
pub use error::{ConvergeError, Result};
pub use graph::DependencyGraph;
pub use model::{ReferenceResolver, ResourceInstance, ResourceKey, ResourceModel};
pub use planner::{DiffEngine, Plan, PlanMode, PlanOptions, PlannedAction, PolicyEngine, Scheduler};
pub use provider::{Provider, ProviderRegistry};
pub use state::{LocalStateStore, MemoryStateStore, StateEntry, StateStore};
