//! Dependency graph module.
//!
//! A directed graph over resource keys where an edge `A -> B` means
//! "B must complete before A may execute". Provides cycle detection with the
//! full cycle path and partitioning into topological layers.

mod dag;

pub use dag::DependencyGraph;
