//! Resource model module.
//!
//! This module holds the typed description of what should exist:
//! - Resource keys and attribute paths
//! - Attribute expressions, including unresolved references
//! - Resource instances with their lifecycle policies
//! - Reference resolution into a dependency relation

mod key;
mod value;
mod resource;
mod resolver;

pub use key::{AttributePath, ResourceKey};
pub use value::{Attributes, Expr, Reference, TemplatePart};
pub use resource::{LifecyclePolicy, ResourceInstance, ResourceModel};
pub use resolver::{DependencySet, ReferenceResolver, ResourceDependencies};

pub(crate) use key::is_identifier;
