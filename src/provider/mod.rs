//! Provider adapter module.
//!
//! Providers perform the remote calls for a resource type. This module
//! provides:
//! - The [`Provider`] trait and per-type [`ResourceSchema`]
//! - A [`ProviderRegistry`] mapping resource types to providers
//! - Built-in `null_resource` and `local_file` providers

mod adapter;
mod registry;
mod null;
mod local_file;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{Created, Provider, ResourceSchema};
pub use registry::ProviderRegistry;
pub use null::NullProvider;
pub use local_file::LocalFileProvider;

#[cfg(test)]
pub use adapter::MockProvider;
