//! State management module.
//!
//! The state store is the only thing that survives between runs: for each
//! resource key, the attributes last recorded after a successful apply and
//! the identifier the provider assigned to the remote object.

mod store;
mod local;
mod memory;
mod types;

pub use store::StateStore;
pub use local::{LocalStateStore, STATE_DIR};
pub use memory::MemoryStateStore;
pub use types::{StateDocument, StateEntry, StateSnapshot, STATE_VERSION};
