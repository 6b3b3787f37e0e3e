//! Fingerprints for change detection.
//!
//! A saved plan records a fingerprint of the model it was computed from and
//! of the state it was computed against. Applying the plan later is refused
//! if either has moved on.

use sha2::{Digest, Sha256};

use crate::model::{ResourceInstance, ResourceModel};
use crate::state::{StateEntry, StateSnapshot};

/// Hasher for computing model and state fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Fingerprints the desired model.
    ///
    /// Resources are hashed in key order, so declaration order does not
    /// affect the result.
    #[must_use]
    pub fn hash_model(&self, model: &ResourceModel) -> String {
        let mut resources: Vec<&ResourceInstance> = model.iter().collect();
        resources.sort_by(|a, b| a.key.cmp(&b.key));

        let mut hasher = Sha256::new();
        for resource in resources {
            hasher.update(self.hash_resource(resource).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Fingerprints a single resource declaration.
    #[must_use]
    pub fn hash_resource(&self, resource: &ResourceInstance) -> String {
        let mut hasher = Sha256::new();

        field(&mut hasher, resource.key.to_string().as_bytes());

        // Attribute maps are ordered, expressions render canonically
        for (name, expr) in &resource.attributes {
            field(&mut hasher, name.as_bytes());
            field(&mut hasher, expr.to_string().as_bytes());
        }

        let mut depends_on: Vec<String> = resource.depends_on.iter().map(ToString::to_string).collect();
        depends_on.sort_unstable();
        for dependency in depends_on {
            field(&mut hasher, dependency.as_bytes());
        }

        let lifecycle = &resource.lifecycle;
        hasher.update([
            u8::from(lifecycle.prevent_destroy),
            u8::from(lifecycle.create_before_destroy),
        ]);
        for path in &lifecycle.ignore_changes {
            field(&mut hasher, format!("ignore:{path}").as_bytes());
        }
        for path in &lifecycle.replace_triggered_by {
            field(&mut hasher, format!("trigger:{path}").as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Fingerprints a state snapshot.
    ///
    /// Timestamps are left out: only what the planner reads counts.
    #[must_use]
    pub fn hash_state(&self, snapshot: &StateSnapshot) -> String {
        let mut hasher = Sha256::new();
        for (key, entry) in snapshot {
            field(&mut hasher, key.to_string().as_bytes());
            field(&mut hasher, entry_digest(entry).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Length-prefixed update so adjacent fields cannot run together.
fn field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn entry_digest(entry: &StateEntry) -> String {
    let mut hasher = Sha256::new();
    field(&mut hasher, entry.resource_type.as_bytes());
    field(&mut hasher, entry.remote_id.as_bytes());
    // serde_json maps are sorted, so the rendering is canonical
    field(&mut hasher, serde_json::Value::from_iter(entry.attributes.clone()).to_string().as_bytes());
    field(&mut hasher, serde_json::Value::from_iter(entry.inputs.clone()).to_string().as_bytes());
    for dependency in &entry.dependencies {
        field(&mut hasher, dependency.to_string().as_bytes());
    }
    hasher.update([
        u8::from(entry.lifecycle.prevent_destroy),
        u8::from(entry.lifecycle.create_before_destroy),
    ]);
    for path in entry.lifecycle.ignore_changes.iter().chain(&entry.lifecycle.replace_triggered_by) {
        field(&mut hasher, path.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LifecyclePolicy, ResourceKey};
    use serde_json::json;

    fn resource(name: &str, size: i64) -> ResourceInstance {
        ResourceInstance::new(ResourceKey::new("null_resource", name)).with_attribute("size", json!(size))
    }

    #[test]
    fn test_model_hash_ignores_declaration_order() {
        let hasher = ConfigHasher::new();
        let forward = ResourceModel::from_resources([resource("a", 1), resource("b", 2)]).unwrap();
        let backward = ResourceModel::from_resources([resource("b", 2), resource("a", 1)]).unwrap();

        assert_eq!(hasher.hash_model(&forward), hasher.hash_model(&backward));
    }

    #[test]
    fn test_model_hash_sees_attribute_and_lifecycle_changes() {
        let hasher = ConfigHasher::new();
        let base = hasher.hash_resource(&resource("a", 1));

        assert_ne!(base, hasher.hash_resource(&resource("a", 2)));

        let protected = resource("a", 1).with_lifecycle(LifecyclePolicy {
            prevent_destroy: true,
            ..Default::default()
        });
        assert_ne!(base, hasher.hash_resource(&protected));
    }

    #[test]
    fn test_state_hash_ignores_timestamps() {
        let hasher = ConfigHasher::new();
        let key = ResourceKey::new("null_resource", "a");
        let entry = StateEntry::new("null_resource", "id-1", [(String::from("x"), json!(1))].into());

        let mut later = entry.clone();
        later.updated_at = later.updated_at + chrono::Duration::seconds(30);

        let first: StateSnapshot = [(key.clone(), entry)].into();
        let second: StateSnapshot = [(key.clone(), later.clone())].into();
        assert_eq!(hasher.hash_state(&first), hasher.hash_state(&second));

        later.remote_id = String::from("id-2");
        let third: StateSnapshot = [(key, later)].into();
        assert_ne!(hasher.hash_state(&first), hasher.hash_state(&third));
    }

    #[test]
    fn test_empty_state_hash_is_stable() {
        let hasher = ConfigHasher::new();
        assert_eq!(
            hasher.hash_state(&StateSnapshot::new()),
            hasher.hash_state(&StateSnapshot::new())
        );
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }

    #[test]
    fn test_hashes_match() {
        assert!(ConfigHasher::hashes_match("abc123", "abc123"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc124"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc12"));
    }
}
