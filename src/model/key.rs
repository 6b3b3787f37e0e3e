//! Resource keys and attribute paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Stable identity of a resource instance: its type plus its logical name.
///
/// Rendered and parsed as `type.name`, e.g. `aws_vpc.main`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey {
    /// Resource type, which selects the provider adapter.
    pub resource_type: String,
    /// Logical name, unique within the type.
    pub name: String,
}

/// A dotted path into an attribute map, e.g. `tags.Name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributePath(Vec<String>);

impl ResourceKey {
    /// Creates a key from its parts.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((resource_type, name)) = s.split_once('.') else {
            return Err(ConfigError::syntax(
                "resource key",
                s,
                "expected TYPE.NAME",
            ));
        };

        if !is_identifier(resource_type) || !is_identifier(name) {
            return Err(ConfigError::syntax(
                "resource key",
                s,
                "type and name must be identifiers (letters, digits, '_' or '-')",
            ));
        }

        Ok(Self::new(resource_type, name))
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}

impl AttributePath {
    /// Creates a path from its segments.
    #[must_use]
    pub const fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Creates a single-segment path.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the top-level attribute name.
    #[must_use]
    pub fn head(&self) -> &str {
        self.0.first().map_or("", String::as_str)
    }

    /// Returns true if `self` is `other` or one of its ancestors.
    ///
    /// `tags` covers `tags` and `tags.Name`, but not `tagsx`.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Looks the path up in a JSON value.
    #[must_use]
    pub fn lookup<'a>(&self, value: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        self.0.iter().try_fold(value, |current, segment| match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => {
                segment.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        })
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for AttributePath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ConfigError::syntax("attribute path", s, "path is empty"));
        }

        let segments: Vec<String> = s.split('.').map(String::from).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ConfigError::syntax(
                "attribute path",
                s,
                "path contains an empty segment",
            ));
        }

        Ok(Self(segments))
    }
}

impl TryFrom<String> for AttributePath {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AttributePath> for String {
    fn from(path: AttributePath) -> Self {
        path.to_string()
    }
}

/// Returns true if `s` is a non-empty identifier made of ASCII letters,
/// digits, underscores or hyphens, starting with a letter or underscore.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_round_trips_through_display() {
        let key: ResourceKey = "aws_vpc.main".parse().unwrap();
        assert_eq!(key.resource_type, "aws_vpc");
        assert_eq!(key.name, "main");
        assert_eq!(key.to_string(), "aws_vpc.main");
    }

    #[test]
    fn test_key_rejects_malformed_input() {
        assert!("aws_vpc".parse::<ResourceKey>().is_err());
        assert!(".main".parse::<ResourceKey>().is_err());
        assert!("aws_vpc.".parse::<ResourceKey>().is_err());
        assert!("aws vpc.main".parse::<ResourceKey>().is_err());
        assert!("1aws.main".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn test_key_serializes_as_string() {
        let key = ResourceKey::new("aws_sqs_queue", "orders");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"aws_sqs_queue.orders\"");

        let back: ResourceKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_path_covers_descendants_only() {
        let tags: AttributePath = "tags".parse().unwrap();
        let name: AttributePath = "tags.Name".parse().unwrap();
        let other: AttributePath = "tagsx".parse().unwrap();

        assert!(tags.covers(&tags));
        assert!(tags.covers(&name));
        assert!(!name.covers(&tags));
        assert!(!tags.covers(&other));
    }

    #[test]
    fn test_path_lookup() {
        let value = json!({"tags": {"Name": "web"}, "ports": [80, 443]});

        let name: AttributePath = "tags.Name".parse().unwrap();
        assert_eq!(name.lookup(&value), Some(&json!("web")));

        let port: AttributePath = "ports.1".parse().unwrap();
        assert_eq!(port.lookup(&value), Some(&json!(443)));

        let missing: AttributePath = "tags.Owner".parse().unwrap();
        assert_eq!(missing.lookup(&value), None);
    }

    #[test]
    fn test_path_rejects_empty_segments() {
        assert!("".parse::<AttributePath>().is_err());
        assert!("tags..Name".parse::<AttributePath>().is_err());
    }
}
