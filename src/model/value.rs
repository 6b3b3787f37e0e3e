//! Attribute expressions.
//!
//! A desired attribute is either a literal JSON value or something that
//! depends on another resource's attributes, which may only be known once
//! that resource has been applied. Expressions are built from the front-end
//! string syntax `${type.name.attr}`:
//!
//! - a string that is exactly one reference becomes [`Expr::Reference`] and
//!   evaluates to the referenced value with its JSON type preserved;
//! - a string with embedded references becomes [`Expr::Template`] and
//!   evaluates to a string;
//! - `$${` produces a literal `${`.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::ConfigError;

use super::key::{AttributePath, ResourceKey};

/// Attribute map of fully known values.
pub type Attributes = BTreeMap<String, Value>;

/// A pointer to an attribute of another resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    /// The referenced resource.
    pub target: ResourceKey,
    /// Path inside the referenced resource's attributes.
    pub path: AttributePath,
}

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Literal text.
    Text(String),
    /// An embedded reference, rendered as a string.
    Ref(Reference),
}

/// A desired attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A fully known value.
    Literal(Value),
    /// A whole-value reference to another resource's attribute.
    Reference(Reference),
    /// A string with embedded references.
    Template(Vec<TemplatePart>),
    /// A list whose items may contain references.
    List(Vec<Expr>),
    /// A map whose values may contain references.
    Map(BTreeMap<String, Expr>),
}

impl Reference {
    /// Parses `type.name.path...`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than three segments are present or the key
    /// part is not a valid resource key.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let mut parts = s.splitn(3, '.');
        let (Some(resource_type), Some(name), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigError::syntax(
                "reference",
                s,
                "expected TYPE.NAME.ATTRIBUTE",
            ));
        };

        let target: ResourceKey = format!("{resource_type}.{name}").parse()?;
        let path: AttributePath = path.parse()?;
        Ok(Self { target, path })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.path)
    }
}

impl Expr {
    /// Builds an expression from a raw configuration value, parsing
    /// `${...}` references inside strings.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference is malformed or unterminated.
    pub fn parse(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::String(s) => parse_string(s),
            Value::Array(items) => items
                .iter()
                .map(Self::parse)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Self::parse(v).map(|e| (k.clone(), e)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Self::Map),
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// Creates a reference expression.
    #[must_use]
    pub const fn reference(target: ResourceKey, path: AttributePath) -> Self {
        Self::Reference(Reference { target, path })
    }

    /// Collects every reference contained in this expression.
    pub fn collect_references(&self, out: &mut BTreeSet<Reference>) {
        match self {
            Self::Literal(_) => {}
            Self::Reference(r) => {
                out.insert(r.clone());
            }
            Self::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Ref(r) = part {
                        out.insert(r.clone());
                    }
                }
            }
            Self::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Map(map) => {
                for value in map.values() {
                    value.collect_references(out);
                }
            }
        }
    }

    /// Returns true if the expression contains no references.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        let mut refs = BTreeSet::new();
        self.collect_references(&mut refs);
        refs.is_empty()
    }

    /// Evaluates the expression.
    ///
    /// `lookup` returns the value behind a reference, or `None` while it is
    /// not yet known. The result is `None` if any reference is unknown.
    pub fn evaluate<F>(&self, lookup: &F) -> Option<Value>
    where
        F: Fn(&Reference) -> Option<Value>,
    {
        match self {
            Self::Literal(v) => Some(v.clone()),
            Self::Reference(r) => lookup(r),
            Self::Template(parts) => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => rendered.push_str(text),
                        TemplatePart::Ref(r) => rendered.push_str(&render(&lookup(r)?)),
                    }
                }
                Some(Value::String(rendered))
            }
            Self::List(items) => items
                .iter()
                .map(|item| item.evaluate(lookup))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| v.evaluate(lookup).map(|v| (k.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(Value::Object),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Reference(r) => write!(f, "${{{r}}}"),
            Self::Template(parts) => {
                write!(f, "\"")?;
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => write!(f, "{}", text.replace("${", "$${"))?,
                        TemplatePart::Ref(r) => write!(f, "${{{r}}}")?,
                    }
                }
                write!(f, "\"")
            }
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Renders a value for interpolation: strings verbatim, everything else as JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_string(s: &str) -> Result<Expr, ConfigError> {
    let mut parts: Vec<TemplatePart> = Vec::new();
    let mut text = String::new();
    let mut rest = s;

    while let Some(pos) = rest.find("${") {
        if rest[..pos].ends_with('$') {
            text.push_str(&rest[..pos - 1]);
            text.push_str("${");
            rest = &rest[pos + 2..];
            continue;
        }

        text.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::syntax("reference", s, "unterminated '${'"));
        };

        if !text.is_empty() {
            parts.push(TemplatePart::Text(std::mem::take(&mut text)));
        }
        parts.push(TemplatePart::Ref(Reference::parse(after[..end].trim())?));
        rest = &after[end + 1..];
    }
    text.push_str(rest);

    if parts.is_empty() {
        return Ok(Expr::Literal(Value::String(text)));
    }
    if !text.is_empty() {
        parts.push(TemplatePart::Text(text));
    }

    match parts.as_slice() {
        [TemplatePart::Ref(r)] => Ok(Expr::Reference(r.clone())),
        _ => Ok(Expr::Template(parts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference(s: &str) -> Reference {
        Reference::parse(s).unwrap()
    }

    #[test]
    fn test_plain_string_is_literal() {
        let expr = Expr::parse(&json!("10.0.0.0/16")).unwrap();
        assert_eq!(expr, Expr::Literal(json!("10.0.0.0/16")));
        assert!(expr.is_literal());
    }

    #[test]
    fn test_whole_string_reference() {
        let expr = Expr::parse(&json!("${aws_vpc.main.id}")).unwrap();
        assert_eq!(expr, Expr::Reference(reference("aws_vpc.main.id")));
    }

    #[test]
    fn test_embedded_reference_becomes_template() {
        let expr = Expr::parse(&json!("arn:${aws_s3_bucket.logs.arn}/*")).unwrap();
        assert_eq!(
            expr,
            Expr::Template(vec![
                TemplatePart::Text(String::from("arn:")),
                TemplatePart::Ref(reference("aws_s3_bucket.logs.arn")),
                TemplatePart::Text(String::from("/*")),
            ])
        );
    }

    #[test]
    fn test_escaped_interpolation_stays_literal() {
        let expr = Expr::parse(&json!("echo $${HOME}")).unwrap();
        assert_eq!(expr, Expr::Literal(json!("echo ${HOME}")));
    }

    #[test]
    fn test_malformed_references_are_rejected() {
        assert!(Expr::parse(&json!("${aws_vpc.main")).is_err());
        assert!(Expr::parse(&json!("${aws_vpc.main}")).is_err());
        assert!(Expr::parse(&json!("${}")).is_err());
    }

    #[test]
    fn test_nested_references_are_collected() {
        let expr = Expr::parse(&json!({
            "subnets": ["${aws_subnet.a.id}", "${aws_subnet.b.id}"],
            "tags": {"Name": "web-${random_id.suffix.hex}"}
        }))
        .unwrap();

        let mut refs = BTreeSet::new();
        expr.collect_references(&mut refs);
        let targets: Vec<String> = refs.iter().map(|r| r.target.to_string()).collect();
        assert_eq!(targets, vec!["aws_subnet.a", "aws_subnet.b", "random_id.suffix"]);
    }

    #[test]
    fn test_evaluate_preserves_referenced_type() {
        let expr = Expr::parse(&json!("${aws_instance.web.cpu_count}")).unwrap();
        let value = expr.evaluate(&|_: &Reference| Some(json!(4)));
        assert_eq!(value, Some(json!(4)));
    }

    #[test]
    fn test_evaluate_template_renders_strings() {
        let expr = Expr::parse(&json!("${aws_vpc.main.id}-${aws_vpc.main.cidr_count}")).unwrap();
        let value = expr.evaluate(&|r: &Reference| match r.path.head() {
            "id" => Some(json!("vpc-123")),
            _ => Some(json!(2)),
        });
        assert_eq!(value, Some(json!("vpc-123-2")));
    }

    #[test]
    fn test_unknown_reference_makes_value_unknown() {
        let expr = Expr::parse(&json!({"vpc_id": "${aws_vpc.main.id}", "cidr": "10.0.1.0/24"})).unwrap();
        assert_eq!(expr.evaluate(&|_: &Reference| None), None);
    }
}
