//! Typed value layer.
//!
//! The host engine hands the provider loosely typed value trees in which
//! every attribute may be *known*, *null* or *unknown* (not computable until
//! apply). This module provides:
//!
//! - [`Dynamic`]: the engine-level value, one arm per schema type plus the
//!   `Null` and `Unknown` states
//! - [`Value`]: a tri-state typed value, `Known(T)`, `Null` or `Unknown`
//! - [`AttrValue`]: the single codec between [`Dynamic`] and Rust types,
//!   keyed by the declared [`AttributeType`]
//! - [`ValueTree`]: an attribute tree (config, plan or state) with typed
//!   getters and setters
//! - [`AttributePath`]: addressing into nested values
//!
//! # Example
//!
//! ```
//! use echostream_provider::value::{Value, ValueTree};
//!
//! let mut tree = ValueTree::new();
//! tree.set_known("name", "k1".to_string());
//! tree.set::<String>("arn", Value::Unknown);
//!
//! assert_eq!(tree.get::<String>("name").unwrap(), Value::Known("k1".to_string()));
//! assert!(tree.get::<String>("arn").unwrap().is_unknown());
//! assert!(tree.get::<String>("description").unwrap().is_null());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::ProviderError;
use crate::schema::AttributeType;

static NULL: Dynamic = Dynamic::Null;

/// An engine-supplied attribute value.
///
/// Sets compare without regard to element order.
#[derive(Debug, Clone, Default)]
pub enum Dynamic {
    /// Not yet computable (only valid in plans).
    Unknown,
    /// Explicitly absent.
    #[default]
    Null,
    /// A string.
    String(String),
    /// A boolean.
    Bool(bool),
    /// A 64-bit integer.
    Int64(i64),
    /// An unordered collection of unique values.
    Set(Vec<Dynamic>),
    /// A map keyed by string.
    Map(BTreeMap<String, Dynamic>),
    /// An object with a fixed set of attributes.
    Object(BTreeMap<String, Dynamic>),
}

impl Dynamic {
    /// Whether this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Whether this value carries a payload (neither null nor unknown).
    pub fn is_known(&self) -> bool {
        !self.is_null() && !self.is_unknown()
    }

    /// Whether this is a known empty string, set, map or object.
    pub fn is_known_empty(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Set(items) => items.is_empty(),
            Self::Map(entries) | Self::Object(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Whether this value or any nested value is unknown.
    pub fn contains_unknown(&self) -> bool {
        match self {
            Self::Unknown => true,
            Self::Set(items) => items.iter().any(Dynamic::contains_unknown),
            Self::Map(entries) | Self::Object(entries) => {
                entries.values().any(Dynamic::contains_unknown)
            },
            _ => false,
        }
    }

    /// A short name for the kind of this value, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Int64(_) => "int64",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }

    /// The string payload, if this is a known string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The entries of a map or object.
    pub fn as_entries(&self) -> Option<&BTreeMap<String, Dynamic>> {
        match self {
            Self::Map(entries) | Self::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Render this value for a diagnostic, eliding the payload when sensitive.
    pub fn render(&self, sensitive: bool) -> String {
        if sensitive && self.is_known() {
            return "(sensitive value)".to_string();
        }
        self.to_string()
    }

    /// Read the value at `path`.
    ///
    /// Fails with [`ProviderError::PathNotFound`] when an intermediate value
    /// is null, unknown, missing or not a container.
    pub fn descend(&self, path: &AttributePath) -> Result<&Dynamic, ProviderError> {
        let mut current = self;
        for (depth, step) in path.steps().iter().enumerate() {
            let entries = current
                .as_entries()
                .ok_or_else(|| ProviderError::PathNotFound(path.prefix(depth).to_string()))?;
            current = match entries.get(step.name()) {
                Some(value) => value,
                None if depth + 1 == path.len() => &NULL,
                None => return Err(ProviderError::PathNotFound(path.prefix(depth + 1).to_string())),
            };
        }
        Ok(current)
    }

    /// Write `value` at `path`, creating the final entry if absent.
    ///
    /// Intermediate containers must already exist; a null or unknown
    /// intermediate fails with [`ProviderError::PathNotFound`].
    pub fn write(&mut self, path: &AttributePath, value: Dynamic) -> Result<(), ProviderError> {
        let Some((last, parents)) = path.steps().split_last() else {
            *self = value;
            return Ok(());
        };
        let mut current = self;
        for (depth, step) in parents.iter().enumerate() {
            current = match current {
                Self::Map(entries) | Self::Object(entries) => entries
                    .get_mut(step.name())
                    .ok_or_else(|| ProviderError::PathNotFound(path.prefix(depth + 1).to_string()))?,
                _ => return Err(ProviderError::PathNotFound(path.prefix(depth).to_string())),
            };
        }
        match current {
            Self::Map(entries) | Self::Object(entries) => {
                entries.insert(last.name().to_string(), value);
                Ok(())
            },
            _ => Err(ProviderError::PathNotFound(path.prefix(parents.len()).to_string())),
        }
    }

    /// Convert a JSON value into an engine value.
    ///
    /// JSON cannot express unknowns, arrays become sets and objects become
    /// objects. Non-integral numbers are carried as strings.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int64(i),
                None => Self::String(n.to_string()),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Set(items.into_iter().map(Self::from_json).collect())
            },
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert this value into JSON.
    ///
    /// Fails if the value contains an unknown anywhere.
    pub fn to_json(&self) -> Result<serde_json::Value, ProviderError> {
        Ok(match self {
            Self::Unknown => {
                return Err(ProviderError::Validation(
                    "unknown values cannot be rendered as JSON".to_string(),
                ))
            },
            Self::Null => serde_json::Value::Null,
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int64(i) => serde_json::Value::from(*i),
            Self::Set(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Dynamic::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            Self::Map(entries) | Self::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, ProviderError>>()?,
            ),
        })
    }
}

impl PartialEq for Dynamic {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unknown, Self::Unknown) | (Self::Null, Self::Null) => true,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => {
                let count = |items: &[Dynamic], item: &Dynamic| items.iter().filter(|i| *i == item).count();
                a.len() == b.len() && a.iter().all(|item| count(a, item) == count(b, item))
            },
            (Self::Map(a), Self::Map(b))
            | (Self::Object(a), Self::Object(b))
            | (Self::Map(a), Self::Object(b))
            | (Self::Object(a), Self::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "(known after apply)"),
            Self::Null => write!(f, "null"),
            Self::String(s) => write!(f, "{:?}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int64(i) => write!(f, "{}", i),
            Self::Set(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            },
            Self::Map(entries) | Self::Object(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", k, v)?;
                }
                write!(f, "}}")
            },
        }
    }
}

impl From<serde_json::Value> for Dynamic {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

/// A tri-state typed value.
///
/// The "null and unknown at once" anomaly is unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value<T> {
    /// The value carries a payload.
    Known(T),
    /// The value is explicitly absent.
    #[default]
    Null,
    /// The value is not yet known.
    Unknown,
}

impl<T> Value<T> {
    /// Build a value from an option, `None` becoming null.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Known(v),
            None => Self::Null,
        }
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value is unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// The payload, if known.
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Consume into the payload, if known.
    ///
    /// This is the pointer-style input conversion: unknown and null both
    /// become `None`, which the service reads as "use the default".
    pub fn into_known(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Map the payload, preserving null and unknown.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Value<U> {
        match self {
            Self::Known(v) => Value::Known(f(v)),
            Self::Null => Value::Null,
            Self::Unknown => Value::Unknown,
        }
    }
}

impl<T: AttrValue> Value<T> {
    /// Decode an engine value into a typed tri-state value.
    pub fn decode(value: &Dynamic, path: &str) -> Result<Self, ProviderError> {
        match value {
            Dynamic::Unknown => Ok(Self::Unknown),
            Dynamic::Null => Ok(Self::Null),
            other => T::from_dynamic(other, path).map(Self::Known),
        }
    }

    /// Encode back into an engine value.
    pub fn encode(self) -> Dynamic {
        match self {
            Self::Known(v) => v.into_dynamic(),
            Self::Null => Dynamic::Null,
            Self::Unknown => Dynamic::Unknown,
        }
    }
}

/// Codec between engine values and Rust types.
///
/// Implementations only see known payloads; null and unknown are handled
/// by [`Value`].
pub trait AttrValue: Sized {
    /// The declared schema type this Rust type corresponds to.
    fn attribute_type() -> AttributeType;

    /// Decode a known engine value.
    fn from_dynamic(value: &Dynamic, path: &str) -> Result<Self, ProviderError>;

    /// Encode into an engine value.
    fn into_dynamic(self) -> Dynamic;
}

/// Build a schema-mismatch error for `value` at `path`.
pub fn mismatch(path: &str, expected: &AttributeType, value: &Dynamic) -> ProviderError {
    ProviderError::SchemaMismatch {
        attribute: path.to_string(),
        expected: expected.to_string(),
        actual: value.kind_name().to_string(),
    }
}

impl AttrValue for String {
    fn attribute_type() -> AttributeType {
        AttributeType::String
    }

    fn from_dynamic(value: &Dynamic, path: &str) -> Result<Self, ProviderError> {
        match value {
            Dynamic::String(s) => Ok(s.clone()),
            other => Err(mismatch(path, &Self::attribute_type(), other)),
        }
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::String(self)
    }
}

impl AttrValue for bool {
    fn attribute_type() -> AttributeType {
        AttributeType::Bool
    }

    fn from_dynamic(value: &Dynamic, path: &str) -> Result<Self, ProviderError> {
        match value {
            Dynamic::Bool(b) => Ok(*b),
            other => Err(mismatch(path, &Self::attribute_type(), other)),
        }
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Bool(self)
    }
}

impl AttrValue for i64 {
    fn attribute_type() -> AttributeType {
        AttributeType::Int64
    }

    fn from_dynamic(value: &Dynamic, path: &str) -> Result<Self, ProviderError> {
        match value {
            Dynamic::Int64(i) => Ok(*i),
            other => Err(mismatch(path, &Self::attribute_type(), other)),
        }
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Int64(self)
    }
}

impl<T: AttrValue + Ord> AttrValue for BTreeSet<T> {
    fn attribute_type() -> AttributeType {
        AttributeType::set(T::attribute_type())
    }

    fn from_dynamic(value: &Dynamic, path: &str) -> Result<Self, ProviderError> {
        let Dynamic::Set(items) = value else {
            return Err(mismatch(path, &Self::attribute_type(), value));
        };
        let mut set = BTreeSet::new();
        for item in items {
            let element = T::from_dynamic(known_element(item, path)?, path)?;
            if !set.insert(element) {
                return Err(ProviderError::Validation(format!(
                    "duplicate element {} in set '{}'",
                    item, path
                )));
            }
        }
        Ok(set)
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Set(self.into_iter().map(AttrValue::into_dynamic).collect())
    }
}

impl<T: AttrValue> AttrValue for BTreeMap<String, T> {
    fn attribute_type() -> AttributeType {
        AttributeType::map(T::attribute_type())
    }

    fn from_dynamic(value: &Dynamic, path: &str) -> Result<Self, ProviderError> {
        let entries = value
            .as_entries()
            .ok_or_else(|| mismatch(path, &Self::attribute_type(), value))?;
        entries
            .iter()
            .map(|(key, item)| {
                let item_path = AttributePath::parse(path).key(key).to_string();
                let decoded = T::from_dynamic(known_element(item, &item_path)?, &item_path)?;
                Ok((key.clone(), decoded))
            })
            .collect()
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Map(
            self.into_iter()
                .map(|(k, v)| (k, v.into_dynamic()))
                .collect(),
        )
    }
}

fn known_element<'a>(item: &'a Dynamic, path: &str) -> Result<&'a Dynamic, ProviderError> {
    if item.is_known() {
        Ok(item)
    } else {
        Err(ProviderError::Validation(format!(
            "collection '{}' contains a {} element",
            path,
            item.kind_name()
        )))
    }
}

/// A config, plan or state tree: the attributes of one resource instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueTree {
    attributes: BTreeMap<String, Dynamic>,
}

impl ValueTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from an engine value, which must be an object.
    pub fn from_dynamic(value: Dynamic) -> Result<Self, ProviderError> {
        match value {
            Dynamic::Object(attributes) | Dynamic::Map(attributes) => Ok(Self { attributes }),
            other => Err(ProviderError::SchemaMismatch {
                attribute: String::new(),
                expected: "object".to_string(),
                actual: other.kind_name().to_string(),
            }),
        }
    }

    /// Build a tree from JSON; convenient in tests.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ProviderError> {
        Self::from_dynamic(Dynamic::from_json(value))
    }

    /// Convert back into an engine value.
    pub fn into_dynamic(self) -> Dynamic {
        Dynamic::Object(self.attributes)
    }

    /// The raw value of a top-level attribute; absent attributes read as null.
    pub fn raw(&self, name: &str) -> &Dynamic {
        self.attributes.get(name).unwrap_or(&NULL)
    }

    /// Set the raw value of a top-level attribute.
    pub fn insert_raw(&mut self, name: impl Into<String>, value: Dynamic) {
        self.attributes.insert(name.into(), value);
    }

    /// Iterate over the attributes present in the tree.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Dynamic)> {
        self.attributes.iter()
    }

    /// Decode a top-level attribute.
    pub fn get<T: AttrValue>(&self, name: &str) -> Result<Value<T>, ProviderError> {
        Value::decode(self.raw(name), name)
    }

    /// Decode an attribute that must be known.
    pub fn required<T: AttrValue>(&self, name: &str) -> Result<T, ProviderError> {
        match self.get(name)? {
            Value::Known(v) => Ok(v),
            other => Err(ProviderError::Validation(format!(
                "attribute '{}' must be known, got {}",
                name,
                if other.is_null() { "null" } else { "unknown" }
            ))),
        }
    }

    /// Decode an optional attribute as a pointer-style input.
    pub fn optional<T: AttrValue>(&self, name: &str) -> Result<Option<T>, ProviderError> {
        Ok(self.get(name)?.into_known())
    }

    /// Set a top-level attribute from a tri-state value.
    pub fn set<T: AttrValue>(&mut self, name: &str, value: Value<T>) {
        self.insert_raw(name, value.encode());
    }

    /// Set a top-level attribute to a known value.
    pub fn set_known<T: AttrValue>(&mut self, name: &str, value: T) {
        self.insert_raw(name, value.into_dynamic());
    }

    /// Set a top-level attribute, `None` becoming null.
    pub fn set_optional<T: AttrValue>(&mut self, name: &str, value: Option<T>) {
        self.set(name, Value::from_option(value));
    }

    /// Read the value at a nested path.
    pub fn descend(&self, path: &AttributePath) -> Result<&Dynamic, ProviderError> {
        let Some((first, rest)) = path.steps().split_first() else {
            return Err(ProviderError::PathNotFound(String::new()));
        };
        let root = self.raw(first.name());
        if rest.is_empty() {
            return Ok(root);
        }
        let remainder = AttributePath::from_steps(rest.to_vec());
        root.descend(&remainder).map_err(|_| {
            ProviderError::PathNotFound(path.to_string())
        })
    }

    /// Write a value at a nested path, creating the final entry if absent.
    pub fn write(&mut self, path: &AttributePath, value: Dynamic) -> Result<(), ProviderError> {
        let Some((first, rest)) = path.steps().split_first() else {
            return Err(ProviderError::PathNotFound(String::new()));
        };
        if rest.is_empty() {
            self.insert_raw(first.name(), value);
            return Ok(());
        }
        let root = self
            .attributes
            .get_mut(first.name())
            .ok_or_else(|| ProviderError::PathNotFound(first.name().to_string()))?;
        let remainder = AttributePath::from_steps(rest.to_vec());
        root.write(&remainder, value)
            .map_err(|_| ProviderError::PathNotFound(path.to_string()))
    }

    /// Whether any attribute is (or contains) an unknown.
    pub fn contains_unknown(&self) -> bool {
        self.attributes.values().any(Dynamic::contains_unknown)
    }
}

/// One step in an [`AttributePath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// An object attribute.
    Attribute(String),
    /// A map key.
    Key(String),
}

impl PathStep {
    fn name(&self) -> &str {
        match self {
            Self::Attribute(name) | Self::Key(name) => name,
        }
    }
}

/// A path to a (possibly nested) attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributePath {
    steps: Vec<PathStep>,
}

impl AttributePath {
    /// A path naming a single top-level attribute.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            steps: vec![PathStep::Attribute(name.into())],
        }
    }

    /// Parse a dotted path such as `credentials.password`.
    pub fn parse(path: &str) -> Self {
        Self {
            steps: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(|s| PathStep::Attribute(s.to_string()))
                .collect(),
        }
    }

    fn from_steps(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    /// Extend with an object attribute.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.steps.push(PathStep::Attribute(name.into()));
        self
    }

    /// Extend with a map key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.steps.push(PathStep::Key(key.into()));
        self
    }

    /// The steps of this path.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the path has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn prefix(&self, len: usize) -> Self {
        Self::from_steps(self.steps[..len.min(self.steps.len())].to_vec())
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::Attribute(name) if i == 0 => write!(f, "{}", name)?,
                PathStep::Attribute(name) => write!(f, ".{}", name)?,
                PathStep::Key(key) => write!(f, "[{:?}]", key)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tri_state_equality() {
        assert_eq!(Value::<String>::Null, Value::Null);
        assert_eq!(Value::<String>::Unknown, Value::Unknown);
        assert_ne!(Value::<String>::Null, Value::Unknown);
        assert_ne!(Value::Known("a".to_string()), Value::Known("b".to_string()));
        assert_ne!(Value::Known(String::new()), Value::Null);
    }

    #[test]
    fn test_decode_schema_mismatch() {
        let err = Value::<String>::decode(&Dynamic::Bool(true), "name").unwrap_err();
        match err {
            ProviderError::SchemaMismatch {
                attribute,
                expected,
                actual,
            } => {
                assert_eq!(attribute, "name");
                assert_eq!(expected, "string");
                assert_eq!(actual, "bool");
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_preserves_null_and_unknown() {
        assert!(Value::<i64>::decode(&Dynamic::Null, "n").unwrap().is_null());
        assert!(Value::<i64>::decode(&Dynamic::Unknown, "n").unwrap().is_unknown());
        assert_eq!(Value::<i64>::Unknown.encode(), Dynamic::Unknown);
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a = Dynamic::Set(vec![Dynamic::String("x".into()), Dynamic::String("y".into())]);
        let b = Dynamic::Set(vec![Dynamic::String("y".into()), Dynamic::String("x".into())]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_set_equality_counts_both_sides() {
        let x = || Dynamic::String("x".into());
        let y = || Dynamic::String("y".into());
        let a = Dynamic::Set(vec![x(), x(), y()]);
        let b = Dynamic::Set(vec![x(), y(), y()]);
        assert_ne!(a, b);
        assert_ne!(b, a);
        assert_ne!(Dynamic::Set(vec![x(), x()]), Dynamic::Set(vec![x(), y()]));
    }

    #[test]
    fn test_known_empty() {
        assert!(Dynamic::String(String::new()).is_known_empty());
        assert!(Dynamic::Set(vec![]).is_known_empty());
        assert!(!Dynamic::Null.is_known_empty());
        assert!(!Dynamic::Unknown.is_known_empty());
        assert!(!Dynamic::String("a".into()).is_known_empty());
    }

    #[test]
    fn test_set_rejects_duplicates() {
        let dup = Dynamic::Set(vec![Dynamic::String("x".into()), Dynamic::String("x".into())]);
        assert!(BTreeSet::<String>::from_dynamic(&dup, "requirements").is_err());
    }

    #[test]
    fn test_map_of_sets() {
        let value = Dynamic::from_json(json!({"a": ["n1", "n2"], "b": []}));
        let table = BTreeMap::<String, BTreeSet<String>>::from_dynamic(&value, "route_table")
            .unwrap();
        assert_eq!(table["a"].len(), 2);
        assert!(table["b"].is_empty());

        let bad = Dynamic::from_json(json!({"a": "n1"}));
        let err = BTreeMap::<String, BTreeSet<String>>::from_dynamic(&bad, "route_table")
            .unwrap_err();
        assert_eq!(err.attribute(), Some("route_table[\"a\"]"));
    }

    #[test]
    fn test_tree_required_and_optional() {
        let mut tree = ValueTree::from_json(json!({"name": "k1", "description": null})).unwrap();
        tree.set::<String>("arn", Value::Unknown);

        assert_eq!(tree.required::<String>("name").unwrap(), "k1");
        assert_eq!(tree.optional::<String>("description").unwrap(), None);
        assert_eq!(tree.optional::<String>("arn").unwrap(), None);
        assert!(tree.required::<String>("arn").is_err());
        assert!(tree.contains_unknown());
    }

    #[test]
    fn test_descend_nested() {
        let tree = ValueTree::from_json(json!({
            "credentials": {"username": "u1", "password": "p"},
            "empty": null
        }))
        .unwrap();

        let user = tree.descend(&AttributePath::parse("credentials.username")).unwrap();
        assert_eq!(user.as_str(), Some("u1"));

        let missing = tree.descend(&AttributePath::parse("credentials.client_id")).unwrap();
        assert!(missing.is_null());

        let err = tree.descend(&AttributePath::parse("empty.username")).unwrap_err();
        assert!(matches!(err, ProviderError::PathNotFound(_)));
    }

    #[test]
    fn test_write_nested() {
        let mut tree = ValueTree::from_json(json!({"credentials": {"username": "u1"}, "gone": null}))
            .unwrap();

        tree.write(
            &AttributePath::parse("credentials.password"),
            Dynamic::String("secret".into()),
        )
        .unwrap();
        assert_eq!(
            tree.descend(&AttributePath::parse("credentials.password")).unwrap(),
            &Dynamic::String("secret".into())
        );

        let err = tree
            .write(&AttributePath::parse("gone.password"), Dynamic::Null)
            .unwrap_err();
        assert!(matches!(err, ProviderError::PathNotFound(_)));

        tree.write(&AttributePath::root("name"), Dynamic::String("n".into()))
            .unwrap();
        assert_eq!(tree.required::<String>("name").unwrap(), "n");
    }

    #[test]
    fn test_json_interop() {
        let value = Dynamic::from_json(json!({"n": 3, "tags": ["a"], "ok": true}));
        assert_eq!(value.to_json().unwrap(), json!({"n": 3, "tags": ["a"], "ok": true}));
        assert!(Dynamic::Object(BTreeMap::from([("x".to_string(), Dynamic::Unknown)]))
            .to_json()
            .is_err());
    }

    #[test]
    fn test_render_sensitive() {
        let secret = Dynamic::String("hunter2".into());
        assert_eq!(secret.render(true), "(sensitive value)");
        assert_eq!(secret.render(false), "\"hunter2\"");
        assert_eq!(Dynamic::Null.render(true), "null");
    }

    #[test]
    fn test_path_display() {
        let path = AttributePath::root("route_table").key("a");
        assert_eq!(path.to_string(), "route_table[\"a\"]");
        assert_eq!(AttributePath::parse("a.b").to_string(), "a.b");
    }
}
