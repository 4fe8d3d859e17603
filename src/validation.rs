//! Config validation.
//!
//! Three layers run against a config tree before any remote call is made:
//!
//! - schema conformance ([`validate`]): required attributes present,
//!   computed-only attributes absent, values of the declared type,
//!   JSON-object strings well formed
//! - attribute validators ([`AttributeValidator`]): run on known values
//! - resource-level validators ([`ConfigValidator`]): cross-field rules
//!   such as [`MutuallyExclusive`] and [`ExactlyOneOf`]
//!
//! Unknown values are never rejected; they are re-validated at apply.
//!
//! # Example
//!
//! ```
//! use echostream_provider::schema::{Attribute, Schema};
//! use echostream_provider::validation::validate;
//! use echostream_provider::value::ValueTree;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("count", Attribute::optional_int64());
//!
//! let config = ValueTree::from_json(json!({"name": "test", "count": 42})).unwrap();
//! assert!(validate(&schema, &config).is_empty());
//!
//! let config = ValueTree::from_json(json!({"name": "test", "count": "many"})).unwrap();
//! let diagnostics = validate(&schema, &config);
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("count".to_string()));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::json_string;
use crate::schema::{AttributeType, Diagnostic, DiagnosticSeverity, Schema};
use crate::value::{AttributePath, Dynamic, ValueTree};

/// A check applied to one attribute's known config value.
pub trait AttributeValidator: fmt::Debug + Send + Sync {
    /// A human-readable description of the rule.
    fn description(&self) -> String;

    /// Validate a known value, pushing diagnostics on failure.
    fn validate(&self, value: &Dynamic, path: &str, diagnostics: &mut Vec<Diagnostic>);
}

/// A cross-field rule applied to a whole config tree.
pub trait ConfigValidator: fmt::Debug + Send + Sync {
    /// A human-readable description of the rule.
    fn description(&self) -> String;

    /// Validate the config, pushing diagnostics on failure.
    fn validate(&self, config: &ValueTree, diagnostics: &mut Vec<Diagnostic>);
}

/// Validate a config tree against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null (unknown is fine)
/// - Computed-only attributes must not be set
/// - Attribute types must match the schema
/// - Attributes not in the schema are rejected
/// - Attribute validators run on known values of the right type
pub fn validate(schema: &Schema, config: &ValueTree) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for (name, attr) in &schema.attributes {
        let value = config.raw(name);

        if attr.flags.is_computed_only() {
            if !value.is_null() {
                diagnostics.push(
                    Diagnostic::error(format!("Value for unconfigurable attribute '{}'", name))
                        .with_detail("This attribute is computed by the provider and cannot be set")
                        .with_attribute(name.as_str()),
                );
            }
            continue;
        }

        match value {
            Dynamic::Null => {
                if attr.flags.required {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required attribute '{}'", name))
                            .with_detail("This attribute is required and must be provided")
                            .with_attribute(name.as_str()),
                    );
                }
            },
            Dynamic::Unknown => {},
            known => {
                let before = diagnostics.len();
                validate_attribute_type(&attr.attr_type, known, name, attr.flags.sensitive, &mut diagnostics);
                if diagnostics.len() == before {
                    for validator in &attr.validators {
                        validator.validate(known, name, &mut diagnostics);
                    }
                }
            },
        }
    }

    for (name, _) in config.iter() {
        if schema.attribute(name).is_none() {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", name))
                    .with_detail("An attribute with this name is not expected here")
                    .with_attribute(name.as_str()),
            );
        }
    }

    diagnostics
}

/// Validate a config tree, returning Ok if valid or Err with diagnostics.
///
/// This is a convenience wrapper around [`validate`] that returns a Result.
pub fn validate_result(schema: &Schema, config: &ValueTree) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, config);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a config tree is valid against a schema.
///
/// Returns `true` if valid, `false` otherwise.
/// Use [`validate`] to get detailed error information.
pub fn is_valid(schema: &Schema, config: &ValueTree) -> bool {
    validate(schema, config).is_empty()
}

/// Run resource-level validators against a config tree.
pub fn validate_config(validators: &[Box<dyn ConfigValidator>], config: &ValueTree) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for validator in validators {
        validator.validate(config, &mut diagnostics);
    }
    diagnostics
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Dynamic,
    path: &str,
    sensitive: bool,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (attr_type, value) {
        (_, Dynamic::Unknown) => {},
        (AttributeType::String, Dynamic::String(_))
        | (AttributeType::Int64, Dynamic::Int64(_))
        | (AttributeType::Bool, Dynamic::Bool(_)) => {},
        (AttributeType::Json, Dynamic::String(_)) => {
            json_string::validate(value, path, diagnostics);
        },
        (AttributeType::Set(element_type), Dynamic::Set(items)) => {
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                if item.is_null() {
                    diagnostics.push(
                        Diagnostic::error(format!("Null element in set '{}'", path))
                            .with_attribute(item_path),
                    );
                    continue;
                }
                validate_attribute_type(element_type, item, &item_path, sensitive, diagnostics);
            }
            let known: Vec<&Dynamic> = items.iter().filter(|i| i.is_known()).collect();
            for (i, item) in known.iter().enumerate() {
                if known[..i].contains(item) {
                    diagnostics.push(
                        Diagnostic::error(format!("Duplicate element in set '{}'", path))
                            .with_detail(format!("Element {} appears more than once", item.render(sensitive)))
                            .with_attribute(path),
                    );
                }
            }
        },
        (AttributeType::Map(element_type), Dynamic::Map(entries) | Dynamic::Object(entries)) => {
            for (key, item) in entries {
                let key_path = AttributePath::parse(path).key(key.as_str()).to_string();
                if item.is_null() {
                    diagnostics.push(
                        Diagnostic::error(format!("Null value in map '{}'", path))
                            .with_attribute(key_path),
                    );
                    continue;
                }
                validate_attribute_type(element_type, item, &key_path, sensitive, diagnostics);
            }
        },
        (AttributeType::Object(attrs), Dynamic::Map(entries) | Dynamic::Object(entries)) => {
            validate_object_type(attrs, entries, path, sensitive, diagnostics);
        },
        (expected, got) => diagnostics.push(type_error(path, expected, got)),
    }
}

fn validate_object_type(
    attrs: &BTreeMap<String, AttributeType>,
    entries: &BTreeMap<String, Dynamic>,
    path: &str,
    sensitive: bool,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, value) in entries {
        let attr_path = join_path(path, name);
        match attrs.get(name) {
            Some(_) if value.is_null() => {},
            Some(attr_type) => {
                validate_attribute_type(attr_type, value, &attr_path, sensitive, diagnostics)
            },
            None => diagnostics.push(
                Diagnostic::error(format!("Unsupported attribute '{}'", attr_path))
                    .with_attribute(attr_path),
            ),
        }
    }
}

// Helper functions

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_error(path: &str, expected: &AttributeType, got: &Dynamic) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!("Expected {}, got {}", expected, got.kind_name())),
        attribute: Some(path.to_string()),
    }
}

fn invalid_value(path: &str, detail: String) -> Diagnostic {
    Diagnostic::error(format!("Invalid value for attribute '{}'", path))
        .with_detail(detail)
        .with_attribute(path)
}

// =============================================================================
// Attribute validators
// =============================================================================

/// String length (in characters) within `[min, max]`.
#[derive(Debug, Clone)]
pub struct StringLengthBetween {
    min: usize,
    max: usize,
}

impl StringLengthBetween {
    /// Create the validator.
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

impl AttributeValidator for StringLengthBetween {
    fn description(&self) -> String {
        format!("string length must be between {} and {}", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &str, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_str() else { return };
        let len = s.chars().count();
        if len < self.min || len > self.max {
            diagnostics.push(invalid_value(
                path,
                format!("Attribute {}, got length {}", self.description(), len),
            ));
        }
    }
}

/// String matches a regular expression.
#[derive(Debug, Clone)]
pub struct StringMatches {
    pattern: Regex,
    message: String,
}

impl StringMatches {
    /// Create the validator. `message` explains the rule to the operator.
    pub fn new(pattern: Regex, message: impl Into<String>) -> Self {
        Self {
            pattern,
            message: message.into(),
        }
    }
}

impl AttributeValidator for StringMatches {
    fn description(&self) -> String {
        self.message.clone()
    }

    fn validate(&self, value: &Dynamic, path: &str, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_str() else { return };
        if !self.pattern.is_match(s) {
            diagnostics.push(invalid_value(path, format!("Attribute {}", self.message)));
        }
    }
}

/// String is one of a fixed set of values.
#[derive(Debug, Clone)]
pub struct OneOf {
    allowed: Vec<String>,
}

impl OneOf {
    /// Create the validator.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl AttributeValidator for OneOf {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.allowed.join(", "))
    }

    fn validate(&self, value: &Dynamic, path: &str, diagnostics: &mut Vec<Diagnostic>) {
        let Some(s) = value.as_str() else { return };
        if !self.allowed.iter().any(|a| a == s) {
            diagnostics.push(invalid_value(
                path,
                format!("Attribute {}, got {:?}", self.description(), s),
            ));
        }
    }
}

/// Integer within `[min, max]`; either bound may be open.
#[derive(Debug, Clone)]
pub struct Int64Between {
    min: Option<i64>,
    max: Option<i64>,
}

impl Int64Between {
    /// Both bounds inclusive.
    pub fn new(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Lower bound only.
    pub fn at_least(min: i64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }
}

impl AttributeValidator for Int64Between {
    fn description(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("value must be between {} and {}", min, max),
            (Some(min), None) => format!("value must be at least {}", min),
            (None, Some(max)) => format!("value must be at most {}", max),
            (None, None) => "any integer".to_string(),
        }
    }

    fn validate(&self, value: &Dynamic, path: &str, diagnostics: &mut Vec<Diagnostic>) {
        let Dynamic::Int64(n) = value else { return };
        let below = self.min.is_some_and(|min| *n < min);
        let above = self.max.is_some_and(|max| *n > max);
        if below || above {
            diagnostics.push(invalid_value(
                path,
                format!("Attribute {}, got {}", self.description(), n),
            ));
        }
    }
}

// =============================================================================
// Config validators
// =============================================================================

/// At most one of the listed attributes may be non-null.
#[derive(Debug, Clone)]
pub struct MutuallyExclusive {
    attributes: Vec<String>,
}

impl MutuallyExclusive {
    /// Create the validator.
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigValidator for MutuallyExclusive {
    fn description(&self) -> String {
        format!("at most one of [{}] may be set", self.attributes.join(", "))
    }

    fn validate(&self, config: &ValueTree, diagnostics: &mut Vec<Diagnostic>) {
        let set: Vec<&String> = self
            .attributes
            .iter()
            .filter(|name| !config.raw(name).is_null())
            .collect();
        if set.len() > 1 {
            let names: Vec<&str> = set.iter().map(|s| s.as_str()).collect();
            diagnostics.push(
                Diagnostic::error("Invalid attribute combination")
                    .with_detail(format!(
                        "Attributes [{}] are mutually exclusive; {}",
                        names.join(", "),
                        self.description()
                    ))
                    .with_attribute(set[1].as_str()),
            );
        }
    }
}

/// Exactly one of the listed attributes must be non-null.
#[derive(Debug, Clone)]
pub struct ExactlyOneOf {
    attributes: Vec<String>,
}

impl ExactlyOneOf {
    /// Create the validator.
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigValidator for ExactlyOneOf {
    fn description(&self) -> String {
        format!("exactly one of [{}] must be set", self.attributes.join(", "))
    }

    fn validate(&self, config: &ValueTree, diagnostics: &mut Vec<Diagnostic>) {
        let values: Vec<&Dynamic> = self.attributes.iter().map(|n| config.raw(n)).collect();
        let set = values.iter().filter(|v| v.is_known()).count();
        let unknown = values.iter().filter(|v| v.is_unknown()).count();

        // An unknown may still resolve to null at apply.
        let valid = if unknown > 0 { set <= 1 } else { set == 1 };
        if valid {
            return;
        }
        diagnostics.push(
            Diagnostic::error("Invalid attribute combination")
                .with_detail(format!("{}, got {}", capitalise(&self.description()), set)),
        );
    }
}

/// `lesser` must not exceed `greater` when both are known.
#[derive(Debug, Clone)]
pub struct OrderedInt64 {
    lesser: String,
    greater: String,
}

impl OrderedInt64 {
    /// Create the validator.
    pub fn new(lesser: impl Into<String>, greater: impl Into<String>) -> Self {
        Self {
            lesser: lesser.into(),
            greater: greater.into(),
        }
    }
}

impl ConfigValidator for OrderedInt64 {
    fn description(&self) -> String {
        format!("{} must be less than or equal to {}", self.lesser, self.greater)
    }

    fn validate(&self, config: &ValueTree, diagnostics: &mut Vec<Diagnostic>) {
        if let (Dynamic::Int64(lesser), Dynamic::Int64(greater)) =
            (config.raw(&self.lesser), config.raw(&self.greater))
        {
            if lesser > greater {
                diagnostics.push(
                    Diagnostic::error("Invalid attribute combination")
                        .with_detail(format!(
                            "{}, got {} > {}",
                            capitalise(&self.description()),
                            lesser,
                            greater
                        ))
                        .with_attribute(self.lesser.as_str()),
                );
            }
        }
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
