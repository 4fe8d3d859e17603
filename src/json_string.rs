//! The JSON-object string attribute type.
//!
//! Behaves as a plain string towards the engine. At config time a known,
//! non-empty payload must parse as a JSON object; the empty string means
//! "no config". Values are always treated as sensitive.

use crate::error::ProviderError;
use crate::schema::{AttributeType, Diagnostic};
use crate::value::{mismatch, AttrValue, Dynamic};

/// A string holding a JSON object, or empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonObjectString(String);

impl JsonObjectString {
    /// Wrap a raw string without validating it.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw text.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether this is the empty "no config" value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that the payload is empty or a JSON object.
    pub fn check(&self) -> Result<(), String> {
        check_object(&self.0)
    }

    /// The text to keep in state after the service echoed `remote`.
    ///
    /// The operator's text is kept whenever the echo is the same JSON object
    /// irrespective of whitespace and key order; otherwise the echo wins so
    /// drift shows up in the next plan.
    pub fn reconcile(prior: Option<&JsonObjectString>, remote: JsonObjectString) -> Self {
        match prior {
            Some(prior) if semantically_equal(prior.as_str(), remote.as_str()) => prior.clone(),
            _ => remote,
        }
    }
}

impl AttrValue for JsonObjectString {
    fn attribute_type() -> AttributeType {
        AttributeType::Json
    }

    fn from_dynamic(value: &Dynamic, path: &str) -> Result<Self, ProviderError> {
        match value {
            Dynamic::String(s) => Ok(Self(s.clone())),
            other => Err(mismatch(path, &Self::attribute_type(), other)),
        }
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::String(self.0)
    }
}

fn check_object(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        Ok(other) => Err(format!(
            "expected a JSON object, got a JSON {}",
            json_kind(&other)
        )),
        Err(err) => Err(format!("not valid JSON: {}", err)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Whether two payloads encode the same JSON object.
pub fn semantically_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    if a.is_empty() || b.is_empty() {
        return false;
    }
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Validate a config value of JSON-object string type.
///
/// Null and unknown pass untouched. Pushes exactly one attribute-scoped
/// diagnostic when a known payload is not a JSON object. The payload
/// itself is never echoed.
pub fn validate(value: &Dynamic, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let Dynamic::String(raw) = value else {
        return;
    };
    if let Err(reason) = check_object(raw) {
        diagnostics.push(
            Diagnostic::error("Invalid JSON object")
                .with_detail(format!("Attribute '{}' must hold a JSON object: {}", path, reason))
                .with_attribute(path),
        );
    }
}
