//! Schema types for describing provider, resource and data source structure.
//!
//! Schemas drive config validation, default plan computation and the
//! sensitivity rules used when rendering diagnostics.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::validation::AttributeValidator;

/// The type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A 64-bit integer.
    Int64,
    /// A boolean value.
    Bool,
    /// A set of unique values of a single type.
    Set(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
    /// An object with a fixed set of attributes.
    Object(BTreeMap<String, AttributeType>),
    /// A string whose non-empty payload must be a JSON object.
    Json,
}

impl AttributeType {
    /// Create a set type.
    pub fn set(element_type: AttributeType) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }

    /// Create an object type.
    pub fn object<I, K>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeType)>,
        K: Into<String>,
    {
        Self::Object(
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Int64 => write!(f, "int64"),
            Self::Bool => write!(f, "bool"),
            Self::Set(element) => write!(f, "set of {}", element),
            Self::Map(element) => write!(f, "map of {}", element),
            Self::Object(_) => write!(f, "object"),
            Self::Json => write!(f, "JSON object string"),
        }
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute (read-only, set by provider).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute (can be set, but has default from provider).
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Whether the operator may set this attribute.
    pub fn is_settable(&self) -> bool {
        self.required || self.optional
    }

    /// Whether only the provider may set this attribute.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.is_settable()
    }
}

/// A rule applied to an attribute's planned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanModifier {
    /// Any change to the attribute destroys and recreates the resource.
    RequiresReplace,
    /// A computed attribute keeps its prior value instead of going unknown
    /// when other attributes change.
    UseStateForUnknown,
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Plan modifiers, applied in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plan_modifiers: Vec<PlanModifier>,
    /// Validators run against known config values.
    #[serde(skip)]
    pub validators: Vec<Arc<dyn AttributeValidator>>,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            plan_modifiers: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Create a required int64 attribute.
    pub fn required_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::required())
    }

    /// Create an optional int64 attribute.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// Create a computed int64 attribute.
    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    /// Create a required bool attribute.
    pub fn required_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::required())
    }

    /// Create an optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Create a computed bool attribute.
    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    /// Create a JSON-object string attribute. Always sensitive.
    pub fn json(flags: AttributeFlags) -> Self {
        Self::new(AttributeType::Json, flags.sensitive())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this attribute as forcing resource replacement when changed.
    pub fn requires_replace(mut self) -> Self {
        self.plan_modifiers.push(PlanModifier::RequiresReplace);
        self
    }

    /// Keep the prior value of this computed attribute across updates.
    pub fn use_state_for_unknown(mut self) -> Self {
        self.plan_modifiers.push(PlanModifier::UseStateForUnknown);
        self
    }

    /// Add a validator run against known config values.
    pub fn with_validator(mut self, validator: Arc<dyn AttributeValidator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Add several validators at once.
    pub fn with_validators(
        mut self,
        validators: impl IntoIterator<Item = Arc<dyn AttributeValidator>>,
    ) -> Self {
        self.validators.extend(validators);
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Whether the attribute carries the given plan modifier.
    pub fn has_modifier(&self, modifier: PlanModifier) -> bool {
        self.plan_modifiers.contains(&modifier)
    }
}

/// Schema for a resource, data source or the provider itself.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    pub version: u64,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The attributes, keyed by name.
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            description: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Set the description for this schema.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Whether the named attribute is sensitive.
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.attribute(name).is_some_and(|a| a.flags.sensitive)
    }
}

/// Schema for the provider configuration and all hosted kinds.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    pub provider: Schema,
    /// Schemas for each resource type.
    pub resources: BTreeMap<String, Schema>,
    /// Schemas for each data source type.
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// Create a new empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    /// Add a data source schema.
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

/// Whether any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::StringLengthBetween;

    #[test]
    fn test_attribute_type_display() {
        assert_eq!(AttributeType::String.to_string(), "string");
        assert_eq!(
            AttributeType::map(AttributeType::set(AttributeType::String)).to_string(),
            "map of set of string"
        );
        assert_eq!(AttributeType::Json.to_string(), "JSON object string");
    }

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(required.is_settable());
        assert!(!required.is_computed_only());

        let computed = AttributeFlags::computed();
        assert!(computed.is_computed_only());

        let optional_computed = AttributeFlags::optional_computed();
        assert!(optional_computed.is_settable());
        assert!(!optional_computed.is_computed_only());

        let sensitive = AttributeFlags::required().sensitive();
        assert!(sensitive.sensitive);
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_description("The name of the key")
            .requires_replace()
            .with_validator(Arc::new(StringLengthBetween::new(3, 80)));

        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.flags.required);
        assert_eq!(attr.description, Some("The name of the key".to_string()));
        assert!(attr.has_modifier(PlanModifier::RequiresReplace));
        assert!(!attr.has_modifier(PlanModifier::UseStateForUnknown));
        assert_eq!(attr.validators.len(), 1);
    }

    #[test]
    fn test_json_attribute_is_sensitive() {
        let attr = Attribute::json(AttributeFlags::optional());
        assert_eq!(attr.attr_type, AttributeType::Json);
        assert!(attr.flags.sensitive);
    }

    #[test]
    fn test_schema_builder() {
        let schema = Schema::v0()
            .with_description("A KMS key")
            .with_attribute("name", Attribute::required_string())
            .with_attribute("arn", Attribute::computed_string())
            .with_attribute("password", Attribute::required_string().sensitive());

        assert_eq!(schema.version, 0);
        assert!(schema.attribute("name").is_some());
        assert!(schema.is_sensitive("password"));
        assert!(!schema.is_sensitive("arn"));
        assert!(!schema.is_sensitive("missing"));
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("password", Attribute::required_string().sensitive()),
            )
            .with_resource(
                "echostream_kms_key",
                Schema::v0().with_attribute("name", Attribute::required_string()),
            )
            .with_data_source(
                "echostream_tenant",
                Schema::v0().with_attribute("name", Attribute::computed_string()),
            );

        assert!(provider_schema.provider.attributes.contains_key("password"));
        assert!(provider_schema.resources.contains_key("echostream_kms_key"));
        assert!(provider_schema.data_sources.contains_key("echostream_tenant"));
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("The value must be positive")
            .with_attribute("count");

        assert_eq!(err.severity, DiagnosticSeverity::Error);
        assert_eq!(err.summary, "Invalid configuration");
        assert_eq!(err.detail, Some("The value must be positive".to_string()));
        assert_eq!(err.attribute, Some("count".to_string()));

        let warn = Diagnostic::warning("Severing relationship");
        assert!(!has_errors(&[warn.clone()]));
        assert!(has_errors(&[warn, err]));
    }
}
