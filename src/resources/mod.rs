//! Managed resource kinds.
//!
//! Every kind maps a [`ValueTree`] onto the typed inputs of its GraphQL
//! operations and writes the typed response back. The shared attribute
//! declarations and codecs live here so each kind is mostly its schema
//! table and operation wiring.

mod app;
mod edge;
mod function;
mod kms_key;
pub(crate) mod message_type;
mod node;
pub(crate) mod tenant;
mod user;

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

pub use app::{CrossTenantReceivingAppResource, CrossTenantSendingAppResource, ExternalAppResource};
pub use edge::EdgeResource;
pub use function::{BitmapperFunctionResource, ProcessorFunctionResource};
pub use kms_key::KmsKeyResource;
pub use message_type::MessageTypeResource;
pub use node::{
    BitmapRouterNodeResource, CrossTenantSendingNodeResource, ExternalNodeResource,
    ProcessorNodeResource, TimerNodeResource, WebSubHubNodeResource,
};
pub use tenant::TenantResource;
pub use user::{ApiUserResource, TenantUserResource};

use crate::error::ProviderError;
use crate::graphql::types::{AppCredentials, NameRef};
use crate::json_string::JsonObjectString;
use crate::resource::Resource;
use crate::schema::{Attribute, AttributeFlags, AttributeType};
use crate::validation::{
    AttributeValidator, Int64Between, OneOf, StringLengthBetween, StringMatches,
};
use crate::value::{AttrValue, Dynamic, ValueTree};

/// Settling time after deleting nodes and edges.
pub(crate) const NODE_QUIESCENCE: Duration = Duration::from_secs(10);

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9\-_.: ]+$").expect("name pattern is a valid regex")
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

/// Every managed kind, in registration order.
pub fn all() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(KmsKeyResource),
        Arc::new(MessageTypeResource),
        Arc::new(BitmapperFunctionResource),
        Arc::new(ProcessorFunctionResource),
        Arc::new(ProcessorNodeResource),
        Arc::new(BitmapRouterNodeResource),
        Arc::new(TimerNodeResource),
        Arc::new(WebSubHubNodeResource),
        Arc::new(ExternalNodeResource),
        Arc::new(CrossTenantSendingNodeResource),
        Arc::new(EdgeResource),
        Arc::new(ExternalAppResource),
        Arc::new(CrossTenantSendingAppResource),
        Arc::new(CrossTenantReceivingAppResource),
        Arc::new(TenantResource),
        Arc::new(TenantUserResource),
        Arc::new(ApiUserResource),
    ]
}

// =============================================================================
// Shared attributes
// =============================================================================

fn name_validators() -> Vec<Arc<dyn AttributeValidator>> {
    vec![
        Arc::new(StringLengthBetween::new(3, 80)),
        Arc::new(StringMatches::new(
            NAME_PATTERN.clone(),
            "must contain only letters, digits, spaces and the characters - _ . :",
        )),
    ]
}

/// The natural key. Renaming recreates the object.
pub(crate) fn name_attribute(what: &str) -> Attribute {
    Attribute::required_string()
        .requires_replace()
        .with_description(format!("The name of the {}.", what))
        .with_validators(name_validators())
}

/// A required reference to another object by name.
pub(crate) fn reference(description: &str) -> Attribute {
    Attribute::required_string()
        .with_description(description)
        .with_validators(name_validators())
}

/// An optional reference to another object by name.
pub(crate) fn optional_reference(description: &str) -> Attribute {
    Attribute::optional_string()
        .with_description(description)
        .with_validators(name_validators())
}

pub(crate) fn description() -> Attribute {
    Attribute::optional_string().with_description("A human-readable description.")
}

pub(crate) fn config() -> Attribute {
    Attribute::json(AttributeFlags::optional())
        .with_description("JSON object made available to the code at runtime.")
}

pub(crate) fn requirements() -> Attribute {
    Attribute::new(AttributeType::set(AttributeType::String), AttributeFlags::optional())
        .with_description("Python packages to install, in requirements.txt format.")
}

pub(crate) fn logging_level() -> Attribute {
    Attribute::optional_string()
        .with_description("The logging level for the node's code.")
        .with_validator(Arc::new(OneOf::new(["DEBUG", "INFO", "WARNING", "ERROR"])))
}

pub(crate) fn in_use() -> Attribute {
    Attribute::computed_bool()
        .with_description("Whether other objects depend on this one. In-use objects cannot be destroyed or replaced.")
}

pub(crate) fn email() -> Attribute {
    Attribute::required_string()
        .requires_replace()
        .with_description("The user's email address.")
        .with_validator(Arc::new(StringMatches::new(
            EMAIL_PATTERN.clone(),
            "must be an email address",
        )))
}

pub(crate) fn role(flags: AttributeFlags) -> Attribute {
    Attribute::new(AttributeType::String, flags)
        .with_description("The user's role within the tenant.")
        .with_validator(Arc::new(OneOf::new(["admin", "read_only", "user"])))
}

pub(crate) fn at_least(min: i64, flags: AttributeFlags, description: &str) -> Attribute {
    Attribute::new(AttributeType::Int64, flags)
        .use_state_for_unknown()
        .with_description(description)
        .with_validator(Arc::new(Int64Between::at_least(min)))
}

/// The nested credentials block of apps and API users.
pub(crate) fn credentials() -> Attribute {
    Attribute::new(
        AttributeType::object([
            ("client_id", AttributeType::String),
            ("password", AttributeType::String),
            ("user_pool_id", AttributeType::String),
            ("username", AttributeType::String),
        ]),
        AttributeFlags::computed(),
    )
    .sensitive()
    .use_state_for_unknown()
    .with_description("Credentials for authenticating to the tenant's API.")
}

// =============================================================================
// Codecs
// =============================================================================

pub(crate) fn name_of(tree: &ValueTree) -> Result<String, ProviderError> {
    tree.required("name")
}

pub(crate) fn ref_name(r: Option<NameRef>) -> Option<String> {
    r.map(|r| r.name)
}

/// `requirements` as a GraphQL list.
pub(crate) fn requirements_in(tree: &ValueTree) -> Result<Option<Vec<String>>, ProviderError> {
    Ok(tree
        .optional::<BTreeSet<String>>("requirements")?
        .map(|set| set.into_iter().collect()))
}

/// An empty list from the service reads back as unset.
pub(crate) fn requirements_out(tree: &mut ValueTree, requirements: Option<Vec<String>>) {
    let set = requirements
        .filter(|r| !r.is_empty())
        .map(|r| r.into_iter().collect::<BTreeSet<String>>());
    tree.set_optional("requirements", set);
}

/// A JSON attribute as a GraphQL `AWSJSON` input. The empty string means unset.
pub(crate) fn json_in(tree: &ValueTree, name: &str) -> Result<Option<String>, ProviderError> {
    Ok(tree
        .optional::<JsonObjectString>(name)?
        .filter(|json| !json.is_empty())
        .map(JsonObjectString::into_inner))
}

/// A GraphQL `AWSJSON` output. Empty or absent reads back as unset.
pub(crate) fn json_out(tree: &mut ValueTree, name: &str, json: Option<String>) {
    let json = json.filter(|j| !j.is_empty()).map(JsonObjectString::new);
    tree.set_optional(name, json);
}

pub(crate) fn credentials_out(credentials: Option<AppCredentials>) -> Dynamic {
    match credentials {
        Some(c) => Dynamic::Object(
            [
                ("client_id", c.client_id),
                ("password", c.password),
                ("user_pool_id", c.user_pool_id),
                ("username", c.username),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.into_dynamic()))
            .collect(),
        ),
        None => Dynamic::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation;
    use serde_json::json;
    use std::collections::HashSet;

    fn tree(value: serde_json::Value) -> ValueTree {
        ValueTree::from_json(value).unwrap()
    }

    #[test]
    fn test_registry_names_are_unique() {
        let names: HashSet<&str> = all().iter().map(|r| r.type_name()).collect();
        assert_eq!(names.len(), all().len());
    }

    #[test]
    fn test_every_schema_declares_access() {
        for resource in all() {
            for (name, attr) in resource.schema().attributes {
                let flags = attr.flags;
                assert!(
                    flags.required || flags.optional || flags.computed,
                    "{}.{} has no access flag",
                    resource.type_name(),
                    name
                );
            }
        }
    }

    #[test]
    fn test_name_validation() {
        let schema = crate::schema::Schema::v0().with_attribute("name", name_attribute("thing"));
        assert!(validation::is_valid(&schema, &tree(json!({"name": "good-name.1"}))));
        assert!(!validation::is_valid(&schema, &tree(json!({"name": "ab"}))));
        assert!(!validation::is_valid(&schema, &tree(json!({"name": "bad/name"}))));
    }

    #[test]
    fn test_logging_level_and_email() {
        let schema = crate::schema::Schema::v0()
            .with_attribute("logging_level", logging_level())
            .with_attribute("email", email());
        assert!(validation::is_valid(
            &schema,
            &tree(json!({"logging_level": "INFO", "email": "a@b.io"}))
        ));
        let diagnostics = validation::validate(
            &schema,
            &tree(json!({"logging_level": "TRACE", "email": "nope"})),
        );
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_requirements_codec() {
        let config = tree(json!({"requirements": ["requests", "boto3"]}));
        assert_eq!(
            requirements_in(&config).unwrap(),
            Some(vec!["boto3".to_string(), "requests".to_string()])
        );

        let mut state = ValueTree::new();
        requirements_out(&mut state, Some(Vec::new()));
        assert!(state.raw("requirements").is_null());
    }

    #[test]
    fn test_json_in_treats_empty_as_unset() {
        assert_eq!(json_in(&tree(json!({"config": ""})), "config").unwrap(), None);
        assert_eq!(
            json_in(&tree(json!({"config": "{\"a\":1}"})), "config").unwrap(),
            Some("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn test_credentials_out() {
        let value = credentials_out(Some(AppCredentials {
            client_id: "c".to_string(),
            password: "p".to_string(),
            user_pool_id: "us-east-1_x".to_string(),
            username: "u".to_string(),
        }));
        let entries = value.as_entries().unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries["username"], Dynamic::String("u".to_string()));
        assert_eq!(credentials_out(None), Dynamic::Null);
    }
}
