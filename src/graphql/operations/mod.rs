//! Typed GraphQL operations, one module per object family.
//!
//! Mutations on existing objects go through the object's getter
//! (`GetKmsKey(...) { Update(...) }`), so a null getter means the object
//! is gone and a missing mutation field means the getter resolved to a
//! different concrete type than the one the document targets.

pub mod app;
pub mod edge;
pub mod function;
pub mod kms_key;
pub mod message_type;
pub mod node;
pub mod tenant;
pub mod user;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::SYSTEM_NODE_TYPES;
use crate::error::ProviderError;

/// Variables keyed by tenant and name, plus operation inputs.
#[derive(Serialize)]
pub(crate) struct Keyed<'a, I: Serialize> {
    tenant: &'a str,
    name: &'a str,
    #[serde(flatten)]
    input: &'a I,
}

impl<'a, I: Serialize> Keyed<'a, I> {
    pub(crate) fn new(tenant: &'a str, name: &'a str, input: &'a I) -> Self {
        Self {
            tenant,
            name,
            input,
        }
    }
}

/// `GetX(...) { __typename Update(...) { ... } }` (or `Move`).
#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub(crate) struct Mutated<T> {
    #[serde(rename = "__typename", default)]
    typename: Option<String>,
    #[serde(rename = "Update", alias = "Move", default)]
    result: Option<T>,
}

/// `GetX(...) { __typename Delete }`.
#[derive(Debug, Deserialize)]
pub(crate) struct Deleted {
    #[serde(rename = "__typename", default)]
    typename: Option<String>,
    #[serde(rename = "Delete", default)]
    delete: Option<bool>,
}

/// The error for an object of the wrong concrete kind.
///
/// System-managed objects get [`ProviderError::SystemOwned`].
pub fn kind_error(name: &str, expected: &str, actual: &str) -> ProviderError {
    if SYSTEM_NODE_TYPES.contains(&actual) {
        ProviderError::SystemOwned(format!(
            "'{}' is a system-managed {} and cannot be managed as a {}",
            name, actual, expected
        ))
    } else {
        ProviderError::KindMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub(crate) fn expect_created<T>(operation: &str, created: Option<T>) -> Result<T, ProviderError> {
    created.ok_or_else(|| ProviderError::RemoteRejected {
        operation: operation.to_string(),
        message: "service returned no object".to_string(),
    })
}

pub(crate) fn expect_mutated<T>(
    operation: &str,
    name: &str,
    expected: Option<&str>,
    mutated: Option<Mutated<T>>,
) -> Result<T, ProviderError> {
    let mutated = mutated.ok_or_else(|| ProviderError::NotFound(name.to_string()))?;
    if let (Some(expected), Some(actual)) = (expected, mutated.typename.as_deref()) {
        if expected != actual {
            return Err(kind_error(name, expected, actual));
        }
    }
    mutated.result.ok_or_else(|| match (expected, mutated.typename) {
        (Some(expected), Some(actual)) => kind_error(name, expected, &actual),
        _ => ProviderError::RemoteRejected {
            operation: operation.to_string(),
            message: "service returned no object".to_string(),
        },
    })
}

pub(crate) fn expect_deleted(
    operation: &str,
    name: &str,
    expected: Option<&str>,
    deleted: Option<Deleted>,
) -> Result<(), ProviderError> {
    let deleted = deleted.ok_or_else(|| ProviderError::NotFound(name.to_string()))?;
    if let (Some(expected), Some(actual)) = (expected, deleted.typename.as_deref()) {
        if expected != actual {
            return Err(kind_error(name, expected, actual));
        }
    }
    match deleted.delete {
        Some(true) => Ok(()),
        _ => Err(ProviderError::RemoteRejected {
            operation: operation.to_string(),
            message: format!("service did not confirm deletion of '{}'", name),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keyed_variables_flatten() {
        #[derive(Serialize)]
        struct Input {
            description: Option<String>,
        }
        let input = Input { description: None };
        let vars = serde_json::to_value(Keyed::new("t1", "k1", &input)).unwrap();
        assert_eq!(vars, json!({"tenant": "t1", "name": "k1", "description": null}));
    }

    #[test]
    fn test_expect_mutated() {
        let ok: Option<Mutated<String>> =
            serde_json::from_value(json!({"__typename": "ProcessorNode", "Update": "x"})).unwrap();
        assert_eq!(expect_mutated("Op", "n", Some("ProcessorNode"), ok).unwrap(), "x");

        let moved: Option<Mutated<String>> =
            serde_json::from_value(json!({"Move": "y"})).unwrap();
        assert_eq!(expect_mutated("Op", "n", None, moved).unwrap(), "y");

        let gone: Option<Mutated<String>> = serde_json::from_value(json!(null)).unwrap();
        assert!(matches!(
            expect_mutated("Op", "n", None, gone),
            Err(ProviderError::NotFound(_))
        ));

        let other: Option<Mutated<String>> =
            serde_json::from_value(json!({"__typename": "TimerNode"})).unwrap();
        assert!(matches!(
            expect_mutated("Op", "n", Some("ProcessorNode"), other),
            Err(ProviderError::KindMismatch { .. })
        ));

        let system: Option<Mutated<String>> =
            serde_json::from_value(json!({"__typename": "LogEmitterNode"})).unwrap();
        assert!(matches!(
            expect_mutated("Op", "n", Some("ProcessorNode"), system),
            Err(ProviderError::SystemOwned(_))
        ));
    }

    #[test]
    fn test_expect_deleted() {
        let ok: Option<Deleted> = serde_json::from_value(json!({"Delete": true})).unwrap();
        assert!(expect_deleted("Op", "n", None, ok).is_ok());

        let gone: Option<Deleted> = serde_json::from_value(json!(null)).unwrap();
        assert!(matches!(
            expect_deleted("Op", "n", None, gone),
            Err(ProviderError::NotFound(_))
        ));
    }
}
