//! Error types for the EchoStream provider.

use thiserror::Error;

use crate::schema::Diagnostic;
use crate::value::Dynamic;

/// Errors that can occur while serving a provider operation.
///
/// Variants follow the provider's error taxonomy: input errors, auth
/// errors, remote errors and lifecycle errors, plus a few ambient kinds.
#[derive(Debug, Error)]
pub enum ProviderError {
    // =========================================================================
    // Input
    // =========================================================================
    /// An engine value did not match the declared attribute type.
    #[error("Schema mismatch at '{attribute}': expected {expected}, got {actual}")]
    SchemaMismatch {
        /// Path of the offending attribute.
        attribute: String,
        /// The declared type.
        expected: String,
        /// The kind of value actually supplied.
        actual: String,
    },

    /// An attribute path could not be followed.
    #[error("Attribute path not found: {0}")]
    PathNotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An import identifier could not be parsed.
    #[error("Invalid import identifier '{id}': {reason}")]
    ImportIdInvalid {
        /// The identifier supplied by the operator.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    // =========================================================================
    // Auth
    // =========================================================================
    /// The identity provider could not be reached.
    #[error("Authentication unavailable: {0}")]
    AuthUnavailable(String),

    /// The identity provider rejected the credentials.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// The identity provider answered with a challenge the provider cannot handle.
    #[error("Unexpected authentication challenge: {0}")]
    AuthChallengeUnknown(String),

    // =========================================================================
    // Remote
    // =========================================================================
    /// A network-level failure talking to the service.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The GraphQL service returned errors for an operation.
    #[error("{operation} failed: {message}")]
    RemoteRejected {
        /// The GraphQL operation name.
        operation: String,
        /// The error messages returned by the service.
        message: String,
    },

    /// The service returned a different object kind than expected.
    #[error("Expected {expected} for '{name}', but the service returned {actual}")]
    KindMismatch {
        /// The natural key that was looked up.
        name: String,
        /// The expected variant.
        expected: String,
        /// The variant actually returned.
        actual: String,
    },

    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// The resource is in use and cannot be destroyed or replaced.
    #[error("Resource in use: {0}")]
    InUseImmutable(String),

    /// Referenced objects carry incompatible message types.
    #[error("Message type mismatch: {0}")]
    TypeMismatch(String),

    /// The object is owned by the system and cannot be managed.
    #[error("System owned: {0}")]
    SystemOwned(String),

    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The operation was cancelled or ran past its deadline.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Part of a multi-step update was applied before a later step failed.
    ///
    /// `state` is the refreshed state of the object after the steps that
    /// did succeed, so the host can record where the object now is.
    #[error("Partially applied: {message}")]
    PartiallyApplied {
        /// What succeeded and what failed.
        message: String,
        /// State after the successful steps.
        state: Box<Dynamic>,
    },

    // =========================================================================
    // Ambient
    // =========================================================================
    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The provider handle passed to a resource was of an unexpected kind.
    #[error("Provider misconfigured: {0}")]
    ProviderMisconfigured(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// Returns the inner message for string-carrying variants and a short
    /// description for structured ones.
    pub fn message(&self) -> &str {
        match self {
            Self::PathNotFound(msg)
            | Self::Validation(msg)
            | Self::AuthUnavailable(msg)
            | Self::AuthRejected(msg)
            | Self::AuthChallengeUnknown(msg)
            | Self::Transport(msg)
            | Self::InUseImmutable(msg)
            | Self::TypeMismatch(msg)
            | Self::SystemOwned(msg)
            | Self::NotFound(msg)
            | Self::Cancelled(msg)
            | Self::Configuration(msg)
            | Self::ProviderMisconfigured(msg)
            | Self::UnknownResource(msg) => msg,
            Self::RemoteRejected { message, .. } | Self::PartiallyApplied { message, .. } => {
                message
            },
            Self::ImportIdInvalid { reason, .. } => reason,
            Self::SchemaMismatch { .. } => "value does not match the declared type",
            Self::KindMismatch { .. } => "unexpected object kind",
            Self::Serialization(_err) => "serialization error (see Debug output)",
        }
    }

    /// The attribute this error is scoped to, when it is knowable.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::SchemaMismatch { attribute, .. } => Some(attribute),
            Self::PathNotFound(path) => Some(path),
            _ => None,
        }
    }

    /// Whether the caller may reasonably retry the operation.
    ///
    /// The provider itself never retries; this only informs the host.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AuthUnavailable(_) | Self::Transport(_))
    }

    /// Convert this error into an error diagnostic, attribute-scoped when possible.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.summary()).with_detail(self.to_string());
        match self.attribute() {
            Some(attribute) => diagnostic.with_attribute(attribute),
            None => diagnostic,
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Self::SchemaMismatch { .. } | Self::PathNotFound(_) => "Invalid attribute value",
            Self::Validation(_) => "Invalid configuration",
            Self::ImportIdInvalid { .. } => "Invalid import identifier",
            Self::AuthUnavailable(_) | Self::AuthRejected(_) | Self::AuthChallengeUnknown(_) => {
                "Authentication failed"
            },
            Self::Transport(_) => "Unable to reach EchoStream",
            Self::RemoteRejected { .. } => "EchoStream rejected the request",
            Self::KindMismatch { .. } => "Unexpected object kind",
            Self::InUseImmutable(_) => "Resource in use",
            Self::TypeMismatch(_) => "Incompatible message types",
            Self::SystemOwned(_) => "System-owned object",
            Self::NotFound(_) => "Not found",
            Self::Cancelled(_) => "Operation cancelled",
            Self::PartiallyApplied { .. } => "Update partially applied",
            Self::Configuration(_) | Self::ProviderMisconfigured(_) => {
                "Provider configuration error"
            },
            Self::UnknownResource(_) => "Unknown resource type",
            Self::Serialization(_) => "Serialization error",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Cancelled(format!("request timed out: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("k1".to_string());
        assert_eq!(format!("{}", err), "Resource not found: k1");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("echostream_widget".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: echostream_widget");

        let err = ProviderError::RemoteRejected {
            operation: "CreateKmsKey".to_string(),
            message: "name already exists".to_string(),
        };
        assert_eq!(format!("{}", err), "CreateKmsKey failed: name already exists");
    }

    #[test]
    fn test_structured_variants_display() {
        let err = ProviderError::SchemaMismatch {
            attribute: "name".to_string(),
            expected: "string".to_string(),
            actual: "bool".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Schema mismatch at 'name': expected string, got bool"
        );

        let err = ProviderError::ImportIdInvalid {
            id: "malformed".to_string(),
            reason: "expected <source>|<target>".to_string(),
        };
        assert!(format!("{}", err).contains("malformed"));

        let err = ProviderError::KindMismatch {
            name: "n1".to_string(),
            expected: "ProcessorNode".to_string(),
            actual: "TimerNode".to_string(),
        };
        assert!(format!("{}", err).contains("TimerNode"));
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::InUseImmutable("msg1 is in use".to_string());
        assert_eq!(err.message(), "msg1 is in use");

        let err = ProviderError::RemoteRejected {
            operation: "op".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn test_retryable() {
        assert!(ProviderError::AuthUnavailable("down".to_string()).is_retryable());
        assert!(ProviderError::Transport("reset".to_string()).is_retryable());
        assert!(!ProviderError::AuthRejected("bad password".to_string()).is_retryable());
        assert!(!ProviderError::AuthChallengeUnknown("MFA".to_string()).is_retryable());
        assert!(!ProviderError::InUseImmutable("x".to_string()).is_retryable());
    }

    #[test]
    fn test_to_diagnostic_scoping() {
        let err = ProviderError::SchemaMismatch {
            attribute: "route_table".to_string(),
            expected: "map".to_string(),
            actual: "string".to_string(),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.attribute, Some("route_table".to_string()));

        let diag = ProviderError::TypeMismatch("a vs b".to_string()).to_diagnostic();
        assert_eq!(diag.attribute, None);
        assert_eq!(diag.summary, "Incompatible message types");
        assert!(diag.detail.unwrap().contains("a vs b"));
    }
}
