//! The host-facing provider protocol.
//!
//! [`ProviderService`] is the seam between the host engine and the provider:
//! a host adapter decodes its wire format into [`ValueTree`]s and calls these
//! methods, one [`Context`] per call. The provider never sees the wire.

use crate::context::Context;
use crate::error::ProviderError;
use crate::plan::PlanResult;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::value::ValueTree;

/// A resource produced by an import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResource {
    /// The registered type name of the imported resource.
    pub resource_type: String,
    /// The seeded state; the host completes it with a read.
    pub state: ValueTree,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: ValueTree) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata, listing what the provider hosts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
}

/// Trait that provider implementations must implement.
///
/// # Example
///
/// ```ignore
/// use echostream_provider::{ProviderService, ProviderError, ProviderSchema};
/// use echostream_provider::context::Context;
/// use echostream_provider::schema::Diagnostic;
/// use echostream_provider::value::ValueTree;
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl ProviderService for MyProvider {
///     fn schema(&self) -> ProviderSchema {
///         ProviderSchema::new()
///     }
///
///     async fn configure(&self, ctx: &Context, config: ValueTree) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata.
    /// By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// Returns diagnostics (errors and warnings).
    async fn validate_provider_config(&self, config: ValueTree) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, ctx: &Context, config: ValueTree) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: ValueTree,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. A `proposed_state` of `None` plans a destroy.
    async fn plan(
        &self,
        ctx: &Context,
        resource_type: &str,
        prior_state: Option<ValueTree>,
        proposed_state: Option<ValueTree>,
        config: Option<ValueTree>,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        ctx: &Context,
        resource_type: &str,
        planned_state: ValueTree,
    ) -> Result<ValueTree, ProviderError>;

    /// Read the current state of a resource; `None` when it no longer exists.
    async fn read(
        &self,
        ctx: &Context,
        resource_type: &str,
        current_state: ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        ctx: &Context,
        resource_type: &str,
        prior_state: ValueTree,
        planned_state: ValueTree,
    ) -> Result<ValueTree, ProviderError>;

    /// Delete a resource.
    async fn delete(
        &self,
        ctx: &Context,
        resource_type: &str,
        current_state: ValueTree,
    ) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        ctx: &Context,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let _ = ctx;
        Err(ProviderError::UnknownResource(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: ValueTree,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        ctx: &Context,
        data_source_type: &str,
        _config: ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let _ = ctx;
        Err(ProviderError::UnknownResource(format!(
            "Unknown data source type: {}",
            data_source_type
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Schema};

    struct Minimal;

    #[async_trait::async_trait]
    impl ProviderService for Minimal {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new()
                .with_resource("example_thing", Schema::v0().with_attribute("name", Attribute::required_string()))
                .with_data_source("example_lookup", Schema::v0())
        }

        async fn configure(&self, _ctx: &Context, _config: ValueTree) -> Result<Vec<Diagnostic>, ProviderError> {
            Ok(vec![])
        }

        async fn plan(
            &self,
            _ctx: &Context,
            _resource_type: &str,
            _prior_state: Option<ValueTree>,
            proposed_state: Option<ValueTree>,
            _config: Option<ValueTree>,
        ) -> Result<PlanResult, ProviderError> {
            Ok(PlanResult::no_change(proposed_state.unwrap_or_default()))
        }

        async fn create(&self, _ctx: &Context, _t: &str, planned: ValueTree) -> Result<ValueTree, ProviderError> {
            Ok(planned)
        }

        async fn read(&self, _ctx: &Context, _t: &str, current: ValueTree) -> Result<Option<ValueTree>, ProviderError> {
            Ok(Some(current))
        }

        async fn update(
            &self,
            _ctx: &Context,
            _t: &str,
            _prior: ValueTree,
            planned: ValueTree,
        ) -> Result<ValueTree, ProviderError> {
            Ok(planned)
        }

        async fn delete(&self, _ctx: &Context, _t: &str, _current: ValueTree) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[test]
    fn test_metadata_from_schema() {
        let metadata = Minimal.metadata();
        assert_eq!(metadata.resources, vec!["example_thing".to_string()]);
        assert_eq!(metadata.data_sources, vec!["example_lookup".to_string()]);
        assert!(!metadata.capabilities.plan_destroy);
    }

    #[tokio::test]
    async fn test_default_import_unsupported() {
        let err = Minimal
            .import_resource(&Context::new(), "example_thing", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_default_data_source_unknown() {
        let err = Minimal
            .read_data_source(&Context::new(), "example_lookup", ValueTree::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }
}
