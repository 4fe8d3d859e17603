//! The EchoStream provider.
//!
//! [`EchoStreamProvider`] owns the registry of hosted kinds and implements
//! [`ProviderService`] by routing each call to the kind's runtime. On
//! configure it builds the authenticated GraphQL client and publishes one
//! [`ProviderData`] to every kind.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::auth::{self, Authenticator, CognitoIdentityProvider, Credentials, IdentityProvider};
use crate::context::Context;
use crate::data_sources;
use crate::error::ProviderError;
use crate::graphql::{GraphqlClient, GraphqlTransport, HttpTransport};
use crate::plan::PlanResult;
use crate::resource::{DataSourceRuntime, ProviderData, ResourceRuntime};
use crate::resources;
use crate::schema::{has_errors, Attribute, Diagnostic, ProviderSchema, Schema};
use crate::service::{ImportedResource, ProviderMetadata, ProviderService, ServerCapabilities};
use crate::validation;
use crate::value::{Value, ValueTree};

/// Prefix of every registered type name.
pub const PROVIDER_NAME: &str = "echostream";

/// Options for the HTTP clients built on configure.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout.
    /// Default: 30 seconds.
    pub request_timeout: Duration,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientOptions {
    /// Create new client options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn http_client(&self) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Configuration(format!("cannot build HTTP client: {}", e)))
    }
}

/// Provider-level configuration.
#[derive(Clone)]
pub struct ProviderConfig {
    /// The GraphQL endpoint.
    pub appsync_endpoint: String,
    /// The user pool app client id.
    pub client_id: String,
    /// The login password.
    pub password: String,
    /// The tenant every resource lives in.
    pub tenant: String,
    /// The login name.
    pub username: String,
    /// The user pool id, `<region>_<pool>`.
    pub user_pool_id: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("appsync_endpoint", &self.appsync_endpoint)
            .field("client_id", &self.client_id)
            .field("password", &"<redacted>")
            .field("tenant", &self.tenant)
            .field("username", &self.username)
            .field("user_pool_id", &self.user_pool_id)
            .finish()
    }
}

impl ProviderConfig {
    /// The provider configuration schema.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Manages EchoStream tenants as infrastructure.")
            .with_attribute(
                "appsync_endpoint",
                Attribute::required_string().with_description("The tenant's GraphQL endpoint URL."),
            )
            .with_attribute(
                "client_id",
                Attribute::required_string().with_description("The user pool app client id."),
            )
            .with_attribute(
                "password",
                Attribute::required_string()
                    .sensitive()
                    .with_description("The password used to log in."),
            )
            .with_attribute(
                "tenant",
                Attribute::required_string().with_description("The tenant to manage."),
            )
            .with_attribute(
                "username",
                Attribute::required_string().with_description("The user name used to log in."),
            )
            .with_attribute(
                "user_pool_id",
                Attribute::required_string().with_description("The user pool id, `<region>_<pool>`."),
            )
    }

    /// Decode a config tree, reporting every missing or unknown value.
    pub fn from_tree(config: &ValueTree) -> Result<Self, Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();
        let mut field = |name: &str| match config.get::<String>(name) {
            Ok(Value::Known(value)) if !value.is_empty() => value,
            Ok(Value::Unknown) => {
                diagnostics.push(
                    Diagnostic::error("Unknown provider configuration value")
                        .with_detail(format!(
                            "'{}' must be known when the provider is configured",
                            name
                        ))
                        .with_attribute(name),
                );
                String::new()
            },
            Ok(_) => {
                diagnostics.push(
                    Diagnostic::error("Missing provider configuration value")
                        .with_detail(format!("'{}' is required", name))
                        .with_attribute(name),
                );
                String::new()
            },
            Err(e) => {
                diagnostics.push(e.to_diagnostic());
                String::new()
            },
        };

        let config = Self {
            appsync_endpoint: field("appsync_endpoint"),
            client_id: field("client_id"),
            password: field("password"),
            tenant: field("tenant"),
            username: field("username"),
            user_pool_id: field("user_pool_id"),
        };
        if diagnostics.is_empty() {
            Ok(config)
        } else {
            Err(diagnostics)
        }
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            user_pool_id: self.user_pool_id.clone(),
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

enum Backends {
    Live(ClientOptions),
    Injected {
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn GraphqlTransport>,
    },
}

impl Backends {
    fn connect(
        &self,
        config: &ProviderConfig,
    ) -> Result<(Arc<dyn IdentityProvider>, Arc<dyn GraphqlTransport>), ProviderError> {
        match self {
            Backends::Live(options) => {
                let http = options.http_client()?;
                let region = auth::region_from_pool_id(&config.user_pool_id)?;
                let identity = CognitoIdentityProvider::new(http.clone(), region);
                debug!(endpoint = identity.endpoint(), "Using identity provider");
                let transport = HttpTransport::new(http, config.appsync_endpoint.clone());
                Ok((Arc::new(identity), Arc::new(transport)))
            },
            Backends::Injected { identity, transport } => Ok((identity.clone(), transport.clone())),
        }
    }
}

/// The EchoStream provider.
pub struct EchoStreamProvider {
    backends: Backends,
    resources: BTreeMap<String, ResourceRuntime>,
    data_sources: BTreeMap<String, DataSourceRuntime>,
    data: RwLock<Option<Arc<ProviderData>>>,
}

impl std::fmt::Debug for EchoStreamProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoStreamProvider")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for EchoStreamProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoStreamProvider {
    /// A provider talking to the live service.
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    /// A provider talking to the live service with custom client options.
    pub fn with_options(options: ClientOptions) -> Self {
        Self::build(Backends::Live(options))
    }

    /// A provider using the given identity provider and GraphQL transport.
    pub fn with_backends(
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn GraphqlTransport>,
    ) -> Self {
        Self::build(Backends::Injected { identity, transport })
    }

    fn build(backends: Backends) -> Self {
        let resources = resources::all()
            .into_iter()
            .map(|r| {
                let runtime = ResourceRuntime::new(r);
                (type_name(runtime.type_name()), runtime)
            })
            .collect();
        let data_sources = data_sources::all()
            .into_iter()
            .map(|d| {
                let runtime = DataSourceRuntime::new(d);
                (type_name(runtime.type_name()), runtime)
            })
            .collect();
        Self {
            backends,
            resources,
            data_sources,
            data: RwLock::new(None),
        }
    }

    /// The handle published by the last successful configure.
    pub fn provider_data(&self) -> Option<Arc<ProviderData>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn resource(&self, resource_type: &str) -> Result<&ResourceRuntime, ProviderError> {
        self.resources.get(resource_type).ok_or_else(|| {
            ProviderError::UnknownResource(format!("Unknown resource type: {}", resource_type))
        })
    }

    fn data_source(&self, data_source_type: &str) -> Result<&DataSourceRuntime, ProviderError> {
        self.data_sources.get(data_source_type).ok_or_else(|| {
            ProviderError::UnknownResource(format!("Unknown data source type: {}", data_source_type))
        })
    }

    fn publish(&self, data: Arc<ProviderData>) -> Result<(), ProviderError> {
        let handle: Arc<dyn Any + Send + Sync> = data.clone();
        for runtime in self.resources.values() {
            runtime.configure(Some(handle.clone()))?;
        }
        for runtime in self.data_sources.values() {
            runtime.configure(Some(handle.clone()))?;
        }
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(data);
        Ok(())
    }
}

/// The registered name of a kind.
pub fn type_name(kind: &str) -> String {
    format!("{}_{}", PROVIDER_NAME, kind)
}

#[async_trait::async_trait]
impl ProviderService for EchoStreamProvider {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        for (name, runtime) in &self.resources {
            schema = schema.with_resource(name.clone(), runtime.schema());
        }
        for (name, runtime) in &self.data_sources {
            schema = schema.with_data_source(name.clone(), runtime.schema());
        }
        schema
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().cloned().collect(),
            data_sources: self.data_sources.keys().cloned().collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    #[instrument(skip(self, config), name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: ValueTree) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validation::validate(&ProviderConfig::schema(), &config);
        if has_errors(&diagnostics) {
            warn!(diagnostics = diagnostics.len(), "Provider configuration is invalid");
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, ctx, config), name = "provider.configure")]
    async fn configure(&self, ctx: &Context, config: ValueTree) -> Result<Vec<Diagnostic>, ProviderError> {
        ctx.check("configure")?;
        let mut diagnostics = validation::validate(&ProviderConfig::schema(), &config);
        if has_errors(&diagnostics) {
            warn!(diagnostics = diagnostics.len(), "Configure rejected invalid configuration");
            return Ok(diagnostics);
        }
        let config = match ProviderConfig::from_tree(&config) {
            Ok(config) => config,
            Err(errors) => {
                diagnostics.extend(errors);
                warn!(diagnostics = diagnostics.len(), "Configure rejected incomplete configuration");
                return Ok(diagnostics);
            },
        };

        let (identity, transport) = match self.backends.connect(&config) {
            Ok(backends) => backends,
            Err(e) => {
                error!(error = %e, "Configure failed");
                diagnostics.push(e.to_diagnostic());
                return Ok(diagnostics);
            },
        };
        let auth = Arc::new(Authenticator::new(config.credentials(), identity));
        let data = Arc::new(ProviderData {
            client: GraphqlClient::new(auth, transport),
            tenant: config.tenant.clone(),
        });
        self.publish(data)?;

        info!(
            tenant = %config.tenant,
            endpoint = %config.appsync_endpoint,
            resources = self.resources.len(),
            data_sources = self.data_sources.len(),
            "Provider configured"
        );
        Ok(diagnostics)
    }

    #[instrument(skip(self), name = "provider.stop")]
    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stop called");
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: ValueTree,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = self.resource(resource_type)?.validate(&config);
        if has_errors(&diagnostics) {
            warn!(resource_type, diagnostics = diagnostics.len(), "Resource configuration is invalid");
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, ctx, prior_state, proposed_state, config), name = "provider.plan")]
    async fn plan(
        &self,
        ctx: &Context,
        resource_type: &str,
        prior_state: Option<ValueTree>,
        proposed_state: Option<ValueTree>,
        config: Option<ValueTree>,
    ) -> Result<PlanResult, ProviderError> {
        debug!(
            resource_type,
            is_create = prior_state.is_none(),
            is_destroy = proposed_state.is_none(),
            "Plan called"
        );
        let result = self
            .resource(resource_type)?
            .plan(ctx, prior_state, proposed_state, config)
            .await;
        match &result {
            Ok(plan) => debug!(
                resource_type,
                changes = plan.changes.len(),
                requires_replace = plan.is_replace(),
                "Plan completed"
            ),
            Err(e) => error!(resource_type, error = %e, "Plan failed"),
        }
        result
    }

    #[instrument(skip(self, ctx, planned_state), name = "provider.create")]
    async fn create(
        &self,
        ctx: &Context,
        resource_type: &str,
        planned_state: ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        self.resource(resource_type)?
            .create(ctx, planned_state)
            .await
            .inspect_err(|e| error!(resource_type, error = %e, "Create failed"))
    }

    #[instrument(skip(self, ctx, current_state), name = "provider.read")]
    async fn read(
        &self,
        ctx: &Context,
        resource_type: &str,
        current_state: ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        self.resource(resource_type)?
            .read(ctx, current_state)
            .await
            .inspect_err(|e| error!(resource_type, error = %e, "Read failed"))
    }

    #[instrument(skip(self, ctx, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        ctx: &Context,
        resource_type: &str,
        prior_state: ValueTree,
        planned_state: ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        self.resource(resource_type)?
            .update(ctx, prior_state, planned_state)
            .await
            .inspect_err(|e| error!(resource_type, error = %e, "Update failed"))
    }

    #[instrument(skip(self, ctx, current_state), name = "provider.delete")]
    async fn delete(
        &self,
        ctx: &Context,
        resource_type: &str,
        current_state: ValueTree,
    ) -> Result<(), ProviderError> {
        self.resource(resource_type)?
            .delete(ctx, current_state)
            .await
            .inspect_err(|e| error!(resource_type, error = %e, "Delete failed"))
    }

    #[instrument(skip(self, ctx), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        ctx: &Context,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        ctx.check("import")?;
        let state = self.resource(resource_type)?.import(id)?;
        info!(resource_type, id, "Import seeded state");
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    #[instrument(skip(self, config), name = "provider.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: ValueTree,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.data_source(data_source_type)?.validate(&config))
    }

    #[instrument(skip(self, ctx, config), name = "provider.read_data_source")]
    async fn read_data_source(
        &self,
        ctx: &Context,
        data_source_type: &str,
        config: ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        self.data_source(data_source_type)?
            .read(ctx, config)
            .await
            .inspect_err(|e| error!(data_source_type, error = %e, "ReadDataSource failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackends, ProviderTester, TestError, TEST_TENANT};
    use serde_json::json;

    #[test]
    fn test_registry_prefixes_every_kind() {
        let provider = EchoStreamProvider::new();
        let metadata = provider.metadata();
        assert_eq!(metadata.resources.len(), 17);
        assert_eq!(metadata.data_sources.len(), 8);
        assert!(metadata.resources.iter().all(|r| r.starts_with("echostream_")));
        assert!(metadata.resources.contains(&"echostream_edge".to_string()));
        assert!(metadata.data_sources.contains(&"echostream_change_emitter_node".to_string()));
        assert!(metadata.capabilities.plan_destroy);
    }

    #[test]
    fn test_every_registered_kind_has_a_schema() {
        let tester = ProviderTester::new(EchoStreamProvider::new());
        let schema = tester.schema();
        let resource_types = tester.resource_types();
        let data_source_types = tester.data_source_types();
        assert_eq!(resource_types.len(), schema.resources.len());
        assert_eq!(data_source_types.len(), schema.data_sources.len());
        for kind in &resource_types {
            assert!(schema.resources.contains_key(kind), "{} has no schema", kind);
        }
        for kind in &data_source_types {
            assert!(schema.data_sources.contains_key(kind), "{} has no schema", kind);
        }
    }

    #[test]
    fn test_provider_schema_marks_password_sensitive() {
        let schema = EchoStreamProvider::new().schema();
        assert_eq!(schema.provider.attributes.len(), 6);
        assert!(schema.provider.is_sensitive("password"));
        assert!(schema.provider.attributes.values().all(|a| a.flags.required));
    }

    #[test]
    fn test_provider_config_debug_redacts_password() {
        let config = ProviderConfig::from_tree(
            &ValueTree::from_json(FakeBackends::new().provider_config()).unwrap(),
        )
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("battery"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_provider_config_reports_unknown_values() {
        let mut tree = ValueTree::from_json(FakeBackends::new().provider_config()).unwrap();
        tree.insert_raw("tenant", crate::value::Dynamic::Unknown);
        let diagnostics = ProviderConfig::from_tree(&tree).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("tenant"));
    }

    #[tokio::test]
    async fn test_configure_publishes_provider_data() {
        let backends = FakeBackends::new();
        let provider = backends.provider();
        assert!(provider.provider_data().is_none());

        let tester = ProviderTester::new(provider);
        tester.configure(backends.provider_config()).await.unwrap();
        let data = tester.provider().provider_data().unwrap();
        assert_eq!(data.tenant, TEST_TENANT);

        // Login is deferred to the first GraphQL call.
        assert_eq!(backends.identity.login_count(), 0);
    }

    #[tokio::test]
    async fn test_validate_then_stop() {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        tester
            .validate_provider_config(backends.provider_config())
            .await
            .unwrap();
        let err = tester
            .validate_provider_config(json!({"tenant": "t", "password": 7}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Diagnostics(ref diags) if diags.iter().any(|d| d.attribute.as_deref() == Some("password"))));
        tester.stop().await.unwrap();
        assert_eq!(backends.identity.login_count(), 0);
    }

    #[tokio::test]
    async fn test_configure_missing_values() {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        let err = tester.configure(json!({"tenant": "t"})).await.unwrap_err();
        match err {
            TestError::Diagnostics(diags) => assert_eq!(diags.len(), 5),
            other => panic!("expected diagnostics, got {}", other),
        }
        assert!(tester.provider().provider_data().is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_plan_fails() {
        let tester = ProviderTester::new(FakeBackends::new().provider());
        let err = tester
            .plan_create("echostream_kms_key", json!({"name": "k1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ProviderMisconfigured(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let tester = ProviderTester::new(FakeBackends::new().provider());
        let err = tester
            .validate_resource_config("echostream_nope", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Provider(ProviderError::UnknownResource(_))));
    }

    #[tokio::test]
    async fn test_import_seeds_name() {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        let imported = tester.import_resource("echostream_kms_key", "k1").await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, "echostream_kms_key");
        assert_eq!(imported[0].state.raw("name").as_str(), Some("k1"));
        assert!(imported[0].state.raw("arn").is_null());
    }
}
