//! Testing utilities for the provider.
//!
//! Everything here runs without network access:
//!
//! - [`ProviderTester`] drives a [`ProviderService`] with JSON configs
//! - [`FakeIdentityProvider`] is an in-memory user pool that performs the
//!   real SRP verification and counts logins and refreshes
//! - [`FakeGraphql`] routes GraphQL requests by operation name to handlers
//!   and records every call
//! - [`FakeBackends`] wires both into an [`EchoStreamProvider`]
//!
//! # Example
//!
//! ```ignore
//! use echostream_provider::testing::{FakeBackends, ProviderTester};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_kms_key() {
//!     let backends = FakeBackends::new();
//!     backends.graphql.returns("CreateKmsKey", json!({"name": "k1", "arn": "arn:k1"}));
//!
//!     let tester = ProviderTester::new(backends.provider());
//!     tester.configure(backends.provider_config()).await.unwrap();
//!     let state = tester.lifecycle_create("echostream_kms_key", json!({"name": "k1"})).await;
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::auth::identity::{
    AuthFlow, AuthResponse, AuthenticationResult, IdentityProvider, InitiateAuthRequest,
    RespondToAuthChallengeRequest,
};
use crate::auth::srp::{ServerChallenge, SrpVerifier};
use crate::auth::{Authenticator, Credentials};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::{GraphqlClient, GraphqlRequest, GraphqlTransport};
use crate::plan::PlanResult;
use crate::provider::EchoStreamProvider;
use crate::resource::ProviderData;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::{ImportedResource, ProviderService};
use crate::value::ValueTree;

/// Tenant used by [`FakeBackends`].
pub const TEST_TENANT: &str = "test-tenant";
/// User pool used by [`FakeBackends`].
pub const TEST_USER_POOL: &str = "us-east-1_TestPool";
/// Login name used by [`FakeBackends`].
pub const TEST_USERNAME: &str = "ops@example.com";
/// Password used by [`FakeBackends`].
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// A test harness for provider implementations.
///
/// Configs are given as JSON; plans and states stay [`ValueTree`]s so
/// unknown values survive from plan to apply.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(tree(config)?).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(&Context::new(), tree(config)?).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, tree(config)?)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(&self, resource_type: &str, config: Value) -> Result<PlanResult, ProviderError> {
        let config = tree(config)?;
        self.provider
            .plan(&Context::new(), resource_type, None, Some(config.clone()), Some(config))
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: ValueTree,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let config = tree(config)?;
        self.provider
            .plan(
                &Context::new(),
                resource_type,
                Some(prior_state),
                Some(config.clone()),
                Some(config),
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: ValueTree,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(&Context::new(), resource_type, Some(prior_state), None, None)
            .await
    }

    /// Create a new resource.
    pub async fn create(&self, resource_type: &str, planned_state: ValueTree) -> Result<ValueTree, ProviderError> {
        self.provider.create(&Context::new(), resource_type, planned_state).await
    }

    /// Read the current state of a resource; `None` when it is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        self.provider.read(&Context::new(), resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: ValueTree,
        planned_state: ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        self.provider
            .update(&Context::new(), resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: ValueTree) -> Result<(), ProviderError> {
        self.provider.delete(&Context::new(), resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(&Context::new(), resource_type, id).await
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, tree(config)?)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<ValueTree, ProviderError> {
        self.provider
            .read_data_source(&Context::new(), data_source_type, tree(config)?)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → create → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<ValueTree, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let planned = planned_state(resource_type, plan)?;
        let created = self.create(resource_type, planned).await?;
        self.read(resource_type, created)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{} vanished after create", resource_type)))
    }

    /// Run a full update lifecycle: plan → update → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: ValueTree,
        config: Value,
    ) -> Result<ValueTree, ProviderError> {
        let plan = self.plan_update(resource_type, prior_state.clone(), config).await?;
        let planned = planned_state(resource_type, plan)?;
        let updated = self.update(resource_type, prior_state, planned).await?;
        self.read(resource_type, updated)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{} vanished after update", resource_type)))
    }

    /// Run a full delete lifecycle: plan → delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: ValueTree) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }
}

fn tree(value: Value) -> Result<ValueTree, ProviderError> {
    ValueTree::from_json(value)
}

fn planned_state(resource_type: &str, plan: PlanResult) -> Result<ValueTree, ProviderError> {
    plan.planned_state
        .ok_or_else(|| ProviderError::Validation(format!("plan for {} destroys the resource", resource_type)))
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Fake identity provider
// =========================================================================

struct IdentityState {
    pending: HashMap<String, ServerChallenge>,
    refresh_tokens: HashSet<String>,
    token_lifetime: Duration,
    unavailable: bool,
}

/// An in-memory user pool holding one user.
///
/// Logins run the full SRP exchange against an [`SrpVerifier`], so a wrong
/// password is rejected exactly as the real service would.
pub struct FakeIdentityProvider {
    verifier: SrpVerifier,
    challenge_override: Option<String>,
    latency: Duration,
    state: Mutex<IdentityState>,
    logins: AtomicUsize,
    refreshes: AtomicUsize,
    issued: AtomicUsize,
}

impl std::fmt::Debug for FakeIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeIdentityProvider")
            .field("user_id", &self.verifier.user_id())
            .field("logins", &self.login_count())
            .field("refreshes", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

impl FakeIdentityProvider {
    /// A pool `user_pool_id` with a single user.
    pub fn new(user_pool_id: &str, username: &str, password: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            verifier: SrpVerifier::new(user_pool_id, username, password)?,
            challenge_override: None,
            latency: Duration::ZERO,
            state: Mutex::new(IdentityState {
                pending: HashMap::new(),
                refresh_tokens: HashSet::new(),
                token_lifetime: Duration::from_secs(3600),
                unavailable: false,
            }),
            logins: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
        })
    }

    /// Answer logins with this challenge instead of `PASSWORD_VERIFIER`.
    pub fn with_challenge_override(mut self, challenge: impl Into<String>) -> Self {
        self.challenge_override = Some(challenge.into());
        self
    }

    /// Lifetime of issued access tokens.
    pub fn with_token_lifetime(self, lifetime: Duration) -> Self {
        self.set_token_lifetime(lifetime);
        self
    }

    /// Delay every call by `latency`, honouring the caller's context.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Change the lifetime of tokens issued from now on.
    pub fn set_token_lifetime(&self, lifetime: Duration) {
        self.lock().token_lifetime = lifetime;
    }

    /// Simulate an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Invalidate every refresh token issued so far.
    pub fn revoke_refresh_tokens(&self) {
        self.lock().refresh_tokens.clear();
    }

    /// Number of SRP logins started.
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Number of refresh-token exchanges attempted.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IdentityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn arrive(&self, ctx: &Context, operation: &str) -> Result<(), ProviderError> {
        if !self.latency.is_zero() {
            let latency = self.latency;
            ctx.run(operation, async move {
                tokio::time::sleep(latency).await;
                Ok(())
            })
            .await?;
        }
        if self.lock().unavailable {
            return Err(ProviderError::AuthUnavailable(format!(
                "{}: service unavailable",
                operation
            )));
        }
        Ok(())
    }

    fn issue(&self, with_refresh: bool) -> AuthenticationResult {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        let lifetime = chrono::Duration::from_std(state.token_lifetime)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let refresh_token = with_refresh.then(|| {
            let token = format!("refresh-{}", serial);
            state.refresh_tokens.insert(token.clone());
            token
        });
        AuthenticationResult {
            access_token: jwt_expiring_at(Utc::now() + lifetime),
            refresh_token,
            expires_in: Some(lifetime.num_seconds()),
        }
    }

    fn rejected(message: &str) -> ProviderError {
        ProviderError::AuthRejected(format!("NotAuthorizedException: {}", message))
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn initiate_auth(
        &self,
        ctx: &Context,
        request: InitiateAuthRequest,
    ) -> Result<AuthResponse, ProviderError> {
        self.arrive(ctx, "InitiateAuth").await?;
        let params = &request.auth_parameters;
        match request.auth_flow {
            AuthFlow::UserSrpAuth => {
                self.logins.fetch_add(1, Ordering::SeqCst);
                if let Some(challenge) = &self.challenge_override {
                    return Ok(AuthResponse::challenge(challenge.clone(), BTreeMap::new()));
                }
                if params.get("USERNAME").map(String::as_str) != Some(self.verifier.user_id()) {
                    return Err(Self::rejected("Incorrect username or password."));
                }
                let srp_a = params
                    .get("SRP_A")
                    .ok_or_else(|| ProviderError::AuthRejected("missing SRP_A".to_string()))?;
                let challenge = self.verifier.challenge(srp_a)?;
                let session = format!("session-{}", self.issued.fetch_add(1, Ordering::SeqCst));

                let parameters = BTreeMap::from([
                    ("SALT".to_string(), challenge.salt.clone()),
                    ("SRP_B".to_string(), challenge.srp_b.clone()),
                    ("SECRET_BLOCK".to_string(), challenge.secret_block.clone()),
                    ("USER_ID_FOR_SRP".to_string(), self.verifier.user_id().to_string()),
                    ("USERNAME".to_string(), self.verifier.user_id().to_string()),
                ]);
                self.lock().pending.insert(session.clone(), challenge);

                let mut response = AuthResponse::challenge("PASSWORD_VERIFIER", parameters);
                response.session = Some(session);
                Ok(response)
            },
            AuthFlow::RefreshTokenAuth => {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                let known = params
                    .get("REFRESH_TOKEN")
                    .is_some_and(|token| self.lock().refresh_tokens.contains(token));
                if !known {
                    return Err(Self::rejected("Refresh Token has been revoked"));
                }
                Ok(AuthResponse::tokens(self.issue(false)))
            },
        }
    }

    async fn respond_to_auth_challenge(
        &self,
        ctx: &Context,
        request: RespondToAuthChallengeRequest,
    ) -> Result<AuthResponse, ProviderError> {
        self.arrive(ctx, "RespondToAuthChallenge").await?;
        let challenge = request
            .session
            .as_ref()
            .and_then(|session| self.lock().pending.remove(session))
            .ok_or_else(|| Self::rejected("Invalid session for the user."))?;

        let responses = &request.challenge_responses;
        let field = |name: &str| responses.get(name).map(String::as_str).unwrap_or_default();
        if field("PASSWORD_CLAIM_SECRET_BLOCK") != challenge.secret_block {
            return Err(Self::rejected("Invalid secret block."));
        }
        if !self.verifier.verify(
            &challenge,
            field("TIMESTAMP"),
            field("PASSWORD_CLAIM_SIGNATURE"),
        )? {
            return Err(Self::rejected("Incorrect username or password."));
        }
        Ok(AuthResponse::tokens(self.issue(true)))
    }
}

/// An unsigned JWT whose `exp` claim is `expiration`.
pub fn jwt_expiring_at(expiration: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = json!({
        "exp": expiration.timestamp(),
        "iat": Utc::now().timestamp(),
        "token_use": "access",
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.", header, payload)
}

// =========================================================================
// Fake GraphQL service
// =========================================================================

type Handler = Arc<dyn Fn(&Value) -> Result<Value, ProviderError> + Send + Sync>;

/// A request received by [`FakeGraphql`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The operation name.
    pub operation_name: String,
    /// The document.
    pub query: String,
    /// The variables.
    pub variables: Value,
    /// The `Authorization` header value.
    pub authorization: String,
}

/// A GraphQL transport answering from per-operation handlers.
///
/// Handlers return the whole response body (`{"data": ...}` or
/// `{"errors": [...]}`); [`FakeGraphql::returns`] covers the common case of
/// a successful `result`. Unrouted operations fail with a transport error.
#[derive(Default)]
pub struct FakeGraphql {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl std::fmt::Debug for FakeGraphql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeGraphql")
            .field("calls", &self.calls().len())
            .finish_non_exhaustive()
    }
}

impl FakeGraphql {
    /// A service with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `operation` to `handler`, replacing any earlier handler.
    pub fn on<F>(&self, operation: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation.to_string(), Arc::new(handler));
    }

    /// Answer `operation` with `{"data": {"result": result}}`.
    pub fn returns(&self, operation: &str, result: Value) {
        let body = json!({"data": {"result": result}});
        self.on(operation, move |_| Ok(body.clone()));
    }

    /// Answer `operation` with a GraphQL error.
    pub fn rejects(&self, operation: &str, message: &str) {
        let body = json!({"data": null, "errors": [{"message": message}]});
        self.on(operation, move |_| Ok(body.clone()));
    }

    /// Every call so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Operation names of every call so far, in arrival order.
    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.operation_name).collect()
    }

    /// The most recent call of `operation`.
    pub fn last_call(&self, operation: &str) -> Option<RecordedCall> {
        self.calls().into_iter().rev().find(|c| c.operation_name == operation)
    }

    /// How many times `operation` was called.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.operation_name == operation).count()
    }

    /// How many mutations were sent.
    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.query.trim_start().starts_with("mutation"))
            .count()
    }
}

#[async_trait]
impl GraphqlTransport for FakeGraphql {
    async fn post(
        &self,
        ctx: &Context,
        authorization: &str,
        request: &GraphqlRequest,
    ) -> Result<Value, ProviderError> {
        ctx.check(&request.operation_name)?;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                operation_name: request.operation_name.clone(),
                query: request.query.clone(),
                variables: request.variables.clone(),
                authorization: authorization.to_string(),
            });
        let handler = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.operation_name)
            .cloned();
        match handler {
            Some(handler) => handler(&request.variables),
            None => Err(ProviderError::Transport(format!(
                "no handler for {}",
                request.operation_name
            ))),
        }
    }
}

// =========================================================================
// Wiring
// =========================================================================

/// A fake identity provider and GraphQL service sharing the test user.
#[derive(Debug, Clone)]
pub struct FakeBackends {
    /// The user pool.
    pub identity: Arc<FakeIdentityProvider>,
    /// The GraphQL service.
    pub graphql: Arc<FakeGraphql>,
}

impl Default for FakeBackends {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackends {
    /// Fresh backends knowing [`TEST_USERNAME`] / [`TEST_PASSWORD`].
    pub fn new() -> Self {
        let identity = FakeIdentityProvider::new(TEST_USER_POOL, TEST_USERNAME, TEST_PASSWORD)
            .unwrap_or_else(|e| panic!("test user pool: {}", e));
        Self {
            identity: Arc::new(identity),
            graphql: Arc::new(FakeGraphql::new()),
        }
    }

    /// A provider talking to these backends.
    pub fn provider(&self) -> EchoStreamProvider {
        EchoStreamProvider::with_backends(self.identity.clone(), self.graphql.clone())
    }

    /// Provider configuration matching the test user.
    pub fn provider_config(&self) -> Value {
        json!({
            "appsync_endpoint": "https://api.test.echo.stream/graphql",
            "client_id": "test-client",
            "password": TEST_PASSWORD,
            "tenant": TEST_TENANT,
            "username": TEST_USERNAME,
            "user_pool_id": TEST_USER_POOL,
        })
    }

    /// The handle resources receive once the provider is configured.
    pub fn provider_data(&self) -> ProviderData {
        let auth = Authenticator::new(
            Credentials {
                user_pool_id: TEST_USER_POOL.to_string(),
                client_id: "test-client".to_string(),
                username: TEST_USERNAME.to_string(),
                password: TEST_PASSWORD.to_string(),
            },
            self.identity.clone(),
        );
        ProviderData {
            client: GraphqlClient::new(Arc::new(auth), self.graphql.clone()),
            tenant: TEST_TENANT.to_string(),
        }
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan result indicates the resource will be created.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.is_replace(), "Expected plan to create, not replace");
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan result indicates changes are needed.
///
/// # Panics
///
/// Panics if the plan has no changes.
pub fn assert_plan_has_changes(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
}

/// Assert that a plan requires resource replacement because of `attribute`.
///
/// # Panics
///
/// Panics if `attribute` does not force replacement.
pub fn assert_plan_replaces(plan: &PlanResult, attribute: &str) {
    assert!(
        plan.requires_replace.contains(attribute),
        "Expected '{}' to force replacement, but replacement triggers are {:?}",
        attribute,
        plan.requires_replace
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.is_replace(),
        "Expected plan to update in place, but it requires replacement because of {:?}",
        plan.requires_replace
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let has_change = plan.changes.iter().any(|c| c.path == path);
    assert!(
        has_change,
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error whose summary or detail
/// contains the given substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics.iter().any(|d| {
        matches!(d.severity, DiagnosticSeverity::Error)
            && (d.summary.contains(substring)
                || d.detail.as_deref().is_some_and(|detail| detail.contains(substring)))
    });

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain a warning whose summary or detail
/// contains the given substring.
///
/// # Panics
///
/// Panics if no warning contains the given substring.
pub fn assert_warning_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_warning = diagnostics.iter().any(|d| {
        matches!(d.severity, DiagnosticSeverity::Warning)
            && (d.summary.contains(substring)
                || d.detail.as_deref().is_some_and(|detail| detail.contains(substring)))
    });

    assert!(
        has_matching_warning,
        "Expected a warning containing '{}', but none found in {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::srp::SrpClient;

    #[tokio::test]
    async fn test_fake_identity_provider_full_handshake() {
        let idp = FakeIdentityProvider::new(TEST_USER_POOL, "u", "pw").unwrap();
        let srp = SrpClient::new(TEST_USER_POOL).unwrap();
        let challenge = idp
            .initiate_auth(
                &Context::new(),
                InitiateAuthRequest {
                    auth_flow: AuthFlow::UserSrpAuth,
                    client_id: "c".to_string(),
                    auth_parameters: BTreeMap::from([
                        ("USERNAME".to_string(), "u".to_string()),
                        ("SRP_A".to_string(), srp.srp_a()),
                    ]),
                },
            )
            .await
            .unwrap();
        assert_eq!(challenge.challenge_name.as_deref(), Some("PASSWORD_VERIFIER"));

        let params = &challenge.challenge_parameters;
        let claim = srp
            .password_claim("u", "pw", &params["SALT"], &params["SRP_B"], &params["SECRET_BLOCK"], Utc::now())
            .unwrap();
        let response = idp
            .respond_to_auth_challenge(
                &Context::new(),
                RespondToAuthChallengeRequest {
                    challenge_name: "PASSWORD_VERIFIER".to_string(),
                    client_id: "c".to_string(),
                    challenge_responses: BTreeMap::from([
                        ("USERNAME".to_string(), "u".to_string()),
                        ("TIMESTAMP".to_string(), claim.timestamp),
                        ("PASSWORD_CLAIM_SECRET_BLOCK".to_string(), params["SECRET_BLOCK"].clone()),
                        ("PASSWORD_CLAIM_SIGNATURE".to_string(), claim.signature),
                    ]),
                    session: challenge.session,
                },
            )
            .await
            .unwrap();

        let tokens = response.authentication_result.unwrap();
        assert!(tokens.refresh_token.is_some());
        assert_eq!(idp.login_count(), 1);
    }

    #[tokio::test]
    async fn test_fake_identity_provider_unknown_user() {
        let idp = FakeIdentityProvider::new(TEST_USER_POOL, "u", "pw").unwrap();
        let err = idp
            .initiate_auth(
                &Context::new(),
                InitiateAuthRequest {
                    auth_flow: AuthFlow::UserSrpAuth,
                    client_id: "c".to_string(),
                    auth_parameters: BTreeMap::from([
                        ("USERNAME".to_string(), "someone-else".to_string()),
                        ("SRP_A".to_string(), "02".to_string()),
                    ]),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthRejected(_)));
    }

    #[tokio::test]
    async fn test_fake_graphql_routes_and_records() {
        let graphql = FakeGraphql::new();
        graphql.returns("GetThing", json!({"name": "x"}));

        let request = GraphqlRequest {
            operation_name: "GetThing".to_string(),
            query: "query GetThing { result: GetThing { name } }".to_string(),
            variables: json!({"name": "x"}),
        };
        let body = graphql.post(&Context::new(), "token", &request).await.unwrap();
        assert_eq!(body, json!({"data": {"result": {"name": "x"}}}));
        assert_eq!(graphql.call_count("GetThing"), 1);
        assert_eq!(graphql.last_call("GetThing").unwrap().authorization, "token");
        assert_eq!(graphql.mutation_count(), 0);

        let unrouted = GraphqlRequest {
            operation_name: "Other".to_string(),
            ..request
        };
        assert!(matches!(
            graphql.post(&Context::new(), "token", &unrouted).await,
            Err(ProviderError::Transport(_))
        ));
    }

    #[test]
    fn test_jwt_expiring_at_round_trips_through_claims() {
        let exp = Utc::now() + chrono::Duration::minutes(5);
        let token = jwt_expiring_at(exp);
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(
            crate::auth::session::token_expiration(&token).unwrap().timestamp(),
            exp.timestamp()
        );
    }

    #[test]
    fn test_assert_no_errors() {
        let diagnostics = vec![Diagnostic::warning("Just a warning")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains_detail() {
        let diagnostics = vec![Diagnostic::error("Invalid configuration").with_detail("name too short")];
        assert_has_errors(&diagnostics);
        assert_error_contains(&diagnostics, "Invalid");
        assert_error_contains(&diagnostics, "too short");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("field1"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("field1"));
        assert!(display.contains("More info"));
    }
}
