//! Tenant users and API users.

use std::sync::Arc;

use async_trait::async_trait;

use super::{credentials, credentials_out, description, email, role};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::user::{self, ApiUserInput, TenantUserCreate, TenantUserUpdate};
use crate::graphql::types::{ApiUser, TenantUser};
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::validation::OneOf;
use crate::value::ValueTree;

/// A person with access to the tenant, keyed by email.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantUserResource;

/// A programmatic user with generated credentials, keyed by username.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiUserResource;

fn seed(attribute: &str, id: &str) -> Result<ValueTree, ProviderError> {
    if id.is_empty() {
        return Err(ProviderError::ImportIdInvalid {
            id: id.to_string(),
            reason: format!("expected the user's {}", attribute),
        });
    }
    let mut state = ValueTree::new();
    state.set_known(attribute, id.to_string());
    Ok(state)
}

fn key_of(state: &ValueTree, attribute: &str) -> String {
    state.raw(attribute).as_str().unwrap_or("<unnamed>").to_string()
}

// =============================================================================
// Tenant user
// =============================================================================

fn tenant_user_state(u: TenantUser) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("email", u.email);
    state.set_optional("first_name", u.first_name);
    state.set_optional("last_name", u.last_name);
    state.set_known("role", u.role);
    state.set_known("status", u.status);
    state
}

#[async_trait]
impl Resource for TenantUserResource {
    fn type_name(&self) -> &'static str {
        "tenant_user"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A user of the tenant. The user must already have an EchoStream login.")
            .with_attribute("email", email())
            .with_attribute(
                "first_name",
                Attribute::computed_string().with_description("The user's first name."),
            )
            .with_attribute(
                "last_name",
                Attribute::computed_string().with_description("The user's last name."),
            )
            .with_attribute("role", role(AttributeFlags::required()))
            .with_attribute(
                "status",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                    .use_state_for_unknown()
                    .with_description("The user's status within the tenant.")
                    .with_validator(Arc::new(OneOf::new(["active", "inactive", "invited", "pending"]))),
            )
    }

    fn display_key(&self, state: &ValueTree) -> String {
        key_of(state, "email")
    }

    fn import_state(&self, id: &str) -> Result<ValueTree, ProviderError> {
        seed("email", id)
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let email: String = plan.required("email")?;
        let input = TenantUserCreate {
            role: plan.required("role")?,
        };
        let created = user::create_tenant_user(ctx, &data.client, &data.tenant, &email, &input).await?;

        // Creation cannot set the status; apply it separately when it differs.
        match plan.optional::<String>("status")? {
            Some(status) if status != created.status => {
                let update = TenantUserUpdate {
                    role: None,
                    status: Some(status),
                };
                let updated = user::update_tenant_user(ctx, &data.client, &data.tenant, &email, &update).await?;
                Ok(tenant_user_state(updated))
            },
            _ => Ok(tenant_user_state(created)),
        }
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let email: String = state.required("email")?;
        let found = user::get_tenant_user(ctx, &data.client, &data.tenant, &email).await?;
        Ok(found.map(tenant_user_state))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let email: String = plan.required("email")?;
        let input = TenantUserUpdate {
            role: plan.optional("role")?,
            status: plan.optional("status")?,
        };
        let updated = user::update_tenant_user(ctx, &data.client, &data.tenant, &email, &input).await?;
        Ok(tenant_user_state(updated))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        let email: String = state.required("email")?;
        user::delete_tenant_user(ctx, &data.client, &data.tenant, &email).await
    }
}

// =============================================================================
// API user
// =============================================================================

fn api_user_input(plan: &ValueTree) -> Result<ApiUserInput, ProviderError> {
    Ok(ApiUserInput {
        description: plan.optional("description")?,
        role: plan.required("role")?,
    })
}

fn api_user_state(u: ApiUser, prior: Option<&ValueTree>) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("username", u.username);
    state.set_optional("appsync_endpoint", u.appsync_endpoint);
    let credentials = credentials_out(u.credentials);
    match prior {
        Some(prior) if credentials.is_null() => state.insert_raw("credentials", prior.raw("credentials").clone()),
        _ => state.insert_raw("credentials", credentials),
    }
    state.set_optional("description", u.description);
    state.set_known("role", u.role);
    state
}

#[async_trait]
impl Resource for ApiUserResource {
    fn type_name(&self) -> &'static str {
        "api_user"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An API user with generated credentials for calling the tenant's API.")
            .with_attribute(
                "username",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The generated username."),
            )
            .with_attribute(
                "appsync_endpoint",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The GraphQL endpoint the user calls."),
            )
            .with_attribute("credentials", credentials())
            .with_attribute("description", description())
            .with_attribute("role", role(AttributeFlags::required()))
    }

    fn display_key(&self, state: &ValueTree) -> String {
        key_of(state, "username")
    }

    fn import_state(&self, id: &str) -> Result<ValueTree, ProviderError> {
        seed("username", id)
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let created = user::create_api_user(ctx, &data.client, &data.tenant, &api_user_input(plan)?).await?;
        Ok(api_user_state(created, None))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let username: String = state.required("username")?;
        let found = user::get_api_user(ctx, &data.client, &data.tenant, &username).await?;
        Ok(found.map(|u| api_user_state(u, Some(state))))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let username: String = prior.required("username")?;
        let updated =
            user::update_api_user(ctx, &data.client, &data.tenant, &username, &api_user_input(plan)?).await?;
        Ok(api_user_state(updated, Some(prior)))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        let username: String = state.required("username")?;
        user::delete_api_user(ctx, &data.client, &data.tenant, &username).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EchoStreamProvider;
    use crate::testing::{assert_has_errors, assert_plan_replaces, FakeBackends, ProviderTester, TestError};
    use serde_json::json;

    async fn configured() -> (FakeBackends, ProviderTester<EchoStreamProvider>) {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        tester.configure(backends.provider_config()).await.unwrap();
        (backends, tester)
    }

    fn remote_user(status: &str) -> serde_json::Value {
        json!({
            "email": "dev@example.com",
            "first_name": "Dev",
            "last_name": null,
            "role": "user",
            "status": status,
        })
    }

    fn remote_api_user(with_credentials: bool) -> serde_json::Value {
        let credentials = with_credentials.then(|| {
            json!({
                "client_id": "api-client",
                "password": "api-secret",
                "user_pool_id": "us-east-1_ApiPool",
                "username": "api-user-1",
            })
        });
        json!({
            "username": "api-user-1",
            "appsync_endpoint": "https://api.test.echo.stream/graphql",
            "credentials": credentials,
            "description": null,
            "role": "read_only",
        })
    }

    #[tokio::test]
    async fn test_tenant_user_status_applied_after_create() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("CreateTenantUser", remote_user("pending"));
        backends
            .graphql
            .returns("UpdateTenantUser", json!({"Update": remote_user("inactive")}));

        let plan = tester
            .plan_create(
                "echostream_tenant_user",
                json!({"email": "dev@example.com", "role": "user", "status": "inactive"}),
            )
            .await
            .unwrap();
        let state = tester
            .create("echostream_tenant_user", plan.planned_state.unwrap())
            .await
            .unwrap();
        assert_eq!(state.raw("status").as_str(), Some("inactive"));
        assert_eq!(
            backends.graphql.last_call("UpdateTenantUser").unwrap().variables,
            json!({"tenant": "test-tenant", "email": "dev@example.com", "role": null, "status": "inactive"})
        );
    }

    #[tokio::test]
    async fn test_tenant_user_without_status_is_one_call() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("CreateTenantUser", remote_user("active"));
        let plan = tester
            .plan_create("echostream_tenant_user", json!({"email": "dev@example.com", "role": "user"}))
            .await
            .unwrap();
        tester
            .create("echostream_tenant_user", plan.planned_state.unwrap())
            .await
            .unwrap();
        assert_eq!(backends.graphql.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_tenant_user_email_change_replaces() {
        let (_backends, tester) = configured().await;
        let prior = tenant_user_state(serde_json::from_value(remote_user("active")).unwrap());
        let plan = tester
            .plan_update(
                "echostream_tenant_user",
                prior,
                json!({"email": "other@example.com", "role": "user"}),
            )
            .await
            .unwrap();
        assert_plan_replaces(&plan, "email");
    }

    #[tokio::test]
    async fn test_invalid_role_rejected() {
        let (_backends, tester) = configured().await;
        let err = tester
            .validate_resource_config("echostream_api_user", json!({"role": "owner"}))
            .await
            .unwrap_err();
        match err {
            TestError::Diagnostics(diags) => assert_has_errors(&diags),
            other => panic!("expected diagnostics, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_api_user_lifecycle_keeps_credentials() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("CreateApiUser", remote_api_user(true));
        let plan = tester
            .plan_create("echostream_api_user", json!({"role": "read_only"}))
            .await
            .unwrap();
        let planned = plan.planned_state.unwrap();
        assert!(planned.raw("username").is_unknown());
        let created = tester.create("echostream_api_user", planned).await.unwrap();
        assert_eq!(created.raw("username").as_str(), Some("api-user-1"));

        backends.graphql.returns("GetApiUser", remote_api_user(false));
        let read = tester.read("echostream_api_user", created.clone()).await.unwrap().unwrap();
        assert_eq!(read.raw("credentials"), created.raw("credentials"));
        assert_eq!(
            backends.graphql.last_call("GetApiUser").unwrap().variables,
            json!({"username": "api-user-1", "tenant": "test-tenant"})
        );
    }

    #[tokio::test]
    async fn test_api_user_import_by_username() {
        let (_backends, tester) = configured().await;
        let imported = tester.import_resource("echostream_api_user", "api-user-1").await.unwrap();
        assert_eq!(imported[0].state.raw("username").as_str(), Some("api-user-1"));
        assert!(tester.import_resource("echostream_api_user", "").await.is_err());
    }

    #[test]
    fn test_display_keys() {
        let user = tenant_user_state(serde_json::from_value(remote_user("active")).unwrap());
        assert_eq!(TenantUserResource.display_key(&user), "dev@example.com");
        let api = api_user_state(serde_json::from_value(remote_api_user(false)).unwrap(), None);
        assert_eq!(ApiUserResource.display_key(&api), "api-user-1");
    }
}
