//! Apps: external apps and both halves of a cross-tenant relationship.

use async_trait::async_trait;

use super::{config, credentials, credentials_out, description, json_in, json_out, name_attribute, name_of};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::app::{
    self, CrossTenantAppUpdate, CrossTenantReceivingAppCreate, CrossTenantSendingAppCreate,
    ExternalAppInput,
};
use crate::graphql::operations::kind_error;
use crate::graphql::types::{App, CrossTenantReceivingApp, CrossTenantSendingApp, ExternalApp};
use crate::plan::PlanRequest;
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::value::ValueTree;

/// An app whose nodes run outside EchoStream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalAppResource;

/// The sending half of a cross-tenant relationship.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossTenantSendingAppResource;

/// The receiving half of a cross-tenant relationship.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossTenantReceivingAppResource;

async fn lookup<T>(
    ctx: &Context,
    data: &ProviderData,
    state: &ValueTree,
    expected: &str,
    pick: fn(App) -> Option<T>,
) -> Result<Option<T>, ProviderError> {
    let name = name_of(state)?;
    let Some(found) = app::get_app(ctx, &data.client, &data.tenant, &name).await? else {
        return Ok(None);
    };
    let actual = found.kind();
    pick(found)
        .map(Some)
        .ok_or_else(|| kind_error(&name, expected, actual))
}

/// Removing either half cuts the other tenant off until it is recreated.
fn warn_on_sever(req: &mut PlanRequest, other_tenant_attribute: &str) {
    if !req.removes_existing() {
        return;
    }
    let Some(state) = &req.state else {
        return;
    };
    let name = state.raw("name").as_str().unwrap_or("<unnamed>").to_string();
    let other = state
        .raw(other_tenant_attribute)
        .as_str()
        .unwrap_or("the other tenant")
        .to_string();
    let action = if req.is_destroy() { "Destroying" } else { "Replacing" };
    req.warn(
        Diagnostic::warning("Cross-tenant relationship will be severed").with_detail(format!(
            "{} app '{}' cuts off messages exchanged with tenant '{}' until the relationship is re-established on both sides",
            action, name, other
        )),
    );
}

// =============================================================================
// External app
// =============================================================================

fn external_input(plan: &ValueTree) -> Result<ExternalAppInput, ProviderError> {
    Ok(ExternalAppInput {
        config: json_in(plan, "config")?,
        description: plan.optional("description")?,
        table_access: plan.optional("table_access")?,
    })
}

fn external_state(a: ExternalApp) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", a.name);
    state.set_optional("appsync_endpoint", a.appsync_endpoint);
    json_out(&mut state, "config", a.config);
    state.insert_raw("credentials", credentials_out(a.credentials));
    state.set_optional("description", a.description);
    state.set_known("table_access", a.table_access);
    state
}

/// Credentials are only returned on creation and read; keep the prior copy otherwise.
fn keep_credentials(mut state: ValueTree, prior: &ValueTree) -> ValueTree {
    if state.raw("credentials").is_null() {
        state.insert_raw("credentials", prior.raw("credentials").clone());
    }
    state
}

#[async_trait]
impl Resource for ExternalAppResource {
    fn type_name(&self) -> &'static str {
        "external_app"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An app running nodes outside EchoStream, authenticating with its own credentials.")
            .with_attribute("name", name_attribute("external app"))
            .with_attribute(
                "appsync_endpoint",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The GraphQL endpoint the app calls."),
            )
            .with_attribute("config", config())
            .with_attribute("credentials", credentials())
            .with_attribute("description", description())
            .with_attribute(
                "table_access",
                Attribute::new(AttributeType::Bool, AttributeFlags::optional_computed())
                    .use_state_for_unknown()
                    .with_description("Whether the app may read and write the tenant table. Defaults to false."),
            )
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let created =
            app::create_external_app(ctx, &data.client, &data.tenant, &name_of(plan)?, &external_input(plan)?)
                .await?;
        Ok(external_state(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "ExternalApp", |a| match a {
            App::ExternalApp(a) => Some(a),
            _ => None,
        })
        .await?;
        Ok(found.map(|a| keep_credentials(external_state(a), state)))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let updated =
            app::update_external_app(ctx, &data.client, &data.tenant, &name_of(plan)?, &external_input(plan)?)
                .await?;
        Ok(keep_credentials(external_state(updated), prior))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        app::delete_app(ctx, &data.client, &data.tenant, &name_of(state)?, "ExternalApp").await
    }
}

// =============================================================================
// Cross-tenant sending app
// =============================================================================

fn sending_state(a: CrossTenantSendingApp) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", a.name);
    state.set_optional("description", a.description);
    state.set_known("receiving_app", a.receiving_app);
    state.set_known("receiving_tenant", a.receiving_tenant);
    state
}

#[async_trait]
impl Resource for CrossTenantSendingAppResource {
    fn type_name(&self) -> &'static str {
        "cross_tenant_sending_app"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Sends messages to a receiving app in another tenant.")
            .with_attribute("name", name_attribute("cross-tenant sending app"))
            .with_attribute("description", description())
            .with_attribute(
                "receiving_app",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The receiving app in the other tenant."),
            )
            .with_attribute(
                "receiving_tenant",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The tenant messages are sent to."),
            )
    }

    async fn modify_plan(
        &self,
        _ctx: &Context,
        _data: &ProviderData,
        req: &mut PlanRequest,
    ) -> Result<(), ProviderError> {
        warn_on_sever(req, "receiving_tenant");
        Ok(())
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = CrossTenantSendingAppCreate {
            description: plan.optional("description")?,
            receiving_app: plan.required("receiving_app")?,
            receiving_tenant: plan.required("receiving_tenant")?,
        };
        let created =
            app::create_cross_tenant_sending_app(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(sending_state(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "CrossTenantSendingApp", |a| match a {
            App::CrossTenantSendingApp(a) => Some(a),
            _ => None,
        })
        .await?;
        Ok(found.map(sending_state))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = CrossTenantAppUpdate {
            description: plan.optional("description")?,
        };
        let updated =
            app::update_cross_tenant_sending_app(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(sending_state(updated))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        app::delete_app(ctx, &data.client, &data.tenant, &name_of(state)?, "CrossTenantSendingApp").await
    }
}

// =============================================================================
// Cross-tenant receiving app
// =============================================================================

fn receiving_state(a: CrossTenantReceivingApp) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", a.name);
    state.set_optional("description", a.description);
    state.set_optional("sending_app", a.sending_app);
    state.set_known("sending_tenant", a.sending_tenant);
    state
}

#[async_trait]
impl Resource for CrossTenantReceivingAppResource {
    fn type_name(&self) -> &'static str {
        "cross_tenant_receiving_app"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Receives messages from a sending app in another tenant.")
            .with_attribute("name", name_attribute("cross-tenant receiving app"))
            .with_attribute("description", description())
            .with_attribute(
                "sending_app",
                Attribute::computed_string()
                    .with_description("The sending app in the other tenant, once it has connected."),
            )
            .with_attribute(
                "sending_tenant",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("The tenant messages are received from."),
            )
    }

    async fn modify_plan(
        &self,
        _ctx: &Context,
        _data: &ProviderData,
        req: &mut PlanRequest,
    ) -> Result<(), ProviderError> {
        warn_on_sever(req, "sending_tenant");
        Ok(())
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = CrossTenantReceivingAppCreate {
            description: plan.optional("description")?,
            sending_tenant: plan.required("sending_tenant")?,
        };
        let created =
            app::create_cross_tenant_receiving_app(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(receiving_state(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "CrossTenantReceivingApp", |a| match a {
            App::CrossTenantReceivingApp(a) => Some(a),
            _ => None,
        })
        .await?;
        Ok(found.map(receiving_state))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = CrossTenantAppUpdate {
            description: plan.optional("description")?,
        };
        let updated =
            app::update_cross_tenant_receiving_app(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(receiving_state(updated))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        app::delete_app(ctx, &data.client, &data.tenant, &name_of(state)?, "CrossTenantReceivingApp").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EchoStreamProvider;
    use crate::testing::{assert_plan_replaces, assert_warning_contains, FakeBackends, ProviderTester};
    use crate::value::Dynamic;
    use serde_json::json;

    async fn configured() -> (FakeBackends, ProviderTester<EchoStreamProvider>) {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        tester.configure(backends.provider_config()).await.unwrap();
        (backends, tester)
    }

    fn remote_external(with_credentials: bool) -> serde_json::Value {
        let credentials = with_credentials.then(|| {
            json!({
                "client_id": "app-client",
                "password": "app-secret",
                "user_pool_id": "us-east-1_AppPool",
                "username": "app-user",
            })
        });
        json!({
            "name": "ext",
            "appsync_endpoint": "https://api.test.echo.stream/graphql",
            "config": null,
            "credentials": credentials,
            "description": null,
            "table_access": false,
        })
    }

    fn sending_state_json() -> ValueTree {
        sending_state(CrossTenantSendingApp {
            name: "to-partner".to_string(),
            description: None,
            receiving_app: "from-us".to_string(),
            receiving_tenant: "partner".to_string(),
        })
    }

    #[tokio::test]
    async fn test_external_app_credentials_are_sensitive_and_kept() {
        let (backends, tester) = configured().await;
        let schema = tester.schema();
        assert!(schema.resources["echostream_external_app"].is_sensitive("credentials"));

        backends.graphql.returns("CreateExternalApp", remote_external(true));
        let plan = tester
            .plan_create("echostream_external_app", json!({"name": "ext"}))
            .await
            .unwrap();
        let planned = plan.planned_state.unwrap();
        assert!(planned.raw("credentials").is_unknown());
        let created = tester.create("echostream_external_app", planned).await.unwrap();
        let creds = created.raw("credentials").as_entries().unwrap();
        assert_eq!(creds["password"], Dynamic::String("app-secret".to_string()));

        backends.graphql.returns(
            "UpdateExternalApp",
            json!({"__typename": "ExternalApp", "Update": remote_external(false)}),
        );
        let mut planned = created.clone();
        planned.set_known("description", "now described".to_string());
        let updated = tester.update("echostream_external_app", created.clone(), planned).await.unwrap();
        assert_eq!(updated.raw("credentials"), created.raw("credentials"));
    }

    #[tokio::test]
    async fn test_read_of_wrong_app_kind() {
        let (backends, tester) = configured().await;
        let mut remote = remote_external(false);
        remote["__typename"] = json!("ExternalApp");
        backends.graphql.returns("GetApp", remote);

        let err = tester
            .read("echostream_cross_tenant_sending_app", sending_state_json())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::KindMismatch { ref expected, .. } if expected == "CrossTenantSendingApp"));
    }

    #[tokio::test]
    async fn test_destroying_sending_app_warns() {
        let (_backends, tester) = configured().await;
        let plan = tester
            .plan_delete("echostream_cross_tenant_sending_app", sending_state_json())
            .await
            .unwrap();
        assert!(plan.is_destroy());
        assert_warning_contains(&plan.diagnostics, "partner");
    }

    #[tokio::test]
    async fn test_retargeting_sending_app_replaces_and_warns() {
        let (_backends, tester) = configured().await;
        let plan = tester
            .plan_update(
                "echostream_cross_tenant_sending_app",
                sending_state_json(),
                json!({"name": "to-partner", "receiving_app": "from-us", "receiving_tenant": "other"}),
            )
            .await
            .unwrap();
        assert_plan_replaces(&plan, "receiving_tenant");
        assert_warning_contains(&plan.diagnostics, "Replacing");
    }

    #[tokio::test]
    async fn test_description_change_does_not_warn() {
        let (_backends, tester) = configured().await;
        let plan = tester
            .plan_update(
                "echostream_cross_tenant_sending_app",
                sending_state_json(),
                json!({"name": "to-partner", "description": "d", "receiving_app": "from-us", "receiving_tenant": "partner"}),
            )
            .await
            .unwrap();
        assert!(plan.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_delete_receiving_app() {
        let (backends, tester) = configured().await;
        backends.graphql.returns(
            "DeleteApp",
            json!({"__typename": "CrossTenantReceivingApp", "Delete": true}),
        );
        let state = receiving_state(CrossTenantReceivingApp {
            name: "from-partner".to_string(),
            description: None,
            sending_tenant: "partner".to_string(),
            sending_app: None,
        });
        tester.delete("echostream_cross_tenant_receiving_app", state).await.unwrap();
        assert_eq!(backends.graphql.call_count("DeleteApp"), 1);
    }
}
