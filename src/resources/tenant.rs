use async_trait::async_trait;

use super::{config, description, json_in, json_out};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::tenant::{self, TenantUpdate};
use crate::graphql::types::Tenant;
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, Schema};
use crate::value::ValueTree;

/// The provider's own tenant.
///
/// The tenant always exists, so creating it adopts it and applies the
/// configured settings, and destroying it only clears them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantResource;

fn input_of(plan: &ValueTree) -> Result<TenantUpdate, ProviderError> {
    Ok(TenantUpdate {
        config: json_in(plan, "config")?,
        description: plan.optional("description")?,
    })
}

pub(crate) fn state_of(t: Tenant) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", t.name);
    state.set_known("active", t.active);
    state.set_known("audit", t.audit);
    json_out(&mut state, "config", t.config);
    state.set_optional("description", t.description);
    state.set_optional("region", t.region);
    state.set_optional("table", t.table);
    state
}

async fn apply(ctx: &Context, data: &ProviderData, input: &TenantUpdate) -> Result<ValueTree, ProviderError> {
    let updated = tenant::update_tenant(ctx, &data.client, &data.tenant, input).await?;
    Ok(state_of(updated))
}

#[async_trait]
impl Resource for TenantResource {
    fn type_name(&self) -> &'static str {
        "tenant"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Settings of the tenant the provider is configured for.")
            .with_attribute(
                "name",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The tenant's name."),
            )
            .with_attribute(
                "active",
                Attribute::computed_bool().with_description("Whether the tenant is active."),
            )
            .with_attribute(
                "audit",
                Attribute::computed_bool().with_description("Whether message auditing is enabled."),
            )
            .with_attribute("config", config())
            .with_attribute("description", description())
            .with_attribute(
                "region",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The AWS region the tenant runs in."),
            )
            .with_attribute(
                "table",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The tenant's DynamoDB table."),
            )
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        apply(ctx, data, &input_of(plan)?).await
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = tenant::get_tenant(ctx, &data.client, &data.tenant).await?;
        Ok(found.map(state_of))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        apply(ctx, data, &input_of(plan)?).await
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _state: &ValueTree,
    ) -> Result<(), ProviderError> {
        apply(ctx, data, &TenantUpdate::default()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EchoStreamProvider;
    use crate::testing::{FakeBackends, ProviderTester, TEST_TENANT};
    use serde_json::json;

    const KIND: &str = "echostream_tenant";

    async fn configured() -> (FakeBackends, ProviderTester<EchoStreamProvider>) {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        tester.configure(backends.provider_config()).await.unwrap();
        (backends, tester)
    }

    fn remote(description: Option<&str>) -> serde_json::Value {
        json!({
            "name": TEST_TENANT,
            "active": true,
            "audit": false,
            "config": null,
            "description": description,
            "region": "us-east-1",
            "table": "tenant-table",
        })
    }

    #[tokio::test]
    async fn test_create_adopts_tenant() {
        let (backends, tester) = configured().await;
        backends
            .graphql
            .returns("UpdateTenant", json!({"Update": remote(Some("ours"))}));

        let plan = tester.plan_create(KIND, json!({"description": "ours"})).await.unwrap();
        let state = tester.create(KIND, plan.planned_state.unwrap()).await.unwrap();
        assert_eq!(state.raw("name").as_str(), Some(TEST_TENANT));
        assert_eq!(state.raw("region").as_str(), Some("us-east-1"));
        assert_eq!(backends.graphql.call_count("UpdateTenant"), 1);
        assert_eq!(
            backends.graphql.last_call("UpdateTenant").unwrap().variables,
            json!({"tenant": TEST_TENANT, "config": null, "description": "ours"})
        );
    }

    #[tokio::test]
    async fn test_delete_clears_settings() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("UpdateTenant", json!({"Update": remote(None)}));

        let state = state_of(serde_json::from_value(remote(Some("ours"))).unwrap());
        tester.delete(KIND, state).await.unwrap();
        assert_eq!(
            backends.graphql.last_call("UpdateTenant").unwrap().variables,
            json!({"tenant": TEST_TENANT, "config": null, "description": null})
        );
    }

    #[tokio::test]
    async fn test_read_ignores_state_name() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("GetTenant", remote(None));
        let stale = ValueTree::from_json(json!({"name": "imported-id"})).unwrap();
        let read = tester.read(KIND, stale).await.unwrap().unwrap();
        assert_eq!(read.raw("name").as_str(), Some(TEST_TENANT));
        assert_eq!(
            backends.graphql.last_call("GetTenant").unwrap().variables,
            json!({"tenant": TEST_TENANT})
        );
    }
}
