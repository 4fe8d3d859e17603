//! Tenant operations. The tenant always exists; it can only be updated.

use serde::Serialize;
use serde_json::json;

use super::{expect_mutated, Mutated};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::types::Tenant;
use crate::graphql::GraphqlClient;

const FIELDS: &str = "name active audit config description region table";

/// Mutable tenant fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TenantUpdate {
    /// JSON config.
    pub config: Option<String>,
    /// Description.
    pub description: Option<String>,
}

#[derive(Serialize)]
struct TenantVars<'a> {
    tenant: &'a str,
    #[serde(flatten)]
    input: &'a TenantUpdate,
}

/// Fetch the tenant.
pub async fn get_tenant(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
) -> Result<Option<Tenant>, ProviderError> {
    let document = format!(
        "query GetTenant($tenant: String!) {{ result: GetTenant(tenant: $tenant) {{ {FIELDS} }} }}"
    );
    client
        .fetch(ctx, "GetTenant", &document, &json!({"tenant": tenant}))
        .await
}

/// Update the tenant's config and description.
pub async fn update_tenant(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    input: &TenantUpdate,
) -> Result<Tenant, ProviderError> {
    let document = format!(
        "mutation UpdateTenant($tenant: String!, $config: AWSJSON, $description: String) {{ \
           result: GetTenant(tenant: $tenant) {{ \
             Update(config: $config, description: $description) {{ {FIELDS} }} }} }}"
    );
    let mutated: Option<Mutated<Tenant>> = client
        .fetch(ctx, "UpdateTenant", &document, &TenantVars { tenant, input })
        .await?;
    expect_mutated("UpdateTenant", tenant, None, mutated)
}
