//! App operations.

use serde::Serialize;
use serde_json::json;

use super::{expect_created, expect_deleted, expect_mutated, Deleted, Keyed, Mutated};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::types::{App, CrossTenantReceivingApp, CrossTenantSendingApp, ExternalApp};
use crate::graphql::GraphqlClient;

const EXTERNAL_FIELDS: &str = "name appsync_endpoint config \
    credentials { client_id password user_pool_id username } description table_access";
const SENDING_FIELDS: &str = "name description receiving_app receiving_tenant";
const RECEIVING_FIELDS: &str = "name description sending_tenant sending_app";

/// External app inputs. All are mutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAppInput {
    /// JSON config.
    pub config: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Whether the app may read the tenant table.
    pub table_access: Option<bool>,
}

/// Cross-tenant sending app creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTenantSendingAppCreate {
    /// Description.
    pub description: Option<String>,
    /// Receiving app in the other tenant.
    pub receiving_app: String,
    /// The other tenant.
    pub receiving_tenant: String,
}

/// Cross-tenant receiving app creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTenantReceivingAppCreate {
    /// Description.
    pub description: Option<String>,
    /// The other tenant.
    pub sending_tenant: String,
}

/// The mutable fields of a cross-tenant app of either direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrossTenantAppUpdate {
    /// Description.
    pub description: Option<String>,
}

fn app_fields() -> String {
    format!(
        "__typename \
         ... on ExternalApp {{ {EXTERNAL_FIELDS} }} \
         ... on CrossTenantSendingApp {{ {SENDING_FIELDS} }} \
         ... on CrossTenantReceivingApp {{ {RECEIVING_FIELDS} }}"
    )
}

/// Look up an app of any kind.
pub async fn get_app(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
) -> Result<Option<App>, ProviderError> {
    let document = format!(
        "query GetApp($name: String!, $tenant: String!) {{ \
           result: GetApp(name: $name, tenant: $tenant) {{ {} }} }}",
        app_fields()
    );
    client
        .fetch(ctx, "GetApp", &document, &json!({"name": name, "tenant": tenant}))
        .await
}

/// Create an external app.
pub async fn create_external_app(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &ExternalAppInput,
) -> Result<ExternalApp, ProviderError> {
    let document = format!(
        "mutation CreateExternalApp($name: String!, $tenant: String!, $config: AWSJSON, \
           $description: String, $tableAccess: Boolean) {{ \
           result: CreateExternalApp(name: $name, tenant: $tenant, config: $config, \
             description: $description, tableAccess: $tableAccess) {{ {EXTERNAL_FIELDS} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateExternalApp", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_created("CreateExternalApp", created)
}

/// Update an external app.
pub async fn update_external_app(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &ExternalAppInput,
) -> Result<ExternalApp, ProviderError> {
    let document = format!(
        "mutation UpdateExternalApp($name: String!, $tenant: String!, $config: AWSJSON, \
           $description: String, $tableAccess: Boolean) {{ \
           result: GetApp(name: $name, tenant: $tenant) {{ __typename \
             ... on ExternalApp {{ Update(config: $config, description: $description, \
               tableAccess: $tableAccess) {{ {EXTERNAL_FIELDS} }} }} }} }}"
    );
    let mutated: Option<Mutated<ExternalApp>> = client
        .fetch(ctx, "UpdateExternalApp", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_mutated("UpdateExternalApp", name, Some("ExternalApp"), mutated)
}

/// Create the sending half of a cross-tenant relationship.
pub async fn create_cross_tenant_sending_app(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &CrossTenantSendingAppCreate,
) -> Result<CrossTenantSendingApp, ProviderError> {
    let document = format!(
        "mutation CreateCrossTenantSendingApp($name: String!, $tenant: String!, \
           $description: String, $receivingApp: String!, $receivingTenant: String!) {{ \
           result: CreateCrossTenantSendingApp(name: $name, tenant: $tenant, \
             description: $description, receivingApp: $receivingApp, \
             receivingTenant: $receivingTenant) {{ {SENDING_FIELDS} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateCrossTenantSendingApp", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_created("CreateCrossTenantSendingApp", created)
}

/// Update a cross-tenant sending app.
pub async fn update_cross_tenant_sending_app(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &CrossTenantAppUpdate,
) -> Result<CrossTenantSendingApp, ProviderError> {
    let document = format!(
        "mutation UpdateCrossTenantSendingApp($name: String!, $tenant: String!, \
           $description: String) {{ \
           result: GetApp(name: $name, tenant: $tenant) {{ __typename \
             ... on CrossTenantSendingApp {{ Update(description: $description) \
               {{ {SENDING_FIELDS} }} }} }} }}"
    );
    let mutated: Option<Mutated<CrossTenantSendingApp>> = client
        .fetch(ctx, "UpdateCrossTenantSendingApp", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_mutated(
        "UpdateCrossTenantSendingApp",
        name,
        Some("CrossTenantSendingApp"),
        mutated,
    )
}

/// Create the receiving half of a cross-tenant relationship.
pub async fn create_cross_tenant_receiving_app(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &CrossTenantReceivingAppCreate,
) -> Result<CrossTenantReceivingApp, ProviderError> {
    let document = format!(
        "mutation CreateCrossTenantReceivingApp($name: String!, $tenant: String!, \
           $description: String, $sendingTenant: String!) {{ \
           result: CreateCrossTenantReceivingApp(name: $name, tenant: $tenant, \
             description: $description, sendingTenant: $sendingTenant) {{ {RECEIVING_FIELDS} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateCrossTenantReceivingApp", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_created("CreateCrossTenantReceivingApp", created)
}

/// Update a cross-tenant receiving app.
pub async fn update_cross_tenant_receiving_app(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &CrossTenantAppUpdate,
) -> Result<CrossTenantReceivingApp, ProviderError> {
    let document = format!(
        "mutation UpdateCrossTenantReceivingApp($name: String!, $tenant: String!, \
           $description: String) {{ \
           result: GetApp(name: $name, tenant: $tenant) {{ __typename \
             ... on CrossTenantReceivingApp {{ Update(description: $description) \
               {{ {RECEIVING_FIELDS} }} }} }} }}"
    );
    let mutated: Option<Mutated<CrossTenantReceivingApp>> = client
        .fetch(ctx, "UpdateCrossTenantReceivingApp", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_mutated(
        "UpdateCrossTenantReceivingApp",
        name,
        Some("CrossTenantReceivingApp"),
        mutated,
    )
}

/// Delete an app, checking it is of the `expected` kind.
pub async fn delete_app(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    expected: &str,
) -> Result<(), ProviderError> {
    let document = "mutation DeleteApp($name: String!, $tenant: String!) { \
           result: GetApp(name: $name, tenant: $tenant) { __typename Delete } }";
    let deleted: Option<Deleted> = client
        .fetch(ctx, "DeleteApp", document, &json!({"name": name, "tenant": tenant}))
        .await?;
    expect_deleted("DeleteApp", name, Some(expected), deleted)
}
