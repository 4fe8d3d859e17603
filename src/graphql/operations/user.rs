//! Tenant user and API user operations.

use serde::Serialize;
use serde_json::json;

use super::{expect_created, expect_deleted, expect_mutated, Deleted, Mutated};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::types::{ApiUser, TenantUser};
use crate::graphql::GraphqlClient;

const TENANT_USER_FIELDS: &str = "email first_name last_name role status";
const API_USER_FIELDS: &str = "username appsync_endpoint \
    credentials { client_id password user_pool_id username } description role";

/// Tenant user creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TenantUserCreate {
    /// Role within the tenant.
    pub role: String,
}

/// Mutable tenant user fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TenantUserUpdate {
    /// Role within the tenant.
    pub role: Option<String>,
    /// Membership status.
    pub status: Option<String>,
}

/// API user inputs. Both fields are mutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiUserInput {
    /// Description.
    pub description: Option<String>,
    /// Role within the tenant.
    pub role: String,
}

#[derive(Serialize)]
struct UserVars<'a, I: Serialize> {
    tenant: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(flatten)]
    input: &'a I,
}

impl<'a, I: Serialize> UserVars<'a, I> {
    fn by_email(tenant: &'a str, email: &'a str, input: &'a I) -> Self {
        Self {
            tenant,
            email: Some(email),
            username: None,
            input,
        }
    }

    fn by_username(tenant: &'a str, username: &'a str, input: &'a I) -> Self {
        Self {
            tenant,
            email: None,
            username: Some(username),
            input,
        }
    }
}

// =============================================================================
// Tenant users
// =============================================================================

/// Look up a tenant user by email.
pub async fn get_tenant_user(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    email: &str,
) -> Result<Option<TenantUser>, ProviderError> {
    let document = format!(
        "query GetTenantUser($email: AWSEmail!, $tenant: String!) {{ \
           result: GetTenantUser(email: $email, tenant: $tenant) {{ {TENANT_USER_FIELDS} }} }}"
    );
    client
        .fetch(ctx, "GetTenantUser", &document, &json!({"email": email, "tenant": tenant}))
        .await
}

/// Add a user to the tenant.
pub async fn create_tenant_user(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    email: &str,
    input: &TenantUserCreate,
) -> Result<TenantUser, ProviderError> {
    let document = format!(
        "mutation CreateTenantUser($email: AWSEmail!, $tenant: String!, $role: ApiUserRole!) {{ \
           result: CreateTenantUser(email: $email, tenant: $tenant, role: $role) \
             {{ {TENANT_USER_FIELDS} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateTenantUser", &document, &UserVars::by_email(tenant, email, input))
        .await?;
    expect_created("CreateTenantUser", created)
}

/// Update a tenant user's role or status.
pub async fn update_tenant_user(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    email: &str,
    input: &TenantUserUpdate,
) -> Result<TenantUser, ProviderError> {
    let document = format!(
        "mutation UpdateTenantUser($email: AWSEmail!, $tenant: String!, $role: ApiUserRole, \
           $status: UserStatus) {{ \
           result: GetTenantUser(email: $email, tenant: $tenant) {{ \
             Update(role: $role, status: $status) {{ {TENANT_USER_FIELDS} }} }} }}"
    );
    let mutated: Option<Mutated<TenantUser>> = client
        .fetch(ctx, "UpdateTenantUser", &document, &UserVars::by_email(tenant, email, input))
        .await?;
    expect_mutated("UpdateTenantUser", email, None, mutated)
}

/// Remove a user from the tenant.
pub async fn delete_tenant_user(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    email: &str,
) -> Result<(), ProviderError> {
    let document = "mutation DeleteTenantUser($email: AWSEmail!, $tenant: String!) { \
           result: GetTenantUser(email: $email, tenant: $tenant) { Delete } }";
    let deleted: Option<Deleted> = client
        .fetch(ctx, "DeleteTenantUser", document, &json!({"email": email, "tenant": tenant}))
        .await?;
    expect_deleted("DeleteTenantUser", email, None, deleted)
}

// =============================================================================
// API users
// =============================================================================

/// Look up an API user by username.
pub async fn get_api_user(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    username: &str,
) -> Result<Option<ApiUser>, ProviderError> {
    let document = format!(
        "query GetApiUser($username: String!, $tenant: String!) {{ \
           result: GetApiUser(username: $username, tenant: $tenant) {{ {API_USER_FIELDS} }} }}"
    );
    client
        .fetch(ctx, "GetApiUser", &document, &json!({"username": username, "tenant": tenant}))
        .await
}

/// Create an API user. The service generates the username.
pub async fn create_api_user(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    input: &ApiUserInput,
) -> Result<ApiUser, ProviderError> {
    #[derive(Serialize)]
    struct Vars<'a> {
        tenant: &'a str,
        #[serde(flatten)]
        input: &'a ApiUserInput,
    }

    let document = format!(
        "mutation CreateApiUser($tenant: String!, $description: String, $role: ApiUserRole!) {{ \
           result: CreateApiUser(tenant: $tenant, description: $description, role: $role) \
             {{ {API_USER_FIELDS} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateApiUser", &document, &Vars { tenant, input })
        .await?;
    expect_created("CreateApiUser", created)
}

/// Update an API user.
pub async fn update_api_user(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    username: &str,
    input: &ApiUserInput,
) -> Result<ApiUser, ProviderError> {
    let document = format!(
        "mutation UpdateApiUser($username: String!, $tenant: String!, $description: String, \
           $role: ApiUserRole) {{ \
           result: GetApiUser(username: $username, tenant: $tenant) {{ \
             Update(description: $description, role: $role) {{ {API_USER_FIELDS} }} }} }}"
    );
    let mutated: Option<Mutated<ApiUser>> = client
        .fetch(ctx, "UpdateApiUser", &document, &UserVars::by_username(tenant, username, input))
        .await?;
    expect_mutated("UpdateApiUser", username, None, mutated)
}

/// Delete an API user.
pub async fn delete_api_user(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    username: &str,
) -> Result<(), ProviderError> {
    let document = "mutation DeleteApiUser($username: String!, $tenant: String!) { \
           result: GetApiUser(username: $username, tenant: $tenant) { Delete } }";
    let deleted: Option<Deleted> = client
        .fetch(ctx, "DeleteApiUser", document, &json!({"username": username, "tenant": tenant}))
        .await?;
    expect_deleted("DeleteApiUser", username, None, deleted)
}
