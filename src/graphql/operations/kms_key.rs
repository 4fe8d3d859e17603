//! KMS key operations.

use serde::Serialize;
use serde_json::json;

use super::{expect_created, expect_deleted, expect_mutated, Deleted, Keyed, Mutated};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::types::KmsKey;
use crate::graphql::GraphqlClient;

const FIELDS: &str = "name arn description in_use";

/// Mutable KMS key inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KmsKeyInput {
    /// Description; `None` leaves the service default.
    pub description: Option<String>,
}

/// Look up a key by name.
pub async fn get_kms_key(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
) -> Result<Option<KmsKey>, ProviderError> {
    let document = format!(
        "query GetKmsKey($name: String!, $tenant: String!) {{ \
           result: GetKmsKey(name: $name, tenant: $tenant) {{ {FIELDS} }} }}"
    );
    client
        .fetch(ctx, "GetKmsKey", &document, &json!({"name": name, "tenant": tenant}))
        .await
}

/// Create a key.
pub async fn create_kms_key(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &KmsKeyInput,
) -> Result<KmsKey, ProviderError> {
    let document = format!(
        "mutation CreateKmsKey($name: String!, $tenant: String!, $description: String) {{ \
           result: CreateKmsKey(name: $name, tenant: $tenant, description: $description) {{ {FIELDS} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateKmsKey", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_created("CreateKmsKey", created)
}

/// Update a key's mutable fields.
pub async fn update_kms_key(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &KmsKeyInput,
) -> Result<KmsKey, ProviderError> {
    let document = format!(
        "mutation UpdateKmsKey($name: String!, $tenant: String!, $description: String) {{ \
           result: GetKmsKey(name: $name, tenant: $tenant) {{ \
             Update(description: $description) {{ {FIELDS} }} }} }}"
    );
    let mutated: Option<Mutated<KmsKey>> = client
        .fetch(ctx, "UpdateKmsKey", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_mutated("UpdateKmsKey", name, None, mutated)
}

/// Delete a key. A key that no longer exists yields [`ProviderError::NotFound`].
pub async fn delete_kms_key(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
) -> Result<(), ProviderError> {
    let document = "mutation DeleteKmsKey($name: String!, $tenant: String!) { \
           result: GetKmsKey(name: $name, tenant: $tenant) { Delete } }";
    let deleted: Option<Deleted> = client
        .fetch(ctx, "DeleteKmsKey", document, &json!({"name": name, "tenant": tenant}))
        .await?;
    expect_deleted("DeleteKmsKey", name, None, deleted)
}
