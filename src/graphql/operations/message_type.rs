//! Message type operations.

use serde::Serialize;
use serde_json::json;

use super::{expect_created, expect_deleted, expect_mutated, Deleted, Keyed, Mutated};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::types::MessageType;
use crate::graphql::GraphqlClient;

const FIELDS: &str = "name auditor bitmapper_template description in_use processor_template \
                      readme requirements sample_message system";

/// Message type inputs. All are mutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTypeInput {
    /// Auditor source.
    pub auditor: Option<String>,
    /// Bitmapper template source.
    pub bitmapper_template: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Processor template source.
    pub processor_template: Option<String>,
    /// Markdown readme.
    pub readme: Option<String>,
    /// Python requirements.
    pub requirements: Option<Vec<String>>,
    /// Sample message.
    pub sample_message: Option<String>,
}

const INPUT_PARAMS: &str = "$auditor: String, $bitmapperTemplate: String, $description: String, \
                            $processorTemplate: String, $readme: String, $requirements: [String!], \
                            $sampleMessage: String";
const INPUT_ARGS: &str = "auditor: $auditor, bitmapperTemplate: $bitmapperTemplate, \
                          description: $description, processorTemplate: $processorTemplate, \
                          readme: $readme, requirements: $requirements, sampleMessage: $sampleMessage";

/// Look up a message type by name.
pub async fn get_message_type(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
) -> Result<Option<MessageType>, ProviderError> {
    let document = format!(
        "query GetMessageType($name: String!, $tenant: String!) {{ \
           result: GetMessageType(name: $name, tenant: $tenant) {{ {FIELDS} }} }}"
    );
    client
        .fetch(ctx, "GetMessageType", &document, &json!({"name": name, "tenant": tenant}))
        .await
}

/// Create a message type.
pub async fn create_message_type(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &MessageTypeInput,
) -> Result<MessageType, ProviderError> {
    let document = format!(
        "mutation CreateMessageType($name: String!, $tenant: String!, {INPUT_PARAMS}) {{ \
           result: CreateMessageType(name: $name, tenant: $tenant, {INPUT_ARGS}) {{ {FIELDS} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateMessageType", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_created("CreateMessageType", created)
}

/// Update a message type.
pub async fn update_message_type(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &MessageTypeInput,
) -> Result<MessageType, ProviderError> {
    let document = format!(
        "mutation UpdateMessageType($name: String!, $tenant: String!, {INPUT_PARAMS}) {{ \
           result: GetMessageType(name: $name, tenant: $tenant) {{ \
             Update({INPUT_ARGS}) {{ {FIELDS} }} }} }}"
    );
    let mutated: Option<Mutated<MessageType>> = client
        .fetch(ctx, "UpdateMessageType", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_mutated("UpdateMessageType", name, None, mutated)
}

/// Delete a message type.
pub async fn delete_message_type(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
) -> Result<(), ProviderError> {
    let document = "mutation DeleteMessageType($name: String!, $tenant: String!) { \
           result: GetMessageType(name: $name, tenant: $tenant) { Delete } }";
    let deleted: Option<Deleted> = client
        .fetch(ctx, "DeleteMessageType", document, &json!({"name": name, "tenant": tenant}))
        .await?;
    expect_deleted("DeleteMessageType", name, None, deleted)
}
