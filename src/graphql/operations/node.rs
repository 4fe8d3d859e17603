//! Node operations.
//!
//! Every managed node kind has a create input carrying its immutable
//! fields and flattening an update input carrying the mutable ones.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::{expect_created, expect_deleted, expect_mutated, Deleted, Keyed, Mutated};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::types::{
    BitmapRouterNode, CrossTenantSendingNode, ExternalNode, Node, ProcessorNode, TimerNode,
    WebSubHubNode,
};
use crate::graphql::GraphqlClient;

const PROCESSOR_FIELDS: &str = "name config description inline_processor logging_level \
    managed_processor { name } receive_message_type { name } requirements \
    send_message_type { name } sequential_processing";
const ROUTER_FIELDS: &str = "name config description inline_bitmapper logging_level \
    managed_bitmapper { name } receive_message_type { name } requirements route_table";
const TIMER_FIELDS: &str = "name description schedule_expression send_message_type { name }";
const HUB_FIELDS: &str = "name config default_lease_seconds delivery_retries description endpoint \
    inline_authenticator logging_level managed_authenticator { name } max_lease_seconds \
    receive_message_type { name } requirements signature_algorithm subscription_security";
const EXTERNAL_FIELDS: &str = "name app { name } config description \
    receive_message_type { name } send_message_type { name }";
const CROSS_TENANT_FIELDS: &str = "name app { name } config description inline_processor \
    logging_level managed_processor { name } receive_message_type { name } requirements \
    send_message_type { name } sequential_processing";
const EMITTER_FIELDS: &str = "name description send_message_type { name }";

const EMITTERS: &[&str] = &[
    "ChangeEmitterNode",
    "DeadLetterEmitterNode",
    "LogEmitterNode",
    "AlertEmitterNode",
    "AuditEmitterNode",
];

/// The selection set decoding into [`Node`].
fn node_fields() -> String {
    let mut fields = format!(
        "__typename \
         ... on ProcessorNode {{ {PROCESSOR_FIELDS} }} \
         ... on BitmapRouterNode {{ {ROUTER_FIELDS} }} \
         ... on TimerNode {{ {TIMER_FIELDS} }} \
         ... on WebSubHubNode {{ {HUB_FIELDS} }} \
         ... on ExternalNode {{ {EXTERNAL_FIELDS} }} \
         ... on CrossTenantSendingNode {{ {CROSS_TENANT_FIELDS} }}"
    );
    for emitter in EMITTERS {
        fields.push_str(&format!(" ... on {emitter} {{ {EMITTER_FIELDS} }}"));
    }
    fields
}

/// `$a: T, $b: U` for a variable list.
fn params(vars: &[(&str, &str)]) -> String {
    vars.iter()
        .map(|(name, ty)| format!("${}: {}", name, ty))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `a: $a, b: $b` for a variable list.
fn args(vars: &[(&str, &str)]) -> String {
    vars.iter()
        .map(|(name, _)| format!("{}: ${}", name, name))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Inputs
// =============================================================================

/// Mutable processor node fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorNodeUpdate {
    /// JSON config.
    pub config: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Inline processor source.
    pub inline_processor: Option<String>,
    /// Logging level.
    pub logging_level: Option<String>,
    /// Managed processor function name.
    pub managed_processor: Option<String>,
    /// Python requirements.
    pub requirements: Option<Vec<String>>,
}

const PROCESSOR_UPDATE_VARS: &[(&str, &str)] = &[
    ("config", "AWSJSON"),
    ("description", "String"),
    ("inlineProcessor", "String"),
    ("loggingLevel", "LogLevel"),
    ("managedProcessor", "String"),
    ("requirements", "[String!]"),
];

/// Processor node creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorNodeCreate {
    /// Accepted message type.
    pub receive_message_type: String,
    /// Emitted message type.
    pub send_message_type: Option<String>,
    /// Process one message at a time.
    pub sequential_processing: Option<bool>,
    /// Mutable fields.
    #[serde(flatten)]
    pub update: ProcessorNodeUpdate,
}

const PROCESSOR_CREATE_VARS: &[(&str, &str)] = &[
    ("receiveMessageType", "String!"),
    ("sendMessageType", "String"),
    ("sequentialProcessing", "Boolean"),
];

/// Mutable bitmap router fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmapRouterNodeUpdate {
    /// JSON config.
    pub config: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Inline bitmapper source.
    pub inline_bitmapper: Option<String>,
    /// Logging level.
    pub logging_level: Option<String>,
    /// Managed bitmapper function name.
    pub managed_bitmapper: Option<String>,
    /// Python requirements.
    pub requirements: Option<Vec<String>>,
    /// JSON route table.
    pub route_table: Option<String>,
}

const ROUTER_UPDATE_VARS: &[(&str, &str)] = &[
    ("config", "AWSJSON"),
    ("description", "String"),
    ("inlineBitmapper", "String"),
    ("loggingLevel", "LogLevel"),
    ("managedBitmapper", "String"),
    ("requirements", "[String!]"),
    ("routeTable", "AWSJSON"),
];

/// Bitmap router creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmapRouterNodeCreate {
    /// Accepted message type.
    pub receive_message_type: String,
    /// Mutable fields.
    #[serde(flatten)]
    pub update: BitmapRouterNodeUpdate,
}

const ROUTER_CREATE_VARS: &[(&str, &str)] = &[("receiveMessageType", "String!")];

/// Mutable timer fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimerNodeUpdate {
    /// Description.
    pub description: Option<String>,
}

const TIMER_UPDATE_VARS: &[(&str, &str)] = &[("description", "String")];

/// Timer creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerNodeCreate {
    /// Cron or rate expression.
    pub schedule_expression: String,
    /// Emitted message type.
    pub send_message_type: String,
    /// Mutable fields.
    #[serde(flatten)]
    pub update: TimerNodeUpdate,
}

const TIMER_CREATE_VARS: &[(&str, &str)] =
    &[("scheduleExpression", "String!"), ("sendMessageType", "String!")];

/// Mutable WebSub hub fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSubHubNodeUpdate {
    /// JSON config.
    pub config: Option<String>,
    /// Default subscription lease.
    pub default_lease_seconds: Option<i64>,
    /// Delivery retry count.
    pub delivery_retries: Option<i64>,
    /// Description.
    pub description: Option<String>,
    /// Inline authenticator source.
    pub inline_authenticator: Option<String>,
    /// Logging level.
    pub logging_level: Option<String>,
    /// Managed authenticator function name.
    pub managed_authenticator: Option<String>,
    /// Maximum subscription lease.
    pub max_lease_seconds: Option<i64>,
    /// Python requirements.
    pub requirements: Option<Vec<String>>,
    /// Content signature algorithm.
    pub signature_algorithm: Option<String>,
    /// Subscription security mode.
    pub subscription_security: Option<String>,
}

const HUB_UPDATE_VARS: &[(&str, &str)] = &[
    ("config", "AWSJSON"),
    ("defaultLeaseSeconds", "Int"),
    ("deliveryRetries", "Int"),
    ("description", "String"),
    ("inlineAuthenticator", "String"),
    ("loggingLevel", "LogLevel"),
    ("managedAuthenticator", "String"),
    ("maxLeaseSeconds", "Int"),
    ("requirements", "[String!]"),
    ("signatureAlgorithm", "WebSubSignatureAlgorithm"),
    ("subscriptionSecurity", "WebSubSubscriptionSecurity"),
];

/// WebSub hub creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSubHubNodeCreate {
    /// Accepted message type.
    pub receive_message_type: String,
    /// Mutable fields.
    #[serde(flatten)]
    pub update: WebSubHubNodeUpdate,
}

const HUB_CREATE_VARS: &[(&str, &str)] = &[("receiveMessageType", "String!")];

/// Mutable external node fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExternalNodeUpdate {
    /// JSON config.
    pub config: Option<String>,
    /// Description.
    pub description: Option<String>,
}

const EXTERNAL_UPDATE_VARS: &[(&str, &str)] = &[("config", "AWSJSON"), ("description", "String")];

/// External node creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalNodeCreate {
    /// Owning application.
    pub app: String,
    /// Accepted message type.
    pub receive_message_type: Option<String>,
    /// Emitted message type.
    pub send_message_type: Option<String>,
    /// Mutable fields.
    #[serde(flatten)]
    pub update: ExternalNodeUpdate,
}

const EXTERNAL_CREATE_VARS: &[(&str, &str)] = &[
    ("app", "String!"),
    ("receiveMessageType", "String"),
    ("sendMessageType", "String"),
];

/// Cross-tenant sending node creation inputs. Mutable fields match a
/// processor node's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTenantSendingNodeCreate {
    /// Owning cross-tenant sending app.
    pub app: String,
    /// Accepted message type.
    pub receive_message_type: String,
    /// Emitted message type.
    pub send_message_type: Option<String>,
    /// Process one message at a time.
    pub sequential_processing: Option<bool>,
    /// Mutable fields.
    #[serde(flatten)]
    pub update: ProcessorNodeUpdate,
}

const CROSS_TENANT_CREATE_VARS: &[(&str, &str)] = &[
    ("app", "String!"),
    ("receiveMessageType", "String!"),
    ("sendMessageType", "String"),
    ("sequentialProcessing", "Boolean"),
];

// =============================================================================
// Operations
// =============================================================================

/// Look up a node of any kind.
pub async fn get_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
) -> Result<Option<Node>, ProviderError> {
    let document = format!(
        "query GetNode($name: String!, $tenant: String!) {{ \
           result: GetNode(name: $name, tenant: $tenant) {{ {} }} }}",
        node_fields()
    );
    client
        .fetch(ctx, "GetNode", &document, &json!({"name": name, "tenant": tenant}))
        .await
}

#[allow(clippy::too_many_arguments)]
async fn create<I, T>(
    ctx: &Context,
    client: &GraphqlClient,
    kind: &str,
    fields: &str,
    vars: &[&[(&str, &str)]],
    tenant: &str,
    name: &str,
    input: &I,
) -> Result<T, ProviderError>
where
    I: Serialize,
    T: DeserializeOwned,
{
    let vars: Vec<(&str, &str)> = vars.iter().flat_map(|v| v.iter().copied()).collect();
    let operation = format!("Create{}", kind);
    let document = format!(
        "mutation {operation}($name: String!, $tenant: String!, {}) {{ \
           result: {operation}(name: $name, tenant: $tenant, {}) {{ {fields} }} }}",
        params(&vars),
        args(&vars)
    );
    let created = client
        .fetch(ctx, &operation, &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_created(&operation, created)
}

#[allow(clippy::too_many_arguments)]
async fn update<I, T>(
    ctx: &Context,
    client: &GraphqlClient,
    kind: &str,
    fields: &str,
    vars: &[(&str, &str)],
    tenant: &str,
    name: &str,
    input: &I,
) -> Result<T, ProviderError>
where
    I: Serialize,
    T: DeserializeOwned,
{
    let operation = format!("Update{}", kind);
    let document = format!(
        "mutation {operation}($name: String!, $tenant: String!, {}) {{ \
           result: GetNode(name: $name, tenant: $tenant) {{ __typename \
             ... on {kind} {{ Update({}) {{ {fields} }} }} }} }}",
        params(vars),
        args(vars)
    );
    let mutated: Option<Mutated<T>> = client
        .fetch(ctx, &operation, &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_mutated(&operation, name, Some(kind), mutated)
}

/// Create a processor node.
pub async fn create_processor_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &ProcessorNodeCreate,
) -> Result<ProcessorNode, ProviderError> {
    let vars = [PROCESSOR_CREATE_VARS, PROCESSOR_UPDATE_VARS];
    create(ctx, client, "ProcessorNode", PROCESSOR_FIELDS, &vars, tenant, name, input).await
}

/// Update a processor node.
pub async fn update_processor_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &ProcessorNodeUpdate,
) -> Result<ProcessorNode, ProviderError> {
    update(ctx, client, "ProcessorNode", PROCESSOR_FIELDS, PROCESSOR_UPDATE_VARS, tenant, name, input)
        .await
}

/// Create a bitmap router node.
pub async fn create_bitmap_router_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &BitmapRouterNodeCreate,
) -> Result<BitmapRouterNode, ProviderError> {
    let vars = [ROUTER_CREATE_VARS, ROUTER_UPDATE_VARS];
    create(ctx, client, "BitmapRouterNode", ROUTER_FIELDS, &vars, tenant, name, input).await
}

/// Update a bitmap router node.
pub async fn update_bitmap_router_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &BitmapRouterNodeUpdate,
) -> Result<BitmapRouterNode, ProviderError> {
    update(ctx, client, "BitmapRouterNode", ROUTER_FIELDS, ROUTER_UPDATE_VARS, tenant, name, input)
        .await
}

/// Create a timer node.
pub async fn create_timer_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &TimerNodeCreate,
) -> Result<TimerNode, ProviderError> {
    let vars = [TIMER_CREATE_VARS, TIMER_UPDATE_VARS];
    create(ctx, client, "TimerNode", TIMER_FIELDS, &vars, tenant, name, input).await
}

/// Update a timer node.
pub async fn update_timer_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &TimerNodeUpdate,
) -> Result<TimerNode, ProviderError> {
    update(ctx, client, "TimerNode", TIMER_FIELDS, TIMER_UPDATE_VARS, tenant, name, input).await
}

/// Create a WebSub hub node.
pub async fn create_web_sub_hub_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &WebSubHubNodeCreate,
) -> Result<WebSubHubNode, ProviderError> {
    let vars = [HUB_CREATE_VARS, HUB_UPDATE_VARS];
    create(ctx, client, "WebSubHubNode", HUB_FIELDS, &vars, tenant, name, input).await
}

/// Update a WebSub hub node.
pub async fn update_web_sub_hub_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &WebSubHubNodeUpdate,
) -> Result<WebSubHubNode, ProviderError> {
    update(ctx, client, "WebSubHubNode", HUB_FIELDS, HUB_UPDATE_VARS, tenant, name, input).await
}

/// Create an external node.
pub async fn create_external_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &ExternalNodeCreate,
) -> Result<ExternalNode, ProviderError> {
    let vars = [EXTERNAL_CREATE_VARS, EXTERNAL_UPDATE_VARS];
    create(ctx, client, "ExternalNode", EXTERNAL_FIELDS, &vars, tenant, name, input).await
}

/// Update an external node.
pub async fn update_external_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &ExternalNodeUpdate,
) -> Result<ExternalNode, ProviderError> {
    update(ctx, client, "ExternalNode", EXTERNAL_FIELDS, EXTERNAL_UPDATE_VARS, tenant, name, input)
        .await
}

/// Create a cross-tenant sending node.
pub async fn create_cross_tenant_sending_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &CrossTenantSendingNodeCreate,
) -> Result<CrossTenantSendingNode, ProviderError> {
    let vars = [CROSS_TENANT_CREATE_VARS, PROCESSOR_UPDATE_VARS];
    create(ctx, client, "CrossTenantSendingNode", CROSS_TENANT_FIELDS, &vars, tenant, name, input)
        .await
}

/// Update a cross-tenant sending node.
pub async fn update_cross_tenant_sending_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &ProcessorNodeUpdate,
) -> Result<CrossTenantSendingNode, ProviderError> {
    update(
        ctx,
        client,
        "CrossTenantSendingNode",
        CROSS_TENANT_FIELDS,
        PROCESSOR_UPDATE_VARS,
        tenant,
        name,
        input,
    )
    .await
}

/// Delete a node, checking it is of the `expected` kind.
pub async fn delete_node(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    expected: &str,
) -> Result<(), ProviderError> {
    let document = "mutation DeleteNode($name: String!, $tenant: String!) { \
           result: GetNode(name: $name, tenant: $tenant) { __typename Delete } }";
    let deleted: Option<Deleted> = client
        .fetch(ctx, "DeleteNode", document, &json!({"name": name, "tenant": tenant}))
        .await?;
    expect_deleted("DeleteNode", name, Some(expected), deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_lists() {
        assert_eq!(
            params(TIMER_CREATE_VARS),
            "$scheduleExpression: String!, $sendMessageType: String!"
        );
        assert_eq!(
            args(TIMER_CREATE_VARS),
            "scheduleExpression: $scheduleExpression, sendMessageType: $sendMessageType"
        );
    }

    #[test]
    fn test_create_input_flattens_update() {
        let input = TimerNodeCreate {
            schedule_expression: "rate(1 minute)".to_string(),
            send_message_type: "echo.tick".to_string(),
            update: TimerNodeUpdate {
                description: Some("d".to_string()),
            },
        };
        let vars = serde_json::to_value(Keyed::new("t", "timer", &input)).unwrap();
        assert_eq!(
            vars,
            json!({
                "tenant": "t",
                "name": "timer",
                "scheduleExpression": "rate(1 minute)",
                "sendMessageType": "echo.tick",
                "description": "d"
            })
        );
    }

    #[test]
    fn test_node_fields_cover_emitters() {
        let fields = node_fields();
        for emitter in EMITTERS {
            assert!(fields.contains(emitter));
        }
    }
}
