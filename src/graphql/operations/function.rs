//! Bitmapper and processor function operations.

use serde::Serialize;
use serde_json::json;

use super::{expect_created, expect_deleted, expect_mutated, Deleted, Keyed, Mutated};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::types::{BitmapperFunction, Function, ProcessorFunction};
use crate::graphql::GraphqlClient;

const COMMON: &str = "name argument_message_type { name } code description in_use readme requirements system";

fn fields() -> String {
    format!(
        "__typename \
         ... on BitmapperFunction {{ {COMMON} }} \
         ... on ProcessorFunction {{ {COMMON} return_message_type {{ name }} }}"
    )
}

/// Mutable function inputs shared by both kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionInput {
    /// Source code.
    pub code: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Markdown readme.
    pub readme: Option<String>,
    /// Python requirements.
    pub requirements: Option<Vec<String>>,
}

/// Creation inputs for a bitmapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmapperFunctionCreate {
    /// Argument message type name.
    pub argument_message_type: String,
    /// Mutable fields.
    #[serde(flatten)]
    pub input: FunctionInput,
}

/// Creation inputs for a processor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorFunctionCreate {
    /// Argument message type name.
    pub argument_message_type: String,
    /// Return message type name, if the processor emits.
    pub return_message_type: Option<String>,
    /// Mutable fields.
    #[serde(flatten)]
    pub input: FunctionInput,
}

const UPDATE_PARAMS: &str =
    "$code: String, $description: String, $readme: String, $requirements: [String!]";
const UPDATE_ARGS: &str =
    "code: $code, description: $description, readme: $readme, requirements: $requirements";

/// Look up a function of any kind.
pub async fn get_function(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
) -> Result<Option<Function>, ProviderError> {
    let document = format!(
        "query GetFunction($name: String!, $tenant: String!) {{ \
           result: GetFunction(name: $name, tenant: $tenant) {{ {} }} }}",
        fields()
    );
    client
        .fetch(ctx, "GetFunction", &document, &json!({"name": name, "tenant": tenant}))
        .await
}

/// Create a bitmapper function.
pub async fn create_bitmapper_function(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &BitmapperFunctionCreate,
) -> Result<BitmapperFunction, ProviderError> {
    let document = format!(
        "mutation CreateBitmapperFunction($name: String!, $tenant: String!, \
           $argumentMessageType: String!, {UPDATE_PARAMS}) {{ \
           result: CreateBitmapperFunction(name: $name, tenant: $tenant, \
             argumentMessageType: $argumentMessageType, {UPDATE_ARGS}) {{ {COMMON} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateBitmapperFunction", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_created("CreateBitmapperFunction", created)
}

/// Create a processor function.
pub async fn create_processor_function(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &ProcessorFunctionCreate,
) -> Result<ProcessorFunction, ProviderError> {
    let document = format!(
        "mutation CreateProcessorFunction($name: String!, $tenant: String!, \
           $argumentMessageType: String!, $returnMessageType: String, {UPDATE_PARAMS}) {{ \
           result: CreateProcessorFunction(name: $name, tenant: $tenant, \
             argumentMessageType: $argumentMessageType, returnMessageType: $returnMessageType, \
             {UPDATE_ARGS}) {{ {COMMON} return_message_type {{ name }} }} }}"
    );
    let created = client
        .fetch(ctx, "CreateProcessorFunction", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_created("CreateProcessorFunction", created)
}

/// Update a bitmapper function.
pub async fn update_bitmapper_function(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &FunctionInput,
) -> Result<BitmapperFunction, ProviderError> {
    let document = format!(
        "mutation UpdateBitmapperFunction($name: String!, $tenant: String!, {UPDATE_PARAMS}) {{ \
           result: GetFunction(name: $name, tenant: $tenant) {{ __typename \
             ... on BitmapperFunction {{ Update({UPDATE_ARGS}) {{ {COMMON} }} }} }} }}"
    );
    let mutated: Option<Mutated<BitmapperFunction>> = client
        .fetch(ctx, "UpdateBitmapperFunction", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_mutated("UpdateBitmapperFunction", name, Some("BitmapperFunction"), mutated)
}

/// Update a processor function.
pub async fn update_processor_function(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    input: &FunctionInput,
) -> Result<ProcessorFunction, ProviderError> {
    let document = format!(
        "mutation UpdateProcessorFunction($name: String!, $tenant: String!, {UPDATE_PARAMS}) {{ \
           result: GetFunction(name: $name, tenant: $tenant) {{ __typename \
             ... on ProcessorFunction {{ Update({UPDATE_ARGS}) {{ {COMMON} return_message_type {{ name }} }} }} }} }}"
    );
    let mutated: Option<Mutated<ProcessorFunction>> = client
        .fetch(ctx, "UpdateProcessorFunction", &document, &Keyed::new(tenant, name, input))
        .await?;
    expect_mutated("UpdateProcessorFunction", name, Some("ProcessorFunction"), mutated)
}

/// Delete a function, checking it is of the `expected` kind.
pub async fn delete_function(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    name: &str,
    expected: &str,
) -> Result<(), ProviderError> {
    let document = "mutation DeleteFunction($name: String!, $tenant: String!) { \
           result: GetFunction(name: $name, tenant: $tenant) { __typename Delete } }";
    let deleted: Option<Deleted> = client
        .fetch(ctx, "DeleteFunction", document, &json!({"name": name, "tenant": tenant}))
        .await?;
    expect_deleted("DeleteFunction", name, Some(expected), deleted)
}
