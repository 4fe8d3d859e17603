//! Edge operations. Edges are keyed by their source and target nodes.

use serde::Serialize;

use super::{expect_created, expect_deleted, expect_mutated, Deleted, Mutated};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::types::Edge;
use crate::graphql::GraphqlClient;

const FIELDS: &str = "source { name } target { name } description kms_key { name } \
                      max_receive_count message_type { name } queue";

#[derive(Serialize)]
struct EdgeVars<'a, I: Serialize> {
    tenant: &'a str,
    source: &'a str,
    target: &'a str,
    #[serde(flatten)]
    input: &'a I,
}

#[derive(Serialize)]
struct NoInput {}

/// Edge creation inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCreate {
    /// Description.
    pub description: Option<String>,
    /// KMS key encrypting the queue.
    pub kms_key: Option<String>,
    /// Receives before dead-lettering.
    pub max_receive_count: Option<i64>,
}

/// Mutable edge fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EdgeUpdate {
    /// Description.
    pub description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveInput<'a> {
    new_source: &'a str,
    new_target: &'a str,
}

/// The display key of an edge.
pub fn edge_key(source: &str, target: &str) -> String {
    format!("{}|{}", source, target)
}

/// Look up the edge from `source` to `target`.
pub async fn get_edge(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    source: &str,
    target: &str,
) -> Result<Option<Edge>, ProviderError> {
    let document = format!(
        "query GetEdge($source: String!, $target: String!, $tenant: String!) {{ \
           result: GetEdge(source: $source, target: $target, tenant: $tenant) {{ {FIELDS} }} }}"
    );
    let vars = EdgeVars {
        tenant,
        source,
        target,
        input: &NoInput {},
    };
    client.fetch(ctx, "GetEdge", &document, &vars).await
}

/// Create an edge.
pub async fn create_edge(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    source: &str,
    target: &str,
    input: &EdgeCreate,
) -> Result<Edge, ProviderError> {
    let document = format!(
        "mutation CreateEdge($source: String!, $target: String!, $tenant: String!, \
           $description: String, $kmsKey: String, $maxReceiveCount: Int) {{ \
           result: CreateEdge(source: $source, target: $target, tenant: $tenant, \
             description: $description, kmsKey: $kmsKey, maxReceiveCount: $maxReceiveCount) \
             {{ {FIELDS} }} }}"
    );
    let vars = EdgeVars {
        tenant,
        source,
        target,
        input,
    };
    let created = client.fetch(ctx, "CreateEdge", &document, &vars).await?;
    expect_created("CreateEdge", created)
}

/// Move an edge to new endpoints, keeping its queue settings.
pub async fn move_edge(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    source: &str,
    target: &str,
    new_source: &str,
    new_target: &str,
) -> Result<Edge, ProviderError> {
    let document = format!(
        "mutation MoveEdge($source: String!, $target: String!, $tenant: String!, \
           $newSource: String, $newTarget: String) {{ \
           result: GetEdge(source: $source, target: $target, tenant: $tenant) {{ \
             Move(source: $newSource, target: $newTarget) {{ {FIELDS} }} }} }}"
    );
    let vars = EdgeVars {
        tenant,
        source,
        target,
        input: &MoveInput {
            new_source,
            new_target,
        },
    };
    let mutated: Option<Mutated<Edge>> = client.fetch(ctx, "MoveEdge", &document, &vars).await?;
    expect_mutated("MoveEdge", &edge_key(source, target), None, mutated)
}

/// Update an edge's mutable fields.
pub async fn update_edge(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    source: &str,
    target: &str,
    input: &EdgeUpdate,
) -> Result<Edge, ProviderError> {
    let document = format!(
        "mutation UpdateEdge($source: String!, $target: String!, $tenant: String!, \
           $description: String) {{ \
           result: GetEdge(source: $source, target: $target, tenant: $tenant) {{ \
             Update(description: $description) {{ {FIELDS} }} }} }}"
    );
    let vars = EdgeVars {
        tenant,
        source,
        target,
        input,
    };
    let mutated: Option<Mutated<Edge>> = client.fetch(ctx, "UpdateEdge", &document, &vars).await?;
    expect_mutated("UpdateEdge", &edge_key(source, target), None, mutated)
}

/// Delete an edge.
pub async fn delete_edge(
    ctx: &Context,
    client: &GraphqlClient,
    tenant: &str,
    source: &str,
    target: &str,
) -> Result<(), ProviderError> {
    let document = "mutation DeleteEdge($source: String!, $target: String!, $tenant: String!) { \
           result: GetEdge(source: $source, target: $target, tenant: $tenant) { Delete } }";
    let vars = EdgeVars {
        tenant,
        source,
        target,
        input: &NoInput {},
    };
    let deleted: Option<Deleted> = client.fetch(ctx, "DeleteEdge", document, &vars).await?;
    expect_deleted("DeleteEdge", &edge_key(source, target), None, deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_move_variables() {
        let vars = EdgeVars {
            tenant: "t",
            source: "a",
            target: "b",
            input: &MoveInput {
                new_source: "a2",
                new_target: "b",
            },
        };
        assert_eq!(
            serde_json::to_value(vars).unwrap(),
            json!({"tenant": "t", "source": "a", "target": "b", "newSource": "a2", "newTarget": "b"})
        );
    }

    #[test]
    fn test_edge_key() {
        assert_eq!(edge_key("src", "tgt"), "src|tgt");
    }
}
