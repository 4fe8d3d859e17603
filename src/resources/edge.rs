//! Edges between nodes.
//!
//! An edge is keyed by its `source` and `target` node names. Changing either
//! end moves the edge in place when the message type it carries is
//! unchanged; a move that changes the carried type replaces it, and a move
//! onto nodes that cannot exchange a common type is refused at plan time.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{description, reference, NODE_QUIESCENCE};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::edge::{self, edge_key, EdgeCreate, EdgeUpdate};
use crate::graphql::operations::node::get_node;
use crate::graphql::types::{Edge, HasMessageTypes};
use crate::plan::PlanRequest;
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::value::{Dynamic, ValueTree};

/// A queue carrying messages from one node to another.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeResource;

fn ends(tree: &ValueTree) -> Result<(String, String), ProviderError> {
    Ok((tree.required("source")?, tree.required("target")?))
}

fn state_of(e: Edge) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("source", e.source.name);
    state.set_known("target", e.target.name);
    state.set_optional("description", e.description);
    state.set_optional("kms_key", e.kms_key.map(|k| k.name));
    state.set_optional("max_receive_count", e.max_receive_count);
    state.set_known("message_type", e.message_type.name);
    state.set_optional("queue", e.queue);
    state
}

/// The message type flowing from `source` to `target`, if both nodes exist.
async fn carried_type(
    ctx: &Context,
    data: &ProviderData,
    source: &str,
    target: &str,
) -> Result<Option<String>, ProviderError> {
    let Some(from) = get_node(ctx, &data.client, &data.tenant, source).await? else {
        debug!(node = source, "Source node not found yet, deferring type check");
        return Ok(None);
    };
    let Some(to) = get_node(ctx, &data.client, &data.tenant, target).await? else {
        debug!(node = target, "Target node not found yet, deferring type check");
        return Ok(None);
    };

    let sends = from.send_message_type();
    let receives = to.receive_message_type();
    match (sends, receives) {
        (Some(sends), Some(receives)) if sends == receives => Ok(Some(sends.to_string())),
        _ => Err(ProviderError::TypeMismatch(format!(
            "node '{}' sends {} but node '{}' receives {}",
            source,
            sends.unwrap_or("nothing"),
            target,
            receives.unwrap_or("nothing")
        ))),
    }
}

#[async_trait]
impl Resource for EdgeResource {
    fn type_name(&self) -> &'static str {
        "edge"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An edge carrying messages from a source node to a target node.")
            .with_attribute("source", reference("The node messages come from."))
            .with_attribute("target", reference("The node messages go to."))
            .with_attribute("description", description())
            .with_attribute(
                "kms_key",
                Attribute::optional_string()
                    .requires_replace()
                    .with_description("The KMS key encrypting the edge's queue. Defaults to the tenant key."),
            )
            .with_attribute(
                "max_receive_count",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                    .requires_replace()
                    .use_state_for_unknown()
                    .with_description("Receives before a message is dead-lettered. 0 retries forever."),
            )
            .with_attribute(
                "message_type",
                Attribute::computed_string().with_description("The message type the edge carries."),
            )
            .with_attribute(
                "queue",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The URL of the edge's queue."),
            )
    }

    fn post_delete_delay(&self) -> Duration {
        NODE_QUIESCENCE
    }

    fn display_key(&self, state: &ValueTree) -> String {
        match (state.raw("source").as_str(), state.raw("target").as_str()) {
            (Some(source), Some(target)) => edge_key(source, target),
            _ => "<unnamed>".to_string(),
        }
    }

    fn import_state(&self, id: &str) -> Result<ValueTree, ProviderError> {
        let invalid = |reason: &str| ProviderError::ImportIdInvalid {
            id: id.to_string(),
            reason: reason.to_string(),
        };
        let (source, target) = id
            .split_once('|')
            .ok_or_else(|| invalid("expected <source>|<target>"))?;
        if source.is_empty() || target.is_empty() || target.contains('|') {
            return Err(invalid("expected <source>|<target> with two non-empty node names"));
        }
        let mut state = ValueTree::new();
        state.set_known("source", source.to_string());
        state.set_known("target", target.to_string());
        Ok(state)
    }

    async fn modify_plan(
        &self,
        ctx: &Context,
        data: &ProviderData,
        req: &mut PlanRequest,
    ) -> Result<(), ProviderError> {
        if req.is_destroy() {
            return Ok(());
        }
        let moved = req.changed("source") || req.changed("target");
        if !req.is_create() && !moved {
            return Ok(());
        }
        let Some(plan) = req.plan.as_ref() else {
            return Ok(());
        };
        let (Some(source), Some(target)) = (plan.raw("source").as_str(), plan.raw("target").as_str()) else {
            return Ok(());
        };
        let (source, target) = (source.to_string(), target.to_string());

        let carried = carried_type(ctx, data, &source, &target).await?;
        let prior_type = req
            .state
            .as_ref()
            .and_then(|s| s.raw("message_type").as_str().map(str::to_string));

        if let (Some(carried), Some(prior_type)) = (&carried, &prior_type) {
            if carried != prior_type {
                warn!(edge = %edge_key(&source, &target), from = %prior_type, to = %carried, "Move changes the carried message type");
                req.require_replace("message_type");
            }
        }

        if let Some(plan) = req.plan.as_mut() {
            match carried {
                Some(carried) => plan.set_known("message_type", carried),
                None => plan.insert_raw("message_type", Dynamic::Unknown),
            }
            if moved {
                plan.insert_raw("queue", Dynamic::Unknown);
            }
        }
        Ok(())
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let (source, target) = ends(plan)?;
        let input = EdgeCreate {
            description: plan.optional("description")?,
            kms_key: plan.optional("kms_key")?,
            max_receive_count: plan.optional("max_receive_count")?,
        };
        let created = edge::create_edge(ctx, &data.client, &data.tenant, &source, &target, &input).await?;
        Ok(state_of(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let (source, target) = ends(state)?;
        let found = edge::get_edge(ctx, &data.client, &data.tenant, &source, &target).await?;
        Ok(found.map(state_of))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let (old_source, old_target) = ends(prior)?;
        let (source, target) = ends(plan)?;
        let input = EdgeUpdate {
            description: plan.optional("description")?,
        };

        if (&old_source, &old_target) == (&source, &target) {
            let updated = edge::update_edge(ctx, &data.client, &data.tenant, &source, &target, &input).await?;
            return Ok(state_of(updated));
        }

        let moved = edge::move_edge(
            ctx,
            &data.client,
            &data.tenant,
            &old_source,
            &old_target,
            &source,
            &target,
        )
        .await?;
        debug!(from = %edge_key(&old_source, &old_target), to = %edge_key(&source, &target), "Moved edge");

        match edge::update_edge(ctx, &data.client, &data.tenant, &source, &target, &input).await {
            Ok(updated) => Ok(state_of(updated)),
            Err(e) => Err(ProviderError::PartiallyApplied {
                message: format!(
                    "edge moved from '{}' to '{}' but its update failed: {}",
                    edge_key(&old_source, &old_target),
                    edge_key(&source, &target),
                    e
                ),
                state: Box::new(state_of(moved).into_dynamic()),
            }),
        }
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        let (source, target) = ends(state)?;
        edge::delete_edge(ctx, &data.client, &data.tenant, &source, &target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EchoStreamProvider;
    use crate::testing::{
        assert_plan_no_changes, assert_plan_replaces, assert_plan_updates_in_place, FakeBackends, ProviderTester,
    };
    use serde_json::{json, Value};

    const KIND: &str = "echostream_edge";

    async fn configured() -> (FakeBackends, ProviderTester<EchoStreamProvider>) {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        tester.configure(backends.provider_config()).await.unwrap();
        (backends, tester)
    }

    fn processor(name: &str, receives: &str, sends: &str) -> Value {
        json!({
            "__typename": "ProcessorNode",
            "name": name,
            "inline_processor": "def processor(*, message, **kwargs): return message",
            "receive_message_type": {"name": receives},
            "send_message_type": {"name": sends},
            "sequential_processing": false,
        })
    }

    /// Route `GetNode` by the requested name.
    fn serve_nodes(backends: &FakeBackends, nodes: Vec<Value>) {
        backends.graphql.on("GetNode", move |vars| {
            let found = nodes
                .iter()
                .find(|n| n["name"] == vars["name"])
                .cloned()
                .unwrap_or(Value::Null);
            Ok(json!({"data": {"result": found}}))
        });
    }

    fn remote_edge(source: &str, target: &str, message_type: &str, description: Option<&str>) -> Value {
        json!({
            "source": {"name": source},
            "target": {"name": target},
            "description": description,
            "kms_key": null,
            "max_receive_count": 0,
            "message_type": {"name": message_type},
            "queue": format!("https://sqs/{}-{}", source, target),
        })
    }

    fn state(source: &str, target: &str, message_type: &str) -> ValueTree {
        state_of(serde_json::from_value(remote_edge(source, target, message_type, None)).unwrap())
    }

    #[tokio::test]
    async fn test_move_onto_incompatible_source_is_type_mismatch() {
        let (backends, tester) = configured().await;
        serve_nodes(
            &backends,
            vec![
                processor("A", "T", "T"),
                processor("A2", "T", "T2"),
                processor("B", "T", "T"),
            ],
        );

        let err = tester
            .plan_update(KIND, state("A", "B", "T"), json!({"source": "A2", "target": "B"}))
            .await
            .unwrap_err();
        match err {
            ProviderError::TypeMismatch(message) => {
                for needle in ["A2", "B", "T2", "receives T"] {
                    assert!(message.contains(needle), "{} missing from {}", needle, message);
                }
            },
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
        assert_eq!(backends.graphql.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_replan_after_create_has_no_changes() {
        let (backends, tester) = configured().await;
        serve_nodes(&backends, vec![processor("A", "T", "T"), processor("B", "T", "T")]);
        backends.graphql.returns("CreateEdge", remote_edge("A", "B", "T", None));
        backends.graphql.returns("GetEdge", remote_edge("A", "B", "T", None));
        let config = json!({"source": "A", "target": "B", "description": ""});

        let state = tester.lifecycle_create(KIND, config.clone()).await.unwrap();
        assert_eq!(state.raw("message_type").as_str(), Some("T"));
        assert_eq!(state.raw("description").as_str(), Some(""));

        let plan = tester.plan_update(KIND, state, config).await.unwrap();
        assert_plan_no_changes(&plan);
        assert_eq!(backends.graphql.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_compatible_move_is_in_place() {
        let (backends, tester) = configured().await;
        serve_nodes(
            &backends,
            vec![processor("A", "T", "T"), processor("A2", "X", "T"), processor("B", "T", "T")],
        );

        let plan = tester
            .plan_update(KIND, state("A", "B", "T"), json!({"source": "A2", "target": "B"}))
            .await
            .unwrap();
        assert_plan_updates_in_place(&plan);
        let planned = plan.planned_state.unwrap();
        assert_eq!(planned.raw("message_type").as_str(), Some("T"));
        assert!(planned.raw("queue").is_unknown());
    }

    #[tokio::test]
    async fn test_move_changing_carried_type_replaces() {
        let (backends, tester) = configured().await;
        serve_nodes(
            &backends,
            vec![processor("A", "T", "T"), processor("A2", "X", "U"), processor("B2", "U", "U")],
        );

        let plan = tester
            .plan_update(KIND, state("A", "B", "T"), json!({"source": "A2", "target": "B2"}))
            .await
            .unwrap();
        assert_plan_replaces(&plan, "message_type");
    }

    #[tokio::test]
    async fn test_create_with_missing_node_defers_type() {
        let (backends, tester) = configured().await;
        serve_nodes(&backends, vec![processor("A", "T", "T")]);

        let plan = tester
            .plan_create(KIND, json!({"source": "A", "target": "not-yet"}))
            .await
            .unwrap();
        assert!(plan.planned_state.unwrap().raw("message_type").is_unknown());
    }

    #[tokio::test]
    async fn test_import_composite_identifier() {
        let (_backends, tester) = configured().await;
        let imported = tester.import_resource(KIND, "srcNode|tgtNode").await.unwrap();
        assert_eq!(imported.len(), 1);
        let state = &imported[0].state;
        assert_eq!(state.raw("source").as_str(), Some("srcNode"));
        assert_eq!(state.raw("target").as_str(), Some("tgtNode"));
        assert!(state.raw("message_type").is_null());

        for bad in ["malformed", "|tgt", "src|", "a|b|c"] {
            let err = tester.import_resource(KIND, bad).await.unwrap_err();
            assert!(
                matches!(err, ProviderError::ImportIdInvalid { ref id, .. } if id == bad),
                "{} accepted",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_move_then_update() {
        let (backends, tester) = configured().await;
        backends
            .graphql
            .returns("MoveEdge", json!({"Move": remote_edge("A2", "B", "T", None)}));
        backends
            .graphql
            .returns("UpdateEdge", json!({"Update": remote_edge("A2", "B", "T", Some("moved"))}));

        let planned = ValueTree::from_json(json!({
            "source": "A2", "target": "B", "description": "moved",
            "kms_key": null, "max_receive_count": 0, "message_type": "T", "queue": null,
        }))
        .unwrap();
        let updated = tester.update(KIND, state("A", "B", "T"), planned).await.unwrap();
        assert_eq!(updated.raw("source").as_str(), Some("A2"));
        assert_eq!(updated.raw("description").as_str(), Some("moved"));

        let moved = backends.graphql.last_call("MoveEdge").unwrap();
        assert_eq!(moved.variables["source"], json!("A"));
        assert_eq!(moved.variables["newSource"], json!("A2"));
        assert_eq!(backends.graphql.last_call("UpdateEdge").unwrap().variables["source"], json!("A2"));
    }

    #[tokio::test]
    async fn test_failed_update_after_move_is_partially_applied() {
        let (backends, tester) = configured().await;
        backends
            .graphql
            .returns("MoveEdge", json!({"Move": remote_edge("A2", "B", "T", None)}));
        backends.graphql.rejects("UpdateEdge", "description too long");

        let planned = ValueTree::from_json(json!({
            "source": "A2", "target": "B", "description": "x", "message_type": "T",
        }))
        .unwrap();
        let err = tester.update(KIND, state("A", "B", "T"), planned).await.unwrap_err();
        match err {
            ProviderError::PartiallyApplied { message, state } => {
                assert!(message.contains("A|B"));
                assert!(message.contains("description too long"));
                let state = ValueTree::from_dynamic(*state).unwrap();
                assert_eq!(state.raw("source").as_str(), Some("A2"));
            },
            other => panic!("expected PartiallyApplied, got {:?}", other),
        }
    }

    #[test]
    fn test_display_key() {
        assert_eq!(EdgeResource.display_key(&state("a", "b", "T")), "a|b");
    }
}
