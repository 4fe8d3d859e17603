use async_trait::async_trait;

use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::node::get_node;
use crate::graphql::types::{HasMessageTypes, Node};
use crate::resource::{DataSource, ProviderData};
use crate::schema::{Attribute, Schema};
use crate::value::ValueTree;

/// One of the emitter nodes every tenant is provisioned with.
///
/// Emitters are system-owned; they can be read and used as edge sources
/// but never managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterNodeDataSource {
    type_name: &'static str,
    typename: &'static str,
    node_name: &'static str,
}

impl EmitterNodeDataSource {
    const fn new(type_name: &'static str, typename: &'static str, node_name: &'static str) -> Self {
        Self {
            type_name,
            typename,
            node_name,
        }
    }

    /// The five tenant emitters.
    pub fn all() -> [Self; 5] {
        [
            Self::new("change_emitter_node", "ChangeEmitterNode", "Change Emitter"),
            Self::new("dead_letter_emitter_node", "DeadLetterEmitterNode", "Dead Letter Emitter"),
            Self::new("log_emitter_node", "LogEmitterNode", "Log Emitter"),
            Self::new("alert_emitter_node", "AlertEmitterNode", "Alert Emitter"),
            Self::new("audit_emitter_node", "AuditEmitterNode", "Audit Emitter"),
        ]
    }

    /// The node's fixed name in every tenant.
    pub fn node_name(&self) -> &'static str {
        self.node_name
    }
}

#[async_trait]
impl DataSource for EmitterNodeDataSource {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(format!("The tenant's {}.", self.node_name))
            .with_attribute(
                "name",
                Attribute::computed_string().with_description("The node's name, for use in edges."),
            )
            .with_attribute(
                "description",
                Attribute::computed_string().with_description("The node's description."),
            )
            .with_attribute(
                "send_message_type",
                Attribute::computed_string().with_description("The message type the node emits."),
            )
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _config: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let node = get_node(ctx, &data.client, &data.tenant, self.node_name)
            .await?
            .ok_or_else(|| {
                ProviderError::NotFound(format!("{} not found in tenant '{}'", self.node_name, data.tenant))
            })?;
        if node.kind() != self.typename {
            return Err(ProviderError::KindMismatch {
                name: self.node_name.to_string(),
                expected: self.typename.to_string(),
                actual: node.kind().to_string(),
            });
        }
        let mut state = ValueTree::new();
        state.set_known("name", self.node_name.to_string());
        state.set_optional("send_message_type", node.send_message_type().map(str::to_string));
        if let Some(description) = node_description(&node) {
            state.set_known("description", description);
        }
        Ok(state)
    }
}

fn node_description(node: &Node) -> Option<String> {
    match node {
        Node::ChangeEmitterNode(n)
        | Node::DeadLetterEmitterNode(n)
        | Node::LogEmitterNode(n)
        | Node::AlertEmitterNode(n)
        | Node::AuditEmitterNode(n) => n.description.clone(),
        _ => None,
    }
}
