//! Managed node kinds.
//!
//! Every kind reads through the polymorphic `GetNode` lookup and refuses a
//! node of any other concrete kind. System emitter nodes are never managed
//! here; they are exposed as data sources.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    at_least, config, description, json_in, json_out, logging_level, name_attribute, name_of,
    optional_reference, ref_name, reference, requirements, requirements_in, requirements_out,
    NODE_QUIESCENCE,
};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::kind_error;
use crate::graphql::operations::node::{
    self, BitmapRouterNodeCreate, BitmapRouterNodeUpdate, CrossTenantSendingNodeCreate,
    ExternalNodeCreate, ExternalNodeUpdate, ProcessorNodeCreate, ProcessorNodeUpdate,
    TimerNodeCreate, TimerNodeUpdate, WebSubHubNodeCreate, WebSubHubNodeUpdate,
};
use crate::graphql::types::{
    BitmapRouterNode, CrossTenantSendingNode, ExternalNode, Node, ProcessorNode, TimerNode,
    WebSubHubNode,
};
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::validation::{ConfigValidator, ExactlyOneOf, MutuallyExclusive, OneOf, OrderedInt64};
use crate::value::ValueTree;

/// A node running a processor function on every message it receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorNodeResource;

/// A node routing messages to edges by bitmap.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmapRouterNodeResource;

/// A node emitting a message on a schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerNodeResource;

/// A node exposing messages to WebSub subscribers.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSubHubNodeResource;

/// A node standing for code running outside the tenant, inside an external app.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalNodeResource;

/// A processor node forwarding its output to another tenant.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossTenantSendingNodeResource;

/// Look up `state`'s node, requiring the concrete kind `expected`.
async fn lookup<T>(
    ctx: &Context,
    data: &ProviderData,
    state: &ValueTree,
    expected: &str,
    pick: fn(Node) -> Option<T>,
) -> Result<Option<T>, ProviderError> {
    let name = name_of(state)?;
    let Some(found) = node::get_node(ctx, &data.client, &data.tenant, &name).await? else {
        return Ok(None);
    };
    let actual = found.kind();
    pick(found)
        .map(Some)
        .ok_or_else(|| kind_error(&name, expected, actual))
}

async fn delete(ctx: &Context, data: &ProviderData, state: &ValueTree, expected: &str) -> Result<(), ProviderError> {
    node::delete_node(ctx, &data.client, &data.tenant, &name_of(state)?, expected).await
}

fn sequential_processing() -> Attribute {
    Attribute::new(AttributeType::Bool, AttributeFlags::optional_computed())
        .requires_replace()
        .use_state_for_unknown()
        .with_description("Process messages one at a time, in order. Defaults to false.")
}

fn receive_message_type() -> Attribute {
    reference("The message type the node receives.").requires_replace()
}

fn send_message_type() -> Attribute {
    optional_reference("The message type the node sends.").requires_replace()
}

fn processor_schema(what: &str) -> Schema {
    Schema::v0()
        .with_attribute("name", name_attribute(what))
        .with_attribute("config", config())
        .with_attribute("description", description())
        .with_attribute(
            "inline_processor",
            Attribute::optional_string().with_description("Python processor code run by the node."),
        )
        .with_attribute("logging_level", logging_level())
        .with_attribute(
            "managed_processor",
            optional_reference("A processor function run by the node."),
        )
        .with_attribute("receive_message_type", receive_message_type())
        .with_attribute("requirements", requirements())
        .with_attribute("send_message_type", send_message_type())
        .with_attribute("sequential_processing", sequential_processing())
}

fn processor_update(plan: &ValueTree) -> Result<ProcessorNodeUpdate, ProviderError> {
    Ok(ProcessorNodeUpdate {
        config: json_in(plan, "config")?,
        description: plan.optional("description")?,
        inline_processor: plan.optional("inline_processor")?,
        logging_level: plan.optional("logging_level")?,
        managed_processor: plan.optional("managed_processor")?,
        requirements: requirements_in(plan)?,
    })
}

// =============================================================================
// Processor node
// =============================================================================

fn processor_state(n: ProcessorNode) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", n.name);
    json_out(&mut state, "config", n.config);
    state.set_optional("description", n.description);
    state.set_optional("inline_processor", n.inline_processor);
    state.set_optional("logging_level", n.logging_level);
    state.set_optional("managed_processor", ref_name(n.managed_processor));
    state.set_known("receive_message_type", n.receive_message_type.name);
    requirements_out(&mut state, n.requirements);
    state.set_optional("send_message_type", ref_name(n.send_message_type));
    state.set_known("sequential_processing", n.sequential_processing);
    state
}

#[async_trait]
impl Resource for ProcessorNodeResource {
    fn type_name(&self) -> &'static str {
        "processor_node"
    }

    fn schema(&self) -> Schema {
        processor_schema("processor node").with_description("A node running a processor on each message.")
    }

    fn config_validators(&self) -> Vec<Box<dyn ConfigValidator>> {
        vec![Box::new(ExactlyOneOf::new(["inline_processor", "managed_processor"]))]
    }

    fn post_delete_delay(&self) -> Duration {
        NODE_QUIESCENCE
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = ProcessorNodeCreate {
            receive_message_type: plan.required("receive_message_type")?,
            send_message_type: plan.optional("send_message_type")?,
            sequential_processing: plan.optional("sequential_processing")?,
            update: processor_update(plan)?,
        };
        let created = node::create_processor_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(processor_state(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "ProcessorNode", |n| match n {
            Node::ProcessorNode(n) => Some(n),
            _ => None,
        })
        .await?;
        Ok(found.map(processor_state))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let updated =
            node::update_processor_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &processor_update(plan)?)
                .await?;
        Ok(processor_state(updated))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        delete(ctx, data, state, "ProcessorNode").await
    }
}

// =============================================================================
// Bitmap router node
// =============================================================================

type RouteTable = BTreeMap<String, BTreeSet<String>>;

/// The route table as the service's JSON text. Empty means unset.
fn route_table_in(plan: &ValueTree) -> Result<Option<String>, ProviderError> {
    match plan.optional::<RouteTable>("route_table")? {
        Some(table) if !table.is_empty() => Ok(Some(serde_json::to_string(&table)?)),
        _ => Ok(None),
    }
}

fn route_table_out(raw: Option<String>) -> Result<Option<RouteTable>, ProviderError> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let table: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw)?;
    let table: RouteTable = table
        .into_iter()
        .map(|(bitmap, edges)| (bitmap, edges.into_iter().collect()))
        .collect();
    Ok(Some(table).filter(|t| !t.is_empty()))
}

fn router_update(plan: &ValueTree) -> Result<BitmapRouterNodeUpdate, ProviderError> {
    Ok(BitmapRouterNodeUpdate {
        config: json_in(plan, "config")?,
        description: plan.optional("description")?,
        inline_bitmapper: plan.optional("inline_bitmapper")?,
        logging_level: plan.optional("logging_level")?,
        managed_bitmapper: plan.optional("managed_bitmapper")?,
        requirements: requirements_in(plan)?,
        route_table: route_table_in(plan)?,
    })
}

fn router_state(n: BitmapRouterNode) -> Result<ValueTree, ProviderError> {
    let mut state = ValueTree::new();
    state.set_known("name", n.name);
    json_out(&mut state, "config", n.config);
    state.set_optional("description", n.description);
    state.set_optional("inline_bitmapper", n.inline_bitmapper);
    state.set_optional("logging_level", n.logging_level);
    state.set_optional("managed_bitmapper", ref_name(n.managed_bitmapper));
    state.set_known("receive_message_type", n.receive_message_type.name);
    requirements_out(&mut state, n.requirements);
    state.set_optional("route_table", route_table_out(n.route_table)?);
    Ok(state)
}

#[async_trait]
impl Resource for BitmapRouterNodeResource {
    fn type_name(&self) -> &'static str {
        "bitmap_router_node"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A node routing each message to the edges its bitmap selects.")
            .with_attribute("name", name_attribute("bitmap router node"))
            .with_attribute("config", config())
            .with_attribute("description", description())
            .with_attribute(
                "inline_bitmapper",
                Attribute::optional_string().with_description("Python bitmapper code run by the node."),
            )
            .with_attribute("logging_level", logging_level())
            .with_attribute(
                "managed_bitmapper",
                optional_reference("A bitmapper function run by the node."),
            )
            .with_attribute("receive_message_type", receive_message_type())
            .with_attribute("requirements", requirements())
            .with_attribute(
                "route_table",
                Attribute::new(
                    AttributeType::map(AttributeType::set(AttributeType::String)),
                    AttributeFlags::optional(),
                )
                .with_description("Maps hex bitmaps to the names of the target nodes to route to."),
            )
    }

    fn config_validators(&self) -> Vec<Box<dyn ConfigValidator>> {
        vec![Box::new(MutuallyExclusive::new(["inline_bitmapper", "managed_bitmapper"]))]
    }

    fn post_delete_delay(&self) -> Duration {
        NODE_QUIESCENCE
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = BitmapRouterNodeCreate {
            receive_message_type: plan.required("receive_message_type")?,
            update: router_update(plan)?,
        };
        let created =
            node::create_bitmap_router_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        router_state(created)
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "BitmapRouterNode", |n| match n {
            Node::BitmapRouterNode(n) => Some(n),
            _ => None,
        })
        .await?;
        found.map(router_state).transpose()
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let updated =
            node::update_bitmap_router_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &router_update(plan)?)
                .await?;
        router_state(updated)
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        delete(ctx, data, state, "BitmapRouterNode").await
    }
}

// =============================================================================
// Timer node
// =============================================================================

fn timer_state(n: TimerNode) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", n.name);
    state.set_optional("description", n.description);
    state.set_known("schedule_expression", n.schedule_expression);
    state.set_known("send_message_type", n.send_message_type.name);
    state
}

#[async_trait]
impl Resource for TimerNodeResource {
    fn type_name(&self) -> &'static str {
        "timer_node"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A node sending a message on a schedule.")
            .with_attribute("name", name_attribute("timer node"))
            .with_attribute("description", description())
            .with_attribute(
                "schedule_expression",
                Attribute::required_string()
                    .requires_replace()
                    .with_description("A cron expression for when the timer fires."),
            )
            .with_attribute(
                "send_message_type",
                reference("The message type the timer sends.").requires_replace(),
            )
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = TimerNodeCreate {
            schedule_expression: plan.required("schedule_expression")?,
            send_message_type: plan.required("send_message_type")?,
            update: TimerNodeUpdate {
                description: plan.optional("description")?,
            },
        };
        let created = node::create_timer_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(timer_state(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "TimerNode", |n| match n {
            Node::TimerNode(n) => Some(n),
            _ => None,
        })
        .await?;
        Ok(found.map(timer_state))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = TimerNodeUpdate {
            description: plan.optional("description")?,
        };
        let updated = node::update_timer_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(timer_state(updated))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        delete(ctx, data, state, "TimerNode").await
    }
}

// =============================================================================
// WebSub hub node
// =============================================================================

fn hub_update(plan: &ValueTree) -> Result<WebSubHubNodeUpdate, ProviderError> {
    Ok(WebSubHubNodeUpdate {
        config: json_in(plan, "config")?,
        default_lease_seconds: plan.optional("default_lease_seconds")?,
        delivery_retries: plan.optional("delivery_retries")?,
        description: plan.optional("description")?,
        inline_authenticator: plan.optional("inline_authenticator")?,
        logging_level: plan.optional("logging_level")?,
        managed_authenticator: plan.optional("managed_authenticator")?,
        max_lease_seconds: plan.optional("max_lease_seconds")?,
        requirements: requirements_in(plan)?,
        signature_algorithm: plan.optional("signature_algorithm")?,
        subscription_security: plan.optional("subscription_security")?,
    })
}

fn hub_state(n: WebSubHubNode) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", n.name);
    json_out(&mut state, "config", n.config);
    state.set_optional("default_lease_seconds", n.default_lease_seconds);
    state.set_optional("delivery_retries", n.delivery_retries);
    state.set_optional("description", n.description);
    state.set_optional("endpoint", n.endpoint);
    state.set_optional("inline_authenticator", n.inline_authenticator);
    state.set_optional("logging_level", n.logging_level);
    state.set_optional("managed_authenticator", ref_name(n.managed_authenticator));
    state.set_optional("max_lease_seconds", n.max_lease_seconds);
    state.set_known("receive_message_type", n.receive_message_type.name);
    requirements_out(&mut state, n.requirements);
    state.set_optional("signature_algorithm", n.signature_algorithm);
    state.set_optional("subscription_security", n.subscription_security);
    state
}

#[async_trait]
impl Resource for WebSubHubNodeResource {
    fn type_name(&self) -> &'static str {
        "web_sub_hub_node"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A WebSub hub delivering received messages to subscribers.")
            .with_attribute("name", name_attribute("WebSub hub node"))
            .with_attribute("config", config())
            .with_attribute(
                "default_lease_seconds",
                at_least(
                    1,
                    AttributeFlags::optional_computed(),
                    "Lease granted to subscribers that do not request one.",
                ),
            )
            .with_attribute(
                "delivery_retries",
                at_least(0, AttributeFlags::optional_computed(), "Delivery attempts per message."),
            )
            .with_attribute("description", description())
            .with_attribute(
                "endpoint",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The hub URL subscribers register with."),
            )
            .with_attribute(
                "inline_authenticator",
                Attribute::optional_string().with_description("Python code authenticating subscribers."),
            )
            .with_attribute("logging_level", logging_level())
            .with_attribute(
                "managed_authenticator",
                optional_reference("A function authenticating subscribers."),
            )
            .with_attribute(
                "max_lease_seconds",
                at_least(1, AttributeFlags::optional_computed(), "Longest lease a subscriber may hold."),
            )
            .with_attribute("receive_message_type", receive_message_type())
            .with_attribute("requirements", requirements())
            .with_attribute(
                "signature_algorithm",
                Attribute::new(AttributeType::String, AttributeFlags::optional_computed())
                    .use_state_for_unknown()
                    .with_description("HMAC algorithm used to sign deliveries.")
                    .with_validator(std::sync::Arc::new(OneOf::new(["sha1", "sha256", "sha384", "sha512"]))),
            )
            .with_attribute(
                "subscription_security",
                Attribute::optional_string()
                    .with_description("Security required of subscription callbacks.")
                    .with_validator(std::sync::Arc::new(OneOf::new(["https", "https_and_secret"]))),
            )
    }

    fn config_validators(&self) -> Vec<Box<dyn ConfigValidator>> {
        vec![
            Box::new(MutuallyExclusive::new(["inline_authenticator", "managed_authenticator"])),
            Box::new(OrderedInt64::new("default_lease_seconds", "max_lease_seconds")),
        ]
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = WebSubHubNodeCreate {
            receive_message_type: plan.required("receive_message_type")?,
            update: hub_update(plan)?,
        };
        let created =
            node::create_web_sub_hub_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(hub_state(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "WebSubHubNode", |n| match n {
            Node::WebSubHubNode(n) => Some(n),
            _ => None,
        })
        .await?;
        Ok(found.map(hub_state))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let updated =
            node::update_web_sub_hub_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &hub_update(plan)?)
                .await?;
        Ok(hub_state(updated))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        delete(ctx, data, state, "WebSubHubNode").await
    }
}

// =============================================================================
// External node
// =============================================================================

fn external_state(n: ExternalNode) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", n.name);
    state.set_known("app", n.app.name);
    json_out(&mut state, "config", n.config);
    state.set_optional("description", n.description);
    state.set_optional("receive_message_type", ref_name(n.receive_message_type));
    state.set_optional("send_message_type", ref_name(n.send_message_type));
    state
}

fn external_update(plan: &ValueTree) -> Result<ExternalNodeUpdate, ProviderError> {
    Ok(ExternalNodeUpdate {
        config: json_in(plan, "config")?,
        description: plan.optional("description")?,
    })
}

#[async_trait]
impl Resource for ExternalNodeResource {
    fn type_name(&self) -> &'static str {
        "external_node"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A node whose code runs outside the tenant, in an external app.")
            .with_attribute("name", name_attribute("external node"))
            .with_attribute(
                "app",
                reference("The external or cross-tenant app the node belongs to.").requires_replace(),
            )
            .with_attribute("config", config())
            .with_attribute("description", description())
            .with_attribute(
                "receive_message_type",
                optional_reference("The message type the node receives.").requires_replace(),
            )
            .with_attribute("send_message_type", send_message_type())
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = ExternalNodeCreate {
            app: plan.required("app")?,
            receive_message_type: plan.optional("receive_message_type")?,
            send_message_type: plan.optional("send_message_type")?,
            update: external_update(plan)?,
        };
        let created = node::create_external_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(external_state(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "ExternalNode", |n| match n {
            Node::ExternalNode(n) => Some(n),
            _ => None,
        })
        .await?;
        Ok(found.map(external_state))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let updated =
            node::update_external_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &external_update(plan)?)
                .await?;
        Ok(external_state(updated))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        delete(ctx, data, state, "ExternalNode").await
    }
}

// =============================================================================
// Cross-tenant sending node
// =============================================================================

fn cross_tenant_state(n: CrossTenantSendingNode) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", n.name);
    state.set_known("app", n.app.name);
    json_out(&mut state, "config", n.config);
    state.set_optional("description", n.description);
    state.set_optional("inline_processor", n.inline_processor);
    state.set_optional("logging_level", n.logging_level);
    state.set_optional("managed_processor", ref_name(n.managed_processor));
    state.set_known("receive_message_type", n.receive_message_type.name);
    requirements_out(&mut state, n.requirements);
    state.set_optional("send_message_type", ref_name(n.send_message_type));
    state.set_known("sequential_processing", n.sequential_processing);
    state
}

#[async_trait]
impl Resource for CrossTenantSendingNodeResource {
    fn type_name(&self) -> &'static str {
        "cross_tenant_sending_node"
    }

    fn schema(&self) -> Schema {
        processor_schema("cross-tenant sending node")
            .with_description("A node sending messages to another tenant through a cross-tenant sending app.")
            .with_attribute(
                "app",
                reference("The cross-tenant sending app the node sends through.").requires_replace(),
            )
    }

    fn config_validators(&self) -> Vec<Box<dyn ConfigValidator>> {
        vec![Box::new(MutuallyExclusive::new(["inline_processor", "managed_processor"]))]
    }

    fn post_delete_delay(&self) -> Duration {
        NODE_QUIESCENCE
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = CrossTenantSendingNodeCreate {
            app: plan.required("app")?,
            receive_message_type: plan.required("receive_message_type")?,
            send_message_type: plan.optional("send_message_type")?,
            sequential_processing: plan.optional("sequential_processing")?,
            update: processor_update(plan)?,
        };
        let created =
            node::create_cross_tenant_sending_node(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        Ok(cross_tenant_state(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let found = lookup(ctx, data, state, "CrossTenantSendingNode", |n| match n {
            Node::CrossTenantSendingNode(n) => Some(n),
            _ => None,
        })
        .await?;
        Ok(found.map(cross_tenant_state))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let updated = node::update_cross_tenant_sending_node(
            ctx,
            &data.client,
            &data.tenant,
            &name_of(plan)?,
            &processor_update(plan)?,
        )
        .await?;
        Ok(cross_tenant_state(updated))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        delete(ctx, data, state, "CrossTenantSendingNode").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EchoStreamProvider;
    use crate::service::ProviderService;
    use crate::testing::{assert_error_contains, assert_plan_no_changes, FakeBackends, ProviderTester, TestError};
    use crate::value::Dynamic;
    use serde_json::json;

    async fn configured() -> (FakeBackends, ProviderTester<EchoStreamProvider>) {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        tester.configure(backends.provider_config()).await.unwrap();
        (backends, tester)
    }

    fn diagnostics(err: TestError) -> Vec<crate::schema::Diagnostic> {
        match err {
            TestError::Diagnostics(diags) => diags,
            TestError::Provider(e) => panic!("expected diagnostics, got {}", e),
        }
    }

    fn remote_processor(name: &str) -> serde_json::Value {
        json!({
            "__typename": "ProcessorNode",
            "name": name,
            "config": null,
            "description": null,
            "inline_processor": "def processor(*, message, **kwargs): return message",
            "logging_level": null,
            "managed_processor": null,
            "receive_message_type": {"name": "echo.text"},
            "requirements": [],
            "send_message_type": {"name": "echo.text"},
            "sequential_processing": false,
        })
    }

    #[tokio::test]
    async fn test_router_bitmappers_are_mutually_exclusive() {
        let (backends, tester) = configured().await;
        let err = tester
            .validate_resource_config(
                "echostream_bitmap_router_node",
                json!({
                    "name": "router",
                    "inline_bitmapper": "def bitmapper(*, message, **kwargs): return 0",
                    "managed_bitmapper": "my-bitmapper",
                    "receive_message_type": "echo.text",
                }),
            )
            .await
            .unwrap_err();
        assert_error_contains(&diagnostics(err), "mutually exclusive");
        assert!(backends.graphql.calls().is_empty());
        assert_eq!(backends.identity.login_count(), 0);
    }

    #[tokio::test]
    async fn test_processor_node_needs_exactly_one_processor() {
        let (_backends, tester) = configured().await;
        let err = tester
            .validate_resource_config(
                "echostream_processor_node",
                json!({"name": "proc", "receive_message_type": "echo.text"}),
            )
            .await
            .unwrap_err();
        assert_error_contains(&diagnostics(err), "Invalid attribute combination");

        tester
            .validate_resource_config(
                "echostream_processor_node",
                json!({"name": "proc", "receive_message_type": "echo.text", "managed_processor": "fn1"}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hub_lease_ordering() {
        let (_backends, tester) = configured().await;
        let err = tester
            .validate_resource_config(
                "echostream_web_sub_hub_node",
                json!({
                    "name": "hub",
                    "receive_message_type": "echo.text",
                    "default_lease_seconds": 600,
                    "max_lease_seconds": 60,
                }),
            )
            .await
            .unwrap_err();
        let diags = diagnostics(err);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("default_lease_seconds"));
    }

    #[tokio::test]
    async fn test_config_must_be_json_object() {
        let (_backends, tester) = configured().await;
        let err = tester
            .validate_resource_config(
                "echostream_processor_node",
                json!({
                    "name": "proc",
                    "receive_message_type": "echo.text",
                    "managed_processor": "fn1",
                    "config": "[1, 2]",
                }),
            )
            .await
            .unwrap_err();
        let diags = diagnostics(err);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("config"));
    }

    #[test]
    fn test_route_table_codec() {
        let plan = ValueTree::from_json(json!({"route_table": {"0x1": ["a", "b"], "0x2": ["c"]}})).unwrap();
        let raw = route_table_in(&plan).unwrap().unwrap();
        assert_eq!(raw, r#"{"0x1":["a","b"],"0x2":["c"]}"#);

        let table = route_table_out(Some(r#"{"0x2": ["c"], "0x1": ["b", "a"]}"#.to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(table["0x1"], BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(route_table_out(Some("{}".to_string())).unwrap(), None);
        assert_eq!(route_table_out(None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_processor_node_create_keeps_operator_config_text() {
        let (backends, tester) = configured().await;
        let mut remote = remote_processor("proc");
        remote["config"] = json!("{\"b\":2,\"a\":1}");
        backends.graphql.returns("CreateProcessorNode", remote);

        let plan = tester
            .plan_create(
                "echostream_processor_node",
                json!({
                    "name": "proc",
                    "config": "{ \"a\": 1, \"b\": 2 }",
                    "inline_processor": "def processor(*, message, **kwargs): return message",
                    "receive_message_type": "echo.text",
                    "send_message_type": "echo.text",
                }),
            )
            .await
            .unwrap();
        let planned = plan.planned_state.unwrap();
        assert!(planned.raw("sequential_processing").is_unknown());

        let created = tester.create("echostream_processor_node", planned).await.unwrap();
        assert_eq!(created.raw("config").as_str(), Some("{ \"a\": 1, \"b\": 2 }"));
        assert_eq!(created.raw("sequential_processing"), &Dynamic::Bool(false));
        assert!(created.raw("requirements").is_null());

        let call = backends.graphql.last_call("CreateProcessorNode").unwrap();
        assert_eq!(call.variables["receiveMessageType"], json!("echo.text"));
        assert_eq!(call.variables["sequentialProcessing"], json!(null));
    }

    #[tokio::test]
    async fn test_empty_config_and_requirements_replan_clean() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("CreateProcessorNode", remote_processor("proc"));
        backends.graphql.returns("GetNode", remote_processor("proc"));
        let config = json!({
            "name": "proc",
            "config": "",
            "inline_processor": "def processor(*, message, **kwargs): return message",
            "receive_message_type": "echo.text",
            "requirements": [],
            "send_message_type": "echo.text",
        });

        let state = tester
            .lifecycle_create("echostream_processor_node", config.clone())
            .await
            .unwrap();
        assert_eq!(state.raw("config").as_str(), Some(""));
        assert_eq!(state.raw("requirements"), &Dynamic::Set(vec![]));

        let plan = tester
            .plan_update("echostream_processor_node", state, config)
            .await
            .unwrap();
        assert_plan_no_changes(&plan);

        let call = backends.graphql.last_call("CreateProcessorNode").unwrap();
        assert_eq!(call.variables["config"], json!(null));
    }

    #[tokio::test]
    async fn test_read_wrong_node_kind() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("GetNode", remote_processor("proc"));
        let state = ValueTree::from_json(json!({"name": "proc"})).unwrap();
        let err = tester.read("echostream_timer_node", state).await.unwrap_err();
        assert!(matches!(err, ProviderError::KindMismatch { ref actual, .. } if actual == "ProcessorNode"));
    }

    #[tokio::test]
    async fn test_managing_system_node_is_refused() {
        let (backends, tester) = configured().await;
        backends.graphql.returns(
            "GetNode",
            json!({"__typename": "ChangeEmitterNode", "name": "Change Emitter", "send_message_type": {"name": "echo.change"}}),
        );
        let state = ValueTree::from_json(json!({"name": "Change Emitter"})).unwrap();
        let err = tester.read("echostream_processor_node", state).await.unwrap_err();
        assert!(matches!(err, ProviderError::SystemOwned(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_delete_waits_for_quiescence() {
        let (backends, tester) = configured().await;
        backends
            .graphql
            .returns("DeleteNode", json!({"__typename": "ProcessorNode", "Delete": true}));
        let state = ValueTree::from_json(json!({"name": "proc"})).unwrap();

        let started = tokio::time::Instant::now();
        tester.delete("echostream_processor_node", state).await.unwrap();
        assert!(started.elapsed() >= NODE_QUIESCENCE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_delete_quiescence_bounded_by_deadline() {
        let (backends, tester) = configured().await;
        backends
            .graphql
            .returns("DeleteNode", json!({"__typename": "ProcessorNode", "Delete": true}));
        let state = ValueTree::from_json(json!({"name": "proc"})).unwrap();

        let ctx = Context::with_timeout(Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        tester
            .provider()
            .delete(&ctx, "echostream_processor_node", state)
            .await
            .unwrap();
        assert!(started.elapsed() < NODE_QUIESCENCE);
    }

    #[tokio::test]
    async fn test_changing_receive_type_replaces() {
        let (_backends, tester) = configured().await;
        let prior = processor_state(serde_json::from_value(remote_processor("proc")).unwrap());
        let plan = tester
            .plan_update(
                "echostream_processor_node",
                prior,
                json!({
                    "name": "proc",
                    "inline_processor": "def processor(*, message, **kwargs): return message",
                    "receive_message_type": "echo.json",
                    "send_message_type": "echo.text",
                }),
            )
            .await
            .unwrap();
        assert!(plan.requires_replace.contains("receive_message_type"));
        assert!(!plan.requires_replace.contains("sequential_processing"));
    }
}
