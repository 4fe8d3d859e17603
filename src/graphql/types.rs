//! Typed GraphQL response objects.
//!
//! Interface-typed fields decode into enums tagged by `__typename`; a
//! variant this crate does not know decodes to `Unsupported`, so dispatch
//! stays a total match.

use serde::{Deserialize, Serialize};

/// A reference to another object by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    /// The referenced object's name.
    pub name: String,
}

/// Names of node types owned by the system.
pub const SYSTEM_NODE_TYPES: &[&str] = &[
    "ChangeEmitterNode",
    "DeadLetterEmitterNode",
    "LogEmitterNode",
    "AlertEmitterNode",
    "AuditEmitterNode",
    "ChangeReceiverNode",
    "AppChangeRouterNode",
    "AppChangeReceiverNode",
];

fn name_of(r: &Option<NameRef>) -> Option<&str> {
    r.as_ref().map(|r| r.name.as_str())
}

/// Message-type metadata of a node.
///
/// Nodes that do not receive (or do not send) answer `None`.
pub trait HasMessageTypes {
    /// The message type the node accepts.
    fn receive_message_type(&self) -> Option<&str>;

    /// The message type the node emits.
    fn send_message_type(&self) -> Option<&str>;
}

// =============================================================================
// KMS keys and message types
// =============================================================================

/// A tenant KMS key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KmsKey {
    /// Key name.
    pub name: String,
    /// Key ARN.
    pub arn: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether anything references the key.
    #[serde(default)]
    pub in_use: bool,
}

/// A message type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageType {
    /// Type name.
    pub name: String,
    /// Auditor function source.
    pub auditor: String,
    /// Bitmapper template source.
    pub bitmapper_template: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether anything references the type.
    #[serde(default)]
    pub in_use: bool,
    /// Processor template source.
    pub processor_template: String,
    /// Markdown readme.
    #[serde(default)]
    pub readme: Option<String>,
    /// Python requirements.
    #[serde(default)]
    pub requirements: Option<Vec<String>>,
    /// A sample message.
    pub sample_message: String,
    /// Set on system-managed types.
    #[serde(default)]
    pub system: Option<bool>,
}

impl MessageType {
    /// Whether the type is system-managed.
    pub fn is_system(&self) -> bool {
        self.system.unwrap_or(false)
    }
}

// =============================================================================
// Functions
// =============================================================================

/// A bitmapper function.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BitmapperFunction {
    /// Function name.
    pub name: String,
    /// Argument message type.
    pub argument_message_type: NameRef,
    /// Source code.
    pub code: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether anything references the function.
    #[serde(default)]
    pub in_use: bool,
    /// Markdown readme.
    #[serde(default)]
    pub readme: Option<String>,
    /// Python requirements.
    #[serde(default)]
    pub requirements: Option<Vec<String>>,
    /// Set on system-managed functions.
    #[serde(default)]
    pub system: Option<bool>,
}

/// A processor function.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessorFunction {
    /// Function name.
    pub name: String,
    /// Argument message type.
    pub argument_message_type: NameRef,
    /// Source code.
    pub code: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether anything references the function.
    #[serde(default)]
    pub in_use: bool,
    /// Markdown readme.
    #[serde(default)]
    pub readme: Option<String>,
    /// Python requirements.
    #[serde(default)]
    pub requirements: Option<Vec<String>>,
    /// Return message type; absent for filters that only pass through.
    #[serde(default)]
    pub return_message_type: Option<NameRef>,
    /// Set on system-managed functions.
    #[serde(default)]
    pub system: Option<bool>,
}

/// A function, by concrete kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "__typename")]
pub enum Function {
    /// A bitmapper function.
    BitmapperFunction(BitmapperFunction),
    /// A processor function.
    ProcessorFunction(ProcessorFunction),
    /// A kind this crate does not know.
    #[serde(other)]
    Unsupported,
}

impl Function {
    /// The concrete kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BitmapperFunction(_) => "BitmapperFunction",
            Self::ProcessorFunction(_) => "ProcessorFunction",
            Self::Unsupported => "an unsupported function type",
        }
    }

    /// Whether the function is system-managed.
    pub fn is_system(&self) -> bool {
        match self {
            Self::BitmapperFunction(f) => f.system.unwrap_or(false),
            Self::ProcessorFunction(f) => f.system.unwrap_or(false),
            Self::Unsupported => false,
        }
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A processor node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessorNode {
    /// Node name.
    pub name: String,
    /// JSON config.
    #[serde(default)]
    pub config: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Inline processor source.
    #[serde(default)]
    pub inline_processor: Option<String>,
    /// Logging level.
    #[serde(default)]
    pub logging_level: Option<String>,
    /// Managed processor function.
    #[serde(default)]
    pub managed_processor: Option<NameRef>,
    /// Accepted message type.
    pub receive_message_type: NameRef,
    /// Python requirements.
    #[serde(default)]
    pub requirements: Option<Vec<String>>,
    /// Emitted message type.
    #[serde(default)]
    pub send_message_type: Option<NameRef>,
    /// Whether messages are processed one at a time.
    #[serde(default)]
    pub sequential_processing: bool,
}

/// A bitmap router node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BitmapRouterNode {
    /// Node name.
    pub name: String,
    /// JSON config.
    #[serde(default)]
    pub config: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Inline bitmapper source.
    #[serde(default)]
    pub inline_bitmapper: Option<String>,
    /// Logging level.
    #[serde(default)]
    pub logging_level: Option<String>,
    /// Managed bitmapper function.
    #[serde(default)]
    pub managed_bitmapper: Option<NameRef>,
    /// Accepted (and re-emitted) message type.
    pub receive_message_type: NameRef,
    /// Python requirements.
    #[serde(default)]
    pub requirements: Option<Vec<String>>,
    /// JSON map of bitmap to target node names.
    #[serde(default)]
    pub route_table: Option<String>,
}

/// A timer node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimerNode {
    /// Node name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Cron or rate expression.
    pub schedule_expression: String,
    /// Emitted message type.
    pub send_message_type: NameRef,
}

/// A WebSub hub node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebSubHubNode {
    /// Node name.
    pub name: String,
    /// JSON config.
    #[serde(default)]
    pub config: Option<String>,
    /// Default subscription lease.
    #[serde(default)]
    pub default_lease_seconds: Option<i64>,
    /// Delivery retry count.
    #[serde(default)]
    pub delivery_retries: Option<i64>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Public hub endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Inline authenticator source.
    #[serde(default)]
    pub inline_authenticator: Option<String>,
    /// Logging level.
    #[serde(default)]
    pub logging_level: Option<String>,
    /// Managed authenticator function.
    #[serde(default)]
    pub managed_authenticator: Option<NameRef>,
    /// Maximum subscription lease.
    #[serde(default)]
    pub max_lease_seconds: Option<i64>,
    /// Accepted message type.
    pub receive_message_type: NameRef,
    /// Python requirements.
    #[serde(default)]
    pub requirements: Option<Vec<String>>,
    /// Content signature algorithm.
    #[serde(default)]
    pub signature_algorithm: Option<String>,
    /// Subscription security mode.
    #[serde(default)]
    pub subscription_security: Option<String>,
}

/// A node fed by an external application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalNode {
    /// Node name.
    pub name: String,
    /// Owning application.
    pub app: NameRef,
    /// JSON config.
    #[serde(default)]
    pub config: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Accepted message type.
    #[serde(default)]
    pub receive_message_type: Option<NameRef>,
    /// Emitted message type.
    #[serde(default)]
    pub send_message_type: Option<NameRef>,
}

/// A node sending to another tenant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrossTenantSendingNode {
    /// Node name.
    pub name: String,
    /// Owning cross-tenant sending app.
    pub app: NameRef,
    /// JSON config.
    #[serde(default)]
    pub config: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Inline processor source.
    #[serde(default)]
    pub inline_processor: Option<String>,
    /// Logging level.
    #[serde(default)]
    pub logging_level: Option<String>,
    /// Managed processor function.
    #[serde(default)]
    pub managed_processor: Option<NameRef>,
    /// Accepted message type.
    pub receive_message_type: NameRef,
    /// Python requirements.
    #[serde(default)]
    pub requirements: Option<Vec<String>>,
    /// Emitted message type.
    #[serde(default)]
    pub send_message_type: Option<NameRef>,
    /// Whether messages are processed one at a time.
    #[serde(default)]
    pub sequential_processing: bool,
}

/// A system-managed node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemNode {
    /// Node name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Accepted message type.
    #[serde(default)]
    pub receive_message_type: Option<NameRef>,
    /// Emitted message type.
    #[serde(default)]
    pub send_message_type: Option<NameRef>,
}

/// A node, by concrete kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "__typename")]
pub enum Node {
    /// A processor node.
    ProcessorNode(ProcessorNode),
    /// A bitmap router node.
    BitmapRouterNode(BitmapRouterNode),
    /// A timer node.
    TimerNode(TimerNode),
    /// A WebSub hub node.
    WebSubHubNode(WebSubHubNode),
    /// An external node.
    ExternalNode(ExternalNode),
    /// A cross-tenant sending node.
    CrossTenantSendingNode(CrossTenantSendingNode),
    /// The tenant change emitter.
    ChangeEmitterNode(SystemNode),
    /// The tenant dead-letter emitter.
    DeadLetterEmitterNode(SystemNode),
    /// The tenant log emitter.
    LogEmitterNode(SystemNode),
    /// The tenant alert emitter.
    AlertEmitterNode(SystemNode),
    /// The tenant audit emitter.
    AuditEmitterNode(SystemNode),
    /// A kind this crate does not know.
    #[serde(other)]
    Unsupported,
}

impl Node {
    /// The concrete kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProcessorNode(_) => "ProcessorNode",
            Self::BitmapRouterNode(_) => "BitmapRouterNode",
            Self::TimerNode(_) => "TimerNode",
            Self::WebSubHubNode(_) => "WebSubHubNode",
            Self::ExternalNode(_) => "ExternalNode",
            Self::CrossTenantSendingNode(_) => "CrossTenantSendingNode",
            Self::ChangeEmitterNode(_) => "ChangeEmitterNode",
            Self::DeadLetterEmitterNode(_) => "DeadLetterEmitterNode",
            Self::LogEmitterNode(_) => "LogEmitterNode",
            Self::AlertEmitterNode(_) => "AlertEmitterNode",
            Self::AuditEmitterNode(_) => "AuditEmitterNode",
            Self::Unsupported => "an unsupported node type",
        }
    }

    /// Whether the node is system-managed.
    pub fn is_system(&self) -> bool {
        SYSTEM_NODE_TYPES.contains(&self.kind())
    }

    fn message_types(&self) -> Option<&dyn HasMessageTypes> {
        let node: &dyn HasMessageTypes = match self {
            Self::ProcessorNode(n) => n,
            Self::BitmapRouterNode(n) => n,
            Self::TimerNode(n) => n,
            Self::WebSubHubNode(n) => n,
            Self::ExternalNode(n) => n,
            Self::CrossTenantSendingNode(n) => n,
            Self::ChangeEmitterNode(n)
            | Self::DeadLetterEmitterNode(n)
            | Self::LogEmitterNode(n)
            | Self::AlertEmitterNode(n)
            | Self::AuditEmitterNode(n) => n,
            Self::Unsupported => return None,
        };
        Some(node)
    }
}

impl HasMessageTypes for Node {
    fn receive_message_type(&self) -> Option<&str> {
        self.message_types().and_then(|n| n.receive_message_type())
    }

    fn send_message_type(&self) -> Option<&str> {
        self.message_types().and_then(|n| n.send_message_type())
    }
}

impl HasMessageTypes for ProcessorNode {
    fn receive_message_type(&self) -> Option<&str> {
        Some(&self.receive_message_type.name)
    }

    fn send_message_type(&self) -> Option<&str> {
        name_of(&self.send_message_type)
    }
}

impl HasMessageTypes for BitmapRouterNode {
    fn receive_message_type(&self) -> Option<&str> {
        Some(&self.receive_message_type.name)
    }

    // Routers forward what they receive.
    fn send_message_type(&self) -> Option<&str> {
        Some(&self.receive_message_type.name)
    }
}

impl HasMessageTypes for TimerNode {
    fn receive_message_type(&self) -> Option<&str> {
        None
    }

    fn send_message_type(&self) -> Option<&str> {
        Some(&self.send_message_type.name)
    }
}

impl HasMessageTypes for WebSubHubNode {
    fn receive_message_type(&self) -> Option<&str> {
        Some(&self.receive_message_type.name)
    }

    fn send_message_type(&self) -> Option<&str> {
        None
    }
}

impl HasMessageTypes for ExternalNode {
    fn receive_message_type(&self) -> Option<&str> {
        name_of(&self.receive_message_type)
    }

    fn send_message_type(&self) -> Option<&str> {
        name_of(&self.send_message_type)
    }
}

impl HasMessageTypes for CrossTenantSendingNode {
    fn receive_message_type(&self) -> Option<&str> {
        Some(&self.receive_message_type.name)
    }

    fn send_message_type(&self) -> Option<&str> {
        name_of(&self.send_message_type)
    }
}

impl HasMessageTypes for SystemNode {
    fn receive_message_type(&self) -> Option<&str> {
        name_of(&self.receive_message_type)
    }

    fn send_message_type(&self) -> Option<&str> {
        name_of(&self.send_message_type)
    }
}

// =============================================================================
// Edges
// =============================================================================

/// A directed, typed queue between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Edge {
    /// Source node.
    pub source: NameRef,
    /// Target node.
    pub target: NameRef,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// KMS key encrypting the queue.
    #[serde(default)]
    pub kms_key: Option<NameRef>,
    /// Receives before a message is dead-lettered.
    #[serde(default)]
    pub max_receive_count: Option<i64>,
    /// Message type carried.
    pub message_type: NameRef,
    /// Queue URL.
    #[serde(default)]
    pub queue: Option<String>,
}

// =============================================================================
// Apps
// =============================================================================

/// Login credentials issued to an app or API user.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AppCredentials {
    /// App client id.
    pub client_id: String,
    /// Password.
    pub password: String,
    /// User pool id.
    pub user_pool_id: String,
    /// Username.
    pub username: String,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("client_id", &self.client_id)
            .field("user_pool_id", &self.user_pool_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// An external application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalApp {
    /// App name.
    pub name: String,
    /// GraphQL endpoint the app uses.
    #[serde(default)]
    pub appsync_endpoint: Option<String>,
    /// JSON config.
    #[serde(default)]
    pub config: Option<String>,
    /// Issued credentials.
    #[serde(default)]
    pub credentials: Option<AppCredentials>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the app may read the tenant table.
    #[serde(default)]
    pub table_access: bool,
}

/// The sending half of a cross-tenant relationship.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrossTenantSendingApp {
    /// App name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Receiving app name in the other tenant.
    pub receiving_app: String,
    /// The other tenant.
    pub receiving_tenant: String,
}

/// The receiving half of a cross-tenant relationship.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrossTenantReceivingApp {
    /// App name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// The other tenant.
    pub sending_tenant: String,
    /// Sending app name, once the other side has connected.
    #[serde(default)]
    pub sending_app: Option<String>,
}

/// An app, by concrete kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "__typename")]
pub enum App {
    /// An external app.
    ExternalApp(ExternalApp),
    /// A cross-tenant sending app.
    CrossTenantSendingApp(CrossTenantSendingApp),
    /// A cross-tenant receiving app.
    CrossTenantReceivingApp(CrossTenantReceivingApp),
    /// A kind this crate does not know.
    #[serde(other)]
    Unsupported,
}

impl App {
    /// The concrete kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExternalApp(_) => "ExternalApp",
            Self::CrossTenantSendingApp(_) => "CrossTenantSendingApp",
            Self::CrossTenantReceivingApp(_) => "CrossTenantReceivingApp",
            Self::Unsupported => "an unsupported app type",
        }
    }
}

// =============================================================================
// Tenant and users
// =============================================================================

/// The tenant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tenant {
    /// Tenant name.
    pub name: String,
    /// Whether the tenant is active.
    #[serde(default)]
    pub active: bool,
    /// Whether auditing is enabled.
    #[serde(default)]
    pub audit: bool,
    /// JSON config.
    #[serde(default)]
    pub config: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Region the tenant is deployed in.
    #[serde(default)]
    pub region: Option<String>,
    /// Tenant table name.
    #[serde(default)]
    pub table: Option<String>,
}

/// A human user of the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TenantUser {
    /// Login email.
    pub email: String,
    /// First name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Role within the tenant.
    pub role: String,
    /// Membership status.
    pub status: String,
}

/// A programmatic user of the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiUser {
    /// Generated username.
    pub username: String,
    /// GraphQL endpoint the user calls.
    #[serde(default)]
    pub appsync_endpoint: Option<String>,
    /// Issued credentials.
    #[serde(default)]
    pub credentials: Option<AppCredentials>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Role within the tenant.
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_dispatch_on_typename() {
        let node: Node = serde_json::from_value(json!({
            "__typename": "ProcessorNode",
            "name": "p1",
            "receive_message_type": {"name": "T"},
            "send_message_type": {"name": "U"},
            "sequential_processing": false
        }))
        .unwrap();
        assert_eq!(node.kind(), "ProcessorNode");
        assert_eq!(node.receive_message_type(), Some("T"));
        assert_eq!(node.send_message_type(), Some("U"));
        assert!(!node.is_system());
    }

    #[test]
    fn test_unknown_node_type_is_unsupported() {
        let node: Node = serde_json::from_value(json!({
            "__typename": "FilesDotComWebhookNode",
            "name": "f"
        }))
        .unwrap();
        assert_eq!(node, Node::Unsupported);
        assert_eq!(node.send_message_type(), None);
    }

    #[test]
    fn test_system_node() {
        let node: Node = serde_json::from_value(json!({
            "__typename": "LogEmitterNode",
            "name": "log",
            "send_message_type": {"name": "echo.log"}
        }))
        .unwrap();
        assert!(node.is_system());
        assert_eq!(node.send_message_type(), Some("echo.log"));
        assert_eq!(node.receive_message_type(), None);
    }

    #[test]
    fn test_router_forwards_receive_type() {
        let node: Node = serde_json::from_value(json!({
            "__typename": "BitmapRouterNode",
            "name": "r",
            "receive_message_type": {"name": "T"}
        }))
        .unwrap();
        assert_eq!(node.send_message_type(), Some("T"));
    }

    #[test]
    fn test_function_dispatch() {
        let function: Function = serde_json::from_value(json!({
            "__typename": "BitmapperFunction",
            "name": "b",
            "argument_message_type": {"name": "T"},
            "code": "def bitmap(): pass",
            "in_use": true
        }))
        .unwrap();
        assert_eq!(function.kind(), "BitmapperFunction");
        assert!(!function.is_system());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = AppCredentials {
            client_id: "c".to_string(),
            password: "hunter2".to_string(),
            user_pool_id: "p".to_string(),
            username: "u".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
