//! EchoStream Provider
//!
//! This crate is the runtime core of a declarative-infrastructure provider
//! for the EchoStream platform. It maps a host's resource lifecycle
//! protocol (validate, plan, create, read, update, delete, import) onto
//! EchoStream's GraphQL API, authenticating as a tenant user.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **ProviderService trait**: The protocol surface a host adapter drives
//! - **EchoStreamProvider**: The implementation, hosting every resource and data source kind
//! - **Schema types**: Typed attribute declarations with validators and plan modifiers
//! - **Authentication**: SRP login against the user pool with a shared, refreshing token cache
//! - **GraphQL client**: Typed operations over a pluggable transport
//! - **Lifecycle engine**: Plan computation, in-use gating, quiescence and state normalisation
//! - **Error types**: A single error enum carried into host diagnostics
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use echostream_provider::{init_logging, Context, EchoStreamProvider, ProviderService};
//! use echostream_provider::value::ValueTree;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = EchoStreamProvider::new();
//!     let config = ValueTree::from_json(json!({
//!         "appsync_endpoint": "https://api-prod.us-east-1.echo.stream/graphql",
//!         "client_id": "…",
//!         "password": "…",
//!         "tenant": "acme",
//!         "username": "ops@acme.example",
//!         "user_pool_id": "us-east-1_AbCdEf",
//!     }))?;
//!
//!     let ctx = Context::new();
//!     let diagnostics = provider.configure(&ctx, config).await?;
//!     assert!(diagnostics.is_empty());
//!
//!     let state = ValueTree::from_json(json!({"name": "orders"}))?;
//!     let key = provider.read(&ctx, "echostream_kms_key", state).await?;
//!     println!("{:?}", key);
//!     Ok(())
//! }
//! ```
//!
//! # Resource kinds
//!
//! Resources are registered as `echostream_<kind>`:
//!
//! - **Catalog**: `kms_key`, `message_type`, `bitmapper_function`, `processor_function`
//! - **Nodes**: `processor_node`, `bitmap_router_node`, `timer_node`, `web_sub_hub_node`,
//!   `external_node`, `cross_tenant_sending_node`
//! - **Topology**: `edge`
//! - **Apps**: `external_app`, `cross_tenant_sending_app`, `cross_tenant_receiving_app`
//! - **Tenant**: `tenant`, `tenant_user`, `api_user`
//!
//! Data sources expose `message_type`, `function`, `tenant` and the five
//! system emitter nodes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod context;
pub mod data_sources;
pub mod error;
pub mod graphql;
pub mod json_string;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod service;
pub mod testing;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use context::Context;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use plan::{AttributeChange, PlanRequest, PlanResult};
pub use provider::{ClientOptions, EchoStreamProvider, ProviderConfig, PROVIDER_NAME};
pub use resource::{DataSource, ProviderData, Resource};
pub use schema::ProviderSchema;
pub use service::{ImportedResource, ProviderMetadata, ProviderService, ServerCapabilities};
pub use validation::{is_valid, validate, validate_result};
pub use value::{Dynamic, ValueTree};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
