//! Authenticated GraphQL client.
//!
//! Every operation is a typed async function in [`operations`] taking a
//! [`Context`], the [`GraphqlClient`] and its arguments. Documents alias
//! their root field to `result`, so every response decodes through the
//! same envelope.

pub mod operations;
pub mod transport;
pub mod types;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::auth::Authenticator;
use crate::context::Context;
use crate::error::ProviderError;

pub use transport::{GraphqlRequest, GraphqlTransport, HttpTransport};

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    /// The error message.
    pub message: String,
    /// Service-specific error classification.
    #[serde(default, rename = "errorType")]
    pub error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "D: DeserializeOwned")]
struct Envelope<D> {
    #[serde(default)]
    data: Option<D>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct Aliased<T> {
    #[serde(default)]
    result: Option<T>,
}

/// GraphQL client sharing one authenticator across all operations.
#[derive(Clone)]
pub struct GraphqlClient {
    auth: Arc<Authenticator>,
    transport: Arc<dyn GraphqlTransport>,
}

impl std::fmt::Debug for GraphqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlClient")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl GraphqlClient {
    /// Create a client.
    pub fn new(auth: Arc<Authenticator>, transport: Arc<dyn GraphqlTransport>) -> Self {
        Self { auth, transport }
    }

    /// The shared authenticator.
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Run an operation and decode its `data`.
    #[instrument(skip(self, ctx, document, variables), name = "graphql.execute")]
    pub async fn execute<V, D>(
        &self,
        ctx: &Context,
        operation_name: &str,
        document: &str,
        variables: &V,
    ) -> Result<D, ProviderError>
    where
        V: Serialize + ?Sized,
        D: DeserializeOwned,
    {
        ctx.check(operation_name)?;
        let token = self.auth.access_token(ctx).await?;
        let request = GraphqlRequest {
            operation_name: operation_name.to_string(),
            query: document.to_string(),
            variables: serde_json::to_value(variables)?,
        };

        let body = self.transport.post(ctx, &token, &request).await?;
        let envelope: Envelope<D> = serde_json::from_value(body)?;

        if !envelope.errors.is_empty() {
            let message = envelope
                .errors
                .iter()
                .map(|e| match &e.error_type {
                    Some(kind) => format!("{} ({})", e.message, kind),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            warn!(operation = operation_name, error = %message, "GraphQL operation rejected");
            return Err(ProviderError::RemoteRejected {
                operation: operation_name.to_string(),
                message,
            });
        }

        debug!(operation = operation_name, "GraphQL operation succeeded");
        envelope.data.ok_or_else(|| ProviderError::RemoteRejected {
            operation: operation_name.to_string(),
            message: "response carried neither data nor errors".to_string(),
        })
    }

    /// Run an operation whose root field is aliased `result`; `None` when
    /// the service returned null for it.
    pub async fn fetch<V, T>(
        &self,
        ctx: &Context,
        operation_name: &str,
        document: &str,
        variables: &V,
    ) -> Result<Option<T>, ProviderError>
    where
        V: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let data: Aliased<T> = self.execute(ctx, operation_name, document, variables).await?;
        Ok(data.result)
    }
}
