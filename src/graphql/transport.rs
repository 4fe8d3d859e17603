//! HTTP transport for GraphQL requests.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::ProviderError;

/// A GraphQL request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    /// The operation to run.
    pub operation_name: String,
    /// The document.
    pub query: String,
    /// Operation variables.
    pub variables: serde_json::Value,
}

/// Carries a request to the GraphQL endpoint.
///
/// Returns the raw response body; envelope handling lives in the client.
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    /// POST `request` with the given `Authorization` header value.
    async fn post(
        &self,
        ctx: &Context,
        authorization: &str,
        request: &GraphqlRequest,
    ) -> Result<serde_json::Value, ProviderError>;
}

/// Transport over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport posting to `endpoint`.
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// The endpoint requests go to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GraphqlTransport for HttpTransport {
    async fn post(
        &self,
        ctx: &Context,
        authorization: &str,
        request: &GraphqlRequest,
    ) -> Result<serde_json::Value, ProviderError> {
        debug!(operation = %request.operation_name, endpoint = %self.endpoint, "Posting GraphQL request");
        let send = async {
            let response = self
                .http
                .post(&self.endpoint)
                .header(reqwest::header::AUTHORIZATION, authorization)
                .json(request)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            match serde_json::from_str::<serde_json::Value>(&body) {
                // Error statuses still carry a GraphQL envelope worth surfacing.
                Ok(value) if status.is_success() || value.get("errors").is_some() => Ok(value),
                Err(e) if status.is_success() => Err(ProviderError::Transport(format!(
                    "malformed response to {}: {}",
                    request.operation_name, e
                ))),
                _ => {
                    warn!(status = %status, operation = %request.operation_name, "GraphQL endpoint returned an error status");
                    Err(ProviderError::Transport(format!("HTTP {}: {}", status, body)))
                },
            }
        };
        ctx.run(&request.operation_name, send).await
    }
}
