//! Identity provider client.
//!
//! Two operations are needed: `InitiateAuth` (SRP start, and the
//! refresh-token exchange) and `RespondToAuthChallenge` (SRP proof).
//! [`CognitoIdentityProvider`] speaks the user-pool JSON protocol over
//! HTTPS; tests substitute [`crate::testing::FakeIdentityProvider`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::ProviderError;

/// The `AuthFlow` of an `InitiateAuth` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthFlow {
    /// SRP login.
    UserSrpAuth,
    /// Refresh-token exchange.
    RefreshTokenAuth,
}

/// `InitiateAuth` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitiateAuthRequest {
    /// The flow to start.
    pub auth_flow: AuthFlow,
    /// The app client id.
    pub client_id: String,
    /// Flow parameters (`USERNAME`, `SRP_A`, `REFRESH_TOKEN`).
    pub auth_parameters: BTreeMap<String, String>,
}

/// `RespondToAuthChallenge` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RespondToAuthChallengeRequest {
    /// The challenge being answered.
    pub challenge_name: String,
    /// The app client id.
    pub client_id: String,
    /// Challenge responses.
    pub challenge_responses: BTreeMap<String, String>,
    /// Session handle from the challenge, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

/// Tokens issued by the identity provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticationResult {
    /// The bearer token sent to the GraphQL endpoint.
    pub access_token: String,
    /// Absent on refresh-token exchanges.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime hint in seconds; the token's own claim wins.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl std::fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Response to either operation: tokens, or another challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthResponse {
    /// Set when the provider issues a challenge.
    #[serde(default)]
    pub challenge_name: Option<String>,
    /// Challenge parameters.
    #[serde(default)]
    pub challenge_parameters: BTreeMap<String, String>,
    /// Session handle to echo back.
    #[serde(default)]
    pub session: Option<String>,
    /// Set when the provider issues tokens.
    #[serde(default)]
    pub authentication_result: Option<AuthenticationResult>,
}

impl AuthResponse {
    /// Build a challenge response.
    pub fn challenge(name: impl Into<String>, parameters: BTreeMap<String, String>) -> Self {
        Self {
            challenge_name: Some(name.into()),
            challenge_parameters: parameters,
            ..Default::default()
        }
    }

    /// Build a token response.
    pub fn tokens(result: AuthenticationResult) -> Self {
        Self {
            authentication_result: Some(result),
            ..Default::default()
        }
    }
}

/// The identity provider seam.
///
/// Implementations must honour `ctx` for every network call.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a login or a refresh-token exchange.
    async fn initiate_auth(
        &self,
        ctx: &Context,
        request: InitiateAuthRequest,
    ) -> Result<AuthResponse, ProviderError>;

    /// Answer a challenge issued by `initiate_auth`.
    async fn respond_to_auth_challenge(
        &self,
        ctx: &Context,
        request: RespondToAuthChallengeRequest,
    ) -> Result<AuthResponse, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

/// User-pool identity provider over HTTPS.
#[derive(Debug, Clone)]
pub struct CognitoIdentityProvider {
    http: reqwest::Client,
    endpoint: String,
}

impl CognitoIdentityProvider {
    /// Client for the regional endpoint of `region`.
    pub fn new(http: reqwest::Client, region: &str) -> Self {
        Self::with_endpoint(http, format!("https://cognito-idp.{}.amazonaws.com/", region))
    }

    /// Client for an explicit endpoint.
    pub fn with_endpoint(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// The endpoint requests go to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<Req, Resp>(&self, ctx: &Context, target: &str, body: &Req) -> Result<Resp, ProviderError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        debug!(target_operation = target, "Calling identity provider");
        let payload = serde_json::to_vec(body)?;
        let send = async {
            let response = self
                .http
                .post(&self.endpoint)
                .header("X-Amz-Target", format!("AWSCognitoIdentityProviderService.{}", target))
                .header(reqwest::header::CONTENT_TYPE, "application/x-amz-json-1.1")
                .body(payload)
                .send()
                .await
                .map_err(|e| ProviderError::AuthUnavailable(e.to_string()))?;

            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ProviderError::AuthUnavailable(e.to_string()))?;

            if status.is_success() {
                serde_json::from_slice(&bytes).map_err(|e| {
                    ProviderError::AuthUnavailable(format!("malformed {} response: {}", target, e))
                })
            } else {
                let error: ErrorBody = serde_json::from_slice(&bytes).unwrap_or(ErrorBody {
                    kind: String::new(),
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                });
                Err(classify_error(status, &error))
            }
        };
        ctx.run(target, send).await
    }
}

fn classify_error(status: reqwest::StatusCode, error: &ErrorBody) -> ProviderError {
    let kind = error.kind.rsplit('#').next().unwrap_or_default();
    let message = if error.message.is_empty() {
        format!("{} ({})", kind, status)
    } else {
        format!("{}: {}", kind, error.message)
    };
    match kind {
        "NotAuthorizedException"
        | "UserNotFoundException"
        | "UserNotConfirmedException"
        | "PasswordResetRequiredException"
        | "InvalidParameterException"
        | "ResourceNotFoundException" => ProviderError::AuthRejected(message),
        _ => {
            warn!(status = %status, kind, "Identity provider call failed");
            ProviderError::AuthUnavailable(message)
        },
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn initiate_auth(
        &self,
        ctx: &Context,
        request: InitiateAuthRequest,
    ) -> Result<AuthResponse, ProviderError> {
        self.call(ctx, "InitiateAuth", &request).await
    }

    async fn respond_to_auth_challenge(
        &self,
        ctx: &Context,
        request: RespondToAuthChallengeRequest,
    ) -> Result<AuthResponse, ProviderError> {
        self.call(ctx, "RespondToAuthChallenge", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initiate_auth_wire_shape() {
        let request = InitiateAuthRequest {
            auth_flow: AuthFlow::UserSrpAuth,
            client_id: "client".to_string(),
            auth_parameters: BTreeMap::from([
                ("USERNAME".to_string(), "user@example.com".to_string()),
                ("SRP_A".to_string(), "abc".to_string()),
            ]),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "AuthFlow": "USER_SRP_AUTH",
                "ClientId": "client",
                "AuthParameters": {"SRP_A": "abc", "USERNAME": "user@example.com"}
            })
        );
    }

    #[test]
    fn test_auth_response_parses_challenge() {
        let response: AuthResponse = serde_json::from_value(json!({
            "ChallengeName": "PASSWORD_VERIFIER",
            "ChallengeParameters": {"SALT": "ab", "SRP_B": "cd", "SECRET_BLOCK": "AAAA", "USER_ID_FOR_SRP": "u"}
        }))
        .unwrap();
        assert_eq!(response.challenge_name.as_deref(), Some("PASSWORD_VERIFIER"));
        assert_eq!(response.challenge_parameters["SALT"], "ab");
        assert!(response.authentication_result.is_none());
    }

    #[test]
    fn test_auth_response_parses_tokens() {
        let response: AuthResponse = serde_json::from_value(json!({
            "ChallengeParameters": {},
            "AuthenticationResult": {"AccessToken": "a.b.c", "ExpiresIn": 3600, "TokenType": "Bearer"}
        }))
        .unwrap();
        let result = response.authentication_result.unwrap();
        assert_eq!(result.access_token, "a.b.c");
        assert_eq!(result.refresh_token, None);
        assert!(!format!("{:?}", result).contains("a.b.c"));
    }

    #[test]
    fn test_classify_error() {
        let rejected = classify_error(
            reqwest::StatusCode::BAD_REQUEST,
            &ErrorBody {
                kind: "com.amazonaws#NotAuthorizedException".to_string(),
                message: "Incorrect username or password.".to_string(),
            },
        );
        assert!(matches!(rejected, ProviderError::AuthRejected(_)));

        let unavailable = classify_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorBody {
                kind: "InternalErrorException".to_string(),
                message: String::new(),
            },
        );
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_regional_endpoint() {
        let idp = CognitoIdentityProvider::new(reqwest::Client::new(), "us-east-1");
        assert_eq!(idp.endpoint(), "https://cognito-idp.us-east-1.amazonaws.com/");
    }
}
