//! Bearer-token cache with serialised refresh.
//!
//! Readers take the fast path through a read lock and never wait on a
//! refresh in progress while the cached token is still valid. Login and
//! refresh happen under a single async mutex and re-check the session after
//! acquiring it, so concurrent callers racing an expiry issue one
//! identity-provider exchange between them.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::identity::{
    AuthFlow, AuthResponse, AuthenticationResult, IdentityProvider, InitiateAuthRequest,
    RespondToAuthChallengeRequest,
};
use super::srp::SrpClient;
use crate::context::Context;
use crate::error::ProviderError;

const PASSWORD_VERIFIER: &str = "PASSWORD_VERIFIER";

/// Tokens are refreshed this long before their `exp` claim.
pub const DEFAULT_REFRESH_MARGIN: std::time::Duration = std::time::Duration::from_secs(60);

/// Login credentials for the user pool.
#[derive(Clone)]
pub struct Credentials {
    /// The user pool id, `<region>_<pool>`.
    pub user_pool_id: String,
    /// The app client id.
    pub client_id: String,
    /// The login name.
    pub username: String,
    /// The password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_pool_id", &self.user_pool_id)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
struct AuthSession {
    access_token: String,
    refresh_token: Option<String>,
    expiration: DateTime<Utc>,
}

/// Observable state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token has been obtained yet, or the last exchange failed.
    Uninitialised,
    /// A token is cached and valid beyond the refresh margin.
    Active,
    /// A token is cached but due for refresh.
    Expired,
}

/// Shared authenticator handing out bearer tokens.
pub struct Authenticator {
    credentials: Credentials,
    identity: Arc<dyn IdentityProvider>,
    session: RwLock<Option<AuthSession>>,
    refresh_lock: Mutex<()>,
    refresh_margin: Duration,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("credentials", &self.credentials)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Create an authenticator. No network traffic happens until the
    /// first token is requested.
    pub fn new(credentials: Credentials, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            credentials,
            identity,
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_margin: Duration::seconds(DEFAULT_REFRESH_MARGIN.as_secs() as i64),
        }
    }

    /// Override how long before expiry a token is refreshed.
    pub fn with_refresh_margin(mut self, margin: std::time::Duration) -> Self {
        self.refresh_margin = Duration::seconds(margin.as_secs() as i64);
        self
    }

    /// The configured login name.
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        match self.read_session() {
            None => SessionState::Uninitialised,
            Some(session) if self.is_fresh(&session) => SessionState::Active,
            Some(_) => SessionState::Expired,
        }
    }

    /// Expiration of the cached token, if any.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.read_session().map(|s| s.expiration)
    }

    /// A valid access token, logging in or refreshing as needed.
    ///
    /// The token is sent verbatim as the `Authorization` header value.
    pub async fn access_token(&self, ctx: &Context) -> Result<String, ProviderError> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let _guard = ctx
            .run("waiting for token refresh", async {
                Ok(self.refresh_lock.lock().await)
            })
            .await?;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let refresh_token = self.read_session().and_then(|s| s.refresh_token);
        let result = match refresh_token {
            Some(refresh_token) => match self.refresh(ctx, &refresh_token).await {
                Err(ProviderError::AuthRejected(reason)) => {
                    warn!(reason = %reason, "Refresh token rejected, logging in again");
                    self.login(ctx).await
                },
                other => other.map(|session| (session, Some(refresh_token))),
            },
            None => self.login(ctx).await,
        };

        match result {
            Ok((mut session, fallback_refresh)) => {
                if session.refresh_token.is_none() {
                    session.refresh_token = fallback_refresh;
                }
                let token = session.access_token.clone();
                debug!(expiration = %session.expiration, "Stored new access token");
                *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
                Ok(token)
            },
            Err(err @ ProviderError::Cancelled(_)) => Err(err),
            Err(err) => {
                warn!(error = %err, "Token exchange failed, clearing session");
                *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
                Err(err)
            },
        }
    }

    #[instrument(skip(self, ctx), fields(username = %self.credentials.username), name = "auth.login")]
    async fn login(&self, ctx: &Context) -> Result<(AuthSession, Option<String>), ProviderError> {
        let srp = SrpClient::new(&self.credentials.user_pool_id)?;

        let challenge = self
            .identity
            .initiate_auth(
                ctx,
                InitiateAuthRequest {
                    auth_flow: AuthFlow::UserSrpAuth,
                    client_id: self.credentials.client_id.clone(),
                    auth_parameters: BTreeMap::from([
                        ("USERNAME".to_string(), self.credentials.username.clone()),
                        ("SRP_A".to_string(), srp.srp_a()),
                    ]),
                },
            )
            .await?;

        if let Some(result) = challenge.authentication_result {
            return Ok((session_from(result)?, None));
        }
        match challenge.challenge_name.as_deref() {
            Some(PASSWORD_VERIFIER) => {},
            Some(other) => return Err(ProviderError::AuthChallengeUnknown(other.to_string())),
            None => {
                return Err(ProviderError::AuthUnavailable(
                    "identity provider returned neither tokens nor a challenge".to_string(),
                ))
            },
        }

        let params = &challenge.challenge_parameters;
        let user_id = challenge_parameter(params, "USER_ID_FOR_SRP")?;
        let secret_block = challenge_parameter(params, "SECRET_BLOCK")?;
        let claim = srp.password_claim(
            user_id,
            &self.credentials.password,
            challenge_parameter(params, "SALT")?,
            challenge_parameter(params, "SRP_B")?,
            secret_block,
            Utc::now(),
        )?;

        let response = self
            .identity
            .respond_to_auth_challenge(
                ctx,
                RespondToAuthChallengeRequest {
                    challenge_name: PASSWORD_VERIFIER.to_string(),
                    client_id: self.credentials.client_id.clone(),
                    challenge_responses: BTreeMap::from([
                        ("USERNAME".to_string(), user_id.to_string()),
                        ("TIMESTAMP".to_string(), claim.timestamp),
                        ("PASSWORD_CLAIM_SECRET_BLOCK".to_string(), secret_block.to_string()),
                        ("PASSWORD_CLAIM_SIGNATURE".to_string(), claim.signature),
                    ]),
                    session: challenge.session,
                },
            )
            .await?;

        let session = tokens_from(response)?;
        info!(expiration = %session.expiration, "Logged in to identity provider");
        Ok((session, None))
    }

    #[instrument(skip_all, name = "auth.refresh")]
    async fn refresh(&self, ctx: &Context, refresh_token: &str) -> Result<AuthSession, ProviderError> {
        let response = self
            .identity
            .initiate_auth(
                ctx,
                InitiateAuthRequest {
                    auth_flow: AuthFlow::RefreshTokenAuth,
                    client_id: self.credentials.client_id.clone(),
                    auth_parameters: BTreeMap::from([(
                        "REFRESH_TOKEN".to_string(),
                        refresh_token.to_string(),
                    )]),
                },
            )
            .await?;
        let session = tokens_from(response)?;
        info!(expiration = %session.expiration, "Refreshed access token");
        Ok(session)
    }

    fn read_session(&self) -> Option<AuthSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fresh_token(&self) -> Option<String> {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|s| self.is_fresh(s))
            .map(|s| s.access_token.clone())
    }

    fn is_fresh(&self, session: &AuthSession) -> bool {
        Utc::now() + self.refresh_margin < session.expiration
    }
}

fn challenge_parameter<'a>(
    params: &'a BTreeMap<String, String>,
    name: &str,
) -> Result<&'a str, ProviderError> {
    params.get(name).map(String::as_str).ok_or_else(|| {
        ProviderError::AuthUnavailable(format!("challenge is missing the {} parameter", name))
    })
}

fn tokens_from(response: AuthResponse) -> Result<AuthSession, ProviderError> {
    match (response.authentication_result, response.challenge_name) {
        (Some(result), _) => session_from(result),
        (None, Some(challenge)) => Err(ProviderError::AuthChallengeUnknown(challenge)),
        (None, None) => Err(ProviderError::AuthUnavailable(
            "identity provider returned no tokens".to_string(),
        )),
    }
}

fn session_from(result: AuthenticationResult) -> Result<AuthSession, ProviderError> {
    let expiration = token_expiration(&result.access_token)?;
    Ok(AuthSession {
        access_token: result.access_token,
        refresh_token: result.refresh_token,
        expiration,
    })
}

#[derive(Deserialize)]
struct Claims {
    exp: i64,
}

/// The `exp` claim of a JWT access token.
pub fn token_expiration(token: &str) -> Result<DateTime<Utc>, ProviderError> {
    let malformed = |why: &str| {
        ProviderError::AuthUnavailable(format!("identity provider issued a malformed access token: {}", why))
    };
    let payload = token.split('.').nth(1).ok_or_else(|| malformed("not a JWT"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| malformed("payload is not base64"))?;
    let claims: Claims =
        serde_json::from_slice(&bytes).map_err(|_| malformed("payload has no exp claim"))?;
    DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| malformed("exp is out of range"))
}
