//! Authentication against the EchoStream user pool.
//!
//! - [`srp`]: Secure Remote Password arithmetic
//! - [`identity`]: the identity provider protocol and its HTTPS client
//! - [`session`]: the shared [`Authenticator`] caching bearer tokens

pub mod identity;
pub mod session;
pub mod srp;

pub use identity::{CognitoIdentityProvider, IdentityProvider};
pub use session::{Authenticator, Credentials, SessionState};

use crate::error::ProviderError;

/// The region half of a `<region>_<pool>` user pool id.
pub fn region_from_pool_id(user_pool_id: &str) -> Result<&str, ProviderError> {
    srp::pool_name(user_pool_id)?;
    user_pool_id
        .split_once('_')
        .map(|(region, _)| region)
        .ok_or_else(|| ProviderError::Configuration(format!("invalid user pool id '{}'", user_pool_id)))
}
