//! Delegated grants: authorization code + PKCE against the account's
//! authorization server.
//!
//! - [`client`] - the OAuth 2.1 client (authorize URL, code exchange, refresh, revocation)
//! - [`pending`] - short-lived proof material keyed by `state`
//! - [`store`] - persistence of the resulting grant

pub mod client;
pub mod pending;
pub mod store;

pub use client::{AuthorizationStart, GrantClient, GrantTokens};
pub use pending::{PendingAuthorization, PendingAuthorizations};
pub use store::{FileGrantStore, GrantStore, MemoryGrantStore, StoreError, StoredGrant};

use atmcp_core::AtError;
use thiserror::Error;

/// [`AtError::code`] of an unknown, consumed or stale authorization `state`;
/// the caller has to start a new authorization.
pub const AUTHORIZATION_EXPIRED: &str = "authorization_expired";

/// Delegated-grant errors
#[derive(Debug, Error)]
pub enum GrantError {
    /// The `state` is unknown, already used, or older than the pending TTL
    #[error("Authorization request is unknown or has expired")]
    InvalidOrExpiredAuthorization,

    /// Client settings are unusable (bad URLs, missing revocation endpoint)
    #[error("Grant configuration error: {0}")]
    Configuration(String),

    /// The authorization server answered with an OAuth error response
    #[error("Authorization server rejected the request: {error}{}", parenthesized(.description))]
    Rejected {
        error: String,
        description: Option<String>,
    },

    /// The authorization server could not be reached
    #[error("Authorization server unreachable: {0}")]
    Network(String),

    /// Any other exchange failure (unparseable response, unexpected status)
    #[error("Token exchange failed: {0}")]
    Exchange(String),
}

fn parenthesized(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl GrantError {
    /// True only for the unknown/consumed/stale `state` case
    pub fn is_invalid_authorization(&self) -> bool {
        matches!(self, Self::InvalidOrExpiredAuthorization)
    }
}

impl From<GrantError> for AtError {
    fn from(err: GrantError) -> Self {
        match &err {
            GrantError::InvalidOrExpiredAuthorization => AtError::validation(err.to_string())
                .with_fields(["state"])
                .with_code(AUTHORIZATION_EXPIRED),
            GrantError::Configuration(_) => AtError::validation(err.to_string()),
            GrantError::Rejected { .. } => AtError::authentication(err.to_string()),
            GrantError::Network(_) => AtError::network(err.to_string()),
            GrantError::Exchange(_) => AtError::unknown(err.to_string()),
        }
    }
}
