//! Authentication configuration types.
//!
//! These are plain deserializable settings; the server crate nests
//! [`AuthSettings`] under its `auth` section and the `config` crate fills
//! them from files and `ATMCP_AUTH__*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Authentication settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Account identifier (handle, DID or email) for password login
    pub identifier: Option<String>,
    /// App password for password login
    pub password: Option<SecretString>,
    /// Delegated-grant client settings
    pub grant: Option<GrantSettings>,
    /// Where to persist delegated grants between runs (memory only when unset)
    pub grant_store_path: Option<PathBuf>,
}

/// OAuth 2.1 client settings for the delegated-grant flow
#[derive(Debug, Clone, Deserialize)]
pub struct GrantSettings {
    /// Client ID (for atproto, the client metadata URL)
    pub client_id: String,
    /// Client secret; empty for public clients
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    /// Redirect URI registered for the client
    pub redirect_uri: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Token revocation endpoint (RFC 7009)
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    /// Scopes to request
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// How long a pending authorization stays valid
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    /// How often stale pending authorizations are swept
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl GrantSettings {
    /// Settings with default scopes and timings
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            revocation_endpoint: None,
            scopes: default_scopes(),
            pending_ttl_secs: default_pending_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }

    /// Pending authorization lifetime
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    /// Sweep period for stale authorizations
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_scopes() -> Vec<String> {
    vec!["atproto".to_string(), "transition:generic".to_string()]
}

/// 30 minutes
fn default_pending_ttl_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}
