//! Session and identity types shared by the session manager, the dispatcher
//! and protocol clients.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Live credential state of the authenticated identity
#[derive(Debug, Clone)]
pub struct Session {
    /// Stable decentralized identifier (`did:plc:...`)
    pub did: String,
    /// Display handle (`alice.bsky.social`)
    pub handle: String,
    /// Short-lived access token
    pub access_token: SecretString,
    /// Refresh token
    pub refresh_token: SecretString,
    /// True only while both tokens are believed valid
    pub active: bool,
}

impl Session {
    /// Create an active session
    pub fn new(
        did: impl Into<String>,
        handle: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            did: did.into(),
            handle: handle.into(),
            access_token: SecretString::new(access_token.into()),
            refresh_token: SecretString::new(refresh_token.into()),
            active: true,
        }
    }

    /// The token pair backing this session
    pub fn tokens(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: Some(self.refresh_token.clone()),
        }
    }

    /// Public view of the session, without tokens
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            did: self.did.clone(),
            handle: self.handle.clone(),
            active: self.active,
        }
    }
}

/// Token-free session description safe to hand to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Decentralized identifier
    pub did: String,
    /// Handle
    pub handle: String,
    /// Whether the session is active
    pub active: bool,
}

/// Access/refresh token pair used to resume a session
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Access token
    pub access_token: SecretString,
    /// Refresh token, when the issuer handed one out
    pub refresh_token: Option<SecretString>,
}

impl TokenPair {
    /// Create a token pair
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: refresh_token.map(SecretString::new),
        }
    }
}

/// The network identity an operation executes under
#[derive(Debug, Clone)]
pub enum Identity {
    /// Credential-free identity for public reads
    Anonymous,
    /// Identity bound to the active session
    Authenticated(AuthenticatedIdentity),
}

impl Identity {
    /// Whether this is the authenticated identity
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// DID of the acting account, if authenticated
    pub fn did(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(auth) => Some(&auth.did),
        }
    }

    /// Session generation this identity was issued under
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(auth) => Some(auth.generation),
        }
    }
}

/// Snapshot of the authenticated identity
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    /// Decentralized identifier
    pub did: String,
    /// Handle
    pub handle: String,
    /// Bearer token for requests
    pub access_token: SecretString,
    /// Session generation the token belongs to
    pub generation: u64,
}

impl AuthenticatedIdentity {
    /// Build from a session and its generation
    pub fn from_session(session: &Session, generation: u64) -> Self {
        Self {
            did: session.did.clone(),
            handle: session.handle.clone(),
            access_token: session.access_token.clone(),
            generation,
        }
    }

    /// Authorization header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }
}
