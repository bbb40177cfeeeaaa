//! Capability interface to the protocol client.
//!
//! The access layer never touches record formats; it needs exactly five
//! capabilities from the wrapped client: password login, session resume,
//! session refresh, a generic request surface for either identity, and the
//! change-feed socket endpoint.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use url::Url;

use crate::error::AtError;
use crate::session::{Identity, Session, TokenPair};

/// XRPC error names that mean the bearer token is no longer usable
pub const EXPIRED_TOKEN_CODES: &[&str] = &[
    "ExpiredToken",
    "InvalidToken",
    "AuthMissing",
    "AuthenticationRequired",
];

/// Whether an XRPC method reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrpcMethod {
    /// HTTP GET with query parameters
    Query,
    /// HTTP POST with a JSON body
    Procedure,
}

/// A single request against the protocol's generic call surface
#[derive(Debug, Clone, PartialEq)]
pub struct XrpcRequest {
    /// Method NSID, e.g. `app.bsky.actor.getProfile`
    pub nsid: String,
    /// Query or procedure
    pub method: XrpcMethod,
    /// Query parameters (repeated keys allowed)
    pub params: Vec<(String, String)>,
    /// JSON input for procedures
    pub body: Option<Value>,
}

impl XrpcRequest {
    /// Start a query request
    pub fn query(nsid: impl Into<String>) -> Self {
        Self {
            nsid: nsid.into(),
            method: XrpcMethod::Query,
            params: Vec::new(),
            body: None,
        }
    }

    /// Start a procedure request with a JSON body
    pub fn procedure(nsid: impl Into<String>, body: Value) -> Self {
        Self {
            nsid: nsid.into(),
            method: XrpcMethod::Procedure,
            params: Vec::new(),
            body: Some(body),
        }
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Add a query parameter when present
    pub fn param_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }
}

/// Raw failure from the protocol client, before classification
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolError {
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// XRPC error name from the response body
    pub code: Option<String>,
    /// Human-readable message
    pub message: String,
    /// Retry hint from `Retry-After` / `RateLimit-Reset`
    pub retry_after: Option<Duration>,
    /// True when no response was received at all
    pub transport: bool,
}

impl ProtocolError {
    /// Error response from the server
    pub fn http(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code,
            message: message.into(),
            retry_after: None,
            transport: false,
        }
    }

    /// Connection-level failure, no response received
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
            transport: true,
        }
    }

    /// Response received but could not be decoded
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
            transport: false,
        }
    }

    /// Attach a retry hint
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Whether the server rejected the bearer token itself
    pub fn is_expired_token(&self) -> bool {
        self.status == Some(401)
            || self
                .code
                .as_deref()
                .is_some_and(|code| EXPIRED_TOKEN_CODES.contains(&code))
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "{status} {code}: {}", self.message),
            (Some(status), None) => write!(f, "{status}: {}", self.message),
            (None, _) if self.transport => write!(f, "transport error: {}", self.message),
            (None, _) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Map a raw protocol failure onto the error taxonomy.
///
/// This is the only place status codes and XRPC error names are interpreted.
pub fn classify(err: &ProtocolError) -> AtError {
    let message = err.to_string();
    let Some(status) = err.status else {
        return if err.transport {
            AtError::network(message)
        } else {
            AtError::unknown(message)
        };
    };

    if err.is_expired_token() {
        return AtError::authentication(message);
    }
    if status == 429 {
        return AtError::rate_limited(message, err.retry_after);
    }
    if status == 403 {
        return AtError::authorization(message);
    }
    if status == 404
        || err
            .code
            .as_deref()
            .is_some_and(|code| code.ends_with("NotFound"))
    {
        return AtError::not_found(message);
    }
    if (400..500).contains(&status) {
        return AtError::validation(message);
    }
    AtError::unknown(message)
}

impl From<ProtocolError> for AtError {
    fn from(err: ProtocolError) -> Self {
        classify(&err)
    }
}

/// The five capabilities the access layer consumes from the protocol client
#[async_trait]
pub trait ProtocolClient: Send + Sync + fmt::Debug {
    /// Password login, creating a fresh session
    async fn login(&self, identifier: &str, secret: &SecretString)
    -> Result<Session, ProtocolError>;

    /// Bind a session to an existing token pair
    async fn resume_session(&self, tokens: &TokenPair) -> Result<Session, ProtocolError>;

    /// Exchange a refresh token for a new session
    async fn refresh_session(&self, refresh_token: &SecretString)
    -> Result<Session, ProtocolError>;

    /// Issue a request under the given identity
    async fn call(&self, identity: &Identity, request: XrpcRequest) -> Result<Value, ProtocolError>;

    /// Socket endpoint of the change feed
    fn event_stream_endpoint(&self) -> Url;
}
