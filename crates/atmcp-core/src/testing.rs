//! In-memory protocol client for tests.
//!
//! Issues numbered tokens (`access-1`, `refresh-1`, ...), counts every
//! capability call, and can be told to treat the tokens issued so far as
//! expired so recovery paths can be exercised without a network.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use url::Url;

use crate::protocol::{ProtocolClient, ProtocolError, XrpcRequest};
use crate::session::{Identity, Session, TokenPair};

/// Custom response for [`ProtocolClient::call`]
pub type CallHandler =
    Arc<dyn Fn(&Identity, &XrpcRequest) -> Result<Value, ProtocolError> + Send + Sync>;

/// One recorded `call` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Method NSID
    pub nsid: String,
    /// Whether the authenticated identity was used
    pub authenticated: bool,
    /// DID of the acting identity, if any
    pub did: Option<String>,
}

/// Scriptable [`ProtocolClient`] double
pub struct MockProtocolClient {
    did: String,
    next_token: AtomicUsize,
    issued: Mutex<Vec<String>>,
    expired: Mutex<HashSet<String>>,
    fail_login: AtomicBool,
    fail_refresh: AtomicBool,
    refresh_delay: Mutex<Duration>,
    handler: Mutex<Option<CallHandler>>,
    calls: Mutex<Vec<RecordedCall>>,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    resume_calls: AtomicUsize,
    endpoint: Url,
}

impl std::fmt::Debug for MockProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProtocolClient")
            .field("did", &self.did)
            .field("login_calls", &self.login_calls())
            .field("refresh_calls", &self.refresh_calls())
            .field("call_count", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl Default for MockProtocolClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProtocolClient {
    /// Create a mock that accepts every login
    pub fn new() -> Self {
        Self {
            did: "did:plc:mockuser".to_string(),
            next_token: AtomicUsize::new(1),
            issued: Mutex::new(Vec::new()),
            expired: Mutex::new(HashSet::new()),
            fail_login: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            refresh_delay: Mutex::new(Duration::ZERO),
            handler: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            resume_calls: AtomicUsize::new(0),
            endpoint: Url::parse("wss://jetstream.test/subscribe").expect("static url"),
        }
    }

    /// Replace the default `call` response
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&Identity, &XrpcRequest) -> Result<Value, ProtocolError> + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Make subsequent logins fail
    pub fn set_fail_login(&self, fail: bool) {
        self.fail_login.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent refreshes fail
    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Delay every refresh, widening the window for concurrent callers
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    /// Treat every token issued so far as expired
    pub fn expire_issued_tokens(&self) {
        let issued = self.issued.lock().clone();
        self.expired.lock().extend(issued);
    }

    /// Treat one token as expired
    pub fn expire_token(&self, token: &str) {
        self.expired.lock().insert(token.to_string());
    }

    /// Number of `login` invocations
    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    /// Number of `refresh_session` invocations
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of `resume_session` invocations
    pub fn resume_calls(&self) -> usize {
        self.resume_calls.load(Ordering::SeqCst)
    }

    /// Number of `call` invocations
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every recorded `call`
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn issue_session(&self, handle: &str) -> Session {
        let n = self.next_token.fetch_add(1, Ordering::SeqCst);
        let access = format!("access-{n}");
        let refresh = format!("refresh-{n}");
        self.issued.lock().extend([access.clone(), refresh.clone()]);
        Session::new(self.did.clone(), handle, access, refresh)
    }

    fn is_expired(&self, token: &SecretString) -> bool {
        self.expired.lock().contains(token.expose_secret())
    }

    fn expired_error() -> ProtocolError {
        ProtocolError::http(400, Some("ExpiredToken".to_string()), "Token has expired")
    }
}

#[async_trait]
impl ProtocolClient for MockProtocolClient {
    async fn login(
        &self,
        identifier: &str,
        _secret: &SecretString,
    ) -> Result<Session, ProtocolError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(ProtocolError::http(
                401,
                Some("AuthenticationRequired".to_string()),
                "Invalid identifier or password",
            ));
        }
        Ok(self.issue_session(identifier))
    }

    async fn resume_session(&self, tokens: &TokenPair) -> Result<Session, ProtocolError> {
        self.resume_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_expired(&tokens.access_token) {
            return Err(Self::expired_error());
        }
        let refresh = tokens
            .refresh_token
            .as_ref()
            .map(|t| t.expose_secret().clone())
            .unwrap_or_default();
        Ok(Session::new(
            self.did.clone(),
            "mockuser.test",
            tokens.access_token.expose_secret().clone(),
            refresh,
        ))
    }

    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<Session, ProtocolError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) || self.is_expired(refresh_token) {
            return Err(ProtocolError::http(
                400,
                Some("ExpiredToken".to_string()),
                "Refresh token has been revoked",
            ));
        }
        Ok(self.issue_session("mockuser.test"))
    }

    async fn call(
        &self,
        identity: &Identity,
        request: XrpcRequest,
    ) -> Result<Value, ProtocolError> {
        self.calls.lock().push(RecordedCall {
            nsid: request.nsid.clone(),
            authenticated: identity.is_authenticated(),
            did: identity.did().map(str::to_string),
        });
        if let Identity::Authenticated(auth) = identity
            && self.is_expired(&auth.access_token)
        {
            return Err(Self::expired_error());
        }
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(identity, &request),
            None => Ok(json!({
                "nsid": request.nsid,
                "authenticated": identity.is_authenticated(),
            })),
        }
    }

    fn event_stream_endpoint(&self) -> Url {
        self.endpoint.clone()
    }
}
