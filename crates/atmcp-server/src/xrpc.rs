//! XRPC protocol client over HTTP
//!
//! Anonymous requests go to the public AppView; authenticated requests and
//! the `com.atproto.server.*Session` endpoints go to the account's PDS with a
//! bearer token. Non-2xx responses become [`ProtocolError`]s carrying the
//! status, the XRPC `error` name, and any retry hint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};
use url::Url;

use atmcp_core::{
    Identity, ProtocolClient, ProtocolError, Session, TokenPair, XrpcMethod, XrpcRequest,
};

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const GET_SESSION: &str = "com.atproto.server.getSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";

/// HTTP implementation of [`ProtocolClient`]
#[derive(Debug, Clone)]
pub struct XrpcClient {
    http: reqwest::Client,
    service_url: Url,
    public_url: Url,
    stream_endpoint: Url,
}

/// `{error, message}` error body
#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    did: String,
    handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    did: String,
    handle: String,
}

impl XrpcClient {
    /// Build a client with the given request timeout
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed (TLS backend).
    pub fn new(
        service_url: Url,
        public_url: Url,
        stream_endpoint: Url,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("atmcp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            service_url,
            public_url,
            stream_endpoint,
        })
    }

    fn endpoint(base: &Url, nsid: &str) -> Url {
        let mut url = base.clone();
        let path = format!("{}/xrpc/{nsid}", base.path().trim_end_matches('/'));
        url.set_path(&path);
        url
    }

    async fn send(&self, nsid: &str, builder: RequestBuilder) -> Result<Value, ProtocolError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        trace!(nsid, status = status.as_u16(), "XRPC response");

        if status.is_success() {
            return read_body(response).await;
        }
        Err(error_from_response(response).await)
    }

    async fn session_call(
        &self,
        nsid: &str,
        bearer: Option<&SecretString>,
        body: Option<Value>,
    ) -> Result<Value, ProtocolError> {
        let url = Self::endpoint(&self.service_url, nsid);
        let mut builder = match body {
            Some(body) => self.http.post(url).json(&body),
            None if nsid == GET_SESSION => self.http.get(url),
            None => self.http.post(url),
        };
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }
        self.send(nsid, builder).await
    }
}

#[async_trait]
impl ProtocolClient for XrpcClient {
    async fn login(
        &self,
        identifier: &str,
        secret: &SecretString,
    ) -> Result<Session, ProtocolError> {
        debug!(identifier, "Creating session");
        let body = json!({
            "identifier": identifier,
            "password": secret.expose_secret(),
        });
        let value = self.session_call(CREATE_SESSION, None, Some(body)).await?;
        session_from(value)
    }

    async fn resume_session(&self, tokens: &TokenPair) -> Result<Session, ProtocolError> {
        let value = self
            .session_call(GET_SESSION, Some(&tokens.access_token), None)
            .await?;
        let info: SessionInfo = serde_json::from_value(value)
            .map_err(|e| ProtocolError::decode(format!("Invalid getSession response: {e}")))?;
        let refresh = tokens
            .refresh_token
            .as_ref()
            .map(|t| t.expose_secret().clone())
            .unwrap_or_default();
        Ok(Session::new(
            info.did,
            info.handle,
            tokens.access_token.expose_secret().clone(),
            refresh,
        ))
    }

    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<Session, ProtocolError> {
        let value = self
            .session_call(REFRESH_SESSION, Some(refresh_token), None)
            .await?;
        session_from(value)
    }

    async fn call(
        &self,
        identity: &Identity,
        request: XrpcRequest,
    ) -> Result<Value, ProtocolError> {
        let base = match identity {
            Identity::Anonymous => &self.public_url,
            Identity::Authenticated(_) => &self.service_url,
        };
        let url = Self::endpoint(base, &request.nsid);

        let mut builder = match request.method {
            XrpcMethod::Query => self.http.get(url).query(&request.params),
            XrpcMethod::Procedure => {
                let builder = self.http.post(url).query(&request.params);
                match &request.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };
        if let Identity::Authenticated(auth) = identity {
            builder = builder.header(AUTHORIZATION, auth.bearer());
        }

        self.send(&request.nsid, builder).await
    }

    fn event_stream_endpoint(&self) -> Url {
        self.stream_endpoint.clone()
    }
}

fn session_from(value: Value) -> Result<Session, ProtocolError> {
    let body: SessionBody = serde_json::from_value(value)
        .map_err(|e| ProtocolError::decode(format!("Invalid session response: {e}")))?;
    Ok(Session::new(
        body.did,
        body.handle,
        body.access_jwt,
        body.refresh_jwt,
    ))
}

async fn read_body(response: Response) -> Result<Value, ProtocolError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| ProtocolError::decode(format!("Invalid JSON response: {e}")))
}

async fn error_from_response(response: Response) -> ProtocolError {
    let status = response.status();
    let retry_after = retry_after(response.headers());
    let body: XrpcErrorBody = response
        .bytes()
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default();

    let message = body
        .message
        .or_else(|| body.error.clone())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
    ProtocolError::http(status.as_u16(), body.error, message).with_retry_after(retry_after)
}

fn transport_error(err: reqwest::Error) -> ProtocolError {
    if err.is_decode() {
        ProtocolError::decode(err.to_string())
    } else {
        ProtocolError::transport(err.to_string())
    }
}

/// Retry hint from `Retry-After` (seconds) or `RateLimit-Reset` (epoch seconds)
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(seconds) = header(RETRY_AFTER.as_str()) {
        return Some(Duration::from_secs(seconds.max(0) as u64));
    }
    header("ratelimit-reset").map(|reset| {
        let remaining = reset - chrono::Utc::now().timestamp();
        Duration::from_secs(remaining.max(0) as u64)
    })
}
