//! OAuth 2.1 client for the delegated-grant flow.
//!
//! Authorization code with PKCE (RFC 7636, S256 only), refresh with token
//! rotation, and best-effort revocation (RFC 7009). The token endpoint of an
//! AT Protocol authorization server reports the account DID as `sub`, which
//! is captured through [`SubjectTokenFields`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AccessToken, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointMaybeSet,
    EndpointNotSet, EndpointSet, ExtraTokenFields, HttpClientError, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, RevocationUrl, Scope,
    StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::GrantError;
use super::pending::{PendingAuthorization, PendingAuthorizations};
use crate::config::GrantSettings;

/// Extra token response fields returned by AT Protocol authorization servers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectTokenFields {
    /// Account DID the grant was issued for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl ExtraTokenFields for SubjectTokenFields {}

type GrantTokenResponse = StandardTokenResponse<SubjectTokenFields, BasicTokenType>;

type OAuthClient = oauth2::Client<
    BasicErrorResponse,
    GrantTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointSet,
>;

/// Start of an interactive authorization
#[derive(Debug, Clone)]
pub struct AuthorizationStart {
    /// URL the user must open
    pub url: Url,
    /// Opaque state echoed back on the callback
    pub state: String,
}

/// Tokens obtained from the token endpoint
#[derive(Debug, Clone)]
pub struct GrantTokens {
    /// Access token
    pub access_token: SecretString,
    /// Refresh token (rotated on every refresh when the server supports it)
    pub refresh_token: Option<SecretString>,
    /// Account DID
    pub subject: Option<String>,
    /// Absolute access token expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes, space separated
    pub scope: Option<String>,
}

/// Delegated-grant client
#[derive(Debug, Clone)]
pub struct GrantClient {
    oauth: OAuthClient,
    http: reqwest::Client,
    pending: Arc<PendingAuthorizations>,
    scopes: Vec<String>,
    sweep_interval: Duration,
}

impl GrantClient {
    /// Build a client from settings
    ///
    /// # Errors
    ///
    /// Returns [`GrantError::Configuration`] when an endpoint or the redirect
    /// URI is malformed or not acceptable.
    pub fn new(settings: &GrantSettings) -> Result<Self, GrantError> {
        let auth_url = AuthUrl::new(settings.authorization_endpoint.clone())
            .map_err(|e| GrantError::Configuration(format!("Invalid authorization URL: {e}")))?;
        let token_url = TokenUrl::new(settings.token_endpoint.clone())
            .map_err(|e| GrantError::Configuration(format!("Invalid token URL: {e}")))?;
        let revocation_url = settings
            .revocation_endpoint
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| RevocationUrl::new(s.clone()))
            .transpose()
            .map_err(|e| GrantError::Configuration(format!("Invalid revocation URL: {e}")))?;
        let redirect_url = Self::validate_redirect_uri(&settings.redirect_uri)?;

        let mut oauth: OAuthClient = oauth2::Client::new(ClientId::new(settings.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_revocation_url_option(revocation_url)
            .set_redirect_uri(redirect_url);

        if let Some(secret) = settings
            .client_secret
            .as_ref()
            .filter(|s| !s.expose_secret().is_empty())
        {
            oauth = oauth.set_client_secret(ClientSecret::new(secret.expose_secret().clone()));
        }

        // Following redirects from the token endpoint would leak the code
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GrantError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            oauth,
            http,
            pending: Arc::new(PendingAuthorizations::new(settings.pending_ttl())),
            scopes: settings.scopes.clone(),
            sweep_interval: settings.sweep_interval(),
        })
    }

    /// Redirect URI validation: https anywhere, http only on loopback, no fragment
    fn validate_redirect_uri(uri: &str) -> Result<RedirectUrl, GrantError> {
        let parsed = Url::parse(uri)
            .map_err(|e| GrantError::Configuration(format!("Invalid redirect URI format: {e}")))?;

        match parsed.scheme() {
            "https" => {}
            "http" => {
                let is_loopback = matches!(
                    parsed.host_str(),
                    Some("localhost" | "127.0.0.1" | "[::1]")
                );
                if !is_loopback {
                    return Err(GrantError::Configuration(
                        "HTTP redirect URIs are only allowed for loopback hosts".to_string(),
                    ));
                }
            }
            scheme => {
                return Err(GrantError::Configuration(format!(
                    "Unsupported redirect URI scheme: {scheme}. Use https or http on loopback"
                )));
            }
        }

        if parsed.fragment().is_some() {
            return Err(GrantError::Configuration(
                "Redirect URI must not contain URL fragment".to_string(),
            ));
        }

        RedirectUrl::new(uri.to_string())
            .map_err(|e| GrantError::Configuration(format!("Invalid redirect URI: {e}")))
    }

    /// Begin an authorization: returns the URL to open and its `state`.
    ///
    /// The PKCE verifier stays in the pending map until the callback arrives
    /// or the entry expires.
    pub fn start_authorization(&self, subject_hint: Option<&str>) -> AuthorizationStart {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = self
            .oauth
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(challenge);
        if let Some(hint) = subject_hint {
            request = request.add_extra_param("login_hint", hint.to_string());
        }
        let (url, state) = request.url();

        self.pending.insert(
            state.secret().clone(),
            PendingAuthorization::new(
                SecretString::new(verifier.secret().clone()),
                subject_hint.map(str::to_string),
            ),
        );
        debug!(pending = self.pending.len(), "Authorization started");

        AuthorizationStart {
            url,
            state: state.secret().clone(),
        }
    }

    /// Exchange the code from the redirect for tokens.
    ///
    /// The pending entry is consumed before the exchange, so a `state` can be
    /// redeemed at most once even if the exchange fails.
    ///
    /// # Errors
    ///
    /// [`GrantError::InvalidOrExpiredAuthorization`] for an unknown, used or
    /// stale `state`; otherwise the classified exchange failure.
    pub async fn handle_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<GrantTokens, GrantError> {
        let pending = self
            .pending
            .take(state)
            .ok_or(GrantError::InvalidOrExpiredAuthorization)?;

        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(
                pending.code_verifier.expose_secret().clone(),
            ))
            .request_async(&self.http)
            .await
            .map_err(map_token_error)?;

        let tokens = Self::tokens_from_response(&response, None);
        info!(subject = ?tokens.subject, "Delegated grant issued");
        Ok(tokens)
    }

    /// Refresh the grant. A rotated refresh token replaces the old one; when
    /// the server omits it, the old one is kept.
    ///
    /// # Errors
    ///
    /// Returns the classified token endpoint failure.
    pub async fn refresh_tokens(
        &self,
        refresh_token: &SecretString,
    ) -> Result<GrantTokens, GrantError> {
        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.expose_secret().clone()))
            .request_async(&self.http)
            .await
            .map_err(map_token_error)?;

        Ok(Self::tokens_from_response(&response, Some(refresh_token)))
    }

    /// Revoke the grant (RFC 7009), refresh token preferred. Failures are
    /// logged and swallowed.
    pub async fn revoke_tokens(
        &self,
        access_token: &SecretString,
        refresh_token: Option<&SecretString>,
    ) {
        let token: StandardRevocableToken = match refresh_token {
            Some(refresh) => RefreshToken::new(refresh.expose_secret().clone()).into(),
            None => AccessToken::new(access_token.expose_secret().clone()).into(),
        };

        let request = match self.oauth.revoke_token(token) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Token revocation not configured, skipping");
                return;
            }
        };

        match request.request_async(&self.http).await {
            Ok(()) => info!("Delegated grant revoked"),
            Err(e) => warn!(error = %e, "Token revocation failed"),
        }
    }

    /// Drop stale pending authorizations
    pub fn sweep_pending(&self) -> usize {
        let removed = self.pending.sweep();
        if removed > 0 {
            debug!(removed, "Swept stale authorization requests");
        }
        removed
    }

    /// Number of outstanding authorizations
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Spawn the periodic sweep of stale pending authorizations
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = pending.sweep();
                if removed > 0 {
                    debug!(removed, "Swept stale authorization requests");
                }
            }
        })
    }

    fn tokens_from_response(
        response: &GrantTokenResponse,
        previous_refresh: Option<&SecretString>,
    ) -> GrantTokens {
        let expires_at = response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);

        GrantTokens {
            access_token: SecretString::new(response.access_token().secret().clone()),
            refresh_token: response
                .refresh_token()
                .map(|t| SecretString::new(t.secret().clone()))
                .or_else(|| previous_refresh.cloned()),
            subject: response.extra_fields().sub.clone(),
            expires_at,
            scope: response.scopes().map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }),
        }
    }
}

fn map_token_error(
    err: RequestTokenError<HttpClientError<reqwest::Error>, BasicErrorResponse>,
) -> GrantError {
    match err {
        RequestTokenError::ServerResponse(response) => GrantError::Rejected {
            error: response.error().to_string(),
            description: response.error_description().cloned(),
        },
        RequestTokenError::Request(e) => GrantError::Network(e.to_string()),
        RequestTokenError::Parse(e, _) => {
            GrantError::Exchange(format!("Invalid token response: {e}"))
        }
        RequestTokenError::Other(e) => GrantError::Exchange(e),
    }
}
