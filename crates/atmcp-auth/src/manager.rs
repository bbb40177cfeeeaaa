//! Session Manager
//!
//! Owns the anonymous and authenticated identities, performs the initial
//! login, and recovers an expired session: one refresh, then one full
//! re-authentication, then fall back to unauthenticated mode. Concurrent
//! expiry reports for the same session share a single recovery.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use atmcp_core::{
    AtError, AtResult, AuthenticatedIdentity, Identity, ProtocolClient, Session, SessionSummary,
    TokenPair,
};

use crate::config::{AuthSettings, GrantSettings};
use crate::credentials::{AuthMethod, CredentialResolver};
use crate::grant::{
    AuthorizationStart, FileGrantStore, GrantClient, GrantStore, GrantTokens, MemoryGrantStore,
    StoredGrant,
};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Session lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was established by login or grant exchange
    Created(SessionSummary),
    /// The session tokens were refreshed
    Updated(SessionSummary),
    /// The session was reported expired; recovery is under way
    Expired {
        /// DID of the expired session
        did: String,
    },
    /// The session was discarded
    Cleared,
}

/// Result of [`SessionManager::initialize`]
#[derive(Debug, Clone, PartialEq)]
pub enum InitOutcome {
    /// No credentials configured; public operations only
    Unauthenticated,
    /// A session is active
    Authenticated {
        /// Account DID
        did: String,
        /// Account handle
        handle: String,
    },
    /// Delegated grant configured but the user must authorize first
    AuthorizationRequired {
        /// Authorization URL to open
        url: String,
    },
    /// Credentials were present but authentication failed
    Failed(AtError),
}

/// Snapshot for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Whether an active session exists
    pub authenticated: bool,
    /// Whether credentials were configured
    pub has_credentials: bool,
    /// Configured method, if any
    pub method: Option<&'static str>,
    /// Active or inactive session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
    /// Outstanding delegated authorizations
    pub pending_authorizations: usize,
}

type RecoveryFuture = Shared<BoxFuture<'static, AtResult<SessionSummary>>>;

struct PendingRecovery {
    generation: u64,
    future: RecoveryFuture,
}

/// How the current session was obtained; decides refresh and revocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Origin {
    #[default]
    Password,
    Grant,
}

#[derive(Default)]
struct SessionState {
    session: Option<Session>,
    generation: u64,
    origin: Origin,
}

struct Inner {
    protocol: Arc<dyn ProtocolClient>,
    method: Option<AuthMethod>,
    grant: Option<Result<Arc<GrantClient>, AtError>>,
    store: Arc<dyn GrantStore>,
    state: RwLock<SessionState>,
    recovery: Mutex<Option<PendingRecovery>>,
    events: broadcast::Sender<SessionEvent>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Session manager handle; clones share state
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("SessionManager")
            .field("method", &self.inner.method.as_ref().map(AuthMethod::name))
            .field("session", &state.session.as_ref().map(Session::summary))
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager for the resolved method (or none) and grant store.
    ///
    /// Interactive authorization is available only when `method` is a grant;
    /// see [`Self::from_settings`] for password login with a grant client.
    pub fn new(
        protocol: Arc<dyn ProtocolClient>,
        method: Option<AuthMethod>,
        store: Arc<dyn GrantStore>,
    ) -> Self {
        let grant = match &method {
            Some(AuthMethod::Grant { settings, .. }) => Some(settings.clone()),
            _ => None,
        };
        Self::assemble(protocol, method, grant.as_ref(), store)
    }

    /// Resolve credentials and grant storage from settings.
    ///
    /// Configured grant settings always yield a grant client, so
    /// [`Self::start_authorization`] works even when password login wins.
    pub fn from_settings(protocol: Arc<dyn ProtocolClient>, settings: &AuthSettings) -> Self {
        let method = CredentialResolver::resolve(settings);
        let store: Arc<dyn GrantStore> = match &settings.grant_store_path {
            Some(path) => Arc::new(FileGrantStore::new(path.clone())),
            None => Arc::new(MemoryGrantStore::new()),
        };
        Self::assemble(protocol, method, CredentialResolver::grant_settings(settings), store)
    }

    fn assemble(
        protocol: Arc<dyn ProtocolClient>,
        method: Option<AuthMethod>,
        grant: Option<&GrantSettings>,
        store: Arc<dyn GrantStore>,
    ) -> Self {
        let grant = grant.map(|settings| {
            GrantClient::new(settings)
                .map(Arc::new)
                .map_err(AtError::from)
        });
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                protocol,
                method,
                grant,
                store,
                state: RwLock::new(SessionState::default()),
                recovery: Mutex::new(None),
                events,
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Establish the initial session.
    ///
    /// Never fails: missing credentials yield [`InitOutcome::Unauthenticated`]
    /// and authentication failures are logged and reported as
    /// [`InitOutcome::Failed`], leaving the manager unauthenticated.
    pub async fn initialize(&self) -> InitOutcome {
        let Some(method) = &self.inner.method else {
            info!("No credentials configured; running in unauthenticated mode");
            return InitOutcome::Unauthenticated;
        };
        info!(method = method.name(), "Authenticating");

        let result = match method {
            AuthMethod::Password {
                identifier,
                password,
            } => self
                .inner
                .password_login(identifier, password)
                .await
                .map(|session| self.inner.install(session, Origin::Password)),
            AuthMethod::Grant { .. } => self.initialize_grant().await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Authentication failed; continuing unauthenticated");
                InitOutcome::Failed(e)
            }
        }
    }

    async fn initialize_grant(&self) -> AtResult<InitOutcome> {
        let grant = self.inner.grant_client()?;

        match self.inner.store.load().await {
            Ok(Some(stored)) => {
                if let Some(summary) = self.inner.restore_grant(&grant, stored).await {
                    return Ok(summary);
                }
            }
            Ok(None) => debug!("No stored grant"),
            Err(e) => warn!(error = %e, "Could not load stored grant"),
        }

        let start = self.start_authorization()?;
        info!(url = %start.url, "Authorization required: open the URL to grant access");
        Ok(InitOutcome::AuthorizationRequired {
            url: start.url.to_string(),
        })
    }

    /// Start the pending-authorization sweep once, when a runtime is present
    fn ensure_sweeper(&self, grant: &GrantClient) {
        let mut sweeper = self.inner.sweeper.lock();
        if sweeper.is_none() && tokio::runtime::Handle::try_current().is_ok() {
            *sweeper = Some(grant.spawn_sweeper());
        }
    }

    /// Whether an active session exists
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .state
            .read()
            .session
            .as_ref()
            .is_some_and(|s| s.active)
    }

    /// Whether credentials of any method were configured
    pub fn has_credentials(&self) -> bool {
        self.inner.method.is_some()
    }

    /// Identity for an operation.
    ///
    /// Anonymous when authentication is not required; otherwise the active
    /// session, awaiting any recovery in flight first.
    ///
    /// # Errors
    ///
    /// Authentication error when required and no session is active.
    pub async fn identity_for(&self, require_auth: bool) -> AtResult<Identity> {
        if !require_auth {
            return Ok(Identity::Anonymous);
        }
        self.await_recovery().await;
        self.inner
            .current_identity()
            .ok_or_else(|| AtError::authentication("No active session; authenticate first"))
    }

    /// Authenticated identity when a session is active, anonymous otherwise
    pub async fn opportunistic_identity(&self) -> Identity {
        self.await_recovery().await;
        self.inner.current_identity().unwrap_or(Identity::Anonymous)
    }

    async fn await_recovery(&self) {
        let pending = self
            .inner
            .recovery
            .lock()
            .as_ref()
            .map(|p| p.future.clone());
        if let Some(future) = pending {
            let _ = future.await;
        }
    }

    /// Recover the session issued under `generation` after an expiry signal.
    ///
    /// One refresh, then one re-authentication with the original method; if
    /// both fail the session is cleared. Concurrent callers for the same
    /// generation share one recovery. A stale generation returns the current
    /// session without starting anything.
    ///
    /// # Errors
    ///
    /// Authentication error when the session could not be recovered.
    pub async fn recover_expired(&self, generation: u64) -> AtResult<SessionSummary> {
        let future = {
            let mut slot = self.inner.recovery.lock();
            match slot.as_ref() {
                Some(pending) if pending.generation == generation => pending.future.clone(),
                _ => {
                    if self.inner.state.read().generation != generation {
                        drop(slot);
                        debug!(generation, "Expiry report for a replaced session");
                        return self.inner.current_summary();
                    }
                    let future = Inner::recover(Arc::clone(&self.inner), generation)
                        .boxed()
                        .shared();
                    *slot = Some(PendingRecovery {
                        generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        let result = future.await;

        let mut slot = self.inner.recovery.lock();
        if slot.as_ref().is_some_and(|p| p.generation == generation) {
            *slot = None;
        }
        result
    }

    /// External expiry signal for the current session
    ///
    /// # Errors
    ///
    /// See [`Self::recover_expired`].
    pub async fn notify_expired(&self) -> AtResult<SessionSummary> {
        let generation = self.inner.state.read().generation;
        self.recover_expired(generation).await
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Begin an interactive delegated authorization
    ///
    /// # Errors
    ///
    /// Validation error when no delegated grant is configured.
    pub fn start_authorization(&self) -> AtResult<AuthorizationStart> {
        let grant = self.inner.grant_client()?;
        self.ensure_sweeper(&grant);
        let hint = match &self.inner.method {
            Some(AuthMethod::Grant { subject_hint, .. }) => subject_hint.as_deref(),
            _ => None,
        };
        Ok(grant.start_authorization(hint))
    }

    /// Finish a delegated authorization with the code and state from the
    /// redirect; binds the session and persists the grant.
    ///
    /// # Errors
    ///
    /// Validation error coded [`AUTHORIZATION_EXPIRED`](crate::AUTHORIZATION_EXPIRED)
    /// for an unknown or expired state, otherwise the classified exchange
    /// failure.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> AtResult<SessionSummary> {
        let grant = self.inner.grant_client()?;
        let tokens = grant.handle_callback(code, state).await?;
        let session = self.inner.bind_grant(&tokens).await?;
        let summary = self
            .inner
            .install_session(session, Origin::Grant, SessionEvent::Created);
        info!(did = %summary.did, handle = %summary.handle, "Delegated session established");
        Ok(summary)
    }

    /// Revoke (delegated grants, best effort), forget the stored grant, and
    /// clear the session
    pub async fn logout(&self) {
        let (session, origin) = {
            let state = self.inner.state.read();
            (state.session.clone(), state.origin)
        };
        if let (Some(session), Origin::Grant, Some(Ok(grant))) =
            (&session, origin, &self.inner.grant)
        {
            grant
                .revoke_tokens(&session.access_token, usable(&session.refresh_token))
                .await;
        }
        if let Err(e) = self.inner.store.clear().await {
            warn!(error = %e, "Could not clear stored grant");
        }
        self.inner.clear();
        info!("Logged out");
    }

    /// Stop background work and drop in-memory session state
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
        }
        self.inner.recovery.lock().take();
        self.inner.clear();
        debug!("Session manager shut down");
    }

    /// Status snapshot
    pub fn status(&self) -> SessionStatus {
        let session = self
            .inner
            .state
            .read()
            .session
            .as_ref()
            .map(Session::summary);
        SessionStatus {
            authenticated: session.as_ref().is_some_and(|s| s.active),
            has_credentials: self.has_credentials(),
            method: self.inner.method.as_ref().map(AuthMethod::name),
            session,
            pending_authorizations: match &self.inner.grant {
                Some(Ok(grant)) => grant.pending_count(),
                _ => 0,
            },
        }
    }
}

impl Inner {
    fn grant_client(&self) -> AtResult<Arc<GrantClient>> {
        match &self.grant {
            Some(Ok(grant)) => Ok(Arc::clone(grant)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(AtError::validation(
                "Delegated authorization is not configured",
            )),
        }
    }

    fn current_identity(&self) -> Option<Identity> {
        let state = self.state.read();
        state
            .session
            .as_ref()
            .filter(|s| s.active)
            .map(|s| {
                Identity::Authenticated(AuthenticatedIdentity::from_session(s, state.generation))
            })
    }

    fn current_summary(&self) -> AtResult<SessionSummary> {
        self.state
            .read()
            .session
            .as_ref()
            .filter(|s| s.active)
            .map(Session::summary)
            .ok_or_else(|| AtError::authentication("No active session"))
    }

    /// Bind a freshly established session
    fn install(&self, session: Session, origin: Origin) -> InitOutcome {
        let summary = self.install_session(session, origin, SessionEvent::Created);
        InitOutcome::Authenticated {
            did: summary.did,
            handle: summary.handle,
        }
    }

    /// Replace the session, bump the generation, and publish the event
    fn install_session(
        &self,
        session: Session,
        origin: Origin,
        event: impl FnOnce(SessionSummary) -> SessionEvent,
    ) -> SessionSummary {
        let summary = session.summary();
        {
            let mut state = self.state.write();
            state.generation += 1;
            state.session = Some(session);
            state.origin = origin;
        }
        let _ = self.events.send(event(summary.clone()));
        summary
    }

    fn clear(&self) {
        let cleared = {
            let mut state = self.state.write();
            let had_session = state.session.take().is_some();
            if had_session {
                state.generation += 1;
            }
            had_session
        };
        if cleared {
            let _ = self.events.send(SessionEvent::Cleared);
        }
    }

    async fn password_login(&self, identifier: &str, password: &SecretString) -> AtResult<Session> {
        let session = self.protocol.login(identifier, password).await?;
        info!(did = %session.did, handle = %session.handle, "Logged in");
        Ok(session)
    }

    /// Resume the session the grant's tokens belong to and persist the grant
    async fn bind_grant(&self, tokens: &GrantTokens) -> AtResult<Session> {
        let pair = TokenPair {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
        };
        let session = self.protocol.resume_session(&pair).await?;

        let mut stored = StoredGrant::from(tokens);
        stored.subject.get_or_insert_with(|| session.did.clone());
        if let Err(e) = self.store.save(&stored).await {
            warn!(error = %e, "Could not persist grant");
        }
        Ok(session)
    }

    /// Resume or refresh a stored grant; `None` means authorization is needed
    async fn restore_grant(&self, grant: &GrantClient, stored: StoredGrant) -> Option<InitOutcome> {
        if !stored.is_expired() {
            match self.protocol.resume_session(&stored.tokens()).await {
                Ok(session) => {
                    info!(did = %session.did, "Resumed stored grant");
                    return Some(self.install(session, Origin::Grant));
                }
                Err(e) => debug!(error = %e, "Stored grant could not be resumed"),
            }
        }

        let refresh = stored.refresh_token.as_ref()?;
        let refreshed = match grant.refresh_tokens(refresh).await {
            Ok(tokens) => self.bind_grant(&tokens).await,
            Err(e) => Err(e.into()),
        };
        match refreshed {
            Ok(session) => {
                info!(did = %session.did, "Refreshed stored grant");
                Some(self.install(session, Origin::Grant))
            }
            Err(e) => {
                warn!(error = %e, "Stored grant is no longer usable");
                None
            }
        }
    }

    async fn refresh(&self, origin: Origin, refresh_token: &SecretString) -> AtResult<Session> {
        match (origin, &self.grant) {
            (Origin::Grant, Some(Ok(grant))) => {
                let tokens = grant.refresh_tokens(refresh_token).await?;
                self.bind_grant(&tokens).await
            }
            _ => Ok(self.protocol.refresh_session(refresh_token).await?),
        }
    }

    async fn reauthenticate(&self) -> AtResult<Session> {
        match &self.method {
            Some(AuthMethod::Password {
                identifier,
                password,
            }) => self.password_login(identifier, password).await,
            Some(AuthMethod::Grant { subject_hint, .. }) => {
                let grant = self.grant_client()?;
                let start = grant.start_authorization(subject_hint.as_deref());
                Err(AtError::authentication(format!(
                    "Delegated grant expired; authorize again at {}",
                    start.url
                )))
            }
            None => Err(AtError::authentication("No credentials configured")),
        }
    }

    async fn recover(inner: Arc<Self>, generation: u64) -> AtResult<SessionSummary> {
        let expired = {
            let mut state = inner.state.write();
            if state.generation != generation {
                None
            } else {
                let origin = state.origin;
                state.session.as_mut().map(|session| {
                    session.active = false;
                    (session.did.clone(), session.refresh_token.clone(), origin)
                })
            }
        };
        let Some((did, refresh_token, origin)) = expired else {
            return inner.current_summary();
        };

        warn!(did = %did, "Session expired; recovering");
        let _ = inner.events.send(SessionEvent::Expired { did });

        if let Some(refresh_token) = usable(&refresh_token) {
            match inner.refresh(origin, refresh_token).await {
                Ok(session) => {
                    info!("Session refreshed");
                    return Ok(inner.install_session(session, origin, SessionEvent::Updated));
                }
                Err(e) => warn!(error = %e, "Session refresh failed; re-authenticating"),
            }
        }

        match inner.reauthenticate().await {
            Ok(session) => {
                Ok(inner.install_session(session, Origin::Password, SessionEvent::Created))
            }
            Err(e) => {
                error!(
                    error = %e,
                    "Session could not be recovered; reverting to unauthenticated mode"
                );
                inner.clear();
                Err(AtError::authentication(format!(
                    "Session expired and could not be recovered: {}",
                    e.message
                )))
            }
        }
    }
}

fn usable(secret: &SecretString) -> Option<&SecretString> {
    (!secret.expose_secret().is_empty()).then_some(secret)
}
