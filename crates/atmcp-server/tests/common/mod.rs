//! Shared fixtures for the server integration tests

#![allow(dead_code)]

use std::sync::Arc;

use atmcp_auth::{AuthMethod, GrantSettings, InitOutcome, MemoryGrantStore, SessionManager};
use atmcp_core::testing::MockProtocolClient;
use atmcp_server::{App, Dispatcher, Services};
use secrecy::SecretString;

/// Mock protocol client plus a fully registered dispatcher
pub struct Harness {
    pub protocol: Arc<MockProtocolClient>,
    pub app: App,
}

impl Harness {
    /// No credentials configured
    pub fn anonymous() -> Self {
        Self::with_method(None)
    }

    /// Password credentials configured, not yet initialized
    pub fn with_password() -> Self {
        Self::with_method(Some(AuthMethod::Password {
            identifier: "alice.bsky.social".into(),
            password: SecretString::new("app-password".into()),
        }))
    }

    /// Delegated grant configured against an authorization server that is
    /// never contacted
    pub fn with_grant() -> Self {
        Self::with_method(Some(AuthMethod::Grant {
            settings: GrantSettings::new(
                "https://app.example/client-metadata.json",
                "http://127.0.0.1:8787/callback",
                "https://auth.example/oauth/authorize",
                "https://auth.example/oauth/token",
            ),
            subject_hint: None,
        }))
    }

    /// Password credentials and a successful login
    pub async fn authenticated() -> Self {
        let harness = Self::with_password();
        let outcome = harness.app.initialize().await;
        assert!(
            matches!(outcome, InitOutcome::Authenticated { .. }),
            "login failed: {outcome:?}"
        );
        harness
    }

    fn with_method(method: Option<AuthMethod>) -> Self {
        let protocol = Arc::new(MockProtocolClient::new());
        let store = Arc::new(MemoryGrantStore::new());
        let session = SessionManager::new(protocol.clone(), method, store);
        let services = Services::new(protocol.clone(), session, None);
        let app = App::from_services(services, false).expect("tools register");
        Self { protocol, app }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.app.dispatcher()
    }
}
