//! Delegated-grant flow against a mock authorization server
//!
//! Covers the code exchange (PKCE verifier sent, `sub` captured), single use
//! of `state`, server rejections, refresh token rotation, revocation, grant
//! persistence through the session manager, and the pending sweep.

mod common;

use std::sync::Arc;
use std::time::Duration;

use atmcp_auth::{
    AUTHORIZATION_EXPIRED, AuthMethod, AuthSettings, FileGrantStore, GrantClient, GrantError,
    GrantSettings, GrantStore, InitOutcome, MemoryGrantStore, SessionManager, StoredGrant,
};
use atmcp_core::ErrorKind;
use atmcp_core::testing::MockProtocolClient;
use common::MockAuthorizationServer;
use secrecy::{ExposeSecret, SecretString};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_code_exchange_sends_verifier_and_captures_subject() {
    let server = MockAuthorizationServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code_verifier="))
        .and(body_string_contains("code=the-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "grant-access",
            "refresh_token": "grant-refresh",
            "token_type": "Bearer",
            "expires_in": 3600,
            "sub": "did:plc:alice",
        })))
        .expect(1)
        .mount(&server.server)
        .await;

    let client = GrantClient::new(&server.settings()).unwrap();
    let start = client.start_authorization(Some("alice.bsky.social"));
    let tokens = client
        .handle_callback("the-code", &start.state)
        .await
        .unwrap();

    assert_eq!(tokens.access_token.expose_secret(), "grant-access");
    assert_eq!(
        tokens.refresh_token.as_ref().map(|t| t.expose_secret().as_str()),
        Some("grant-refresh")
    );
    assert_eq!(tokens.subject.as_deref(), Some("did:plc:alice"));
    assert!(tokens.expires_at.is_some());
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_state_is_single_use() {
    let server = MockAuthorizationServer::start().await;
    server
        .mock_token_success("grant-access", Some("grant-refresh"), None)
        .await;

    let client = GrantClient::new(&server.settings()).unwrap();
    let start = client.start_authorization(None);

    client.handle_callback("code", &start.state).await.unwrap();
    let second = client.handle_callback("code", &start.state).await;

    let err = second.unwrap_err();
    assert!(err.is_invalid_authorization());
    assert!(matches!(err, GrantError::InvalidOrExpiredAuthorization));
}

#[tokio::test]
async fn test_failed_exchange_still_consumes_state() {
    let server = MockAuthorizationServer::start().await;
    server
        .mock_token_error("invalid_grant", "code expired")
        .await;

    let client = GrantClient::new(&server.settings()).unwrap();
    let start = client.start_authorization(None);

    let first = client.handle_callback("code", &start.state).await.unwrap_err();
    match &first {
        GrantError::Rejected { error, description } => {
            assert_eq!(error, "invalid_grant");
            assert_eq!(description.as_deref(), Some("code expired"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(!first.is_invalid_authorization());

    let second = client.handle_callback("code", &start.state).await.unwrap_err();
    assert!(second.is_invalid_authorization());
}

#[tokio::test]
async fn test_refresh_keeps_old_token_when_not_rotated() {
    let server = MockAuthorizationServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "token_type": "Bearer",
        })))
        .mount(&server.server)
        .await;

    let client = GrantClient::new(&server.settings()).unwrap();
    let old = SecretString::new("old-refresh".into());
    let tokens = client.refresh_tokens(&old).await.unwrap();

    assert_eq!(tokens.access_token.expose_secret(), "new-access");
    assert_eq!(
        tokens.refresh_token.as_ref().map(|t| t.expose_secret().as_str()),
        Some("old-refresh")
    );
}

#[tokio::test]
async fn test_refresh_rotates_token() {
    let server = MockAuthorizationServer::start().await;
    server
        .mock_token_success("new-access", Some("new-refresh"), None)
        .await;

    let client = GrantClient::new(&server.settings()).unwrap();
    let tokens = client
        .refresh_tokens(&SecretString::new("old-refresh".into()))
        .await
        .unwrap();

    assert_eq!(
        tokens.refresh_token.as_ref().map(|t| t.expose_secret().as_str()),
        Some("new-refresh")
    );
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let mut settings = MockAuthorizationServer::start().await.settings();
    // Port 9 (discard) on loopback refuses connections
    settings.token_endpoint = "http://127.0.0.1:9/oauth/token".into();

    let client = GrantClient::new(&settings).unwrap();
    let err = client
        .refresh_tokens(&SecretString::new("refresh".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, GrantError::Network(_)));
}

#[tokio::test]
async fn test_manager_completes_authorization_and_persists_grant() {
    let server = MockAuthorizationServer::start().await;
    server
        .mock_token_success("grant-access", Some("grant-refresh"), Some("did:plc:mockuser"))
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileGrantStore::new(dir.path().join("grant.json")));
    let protocol = Arc::new(MockProtocolClient::new());
    let manager = SessionManager::new(
        protocol.clone(),
        Some(AuthMethod::Grant {
            settings: server.settings(),
            subject_hint: None,
        }),
        store.clone(),
    );

    let outcome = manager.initialize().await;
    assert!(matches!(outcome, InitOutcome::AuthorizationRequired { .. }));
    assert!(!manager.is_authenticated());

    let start = manager.start_authorization().unwrap();
    let summary = manager
        .complete_authorization("the-code", &start.state)
        .await
        .unwrap();

    assert_eq!(summary.did, "did:plc:mockuser");
    assert!(manager.is_authenticated());

    let stored = store.load().await.unwrap().unwrap();
    assert_eq!(stored.access_token.expose_secret(), "grant-access");
    assert_eq!(stored.subject.as_deref(), Some("did:plc:mockuser"));

    let replay = manager
        .complete_authorization("the-code", &start.state)
        .await
        .unwrap_err();
    assert_eq!(replay.kind, ErrorKind::Validation);
    assert!(replay.has_code(AUTHORIZATION_EXPIRED));

    manager.shutdown();
}

#[tokio::test]
async fn test_manager_resumes_stored_grant() {
    let server = MockAuthorizationServer::start().await;
    let store = Arc::new(MemoryGrantStore::new());
    store
        .save(&StoredGrant {
            access_token: SecretString::new("stored-access".into()),
            refresh_token: Some(SecretString::new("stored-refresh".into())),
            subject: Some("did:plc:mockuser".into()),
            expires_at: None,
        })
        .await
        .unwrap();

    let protocol = Arc::new(MockProtocolClient::new());
    let manager = SessionManager::new(
        protocol.clone(),
        Some(AuthMethod::Grant {
            settings: server.settings(),
            subject_hint: None,
        }),
        store,
    );

    let outcome = manager.initialize().await;
    assert!(matches!(outcome, InitOutcome::Authenticated { .. }));
    assert_eq!(protocol.resume_calls(), 1);

    manager.shutdown();
}

#[tokio::test]
async fn test_manager_refreshes_unresumable_grant() {
    let server = MockAuthorizationServer::start().await;
    server
        .mock_token_success("fresh-access", Some("fresh-refresh"), None)
        .await;

    let store = Arc::new(MemoryGrantStore::new());
    store
        .save(&StoredGrant {
            access_token: SecretString::new("stale-access".into()),
            refresh_token: Some(SecretString::new("stored-refresh".into())),
            subject: None,
            expires_at: None,
        })
        .await
        .unwrap();

    let protocol = Arc::new(MockProtocolClient::new());
    protocol.expire_token("stale-access");
    let manager = SessionManager::new(
        protocol.clone(),
        Some(AuthMethod::Grant {
            settings: server.settings(),
            subject_hint: None,
        }),
        store.clone(),
    );

    assert!(matches!(
        manager.initialize().await,
        InitOutcome::Authenticated { .. }
    ));
    let stored = store.load().await.unwrap().unwrap();
    assert_eq!(stored.access_token.expose_secret(), "fresh-access");

    manager.shutdown();
}

#[tokio::test]
async fn test_logout_revokes_and_clears_store() {
    let server = MockAuthorizationServer::start().await;
    server
        .mock_token_success("grant-access", Some("grant-refresh"), None)
        .await;
    server.mock_revocation(1).await;

    let store = Arc::new(MemoryGrantStore::new());
    let manager = SessionManager::new(
        Arc::new(MockProtocolClient::new()),
        Some(AuthMethod::Grant {
            settings: server.settings(),
            subject_hint: None,
        }),
        store.clone(),
    );
    let start = manager.start_authorization().unwrap();
    manager
        .complete_authorization("code", &start.state)
        .await
        .unwrap();

    manager.logout().await;

    assert!(!manager.is_authenticated());
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_password_login_keeps_interactive_authorization() {
    let server = MockAuthorizationServer::start().await;
    server
        .mock_token_success("grant-access", Some("grant-refresh"), None)
        .await;
    server.mock_revocation(1).await;

    let protocol = Arc::new(MockProtocolClient::new());
    let settings = AuthSettings {
        identifier: Some("mockuser.test".into()),
        password: Some(SecretString::new("app-pass".into())),
        grant: Some(server.settings()),
        ..Default::default()
    };
    let manager = SessionManager::from_settings(protocol.clone(), &settings);

    let outcome = manager.initialize().await;
    assert!(matches!(outcome, InitOutcome::Authenticated { .. }));
    assert_eq!(manager.status().method, Some("password"));
    assert_eq!(protocol.login_calls(), 1);

    // Logging out a password session never contacts the revocation endpoint
    manager.logout().await;
    assert!(!manager.is_authenticated());

    let start = manager.start_authorization().unwrap();
    assert_eq!(manager.status().pending_authorizations, 1);
    manager
        .complete_authorization("code", &start.state)
        .await
        .unwrap();
    assert!(manager.is_authenticated());

    manager.logout().await;
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_discards_abandoned_authorizations() {
    let settings = GrantSettings::new(
        "https://app.example/client-metadata.json",
        "http://127.0.0.1:8787/callback",
        "https://auth.example/oauth/authorize",
        "https://auth.example/oauth/token",
    );
    let client = GrantClient::new(&settings).unwrap();
    let start = client.start_authorization(None);
    let sweeper = client.spawn_sweeper();

    tokio::time::sleep(Duration::from_secs(36 * 60)).await;

    assert_eq!(client.pending_count(), 0);
    let err = client.handle_callback("code", &start.state).await.unwrap_err();
    assert!(err.is_invalid_authorization());
    sweeper.abort();
}
