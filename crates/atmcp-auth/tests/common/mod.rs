//! Shared fixtures for the auth integration tests

#![allow(dead_code)]

use atmcp_auth::GrantSettings;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

/// Mock authorization server (token + revocation endpoints)
pub struct MockAuthorizationServer {
    pub server: MockServer,
}

impl MockAuthorizationServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Client settings pointing at this server
    pub fn settings(&self) -> GrantSettings {
        let base = self.server.uri();
        let mut settings = GrantSettings::new(
            "https://app.example/client-metadata.json",
            "http://127.0.0.1:8787/callback",
            format!("{base}/oauth/authorize"),
            format!("{base}/oauth/token"),
        );
        settings.revocation_endpoint = Some(format!("{base}/oauth/revoke"));
        settings
    }

    pub async fn mock_token_success(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        sub: Option<&str>,
    ) {
        let mut body = json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "atproto transition:generic",
        });
        if let Some(refresh) = refresh_token {
            body["refresh_token"] = json!(refresh);
        }
        if let Some(sub) = sub {
            body["sub"] = json!(sub);
        }

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_token_error(&self, error: &str, description: &str) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": error,
                "error_description": description,
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_revocation(&self, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/revoke"))
            .respond_with(ResponseTemplate::new(200))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }
}
