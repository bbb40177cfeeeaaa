//! Credential resolution: which authentication method, if any, applies.

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::config::{AuthSettings, GrantSettings};

/// Authentication method derived from configuration
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// Identifier + app password login
    Password {
        /// Handle, DID or email
        identifier: String,
        /// App password
        password: SecretString,
    },
    /// Delegated grant (authorization code + PKCE)
    Grant {
        /// OAuth client settings
        settings: GrantSettings,
        /// Account hint passed as `login_hint`
        subject_hint: Option<String>,
    },
}

impl AuthMethod {
    /// Short name for logs and status output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Password { .. } => "password",
            Self::Grant { .. } => "delegated-grant",
        }
    }
}

/// Stateless resolver from [`AuthSettings`] to an [`AuthMethod`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialResolver;

impl CredentialResolver {
    /// Resolve the authentication method.
    ///
    /// A complete identifier/password pair wins, since it needs no user
    /// interaction. Otherwise a configured grant client applies. Blank values
    /// count as absent.
    pub fn resolve(settings: &AuthSettings) -> Option<AuthMethod> {
        let identifier = settings
            .identifier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let password = settings
            .password
            .as_ref()
            .filter(|p| !p.expose_secret().trim().is_empty());

        if let (Some(identifier), Some(password)) = (identifier, password) {
            return Some(AuthMethod::Password {
                identifier: identifier.to_string(),
                password: password.clone(),
            });
        }

        if let Some(grant) = Self::grant_settings(settings) {
            return Some(AuthMethod::Grant {
                settings: grant.clone(),
                subject_hint: identifier.map(str::to_string),
            });
        }

        if identifier.is_some() || password.is_some() {
            warn!(
                "Incomplete credentials: both identifier and password are required; \
                 running unauthenticated"
            );
        }
        None
    }

    /// Grant client settings, when configured with a non-blank client ID
    pub fn grant_settings(settings: &AuthSettings) -> Option<&GrantSettings> {
        settings
            .grant
            .as_ref()
            .filter(|g| !g.client_id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> GrantSettings {
        GrantSettings::new(
            "https://app.example/client-metadata.json",
            "http://127.0.0.1:8787/callback",
            "https://auth.example/authorize",
            "https://auth.example/token",
        )
    }

    #[test]
    fn test_no_credentials() {
        assert!(CredentialResolver::resolve(&AuthSettings::default()).is_none());
    }

    #[test]
    fn test_password_pair() {
        let settings = AuthSettings {
            identifier: Some("alice.bsky.social".into()),
            password: Some(SecretString::new("app-pass".into())),
            ..Default::default()
        };
        let method = CredentialResolver::resolve(&settings).unwrap();
        assert_eq!(method.name(), "password");
    }

    #[test]
    fn test_blank_password_is_absent() {
        let settings = AuthSettings {
            identifier: Some("alice.bsky.social".into()),
            password: Some(SecretString::new("   ".into())),
            ..Default::default()
        };
        assert!(CredentialResolver::resolve(&settings).is_none());
    }

    #[test]
    fn test_grant_uses_identifier_as_hint() {
        let settings = AuthSettings {
            identifier: Some("alice.bsky.social".into()),
            grant: Some(grant()),
            ..Default::default()
        };
        match CredentialResolver::resolve(&settings) {
            Some(AuthMethod::Grant { subject_hint, .. }) => {
                assert_eq!(subject_hint.as_deref(), Some("alice.bsky.social"));
            }
            other => panic!("expected grant method, got {other:?}"),
        }
    }

    #[test]
    fn test_password_wins_over_grant() {
        let settings = AuthSettings {
            identifier: Some("alice.bsky.social".into()),
            password: Some(SecretString::new("app-pass".into())),
            grant: Some(grant()),
            ..Default::default()
        };
        assert_eq!(
            CredentialResolver::resolve(&settings).map(|m| m.name()),
            Some("password")
        );
        assert!(CredentialResolver::grant_settings(&settings).is_some());
    }

    #[test]
    fn test_blank_client_id_is_absent() {
        let mut blank = grant();
        blank.client_id = "  ".into();
        let settings = AuthSettings {
            grant: Some(blank),
            ..Default::default()
        };
        assert!(CredentialResolver::grant_settings(&settings).is_none());
        assert!(CredentialResolver::resolve(&settings).is_none());
    }
}
