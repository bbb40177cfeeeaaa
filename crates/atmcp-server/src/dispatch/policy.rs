//! Access policy tiers and availability

use serde::Serialize;

/// Which identity an operation may use and whether it needs a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPolicy {
    /// Always permitted; always anonymous
    Public,
    /// Permitted only with an active session
    Private,
    /// Always permitted; authenticated when a session is active
    Enhanced,
}

/// Whether an operation could run right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    /// No credentials were configured
    CredentialsRequired,
    /// Credentials exist but no session is active
    AuthenticationPending,
}

impl Availability {
    /// Evaluate a policy against the current session state
    pub fn evaluate(policy: AccessPolicy, authenticated: bool, has_credentials: bool) -> Self {
        match policy {
            AccessPolicy::Public | AccessPolicy::Enhanced => Self::Available,
            AccessPolicy::Private if authenticated => Self::Available,
            AccessPolicy::Private if has_credentials => Self::AuthenticationPending,
            AccessPolicy::Private => Self::CredentialsRequired,
        }
    }

    pub fn is_available(self) -> bool {
        self == Self::Available
    }

    /// Caller-facing description
    pub fn message(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::CredentialsRequired => "Requires authentication — please provide credentials",
            Self::AuthenticationPending => {
                "Authentication credentials provided but not authenticated — please authenticate"
            }
        }
    }
}
