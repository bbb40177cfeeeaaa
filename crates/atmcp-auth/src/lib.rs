//! # atmcp-auth
//!
//! Authentication for the atmcp access layer.
//!
//! - [`config`] - deserializable [`AuthSettings`] / [`GrantSettings`]
//! - [`credentials`] - which [`AuthMethod`] applies, if any
//! - [`grant`] - delegated grants: OAuth 2.1 authorization code + PKCE,
//!   pending-authorization tracking, grant persistence
//! - [`manager`] - the [`SessionManager`]: initial login, identities per
//!   access tier, coalesced expiry recovery, lifecycle events
//!
//! ## Example
//!
//! ```rust,no_run
//! # async fn run(protocol: std::sync::Arc<dyn atmcp_core::ProtocolClient>) {
//! use atmcp_auth::{AuthSettings, InitOutcome, SessionManager};
//!
//! let manager = SessionManager::from_settings(protocol, &AuthSettings::default());
//! match manager.initialize().await {
//!     InitOutcome::Unauthenticated => println!("public operations only"),
//!     InitOutcome::Authenticated { handle, .. } => println!("logged in as {handle}"),
//!     InitOutcome::AuthorizationRequired { url } => println!("open {url}"),
//!     InitOutcome::Failed(e) => eprintln!("authentication failed: {e}"),
//! }
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod grant;
pub mod manager;

pub use config::{AuthSettings, GrantSettings};
pub use credentials::{AuthMethod, CredentialResolver};
pub use grant::{
    AUTHORIZATION_EXPIRED, AuthorizationStart, FileGrantStore, GrantClient, GrantError, GrantStore,
    GrantTokens, MemoryGrantStore, StoreError, StoredGrant,
};
pub use manager::{InitOutcome, SessionEvent, SessionManager, SessionStatus};
