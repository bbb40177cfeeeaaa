//! Grant persistence.
//!
//! A delegated grant survives a restart only if it is stored somewhere; the
//! session manager loads it on `initialize()` and resumes or refreshes it
//! instead of sending the user through authorization again.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use atmcp_core::TokenPair;

use super::client::GrantTokens;

/// Grant storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("Grant store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored grant could not be (de)serialized
    #[error("Grant store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A persisted delegated grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGrant {
    /// Access token
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: SecretString,
    /// Refresh token, if the server issued one
    #[serde(
        default,
        serialize_with = "serialize_optional_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<SecretString>,
    /// Account DID reported by the token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Access token expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredGrant {
    /// Whether the access token is past its expiry. Grants without an expiry
    /// are assumed valid until the server says otherwise.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    /// Token pair for session resume
    pub fn tokens(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

impl From<&GrantTokens> for StoredGrant {
    fn from(tokens: &GrantTokens) -> Self {
        Self {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            subject: tokens.subject.clone(),
            expires_at: tokens.expires_at,
        }
    }
}

fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_optional_secret<S>(
    secret: &Option<SecretString>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match secret {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Grant storage abstraction
#[async_trait]
pub trait GrantStore: Send + Sync + std::fmt::Debug {
    /// Load the stored grant, if any
    async fn load(&self) -> Result<Option<StoredGrant>, StoreError>;

    /// Replace the stored grant
    async fn save(&self, grant: &StoredGrant) -> Result<(), StoreError>;

    /// Forget the stored grant (logout, revocation)
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local grant store
#[derive(Debug, Default)]
pub struct MemoryGrantStore {
    grant: Mutex<Option<StoredGrant>>,
}

impl MemoryGrantStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn load(&self) -> Result<Option<StoredGrant>, StoreError> {
        Ok(self.grant.lock().clone())
    }

    async fn save(&self, grant: &StoredGrant) -> Result<(), StoreError> {
        *self.grant.lock() = Some(grant.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.grant.lock().take();
        Ok(())
    }
}

/// JSON file grant store, written owner read/write only on unix
#[derive(Debug, Clone)]
pub struct FileGrantStore {
    path: PathBuf,
}

impl FileGrantStore {
    /// Store backed by `path`; the file is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl GrantStore for FileGrantStore {
    async fn load(&self) -> Result<Option<StoredGrant>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, grant: &StoredGrant) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(grant)?;
        tokio::fs::write(&self.path, bytes).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }

        debug!(path = %self.path.display(), "Grant persisted");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
