//! Pending authorization requests.
//!
//! Each entry holds the PKCE verifier for one outstanding authorization,
//! keyed by its `state`. Entries are single use and expire after the
//! configured TTL whether or not they were consumed.

use std::time::Duration;

use dashmap::DashMap;
use secrecy::SecretString;
use tokio::time::Instant;

/// Proof material for one outstanding authorization
#[derive(Debug)]
pub struct PendingAuthorization {
    /// PKCE code verifier
    pub code_verifier: SecretString,
    /// When the authorization URL was issued
    pub issued_at: Instant,
    /// Account hint the request was started with
    pub subject_hint: Option<String>,
}

impl PendingAuthorization {
    /// New entry issued now
    pub fn new(code_verifier: SecretString, subject_hint: Option<String>) -> Self {
        Self {
            code_verifier,
            issued_at: Instant::now(),
            subject_hint,
        }
    }

    fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.issued_at) >= ttl
    }
}

/// Concurrent map of pending authorizations
#[derive(Debug)]
pub struct PendingAuthorizations {
    entries: DashMap<String, PendingAuthorization>,
    ttl: Duration,
}

impl PendingAuthorizations {
    /// Empty map with the given entry lifetime
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Track a new authorization under `state`
    pub fn insert(&self, state: String, pending: PendingAuthorization) {
        self.entries.insert(state, pending);
    }

    /// Remove and return the entry for `state`.
    ///
    /// Returns `None` for unknown states and for entries older than the TTL;
    /// either way the state can never be used again.
    pub fn take(&self, state: &str) -> Option<PendingAuthorization> {
        let (_, pending) = self.entries.remove(state)?;
        if pending.is_stale(self.ttl, Instant::now()) {
            return None;
        }
        Some(pending)
    }

    /// Drop every stale entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, pending| !pending.is_stale(self.ttl, now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of outstanding entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no authorization is outstanding
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingAuthorization {
        PendingAuthorization::new(SecretString::new("verifier".into()), None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_is_single_use() {
        let map = PendingAuthorizations::new(Duration::from_secs(1800));
        map.insert("state-1".into(), pending());

        assert!(map.take("state-1").is_some());
        assert!(map.take("state-1").is_none());
        assert!(map.take("never-issued").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_is_rejected_and_removed() {
        let map = PendingAuthorizations::new(Duration::from_secs(1800));
        map.insert("state-1".into(), pending());

        tokio::time::advance(Duration::from_secs(1801)).await;

        assert!(map.take("state-1").is_none());
        assert!(map.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_stale_entries() {
        let map = PendingAuthorizations::new(Duration::from_secs(1800));
        map.insert("old".into(), pending());
        tokio::time::advance(Duration::from_secs(1200)).await;
        map.insert("young".into(), pending());
        tokio::time::advance(Duration::from_secs(700)).await;

        assert_eq!(map.sweep(), 1);
        assert_eq!(map.len(), 1);
        assert!(map.take("young").is_some());
    }
}
