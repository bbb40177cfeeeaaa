//! Event stream configuration

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{StreamError, StreamResult};

/// Runtime configuration of the event stream client
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Socket endpoint (without cursor)
    pub endpoint: Url,
    /// Server-side collection filter (`wantedCollections`)
    pub wanted_collections: Vec<String>,
    /// Ping period; a missing pong by the next tick drops the socket
    pub heartbeat_interval: Duration,
    /// First reconnect delay
    pub backoff_floor: Duration,
    /// Largest reconnect delay
    pub backoff_cap: Duration,
    /// Consecutive failed attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Ring buffer size
    pub buffer_capacity: usize,
}

impl StreamConfig {
    /// Defaults: 30s heartbeat, 1s..30s backoff, 10 attempts, 1000 events
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            wanted_collections: Vec::new(),
            heartbeat_interval: Duration::from_secs(30),
            backoff_floor: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            buffer_capacity: 1000,
        }
    }

    /// Set the heartbeat period
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the backoff floor and cap
    pub fn with_backoff(mut self, floor: Duration, cap: Duration) -> Self {
        self.backoff_floor = floor;
        self.backoff_cap = cap.max(floor);
        self
    }

    /// Set the reconnect ceiling
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the ring buffer size
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Set the server-side collection filter
    pub fn with_wanted_collections(mut self, collections: Vec<String>) -> Self {
        self.wanted_collections = collections;
        self
    }

    /// Delay before reconnect attempt number `attempts` (zero based):
    /// `min(floor * 2^attempts, cap)`
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.backoff_floor
            .saturating_mul(factor)
            .min(self.backoff_cap)
    }

    /// URL for the next connect, resuming after `cursor` when known
    pub fn connect_url(&self, cursor: Option<u64>) -> Url {
        let mut url = self.endpoint.clone();
        if !self.wanted_collections.is_empty() || cursor.is_some() {
            let mut query = url.query_pairs_mut();
            for collection in &self.wanted_collections {
                query.append_pair("wantedCollections", collection);
            }
            if let Some(cursor) = cursor {
                query.append_pair("cursor", &cursor.to_string());
            }
        }
        url
    }
}

/// Deserializable stream settings (the `stream` configuration section)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Run the change-feed client at all
    pub enabled: bool,
    /// Socket endpoint; the protocol client's endpoint when unset
    pub endpoint: Option<String>,
    /// Server-side collection filter
    pub wanted_collections: Vec<String>,
    /// Heartbeat period in seconds
    pub heartbeat_interval_secs: u64,
    /// First reconnect delay in milliseconds
    pub backoff_floor_ms: u64,
    /// Largest reconnect delay in milliseconds
    pub backoff_cap_ms: u64,
    /// Consecutive failed attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Ring buffer size
    pub buffer_capacity: usize,
    /// Connect at startup
    pub autoconnect: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            wanted_collections: Vec::new(),
            heartbeat_interval_secs: 30,
            backoff_floor_ms: 1_000,
            backoff_cap_ms: 30_000,
            max_reconnect_attempts: 10,
            buffer_capacity: 1000,
            autoconnect: true,
        }
    }
}

impl StreamSettings {
    /// Build a [`StreamConfig`], falling back to `default_endpoint`
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidEndpoint`] for an unparseable or non-websocket URL.
    pub fn to_config(&self, default_endpoint: Url) -> StreamResult<StreamConfig> {
        let endpoint = match &self.endpoint {
            Some(raw) => {
                Url::parse(raw).map_err(|e| StreamError::InvalidEndpoint(format!("{raw}: {e}")))?
            }
            None => default_endpoint,
        };
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(StreamError::InvalidEndpoint(format!(
                "{endpoint}: expected ws:// or wss://"
            )));
        }

        Ok(StreamConfig::new(endpoint)
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_interval_secs.max(1)))
            .with_backoff(
                Duration::from_millis(self.backoff_floor_ms),
                Duration::from_millis(self.backoff_cap_ms),
            )
            .with_max_reconnect_attempts(self.max_reconnect_attempts)
            .with_buffer_capacity(self.buffer_capacity)
            .with_wanted_collections(self.wanted_collections.clone()))
    }
}
