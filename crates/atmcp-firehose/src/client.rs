//! Event stream client
//!
//! One persistent socket, owned by a single supervisor task that connects,
//! pumps frames, sends heartbeats, and reconnects with exponential backoff.
//! Subscribers register named callbacks with a collection filter; every
//! parsed event also lands in a bounded ring buffer for read-only queries.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::buffer::EventBuffer;
use crate::config::StreamConfig;
use crate::connector::{FeedConnection, FeedConnector, FeedFrame, TungsteniteConnector};
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::state::{ConnectionState, Transition};
use crate::subscription::{CollectionFilter, EventCallback, Subscriptions};

/// Status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub endpoint: String,
    /// Highest sequence seen; the resume cursor
    pub last_sequence: Option<u64>,
    /// Consecutive failed attempts since the last open
    pub reconnect_attempts: u32,
    pub subscription_count: usize,
    pub buffered_events: usize,
}

#[derive(Debug, Default)]
struct StreamState {
    state: ConnectionState,
    last_sequence: Option<u64>,
    reconnect_attempts: u32,
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Why a connected session ended
enum SessionEnd {
    Shutdown,
    Closed,
    Failed(StreamError),
}

/// One loop iteration's input
enum Step {
    Shutdown,
    Frame(Option<Result<FeedFrame, StreamError>>),
    Heartbeat,
}

struct Inner {
    config: StreamConfig,
    connector: Arc<dyn FeedConnector>,
    stream: Mutex<StreamState>,
    subscriptions: RwLock<Subscriptions>,
    buffer: Mutex<EventBuffer>,
    supervisor: Mutex<Option<Supervisor>>,
}

/// Event stream client handle; clones share the socket
#[derive(Clone)]
pub struct EventStreamClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamClient")
            .field("endpoint", &self.inner.config.endpoint.as_str())
            .field("stream", &*self.inner.stream.lock())
            .finish_non_exhaustive()
    }
}

impl EventStreamClient {
    /// Client using the WebSocket connector
    pub fn new(config: StreamConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Client using a custom connector
    pub fn with_connector(config: StreamConfig, connector: Arc<dyn FeedConnector>) -> Self {
        let buffer = EventBuffer::new(config.buffer_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                stream: Mutex::new(StreamState::default()),
                subscriptions: RwLock::new(Subscriptions::default()),
                buffer: Mutex::new(buffer),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Start the supervisor. No-op while connecting, connected or waiting
    /// out a reconnect delay.
    pub fn connect(&self) {
        let mut supervisor = self.inner.supervisor.lock();
        if supervisor.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            debug!("Connect requested while the supervisor is running");
            return;
        }
        if !self.inner.apply(Transition::Connect) {
            debug!("Connect requested while already active");
            return;
        }
        if let Some(previous) = supervisor.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Inner::supervise(Arc::clone(&self.inner), cancel.clone()));
        *supervisor = Some(Supervisor { cancel, handle });
    }

    /// Close the socket and stop reconnecting. Idempotent.
    pub async fn disconnect(&self) {
        let supervisor = self.inner.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            supervisor.cancel.cancel();
            if let Err(e) = supervisor.handle.await
                && e.is_panic()
            {
                error!("Event stream supervisor panicked");
            }
            info!("Event stream disconnected");
        }
        self.inner.apply(Transition::Shutdown);
    }

    /// Register (or replace) a named subscriber; an empty filter receives
    /// every event
    pub fn subscribe<F>(&self, id: impl Into<String>, filter: CollectionFilter, callback: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = id.into();
        let callback: EventCallback = Arc::new(callback);
        if self
            .inner
            .subscriptions
            .write()
            .insert(id.clone(), filter, callback)
        {
            debug!(id = %id, "Subscription replaced");
        } else {
            debug!(id = %id, "Subscription added");
        }
    }

    /// Remove a subscriber; returns whether it existed
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.inner.subscriptions.write().remove(id)
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.inner.stream.lock().state
    }

    /// Status snapshot
    pub fn status(&self) -> StreamStatus {
        let stream = self.inner.stream.lock();
        StreamStatus {
            state: stream.state,
            connected: stream.state == ConnectionState::Connected,
            endpoint: self.inner.config.endpoint.to_string(),
            last_sequence: stream.last_sequence,
            reconnect_attempts: stream.reconnect_attempts,
            subscription_count: self.inner.subscriptions.read().len(),
            buffered_events: self.inner.buffer.lock().len(),
        }
    }

    /// Up to `limit` buffered events, newest first, optionally restricted to
    /// a collection (full NSID or last segment)
    pub fn recent_events(&self, limit: usize, collection: Option<&str>) -> Vec<StreamEvent> {
        let filter = collection
            .map(|c| CollectionFilter::new([c]))
            .unwrap_or_default();
        self.inner.buffer.lock().recent(limit, &filter)
    }
}

impl Inner {
    /// Apply a transition; false when it is not valid from the current state
    fn apply(&self, transition: Transition) -> bool {
        let mut stream = self.stream.lock();
        match stream.state.apply(transition) {
            Some(next) => {
                trace!(from = ?stream.state, to = ?next, ?transition, "Stream state");
                stream.state = next;
                true
            }
            None => false,
        }
    }

    async fn supervise(inner: Arc<Self>, cancel: CancellationToken) {
        debug!(endpoint = %inner.config.endpoint, "Event stream supervisor started");

        loop {
            let cursor = inner.stream.lock().last_sequence;
            let url = inner.config.connect_url(cursor);

            let connected = tokio::select! {
                () = cancel.cancelled() => break,
                result = inner.connector.connect(&url) => result,
            };

            match connected {
                Ok(connection) => {
                    inner.on_open();
                    match inner.run_session(connection, &cancel).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed => info!("Event stream closed by peer"),
                        SessionEnd::Failed(e) => warn!(error = %e, "Event stream failed"),
                    }
                }
                Err(e) => warn!(error = %e, "Event stream connect failed"),
            }
            inner.apply(Transition::Drop);

            let Some(delay) = inner.next_backoff() else {
                error!(
                    attempts = inner.config.max_reconnect_attempts,
                    "Giving up on the event stream"
                );
                break;
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(delay) => {}
            }
            if !inner.apply(Transition::Connect) {
                break;
            }
        }

        debug!("Event stream supervisor stopped");
    }

    fn on_open(&self) {
        {
            let mut stream = self.stream.lock();
            stream.reconnect_attempts = 0;
        }
        self.apply(Transition::Open);
        info!(endpoint = %self.config.endpoint, "Event stream connected");
    }

    /// Delay before the next attempt, counting it; `None` at the ceiling
    fn next_backoff(&self) -> Option<std::time::Duration> {
        let mut stream = self.stream.lock();
        if stream.reconnect_attempts >= self.config.max_reconnect_attempts {
            return None;
        }
        let delay = self.config.backoff_delay(stream.reconnect_attempts);
        stream.reconnect_attempts += 1;
        info!(
            attempt = stream.reconnect_attempts,
            max = self.config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling event stream reconnect"
        );
        Some(delay)
    }

    async fn run_session(
        &self,
        mut connection: Box<dyn FeedConnection>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut awaiting_pong = false;

        loop {
            let step = tokio::select! {
                () = cancel.cancelled() => Step::Shutdown,
                frame = connection.next_frame() => Step::Frame(frame),
                _ = heartbeat.tick() => Step::Heartbeat,
            };

            match step {
                Step::Shutdown => {
                    connection.close().await;
                    return SessionEnd::Shutdown;
                }
                Step::Frame(None) => return SessionEnd::Closed,
                Step::Frame(Some(Err(e))) => return SessionEnd::Failed(e),
                Step::Frame(Some(Ok(frame))) => {
                    awaiting_pong = false;
                    if let FeedFrame::Text(text) = frame {
                        self.handle_text(&text);
                    }
                }
                Step::Heartbeat => {
                    if awaiting_pong {
                        connection.close().await;
                        return SessionEnd::Failed(StreamError::HeartbeatTimeout);
                    }
                    if let Err(e) = connection.ping().await {
                        return SessionEnd::Failed(e);
                    }
                    awaiting_pong = true;
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let event = match StreamEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Dropping unparseable frame");
                return;
            }
        };

        {
            let mut stream = self.stream.lock();
            stream.last_sequence = Some(
                stream
                    .last_sequence
                    .map_or(event.sequence, |last| last.max(event.sequence)),
            );
        }
        let callbacks = self.subscriptions.read().matching(&event);
        for callback in callbacks {
            callback(&event);
        }
        self.buffer.lock().push(event);
    }
}
