//! # atmcp-firehose
//!
//! Change-feed client for the atmcp access layer.
//!
//! A single supervisor task owns the socket: it connects (resuming from the
//! last seen sequence), pings on a fixed period, drops sockets that miss a
//! pong, and reconnects with `min(floor * 2^n, cap)` backoff until a
//! configured ceiling. Parsed events fan out to named subscribers whose
//! [`CollectionFilter`] accepts them and land in a bounded buffer served by
//! [`EventStreamClient::recent_events`].
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use atmcp_firehose::{CollectionFilter, EventStreamClient, StreamConfig};
//!
//! let config = StreamConfig::new("wss://jetstream2.us-east.bsky.network/subscribe".parse()?);
//! let client = EventStreamClient::new(config);
//! client.subscribe("posts", CollectionFilter::new(["post"]), |event| {
//!     println!("{:?}", event.uri());
//! });
//! client.connect();
//! // ...
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod buffer;
pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod state;
pub mod subscription;

pub use client::{EventStreamClient, StreamStatus};
pub use config::{StreamConfig, StreamSettings};
pub use connector::{FeedConnection, FeedConnector, FeedFrame, TungsteniteConnector};
pub use error::{StreamError, StreamResult};
pub use event::{CommitInfo, CommitOperation, EventKind, StreamEvent};
pub use state::{ConnectionState, Transition};
pub use subscription::{CollectionFilter, EventCallback};
