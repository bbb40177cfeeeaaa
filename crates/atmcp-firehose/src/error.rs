//! Event stream errors

use thiserror::Error;

/// Result alias for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Event stream errors
#[derive(Debug, Error)]
pub enum StreamError {
    /// Opening the socket failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The open socket failed while reading or writing
    #[error("Socket error: {0}")]
    Socket(String),

    /// No pong arrived within one heartbeat interval
    #[error("Heartbeat timed out")]
    HeartbeatTimeout,

    /// A frame was not a valid event
    #[error("Invalid event frame: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configured endpoint is not a usable socket URL
    #[error("Invalid stream endpoint: {0}")]
    InvalidEndpoint(String),
}
