//! Classified error handling for the access layer.
//!
//! Every failure that crosses the operation boundary is an [`AtError`]: a
//! small, serializable value tagged with one [`ErrorKind`]. Components below
//! the dispatcher keep their own `thiserror` enums and convert at the
//! boundary, so callers only ever match on the kind.
//!
//! ## Example
//!
//! ```rust
//! use atmcp_core::error::{AtError, ErrorKind};
//!
//! let err = AtError::authentication("create_post requires authentication");
//! assert_eq!(err.kind, ErrorKind::Authentication);
//! assert!(!err.is_retryable());
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result type alias for access-layer operations
pub type AtResult<T> = Result<T, AtError>;

/// Error classification for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input shape or range
    Validation,
    /// Missing, invalid or expired credentials
    Authentication,
    /// Valid session without sufficient rights
    Authorization,
    /// Upstream rate limit hit
    RateLimit,
    /// Requested entity does not exist
    NotFound,
    /// Transport-level failure
    Network,
    /// Anything not classified above
    Unknown,
}

impl ErrorKind {
    /// Get a human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Validation => "Invalid parameters",
            Self::Authentication => "Authentication required",
            Self::Authorization => "Not authorized",
            Self::RateLimit => "Rate limit exceeded",
            Self::NotFound => "Not found",
            Self::Network => "Network error",
            Self::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Classified access-layer error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtError {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Retry hint, only set for [`ErrorKind::RateLimit`]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "retry_after_secs",
        with = "duration_secs"
    )]
    pub retry_after: Option<Duration>,
    /// Input fields that failed validation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Operation that produced the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Stable machine-readable reason within the kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AtError {
    /// Create a new error with kind and message
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            fields: Vec::new(),
            operation: None,
            code: None,
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create an authentication error
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Create an authorization error
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// Create a rate limit error with an optional retry hint
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(ErrorKind::RateLimit, message)
        }
    }

    /// Create a not-found error
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a network error
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Create an unclassified error
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// The error a `Private` operation returns when no session is active
    #[must_use]
    pub fn authentication_required(operation: &str) -> Self {
        Self::authentication(format!(
            "Operation '{operation}' requires authentication, but no active session is available"
        ))
        .with_operation(operation)
    }

    /// Attach the failing input fields
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Set the operation context
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attach a reason code callers can match on
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Whether this error carries reason `code`
    #[must_use]
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    /// Check if this error is worth retrying later
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::RateLimit | ErrorKind::Network)
    }
}

impl fmt::Display for AtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if !self.fields.is_empty() {
            write!(f, " (fields: {})", self.fields.join(", "))?;
        }
        if let Some(retry_after) = self.retry_after {
            write!(f, " (retry after {}s)", retry_after.as_secs())?;
        }
        Ok(())
    }
}

impl std::error::Error for AtError {}

impl From<serde_json::Error> for AtError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::validation(format!("JSON error: {err}"))
        } else {
            Self::unknown(format!("JSON error: {err}"))
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
