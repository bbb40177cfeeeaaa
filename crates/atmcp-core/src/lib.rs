//! # atmcp-core
//!
//! Shared vocabulary of the atmcp access layer:
//!
//! - [`error`] - classified [`AtError`] with a closed [`ErrorKind`] taxonomy
//! - [`result`] - the uniform [`OperationResult`] handed to callers
//! - [`session`] - [`Session`], [`TokenPair`] and the two [`Identity`] kinds
//! - [`protocol`] - the [`ProtocolClient`] capability trait and its raw
//!   [`ProtocolError`]
//!
//! Enable the `testing` feature for [`testing::MockProtocolClient`].

pub mod error;
pub mod protocol;
pub mod result;
pub mod session;

#[cfg(feature = "testing")]
pub mod testing;

#[doc(inline)]
pub use error::{AtError, AtResult, ErrorKind};
#[doc(inline)]
pub use protocol::{ProtocolClient, ProtocolError, XrpcMethod, XrpcRequest, classify};
#[doc(inline)]
pub use result::OperationResult;
#[doc(inline)]
pub use session::{AuthenticatedIdentity, Identity, Session, SessionSummary, TokenPair};
