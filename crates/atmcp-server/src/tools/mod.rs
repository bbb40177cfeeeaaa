//! Tool catalogue
//!
//! A representative set covering every access tier: session tools, public
//! and enhanced reads, private writes, and local change-feed queries.

mod actor;
mod auth;
mod feed;
mod stream;

pub use actor::{FollowActor, GetProfile};
pub use auth::{AuthStatus, CompleteAuthorization, Logout, StartAuthorization};
pub use feed::{CreatePost, GetPostThread, GetTimeline, SearchPosts};
pub use stream::{StreamRecentEvents, StreamStatusTool};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dispatch::{Dispatcher, RegistrationError};

/// Register every tool
///
/// # Errors
///
/// See [`Dispatcher::register`].
pub fn register_all(dispatcher: &mut Dispatcher) -> Result<(), RegistrationError> {
    dispatcher.register(AuthStatus)?;
    dispatcher.register(StartAuthorization)?;
    dispatcher.register(CompleteAuthorization)?;
    dispatcher.register(Logout)?;
    dispatcher.register(GetProfile)?;
    dispatcher.register(FollowActor)?;
    dispatcher.register(SearchPosts)?;
    dispatcher.register(GetPostThread)?;
    dispatcher.register(GetTimeline)?;
    dispatcher.register(CreatePost)?;
    dispatcher.register(StreamStatusTool)?;
    dispatcher.register(StreamRecentEvents)?;
    Ok(())
}

/// Input of parameterless tools
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoInput {}

/// Reference to a record created by a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RecordRef {
    pub uri: String,
    pub cid: String,
}
