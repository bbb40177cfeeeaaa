//! Change-feed events (Jetstream JSON frames).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StreamResult;

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Repository record change
    Commit,
    /// Handle or DID document change
    Identity,
    /// Account status change
    Account,
    /// Anything newer than this client
    #[serde(other)]
    Unknown,
}

/// Record operation of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOperation {
    Create,
    Update,
    Delete,
}

/// Commit payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Collection NSID, e.g. `app.bsky.feed.post`
    pub collection: String,
    pub operation: CommitOperation,
    /// Record key
    pub rkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

/// One event from the change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Repository DID
    pub did: String,
    /// Feed position (microsecond timestamp); used as the resume cursor
    #[serde(rename = "time_us")]
    pub sequence: u64,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitInfo>,
}

impl StreamEvent {
    /// Parse a text frame
    ///
    /// # Errors
    ///
    /// [`crate::StreamError::Parse`] when the frame is not a valid event.
    pub fn parse(text: &str) -> StreamResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Collection NSID for commit events
    pub fn collection(&self) -> Option<&str> {
        self.commit.as_ref().map(|c| c.collection.as_str())
    }

    /// `at://` URI of the affected record
    pub fn uri(&self) -> Option<String> {
        self.commit
            .as_ref()
            .map(|c| format!("at://{}/{}/{}", self.did, c.collection, c.rkey))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMIT: &str = r#"{
        "did": "did:plc:eygmaihciaxprqvxpfvl6flk",
        "time_us": 1725911162329308,
        "kind": "commit",
        "commit": {
            "rev": "3l3qo2vutsw2b",
            "operation": "create",
            "collection": "app.bsky.feed.like",
            "rkey": "3l3qo2vuowo2b",
            "record": {"$type": "app.bsky.feed.like", "createdAt": "2024-09-09T19:46:02.102Z"},
            "cid": "bafyreidc6sydkkbchcyg62v77wbhzvb2mvytlmsychqgwf2xojjtirmzj4"
        }
    }"#;

    #[test]
    fn test_parse_commit() {
        let event = StreamEvent::parse(COMMIT).unwrap();
        assert_eq!(event.kind, EventKind::Commit);
        assert_eq!(event.sequence, 1725911162329308);
        assert_eq!(event.collection(), Some("app.bsky.feed.like"));
        assert_eq!(
            event.uri().as_deref(),
            Some("at://did:plc:eygmaihciaxprqvxpfvl6flk/app.bsky.feed.like/3l3qo2vuowo2b")
        );
    }

    #[test]
    fn test_parse_identity_and_unknown_kinds() {
        let identity = StreamEvent::parse(
            r#"{"did":"did:plc:a","time_us":5,"kind":"identity","identity":{"handle":"a.test"}}"#,
        )
        .unwrap();
        assert_eq!(identity.kind, EventKind::Identity);
        assert!(identity.collection().is_none());

        let future =
            StreamEvent::parse(r#"{"did":"did:plc:a","time_us":6,"kind":"labels"}"#).unwrap();
        assert_eq!(future.kind, EventKind::Unknown);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(StreamEvent::parse("not json").is_err());
        assert!(StreamEvent::parse(r#"{"kind":"commit"}"#).is_err());
    }
}
