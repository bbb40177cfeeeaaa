//! Named subscribers and their collection filters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::event::StreamEvent;

/// Subscriber callback; invoked on the supervisor task, outside any lock
pub type EventCallback = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Collection filter.
///
/// Empty matches every event. Otherwise an entry matches a commit whose
/// collection equals it or ends with it as the last NSID segment, so
/// `"post"` matches `app.bsky.feed.post`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionFilter(Vec<String>);

impl CollectionFilter {
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            collections
                .into_iter()
                .map(Into::into)
                .filter(|c: &String| !c.is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, event: &StreamEvent) -> bool {
        self.0.is_empty() || event.collection().is_some_and(|c| self.matches_collection(c))
    }

    pub fn matches_collection(&self, collection: &str) -> bool {
        let last_segment = collection.rsplit('.').next().unwrap_or(collection);
        self.0
            .iter()
            .any(|entry| entry == collection || entry == last_segment)
    }
}

struct Subscription {
    filter: CollectionFilter,
    callback: EventCallback,
}

/// Subscriber registry
#[derive(Default)]
pub(crate) struct Subscriptions {
    entries: HashMap<String, Subscription>,
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Subscriptions {
    /// Register or replace `id`; returns true when an existing one was replaced
    pub(crate) fn insert(
        &mut self,
        id: String,
        filter: CollectionFilter,
        callback: EventCallback,
    ) -> bool {
        self.entries
            .insert(id, Subscription { filter, callback })
            .is_some()
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Callbacks whose filter accepts `event`
    pub(crate) fn matching(&self, event: &StreamEvent) -> Vec<EventCallback> {
        self.entries
            .values()
            .filter(|s| s.filter.matches(event))
            .map(|s| Arc::clone(&s.callback))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CommitInfo, CommitOperation, EventKind};

    fn commit(collection: &str) -> StreamEvent {
        StreamEvent {
            did: "did:plc:a".into(),
            sequence: 1,
            kind: EventKind::Commit,
            commit: Some(CommitInfo {
                collection: collection.into(),
                operation: CommitOperation::Create,
                rkey: "3k".into(),
                rev: None,
                record: None,
                cid: None,
            }),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = CollectionFilter::default();
        assert!(filter.matches(&commit("app.bsky.feed.post")));
        let mut identity = commit("x");
        identity.commit = None;
        identity.kind = EventKind::Identity;
        assert!(filter.matches(&identity));
    }

    #[test]
    fn test_full_nsid_and_suffix() {
        let filter = CollectionFilter::new(["post", "app.bsky.graph.follow"]);
        assert!(filter.matches(&commit("app.bsky.feed.post")));
        assert!(filter.matches(&commit("app.bsky.graph.follow")));
        assert!(!filter.matches(&commit("app.bsky.feed.like")));
        // Suffix means the whole last segment
        assert!(!filter.matches(&commit("app.bsky.feed.repost")));
    }

    #[test]
    fn test_non_commit_events_need_empty_filter() {
        let filter = CollectionFilter::new(["post"]);
        let mut identity = commit("app.bsky.feed.post");
        identity.commit = None;
        assert!(!filter.matches(&identity));
    }

    #[test]
    fn test_registry() {
        let mut subs = Subscriptions::default();
        let noop: EventCallback = Arc::new(|_| {});
        assert!(!subs.insert("a".into(), CollectionFilter::new(["post"]), noop.clone()));
        assert!(subs.insert("a".into(), CollectionFilter::default(), noop.clone()));
        subs.insert("b".into(), CollectionFilter::new(["like"]), noop);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs.matching(&commit("app.bsky.feed.post")).len(), 1);
        assert!(subs.remove("a"));
        assert!(!subs.remove("a"));
    }
}
