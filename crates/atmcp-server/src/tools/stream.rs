//! Change-feed tools; read local state only

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use atmcp_core::AtResult;
use atmcp_firehose::{StreamEvent, StreamStatus};

use super::NoInput;
use crate::dispatch::{AccessPolicy, Operation, OperationContext};

const DEFAULT_EVENT_LIMIT: usize = 25;

pub struct StreamStatusTool;

#[derive(Debug, Serialize)]
pub struct StreamStatusOutput {
    /// False when the change feed is disabled by configuration
    pub enabled: bool,
    #[serde(flatten)]
    pub status: Option<StreamStatus>,
}

#[async_trait]
impl Operation for StreamStatusTool {
    const NAME: &'static str = "stream_status";
    const DESCRIPTION: &'static str =
        "Change-feed connection state, last sequence, reconnect attempts and subscriber count";
    const POLICY: AccessPolicy = AccessPolicy::Public;

    type Input = NoInput;
    type Output = StreamStatusOutput;

    async fn execute(
        &self,
        ctx: &OperationContext,
        _input: NoInput,
    ) -> AtResult<StreamStatusOutput> {
        let status = ctx.stream().map(|stream| stream.status());
        Ok(StreamStatusOutput {
            enabled: status.is_some(),
            status,
        })
    }
}

pub struct StreamRecentEvents;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RecentEventsInput {
    /// Maximum events to return, newest first (default 25)
    #[schemars(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
    /// Collection NSID or its last segment, e.g. `app.bsky.feed.post` or `post`
    pub collection: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecentEventsOutput {
    pub count: usize,
    pub events: Vec<StreamEvent>,
}

#[async_trait]
impl Operation for StreamRecentEvents {
    const NAME: &'static str = "stream_recent_events";
    const DESCRIPTION: &'static str =
        "Recently buffered change-feed events, newest first, optionally filtered by collection";
    const POLICY: AccessPolicy = AccessPolicy::Public;

    type Input = RecentEventsInput;
    type Output = RecentEventsOutput;

    async fn execute(
        &self,
        ctx: &OperationContext,
        input: RecentEventsInput,
    ) -> AtResult<RecentEventsOutput> {
        let limit = input.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
        let events = ctx
            .stream()
            .map(|stream| stream.recent_events(limit, input.collection.as_deref()))
            .unwrap_or_default();
        Ok(RecentEventsOutput {
            count: events.len(),
            events,
        })
    }
}
