//! Feed tools: search, threads, timeline, posting

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use atmcp_core::{AtError, AtResult, XrpcRequest};

use super::RecordRef;
use crate::dispatch::{AccessPolicy, Operation, OperationContext};

const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Record timestamp in the protocol's datetime format
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `{uri, cid}` of a `createRecord` response
pub(crate) fn created_record(response: Value) -> AtResult<RecordRef> {
    serde_json::from_value(response)
        .map_err(|e| AtError::unknown(format!("Unexpected createRecord response: {e}")))
}

/// Search posts; viewer state is included when authenticated
pub struct SearchPosts;

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    Top,
    Latest,
}

impl SearchSort {
    fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Latest => "latest",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchPostsInput {
    /// Search query (Lucene-style syntax supported)
    #[schemars(length(min = 1))]
    pub query: String,
    #[schemars(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    /// Pagination cursor from a previous response
    pub cursor: Option<String>,
    pub sort: Option<SearchSort>,
    /// Only posts by this handle or DID
    pub author: Option<String>,
}

#[async_trait]
impl Operation for SearchPosts {
    const NAME: &'static str = "search_posts";
    const DESCRIPTION: &'static str =
        "Search posts by text; results carry viewer state when a session is active";
    const POLICY: AccessPolicy = AccessPolicy::Enhanced;

    type Input = SearchPostsInput;
    type Output = Value;

    async fn execute(&self, ctx: &OperationContext, input: SearchPostsInput) -> AtResult<Value> {
        let request = XrpcRequest::query("app.bsky.feed.searchPosts")
            .param("q", input.query)
            .param_opt("limit", input.limit)
            .param_opt("cursor", input.cursor)
            .param_opt("sort", input.sort.map(SearchSort::as_str))
            .param_opt("author", input.author);
        ctx.call(request).await
    }
}

/// Fetch a post with its replies and parents
pub struct GetPostThread;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPostThreadInput {
    /// `at://` URI of the post
    #[schemars(regex(pattern = r"^at://"))]
    pub uri: String,
    /// Reply levels to include
    #[schemars(range(max = 1000))]
    pub depth: Option<u32>,
    /// Parent levels to include
    #[schemars(range(max = 1000))]
    pub parent_height: Option<u32>,
}

#[async_trait]
impl Operation for GetPostThread {
    const NAME: &'static str = "get_post_thread";
    const DESCRIPTION: &'static str =
        "Fetch a post thread; includes viewer state when a session is active";
    const POLICY: AccessPolicy = AccessPolicy::Enhanced;

    type Input = GetPostThreadInput;
    type Output = Value;

    async fn execute(&self, ctx: &OperationContext, input: GetPostThreadInput) -> AtResult<Value> {
        let request = XrpcRequest::query("app.bsky.feed.getPostThread")
            .param("uri", input.uri)
            .param_opt("depth", input.depth)
            .param_opt("parentHeight", input.parent_height);
        ctx.call(request).await
    }
}

/// The authenticated account's home timeline
pub struct GetTimeline;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTimelineInput {
    #[schemars(range(min = 1, max = 100))]
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[async_trait]
impl Operation for GetTimeline {
    const NAME: &'static str = "get_timeline";
    const DESCRIPTION: &'static str = "Read the authenticated account's home timeline";
    const POLICY: AccessPolicy = AccessPolicy::Private;

    type Input = GetTimelineInput;
    type Output = Value;

    async fn execute(&self, ctx: &OperationContext, input: GetTimelineInput) -> AtResult<Value> {
        let request = XrpcRequest::query("app.bsky.feed.getTimeline")
            .param_opt("limit", input.limit)
            .param_opt("cursor", input.cursor);
        ctx.call(request).await
    }
}

/// Publish a text post
pub struct CreatePost;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePostInput {
    /// Post text
    #[schemars(length(min = 1, max = 300))]
    pub text: String,
    /// BCP-47 language tags
    #[serde(default)]
    #[schemars(length(max = 3))]
    pub langs: Vec<String>,
}

#[async_trait]
impl Operation for CreatePost {
    const NAME: &'static str = "create_post";
    const DESCRIPTION: &'static str = "Publish a text post from the authenticated account";
    const POLICY: AccessPolicy = AccessPolicy::Private;

    type Input = CreatePostInput;
    type Output = RecordRef;

    async fn execute(&self, ctx: &OperationContext, input: CreatePostInput) -> AtResult<RecordRef> {
        let repo = ctx.actor()?.to_string();

        let mut record = json!({
            "$type": POST_COLLECTION,
            "text": input.text,
            "createdAt": now_timestamp(),
        });
        if !input.langs.is_empty() {
            record["langs"] = json!(input.langs);
        }

        let response = ctx
            .call(XrpcRequest::procedure(
                "com.atproto.repo.createRecord",
                json!({
                    "repo": repo,
                    "collection": POST_COLLECTION,
                    "record": record,
                }),
            ))
            .await?;
        created_record(response)
    }
}
