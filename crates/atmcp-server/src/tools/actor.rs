//! Actor and social graph tools

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use atmcp_core::{AtError, AtResult, XrpcRequest};

use super::RecordRef;
use super::feed::{created_record, now_timestamp};
use crate::dispatch::{AccessPolicy, Operation, OperationContext};

pub struct GetProfile;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetProfileInput {
    /// Handle or DID
    #[schemars(length(min = 1))]
    pub actor: String,
}

#[async_trait]
impl Operation for GetProfile {
    const NAME: &'static str = "get_profile";
    const DESCRIPTION: &'static str = "Fetch an actor's public profile by handle or DID";
    const POLICY: AccessPolicy = AccessPolicy::Public;

    type Input = GetProfileInput;
    type Output = Value;

    async fn execute(&self, ctx: &OperationContext, input: GetProfileInput) -> AtResult<Value> {
        ctx.call(XrpcRequest::query("app.bsky.actor.getProfile").param("actor", input.actor))
            .await
    }
}

pub struct FollowActor;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FollowActorInput {
    /// Handle or DID of the account to follow
    #[schemars(length(min = 1))]
    pub actor: String,
}

#[async_trait]
impl Operation for FollowActor {
    const NAME: &'static str = "follow_actor";
    const DESCRIPTION: &'static str = "Follow an account from the authenticated account";
    const POLICY: AccessPolicy = AccessPolicy::Private;

    type Input = FollowActorInput;
    type Output = RecordRef;

    async fn execute(
        &self,
        ctx: &OperationContext,
        input: FollowActorInput,
    ) -> AtResult<RecordRef> {
        let repo = ctx.actor()?.to_string();
        let subject = if input.actor.starts_with("did:") {
            input.actor
        } else {
            resolve_did(ctx, &input.actor).await?
        };

        let record = json!({
            "$type": "app.bsky.graph.follow",
            "subject": subject,
            "createdAt": now_timestamp(),
        });
        let response = ctx
            .call(XrpcRequest::procedure(
                "com.atproto.repo.createRecord",
                json!({
                    "repo": repo,
                    "collection": "app.bsky.graph.follow",
                    "record": record,
                }),
            ))
            .await?;
        created_record(response)
    }
}

async fn resolve_did(ctx: &OperationContext, handle: &str) -> AtResult<String> {
    let response = ctx
        .call(XrpcRequest::query("com.atproto.identity.resolveHandle").param("handle", handle))
        .await?;
    response
        .get("did")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AtError::not_found(format!("Could not resolve handle '{handle}'")))
}
