//! Session tools: status and the interactive delegated authorization

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use atmcp_auth::SessionStatus;
use atmcp_core::{AtResult, SessionSummary};
use atmcp_firehose::StreamStatus;

use super::NoInput;
use crate::dispatch::{AccessPolicy, Operation, OperationContext};

/// Session and change-feed status
pub struct AuthStatus;

#[derive(Debug, Serialize)]
pub struct AuthStatusOutput {
    pub session: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamStatus>,
}

#[async_trait]
impl Operation for AuthStatus {
    const NAME: &'static str = "auth_status";
    const DESCRIPTION: &'static str =
        "Report the session state, the configured credentials and the change-feed connection";
    const POLICY: AccessPolicy = AccessPolicy::Public;

    type Input = NoInput;
    type Output = AuthStatusOutput;

    async fn execute(&self, ctx: &OperationContext, _input: NoInput) -> AtResult<AuthStatusOutput> {
        Ok(AuthStatusOutput {
            session: ctx.session().status(),
            stream: ctx.stream().map(|stream| stream.status()),
        })
    }
}

/// Begin a delegated authorization
pub struct StartAuthorization;

#[derive(Debug, Serialize)]
pub struct AuthorizationUrl {
    /// Open this URL in a browser to grant access
    pub url: String,
    /// Echoed back by the redirect; pass it to `complete_authorization`
    pub state: String,
}

#[async_trait]
impl Operation for StartAuthorization {
    const NAME: &'static str = "start_authorization";
    const DESCRIPTION: &'static str =
        "Start a delegated (OAuth) authorization and return the URL the account holder must open";
    const POLICY: AccessPolicy = AccessPolicy::Public;

    type Input = NoInput;
    type Output = AuthorizationUrl;

    async fn execute(&self, ctx: &OperationContext, _input: NoInput) -> AtResult<AuthorizationUrl> {
        let start = ctx.session().start_authorization()?;
        Ok(AuthorizationUrl {
            url: start.url.to_string(),
            state: start.state,
        })
    }
}

/// Finish a delegated authorization
pub struct CompleteAuthorization;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompleteAuthorizationInput {
    /// `code` query parameter of the redirect
    #[schemars(length(min = 1))]
    pub code: String,
    /// `state` query parameter of the redirect
    #[schemars(length(min = 1))]
    pub state: String,
}

#[async_trait]
impl Operation for CompleteAuthorization {
    const NAME: &'static str = "complete_authorization";
    const DESCRIPTION: &'static str =
        "Exchange the code and state from the authorization redirect for a session";
    const POLICY: AccessPolicy = AccessPolicy::Public;

    type Input = CompleteAuthorizationInput;
    type Output = SessionSummary;

    async fn execute(
        &self,
        ctx: &OperationContext,
        input: CompleteAuthorizationInput,
    ) -> AtResult<SessionSummary> {
        ctx.session()
            .complete_authorization(&input.code, &input.state)
            .await
    }
}

/// End the session, revoking delegated grants
pub struct Logout;

#[async_trait]
impl Operation for Logout {
    const NAME: &'static str = "logout";
    const DESCRIPTION: &'static str =
        "End the active session; delegated grants are revoked and forgotten";
    const POLICY: AccessPolicy = AccessPolicy::Public;

    type Input = NoInput;
    type Output = SessionStatus;

    async fn execute(&self, ctx: &OperationContext, _input: NoInput) -> AtResult<SessionStatus> {
        ctx.session().logout().await;
        Ok(ctx.session().status())
    }
}
