//! Shared services and the per-invocation context handed to operations

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use atmcp_auth::SessionManager;
use atmcp_core::{AtError, AtResult, Identity, ProtocolClient, XrpcRequest};
use atmcp_firehose::EventStreamClient;

/// Long-lived handles every operation may use
#[derive(Debug, Clone)]
pub struct Services {
    pub protocol: Arc<dyn ProtocolClient>,
    pub session: SessionManager,
    /// `None` when the change feed is disabled
    pub stream: Option<EventStreamClient>,
}

impl Services {
    pub fn new(
        protocol: Arc<dyn ProtocolClient>,
        session: SessionManager,
        stream: Option<EventStreamClient>,
    ) -> Self {
        Self {
            protocol,
            session,
            stream,
        }
    }
}

/// Context of one operation invocation, bound to the identity the
/// dispatcher resolved for it
#[derive(Debug)]
pub struct OperationContext {
    services: Services,
    identity: Identity,
    operation: &'static str,
}

impl OperationContext {
    pub(crate) fn new(services: Services, identity: Identity, operation: &'static str) -> Self {
        Self {
            services,
            identity,
            operation,
        }
    }

    /// Identity the operation executes under
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn session(&self) -> &SessionManager {
        &self.services.session
    }

    pub fn stream(&self) -> Option<&EventStreamClient> {
        self.services.stream.as_ref()
    }

    /// DID of the acting account
    ///
    /// # Errors
    ///
    /// Authentication error when running anonymously.
    pub fn actor(&self) -> AtResult<&str> {
        self.identity
            .did()
            .ok_or_else(|| AtError::authentication_required(self.operation))
    }

    /// Issue a request through the bound identity; failures are classified
    ///
    /// # Errors
    ///
    /// The classified protocol failure.
    pub async fn call(&self, request: XrpcRequest) -> AtResult<Value> {
        trace!(
            operation = self.operation,
            nsid = %request.nsid,
            authenticated = self.identity.is_authenticated(),
            "Protocol call"
        );
        self.services
            .protocol
            .call(&self.identity, request)
            .await
            .map_err(|e| AtError::from(e).with_operation(self.operation))
    }
}
