//! Operation dispatcher
//!
//! Every tool runs through [`Dispatcher::handle`]: schema validation, access
//! policy resolution (one exhaustive match over [`AccessPolicy`]), execution
//! through the resolved identity, and conversion of any failure into an
//! [`OperationResult`]. An authentication failure on the authenticated
//! identity triggers one session recovery and one retry. Enhanced operations
//! whose recovery fails retry anonymously instead.

mod context;
mod operation;
mod policy;
mod validation;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use atmcp_core::{AtError, AtResult, ErrorKind, Identity, OperationResult};

pub use context::{OperationContext, Services};
pub use operation::{Operation, OperationDescriptor, RegistrationError};
pub use policy::{AccessPolicy, Availability};

use operation::{ErasedOperation, Registered};

/// Catalogue entry: the descriptor plus current availability
#[derive(Debug, Clone, Serialize)]
pub struct CatalogueEntry {
    #[serde(flatten)]
    pub descriptor: OperationDescriptor,
    pub available: bool,
    pub availability: &'static str,
}

/// Operation registry and shared execution path; clones share the registry
#[derive(Clone)]
pub struct Dispatcher {
    services: Services,
    operations: Arc<HashMap<&'static str, Arc<dyn ErasedOperation>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.operations.keys().collect();
        names.sort();
        f.debug_struct("Dispatcher")
            .field("operations", &names)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            operations: Arc::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Add an operation
    ///
    /// # Errors
    ///
    /// Duplicate names and schemas that fail to compile are rejected.
    pub fn register<O: Operation>(&mut self, operation: O) -> Result<(), RegistrationError> {
        if self.operations.contains_key(O::NAME) {
            return Err(RegistrationError::Duplicate(O::NAME));
        }
        let registered = Registered::new(operation)?;
        Arc::make_mut(&mut self.operations).insert(O::NAME, Arc::new(registered));
        debug!(operation = O::NAME, policy = ?O::POLICY, "Operation registered");
        Ok(())
    }

    /// Validate, authorize and run `name` with raw JSON input
    pub async fn handle(&self, name: &str, input: Value) -> OperationResult<Value> {
        match self.execute(name, input).await {
            Ok(value) => OperationResult::Success(value),
            Err(err) => {
                debug!(
                    operation = name,
                    kind = %err.kind,
                    error = %err.message,
                    "Operation failed"
                );
                OperationResult::Failure(err)
            }
        }
    }

    async fn execute(&self, name: &str, input: Value) -> AtResult<Value> {
        let operation = self.operations.get(name).cloned().ok_or_else(|| {
            AtError::validation(format!("Unknown operation '{name}'")).with_fields(["name"])
        })?;
        let descriptor = operation.descriptor();
        let input = if input.is_null() { json!({}) } else { input };

        validation::validate(operation.validator(), &input, descriptor.name)?;

        let identity = self.resolve_identity(descriptor.policy, descriptor.name).await?;
        let generation = identity.generation();
        let ctx = OperationContext::new(self.services.clone(), identity, descriptor.name);

        match operation.run(&ctx, input.clone()).await {
            Err(err) if err.kind == ErrorKind::Authentication => {
                let Some(generation) = generation else {
                    return Err(err);
                };
                warn!(
                    operation = descriptor.name,
                    generation, "Authenticated call rejected; recovering session"
                );
                let identity = match self.services.session.recover_expired(generation).await {
                    Ok(_) => self.resolve_identity(descriptor.policy, descriptor.name).await?,
                    Err(e) if descriptor.policy == AccessPolicy::Enhanced => {
                        warn!(
                            operation = descriptor.name,
                            error = %e.message,
                            "Session recovery failed; retrying anonymously"
                        );
                        Identity::Anonymous
                    }
                    Err(e) => return Err(e.with_operation(descriptor.name)),
                };
                let ctx = OperationContext::new(self.services.clone(), identity, descriptor.name);
                let result = operation.run(&ctx, input).await;
                if result.is_ok() {
                    info!(
                        operation = descriptor.name,
                        "Operation succeeded after session recovery"
                    );
                }
                result
            }
            other => other,
        }
    }

    async fn resolve_identity(&self, policy: AccessPolicy, operation: &str) -> AtResult<Identity> {
        let session = &self.services.session;
        match policy {
            AccessPolicy::Public => Ok(Identity::Anonymous),
            AccessPolicy::Private => session
                .identity_for(true)
                .await
                .map_err(|_| AtError::authentication_required(operation)),
            AccessPolicy::Enhanced => Ok(session.opportunistic_identity().await),
        }
    }

    /// Current availability of `name`; `None` for unknown operations
    pub fn availability(&self, name: &str) -> Option<Availability> {
        let operation = self.operations.get(name)?;
        let session = &self.services.session;
        Some(Availability::evaluate(
            operation.descriptor().policy,
            session.is_authenticated(),
            session.has_credentials(),
        ))
    }

    /// Whether `name` could run right now, without running it
    pub fn is_available(&self, name: &str) -> bool {
        self.availability(name).is_some_and(Availability::is_available)
    }

    pub fn availability_message(&self, name: &str) -> Option<&'static str> {
        self.availability(name).map(Availability::message)
    }

    /// Every operation with its current availability, sorted by name
    pub fn catalogue(&self) -> Vec<CatalogueEntry> {
        let session = &self.services.session;
        let authenticated = session.is_authenticated();
        let has_credentials = session.has_credentials();

        let mut entries: Vec<CatalogueEntry> = self
            .operations
            .values()
            .map(|operation| {
                let descriptor = operation.descriptor().clone();
                let availability =
                    Availability::evaluate(descriptor.policy, authenticated, has_credentials);
                CatalogueEntry {
                    descriptor,
                    available: availability.is_available(),
                    availability: availability.message(),
                }
            })
            .collect();
        entries.sort_by_key(|e| e.descriptor.name);
        entries
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
