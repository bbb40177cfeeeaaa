//! Typed operations and their type-erased registry form

use async_trait::async_trait;
use jsonschema::Validator;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use atmcp_core::{AtError, AtResult};

use super::context::OperationContext;
use super::policy::AccessPolicy;

/// One tool-level operation
///
/// ```rust,ignore
/// struct GetProfile;
///
/// #[async_trait]
/// impl Operation for GetProfile {
///     const NAME: &'static str = "get_profile";
///     const DESCRIPTION: &'static str = "Fetch an actor's profile";
///     const POLICY: AccessPolicy = AccessPolicy::Public;
///     type Input = ProfileInput;
///     type Output = Value;
///
///     async fn execute(&self, ctx: &OperationContext, input: ProfileInput) -> AtResult<Value> {
///         let request = XrpcRequest::query("app.bsky.actor.getProfile");
///         ctx.call(request.param("actor", input.actor)).await
///     }
/// }
/// ```
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Catalogue name
    const NAME: &'static str;
    /// Catalogue description
    const DESCRIPTION: &'static str;
    /// Access tier
    const POLICY: AccessPolicy;

    /// Parameters; their JSON schema is published and enforced
    type Input: DeserializeOwned + JsonSchema + Send;
    /// Result value
    type Output: Serialize + Send;

    /// Run with validated input under the resolved identity
    async fn execute(&self, ctx: &OperationContext, input: Self::Input) -> AtResult<Self::Output>;
}

/// Static description of a registered operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub policy: AccessPolicy,
    pub input_schema: Value,
}

#[async_trait]
pub(crate) trait ErasedOperation: Send + Sync {
    fn descriptor(&self) -> &OperationDescriptor;

    fn validator(&self) -> &Validator;

    async fn run(&self, ctx: &OperationContext, input: Value) -> AtResult<Value>;
}

pub(crate) struct Registered<O: Operation> {
    operation: O,
    descriptor: OperationDescriptor,
    validator: Validator,
}

impl<O: Operation> Registered<O> {
    pub(crate) fn new(operation: O) -> Result<Self, RegistrationError> {
        let schema = schemars::schema_for!(O::Input);
        let input_schema = serde_json::to_value(&schema).map_err(|e| RegistrationError::Schema {
            name: O::NAME,
            reason: e.to_string(),
        })?;
        let validator =
            jsonschema::validator_for(&input_schema).map_err(|e| RegistrationError::Schema {
                name: O::NAME,
                reason: e.to_string(),
            })?;

        Ok(Self {
            operation,
            descriptor: OperationDescriptor {
                name: O::NAME,
                description: O::DESCRIPTION,
                policy: O::POLICY,
                input_schema,
            },
            validator,
        })
    }
}

#[async_trait]
impl<O: Operation> ErasedOperation for Registered<O> {
    fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    fn validator(&self) -> &Validator {
        &self.validator
    }

    async fn run(&self, ctx: &OperationContext, input: Value) -> AtResult<Value> {
        let input: O::Input = serde_json::from_value(input).map_err(|e| {
            AtError::validation(format!("Invalid parameters for '{}': {e}", O::NAME))
                .with_operation(O::NAME)
        })?;
        let output = self.operation.execute(ctx, input).await.map_err(|e| match e.operation {
            Some(_) => e,
            None => e.with_operation(O::NAME),
        })?;
        serde_json::to_value(output).map_err(|e| {
            AtError::unknown(format!("Could not encode result: {e}")).with_operation(O::NAME)
        })
    }
}

/// Failure to add an operation to the registry
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// Two operations share a name
    #[error("Operation '{0}' is already registered")]
    Duplicate(&'static str),

    /// The input schema could not be generated or compiled
    #[error("Invalid input schema for '{name}': {reason}")]
    Schema {
        /// Operation name
        name: &'static str,
        /// Compiler message
        reason: String,
    },
}
