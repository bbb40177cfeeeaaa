//! Uniform operation result returned across the dispatcher boundary.

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::AtError;

/// Tagged result every operation hands back to its caller.
///
/// Serializes as `{"ok": true, "value": ...}` or
/// `{"ok": false, "error": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult<T> {
    /// The operation succeeded
    Success(T),
    /// The operation failed with a classified error
    Failure(AtError),
}

impl<T> OperationResult<T> {
    /// Whether this is a success
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Borrow the error, if any
    pub fn error(&self) -> Option<&AtError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(err),
        }
    }

    /// Borrow the value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Map the success value
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> OperationResult<U> {
        match self {
            Self::Success(value) => OperationResult::Success(f(value)),
            Self::Failure(err) => OperationResult::Failure(err),
        }
    }

    /// Convert into a standard `Result`
    ///
    /// # Errors
    ///
    /// Returns the classified error when this is a failure.
    pub fn into_result(self) -> Result<T, AtError> {
        self.into()
    }
}

impl<T> From<Result<T, AtError>> for OperationResult<T> {
    fn from(result: Result<T, AtError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failure(err),
        }
    }
}

impl<T> From<OperationResult<T>> for Result<T, AtError> {
    fn from(result: OperationResult<T>) -> Self {
        match result {
            OperationResult::Success(value) => Ok(value),
            OperationResult::Failure(err) => Err(err),
        }
    }
}

impl<T: Serialize> Serialize for OperationResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OperationResult", 2)?;
        match self {
            Self::Success(value) => {
                state.serialize_field("ok", &true)?;
                state.serialize_field("value", value)?;
            }
            Self::Failure(err) => {
                state.serialize_field("ok", &false)?;
                state.serialize_field("error", err)?;
            }
        }
        state.end()
    }
}
