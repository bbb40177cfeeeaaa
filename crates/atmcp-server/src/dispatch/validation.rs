//! Input validation against the schemas generated for each operation

use jsonschema::Validator;
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;

use atmcp_core::{AtError, AtResult};

/// Check `input`, collecting every violation and the fields involved
pub(crate) fn validate(validator: &Validator, input: &Value, operation: &str) -> AtResult<()> {
    let mut fields: Vec<String> = Vec::new();
    let mut messages = Vec::new();

    for error in validator.iter_errors(input) {
        let path = field_path(&error.instance_path.to_string());
        let field = match &error.kind {
            ValidationErrorKind::Required { property } => {
                let property = property.as_str().unwrap_or_default();
                if path.is_empty() {
                    property.to_string()
                } else {
                    format!("{path}.{property}")
                }
            }
            _ => path,
        };

        if field.is_empty() {
            messages.push(error.to_string());
        } else {
            messages.push(format!("{field}: {error}"));
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }

    if messages.is_empty() {
        return Ok(());
    }
    Err(AtError::validation(format!(
        "Invalid parameters for '{operation}': {}",
        messages.join("; ")
    ))
    .with_fields(fields)
    .with_operation(operation))
}

/// `/reply/uri` -> `reply.uri`
fn field_path(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}
