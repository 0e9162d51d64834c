//! Required-field validation over schemaless documents.

use serde_json::Value;
use store_gateway::models::Fields;

/// Outcome of [`validate_required_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValidation {
    /// `true` when nothing is missing.
    pub is_valid: bool,
    /// Missing names, in the order they were required.
    pub missing_fields: Vec<String>,
}

/// Checks `fields` against `required`.
///
/// A field is missing when it is absent, `null`, or a string that is empty
/// after trimming. Any other value (including `0` and `false`) counts as
/// present.
pub fn validate_required_fields(fields: &Fields, required: &[&str]) -> FieldValidation {
    let missing_fields: Vec<String> = required
        .iter()
        .filter(|name| is_missing(fields.get(**name)))
        .map(|name| name.to_string())
        .collect();

    FieldValidation {
        is_valid: missing_fields.is_empty(),
        missing_fields,
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}
