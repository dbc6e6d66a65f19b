//! Shallow argument checks against a tool's JSON Schema.
//!
//! Only the top level is inspected: object-ness, required keys and declared
//! property types. Anything deeper is the tool's own business.

use serde_json::Value;

use super::types::ToolParameters;
use crate::error::ColloquyError;

/// Check `args` against `parameters`, reporting every violation at once.
pub fn validate_arguments(args: &Value, parameters: &ToolParameters) -> Result<(), ColloquyError> {
    let violations = collect_violations(args, &parameters.schema);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ColloquyError::InvalidArgument(format!(
            "argument validation failed: {}",
            violations.join("; ")
        )))
    }
}

fn collect_violations(args: &Value, schema: &Value) -> Vec<String> {
    let wants_object = schema.get("type").and_then(Value::as_str) == Some("object");
    let Some(obj) = args.as_object() else {
        return if wants_object {
            vec![format!("expected object arguments, got {}", type_name(args))]
        } else {
            Vec::new()
        };
    };

    let mut violations = Vec::new();
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        violations.extend(
            required
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| !obj.contains_key(*name))
                .map(|name| format!("missing required field '{name}'")),
        );
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in obj {
            let expected = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str);
            if let Some(expected) = expected {
                if !matches_type(value, expected) {
                    violations.push(format!(
                        "field '{key}' expected {expected}, got {}",
                        type_name(value)
                    ));
                }
            }
        }
    }
    violations
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
