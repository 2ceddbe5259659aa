//! Argument coercion for tool calls.
//!
//! Tool arguments arrive as a loosely-typed JSON object. Integers may be sent as JSON floats,
//! optional values may be absent or `null`, and polymorphic filters accept either a number (an
//! id) or a string (a name).

use rmcp::model::JsonObject;
use serde_json::Value;
use tp_mcp_client::{EntityType, IdOrName, Result, TpError};

/// Non-empty string argument.
pub fn string_arg<'a>(args: &'a JsonObject, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// # Errors
///
/// Returns a validation error when the argument is missing or empty.
pub fn required_string<'a>(args: &'a JsonObject, key: &str) -> Result<&'a str> {
    string_arg(args, key)
        .ok_or_else(|| TpError::validation(key, format!("{key} parameter is required")))
}

/// Integer argument; floats are truncated toward zero.
///
/// # Errors
///
/// Returns a validation error when the value is present but not a number.
pub fn int_arg(args: &JsonObject, key: &str) -> Result<Option<i64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => number_to_i64(v).map(Some).ok_or_else(|| {
            TpError::validation(key, format!("argument {key} must be a number, got {v}"))
        }),
    }
}

/// # Errors
///
/// Returns a validation error when the value is missing or not a number.
pub fn required_int(args: &JsonObject, key: &str) -> Result<i64> {
    int_arg(args, key)?
        .ok_or_else(|| TpError::validation(key, format!("missing required argument: {key}")))
}

/// Integer argument clamped to `[min, max]`; absent or non-numeric values yield `default`.
pub fn clamped_take(args: &JsonObject, key: &str, default: u32, min: u32, max: u32) -> u32 {
    let raw = int_arg(args, key)
        .ok()
        .flatten()
        .unwrap_or_else(|| i64::from(default));
    let clamped = raw.clamp(i64::from(min), i64::from(max));
    u32::try_from(clamped).unwrap_or(default)
}

/// String array argument; non-string items are dropped.
pub fn string_list_arg(args: &JsonObject, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Number → [`IdOrName::Id`], string → [`IdOrName::Name`]; anything else is ignored.
pub fn id_or_name_arg(args: &JsonObject, key: &str) -> Option<IdOrName> {
    match args.get(key)? {
        Value::String(s) => Some(IdOrName::Name(s.clone())),
        v @ Value::Number(_) => number_to_i64(v).map(IdOrName::Id),
        _ => None,
    }
}

pub fn object_arg<'a>(args: &'a JsonObject, key: &str) -> Option<&'a JsonObject> {
    args.get(key).and_then(Value::as_object)
}

/// # Errors
///
/// Returns a validation error for a missing type and
/// [`TpError::InvalidEntityType`] for an unknown one.
pub fn entity_type_arg(args: &JsonObject, key: &str) -> Result<EntityType> {
    required_string(args, key)?.parse()
}

fn number_to_i64(v: &Value) -> Option<i64> {
    if let Some(i) = v.as_i64() {
        return Some(i);
    }
    let f = v.as_f64()?;
    if !f.is_finite() {
        return None;
    }
    // Float-to-int `as` saturates.
    #[allow(clippy::cast_possible_truncation)]
    let truncated = f.trunc() as i64;
    Some(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> JsonObject {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn integers_accept_floats() {
        let args = obj(json!({ "id": 42.0, "big": 7.9, "text": "7" }));
        assert_eq!(required_int(&args, "id").expect("id"), 42);
        assert_eq!(int_arg(&args, "big").expect("big"), Some(7));
        assert!(int_arg(&args, "text").is_err());
        assert_eq!(int_arg(&args, "absent").expect("absent"), None);
        assert!(required_int(&args, "absent").is_err());
    }

    #[test]
    fn take_is_defaulted_and_clamped() {
        assert_eq!(clamped_take(&obj(json!({})), "take", 100, 1, 1000), 100);
        assert_eq!(clamped_take(&obj(json!({ "take": 0 })), "take", 100, 1, 1000), 1);
        assert_eq!(clamped_take(&obj(json!({ "take": -5 })), "take", 100, 1, 1000), 1);
        assert_eq!(clamped_take(&obj(json!({ "take": 5000 })), "take", 100, 1, 1000), 1000);
        assert_eq!(clamped_take(&obj(json!({ "take": 250.0 })), "take", 25, 1, 100), 100);
        assert_eq!(clamped_take(&obj(json!({ "take": "lots" })), "take", 25, 1, 100), 25);
    }

    #[test]
    fn polymorphic_filters() {
        let args = obj(json!({ "project": 123, "team": "Backend", "feature": 9.0, "user": true }));
        assert_eq!(id_or_name_arg(&args, "project"), Some(IdOrName::Id(123)));
        assert_eq!(
            id_or_name_arg(&args, "team"),
            Some(IdOrName::Name("Backend".to_string()))
        );
        assert_eq!(id_or_name_arg(&args, "feature"), Some(IdOrName::Id(9)));
        assert_eq!(id_or_name_arg(&args, "user"), None);
        assert_eq!(id_or_name_arg(&args, "missing"), None);
    }

    #[test]
    fn string_lists_drop_non_strings() {
        let args = obj(json!({ "include": ["Id", 3, "Name", null] }));
        assert_eq!(string_list_arg(&args, "include"), vec!["Id", "Name"]);
        assert!(string_list_arg(&args, "missing").is_empty());
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let args = obj(json!({ "type": "" }));
        assert!(string_arg(&args, "type").is_none());
        assert!(matches!(
            entity_type_arg(&args, "type"),
            Err(TpError::Validation { .. })
        ));
        assert!(matches!(
            entity_type_arg(&obj(json!({ "type": "Spaceship" })), "type"),
            Err(TpError::InvalidEntityType(_))
        ));
    }
}
