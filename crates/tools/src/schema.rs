//! Tool schema compatibility checks.
//!
//! Some function-calling backends reject array-typed parameters, so tools
//! whose top-level properties include one are left out of the catalog.

/// True if no top-level property of `schema` is array-typed.
///
/// `type` may be a string or a list of strings (`["array", "null"]`).
pub fn is_flat_schema(schema: &serde_json::Value) -> bool {
    let Some(obj) = schema.as_object() else {
        return false;
    };
    let Some(properties) = obj.get("properties") else {
        return true;
    };
    let Some(properties) = properties.as_object() else {
        return false;
    };

    properties.values().all(|prop| match prop.get("type") {
        Some(serde_json::Value::String(t)) => t != "array",
        Some(serde_json::Value::Array(types)) => !types.iter().any(|t| t == "array"),
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_properties_are_flat() {
        assert!(is_flat_schema(&json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"},
                "filters": {"type": "object"}
            }
        })));
    }

    #[test]
    fn no_properties_is_flat() {
        assert!(is_flat_schema(&json!({"type": "object"})));
    }

    #[test]
    fn array_property_is_rejected() {
        assert!(!is_flat_schema(&json!({
            "type": "object",
            "properties": {"ids": {"type": "array", "items": {"type": "integer"}}}
        })));
        assert!(!is_flat_schema(&json!({
            "type": "object",
            "properties": {"tags": {"type": ["array", "null"]}}
        })));
    }

    #[test]
    fn non_object_schema_is_rejected() {
        assert!(!is_flat_schema(&json!("string")));
        assert!(!is_flat_schema(&json!({"properties": []})));
    }
}
