//! Schema-less document field bags.

pub use serde_json::Value;

/// Field name → tagged value. Ordered by key, so equality is structural.
pub type Fields = serde_json::Map<String, Value>;

/// A field is defined when it is present and not `null`.
pub fn is_defined(fields: &Fields, name: &str) -> bool {
    matches!(fields.get(name), Some(v) if !v.is_null())
}

/// Look up a field only when it is defined.
pub fn defined_value<'a>(fields: &'a Fields, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_defined_semantics() {
        let f = fields(json!({"a": "x", "b": null, "c": false, "d": 0, "e": ""}));
        assert!(is_defined(&f, "a"));
        assert!(!is_defined(&f, "b"));
        // falsy values are still defined
        assert!(is_defined(&f, "c"));
        assert!(is_defined(&f, "d"));
        assert!(is_defined(&f, "e"));
        assert!(!is_defined(&f, "missing"));
    }

    #[test]
    fn test_defined_value() {
        let f = fields(json!({"uid": "u1", "ownerId": null}));
        assert_eq!(defined_value(&f, "uid"), Some(&json!("u1")));
        assert_eq!(defined_value(&f, "ownerId"), None);
    }
}
