//! Schema sanitizing for function declarations.
//!
//! The model's function-calling interface rejects `$schema` markers and
//! `additionalProperties` flags, which tool endpoints routinely emit.

use serde_json::Value;

/// Keys removed from every object, at every depth.
pub const STRIPPED_KEYS: [&str; 2] = ["$schema", "additionalProperties"];

/// Deep-copy `value` without any [`STRIPPED_KEYS`].
///
/// Arrays keep their length and order; scalars are returned unchanged.
pub fn sanitize_schema(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !STRIPPED_KEYS.contains(&key.as_str()))
                .map(|(key, v)| (key.clone(), sanitize_schema(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contains_stripped_key(value: &Value) -> bool {
        match value {
            Value::Object(map) => map
                .iter()
                .any(|(k, v)| STRIPPED_KEYS.contains(&k.as_str()) || contains_stripped_key(v)),
            Value::Array(items) => items.iter().any(contains_stripped_key),
            _ => false,
        }
    }

    #[test]
    fn strips_top_level_markers() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": { "placa": { "type": "string" } }
        });
        let clean = sanitize_schema(&schema);
        assert_eq!(
            clean,
            json!({ "type": "object", "properties": { "placa": { "type": "string" } } })
        );
    }

    #[test]
    fn strips_at_every_depth() {
        let schema = json!({
            "type": "object",
            "properties": {
                "to": {
                    "type": "array",
                    "items": { "type": "string", "additionalProperties": true }
                },
                "filtro": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "properties": {
                        "rango": {
                            "anyOf": [
                                { "$schema": "x", "type": "string" },
                                { "type": "object", "additionalProperties": false }
                            ]
                        }
                    }
                }
            }
        });
        let clean = sanitize_schema(&schema);
        assert!(!contains_stripped_key(&clean));
        assert_eq!(clean["properties"]["filtro"]["properties"]["rango"]["anyOf"][0], json!({ "type": "string" }));
        assert_eq!(clean["properties"]["to"]["items"], json!({ "type": "string" }));
    }

    #[test]
    fn arrays_preserve_length_and_order() {
        let schema = json!([{ "$schema": "a", "k": 1 }, 2, "three", [{ "additionalProperties": 1 }]]);
        let clean = sanitize_schema(&schema);
        assert_eq!(clean, json!([{ "k": 1 }, 2, "three", [{}]]));
    }

    #[test]
    fn scalars_pass_through() {
        for value in [json!(null), json!(true), json!(42), json!(1.5), json!("$schema")] {
            assert_eq!(sanitize_schema(&value), value);
        }
    }

    #[test]
    fn input_is_not_mutated() {
        let schema = json!({ "$schema": "x", "type": "object" });
        let _ = sanitize_schema(&schema);
        assert!(schema.get("$schema").is_some());
    }
}
