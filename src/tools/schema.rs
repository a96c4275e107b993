//! Argument schemas in the subset of JSON Schema function declarations accept.

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde_json::{Map, Value};

const KEPT_KEYS: [&str; 7] = [
    "type",
    "description",
    "properties",
    "required",
    "items",
    "enum",
    "nullable",
];

/// Inline JSON schema for `T`, stripped to the keys function declarations accept
pub(crate) fn parameters_for<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::openapi3().with(|s| {
        s.inline_subschemas = true;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let value = serde_json::to_value(schema.schema).unwrap_or(Value::Null);
    strip(value)
}

fn strip(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    let mut kept = Map::new();
    for (key, value) in map {
        if !KEPT_KEYS.contains(&key.as_str()) {
            continue;
        }
        let value = match key.as_str() {
            "properties" => match value {
                Value::Object(props) => Value::Object(
                    props.into_iter().map(|(k, v)| (k, strip(v))).collect(),
                ),
                other => other,
            },
            "items" => strip(value),
            _ => value,
        };
        kept.insert(key, value);
    }
    Value::Object(kept)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    /// Arguments
    struct Example {
        /// What to look up
        query: String,
        limit: Option<u32>,
        tags: Vec<String>,
    }

    #[test]
    fn schema_keeps_only_supported_keys() {
        let schema = parameters_for::<Example>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("title").is_none());
        assert!(schema.get("$schema").is_none());
        assert_eq!(schema["properties"]["query"]["description"], "What to look up");
        assert_eq!(schema["properties"]["limit"]["nullable"], true);
        assert!(schema["properties"]["limit"].get("format").is_none());
        assert_eq!(schema["properties"]["tags"]["items"]["type"], "string");
        assert_eq!(schema["required"], serde_json::json!(["query", "tags"]));
    }
}
