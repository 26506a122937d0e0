//! JSON schemas for OpenAI structured output.

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A named JSON schema sent with a structured-output request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    /// Build the strict schema for `T`.
    #[must_use]
    pub fn of<T: StructuredOutput>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: T::openai_schema(),
        }
    }
}

/// Types usable as OpenAI structured output.
///
/// Implemented for every `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// An OpenAI-compatible JSON schema for this type.
    ///
    /// OpenAI strict mode requires `additionalProperties: false` on every
    /// object, every property listed in `required` (nullable ones included),
    /// and no `$ref`.
    fn openai_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        fix_object_schemas(&mut value);
        inline_refs(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn fix_object_schemas(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                if let Some(Value::Object(props)) = map.get("properties") {
                    let required: Vec<Value> =
                        props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(required));
                }
            }

            for (_, v) in map.iter_mut() {
                fix_object_schemas(v);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(fix_object_schemas),
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(def) = ref_path
                    .strip_prefix("#/definitions/")
                    .and_then(|name| definitions.get(name))
                {
                    *value = def.clone();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
                if let [single] = all_of.as_slice() {
                    *value = single.clone();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use schemars::JsonSchema;
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    enum Shade {
        Light,
        Dark,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Inner {
        note: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct Outer {
        title: String,
        shade: Shade,
        inner: Option<Inner>,
    }

    #[test]
    fn every_property_is_required_and_closed() {
        let schema = Outer::openai_schema();
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(required.contains(&"title"));
        assert!(required.contains(&"inner"));
    }

    #[test]
    fn refs_are_inlined() {
        let schema = Outer::openai_schema();
        let text = schema.to_string();
        assert!(!text.contains("$ref"), "schema still has refs: {text}");
        assert!(schema.get("definitions").is_none());
        assert!(text.contains("LIGHT") && text.contains("DARK"));
    }

    #[test]
    fn response_schema_carries_name() {
        let schema = ResponseSchema::of::<Outer>("outer");
        assert_eq!(schema.name, "outer");
        assert_eq!(schema.schema["type"], "object");
    }
}
