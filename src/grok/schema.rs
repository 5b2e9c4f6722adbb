//! Response schemas: generation, wire flattening and validation.
//!
//! Grok's structured-output mode rejects `$ref` nodes, so every schema sent
//! upstream is fully inlined. The same flattened schema is used to validate
//! what comes back.

use jsonschema::JSONSchema;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::QueryError;

/// Maximum `$ref` substitution depth before a schema is considered recursive.
const MAX_INLINE_DEPTH: usize = 16;

/// `format` values the upstream understands; schemars' numeric ones are dropped.
const STANDARD_FORMATS: &[&str] = &["date-time", "date", "time", "uri", "email"];

/// A flattened response schema plus the name it is sent under.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    /// Build the wire schema for a response type.
    pub fn for_type<T: JsonSchema>(name: Option<&str>) -> Result<Self, QueryError> {
        let generator = SchemaSettings::draft07()
            .with(|s| {
                s.inline_subschemas = true;
            })
            .into_generator();
        let root = generator.into_root_schema_for::<T>();
        let raw = serde_json::to_value(root)
            .map_err(|e| QueryError::generic(format!("Failed to serialize schema: {}", e)))?;

        Ok(Self {
            name: name.map(str::to_string).unwrap_or_else(T::schema_name),
            schema: to_wire_schema(raw)?,
        })
    }

    /// Validate a parsed response and convert it to `T`.
    ///
    /// Values that are valid JSON but the wrong shape are rejected, never
    /// coerced.
    pub fn validate<T: DeserializeOwned>(&self, value: Value) -> Result<T, QueryError> {
        let compiled = JSONSchema::compile(&self.schema).map_err(|e| {
            QueryError::generic(format!("Invalid response schema `{}`: {}", self.name, e))
        })?;

        if let Err(errors) = compiled.validate(&value) {
            let details: Vec<String> = errors
                .take(5)
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            return Err(schema_violation(&self.name, &details.join("; ")));
        }

        serde_json::from_value(value).map_err(|e| schema_violation(&self.name, &e.to_string()))
    }
}

fn schema_violation(name: &str, details: &str) -> QueryError {
    QueryError::generic(format!(
        "Response failed schema validation for `{}`: {}",
        name, details
    ))
}

/// Convert a generated JSON Schema into the flattened form the upstream accepts.
pub fn to_wire_schema(mut raw: Value) -> Result<Value, QueryError> {
    let definitions = match raw.as_object_mut() {
        Some(obj) => {
            obj.remove("$schema");
            match obj.remove("definitions") {
                Some(Value::Object(defs)) => defs,
                _ => Map::new(),
            }
        }
        None => Map::new(),
    };

    inline(raw, &definitions, 0)
}

fn inline(value: Value, definitions: &Map<String, Value>, depth: usize) -> Result<Value, QueryError> {
    match value {
        Value::Object(mut obj) => {
            if let Some(reference) = obj.get("$ref").and_then(Value::as_str).map(str::to_string) {
                if depth >= MAX_INLINE_DEPTH {
                    return Err(QueryError::generic(format!(
                        "Schema reference {} is recursive and cannot be flattened",
                        reference
                    )));
                }
                let target = reference
                    .rsplit('/')
                    .next()
                    .and_then(|name| definitions.get(name))
                    .cloned()
                    .ok_or_else(|| {
                        QueryError::generic(format!("Unresolvable schema reference {}", reference))
                    })?;
                obj.remove("$ref");
                let mut resolved = inline(target, definitions, depth + 1)?;
                // Sibling keywords (e.g. description) survive the substitution
                if let Value::Object(resolved_obj) = &mut resolved {
                    for (k, v) in obj {
                        resolved_obj.entry(k).or_insert(v);
                    }
                }
                return Ok(resolved);
            }

            let nonstandard_format = obj
                .get("format")
                .and_then(Value::as_str)
                .map_or(false, |f| !STANDARD_FORMATS.contains(&f));
            if nonstandard_format {
                obj.remove("format");
            }

            let mut out = Map::with_capacity(obj.len());
            for (k, v) in obj {
                out.insert(k, inline(v, definitions, depth)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|v| inline(v, definitions, depth))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn is_flat(value: &Value) -> bool {
        match value {
            Value::Object(obj) => !obj.contains_key("$ref") && obj.values().all(is_flat),
            Value::Array(items) => items.iter().all(is_flat),
            _ => true,
        }
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Inner {
        label: String,
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Outer {
        count: u32,
        items: Vec<Inner>,
        note: Option<String>,
    }

    #[test]
    fn test_generated_schema_is_flat() {
        let schema = ResponseSchema::for_type::<Outer>(None).unwrap();
        assert_eq!(schema.name, "Outer");
        assert!(is_flat(&schema.schema));
        assert!(schema.schema.get("definitions").is_none());
        assert!(schema.schema.get("$schema").is_none());
        assert_eq!(
            schema.schema["properties"]["items"]["items"]["properties"]["label"]["type"],
            "string"
        );
        assert!(schema.schema["properties"]["count"].get("format").is_none());
    }

    #[test]
    fn test_explicit_name() {
        let schema = ResponseSchema::for_type::<Outer>(Some("outer_result")).unwrap();
        assert_eq!(schema.name, "outer_result");
    }

    #[test]
    fn test_refs_are_inlined() {
        let raw = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "user": { "$ref": "#/definitions/User", "description": "author" }
            },
            "definitions": {
                "User": { "type": "object", "properties": { "name": { "type": "string" } } }
            }
        });

        let wire = to_wire_schema(raw).unwrap();
        assert!(is_flat(&wire));
        assert_eq!(wire["properties"]["user"]["properties"]["name"]["type"], "string");
        assert_eq!(wire["properties"]["user"]["description"], "author");
    }

    #[test]
    fn test_recursive_ref_is_rejected() {
        let raw = json!({
            "$ref": "#/definitions/Node",
            "definitions": {
                "Node": { "type": "object", "properties": { "next": { "$ref": "#/definitions/Node" } } }
            }
        });

        assert!(matches!(to_wire_schema(raw), Err(QueryError::Generic { .. })));
    }

    #[test]
    fn test_validate_accepts_matching_value() {
        let schema = ResponseSchema::for_type::<Outer>(None).unwrap();
        let value = json!({"count": 1, "items": [{"label": "a"}], "note": null});

        let parsed: Outer = schema.validate(value).unwrap();
        assert_eq!(parsed.items[0].label, "a");
    }

    #[test]
    fn test_validate_rejects_wrong_shape() {
        let schema = ResponseSchema::for_type::<Outer>(None).unwrap();
        let value = json!({"count": "one", "items": [{"label": 3}]});

        let err = schema.validate::<Outer>(value).unwrap_err();
        assert!(err.to_string().contains("schema validation"));
    }

    #[test]
    fn test_validate_rejects_missing_required_field() {
        let schema = ResponseSchema::for_type::<Outer>(None).unwrap();
        let err = schema.validate::<Outer>(json!({"items": []})).unwrap_err();
        assert!(matches!(err, QueryError::Generic { .. }));
    }
}
