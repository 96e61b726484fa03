use serde_json::Value;

use crate::types::Tool;

impl Tool {
    /// Validate arguments against the tool's input schema metadata.
    ///
    /// Every failure is collected; the caller reports them all at once.
    pub fn validate_arguments(&self, args: &Value) -> Result<(), Vec<String>> {
        let empty = serde_json::Map::new();
        let obj = match args {
            Value::Object(obj) => obj,
            Value::Null => &empty,
            other => {
                return Err(vec![format!(
                    "arguments must be an object, got {}",
                    json_type_name(other)
                )]);
            }
        };
        let meta = &self.schema_meta;
        let mut failures = Vec::new();

        for field in &meta.required {
            if !obj.contains_key(field) {
                failures.push(format!("missing required field \"{}\"", field));
            }
        }

        for (field, value) in obj {
            match meta.property_types.get(field) {
                Some(expected) if !type_matches(expected, value) => failures.push(format!(
                    "field \"{}\" must be of type {}, got {}",
                    field,
                    expected,
                    json_type_name(value)
                )),
                None if meta.deny_additional && !is_declared(&self.input_schema, field) => {
                    failures.push(format!("unexpected field \"{}\"", field))
                }
                _ => {}
            }
        }

        // oneOf: at least one set of required fields must be satisfied.
        if !meta.one_of.is_empty() {
            let satisfied = meta
                .one_of
                .iter()
                .any(|set| set.required.iter().all(|f| obj.contains_key(f)));
            if !satisfied {
                failures.push("arguments must satisfy oneOf requirements".into());
            }
        }

        // dependencies: if field A is present, fields B must also be present.
        for (field, deps) in &meta.dependencies {
            if obj.contains_key(field) {
                for dep in deps {
                    if !obj.contains_key(dep) {
                        failures.push(format!(
                            "field \"{}\" requires \"{}\" to also be present",
                            field, dep
                        ));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}

fn is_declared(schema: &Value, field: &str) -> bool {
    schema
        .get("properties")
        .and_then(|p| p.as_object())
        .is_some_and(|p| p.contains_key(field))
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // Unknown type keywords are not enforced.
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
