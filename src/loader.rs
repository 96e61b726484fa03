use std::collections::HashMap;

use serde_json::Value;

use crate::types::{McpError, SchemaMeta, SchemaRequirementSet, Tool};

/// Parse tool definitions from raw JSON bytes.
///
/// The input is an array of `{name, description, inputSchema}` objects.
/// Handlers are attached separately at registration time.
pub fn parse_tools(data: &[u8]) -> Result<Vec<Tool>, McpError> {
    let raw: Vec<Value> = serde_json::from_slice(data)?;
    let mut tools = Vec::with_capacity(raw.len());

    for val in raw {
        let name = match val["name"].as_str() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(McpError::Validation("tool definition without a name".into())),
        };
        let description = val["description"].as_str().unwrap_or_default().to_string();
        let input_schema = match &val["inputSchema"] {
            Value::Null => serde_json::json!({"type": "object", "properties": {}}),
            schema => schema.clone(),
        };

        let schema_meta = parse_schema_meta(&input_schema);

        tools.push(Tool {
            name,
            description,
            input_schema,
            schema_meta,
        });
    }

    Ok(tools)
}

/// Find a single definition by name in a parsed definition list.
pub fn find_tool(tools: &[Tool], name: &str) -> Result<Tool, McpError> {
    tools
        .iter()
        .find(|t| t.name == name)
        .cloned()
        .ok_or_else(|| McpError::Validation(format!("no definition for tool \"{}\"", name)))
}

/// Extract validation metadata from a JSON Schema object.
fn parse_schema_meta(schema: &Value) -> SchemaMeta {
    let mut meta = SchemaMeta::default();

    if let Some(arr) = schema.get("required").and_then(|v| v.as_array()) {
        meta.required = arr
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
    }

    if let Some(props) = schema.get("properties").and_then(|v| v.as_object()) {
        meta.property_types = props
            .iter()
            .filter_map(|(key, prop)| {
                prop.get("type")
                    .and_then(|t| t.as_str())
                    .map(|t| (key.clone(), t.to_string()))
            })
            .collect();
    }

    meta.deny_additional = schema.get("additionalProperties") == Some(&Value::Bool(false));

    if let Some(arr) = schema.get("oneOf").and_then(|v| v.as_array()) {
        meta.one_of = arr
            .iter()
            .filter_map(|v| {
                v.get("required").and_then(|r| r.as_array()).map(|reqs| {
                    SchemaRequirementSet {
                        required: reqs
                            .iter()
                            .filter_map(|r| r.as_str().map(String::from))
                            .collect(),
                    }
                })
            })
            .collect();
    }

    if let Some(obj) = schema.get("dependencies").and_then(|v| v.as_object()) {
        let mut deps = HashMap::new();
        for (key, val) in obj {
            if let Some(arr) = val.as_array() {
                deps.insert(
                    key.clone(),
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect(),
                );
            }
        }
        meta.dependencies = deps;
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tools() {
        let json = r#"[{"name":"echo","description":"echoes","inputSchema":{"type":"object","properties":{"msg":{"type":"string"}},"required":["msg"]}}]"#;
        let tools = parse_tools(json.as_bytes()).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
        assert_eq!(tools[0].schema_meta.required, vec!["msg"]);
        assert_eq!(tools[0].schema_meta.property_types["msg"], "string");
        assert!(!tools[0].schema_meta.deny_additional);
    }

    #[test]
    fn test_parse_tools_malformed() {
        let result = parse_tools(b"{not valid json");
        assert!(matches!(result, Err(McpError::Json(_))));
    }

    #[test]
    fn test_parse_tools_requires_name() {
        let result = parse_tools(br#"[{"description":"anonymous"}]"#);
        assert!(matches!(result, Err(McpError::Validation(_))));
    }

    #[test]
    fn test_missing_schema_defaults_to_empty_object() {
        let tools = parse_tools(br#"[{"name":"bare"}]"#).unwrap();
        assert_eq!(tools[0].input_schema["type"], "object");
        assert!(tools[0].schema_meta.required.is_empty());
    }

    #[test]
    fn test_parse_tools_with_one_of() {
        let json = r#"[{"name":"otp","description":"otp","inputSchema":{"type":"object","properties":{},"oneOf":[{"required":["phone"]},{"required":["email"]}]}}]"#;
        let tools = parse_tools(json.as_bytes()).unwrap();
        assert_eq!(tools[0].schema_meta.one_of.len(), 2);
    }

    #[test]
    fn test_parse_tools_with_dependencies_and_closed_properties() {
        let json = r#"[{"name":"ch","description":"ch","inputSchema":{"type":"object","properties":{},"additionalProperties":false,"dependencies":{"geo_lat":["geo_lon"]}}}]"#;
        let tools = parse_tools(json.as_bytes()).unwrap();
        assert!(tools[0].schema_meta.dependencies.contains_key("geo_lat"));
        assert!(tools[0].schema_meta.deny_additional);
    }

    #[test]
    fn test_find_tool() {
        let tools = parse_tools(br#"[{"name":"a"},{"name":"b"}]"#).unwrap();
        assert_eq!(find_tool(&tools, "b").unwrap().name, "b");
        assert!(find_tool(&tools, "c").is_err());
    }
}
