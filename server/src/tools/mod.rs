//! Tool layer: the JSON-RPC method table behind `tools/call`.
//!
//! Every tool declares a JSON-Schema for its parameters; validation runs
//! before the handler, every invocation runs under the configured deadline,
//! and every result is wrapped in the `{success, data?, error?,
//! execution_time_ms, metadata?}` envelope. A failed call returns an error
//! envelope; nothing throws through the transport.

pub mod get_document;
pub mod index_document;
pub mod search_documents;

use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

use crate::error::ToolError;

/// Handler output before envelope wrapping.
pub struct ToolOutput {
    pub data: Value,
    pub metadata: Map<String, Value>,
}

impl ToolOutput {
    pub fn new(data: Value) -> Self {
        Self { data, metadata: Map::new() }
    }

    pub fn with_metadata(data: Value, metadata: Map<String, Value>) -> Self {
        Self { data, metadata }
    }
}

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>>;

pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    fn execute<'a>(&'a self, params: Map<String, Value>) -> ToolFuture<'a>;
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// The common result envelope shared by all tools.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub execution_time_ms: f64,
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("success".into(), Value::Bool(self.success));
        out.insert("execution_time_ms".into(), json!(self.execution_time_ms));
        if let Some(data) = &self.data {
            out.insert("data".into(), data.clone());
        }
        if let Some(error) = &self.error {
            out.insert("error".into(), Value::String(error.clone()));
        }
        if !self.metadata.is_empty() {
            out.insert("metadata".into(), Value::Object(self.metadata.clone()));
        }
        Value::Object(out)
    }
}

// ---------------------------------------------------------------------------
// Parameter validation
// ---------------------------------------------------------------------------

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// Validate `params` against a tool's input schema: required fields, types,
/// string length bounds, numeric ranges, array item bounds and enum
/// membership. Defaults from the schema are filled in. Unknown parameters
/// are rejected when the schema closes the object.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Map<String, Value>, ToolError> {
    let empty = Map::new();
    let supplied = match params {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => {
            return Err(ToolError::Validation(format!(
                "Parameters must be an object, got {}",
                type_name(other)
            )))
        }
    };

    let properties = schema.get("properties").and_then(|p| p.as_object()).cloned().unwrap_or_default();
    let additional_allowed =
        schema.get("additionalProperties").and_then(|v| v.as_bool()).unwrap_or(true);

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !supplied.contains_key(field) {
                return Err(ToolError::Validation(format!("Missing required parameter: {field}")));
            }
        }
    }

    let mut validated = Map::new();
    for (name, value) in supplied {
        let Some(prop) = properties.get(name) else {
            if additional_allowed {
                validated.insert(name.clone(), value.clone());
                continue;
            }
            return Err(ToolError::Validation(format!("Unknown parameter: {name}")));
        };
        if value.is_null() {
            continue;
        }

        if let Some(expected) = prop.get("type").and_then(|t| t.as_str()) {
            if !type_matches(value, expected) {
                return Err(ToolError::Validation(format!(
                    "Parameter '{name}' must be of type {expected}, got {}",
                    type_name(value)
                )));
            }
        }

        if let Some(s) = value.as_str() {
            if let Some(min) = prop.get("minLength").and_then(|v| v.as_u64()) {
                if (s.chars().count() as u64) < min {
                    return Err(ToolError::Validation(format!(
                        "Parameter '{name}' must be at least {min} characters"
                    )));
                }
            }
            if let Some(max) = prop.get("maxLength").and_then(|v| v.as_u64()) {
                if (s.chars().count() as u64) > max {
                    return Err(ToolError::Validation(format!(
                        "Parameter '{name}' must be at most {max} characters"
                    )));
                }
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = prop.get("minimum").and_then(|v| v.as_f64()) {
                if n < min {
                    return Err(ToolError::Validation(format!(
                        "Parameter '{name}' must be >= {min}"
                    )));
                }
            }
            if let Some(max) = prop.get("maximum").and_then(|v| v.as_f64()) {
                if n > max {
                    return Err(ToolError::Validation(format!(
                        "Parameter '{name}' must be <= {max}"
                    )));
                }
            }
        }

        if let Some(items) = value.as_array() {
            if let Some(min) = prop.get("minItems").and_then(|v| v.as_u64()) {
                if (items.len() as u64) < min {
                    return Err(ToolError::Validation(format!(
                        "Parameter '{name}' must have at least {min} items"
                    )));
                }
            }
            if let Some(max) = prop.get("maxItems").and_then(|v| v.as_u64()) {
                if (items.len() as u64) > max {
                    return Err(ToolError::Validation(format!(
                        "Parameter '{name}' must have at most {max} items"
                    )));
                }
            }
        }

        if let Some(allowed) = prop.get("enum").and_then(|e| e.as_array()) {
            if !allowed.contains(value) {
                let rendered: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                return Err(ToolError::Validation(format!(
                    "Parameter '{name}' must be one of: {}",
                    rendered.join(", ")
                )));
            }
        }

        validated.insert(name.clone(), value.clone());
    }

    for (name, prop) in &properties {
        if !validated.contains_key(name) {
            if let Some(default) = prop.get("default") {
                if !default.is_null() {
                    validated.insert(name.clone(), default.clone());
                }
            }
        }
    }

    Ok(validated)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The method table: validates, executes under a deadline and wraps results.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self { tools: Vec::new(), timeout }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// The `tools/list` catalog.
    pub fn catalog(&self) -> Value {
        Value::Array(
            self.tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name(),
                        "description": tool.description(),
                        "inputSchema": tool.input_schema(),
                    })
                })
                .collect(),
        )
    }

    /// Validate, execute under the deadline, and wrap into the envelope.
    pub async fn call(&self, name: &str, params: &Value) -> ToolResult {
        let started = Instant::now();

        let Some(tool) = self.get(name) else {
            return envelope_error(started, format!("Unknown tool: {name}"), Map::new());
        };

        let validated = match validate_params(&tool.input_schema(), params) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(tool = name, error = %e, "Parameter validation failed");
                return envelope_error(started, e.envelope_message(), Map::new());
            }
        };

        match tokio::time::timeout(self.timeout, tool.execute(validated)).await {
            Ok(Ok(output)) => ToolResult {
                success: true,
                data: Some(output.data),
                error: None,
                execution_time_ms: elapsed_ms(started),
                metadata: output.metadata,
            },
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "Tool call failed");
                envelope_error(started, e.envelope_message(), Map::new())
            }
            Err(_) => {
                error!(tool = name, timeout_secs = self.timeout.as_secs(), "Tool call timed out");
                let e = ToolError::Timeout(self.timeout.as_secs());
                envelope_error(started, e.envelope_message(), Map::new())
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}

fn envelope_error(started: Instant, message: String, metadata: Map<String, Value>) -> ToolResult {
    ToolResult {
        success: false,
        data: None,
        error: Some(message),
        execution_time_ms: elapsed_ms(started),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 1, "maxLength": 10 },
                "limit": { "type": "integer", "default": 10, "minimum": 1, "maximum": 100 },
                "sort_by": { "type": "string", "enum": ["relevance", "date", "name"], "default": "relevance" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    #[test]
    fn missing_required_parameter_fails() {
        let err = validate_params(&sample_schema(), &json!({})).unwrap_err();
        assert!(err.to_string().contains("Missing required parameter: query"));
    }

    #[test]
    fn defaults_are_applied() {
        let validated = validate_params(&sample_schema(), &json!({ "query": "abc" })).unwrap();
        assert_eq!(validated["limit"], json!(10));
        assert_eq!(validated["sort_by"], json!("relevance"));
    }

    #[test]
    fn type_mismatch_fails() {
        let err =
            validate_params(&sample_schema(), &json!({ "query": 5 })).unwrap_err();
        assert!(err.to_string().contains("must be of type string"));
    }

    #[test]
    fn length_and_range_bounds_enforced() {
        let long = "x".repeat(11);
        assert!(validate_params(&sample_schema(), &json!({ "query": long })).is_err());
        assert!(validate_params(&sample_schema(), &json!({ "query": "a", "limit": 0 })).is_err());
        assert!(validate_params(&sample_schema(), &json!({ "query": "a", "limit": 101 })).is_err());
    }

    #[test]
    fn enum_membership_enforced() {
        let err = validate_params(&sample_schema(), &json!({ "query": "a", "sort_by": "size" }))
            .unwrap_err();
        assert!(err.to_string().contains("must be one of"));
    }

    #[test]
    fn closed_object_rejects_unknown_parameters() {
        let err = validate_params(&sample_schema(), &json!({ "query": "a", "extra": true }))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown parameter: extra"));
    }

    #[test]
    fn null_optional_values_are_dropped_then_defaulted() {
        let validated =
            validate_params(&sample_schema(), &json!({ "query": "a", "limit": null })).unwrap();
        assert_eq!(validated["limit"], json!(10));
    }

    #[test]
    fn envelope_serializes_expected_fields() {
        let result = ToolResult {
            success: false,
            data: None,
            error: Some("boom".into()),
            execution_time_ms: 1.25,
            metadata: Map::new(),
        };
        let value = result.to_value();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("boom"));
        assert!(value.get("data").is_none());
        assert!(value.get("metadata").is_none());
    }

    struct SlowTool;

    impl Tool for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn description(&self) -> &'static str {
            "sleeps"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object", "properties": {}, "additionalProperties": false })
        }
        fn execute<'a>(&'a self, _params: Map<String, Value>) -> ToolFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ToolOutput::new(json!({})))
            })
        }
    }

    #[tokio::test]
    async fn timeout_produces_error_envelope() {
        let mut registry = ToolRegistry::new(Duration::from_millis(50));
        registry.register(Arc::new(SlowTool));
        let result = registry.call("slow", &json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn unknown_tool_produces_error_envelope() {
        let registry = ToolRegistry::new(Duration::from_secs(1));
        let result = registry.call("nope", &json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown tool"));
    }
}
