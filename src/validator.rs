//! Argument Validator.
//!
//! Pre-execution check against a tool's declared parameter schema. Lenient
//! type matching: a numeric JSON value matches `number` or `integer`,
//! booleans/strings/arrays/objects match their declared type exactly, and
//! `null` is skipped. Extra fields not present in `properties` are allowed.
//! Tools with no declared properties skip validation entirely.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;

use crate::context::CallContext;
use crate::error::CoreError;
use crate::tool::{ParameterSchema, SchemaType, ToolCall, ToolDefinition, ToolExecutor, ToolMetadata, ToolResult};

/// Check `arguments` against `schema`, returning the first violation found.
pub fn validate(schema: &ParameterSchema, arguments: &serde_json::Map<String, Value>) -> Result<(), String> {
    if schema.properties.is_empty() {
        return Ok(());
    }

    for required in &schema.required {
        match arguments.get(required) {
            None => return Err(format!("missing required field '{required}'")),
            Some(Value::Null) => return Err(format!("required field '{required}' is null")),
            Some(_) => {}
        }
    }

    for (key, value) in arguments {
        if value.is_null() {
            continue;
        }
        let Some(prop) = schema.properties.get(key) else {
            continue; // extra fields permitted
        };
        if !type_matches(&prop.schema_type, value) {
            return Err(format!(
                "field '{key}' expected type {:?}, got {}",
                prop.schema_type,
                value_kind(value)
            ));
        }
    }

    Ok(())
}

fn type_matches(expected: &SchemaType, value: &Value) -> bool {
    match expected {
        SchemaType::Number => value.is_number(),
        SchemaType::Integer => value.is_number(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::String => value.is_string(),
        SchemaType::Array => value.is_array(),
        SchemaType::Object => value.is_object(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decorator: validates arguments before delegating. On failure, returns a
/// `ToolResult` whose content begins `"Invalid arguments"` without invoking
/// the delegate.
pub struct ValidatorExecutor {
    pub(crate) inner: Arc<dyn ToolExecutor>,
}

impl ValidatorExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ToolExecutor for ValidatorExecutor {
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
        let schema = self.inner.definition().parameters;
        if let Err(detail) = validate(&schema, &call.arguments) {
            return Ok(ToolResult::failed(
                call.call_id.clone(),
                crate::tool::ToolApplicationError::new(format!("Invalid arguments: {detail}")),
            ));
        }
        self.inner.execute(ctx, call).await
    }

    fn definition(&self) -> ToolDefinition {
        self.inner.definition()
    }

    fn metadata(&self) -> ToolMetadata {
        self.inner.metadata()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::PropertySchema;
    use serde_json::json;

    fn schema_with_required_name_and_count() -> ParameterSchema {
        let mut schema = ParameterSchema::default();
        schema
            .properties
            .insert("name".into(), PropertySchema::scalar(SchemaType::String));
        schema
            .properties
            .insert("count".into(), PropertySchema::scalar(SchemaType::Number));
        schema.required = vec!["name".into()];
        schema
    }

    #[test]
    fn missing_required_field_fails() {
        let schema = schema_with_required_name_and_count();
        let args = json!({ "count": 1 }).as_object().unwrap().clone();
        assert!(validate(&schema, &args).is_err());
    }

    #[test]
    fn present_required_field_with_extra_unknown_field_passes() {
        let schema = schema_with_required_name_and_count();
        let args = json!({ "name": "x", "unexpected": true })
            .as_object()
            .unwrap()
            .clone();
        assert!(validate(&schema, &args).is_ok());
    }

    #[test]
    fn integer_value_matches_number_type() {
        let schema = schema_with_required_name_and_count();
        let args = json!({ "name": "x", "count": 5 }).as_object().unwrap().clone();
        assert!(validate(&schema, &args).is_ok());
    }

    #[test]
    fn wrong_type_fails() {
        let schema = schema_with_required_name_and_count();
        let args = json!({ "name": 5 }).as_object().unwrap().clone();
        assert!(validate(&schema, &args).is_err());
    }

    #[test]
    fn empty_properties_skips_validation() {
        let schema = ParameterSchema::default();
        let args = json!({ "anything": "goes" }).as_object().unwrap().clone();
        assert!(validate(&schema, &args).is_ok());
    }

    #[test]
    fn null_value_is_skipped() {
        let schema = schema_with_required_name_and_count();
        let args = json!({ "name": "x", "count": null }).as_object().unwrap().clone();
        assert!(validate(&schema, &args).is_ok());
    }
}
