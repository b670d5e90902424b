//! The uniform tool executor contract and the data model every layer in
//! the decorator stack operates on.

use std::any::Any;
use std::collections::HashSet;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::CallContext;
use crate::error::CoreError;

/// One model-issued invocation. Immutable once dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub session_id: String,
    pub task_id: String,
    pub parent_task_id: String,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments: Map::new(),
            session_id: String::new(),
            task_id: String::new(),
            parent_task_id: String::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Clone this call but route it at a different tool name. Used by the
    /// degradation router and the legacy alias layer.
    pub fn retargeted(&self, tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            call_id: self.call_id.clone(),
            tool_name: tool_name.into(),
            arguments,
            session_id: self.session_id.clone(),
            task_id: self.task_id.clone(),
            parent_task_id: self.parent_task_id.clone(),
        }
    }
}

/// Reserved metadata keys the core itself writes. Tools may add their own
/// keys but must not overwrite these.
pub mod reserved_keys {
    pub const LEGACY_TOOL_ALIAS: &str = "legacy_tool_alias";
    pub const CANONICAL_TOOL: &str = "canonical_tool";
    pub const DEGRADED_FROM: &str = "degraded_from";
    pub const DEGRADED_TO: &str = "degraded_to";
    pub const USER_PROMPT: &str = "user_prompt";
    pub const POLICY_ENFORCEMENT: &str = "policy_enforcement";
    pub const POLICY_WARNING: &str = "policy_warning";

    pub const ALL: &[&str] = &[
        LEGACY_TOOL_ALIAS,
        CANONICAL_TOOL,
        DEGRADED_FROM,
        DEGRADED_TO,
        USER_PROMPT,
        POLICY_ENFORCEMENT,
        POLICY_WARNING,
    ];
}

/// Outcome of one call. Invariant: exactly one of `content` / `error` is
/// meaningfully populated; never both empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub error: Option<ToolApplicationError>,
    pub metadata: Map<String, Value>,
    pub session_id: String,
    pub task_id: String,
    pub parent_task_id: String,
}

/// An application-level error: the tool ran and produced a negative
/// outcome. Never affects the circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolApplicationError {
    pub message: String,
    pub transient: bool,
}

impl ToolApplicationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            error: None,
            metadata: Map::new(),
            session_id: String::new(),
            task_id: String::new(),
            parent_task_id: String::new(),
        }
    }

    pub fn failed(call_id: impl Into<String>, error: ToolApplicationError) -> Self {
        Self {
            call_id: call_id.into(),
            content: String::new(),
            error: Some(error),
            metadata: Map::new(),
            session_id: String::new(),
            task_id: String::new(),
            parent_task_id: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Insert a metadata key, refusing to clobber a reserved key that was
    /// already set by an earlier layer.
    pub fn set_metadata(&mut self, key: &str, value: Value) {
        if reserved_keys::ALL.contains(&key) && self.metadata.contains_key(key) {
            return;
        }
        self.metadata.insert(key.to_string(), value);
    }
}

/// JSON-Schema-shaped static self-description for the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    pub schema_type: SchemaType,
    /// Required by invariant when `schema_type == Array`.
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    pub fn scalar(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            items: None,
        }
    }

    pub fn array(items: PropertySchema) -> Self {
        Self {
            schema_type: SchemaType::Array,
            items: Some(Box::new(items)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub properties: IndexMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl ParameterSchema {
    /// Registry-level test invariant: every array property must declare
    /// `items`.
    pub fn validate_shape(&self) -> Result<(), String> {
        for (name, prop) in &self.properties {
            if prop.schema_type == SchemaType::Array && prop.items.is_none() {
                return Err(format!(
                    "property '{name}' has type array but no 'items' schema"
                ));
            }
        }
        Ok(())
    }
}

/// Static operational tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub category: String,
    pub tags: HashSet<String>,
    pub dangerous: bool,
    pub safety_level: u8,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            tags: HashSet::new(),
            dangerous: false,
            safety_level: 0,
        }
    }

    pub fn dangerous(mut self, safety_level: u8) -> Self {
        self.dangerous = true;
        self.safety_level = safety_level;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// `max(safety_level, 3 if dangerous else 0)`.
    pub fn effective_safety_level(&self) -> u8 {
        self.safety_level.max(if self.dangerous { 3 } else { 0 })
    }
}

/// Uniform contract every tool exposes. Decorators wrap executors; all but
/// the legacy alias layer delegate `definition`/`metadata` to their inner
/// executor unchanged.
///
/// `as_any` backs the typed unwrap helper in `registry.rs`, which walks a
/// decorator chain back to its base before re-wrapping on re-registration.
#[async_trait]
pub trait ToolExecutor: Any + Send + Sync {
    /// The error channel is reserved for infrastructure failures; an
    /// application-level negative outcome belongs in `ToolResult::error`.
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError>;

    fn definition(&self) -> ToolDefinition;

    fn metadata(&self) -> ToolMetadata;

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_safety_level_takes_the_max() {
        let routine = ToolMetadata::new("read_file", "fs");
        assert_eq!(routine.effective_safety_level(), 0);

        let dangerous_low = ToolMetadata::new("rm", "fs").dangerous(1);
        assert_eq!(dangerous_low.effective_safety_level(), 3);

        let dangerous_high = ToolMetadata::new("rm_rf", "fs").dangerous(4);
        assert_eq!(dangerous_high.effective_safety_level(), 4);
    }

    #[test]
    fn array_property_without_items_fails_shape_validation() {
        let mut schema = ParameterSchema::default();
        schema.properties.insert(
            "tags".to_string(),
            PropertySchema {
                schema_type: SchemaType::Array,
                items: None,
            },
        );
        assert!(schema.validate_shape().is_err());
    }

    #[test]
    fn array_property_with_items_passes_shape_validation() {
        let mut schema = ParameterSchema::default();
        schema.properties.insert(
            "tags".to_string(),
            PropertySchema::array(PropertySchema::scalar(SchemaType::String)),
        );
        assert!(schema.validate_shape().is_ok());
    }

    #[test]
    fn tool_result_does_not_overwrite_reserved_metadata() {
        let mut result = ToolResult::ok("c1", "done");
        result.set_metadata(reserved_keys::DEGRADED_FROM, Value::String("grep".into()));
        result.set_metadata(
            reserved_keys::DEGRADED_FROM,
            Value::String("clobber".into()),
        );
        assert_eq!(
            result.metadata.get(reserved_keys::DEGRADED_FROM),
            Some(&Value::String("grep".into()))
        );
    }
}
