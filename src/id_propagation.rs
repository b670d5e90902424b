//! ID Propagator.
//!
//! Post-execution: fill empty `call_id`/`session_id`/`task_id`/
//! `parent_task_id` on the result from the corresponding call field. Never
//! overwrites a non-empty field the tool already set.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::CoreError;
use crate::tool::{ToolCall, ToolDefinition, ToolExecutor, ToolMetadata, ToolResult};

pub fn propagate(call: &ToolCall, result: &mut ToolResult) {
    if result.call_id.is_empty() {
        result.call_id = call.call_id.clone();
    }
    if result.session_id.is_empty() {
        result.session_id = call.session_id.clone();
    }
    if result.task_id.is_empty() {
        result.task_id = call.task_id.clone();
    }
    if result.parent_task_id.is_empty() {
        result.parent_task_id = call.parent_task_id.clone();
    }
}

pub struct IdPropagationExecutor {
    pub(crate) inner: Arc<dyn ToolExecutor>,
}

impl IdPropagationExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ToolExecutor for IdPropagationExecutor {
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
        let mut result = self.inner.execute(ctx, call).await?;
        propagate(call, &mut result);
        Ok(result)
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

    #[test]
    fn fills_empty_ids_from_call() {
        let mut call = ToolCall::new("c1", "read_file");
        call.session_id = "s1".into();
        call.task_id = "t1".into();
        call.parent_task_id = "p1".into();

        let mut result = ToolResult::ok("", "hello");
        propagate(&call, &mut result);

        assert_eq!(result.call_id, "c1");
        assert_eq!(result.session_id, "s1");
        assert_eq!(result.task_id, "t1");
        assert_eq!(result.parent_task_id, "p1");
    }

    #[test]
    fn does_not_overwrite_ids_the_tool_already_set() {
        let call = ToolCall::new("c1", "read_file");
        let mut result = ToolResult::ok("own-id", "hello");
        propagate(&call, &mut result);
        assert_eq!(result.call_id, "own-id");
    }
}
