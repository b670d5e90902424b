//! Sub-agent Registration.
//!
//! Installs delegation tools once a coordinator becomes available. Follows
//! the split between "what a sub-agent task looks like" and "how it's
//! dispatched": the dispatch side is a single opaque `SubAgentCoordinator`
//! the core treats as an external collaborator, since a sub-agent's own
//! reasoning loop is out of scope here.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::CallContext;
use crate::error::CoreError;
use crate::registry::Registry;
use crate::tool::{ParameterSchema, PropertySchema, SchemaType, ToolCall, ToolDefinition, ToolExecutor, ToolMetadata, ToolResult};

/// The nested-task dispatch surface a `subagent` call delegates to. An
/// external collaborator; the core never inspects the task payload or the
/// sub-agent's own reasoning.
#[async_trait]
pub trait SubAgentCoordinator: Send + Sync {
    async fn execute_task(
        &self,
        ctx: &CallContext,
        operation: &str,
        task: &str,
        session_id: &str,
    ) -> anyhow::Result<String>;
}

/// Every tool name installed by `register_subagent_tools`, in the order
/// they're installed. Shared with `views.rs`'s `WithoutSubagent` filter.
pub const DELEGATION_TOOL_NAMES: &[&str] = &[
    "subagent",
    "explore",
    "bg_dispatch",
    "bg_plan",
    "bg_graph",
    "bg_status",
    "bg_collect",
    "ext_reply",
    "ext_merge",
    "team_dispatch",
];

pub fn is_delegation_tool(name: &str) -> bool {
    DELEGATION_TOOL_NAMES.contains(&name)
}

struct DelegationTool {
    name: &'static str,
    description: &'static str,
    coordinator: Arc<dyn SubAgentCoordinator>,
}

fn task_schema() -> ParameterSchema {
    let mut schema = ParameterSchema::default();
    schema
        .properties
        .insert("task".to_string(), PropertySchema::scalar(SchemaType::String));
    schema.required = vec!["task".to_string()];
    schema
}

#[async_trait]
impl ToolExecutor for DelegationTool {
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
        let task = call
            .arguments
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match self
            .coordinator
            .execute_task(ctx, self.name, task, &call.session_id)
            .await
        {
            Ok(output) => Ok(ToolResult::ok(call.call_id.clone(), output)),
            Err(e) => Ok(ToolResult::failed(
                call.call_id.clone(),
                crate::tool::ToolApplicationError::transient(e.to_string()),
            )),
        }
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters: task_schema(),
        }
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata::new(self.name, "delegation").tag("subagent")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("subagent", "Delegate a self-contained task to a sub-agent and return its final answer."),
    ("explore", "Delegate a read-only exploration task to a sub-agent."),
    ("bg_dispatch", "Dispatch a task to a background sub-agent without waiting for completion."),
    ("bg_plan", "Ask a background sub-agent to produce a plan for a task."),
    ("bg_graph", "Request the dependency graph of in-flight background tasks."),
    ("bg_status", "Poll the status of a previously dispatched background task."),
    ("bg_collect", "Collect the result of a completed background task."),
    ("ext_reply", "Send a reply back into an externally-coordinated task thread."),
    ("ext_merge", "Merge the result of an externally-coordinated task back into the parent turn."),
    ("team_dispatch", "Dispatch a task to a named team of sub-agents."),
];

/// Idempotent: if `subagent` is already registered, only ensures `explore`
/// is present and returns without touching the rest.
pub fn register_subagent_tools(
    registry: &Registry,
    coordinator: Arc<dyn SubAgentCoordinator>,
) -> Result<(), CoreError> {
    let already_installed = registry.get("subagent").is_ok();

    if already_installed {
        if registry.get("explore").is_err() {
            install(registry, "explore", coordinator)?;
        }
        return Ok(());
    }

    for (name, description) in DESCRIPTIONS {
        registry.register_static(Arc::new(DelegationTool {
            name,
            description,
            coordinator: coordinator.clone(),
        }))?;
    }
    Ok(())
}

fn install(
    registry: &Registry,
    name: &'static str,
    coordinator: Arc<dyn SubAgentCoordinator>,
) -> Result<(), CoreError> {
    let description = DESCRIPTIONS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
        .unwrap_or("Sub-agent delegation tool.");
    registry.register_static(Arc::new(DelegationTool {
        name,
        description,
        coordinator,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreaker;
    use crate::context::Channel;
    use crate::degradation::DegradationTable;
    use crate::policy::PolicyEngine;
    use crate::sla::SlaCollector;

    struct EchoCoordinator;

    #[async_trait]
    impl SubAgentCoordinator for EchoCoordinator {
        async fn execute_task(
            &self,
            _ctx: &CallContext,
            operation: &str,
            task: &str,
            _session_id: &str,
        ) -> anyhow::Result<String> {
            Ok(format!("{operation}:{task}"))
        }
    }

    fn registry() -> Registry {
        Registry::new(
            Arc::new(PolicyEngine::new(Default::default(), vec![])),
            CircuitBreaker::default(),
            Some(Arc::new(SlaCollector::default())),
            Arc::new(DegradationTable::new()),
        )
    }

    #[tokio::test]
    async fn installs_all_delegation_tools_and_they_execute() {
        let registry = registry();
        register_subagent_tools(&registry, Arc::new(EchoCoordinator)).unwrap();

        for name in DELEGATION_TOOL_NAMES {
            let tool = registry.get(name).unwrap();
            let ctx = CallContext::new(Channel::new("cli"));
            let mut call = ToolCall::new("c1", *name);
            call.arguments
                .insert("task".into(), Value::String("do-thing".into()));
            let result = tool.execute(&ctx, &call).await.unwrap();
            assert!(result.is_success());
            assert_eq!(result.content, format!("{name}:do-thing"));
        }
    }

    #[tokio::test]
    async fn second_registration_is_idempotent() {
        let registry = registry();
        register_subagent_tools(&registry, Arc::new(EchoCoordinator)).unwrap();
        let count_before = registry.tool_count();

        register_subagent_tools(&registry, Arc::new(EchoCoordinator)).unwrap();
        assert_eq!(registry.tool_count(), count_before);
    }

    #[test]
    fn delegation_tool_names_are_recognized() {
        assert!(is_delegation_tool("subagent"));
        assert!(is_delegation_tool("bg_status"));
        assert!(!is_delegation_tool("read_file"));
    }
}
