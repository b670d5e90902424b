//! Filtered & Policy Views.
//!
//! Thin read-oriented wrappers over a shared `Registry`: one hides
//! delegation tools from sub-agents, the other enforces per-channel policy
//! on top of the already-policy-aware decorator stack (this is the
//! list/get-time filter, not the execute-time `RetryExecutor` policy
//! resolution — the two share `PolicyEngine::resolve` but serve different
//! purposes, following the separation between build-time tool filtering and
//! call-time policy enforcement seen in `tools/builder.rs`).

use std::sync::Arc;

use crate::context::Channel;
use crate::error::CoreError;
use crate::policy::{EnforcementMode, PolicyEngine, ToolCallContext};
use crate::registry::Registry;
use crate::subagent::is_delegation_tool;
use crate::tool::{ToolDefinition, ToolExecutor};

/// Hides subagent/explore/bg_*/ext_*/team_dispatch so a sub-agent cannot
/// recursively delegate.
pub struct SubagentFilteredView {
    inner: Arc<Registry>,
}

impl SubagentFilteredView {
    pub fn new(inner: Arc<Registry>) -> Self {
        Self { inner }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ToolExecutor>, CoreError> {
        if is_delegation_tool(name) {
            return Err(CoreError::NotFound(name.to_string()));
        }
        self.inner.get(name)
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.inner
            .list()
            .into_iter()
            .filter(|d| !is_delegation_tool(&d.name))
            .collect()
    }
}

/// Enforces per-call allow/deny on top of the registry's own lookups.
/// Re-wrapping (`with_policy`) replaces the policy rather than stacking
/// another layer.
pub struct PolicyFilteredView {
    inner: Arc<Registry>,
    policy: Arc<PolicyEngine>,
    channel: Channel,
}

impl PolicyFilteredView {
    pub fn new(inner: Arc<Registry>, policy: Arc<PolicyEngine>, channel: Channel) -> Self {
        Self {
            inner,
            policy,
            channel,
        }
    }

    pub fn with_policy(&self, policy: Arc<PolicyEngine>) -> Self {
        Self {
            inner: self.inner.clone(),
            policy,
            channel: self.channel.clone(),
        }
    }

    fn is_allowed(&self, tool: &Arc<dyn ToolExecutor>) -> bool {
        let metadata = tool.metadata();
        let ctx = ToolCallContext {
            tool_name: metadata.name.clone(),
            category: metadata.category.clone(),
            tags: metadata.tags.clone(),
            dangerous: metadata.dangerous,
            safety_level: metadata.effective_safety_level(),
            channel: self.channel.to_string(),
        };
        let resolved = self.policy.resolve(&ctx);
        resolved.enabled || resolved.enforcement == EnforcementMode::WarnAllow
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ToolExecutor>, CoreError> {
        let tool = self.inner.get(name)?;
        if self.is_allowed(&tool) {
            Ok(tool)
        } else {
            Err(CoreError::DeniedByPolicy(name.to_string()))
        }
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.inner
            .list()
            .into_iter()
            .filter(|d| match self.inner.get(&d.name) {
                Ok(tool) => self.is_allowed(&tool),
                Err(_) => false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreaker;
    use crate::context::CallContext;
    use crate::degradation::DegradationTable;
    use crate::policy::{PolicyDefaults, PolicyOverrides, PolicyRule, RuleSelector};
    use crate::sla::SlaCollector;
    use crate::subagent::{register_subagent_tools, SubAgentCoordinator};
    use crate::tool::{ParameterSchema, ToolCall, ToolMetadata, ToolResult};
    use async_trait::async_trait;
    use std::any::Any;
    use std::collections::HashSet;

    struct EchoTool(&'static str);

    #[async_trait]
    impl ToolExecutor for EchoTool {
        async fn execute(&self, _ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
            Ok(ToolResult::ok(call.call_id.clone(), self.0))
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.to_string(),
                description: "echo".into(),
                parameters: ParameterSchema::default(),
            }
        }

        fn metadata(&self) -> ToolMetadata {
            ToolMetadata::new(self.0, "test")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct NoopCoordinator;

    #[async_trait]
    impl SubAgentCoordinator for NoopCoordinator {
        async fn execute_task(
            &self,
            _ctx: &CallContext,
            _operation: &str,
            _task: &str,
            _session_id: &str,
        ) -> anyhow::Result<String> {
            Ok("ok".into())
        }
    }

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::new(
            Arc::new(PolicyEngine::new(Default::default(), vec![])),
            CircuitBreaker::default(),
            Some(Arc::new(SlaCollector::default())),
            Arc::new(DegradationTable::new()),
        ))
    }

    #[test]
    fn subagent_view_hides_delegation_tools() {
        let registry = registry();
        registry.register_static(Arc::new(EchoTool("read_file"))).unwrap();
        register_subagent_tools(&registry, Arc::new(NoopCoordinator)).unwrap();

        let view = SubagentFilteredView::new(registry);
        assert!(view.get("subagent").is_err());
        assert!(view.get("bg_status").is_err());
        assert!(view.get("read_file").is_ok());

        let names: HashSet<&str> = view.list().iter().map(|d| d.name.as_str()).collect();
        assert!(!names.contains("subagent"));
        assert!(names.contains("read_file"));
    }

    #[test]
    fn policy_view_denies_disabled_tool_with_deny_enforcement() {
        let registry = registry();
        registry.register_static(Arc::new(EchoTool("rm_rf"))).unwrap();

        let rules = vec![PolicyRule {
            selector: RuleSelector {
                tool_names: ["rm_rf".to_string()].into_iter().collect(),
                ..Default::default()
            },
            overrides: PolicyOverrides {
                enabled: Some(false),
                enforcement: Some(EnforcementMode::Deny),
                ..Default::default()
            },
        }];
        let policy = Arc::new(PolicyEngine::new(PolicyDefaults::default(), rules));
        let view = PolicyFilteredView::new(registry, policy, Channel::new("cli"));

        assert!(matches!(
            view.get("rm_rf"),
            Err(CoreError::DeniedByPolicy(_))
        ));
        assert!(view.list().is_empty());
    }

    #[test]
    fn policy_view_allows_warn_allow_disabled_tool() {
        let registry = registry();
        registry.register_static(Arc::new(EchoTool("rm_rf"))).unwrap();

        let rules = vec![PolicyRule {
            selector: RuleSelector {
                tool_names: ["rm_rf".to_string()].into_iter().collect(),
                ..Default::default()
            },
            overrides: PolicyOverrides {
                enabled: Some(false),
                enforcement: Some(EnforcementMode::WarnAllow),
                ..Default::default()
            },
        }];
        let policy = Arc::new(PolicyEngine::new(PolicyDefaults::default(), rules));
        let view = PolicyFilteredView::new(registry, policy, Channel::new("cli"));

        assert!(view.get("rm_rf").is_ok());
    }
}
