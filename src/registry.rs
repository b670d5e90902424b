//! Tool registry and its concurrency model.
//!
//! A single map keyed by tool name with a small tier tag per entry
//! (static/dynamic/mcp) rather than three separate public maps, unifying a
//! three-tier + legacy-alias + degradation model. `parking_lot::RwLock`
//! chosen for the same reason `circuit_breaker.rs` uses it: short critical
//! sections, no need for `std::sync::RwLock`'s poisoning semantics.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::alias::resolve_alias;
use crate::approval::ApprovalExecutor;
use crate::circuit_breaker::CircuitBreaker;
use crate::degradation::{DegradationConfig, DegradationRouter, DegradationTable};
use crate::error::CoreError;
use crate::id_propagation::IdPropagationExecutor;
use crate::policy::PolicyEngine;
use crate::retry::RetryExecutor;
use crate::sla::SlaCollector;
use crate::tool::{ToolDefinition, ToolExecutor};
use crate::validator::ValidatorExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Static,
    Dynamic,
    Mcp,
}

fn tier_for_name(name: &str, requested: Tier) -> Tier {
    if requested == Tier::Static {
        Tier::Static
    } else if name.starts_with("mcp__") {
        Tier::Mcp
    } else {
        Tier::Dynamic
    }
}

struct Entry {
    tier: Tier,
    executor: Arc<dyn ToolExecutor>,
}

struct RegistryState {
    entries: HashMap<String, Entry>,
    dirty: bool,
    cached_defs: Vec<ToolDefinition>,
}

impl RegistryState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            dirty: true,
            cached_defs: Vec::new(),
        }
    }
}

/// Walk a decorator chain back to its innermost base, recognizing the
/// layers this registry itself applies. Used so re-registering an
/// already-wrapped executor never double-stacks.
fn unwrap_known_decorators(executor: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
    let mut current = executor;
    loop {
        let any: &dyn Any = current.as_ref().as_any();
        let next = if let Some(d) = any.downcast_ref::<DegradationRouter>() {
            Some(d.inner.clone())
        } else if let Some(d) = any.downcast_ref::<crate::sla::SlaExecutor>() {
            Some(d.inner.clone())
        } else if let Some(d) = any.downcast_ref::<IdPropagationExecutor>() {
            Some(d.inner.clone())
        } else if let Some(d) = any.downcast_ref::<RetryExecutor>() {
            Some(d.inner.clone())
        } else if let Some(d) = any.downcast_ref::<ApprovalExecutor>() {
            Some(d.inner.clone())
        } else if let Some(d) = any.downcast_ref::<ValidatorExecutor>() {
            Some(d.inner.clone())
        } else {
            None
        };
        match next {
            Some(inner) => current = inner,
            None => return current,
        }
    }
}

/// Owns the decorator stack's shared collaborators (policy engine, circuit
/// breaker, SLA collector, degradation table) and the three-tier map.
pub struct Registry {
    state: Arc<RwLock<RegistryState>>,
    policy: Arc<PolicyEngine>,
    breaker: CircuitBreaker,
    sla: Option<Arc<SlaCollector>>,
    degradation: Arc<DegradationTable>,
    degradation_config: DegradationConfig,
}

impl Registry {
    pub fn new(
        policy: Arc<PolicyEngine>,
        breaker: CircuitBreaker,
        sla: Option<Arc<SlaCollector>>,
        degradation: Arc<DegradationTable>,
    ) -> Self {
        Self::with_degradation_config(policy, breaker, sla, degradation, DegradationConfig::default())
    }

    pub fn with_degradation_config(
        policy: Arc<PolicyEngine>,
        breaker: CircuitBreaker,
        sla: Option<Arc<SlaCollector>>,
        degradation: Arc<DegradationTable>,
        degradation_config: DegradationConfig,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::new())),
            policy,
            breaker,
            sla,
            degradation,
            degradation_config,
        }
    }

    /// Builds a closure the degradation router and alias layer use to look
    /// up other registered (fully-wrapped) tools by name, without holding
    /// any lock beyond the single read it performs when invoked.
    fn resolve_tool_fn(&self) -> Arc<dyn Fn(&str) -> Option<Arc<dyn ToolExecutor>> + Send + Sync> {
        let state = self.state.clone();
        Arc::new(move |name: &str| state.read().entries.get(name).map(|e| e.executor.clone()))
    }

    /// base -> Validator -> Approval -> Retry+Breaker -> IDProp -> SLA
    /// (SLA omitted when no collector is configured, IDProp then
    /// outermost). Degradation, when the tool has a configured fallback
    /// list, wraps the result.
    fn wrap_decorator_stack(&self, base: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        let validated = Arc::new(ValidatorExecutor::new(base)) as Arc<dyn ToolExecutor>;
        let approved = Arc::new(ApprovalExecutor::new(validated)) as Arc<dyn ToolExecutor>;
        let retried = Arc::new(RetryExecutor::new(
            approved,
            self.policy.clone(),
            self.breaker.clone(),
        )) as Arc<dyn ToolExecutor>;
        let id_propagated = Arc::new(IdPropagationExecutor::new(retried)) as Arc<dyn ToolExecutor>;

        match &self.sla {
            Some(collector) => {
                Arc::new(crate::sla::SlaExecutor::new(id_propagated, collector.clone()))
                    as Arc<dyn ToolExecutor>
            }
            None => id_propagated,
        }
    }

    fn maybe_wrap_degradation(&self, name: &str, chain: Arc<dyn ToolExecutor>) -> Arc<dyn ToolExecutor> {
        if !self.degradation.has_fallbacks(name) {
            return chain;
        }
        let sla = self
            .sla
            .clone()
            .unwrap_or_else(|| Arc::new(SlaCollector::default()));
        Arc::new(DegradationRouter::new(
            chain,
            self.degradation.clone(),
            sla,
            self.resolve_tool_fn(),
            self.degradation_config.clone(),
        ))
    }

    fn register_internal(&self, tool: Arc<dyn ToolExecutor>, requested_tier: Tier) -> Result<(), CoreError> {
        let base = unwrap_known_decorators(tool);
        let metadata = base.metadata();
        let name = metadata.name.clone();

        let mut state = self.state.write();

        if requested_tier != Tier::Static {
            if let Some(existing) = state.entries.get(&name) {
                if existing.tier == Tier::Static {
                    return Err(CoreError::Permanent(format!(
                        "cannot override static tool '{name}'"
                    )));
                }
            }
        }

        let wrapped = self.wrap_decorator_stack(base);
        let wrapped = self.maybe_wrap_degradation(&name, wrapped);
        let tier = tier_for_name(&name, requested_tier);

        state.entries.insert(name, Entry { tier, executor: wrapped });
        state.dirty = true;
        Ok(())
    }

    /// Register a builtin tool. Collides with nothing (establishes the
    /// static keyspace); later registrations cannot override it.
    pub fn register_static(&self, tool: Arc<dyn ToolExecutor>) -> Result<(), CoreError> {
        self.register_internal(tool, Tier::Static)
    }

    /// Register a runtime user tool or MCP-backed tool (tier routed
    /// automatically by the `mcp__` name prefix). Rejects collisions with
    /// static tool names.
    pub fn register(&self, tool: Arc<dyn ToolExecutor>) -> Result<(), CoreError> {
        self.register_internal(tool, Tier::Dynamic)
    }

    /// Look up in static, then dynamic, then mcp (the three tiers share one
    /// map so this is a single lookup); on miss, consult the legacy-alias
    /// layer.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ToolExecutor>, CoreError> {
        if let Some(entry) = self.state.read().entries.get(name) {
            return Ok(entry.executor.clone());
        }
        resolve_alias(name, self.resolve_tool_fn()).ok_or_else(|| CoreError::NotFound(name.to_string()))
    }

    /// Union of all three tiers' definitions, sorted ascending by name;
    /// cached until dirty. Never includes legacy aliases.
    pub fn list(&self) -> Vec<ToolDefinition> {
        {
            let state = self.state.read();
            if !state.dirty {
                return state.cached_defs.clone();
            }
        }

        let mut state = self.state.write();
        if state.dirty {
            let mut defs: Vec<ToolDefinition> =
                state.entries.values().map(|e| e.executor.definition()).collect();
            defs.sort_by(|a, b| a.name.cmp(&b.name));
            state.cached_defs = defs;
            state.dirty = false;
        }
        state.cached_defs.clone()
    }

    /// Refuses to remove a static tool; deletes from dynamic/mcp.
    pub fn unregister(&self, name: &str) -> Result<(), CoreError> {
        let mut state = self.state.write();
        match state.entries.get(name) {
            None => Ok(()),
            Some(entry) if entry.tier == Tier::Static => Err(CoreError::Permanent(format!(
                "cannot unregister static tool '{name}'"
            ))),
            Some(_) => {
                state.entries.remove(name);
                state.dirty = true;
                Ok(())
            }
        }
    }

    pub fn tool_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Release managed subresources and clear all maps. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.dirty = true;
        state.cached_defs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CallContext, Channel};
    use crate::tool::{ParameterSchema, ToolCall, ToolMetadata, ToolResult};
    use async_trait::async_trait;

    struct StaticEcho(&'static str);

    #[async_trait]
    impl ToolExecutor for StaticEcho {
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

    fn registry() -> Registry {
        Registry::new(
            Arc::new(PolicyEngine::new(Default::default(), vec![])),
            CircuitBreaker::default(),
            Some(Arc::new(SlaCollector::default())),
            Arc::new(DegradationTable::new()),
        )
    }

    #[tokio::test]
    async fn registered_tool_executes_through_full_stack() {
        let registry = registry();
        registry.register(Arc::new(StaticEcho("grep"))).unwrap();

        let tool = registry.get("grep").unwrap();
        let ctx = CallContext::new(Channel::new("cli"));
        let result = tool.execute(&ctx, &ToolCall::new("c1", "grep")).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.content, "grep");
        // IDProp should have filled the call id onto the result.
        assert_eq!(result.call_id, "c1");
    }

    #[test]
    fn dynamic_registration_cannot_override_static_name() {
        let registry = registry();
        registry.register_static(Arc::new(StaticEcho("read_file"))).unwrap();
        let err = registry.register(Arc::new(StaticEcho("read_file"))).unwrap_err();
        assert!(matches!(err, CoreError::Permanent(_)));
    }

    #[test]
    fn mcp_prefixed_name_is_routed_to_mcp_tier_and_excluded_from_static_protection() {
        let registry = registry();
        registry.register(Arc::new(StaticEcho("mcp__search"))).unwrap();
        // Re-registering under the same name should succeed (not static).
        registry.register(Arc::new(StaticEcho("mcp__search"))).unwrap();
        assert_eq!(registry.tool_count(), 1);
    }

    #[test]
    fn list_is_sorted_and_excludes_aliases() {
        let registry = registry();
        registry.register_static(Arc::new(StaticEcho("write_file"))).unwrap();
        registry.register_static(Arc::new(StaticEcho("read_file"))).unwrap();

        let defs = registry.list();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "write_file"]);
        assert!(!names.contains(&"file_read"));
    }

    #[test]
    fn list_cache_invalidates_after_unregister() {
        let registry = registry();
        registry.register(Arc::new(StaticEcho("a"))).unwrap();
        registry.register(Arc::new(StaticEcho("b"))).unwrap();
        assert_eq!(registry.list().len(), 2);

        registry.unregister("a").unwrap();
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn unregister_refuses_static_tool() {
        let registry = registry();
        registry.register_static(Arc::new(StaticEcho("read_file"))).unwrap();
        let err = registry.unregister("read_file").unwrap_err();
        assert!(matches!(err, CoreError::Permanent(_)));
    }

    #[tokio::test]
    async fn get_resolves_legacy_alias_on_miss() {
        let registry = registry();
        registry.register_static(Arc::new(StaticEcho("read_file"))).unwrap();

        let alias_tool = registry.get("file_read").unwrap();
        assert_eq!(alias_tool.metadata().name, "file_read");

        let ctx = CallContext::new(Channel::new("cli"));
        let result = alias_tool
            .execute(&ctx, &ToolCall::new("c1", "file_read"))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(
            result
                .metadata
                .get(crate::tool::reserved_keys::LEGACY_TOOL_ALIAS)
                .unwrap(),
            "file_read"
        );
    }

    #[test]
    fn get_unknown_name_is_not_found() {
        let registry = registry();
        let err = registry.get("nonexistent").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn close_clears_all_tiers() {
        let registry = registry();
        registry.register(Arc::new(StaticEcho("a"))).unwrap();
        registry.close();
        assert_eq!(registry.tool_count(), 0);
        assert!(registry.list().is_empty());
    }
}
