//! Degradation Router.
//!
//! Ranked fallback chains with argument adapters, driven by the SLA
//! collector's health/ranking surface instead of a static preference order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use tracing::debug;

use crate::context::CallContext;
use crate::error::CoreError;
use crate::sla::SlaCollector;
use crate::tool::{reserved_keys, ToolCall, ToolDefinition, ToolExecutor, ToolMetadata, ToolResult};

/// Router-wide behavior knobs, independent of any one tool's fallback list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationConfig {
    /// Try ranked fallbacks before the primary when the SLA collector
    /// already reports the primary unhealthy.
    pub pre_routing_enabled: bool,
    /// Cap on how many ranked fallbacks pre-routing will try before giving
    /// up and falling through to invoking the primary anyway.
    pub max_fallback_attempts: usize,
    /// When every fallback (or pre-routing attempt) is exhausted, return a
    /// synthesized "ask the user" result instead of the primary's error.
    pub enable_user_prompt: bool,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            pre_routing_enabled: false,
            max_fallback_attempts: 2,
            enable_user_prompt: false,
        }
    }
}

/// Rewrites a call's arguments for a fallback tool with a different
/// parameter shape. Identity adapter if the fallback accepts the same
/// arguments as the primary.
pub type ArgumentAdapter = Arc<dyn Fn(&Map<String, Value>) -> Map<String, Value> + Send + Sync>;

#[derive(Clone)]
pub struct FallbackCandidate {
    pub tool_name: String,
    pub adapter: ArgumentAdapter,
}

impl FallbackCandidate {
    pub fn identity(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            adapter: Arc::new(|args| args.clone()),
        }
    }

    pub fn with_adapter(tool_name: impl Into<String>, adapter: ArgumentAdapter) -> Self {
        Self {
            tool_name: tool_name.into(),
            adapter,
        }
    }
}

/// Degradation routing table: primary tool name -> ranked fallback list.
#[derive(Default, Clone)]
pub struct DegradationTable {
    chains: HashMap<String, Vec<FallbackCandidate>>,
}

impl DegradationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, primary: impl Into<String>, fallbacks: Vec<FallbackCandidate>) {
        self.chains.insert(primary.into(), fallbacks);
    }

    fn fallbacks_for(&self, primary: &str) -> &[FallbackCandidate] {
        self.chains
            .get(primary)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_fallbacks(&self, primary: &str) -> bool {
        self.chains
            .get(primary)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }
}

/// Decorator that, on primary failure, tries ranked fallbacks in order of
/// SLA health before giving up — and, when pre-routing is enabled and the
/// primary is already known unhealthy, tries them *before* the primary.
/// The SLA ranking is taken once per attempted fallback pass so a
/// fallback's own outcome never reorders the chain mid-pass: ranking is a
/// once-per-call snapshot.
pub struct DegradationRouter {
    pub(crate) inner: Arc<dyn ToolExecutor>,
    table: Arc<DegradationTable>,
    sla: Arc<SlaCollector>,
    resolve_tool: Arc<dyn Fn(&str) -> Option<Arc<dyn ToolExecutor>> + Send + Sync>,
    config: DegradationConfig,
}

impl DegradationRouter {
    pub fn new(
        inner: Arc<dyn ToolExecutor>,
        table: Arc<DegradationTable>,
        sla: Arc<SlaCollector>,
        resolve_tool: Arc<dyn Fn(&str) -> Option<Arc<dyn ToolExecutor>> + Send + Sync>,
        config: DegradationConfig,
    ) -> Self {
        Self {
            inner,
            table,
            sla,
            resolve_tool,
            config,
        }
    }

    /// De-duplicate by tool name and drop any candidate that names the
    /// primary itself, then rank the survivors by SLA health and try the
    /// healthy ones in order, up to `limit`. Returns the first successful,
    /// annotated result.
    async fn try_fallbacks(
        &self,
        primary_name: &str,
        ctx: &CallContext,
        call: &ToolCall,
        candidates: &[FallbackCandidate],
        limit: usize,
    ) -> Option<ToolResult> {
        let mut seen = std::collections::HashSet::new();
        let deduped: Vec<&FallbackCandidate> = candidates
            .iter()
            .filter(|c| c.tool_name != primary_name && seen.insert(c.tool_name.clone()))
            .collect();

        let names: Vec<String> = deduped.iter().map(|c| c.tool_name.clone()).collect();
        let ranked = self.sla.rank_tools(&names);
        let by_name: HashMap<&str, &FallbackCandidate> =
            deduped.iter().map(|c| (c.tool_name.as_str(), *c)).collect();

        for profile in ranked.into_iter().filter(|p| p.healthy).take(limit) {
            let Some(candidate) = by_name.get(profile.tool_name.as_str()) else {
                continue;
            };
            let Some(fallback_tool) = (self.resolve_tool)(&candidate.tool_name) else {
                continue;
            };

            let adapted_args = (candidate.adapter)(&call.arguments);
            let fallback_call = call.retargeted(candidate.tool_name.clone(), adapted_args);

            match fallback_tool.execute(ctx, &fallback_call).await {
                Ok(mut result) if result.is_success() => {
                    debug!(primary = %primary_name, fallback = %candidate.tool_name, "degradation router chose fallback");
                    result.set_metadata(
                        reserved_keys::DEGRADED_FROM,
                        Value::String(primary_name.to_string()),
                    );
                    result.set_metadata(
                        reserved_keys::DEGRADED_TO,
                        Value::String(candidate.tool_name.clone()),
                    );
                    return Some(result);
                }
                _ => continue,
            }
        }
        None
    }

    fn user_prompt_result(&self, call: &ToolCall, primary_name: &str) -> ToolResult {
        let mut result = ToolResult::ok(
            call.call_id.clone(),
            format!(
                "'{primary_name}' and its configured fallbacks are unavailable; please provide the value manually"
            ),
        );
        result.set_metadata(reserved_keys::USER_PROMPT, Value::Bool(true));
        result.set_metadata(
            reserved_keys::DEGRADED_FROM,
            Value::String(primary_name.to_string()),
        );
        result
    }
}

#[async_trait]
impl ToolExecutor for DegradationRouter {
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
        let primary_name = self.inner.metadata().name;
        let candidates = self.table.fallbacks_for(&primary_name);

        if self.config.pre_routing_enabled
            && !candidates.is_empty()
            && !self.sla.is_healthy(&primary_name)
        {
            if let Some(result) = self
                .try_fallbacks(
                    &primary_name,
                    ctx,
                    call,
                    candidates,
                    self.config.max_fallback_attempts,
                )
                .await
            {
                debug!(primary = %primary_name, "pre-routed around unhealthy primary");
                return Ok(result);
            }
            // All pre-routing attempts failed; fall through to invoking the
            // primary anyway.
        }

        let primary_outcome = self.inner.execute(ctx, call).await;

        let needs_fallback = match &primary_outcome {
            Ok(result) => !result.is_success(),
            Err(err) => !matches!(err, CoreError::Cancelled),
        };
        if !needs_fallback || candidates.is_empty() {
            return primary_outcome;
        }

        if let Some(result) = self
            .try_fallbacks(&primary_name, ctx, call, candidates, candidates.len())
            .await
        {
            return Ok(result);
        }

        if self.config.enable_user_prompt {
            debug!(primary = %primary_name, "fallbacks exhausted, synthesizing user prompt");
            return Ok(self.user_prompt_result(call, &primary_name));
        }

        primary_outcome
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
