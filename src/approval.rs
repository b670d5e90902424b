//! Approval Gate.
//!
//! Dangerous tools require synchronous approval from an out-of-band
//! approver unless the call context carries an auto-approve flag or no
//! approver is installed at all — the gate is advisory in environments
//! without a human in the loop, treating the absence of a confirmation
//! channel as permission to proceed for safe/verification-tier tools.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::error::CoreError;
use crate::tool::{ToolApplicationError, ToolCall, ToolDefinition, ToolExecutor, ToolMetadata, ToolResult};

/// Conventional argument keys that may carry a target file path.
const PATH_KEYS: &[&str] = &["file_path", "path", "resolved_path"];

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub operation: String,
    pub target_path: Option<String>,
    pub summary: String,
    pub safety_level: u8,
    pub arguments: Map<String, Value>,
    pub rollback_steps: Option<String>,
    pub alternative_plan: Option<String>,
    pub tool_call_id: String,
}

#[derive(Debug, Clone)]
pub struct ApprovalResponse {
    pub approved: bool,
}

#[async_trait]
pub trait Approver: Send + Sync {
    async fn request_approval(&self, request: ApprovalRequest) -> anyhow::Result<ApprovalResponse>;
}

fn extract_path(arguments: &Map<String, Value>) -> Option<String> {
    PATH_KEYS
        .iter()
        .find_map(|key| arguments.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn summarize_args(arguments: &Map<String, Value>) -> String {
    let mut keys: Vec<&str> = arguments.keys().map(String::as_str).collect();
    keys.sort_unstable();
    if keys.len() > 8 {
        keys.truncate(8);
        format!("{}…", keys.join(", "))
    } else {
        keys.join(", ")
    }
}

fn build_request(tool_name: &str, metadata: &ToolMetadata, call: &ToolCall) -> ApprovalRequest {
    let level = metadata.effective_safety_level();
    let path = extract_path(&call.arguments);
    let summary = format!(
        "Approval required for {tool_name} (L{level}); path={}; args={}",
        path.as_deref().unwrap_or("-"),
        summarize_args(&call.arguments)
    );

    let rollback_steps = if level >= 3 {
        Some(match &path {
            Some(p) => format!("restore {p} from VCS/backups and rerun the last known-good step"),
            None => format!("rerun the last known-good step before {tool_name}"),
        })
    } else {
        None
    };

    let alternative_plan = if level == 4 {
        Some(if tool_name.contains("delete") || tool_name.contains("remove") {
            "dry-run first; prefer archiving or disabling the target over permanent deletion"
                .to_string()
        } else {
            "dry-run this operation first before committing to it".to_string()
        })
    } else {
        None
    };

    ApprovalRequest {
        operation: tool_name.to_string(),
        target_path: path,
        summary,
        safety_level: level,
        arguments: call.arguments.clone(),
        rollback_steps,
        alternative_plan,
        tool_call_id: call.call_id.clone(),
    }
}

/// Decorator: gates dangerous tools behind approval.
pub struct ApprovalExecutor {
    pub(crate) inner: Arc<dyn ToolExecutor>,
}

impl ApprovalExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ToolExecutor for ApprovalExecutor {
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
        let metadata = self.inner.metadata();

        if !metadata.dangerous || ctx.auto_approve {
            return self.inner.execute(ctx, call).await;
        }

        let Some(approver) = ctx.approver() else {
            return self.inner.execute(ctx, call).await;
        };

        let request = build_request(&metadata.name, &metadata, call);
        debug!(tool = %metadata.name, safety_level = metadata.effective_safety_level(), "approval requested");
        let response = approver
            .request_approval(request)
            .await
            .map_err(|e| CoreError::Permanent(e.to_string()))?;

        if !response.approved {
            warn!(tool = %metadata.name, "approval rejected");
            return Ok(ToolResult::failed(
                call.call_id.clone(),
                ToolApplicationError::new(CoreError::ApprovalRejected.to_string()),
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
