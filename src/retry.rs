//! Retry Executor + Circuit Breaker.
//!
//! Resolves the effective policy via the `PolicyEngine`, applies a
//! per-attempt timeout, classifies failures as transient or permanent, and
//! retries transient failures with jittered exponential backoff — gating
//! every attempt through a per-tool `CircuitBreaker` so only infrastructure
//! failures (not application-level negative outcomes) count toward tripping
//! it. Backoff shape follows a `min_backoff * backoff_factor^n`
//! clamp-to-`max_backoff` formula.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::context::CallContext;
use crate::error::{classify, anyhow_is_transient, CoreError, ErrorClass};
use crate::policy::{EnforcementMode, PolicyEngine, ToolCallContext};
use crate::tool::{
    reserved_keys, ToolCall, ToolDefinition, ToolExecutor, ToolMetadata, ToolResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let clamped = base.min(self.max_backoff.as_secs_f64()).max(0.0);
        let jitter_fraction = rand::rng().random_range(-0.25..=0.25);
        let jittered = (clamped * (1.0 + jitter_fraction)).max(0.0);
        Duration::from_secs_f64(jittered)
    }
}

/// Decorator: resolves policy, applies per-attempt timeout, retries
/// transient failures with backoff, and records every outcome against a
/// per-tool circuit breaker.
pub struct RetryExecutor {
    pub(crate) inner: Arc<dyn ToolExecutor>,
    policy: Arc<PolicyEngine>,
    breaker: CircuitBreaker,
}

impl RetryExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>, policy: Arc<PolicyEngine>, breaker: CircuitBreaker) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    fn call_context(&self, ctx: &CallContext) -> ToolCallContext {
        let metadata = self.inner.metadata();
        ToolCallContext {
            tool_name: metadata.name.clone(),
            category: metadata.category.clone(),
            tags: metadata.tags.clone(),
            dangerous: metadata.dangerous,
            safety_level: metadata.effective_safety_level(),
            channel: ctx.channel.to_string(),
        }
    }
}

#[async_trait]
impl ToolExecutor for RetryExecutor {
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
        let tool_name = self.inner.metadata().name;
        let call_ctx = self.call_context(ctx);
        let resolved = self.policy.resolve(&call_ctx);

        if !resolved.enabled {
            if resolved.enforcement == EnforcementMode::Deny {
                warn!(tool = %tool_name, "denied by policy");
                return Err(CoreError::PolicyDenied(tool_name));
            }
            // warn_allow: proceed, annotate the final result below.
        }

        let mut last_err: Option<CoreError> = None;
        let mut attempt = 0u32;

        loop {
            if !self.breaker.allow_request(&tool_name) {
                warn!(tool = %tool_name, "breaker open, rejecting call");
                last_err = Some(CoreError::BreakerOpen);
                break;
            }

            let outcome = if let Some(timeout) = resolved.timeout {
                match tokio::time::timeout(timeout, self.inner.execute(ctx, call)).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::Transient("per-attempt timeout exceeded".into())),
                }
            } else {
                self.inner.execute(ctx, call).await
            };

            match outcome {
                Ok(mut result) => {
                    // Application errors surfaced through Ok(ToolResult{error:..})
                    // are always breaker successes; whether they get retried
                    // depends on the error's own `transient` marking.
                    self.breaker.record_success(&tool_name);

                    let retry_application_error = result
                        .error
                        .as_ref()
                        .is_some_and(|e| e.transient)
                        && attempt < resolved.retry.max_retries;

                    if retry_application_error {
                        debug!(tool = %tool_name, attempt, "retrying transient application error");
                        let delay = resolved.retry.delay_for_attempt(attempt);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    if !resolved.enabled {
                        annotate_warn_allow(&mut result, &tool_name);
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if matches!(err, CoreError::Cancelled) {
                        return Err(err);
                    }
                    self.breaker.record_failure(&tool_name);

                    let retryable = classify(&err) == ErrorClass::Transient;
                    last_err = Some(err);

                    if !retryable || attempt >= resolved.retry.max_retries {
                        warn!(tool = %tool_name, attempt, retryable, "retry exhausted");
                        break;
                    }

                    debug!(tool = %tool_name, attempt, "retrying transient infrastructure failure");
                    let delay = resolved.retry.delay_for_attempt(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }

        Err(last_err.unwrap_or(CoreError::Permanent("unknown failure".into())))
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

fn annotate_warn_allow(result: &mut ToolResult, tool_name: &str) {
    result.set_metadata(
        reserved_keys::POLICY_ENFORCEMENT,
        serde_json::Value::String("warn_allow".to_string()),
    );
    result.set_metadata(
        reserved_keys::POLICY_WARNING,
        serde_json::Value::String(format!("tool '{tool_name}' is disabled by policy but running in warn_allow mode")),
    );
}

/// Wrap a base tool's `anyhow::Result` in the core's infra-error channel,
/// classifying timeouts/connection errors as transient, distinct from a
/// tool reporting a plain bad exit code.
pub fn from_anyhow(result: anyhow::Result<ToolResult>) -> Result<ToolResult, CoreError> {
    result.map_err(|e| {
        if anyhow_is_transient(&e) {
            CoreError::Transient(e.to_string())
        } else {
            CoreError::Permanent(e.to_string())
        }
    })
}
