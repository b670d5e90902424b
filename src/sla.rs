//! SLA Measurer.
//!
//! Outermost layer in the default stack. Keeps a bounded rolling-window
//! history of outcomes per tool name and exposes a simple health/ranking
//! query surface over it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::Any;

use crate::context::CallContext;
use crate::error::CoreError;
use crate::tool::{ToolCall, ToolDefinition, ToolExecutor, ToolMetadata, ToolResult};

#[derive(Debug, Clone, Copy)]
struct CallOutcome {
    success: bool,
    duration: Duration,
}

#[derive(Debug, Clone)]
pub struct SlaProfile {
    pub tool_name: String,
    pub call_count: u64,
    pub error_count: u64,
    pub average_latency: Duration,
    pub healthy: bool,
}

impl SlaProfile {
    fn error_rate(&self) -> f64 {
        if self.call_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.call_count as f64
        }
    }
}

struct RollingWindow {
    outcomes: VecDeque<CallOutcome>,
    capacity: usize,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, outcome: CallOutcome) {
        self.outcomes.push_back(outcome);
        while self.outcomes.len() > self.capacity {
            self.outcomes.pop_front();
        }
    }

    fn profile(&self, tool_name: &str, health: &HealthThresholds) -> SlaProfile {
        let call_count = self.outcomes.len() as u64;
        let error_count = self.outcomes.iter().filter(|o| !o.success).count() as u64;
        let total: Duration = self.outcomes.iter().map(|o| o.duration).sum();
        let average_latency = if call_count == 0 {
            Duration::ZERO
        } else {
            total / call_count as u32
        };

        let mut profile = SlaProfile {
            tool_name: tool_name.to_string(),
            call_count,
            error_count,
            average_latency,
            healthy: true,
        };
        profile.healthy = call_count == 0
            || (profile.error_rate() <= health.max_error_rate
                && average_latency <= health.max_latency);
        profile
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct HealthThresholds {
    pub max_error_rate: f64,
    pub max_latency: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_error_rate: 0.5,
            max_latency: Duration::from_secs(30),
        }
    }
}

/// Concurrency-safe aggregator callers never see the lock of.
pub struct SlaCollector {
    windows: RwLock<HashMap<String, RollingWindow>>,
    window_size: usize,
    health: HealthThresholds,
}

impl SlaCollector {
    pub fn new(window_size: usize, health: HealthThresholds) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            window_size,
            health,
        }
    }

    pub fn record(&self, tool_name: &str, success: bool, duration: Duration) {
        let mut windows = self.windows.write();
        let window = windows
            .entry(tool_name.to_string())
            .or_insert_with(|| RollingWindow::new(self.window_size));
        window.push(CallOutcome { success, duration });
    }

    pub fn profile(&self, tool_name: &str) -> SlaProfile {
        let windows = self.windows.read();
        match windows.get(tool_name) {
            Some(window) => window.profile(tool_name, &self.health),
            None => SlaProfile {
                tool_name: tool_name.to_string(),
                call_count: 0,
                error_count: 0,
                average_latency: Duration::ZERO,
                healthy: true,
            },
        }
    }

    pub fn is_healthy(&self, tool_name: &str) -> bool {
        self.profile(tool_name).healthy
    }

    /// Healthiest first; deterministic tiebreak by name.
    pub fn rank_tools(&self, names: &[String]) -> Vec<SlaProfile> {
        let mut profiles: Vec<SlaProfile> = names.iter().map(|n| self.profile(n)).collect();
        profiles.sort_by(|a, b| {
            b.healthy
                .cmp(&a.healthy)
                .then_with(|| a.error_rate().partial_cmp(&b.error_rate()).unwrap())
                .then_with(|| a.average_latency.cmp(&b.average_latency))
                .then_with(|| a.tool_name.cmp(&b.tool_name))
        });
        profiles
    }
}

impl Default for SlaCollector {
    fn default() -> Self {
        Self::new(50, HealthThresholds::default())
    }
}

/// Decorator: records latency/outcome for every call. Wraps the
/// ID-propagated chain; omitted entirely (with `IdPropagationExecutor`
/// outermost instead) when no collector is configured.
pub struct SlaExecutor {
    pub(crate) inner: Arc<dyn ToolExecutor>,
    collector: Arc<SlaCollector>,
}

impl SlaExecutor {
    pub fn new(inner: Arc<dyn ToolExecutor>, collector: Arc<SlaCollector>) -> Self {
        Self { inner, collector }
    }
}

#[async_trait]
impl ToolExecutor for SlaExecutor {
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
        let tool_name = self.inner.metadata().name;
        let start = Instant::now();
        let outcome = self.inner.execute(ctx, call).await;
        let duration = start.elapsed();

        let success = matches!(&outcome, Ok(r) if r.is_success());
        self.collector.record(&tool_name, success, duration);

        outcome
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
    fn unhealthy_above_error_rate_threshold() {
        let collector = SlaCollector::new(
            10,
            HealthThresholds {
                max_error_rate: 0.2,
                max_latency: Duration::from_secs(30),
            },
        );
        for i in 0..5 {
            collector.record("flaky", i != 0, Duration::from_millis(10));
        }
        assert!(!collector.is_healthy("flaky"));
    }

    #[test]
    fn ranking_puts_healthiest_first_deterministically() {
        let collector = SlaCollector::default();
        collector.record("a", true, Duration::from_millis(10));
        collector.record("b", false, Duration::from_millis(10));
        collector.record("c", true, Duration::from_millis(5));

        let ranked = collector.rank_tools(&["a".into(), "b".into(), "c".into()]);
        assert_eq!(ranked[0].tool_name, "c");
        assert_eq!(ranked.last().unwrap().tool_name, "b");
    }

    #[test]
    fn unknown_tool_reports_healthy_with_zero_calls() {
        let collector = SlaCollector::default();
        assert!(collector.is_healthy("never-seen"));
    }
}
