//! Per-tool circuit breaker.
//!
//! Per-tool state tracked in a `parking_lot::RwLock<HashMap<...>>` so one
//! misbehaving tool can't disable every tool, with an optimistic read-first
//! `allow_request` path. An explicit three-state machine with
//! `FailureThreshold`/`SuccessThreshold` consecutive-count transitions,
//! rather than backing off from the very first failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Normalize to sane floor values: failure/success thresholds at least
    /// 1, timeout strictly positive.
    pub fn normalized(mut self) -> Self {
        self.failure_threshold = self.failure_threshold.max(1);
        self.success_threshold = self.success_threshold.max(1);
        if self.timeout.is_zero() {
            self.timeout = Duration::from_secs(60);
        }
        self
    }
}

#[derive(Debug, Clone)]
struct ToolState {
    status: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            status: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolCircuitDiagnostics {
    pub tool_name: String,
    pub status: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
}

/// Per-tool circuit breaker keyed by `"tool-<name>"` conceptually (the key
/// used internally is the bare tool name; callers never see the prefix).
/// Created on first use, never shared between tools.
#[derive(Clone)]
pub struct CircuitBreaker {
    states: Arc<RwLock<HashMap<String, ToolState>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            config: config.normalized(),
        }
    }

    /// Returns true if a call may proceed; performs the Open -> HalfOpen
    /// transition when the cooldown has elapsed.
    pub fn allow_request(&self, tool_name: &str) -> bool {
        {
            let states = self.states.read();
            match states.get(tool_name) {
                None => return true,
                Some(state) => match state.status {
                    CircuitState::Closed | CircuitState::HalfOpen => return true,
                    CircuitState::Open => {
                        let elapsed = state.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                        if elapsed < self.config.timeout {
                            return false;
                        }
                    }
                },
            }
        }

        let mut states = self.states.write();
        let state = states.entry(tool_name.to_string()).or_default();
        if state.status != CircuitState::Open {
            return true;
        }
        let elapsed = state.opened_at.map(|t| t.elapsed()).unwrap_or_default();
        if elapsed >= self.config.timeout {
            state.status = CircuitState::HalfOpen;
            state.consecutive_successes = 0;
            debug!(tool = tool_name, "breaker half-open, probing");
            true
        } else {
            false
        }
    }

    pub fn record_success(&self, tool_name: &str) {
        let mut states = self.states.write();
        let state = states.entry(tool_name.to_string()).or_default();
        match state.status {
            CircuitState::Closed => {
                state.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                state.consecutive_successes += 1;
                if state.consecutive_successes >= self.config.success_threshold {
                    *state = ToolState::default();
                    debug!(tool = tool_name, "breaker closed after successful probe");
                }
            }
            CircuitState::Open => {
                // Forced recovery path; treat as an immediate close.
                *state = ToolState::default();
                debug!(tool = tool_name, "breaker force-closed");
            }
        }
    }

    pub fn record_failure(&self, tool_name: &str) {
        let mut states = self.states.write();
        let state = states.entry(tool_name.to_string()).or_default();
        match state.status {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.status = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                    warn!(
                        tool = tool_name,
                        consecutive_failures = state.consecutive_failures,
                        "breaker open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                state.status = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                state.consecutive_successes = 0;
                warn!(tool = tool_name, "probe failed, breaker reopened");
            }
            CircuitState::Open => {
                state.opened_at = Some(Instant::now());
            }
        }
    }

    pub fn state(&self, tool_name: &str) -> CircuitState {
        self.states
            .read()
            .get(tool_name)
            .map(|s| s.status)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn reset(&self, tool_name: &str) {
        self.states.write().remove(tool_name);
    }

    pub fn diagnostics(&self, tool_name: &str) -> ToolCircuitDiagnostics {
        let states = self.states.read();
        match states.get(tool_name) {
            Some(state) => ToolCircuitDiagnostics {
                tool_name: tool_name.to_string(),
                status: state.status,
                consecutive_failures: state.consecutive_failures,
                opened_at: state.opened_at,
            },
            None => ToolCircuitDiagnostics {
                tool_name: tool_name.to_string(),
                status: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            },
        }
    }

    pub fn all_diagnostics(&self) -> Vec<ToolCircuitDiagnostics> {
        self.states
            .read()
            .iter()
            .map(|(name, state)| ToolCircuitDiagnostics {
                tool_name: name.clone(),
                status: state.status,
                consecutive_failures: state.consecutive_failures,
                opened_at: state.opened_at,
            })
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_by_default_for_unseen_tool() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state("grep"), CircuitState::Closed);
        assert!(breaker.allow_request("grep"));
    }

    #[test]
    fn opens_after_failure_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        });

        for _ in 0..2 {
            breaker.record_failure("flaky");
        }
        assert_eq!(breaker.state("flaky"), CircuitState::Closed);

        breaker.record_failure("flaky");
        assert_eq!(breaker.state("flaky"), CircuitState::Open);
        assert!(!breaker.allow_request("flaky"));
    }

    #[test]
    fn half_open_after_timeout_and_closes_on_success_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 2,
            timeout: Duration::from_millis(10),
        });

        breaker.record_failure("flaky");
        assert_eq!(breaker.state("flaky"), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allow_request("flaky"));
        assert_eq!(breaker.state("flaky"), CircuitState::HalfOpen);

        breaker.record_success("flaky");
        assert_eq!(breaker.state("flaky"), CircuitState::HalfOpen);
        breaker.record_success("flaky");
        assert_eq!(breaker.state("flaky"), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            timeout: Duration::from_millis(5),
        });

        breaker.record_failure("flaky");
        std::thread::sleep(Duration::from_millis(10));
        assert!(breaker.allow_request("flaky"));

        breaker.record_failure("flaky");
        assert_eq!(breaker.state("flaky"), CircuitState::Open);
    }

    #[test]
    fn one_tool_opening_does_not_affect_another() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        });
        breaker.record_failure("bad_tool");
        assert_eq!(breaker.state("bad_tool"), CircuitState::Open);
        assert_eq!(breaker.state("good_tool"), CircuitState::Closed);
    }
}
