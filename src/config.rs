//! Ambient configuration.
//!
//! Plain `serde`-derived structs with `Default` impls, loadable from TOML.
//! Kept separate from the modules that own the types themselves
//! (`RetryConfig` lives in `retry.rs`, etc.) so this file is purely "how
//! configuration is assembled and loaded", not a duplicate definition site.

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::degradation::DegradationConfig;
use crate::policy::{PolicyDefaults, PolicyRule};
use crate::sla::HealthThresholds;

/// Top-level configuration for one `Registry` construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub policy_defaults: PolicyDefaults,
    #[serde(default)]
    pub policy_rules: Vec<PolicyRule>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default = "default_sla_window_size")]
    pub sla_window_size: usize,
    #[serde(default)]
    pub sla_health: HealthThresholds,
    #[serde(default)]
    pub sla_enabled: bool,
    #[serde(default)]
    pub degradation: DegradationConfig,
}

fn default_sla_window_size() -> usize {
    50
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            policy_defaults: PolicyDefaults::default(),
            policy_rules: Vec::new(),
            circuit_breaker: CircuitBreakerConfig::default(),
            sla_window_size: default_sla_window_size(),
            sla_health: HealthThresholds::default(),
            sla_enabled: true,
            degradation: DegradationConfig::default(),
        }
    }
}

/// Parse a `CoreConfig` from TOML source, e.g. the contents of a
/// `tool_exec.toml` file read by the caller.
pub fn load_from_toml(source: &str) -> anyhow::Result<CoreConfig> {
    let config: CoreConfig = toml::from_str(source)?;
    Ok(config)
}
