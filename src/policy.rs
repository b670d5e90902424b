//! Policy Engine.
//!
//! An allow/deny-with-precedence evaluator over full tool-call contexts
//! (tool name, category, tags, channel, safety level, dangerous-only) with
//! per-field override layering instead of a single allow/deny bit.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnforcementMode {
    Deny,
    WarnAllow,
}

/// The tool-call context matched against the rule list.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    pub tool_name: String,
    pub category: String,
    pub tags: HashSet<String>,
    pub dangerous: bool,
    pub safety_level: u8,
    pub channel: String,
}

/// A match selector: every non-empty field must match for the rule to
/// apply. Empty selector sets are treated as "matches anything".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSelector {
    pub tool_names: HashSet<String>,
    pub categories: HashSet<String>,
    pub tags: HashSet<String>,
    pub channels: HashSet<String>,
    pub safety_levels: HashSet<u8>,
    pub dangerous_only: bool,
}

impl RuleSelector {
    fn matches(&self, ctx: &ToolCallContext) -> bool {
        if !self.tool_names.is_empty() && !self.tool_names.contains(&ctx.tool_name) {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.contains(&ctx.category) {
            return false;
        }
        if !self.tags.is_empty() && !ctx.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        if !self.channels.is_empty() && !self.channels.contains(&ctx.channel) {
            return false;
        }
        if !self.safety_levels.is_empty() && !self.safety_levels.contains(&ctx.safety_level) {
            return false;
        }
        if self.dangerous_only && !ctx.dangerous {
            return false;
        }
        true
    }
}

/// Partial overrides a matching rule applies onto the accumulator. `None`
/// fields leave the accumulator untouched so later matches can layer only
/// what they explicitly set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyOverrides {
    pub enabled: Option<bool>,
    pub enforcement: Option<EnforcementMode>,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub selector: RuleSelector,
    pub overrides: PolicyOverrides,
}

/// Fully resolved policy for one call.
#[derive(Debug, Clone)]
pub struct ResolvedPolicy {
    pub enabled: bool,
    pub enforcement: EnforcementMode,
    pub timeout: Option<Duration>,
    pub retry: RetryConfig,
    pub safety_level: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDefaults {
    pub enabled: bool,
    pub enforcement: EnforcementMode,
    pub timeout: Option<Duration>,
    pub retry: RetryConfig,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            enabled: true,
            enforcement: EnforcementMode::WarnAllow,
            timeout: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Default safety-level rule: high-impact (>=3) and irreversible (4) tools
/// get `MaxRetries = 0` regardless of the global default, since retrying an
/// irreversible side effect compounds the damage rather than recovering
/// from a transient blip.
fn default_safety_level_rules() -> Vec<PolicyRule> {
    vec![PolicyRule {
        selector: RuleSelector {
            safety_levels: [3, 4].into_iter().collect(),
            ..Default::default()
        },
        overrides: PolicyOverrides {
            retry: Some(RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            }),
            ..Default::default()
        },
    }]
}

pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
    defaults: PolicyDefaults,
}

impl PolicyEngine {
    pub fn new(defaults: PolicyDefaults, mut rules: Vec<PolicyRule>) -> Self {
        let mut all_rules = default_safety_level_rules();
        all_rules.append(&mut rules);
        Self {
            rules: all_rules,
            defaults,
        }
    }

    /// Construct without the built-in safety-level rules, for tests that
    /// want to exercise layering in isolation.
    pub fn with_rules_only(defaults: PolicyDefaults, rules: Vec<PolicyRule>) -> Self {
        Self { rules, defaults }
    }

    /// Walk the rule list in order. Every matching rule overlays only the
    /// fields it explicitly sets onto an accumulator seeded with the global
    /// defaults: per-field layering across *all* matches, not
    /// first-match-wins.
    pub fn resolve(&self, ctx: &ToolCallContext) -> ResolvedPolicy {
        let mut enabled = self.defaults.enabled;
        let mut enforcement = self.defaults.enforcement;
        let mut timeout = self.defaults.timeout;
        let mut retry = self.defaults.retry.clone();

        for rule in &self.rules {
            if !rule.selector.matches(ctx) {
                continue;
            }
            if let Some(v) = rule.overrides.enabled {
                enabled = v;
            }
            if let Some(v) = rule.overrides.enforcement {
                enforcement = v;
            }
            if let Some(v) = rule.overrides.timeout {
                timeout = Some(v);
            }
            if let Some(ref v) = rule.overrides.retry {
                retry = v.clone();
            }
        }

        ResolvedPolicy {
            enabled,
            enforcement,
            timeout,
            retry,
            safety_level: ctx.safety_level,
        }
    }
}
