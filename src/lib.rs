//! Tool Execution Core: middleware between an LLM agent's reasoning loop
//! and its side-effecting tools. Owns argument validation, approval,
//! per-tool policy, retry + circuit breaking, SLA measurement, graceful
//! degradation, legacy alias translation, and identifier propagation
//! around a three-tier tool registry. Does not implement any tool's
//! business logic and does not decide which tool to call.

pub mod alias;
pub mod approval;
pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod degradation;
pub mod error;
pub mod id_propagation;
pub mod lifecycle;
pub mod policy;
pub mod registry;
pub mod retry;
pub mod sla;
pub mod subagent;
pub mod tool;
pub mod validator;
pub mod views;

pub use context::{CallContext, Channel, PathResolver, RootPathResolver};
pub use error::{classify, CoreError, ErrorClass};
pub use registry::{Registry, Tier};
pub use tool::{
    ParameterSchema, PropertySchema, SchemaType, ToolCall, ToolDefinition, ToolExecutor,
    ToolMetadata, ToolResult,
};

/// Initialize a `tracing` subscriber reading its filter from `RUST_LOG`,
/// falling back to `info`. Mirrors the setup a binary would run ahead of
/// constructing a registry; library consumers that already run their own
/// subscriber should skip calling this.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
