//! Concurrency / Lifecycle (registry locking is covered in `registry.rs`).
//!
//! Container-level `Start`/`Drain`/`Shutdown`, plus the MCP background
//! initialization loop with exponential backoff, built on a
//! cancellation-aware background task pattern (`tokio::select!` between
//! work and a cancellation signal) with attempt/last-error bookkeeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::Registry;

const MCP_MIN_BACKOFF: Duration = Duration::from_secs(1);
const MCP_MAX_BACKOFF: Duration = Duration::from_secs(30);
const DRAIN_SUBSYSTEM_TIMEOUT: Duration = Duration::from_secs(5);

/// Tracks the background MCP initialization loop's progress so an operator
/// surface can report on it without the core depending on any UI.
#[derive(Debug, Clone, Default)]
pub struct McpInitStatus {
    pub attempts: u32,
    pub last_error: Option<String>,
    pub initialized: bool,
}

pub struct McpInitTracker {
    status: RwLock<McpInitStatus>,
}

impl McpInitTracker {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(McpInitStatus::default()),
        }
    }

    pub fn status(&self) -> McpInitStatus {
        self.status.read().clone()
    }

    fn record_attempt(&self) -> u32 {
        let mut status = self.status.write();
        status.attempts += 1;
        status.attempts
    }

    fn record_failure(&self, error: String) {
        self.status.write().last_error = Some(error);
    }

    fn record_success(&self) {
        let mut status = self.status.write();
        status.last_error = None;
        status.initialized = true;
    }
}

impl Default for McpInitTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn next_backoff(attempt: u32) -> Duration {
    let scaled = MCP_MIN_BACKOFF.as_secs_f64() * 2f64.powi(attempt as i32);
    Duration::from_secs_f64(scaled.min(MCP_MAX_BACKOFF.as_secs_f64()))
}

/// Runs `init` (Initialize + RegisterWithToolRegistry, opaque to the core)
/// on a background task until it succeeds, backing off 1s -> 30s between
/// attempts, until `cancel` fires.
pub async fn run_mcp_init<F, Fut>(tracker: Arc<McpInitTracker>, cancel: CancellationToken, init: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let n = tracker.record_attempt();
        match init().await {
            Ok(()) => {
                tracker.record_success();
                info!(attempts = n, "mcp initialization succeeded");
                return;
            }
            Err(e) => {
                warn!(attempts = n, error = %e, "mcp initialization attempt failed");
                tracker.record_failure(e.to_string());
            }
        }

        let delay = next_backoff(attempt);
        attempt += 1;

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// A subsystem that can be asked to wind down gracefully before shutdown.
#[async_trait]
pub trait Drainable: Send + Sync {
    async fn drain(&self) -> anyhow::Result<()>;
}

/// An external collaborator the container closes as part of shutdown
/// (session DB pool, agent coordinator, browser manager) — opaque; the
/// core only orchestrates the order of closing.
#[async_trait]
pub trait Closeable: Send + Sync {
    async fn close(&self) -> anyhow::Result<()>;
}

/// Owns container-level lifecycle: idempotent start, MCP init cancellation,
/// drain-then-close ordering.
pub struct Container {
    started: AtomicBool,
    registry: Arc<Registry>,
    mcp_tracker: Arc<McpInitTracker>,
    mcp_cancel: CancellationToken,
    drainables: RwLock<Vec<Arc<dyn Drainable>>>,
    closeables: RwLock<Vec<Arc<dyn Closeable>>>,
}

impl Container {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            started: AtomicBool::new(false),
            registry,
            mcp_tracker: Arc::new(McpInitTracker::new()),
            mcp_cancel: CancellationToken::new(),
            drainables: RwLock::new(Vec::new()),
            closeables: RwLock::new(Vec::new()),
        }
    }

    pub fn register_drainable(&self, drainable: Arc<dyn Drainable>) {
        self.drainables.write().push(drainable);
    }

    pub fn register_closeable(&self, closeable: Arc<dyn Closeable>) {
        self.closeables.write().push(closeable);
    }

    pub fn mcp_status(&self) -> McpInitStatus {
        self.mcp_tracker.status()
    }

    /// Idempotent: a second call is a no-op.
    pub fn start<F, Fut>(&self, mcp_init: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let tracker = self.mcp_tracker.clone();
        let cancel = self.mcp_cancel.clone();
        tokio::spawn(run_mcp_init(tracker, cancel, mcp_init));
        true
    }

    /// Runs every registered drainable with a per-subsystem timeout,
    /// collecting (rather than failing fast on) individual timeouts/errors.
    pub async fn drain(&self) -> Vec<anyhow::Error> {
        let drainables: Vec<Arc<dyn Drainable>> = self.drainables.read().clone();
        let mut errors = Vec::new();

        for drainable in drainables {
            match tokio::time::timeout(DRAIN_SUBSYSTEM_TIMEOUT, drainable.drain()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(_) => errors.push(anyhow::anyhow!("drain timed out after {DRAIN_SUBSYSTEM_TIMEOUT:?}")),
            }
        }
        errors
    }

    /// Cancels MCP init, shuts the MCP registry (covered by
    /// `registry.close()`), closes the tool registry, then every
    /// registered external collaborator in registration order.
    pub async fn shutdown(&self) -> Vec<anyhow::Error> {
        self.mcp_cancel.cancel();
        self.registry.close();

        let closeables: Vec<Arc<dyn Closeable>> = self.closeables.read().clone();
        let mut errors = Vec::new();
        for closeable in closeables {
            if let Err(e) = closeable.close().await {
                errors.push(e);
            }
        }
        errors
    }
}
