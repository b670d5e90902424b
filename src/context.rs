//! Context-carried capabilities threaded through every call.
//!
//! The design notes call out context-carried capabilities (approver, path
//! resolver, auto-approve flag, IDs, channel, memory policy) as something to
//! model as an explicit, immutable environment value rather than ambient or
//! global state, with one typed accessor per capability. `CallContext` is
//! that value.

use std::path::PathBuf;
use std::sync::Arc;

use crate::approval::Approver;

/// Resolves a possibly-relative path against the caller's working root,
/// as the legacy alias layer needs when translating path-shaped arguments.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, path: &str) -> PathBuf;
}

/// Default resolver: relative paths are joined to a fixed root, absolute
/// paths pass through unchanged.
pub struct RootPathResolver {
    root: PathBuf,
}

impl RootPathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PathResolver for RootPathResolver {
    fn resolve(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() { p } else { self.root.join(p) }
    }
}

/// Governs whether/how a tool call's inputs and outputs are retained in
/// longer-lived memory. Opaque to this crate; callers supply their own
/// retention/redaction rules.
pub trait MemoryPolicy: Send + Sync {
    fn should_retain(&self, tool_name: &str) -> bool;
}

/// Notified of tool call lifecycle events by a caller further up the stack
/// (e.g. a parent agent run), independent of tracing spans.
pub trait ParentEventListener: Send + Sync {
    fn on_tool_call_started(&self, tool_name: &str, call_id: &str);
    fn on_tool_call_finished(&self, tool_name: &str, call_id: &str, success: bool);
}

/// Ingress surface used by the policy engine for scoping rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel(pub String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An explicit, immutable environment value carrying every capability a
/// layer in the decorator stack needs, instead of ambient/global state.
#[derive(Clone)]
pub struct CallContext {
    pub auto_approve: bool,
    pub channel: Channel,
    pub user_id: String,
    pub log_id: String,
    approver: Option<Arc<dyn Approver>>,
    path_resolver: Option<Arc<dyn PathResolver>>,
    memory_policy: Option<Arc<dyn MemoryPolicy>>,
    parent_event_listener: Option<Arc<dyn ParentEventListener>>,
}

impl CallContext {
    pub fn new(channel: Channel) -> Self {
        Self {
            auto_approve: false,
            channel,
            user_id: String::new(),
            log_id: String::new(),
            approver: None,
            path_resolver: None,
            memory_policy: None,
            parent_event_listener: None,
        }
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn with_approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_path_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.path_resolver = Some(resolver);
        self
    }

    pub fn with_memory_policy(mut self, policy: Arc<dyn MemoryPolicy>) -> Self {
        self.memory_policy = Some(policy);
        self
    }

    pub fn with_parent_event_listener(mut self, listener: Arc<dyn ParentEventListener>) -> Self {
        self.parent_event_listener = Some(listener);
        self
    }

    pub fn approver(&self) -> Option<&Arc<dyn Approver>> {
        self.approver.as_ref()
    }

    pub fn path_resolver(&self) -> Option<&Arc<dyn PathResolver>> {
        self.path_resolver.as_ref()
    }

    pub fn memory_policy(&self) -> Option<&Arc<dyn MemoryPolicy>> {
        self.memory_policy.as_ref()
    }

    pub fn parent_event_listener(&self) -> Option<&Arc<dyn ParentEventListener>> {
        self.parent_event_listener.as_ref()
    }
}
