//! Legacy Alias Layer.
//!
//! A fixed table of deprecated tool names, each carrying an argument
//! translator and a per-call routing function to its canonical
//! replacement. Resolved lazily on registry `Get` miss only — aliases are
//! never materialized into `List()`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::context::CallContext;
use crate::error::CoreError;
use crate::tool::{reserved_keys, ParameterSchema, ToolCall, ToolDefinition, ToolExecutor, ToolMetadata, ToolResult};

pub type ArgTranslator =
    Arc<dyn Fn(&CallContext, &Map<String, Value>) -> Map<String, Value> + Send + Sync>;
pub type RouteFn = Arc<dyn Fn(&Map<String, Value>) -> &'static str + Send + Sync>;
pub type ResolveToolFn = Arc<dyn Fn(&str) -> Option<Arc<dyn ToolExecutor>> + Send + Sync>;

#[derive(Clone)]
pub struct AliasEntry {
    pub legacy_name: &'static str,
    /// Canonical name used to populate `Definition`/`Metadata`; the actual
    /// call target is decided per-call by `route` (relevant for
    /// `file_edit`'s bimodal dispatch).
    pub default_canonical_name: &'static str,
    pub route: RouteFn,
    pub translate: ArgTranslator,
}

fn get_str(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn resolve_path(ctx: &CallContext, raw: &str) -> String {
    match ctx.path_resolver() {
        Some(resolver) => resolver.resolve(raw).to_string_lossy().to_string(),
        None => raw.to_string(),
    }
}

fn rename_key(args: &mut Map<String, Value>, from: &str, to: &str) {
    if !args.contains_key(to) {
        if let Some(v) = args.remove(from) {
            args.insert(to.to_string(), v);
        }
    }
}

fn translate_path_arg(ctx: &CallContext, args: &mut Map<String, Value>) {
    rename_key(args, "file_path", "path");
    if let Some(raw) = get_str(args, "path") {
        args.insert("path".into(), Value::String(resolve_path(ctx, &raw)));
    }
}

fn offset_limit_to_lines(args: &mut Map<String, Value>) {
    let offset = args.get("offset").and_then(Value::as_i64);
    let limit = args.get("limit").and_then(Value::as_i64);
    if let Some(offset) = offset {
        args.remove("offset");
        args.insert("start_line".into(), Value::from(offset));
        if let Some(limit) = limit {
            args.remove("limit");
            args.insert("end_line".into(), Value::from(offset + limit));
        }
    }
}

fn is_file_edit_empty_old_string(args: &Map<String, Value>) -> bool {
    get_str(args, "old_string")
        .or_else(|| get_str(args, "old_str"))
        .map(|s| s.is_empty())
        .unwrap_or(true)
}

static ALIAS_TABLE: Lazy<HashMap<&'static str, AliasEntry>> = Lazy::new(|| {
    let mut table = HashMap::new();

    table.insert(
        "file_read",
        AliasEntry {
            legacy_name: "file_read",
            default_canonical_name: "read_file",
            route: Arc::new(|_args| "read_file"),
            translate: Arc::new(|ctx, args| {
                let mut out = args.clone();
                translate_path_arg(ctx, &mut out);
                offset_limit_to_lines(&mut out);
                out
            }),
        },
    );
    table.insert(
        "file_write",
        AliasEntry {
            legacy_name: "file_write",
            default_canonical_name: "write_file",
            route: Arc::new(|_args| "write_file"),
            translate: Arc::new(|ctx, args| {
                let mut out = args.clone();
                translate_path_arg(ctx, &mut out);
                out
            }),
        },
    );
    table.insert(
        "file_edit",
        AliasEntry {
            legacy_name: "file_edit",
            default_canonical_name: "replace_in_file",
            route: Arc::new(|args| {
                if is_file_edit_empty_old_string(args) {
                    "write_file"
                } else {
                    "replace_in_file"
                }
            }),
            translate: Arc::new(|ctx, args| {
                let mut out = args.clone();
                translate_path_arg(ctx, &mut out);
                rename_key(&mut out, "old_str", "old_string");
                out
            }),
        },
    );
    table.insert(
        "list_files",
        AliasEntry {
            legacy_name: "list_files",
            default_canonical_name: "list_dir",
            route: Arc::new(|_args| "list_dir"),
            translate: Arc::new(|ctx, args| {
                let mut out = args.clone();
                translate_path_arg(ctx, &mut out);
                out
            }),
        },
    );
    table.insert(
        "bash",
        AliasEntry {
            legacy_name: "bash",
            default_canonical_name: "shell_exec",
            route: Arc::new(|_args| "shell_exec"),
            translate: Arc::new(|_ctx, args| {
                let mut out = args.clone();
                rename_key(&mut out, "working_dir", "exec_dir");
                out
            }),
        },
    );
    table.insert(
        "code_execute",
        AliasEntry {
            legacy_name: "code_execute",
            default_canonical_name: "execute_code",
            route: Arc::new(|_args| "execute_code"),
            translate: Arc::new(|_ctx, args| args.clone()),
        },
    );

    table
});

pub fn is_legacy_alias(name: &str) -> bool {
    ALIAS_TABLE.contains_key(name)
}

pub fn legacy_alias_names() -> Vec<&'static str> {
    ALIAS_TABLE.keys().copied().collect()
}

/// Wraps a canonical tool (resolved per-call, since `file_edit` can route to
/// either of two canonical tools) so `Definition`/`Metadata` present the
/// legacy name — the one decorator allowed to override them.
pub struct LegacyAliasExecutor {
    entry: AliasEntry,
    resolve_tool: ResolveToolFn,
}

impl LegacyAliasExecutor {
    pub fn new(entry: AliasEntry, resolve_tool: ResolveToolFn) -> Self {
        Self { entry, resolve_tool }
    }

    fn default_canonical(&self) -> Option<Arc<dyn ToolExecutor>> {
        (self.resolve_tool)(self.entry.default_canonical_name)
    }
}

#[async_trait]
impl ToolExecutor for LegacyAliasExecutor {
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
        let canonical_name = (self.entry.route)(&call.arguments);
        let canonical = (self.resolve_tool)(canonical_name)
            .ok_or_else(|| CoreError::NotFound(canonical_name.to_string()))?;

        let translated_args = (self.entry.translate)(ctx, &call.arguments);
        let routed_call = call.retargeted(canonical_name.to_string(), translated_args);

        let mut result = canonical.execute(ctx, &routed_call).await?;
        result.set_metadata(
            reserved_keys::LEGACY_TOOL_ALIAS,
            Value::String(self.entry.legacy_name.to_string()),
        );
        result.set_metadata(
            reserved_keys::CANONICAL_TOOL,
            Value::String(canonical_name.to_string()),
        );
        Ok(result)
    }

    fn definition(&self) -> ToolDefinition {
        let parameters = self
            .default_canonical()
            .map(|c| c.definition().parameters)
            .unwrap_or_else(ParameterSchema::default);
        ToolDefinition {
            name: self.entry.legacy_name.to_string(),
            description: format!(
                "Legacy compatibility alias for {}. Prefer {}.",
                self.entry.default_canonical_name, self.entry.default_canonical_name
            ),
            parameters,
        }
    }

    fn metadata(&self) -> ToolMetadata {
        let mut meta = self
            .default_canonical()
            .map(|c| c.metadata())
            .unwrap_or_else(|| ToolMetadata::new(self.entry.legacy_name, "legacy"));
        meta.name = self.entry.legacy_name.to_string();
        meta
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Resolve a legacy name against `resolve_tool` (typically the registry's
/// canonical-tier lookup), producing a ready-to-execute alias wrapper.
pub fn resolve_alias(
    name: &str,
    resolve_tool: ResolveToolFn,
) -> Option<Arc<dyn ToolExecutor>> {
    let entry = ALIAS_TABLE.get(name)?.clone();
    Some(Arc::new(LegacyAliasExecutor::new(entry, resolve_tool)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Channel, RootPathResolver};
    use serde_json::json;

    struct EchoArgsTool {
        name: &'static str,
    }

    #[async_trait]
    impl ToolExecutor for EchoArgsTool {
        async fn execute(&self, _ctx: &CallContext, call: &ToolCall) -> Result<ToolResult, CoreError> {
            Ok(ToolResult::ok(
                call.call_id.clone(),
                serde_json::to_string(&call.arguments).unwrap(),
            ))
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name.to_string(),
                description: "canonical".into(),
                parameters: ParameterSchema::default(),
            }
        }

        fn metadata(&self) -> ToolMetadata {
            ToolMetadata::new(self.name, "fs")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn registry_stub(tools: Vec<(&'static str, Arc<dyn ToolExecutor>)>) -> ResolveToolFn {
        let map: HashMap<&'static str, Arc<dyn ToolExecutor>> = tools.into_iter().collect();
        Arc::new(move |name| map.get(name).cloned())
    }

    #[tokio::test]
    async fn file_read_alias_translates_path_and_offset_limit() {
        let resolver = registry_stub(vec![(
            "read_file",
            Arc::new(EchoArgsTool { name: "read_file" }),
        )]);
        let alias = resolve_alias("file_read", resolver).unwrap();

        let ctx = CallContext::new(Channel::new("cli"))
            .with_path_resolver(Arc::new(RootPathResolver::new("/work")));
        let mut call = ToolCall::new("c1", "file_read");
        call.arguments = json!({
            "file_path": "rel.txt",
            "offset": 5,
            "limit": 10
        })
        .as_object()
        .unwrap()
        .clone();

        let result = alias.execute(&ctx, &call).await.unwrap();
        assert!(result.content.contains("\"path\":\"/work/rel.txt\""));
        assert!(result.content.contains("\"start_line\":5"));
        assert!(result.content.contains("\"end_line\":15"));
        assert_eq!(
            result.metadata.get(reserved_keys::LEGACY_TOOL_ALIAS).unwrap(),
            "file_read"
        );
        assert_eq!(
            result.metadata.get(reserved_keys::CANONICAL_TOOL).unwrap(),
            "read_file"
        );
    }

    #[tokio::test]
    async fn file_edit_with_empty_old_string_routes_to_write_file() {
        let resolver = registry_stub(vec![
            ("write_file", Arc::new(EchoArgsTool { name: "write_file" })),
            (
                "replace_in_file",
                Arc::new(EchoArgsTool {
                    name: "replace_in_file",
                }),
            ),
        ]);
        let alias = resolve_alias("file_edit", resolver).unwrap();
        let ctx = CallContext::new(Channel::new("cli"));
        let mut call = ToolCall::new("c1", "file_edit");
        call.arguments = json!({ "old_string": "" }).as_object().unwrap().clone();

        let result = alias.execute(&ctx, &call).await.unwrap();
        assert_eq!(
            result.metadata.get(reserved_keys::CANONICAL_TOOL).unwrap(),
            "write_file"
        );
    }

    #[tokio::test]
    async fn file_edit_with_nonempty_old_string_routes_to_replace_in_file() {
        let resolver = registry_stub(vec![
            ("write_file", Arc::new(EchoArgsTool { name: "write_file" })),
            (
                "replace_in_file",
                Arc::new(EchoArgsTool {
                    name: "replace_in_file",
                }),
            ),
        ]);
        let alias = resolve_alias("file_edit", resolver).unwrap();
        let ctx = CallContext::new(Channel::new("cli"));
        let mut call = ToolCall::new("c1", "file_edit");
        call.arguments = json!({ "old_string": "x", "new_string": "y" })
            .as_object()
            .unwrap()
            .clone();

        let result = alias.execute(&ctx, &call).await.unwrap();
        assert_eq!(
            result.metadata.get(reserved_keys::CANONICAL_TOOL).unwrap(),
            "replace_in_file"
        );
    }

    #[test]
    fn unknown_name_is_not_a_legacy_alias() {
        assert!(!is_legacy_alias("read_file"));
        assert!(is_legacy_alias("bash"));
    }
}
