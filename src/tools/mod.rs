//! Tool Registry: holds the known tools, filters them per mode, and
//! produces [`types::Invocation`]s for the Agent Loop to execute.

pub mod edit;
pub mod session_search;
pub mod types;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::provider::ToolSpec;
use crate::summarization::Mode;

pub use types::{
    ApprovalPolicy, ConfirmationDetails, Invocation, Risk, Tool, ToolCapability,
    ToolExecutionContext, ToolResult, ToolResultError,
};

/// Registered tools, keyed by name (not type) so re-registration is
/// idempotent — needed for hot-swap and other runtime-bound tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool`. Re-registering a name already present replaces it.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().expect("tool registry lock poisoned");
        if let Some(slot) = tools.iter_mut().find(|t| t.name() == tool.name()) {
            *slot = tool;
        } else {
            tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// All tool schemas, for handing to the Provider as part of the
    /// request. Identical for identical registry contents (purity).
    pub fn schemas(&self) -> Vec<ToolSpec> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// One filtering pass combining the mode's read-only restriction
    /// (planning mode may not write) with the caller's explicit denylist.
    pub fn available_for(&self, mode: Mode, denied: &HashSet<String>) -> Vec<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock poisoned")
            .iter()
            .filter(|t| !denied.contains(t.name()))
            .filter(|t| mode != Mode::Planning || t.is_read_only())
            .cloned()
            .collect()
    }

    /// Guard against a hallucinated tool call: the name must appear among
    /// `offered` (the schemas actually sent to the model this turn).
    pub fn create_invocation(
        &self,
        name: &str,
        offered: &[ToolSpec],
        args: Value,
        ctx: ToolExecutionContext,
    ) -> Result<Box<dyn Invocation>> {
        if !offered.iter().any(|s| s.name == name) {
            return Err(CoreError::ToolNotFound(name.to_string()));
        }
        let tool = self
            .get(name)
            .ok_or_else(|| CoreError::ToolNotFound(name.to_string()))?;
        tool.create_invocation(args, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::edit::EditTool;

    #[test]
    fn register_is_idempotent_by_name() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EditTool));
        registry.register(Arc::new(EditTool));
        assert_eq!(registry.schemas().len(), 1);
    }

    #[test]
    fn available_for_planning_mode_excludes_write_tools() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EditTool));
        let denied = HashSet::new();
        assert!(registry.available_for(Mode::Planning, &denied).is_empty());
        assert_eq!(registry.available_for(Mode::Developer, &denied).len(), 1);
    }

    #[test]
    fn create_invocation_rejects_tool_not_offered() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EditTool));
        let ctx = ToolExecutionContext {
            working_directory: std::env::temp_dir(),
            read_only_mode: false,
        };
        let err = registry
            .create_invocation("edit_file", &[], serde_json::json!({}), ctx)
            .unwrap_err();
        assert!(matches!(err, CoreError::ToolNotFound(_)));
    }
}
