//! The Tool and Invocation contract: tools are registered once with a
//! static schema; each call creates an [`Invocation`] scoped to one set of
//! arguments and one execution context.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    ReadFiles,
    WriteFiles,
    NetworkAccess,
    SystemModification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    Allow,
    Ask,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationDetails {
    pub tool_name: String,
    pub description: String,
    pub risk: Risk,
    pub locations: Option<Vec<String>>,
}

/// The `{ message, type }` shape every tool error carries. `kind` matches
/// `[A-Za-z0-9_-]+`; cancellation/timeout kinds match `/Cancel|Abort|Timeout/i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultError {
    pub message: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub llm_content: String,
    pub return_display: String,
    pub error: Option<ToolResultError>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            return_display: content.clone(),
            llm_content: content,
            error: None,
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            llm_content: message.clone(),
            return_display: message.clone(),
            error: Some(ToolResultError {
                message,
                kind: kind.into(),
            }),
        }
    }

    pub fn cancelled() -> Self {
        Self::error("Cancelled", "execution was cancelled")
    }

    pub fn timeout() -> Self {
        Self::error("Timeout", "execution exceeded its deadline")
    }
}

/// Per-invocation execution environment. `read_only_mode` mirrors the
/// teacher's Plan-mode guard: tools that write must refuse under it.
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    pub working_directory: PathBuf,
    pub read_only_mode: bool,
}

#[async_trait]
pub trait Invocation: Send + Sync {
    /// Non-empty, mentions the primary subject (path, command, pattern…).
    fn get_description(&self) -> String;

    /// Paths/identifiers this invocation touches. May be empty.
    fn tool_locations(&self) -> Vec<String>;

    /// `deny` rejects outright; `allow` returns `None` (no confirmation
    /// needed); `ask` returns confirmation details. Read-only tools always
    /// return `None`, regardless of policy.
    fn should_confirm_execute(&self, policy: ApprovalPolicy) -> Result<Option<ConfirmationDetails>>;

    async fn execute(&self, cancellation: &CancellationToken) -> ToolResult;
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn capabilities(&self) -> Vec<ToolCapability>;
    fn risk(&self) -> Risk;

    fn is_read_only(&self) -> bool {
        self.capabilities()
            .iter()
            .all(|c| matches!(c, ToolCapability::ReadFiles))
    }

    fn create_invocation(
        &self,
        args: Value,
        ctx: ToolExecutionContext,
    ) -> Result<Box<dyn Invocation>>;
}
