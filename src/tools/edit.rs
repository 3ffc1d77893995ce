//! Edit File Tool — find/replace, line-based edits, regex replace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};

use super::types::{
    ApprovalPolicy, ConfirmationDetails, Invocation, Risk, Tool, ToolCapability,
    ToolExecutionContext, ToolResult,
};

pub struct EditTool;

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "operation")]
enum EditOperation {
    #[serde(rename = "replace")]
    Replace { old_text: String, new_text: String },
    #[serde(rename = "replace_lines")]
    ReplaceLines {
        start_line: usize,
        end_line: usize,
        new_text: String,
    },
    #[serde(rename = "insert_line")]
    InsertLine { line: usize, text: String },
    #[serde(rename = "delete_lines")]
    DeleteLines { start_line: usize, end_line: usize },
    #[serde(rename = "regex_replace")]
    RegexReplace { pattern: String, replacement: String },
}

#[derive(Debug, Deserialize, Serialize)]
struct EditInput {
    path: String,
    #[serde(flatten)]
    operation: EditOperation,
    #[serde(default = "default_true")]
    create_backup: bool,
}

fn default_true() -> bool {
    true
}

/// Reject absolute escapes above `working_directory` and verify the target
/// is a regular file that exists.
fn validate_file_path(path: &str, working_directory: &Path) -> std::result::Result<PathBuf, String> {
    let candidate = working_directory.join(path);
    let canonical = candidate
        .canonicalize()
        .map_err(|e| format!("cannot resolve '{path}': {e}"))?;
    if !canonical.starts_with(working_directory) {
        return Err(format!("'{path}' escapes the working directory"));
    }
    if !canonical.is_file() {
        return Err(format!("'{path}' is not a regular file"));
    }
    Ok(canonical)
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file intelligently using various operations: replace text, replace lines, \
         insert lines, delete lines, or regex replace."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to the file to edit" },
                "operation": {
                    "type": "string",
                    "enum": ["replace", "replace_lines", "insert_line", "delete_lines", "regex_replace"]
                },
                "old_text": { "type": "string" },
                "new_text": { "type": "string" },
                "start_line": { "type": "integer", "minimum": 0 },
                "end_line": { "type": "integer", "minimum": 0 },
                "line": { "type": "integer", "minimum": 0 },
                "text": { "type": "string" },
                "pattern": { "type": "string" },
                "replacement": { "type": "string" },
                "create_backup": { "type": "boolean", "default": true }
            },
            "required": ["path", "operation"]
        })
    }

    fn capabilities(&self) -> Vec<ToolCapability> {
        vec![ToolCapability::ReadFiles, ToolCapability::WriteFiles]
    }

    fn risk(&self) -> Risk {
        Risk::Medium
    }

    fn create_invocation(&self, args: Value, ctx: ToolExecutionContext) -> Result<Box<dyn Invocation>> {
        let input: EditInput = serde_json::from_value(args)
            .map_err(|e| CoreError::ToolExecution {
                tool: self.name().to_string(),
                message: format!("invalid input: {e}"),
            })?;
        Ok(Box::new(EditInvocation { input, ctx }))
    }
}

struct EditInvocation {
    input: EditInput,
    ctx: ToolExecutionContext,
}

#[async_trait]
impl Invocation for EditInvocation {
    fn get_description(&self) -> String {
        format!("edit {}", self.input.path)
    }

    fn tool_locations(&self) -> Vec<String> {
        vec![self.input.path.clone()]
    }

    fn should_confirm_execute(&self, policy: ApprovalPolicy) -> Result<Option<ConfirmationDetails>> {
        match policy {
            ApprovalPolicy::Deny => Err(CoreError::ToolDenied("edit_file".to_string())),
            ApprovalPolicy::Allow => Ok(None),
            ApprovalPolicy::Ask => Ok(Some(ConfirmationDetails {
                tool_name: "edit_file".to_string(),
                description: self.get_description(),
                risk: Risk::Medium,
                locations: Some(self.tool_locations()),
            })),
        }
    }

    async fn execute(&self, cancellation: &CancellationToken) -> ToolResult {
        if cancellation.is_cancelled() {
            return ToolResult::cancelled();
        }

        if self.ctx.read_only_mode {
            return ToolResult::error(
                "PlanModeRestriction",
                "edit operations are not allowed in read-only mode",
            );
        }

        let path = match validate_file_path(&self.input.path, &self.ctx.working_directory) {
            Ok(p) => p,
            Err(msg) => return ToolResult::error("InvalidInput", msg),
        };

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error("Io", e.to_string()),
        };

        if self.input.create_backup {
            let backup_path = path.with_extension(format!(
                "{}.backup",
                path.extension().and_then(|s| s.to_str()).unwrap_or("txt")
            ));
            if let Err(e) = fs::write(&backup_path, &content).await {
                return ToolResult::error("Io", e.to_string());
            }
        }

        let new_content = match apply_operation(&content, &self.input.operation) {
            Ok(c) => c,
            Err(msg) => return ToolResult::error("InvalidInput", msg),
        };

        if cancellation.is_cancelled() {
            return ToolResult::cancelled();
        }

        if let Err(e) = fs::write(&path, &new_content).await {
            return ToolResult::error("Io", e.to_string());
        }

        let lines_before = content.lines().count();
        let lines_after = new_content.lines().count();
        ToolResult::success(format!(
            "Successfully edited {}. Lines: {} -> {}",
            path.display(),
            lines_before,
            lines_after
        ))
    }
}

fn apply_operation(content: &str, operation: &EditOperation) -> std::result::Result<String, String> {
    match operation {
        EditOperation::Replace { old_text, new_text } => {
            if !content.contains(old_text.as_str()) {
                return Err(format!("text not found in file: '{old_text}'"));
            }
            Ok(content.replace(old_text.as_str(), new_text))
        }
        EditOperation::ReplaceLines {
            start_line,
            end_line,
            new_text,
        } => {
            let lines: Vec<&str> = content.lines().collect();
            if *start_line >= lines.len() || *end_line >= lines.len() {
                return Err(format!(
                    "line range {start_line}-{end_line} out of bounds ({} lines)",
                    lines.len()
                ));
            }
            if start_line > end_line {
                return Err("start_line must be <= end_line".to_string());
            }
            let mut new_lines = Vec::new();
            new_lines.extend_from_slice(&lines[..*start_line]);
            new_lines.push(new_text.as_str());
            if end_line + 1 < lines.len() {
                new_lines.extend_from_slice(&lines[end_line + 1..]);
            }
            Ok(new_lines.join("\n"))
        }
        EditOperation::InsertLine { line, text } => {
            let lines: Vec<&str> = content.lines().collect();
            if *line > lines.len() {
                return Err(format!("line {line} out of bounds ({} lines)", lines.len()));
            }
            let mut new_lines = Vec::new();
            new_lines.extend_from_slice(&lines[..*line]);
            new_lines.push(text.as_str());
            new_lines.extend_from_slice(&lines[*line..]);
            Ok(new_lines.join("\n"))
        }
        EditOperation::DeleteLines { start_line, end_line } => {
            let lines: Vec<&str> = content.lines().collect();
            if *start_line >= lines.len() || *end_line >= lines.len() {
                return Err(format!(
                    "line range {start_line}-{end_line} out of bounds ({} lines)",
                    lines.len()
                ));
            }
            if start_line > end_line {
                return Err("start_line must be <= end_line".to_string());
            }
            let mut new_lines = Vec::new();
            new_lines.extend_from_slice(&lines[..*start_line]);
            if end_line + 1 < lines.len() {
                new_lines.extend_from_slice(&lines[end_line + 1..]);
            }
            Ok(new_lines.join("\n"))
        }
        EditOperation::RegexReplace { pattern, replacement } => {
            let regex = regex::Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
            if !regex.is_match(content) {
                return Err(format!("pattern not found in file: '{pattern}'"));
            }
            Ok(regex.replace_all(content, replacement.as_str()).to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx(dir: &Path) -> ToolExecutionContext {
        ToolExecutionContext {
            working_directory: dir.to_path_buf(),
            read_only_mode: false,
        }
    }

    #[tokio::test]
    async fn replace_rewrites_file_contents() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello world").unwrap();

        let tool = EditTool;
        let invocation = tool
            .create_invocation(
                serde_json::json!({
                    "path": "a.txt",
                    "operation": "replace",
                    "old_text": "world",
                    "new_text": "rust",
                    "create_backup": false
                }),
                ctx(dir.path()),
            )
            .unwrap();

        let result = invocation.execute(&CancellationToken::new()).await;
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello rust");
    }

    #[tokio::test]
    async fn read_only_mode_refuses_to_write() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello world").unwrap();

        let tool = EditTool;
        let invocation = tool
            .create_invocation(
                serde_json::json!({
                    "path": "a.txt",
                    "operation": "replace",
                    "old_text": "world",
                    "new_text": "rust"
                }),
                ToolExecutionContext {
                    working_directory: dir.path().to_path_buf(),
                    read_only_mode: true,
                },
            )
            .unwrap();

        let result = invocation.execute(&CancellationToken::new()).await;
        assert!(result.error.is_some());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello world");
    }

    #[test]
    fn deny_policy_rejects_confirmation() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let tool = EditTool;
        let invocation = tool
            .create_invocation(
                serde_json::json!({"path": "a.txt", "operation": "replace", "old_text": "x", "new_text": "y"}),
                ctx(dir.path()),
            )
            .unwrap();
        let err = invocation.should_confirm_execute(ApprovalPolicy::Deny).unwrap_err();
        assert!(matches!(err, CoreError::ToolDenied(_)));
    }
}
