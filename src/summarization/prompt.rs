//! Prompt construction for the Summarization Service: a base prompt keyed
//! by compression level, mode-specific preservation instructions, and an
//! optional goal block.

use serde::{Deserialize, Serialize};

use crate::context::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Developer,
    Planning,
    Debugger,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone)]
pub struct Subtask {
    pub description: String,
    pub status: SubtaskStatus,
}

#[derive(Debug, Clone)]
pub struct Goal {
    pub description: String,
    pub status: String,
    pub priority: u8,
    pub subtasks: Vec<Subtask>,
    pub locked_decisions: Vec<String>,
    pub artifacts: Vec<String>,
}

fn base_prompt(level: u8) -> &'static str {
    match level {
        1 => {
            "Summarize the following conversation in 50-100 tokens. Be extremely terse: keep \
             only what is strictly necessary to continue the task."
        }
        2 => {
            "Summarize the following conversation in 150-300 tokens. Keep enough detail to \
             resume work without re-reading the original messages."
        }
        _ => {
            "Summarize the following conversation in 300-500 tokens. Preserve enough detail \
             that nothing load-bearing is lost."
        }
    }
}

fn mode_preservation_instructions(mode: Mode) -> &'static str {
    match mode {
        Mode::Developer => {
            "Weight Files Modified and Errors & Solutions highest: name every file touched and \
             every error encountered with its fix."
        }
        Mode::Planning => {
            "Weight Current Task and its subtasks highest: preserve task status and what \
             remains undecided."
        }
        Mode::Debugger => {
            "Weight Errors & Solutions and Current State highest: preserve the exact \
             repro steps and what has been ruled out."
        }
        Mode::Assistant => "Balance all sections evenly; no single section dominates.",
    }
}

const SECTION_HEADERS: &[&str] = &[
    "Current Task",
    "Key Decisions Made",
    "Files Modified",
    "Current State",
    "Important Context",
    "Errors & Solutions",
    "Tool Approval Policy",
];

fn goal_block(goal: &Goal) -> String {
    let mut block = String::new();
    block.push_str("\n\nGoal:\n");
    block.push_str(&format!("- Description: {}\n", goal.description));
    block.push_str(&format!("- Status: {}\n", goal.status));
    for subtask in &goal.subtasks {
        let marker = match subtask.status {
            SubtaskStatus::Pending => "[ ]",
            SubtaskStatus::InProgress => "[~]",
            SubtaskStatus::Done => "[x]",
        };
        block.push_str(&format!("  {marker} {}\n", subtask.description));
    }
    for decision in &goal.locked_decisions {
        block.push_str(&format!("[DECISION] {decision}\n"));
    }
    for artifact in goal.artifacts.iter().rev().take(3) {
        block.push_str(&format!("[ARTIFACT] {artifact}\n"));
    }
    block.push_str("Mark any natural stopping point with [CHECKPOINT].\n");
    block
}

/// Base prompt + mode-specific preservation instructions + optional goal
/// block, followed by the conversation to summarize organized under the
/// 7 section headers.
pub fn build_prompt(messages: &[Message], level: u8, mode: Mode, goal: Option<&Goal>) -> String {
    let mut prompt = String::new();
    prompt.push_str(base_prompt(level));
    prompt.push('\n');
    prompt.push_str(mode_preservation_instructions(mode));

    if let Some(goal) = goal {
        prompt.push_str(&goal_block(goal));
    }

    prompt.push_str("\n\nOrganize the summary under these sections (omit empty ones):\n");
    for header in SECTION_HEADERS {
        prompt.push_str(&format!("- {header}\n"));
    }

    prompt.push_str("\n\nConversation to summarize:\n");
    for message in messages {
        prompt.push_str(&format!("[{:?}] {}\n", message.role, message.content));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;

    #[test]
    fn prompt_includes_mode_specific_instructions() {
        let messages = vec![Message::new(Role::Assistant, "did the thing", 5)];
        let prompt = build_prompt(&messages, 2, Mode::Debugger, None);
        assert!(prompt.contains("Errors & Solutions"));
        assert!(prompt.contains("150-300 tokens"));
    }

    #[test]
    fn prompt_includes_goal_markers_when_goal_present() {
        let messages = vec![Message::new(Role::User, "continue", 3)];
        let goal = Goal {
            description: "ship the feature".to_string(),
            status: "in_progress".to_string(),
            priority: 1,
            subtasks: vec![Subtask {
                description: "write tests".to_string(),
                status: SubtaskStatus::Done,
            }],
            locked_decisions: vec!["use sqlite".to_string()],
            artifacts: vec!["src/db.rs".to_string()],
        };
        let prompt = build_prompt(&messages, 3, Mode::Planning, Some(&goal));
        assert!(prompt.contains("[DECISION] use sqlite"));
        assert!(prompt.contains("[ARTIFACT] src/db.rs"));
        assert!(prompt.contains("[CHECKPOINT]"));
    }
}
