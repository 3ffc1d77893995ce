//! Shared types for the Agent Loop: configuration, progress events, and the
//! per-turn outcome handed back to the caller.

use std::time::Duration;

use serde_json::Value;

use crate::tools::ConfirmationDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAfterSummary {
    Ask,
    Auto,
}

#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub max_turns: u32,
    /// The provider's context window, in tokens (`ollamaLimit` in the spec).
    pub context_window: usize,
    pub safety_margin: usize,
    /// `num_ctx` is capped at this fraction of `context_window`.
    pub context_size_cap_ratio: f64,
    pub stream_idle_timeout: Duration,
    pub max_stream_retries: u32,
    pub resume_after_summary: ResumeAfterSummary,
    /// Same-signature tool calls in a row before loop detection trips.
    pub loop_detection_threshold: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            context_window: 128_000,
            safety_margin: 4_096,
            context_size_cap_ratio: 0.85,
            stream_idle_timeout: Duration::from_secs(60),
            max_stream_retries: 2,
            resume_after_summary: ResumeAfterSummary::Auto,
            loop_detection_threshold: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AgentEvent {
    Text(String),
    Thinking(String),
    ToolStarted { name: String, input: Value },
    ToolCompleted { name: String, success: bool, summary: String },
    Notice(String),
    WaitingForResume,
}

pub type ApprovalCallback<'a> = dyn Fn(&ConfirmationDetails) -> bool + Send + Sync + 'a;
pub type EventCallback<'a> = dyn Fn(AgentEvent) + Send + Sync + 'a;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The assistant produced a final answer with no tool call.
    Finished,
    /// `maxTurns` was reached without a final answer.
    MaxTurnsReached,
    /// The caller's cancellation token fired.
    Cancelled,
    /// A repeated identical tool call was detected.
    LoopDetected,
    /// A provider stream, hallucinated tool call, or other recoverable
    /// task error terminated the turn.
    Error,
    /// Compression dropped the context and the loop is waiting for the
    /// user to say "continue" or "stop" (`resumeAfterSummary: ask`).
    WaitingForResume,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub content: String,
    pub turns_used: u32,
    pub stop_reason: StopReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
}
