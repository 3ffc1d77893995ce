//! Agent Loop — per user input, drives the provider stream, dispatches
//! tool calls, and feeds the Context Manager until the turn reaches a
//! final answer, `maxTurns`, or cancellation.

pub mod stream;
pub mod types;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::{self, Checkpoint, Message as CtxMessage, ToolCallRecord, ToolCallStatus};
use crate::error::{CoreError, Result};
use crate::manager::ContextManager;
use crate::provider::{
    ContentBlock, LLMRequest, Message as WireMessage, Provider, Role as WireRole, ToolSpec,
};
use crate::token::CharEstimator;
use crate::token::TokenCounter;
use crate::tools::{ApprovalPolicy, ToolExecutionContext, ToolRegistry};

pub use types::{AgentEvent, AgentLoopConfig, ApprovalCallback, EventCallback, ResumeAfterSummary, StopReason, TurnOutcome};

fn to_wire_message(message: &CtxMessage) -> WireMessage {
    match message.role {
        context::Role::Tool => WireMessage {
            role: WireRole::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: message
                    .tool_call_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                content: message.content.clone(),
                is_error: false,
            }],
        },
        context::Role::Assistant => {
            let mut content = Vec::new();
            if !message.content.is_empty() {
                content.push(ContentBlock::Text { text: message.content.clone() });
            }
            for call in &message.tool_calls {
                content.push(ContentBlock::ToolUse {
                    id: call.id.to_string(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                });
            }
            WireMessage { role: WireRole::Assistant, content }
        }
        context::Role::User => WireMessage::user(message.content.clone()),
        context::Role::System => WireMessage {
            role: WireRole::System,
            content: vec![ContentBlock::Text { text: message.content.clone() }],
        },
    }
}

fn tool_call_signature(name: &str, input: &serde_json::Value) -> String {
    let input_str = serde_json::to_string(input).unwrap_or_default();
    let hash: u64 = input_str
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    format!("{name}:{hash:x}")
}

pub struct AgentLoop {
    context: Arc<ContextManager>,
    provider: RwLock<Arc<dyn Provider>>,
    model: RwLock<String>,
    tools: Arc<ToolRegistry>,
    config: AgentLoopConfig,
    approval_policy: ApprovalPolicy,
    compression_occurred: Arc<AtomicBool>,
    waiting_for_resume: AtomicBool,
}

impl AgentLoop {
    pub fn new(
        context: Arc<ContextManager>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        config: AgentLoopConfig,
        approval_policy: ApprovalPolicy,
    ) -> Arc<Self> {
        let compression_occurred = Arc::new(AtomicBool::new(false));
        let flag = compression_occurred.clone();
        context.on(
            "auto-summary-created",
            Box::new(move |_| {
                flag.store(true, Ordering::SeqCst);
            }),
        );

        Arc::new(Self {
            context,
            provider: RwLock::new(provider),
            model: RwLock::new(model.into()),
            tools,
            config,
            approval_policy,
            compression_occurred,
            waiting_for_resume: AtomicBool::new(false),
        })
    }

    /// Swap the active model mid-conversation (a "hot-swap"). The current
    /// turn still counts toward `maxTurns` once it completes.
    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.write().expect("model lock poisoned") = model.into();
    }

    pub fn set_provider(&self, provider: Arc<dyn Provider>) {
        *self.provider.write().expect("provider lock poisoned") = provider;
    }

    fn current_model(&self) -> String {
        self.model.read().expect("model lock poisoned").clone()
    }

    fn current_provider(&self) -> Arc<dyn Provider> {
        self.provider.read().expect("provider lock poisoned").clone()
    }

    /// "continue" after a `resumeAfterSummary: ask` pause.
    pub fn is_waiting_for_resume(&self) -> bool {
        self.waiting_for_resume.load(Ordering::SeqCst)
    }

    pub async fn run_turn(
        &self,
        user_input: String,
        cancellation: CancellationToken,
        events: &EventCallback<'_>,
        approval: Option<&ApprovalCallback<'_>>,
    ) -> Result<TurnOutcome> {
        if self.waiting_for_resume.load(Ordering::SeqCst) {
            if user_input.trim().eq_ignore_ascii_case("stop") {
                self.waiting_for_resume.store(false, Ordering::SeqCst);
                return Ok(TurnOutcome {
                    content: String::new(),
                    turns_used: 0,
                    stop_reason: StopReason::Cancelled,
                    input_tokens: 0,
                    output_tokens: 0,
                });
            }
            self.waiting_for_resume.store(false, Ordering::SeqCst);
        }

        let estimator = CharEstimator;
        let token_count = estimator.estimate(&user_input);
        let user_message = CtxMessage::new(context::Role::User, user_input.clone(), token_count);
        self.context.add_message(user_message.clone()).await?;

        let model_at_turn_start = self.current_model();
        let mut turns_used = 0u32;
        let mut total_input_tokens = 0u32;
        let mut total_output_tokens = 0u32;
        let mut final_text = String::new();
        let mut recent_signatures: Vec<String> = Vec::new();
        let mut stop_reason = StopReason::MaxTurnsReached;

        'turns: while turns_used < self.config.max_turns {
            if cancellation.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }

            if self.current_model() != model_at_turn_start {
                events(AgentEvent::Notice("model changed mid-loop, ending turn".to_string()));
                stop_reason = StopReason::Finished;
                break;
            }

            self.compression_occurred.store(false, Ordering::SeqCst);
            let mut allow_retry = true;
            let mut stream_retries = 0u32;
            let mut stream_error: Option<String> = None;

            let response = 'stream: loop {
                let active_context = self.context.get_context().await;
                let current_tokens = active_context.token_count();
                let context_window = self.config.context_window;
                let remaining_budget = context_window.saturating_sub(current_tokens + self.config.safety_margin);
                let cap = (context_window as f64 * self.config.context_size_cap_ratio) as usize;
                // num_ctx would be wired into an Ollama-native request; the OpenAI-compatible
                // adapter this crate ships has no such field, so only max_tokens crosses the wire.
                let _num_ctx = (current_tokens + remaining_budget).min(context_window).min(cap);
                let max_tokens = remaining_budget.saturating_sub(100).max(1) as u32;

                let history: Vec<WireMessage> = active_context.recent().iter().map(to_wire_message).collect();
                let tool_schemas: Vec<ToolSpec> = self.tools.schemas();
                let model = self.current_model();

                let request = LLMRequest {
                    model: model.clone(),
                    system: Some(active_context.system_prompt().content.clone()),
                    messages: history,
                    tools: if tool_schemas.is_empty() { None } else { Some(tool_schemas.clone()) },
                    temperature: Some(0.7),
                    max_tokens: Some(max_tokens),
                    stream: true,
                };

                let provider = self.current_provider();
                let result = provider.stream(request).await;
                // Provider-stream failures never propagate as exceptions; they are
                // converted into a terminal `finish(error)` outcome for this turn.
                let provider_stream = match result {
                    Ok(s) => s,
                    Err(e) => {
                        stream_error = Some(e.to_string());
                        break 'stream None;
                    }
                };

                let events_ref = events;
                let accumulated = stream::accumulate(
                    provider_stream,
                    self.config.stream_idle_timeout,
                    &cancellation,
                    |delta| match delta {
                        stream::StreamDelta::Text(t) => events_ref(AgentEvent::Text(t)),
                        stream::StreamDelta::Thinking(t) => events_ref(AgentEvent::Thinking(t)),
                    },
                )
                .await;

                let response = match accumulated {
                    Ok(r) => r,
                    Err(e) => {
                        stream_error = Some(e.to_string());
                        break 'stream None;
                    }
                };

                // Retry-after-compression: at most once per turn, not counted.
                if allow_retry && self.compression_occurred.load(Ordering::SeqCst) {
                    allow_retry = false;
                    let ctx_after = self.context.get_context().await;
                    let last_present = ctx_after.recent().iter().any(|m| m.id == user_message.id);
                    if !last_present {
                        let _ = self.context.add_message(user_message.clone()).await;
                    }
                    continue;
                }

                if response.stop_reason.is_none() {
                    if cancellation.is_cancelled() {
                        break 'stream Some(response);
                    }
                    if stream_retries < self.config.max_stream_retries {
                        stream_retries += 1;
                        continue;
                    }
                }

                break 'stream Some(response);
            };

            if let Some(error) = stream_error {
                events(AgentEvent::Notice(format!("provider error: {error}")));
                stop_reason = StopReason::Error;
                break;
            }
            let response = response.expect("checked for stream_error above");

            if cancellation.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break;
            }

            total_input_tokens += response.usage.input_tokens;
            total_output_tokens += response.usage.output_tokens;

            let text: String = response
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("");
            if !text.is_empty() {
                if !final_text.is_empty() {
                    final_text.push_str("\n\n");
                }
                final_text.push_str(&text);
            }

            let mut call_ids: HashMap<String, Uuid> = HashMap::new();
            let mut tool_calls: Vec<ToolCallRecord> = Vec::new();
            for block in &response.content {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    let internal_id = Uuid::new_v4();
                    call_ids.insert(id.clone(), internal_id);
                    tool_calls.push(ToolCallRecord {
                        id: internal_id,
                        name: name.clone(),
                        arguments: input.clone(),
                        status: ToolCallStatus::Pending,
                        result: None,
                        error: None,
                    });
                }
            }

            let assistant_tokens = estimator.estimate(&text);
            let mut assistant_message = CtxMessage::new(context::Role::Assistant, text.clone(), assistant_tokens);
            assistant_message.tool_calls = tool_calls.clone();
            self.context.add_message(assistant_message).await?;

            turns_used += 1;

            if tool_calls.is_empty() {
                stop_reason = StopReason::Finished;
                break;
            }

            let offered = self.tools.schemas();
            let ctx_exec = ToolExecutionContext {
                working_directory: std::env::current_dir().unwrap_or_default(),
                read_only_mode: false,
            };

            for block in &response.content {
                let ContentBlock::ToolUse { id: wire_id, name, input } = block else { continue };
                let internal_id = *call_ids.get(wire_id).expect("recorded above");

                let signature = tool_call_signature(name, input);
                recent_signatures.push(signature.clone());
                if recent_signatures.len() > 50 {
                    recent_signatures.remove(0);
                }
                let threshold = self.config.loop_detection_threshold;
                if recent_signatures.len() >= threshold
                    && recent_signatures[recent_signatures.len() - threshold..]
                        .iter()
                        .all(|s| s == &signature)
                {
                    stop_reason = StopReason::LoopDetected;
                    break 'turns;
                }

                events(AgentEvent::ToolStarted { name: name.clone(), input: input.clone() });

                let invocation = match self.tools.create_invocation(name, &offered, input.clone(), ctx_exec.clone()) {
                    Ok(inv) => inv,
                    Err(CoreError::ToolNotFound(name)) => {
                        let message = format!("Error: Tool {name} not found or denied");
                        let mut tool_message = CtxMessage::new(context::Role::Tool, message.clone(), estimator.estimate(&message));
                        tool_message.tool_call_id = Some(internal_id);
                        self.context.add_message(tool_message).await?;
                        events(AgentEvent::ToolCompleted { name: name.clone(), success: false, summary: message });
                        stop_reason = StopReason::Error;
                        break 'turns;
                    }
                    Err(e) => {
                        let message = format!("Error: {e}");
                        let mut tool_message = CtxMessage::new(context::Role::Tool, message.clone(), estimator.estimate(&message));
                        tool_message.tool_call_id = Some(internal_id);
                        self.context.add_message(tool_message).await?;
                        events(AgentEvent::ToolCompleted { name: name.clone(), success: false, summary: message });
                        stop_reason = StopReason::Error;
                        break 'turns;
                    }
                };

                if let Ok(Some(details)) = invocation.should_confirm_execute(self.approval_policy) {
                    let approved = approval.map(|cb| cb(&details)).unwrap_or(false);
                    if !approved {
                        let message = "Error: tool execution denied".to_string();
                        let mut tool_message = CtxMessage::new(context::Role::Tool, message.clone(), estimator.estimate(&message));
                        tool_message.tool_call_id = Some(internal_id);
                        self.context.add_message(tool_message).await?;
                        events(AgentEvent::ToolCompleted { name: name.clone(), success: false, summary: message });
                        continue;
                    }
                }

                let result = invocation.execute(&cancellation).await;
                let success = result.error.is_none();
                let content = if success {
                    result.llm_content
                } else {
                    format!("Error: {}", result.llm_content)
                };
                let summary: String = content.chars().take(2000).collect();
                events(AgentEvent::ToolCompleted { name: name.clone(), success, summary });

                let token_count = estimator.estimate(&content);
                let mut tool_message = CtxMessage::new(context::Role::Tool, content, token_count);
                tool_message.tool_call_id = Some(internal_id);
                self.context.add_message(tool_message).await?;
            }
        }

        self.context.clear_inflight_tokens();

        Ok(TurnOutcome {
            content: final_text,
            turns_used,
            stop_reason,
            input_tokens: total_input_tokens,
            output_tokens: total_output_tokens,
        })
    }

    pub async fn checkpoint_count(&self) -> usize {
        self.context.get_context().await.checkpoints().len()
    }

    pub fn last_checkpoint(checkpoints: &[Checkpoint]) -> Option<&Checkpoint> {
        checkpoints.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Thresholds;
    use crate::provider::{MockProvider, ScriptedTurn};
    use crate::tools::edit::EditTool;

    fn loop_with_script(script: Vec<ScriptedTurn>) -> Arc<AgentLoop> {
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new("mock", script));
        let system = CtxMessage::new(context::Role::System, "you are an agent", 10);
        let manager = Arc::new(ContextManager::new(
            system,
            1_000_000,
            100_000,
            provider.clone(),
            "mock-model",
            Thresholds::default(),
        ));
        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(EditTool));
        AgentLoop::new(manager, provider, "mock-model", tools, AgentLoopConfig::default(), ApprovalPolicy::Allow)
    }

    #[tokio::test]
    async fn text_only_turn_finishes_without_tool_dispatch() {
        let agent_loop = loop_with_script(vec![ScriptedTurn::Text("hello there".to_string())]);
        let outcome = agent_loop
            .run_turn("hi".to_string(), CancellationToken::new(), &|_| {}, None)
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Finished);
        assert_eq!(outcome.turns_used, 1);
        assert!(outcome.content.contains("hello there"));
    }

    #[tokio::test]
    async fn cancellation_before_start_stops_immediately() {
        let agent_loop = loop_with_script(vec![ScriptedTurn::Text("hello".to_string())]);
        let token = CancellationToken::new();
        token.cancel();
        let outcome = agent_loop
            .run_turn("hi".to_string(), token, &|_| {}, None)
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    }

    #[tokio::test]
    async fn hallucinated_tool_call_stops_with_error_and_prefixed_message() {
        let agent_loop = loop_with_script(vec![ScriptedTurn::ToolCall {
            id: "c1".to_string(),
            name: "ghost_tool".to_string(),
            input: serde_json::json!({}),
        }]);
        let outcome = agent_loop
            .run_turn("hi".to_string(), CancellationToken::new(), &|_| {}, None)
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Error);

        let context = agent_loop.context.get_context().await;
        let tool_message = context
            .recent()
            .iter()
            .find(|m| m.role == context::Role::Tool)
            .expect("tool message recorded");
        assert_eq!(tool_message.content, "Error: Tool ghost_tool not found or denied");
    }

    #[tokio::test]
    async fn provider_stream_error_stops_with_error_reason() {
        let agent_loop = loop_with_script(vec![ScriptedTurn::Error("down".to_string())]);
        let outcome = agent_loop
            .run_turn("hi".to_string(), CancellationToken::new(), &|_| {}, None)
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Error);
    }
}
