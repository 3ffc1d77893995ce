//! Summarization Service — one operation: fold a run of messages into a
//! single summary string via a single streaming call to the provider.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::context::Message;
use crate::provider::{ContentBlock, ContentDelta, LLMRequest, Provider, Role, StreamEvent};

pub mod prompt;

pub use prompt::{Goal, Mode, SubtaskStatus};

const SUMMARIZATION_TIMEOUT: Duration = Duration::from_secs(30);
const SUMMARIZATION_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct SummarizationRequest<'a> {
    pub messages: &'a [Message],
    pub level: u8,
    pub mode: Mode,
    pub goal: Option<&'a Goal>,
    pub model: String,
    pub max_summary_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct SummarizationResult {
    pub summary: String,
    pub token_count: usize,
    pub level: u8,
    pub model: String,
    pub success: bool,
    pub error: Option<String>,
}

impl SummarizationResult {
    fn failure(level: u8, model: String, error: impl Into<String>) -> Self {
        Self {
            summary: String::new(),
            token_count: 0,
            level,
            model,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// `summarize(messages, level, goal?) → { summary, tokenCount, level, model, success, error? }`.
pub async fn summarize(
    provider: Arc<dyn Provider>,
    request: SummarizationRequest<'_>,
) -> SummarizationResult {
    let original_len: usize = request.messages.iter().map(|m| m.content.len()).sum();
    let prompt = prompt::build_prompt(request.messages, request.level, request.mode, request.goal);

    let llm_request = LLMRequest {
        model: request.model.clone(),
        system: Some(prompt),
        messages: vec![crate::provider::Message {
            role: Role::User,
            content: vec![ContentBlock::Text {
                text: "Produce the summary now, following the instructions exactly.".to_string(),
            }],
        }],
        tools: None,
        temperature: Some(SUMMARIZATION_TEMPERATURE),
        max_tokens: Some(request.max_summary_tokens as u32),
        stream: true,
    };

    let stream = match provider.stream(llm_request).await {
        Ok(stream) => stream,
        Err(err) => return SummarizationResult::failure(request.level, request.model, err.to_string()),
    };

    let accumulated = match tokio::time::timeout(SUMMARIZATION_TIMEOUT, accumulate_text(stream)).await {
        Ok(Ok(text)) => text,
        Ok(Err(err)) => return SummarizationResult::failure(request.level, request.model, err),
        Err(_) => {
            return SummarizationResult::failure(
                request.level,
                request.model,
                format!("summarization timed out after {}s", SUMMARIZATION_TIMEOUT.as_secs()),
            );
        }
    };

    if accumulated.is_empty() {
        return SummarizationResult::failure(request.level, request.model, "empty summary produced");
    }

    let estimated_tokens = accumulated.chars().count().div_ceil(4);
    if let Err(reason) = validate_summary(&accumulated, estimated_tokens, original_len, request.max_summary_tokens) {
        return SummarizationResult::failure(
            request.level,
            request.model,
            format!("Summary validation failed: {reason}"),
        );
    }

    SummarizationResult {
        summary: accumulated,
        token_count: estimated_tokens,
        level: request.level,
        model: request.model,
        success: true,
        error: None,
    }
}

async fn accumulate_text(mut stream: crate::provider::ProviderStream) -> Result<String, String> {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event.map_err(|e| e.to_string())? {
            StreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { text: delta },
                ..
            } => text.push_str(&delta),
            StreamEvent::Error { error } => return Err(error),
            StreamEvent::MessageStop => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Non-empty; length within `[20, 1.5x original]` (`[15, 2x]` when the
/// original is very short); estimated tokens within `1.2x maxSummaryTokens`.
fn validate_summary(
    summary: &str,
    estimated_tokens: usize,
    original_len: usize,
    max_summary_tokens: usize,
) -> Result<(), String> {
    let len = summary.chars().count();
    let is_tiny_original = original_len < 100;
    let min_len = if is_tiny_original { 15 } else { 20 };
    if len < min_len {
        return Err(format!("summary too short ({len} chars, minimum {min_len})"));
    }

    let ratio_cap = if is_tiny_original { 2.0 } else { 1.5 };
    let max_len = (original_len as f64 * ratio_cap).ceil() as usize;
    if original_len > 0 && len > max_len {
        return Err(format!("summary too long ({len} chars, maximum {max_len})"));
    }

    let token_cap = (max_summary_tokens as f64 * 1.2).ceil() as usize;
    if estimated_tokens > token_cap {
        return Err(format!(
            "summary has too many tokens ({estimated_tokens}, maximum {token_cap})"
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role as ContextRole;
    use crate::provider::{MockProvider, ScriptedTurn};

    fn message(content: &str) -> Message {
        Message::new(ContextRole::Assistant, content, content.len() / 4)
    }

    #[tokio::test]
    async fn successful_summary_is_marked_success() {
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new(
            "mock",
            vec![ScriptedTurn::Text(
                "The user asked about the database schema and the assistant explained the \
                 migration steps required to add the new index."
                    .to_string(),
            )],
        ));
        let messages = vec![message(&"x".repeat(200)), message(&"y".repeat(200))];
        let result = summarize(
            provider,
            SummarizationRequest {
                messages: &messages,
                level: 2,
                mode: Mode::Developer,
                goal: None,
                model: "mock-model".to_string(),
                max_summary_tokens: 300,
            },
        )
        .await;
        assert!(result.success, "expected success, got error: {:?}", result.error);
        assert!(!result.summary.is_empty());
    }

    #[tokio::test]
    async fn empty_stream_fails() {
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new("mock", vec![ScriptedTurn::Text(String::new())]));
        let messages = vec![message("hello")];
        let result = summarize(
            provider,
            SummarizationRequest {
                messages: &messages,
                level: 3,
                mode: Mode::Assistant,
                goal: None,
                model: "mock-model".to_string(),
                max_summary_tokens: 500,
            },
        )
        .await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn provider_error_event_fails_without_state_mutation() {
        let provider: Arc<dyn Provider> =
            Arc::new(MockProvider::new("mock", vec![ScriptedTurn::Error("boom".to_string())]));
        let messages = vec![message("hello")];
        let result = summarize(
            provider,
            SummarizationRequest {
                messages: &messages,
                level: 1,
                mode: Mode::Debugger,
                goal: None,
                model: "mock-model".to_string(),
                max_summary_tokens: 200,
            },
        )
        .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn validate_summary_rejects_too_short() {
        assert!(validate_summary("too short", 3, 1000, 500).is_err());
    }

    #[test]
    fn validate_summary_rejects_too_long() {
        let summary = "x".repeat(2000);
        assert!(validate_summary(&summary, 500, 1000, 500).is_err());
    }

    #[test]
    fn validate_summary_accepts_reasonable_summary() {
        let summary = "x".repeat(100);
        assert!(validate_summary(&summary, 25, 1000, 500).is_ok());
    }
}
