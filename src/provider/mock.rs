//! An in-memory [`Provider`] for tests — scripted responses, no network.

use async_trait::async_trait;
use futures::stream;
use std::sync::Mutex;

use super::error::{ProviderError, Result};
use super::r#trait::{Provider, ProviderStream};
use super::types::*;

#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Text(String),
    ToolCall { id: String, name: String, input: serde_json::Value },
    Error(String),
}

/// Replays a fixed sequence of turns, one per call to `stream`/`complete`.
/// Calling past the end of the script repeats the final turn.
pub struct MockProvider {
    name: String,
    model: String,
    script: Mutex<Vec<ScriptedTurn>>,
    cursor: Mutex<usize>,
    tokens_per_turn: TokenUsage,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, script: Vec<ScriptedTurn>) -> Self {
        Self {
            name: name.into(),
            model: "mock-model".to_string(),
            script: Mutex::new(script),
            cursor: Mutex::new(0),
            tokens_per_turn: TokenUsage {
                input_tokens: 30,
                output_tokens: 30,
            },
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.tokens_per_turn = usage;
        self
    }

    fn next_turn(&self) -> ScriptedTurn {
        let script = self.script.lock().expect("script lock poisoned");
        let mut cursor = self.cursor.lock().expect("cursor lock poisoned");
        let turn = script
            .get(*cursor)
            .or_else(|| script.last())
            .cloned()
            .unwrap_or(ScriptedTurn::Text(String::new()));
        *cursor += 1;
        turn
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, _request: LLMRequest) -> Result<LLMResponse> {
        match self.next_turn() {
            ScriptedTurn::Text(text) => Ok(LLMResponse {
                id: uuid::Uuid::new_v4().to_string(),
                model: self.model.clone(),
                content: vec![ContentBlock::Text { text }],
                stop_reason: Some(StopReason::EndTurn),
                usage: self.tokens_per_turn,
            }),
            ScriptedTurn::ToolCall { id, name, input } => Ok(LLMResponse {
                id: uuid::Uuid::new_v4().to_string(),
                model: self.model.clone(),
                content: vec![ContentBlock::ToolUse { id, name, input }],
                stop_reason: Some(StopReason::ToolUse),
                usage: self.tokens_per_turn,
            }),
            ScriptedTurn::Error(message) => Err(ProviderError::StreamError(message)),
        }
    }

    async fn stream(&self, _request: LLMRequest) -> Result<ProviderStream> {
        let turn = self.next_turn();
        let usage = self.tokens_per_turn;
        let model = self.model.clone();

        let events: Vec<std::result::Result<StreamEvent, ProviderError>> = match turn {
            ScriptedTurn::Text(text) => vec![
                Ok(StreamEvent::MessageStart {
                    message: StreamMessage {
                        id: uuid::Uuid::new_v4().to_string(),
                        model,
                        role: Role::Assistant,
                        usage: TokenUsage::default(),
                    },
                }),
                Ok(StreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: ContentBlock::Text { text: String::new() },
                }),
                Ok(StreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: ContentDelta::TextDelta { text },
                }),
                Ok(StreamEvent::ContentBlockStop { index: 0 }),
                Ok(StreamEvent::MessageDelta {
                    delta: MessageDelta {
                        stop_reason: Some(StopReason::EndTurn),
                        stop_sequence: None,
                    },
                    usage,
                }),
                Ok(StreamEvent::MessageStop),
            ],
            ScriptedTurn::ToolCall { id, name, input } => vec![
                Ok(StreamEvent::MessageStart {
                    message: StreamMessage {
                        id: uuid::Uuid::new_v4().to_string(),
                        model,
                        role: Role::Assistant,
                        usage: TokenUsage::default(),
                    },
                }),
                Ok(StreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: ContentBlock::ToolUse { id, name, input },
                }),
                Ok(StreamEvent::ContentBlockStop { index: 0 }),
                Ok(StreamEvent::MessageDelta {
                    delta: MessageDelta {
                        stop_reason: Some(StopReason::ToolUse),
                        stop_sequence: None,
                    },
                    usage,
                }),
                Ok(StreamEvent::MessageStop),
            ],
            ScriptedTurn::Error(message) => vec![Ok(StreamEvent::Error { error: message })],
        };

        Ok(Box::pin(stream::iter(events)))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_vision(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn supported_models(&self) -> Vec<String> {
        vec![self.model.clone()]
    }

    fn context_window(&self, _model: &str) -> Option<u32> {
        Some(8192)
    }

    fn calculate_cost(&self, _model: &str, _input_tokens: u32, _output_tokens: u32) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_scripted_text_turn() {
        let provider = MockProvider::new("alpha", vec![ScriptedTurn::Text("hello".into())]);
        let response = provider
            .complete(LLMRequest {
                model: "mock".into(),
                system: None,
                messages: vec![],
                tools: None,
                temperature: None,
                max_tokens: None,
                stream: false,
            })
            .await
            .unwrap();
        assert_eq!(response.content[0].clone(), ContentBlock::Text { text: "hello".into() });
    }

    #[tokio::test]
    async fn repeats_final_turn_past_script_end() {
        let provider = MockProvider::new("alpha", vec![ScriptedTurn::Text("only".into())]);
        let request = || LLMRequest {
            model: "mock".into(),
            system: None,
            messages: vec![],
            tools: None,
            temperature: None,
            max_tokens: None,
            stream: false,
        };
        provider.complete(request()).await.unwrap();
        let second = provider.complete(request()).await.unwrap();
        assert_eq!(second.content[0].clone(), ContentBlock::Text { text: "only".into() });
    }
}
