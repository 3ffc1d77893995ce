//! Generic OpenAI-compatible streaming provider.
//!
//! Speaks the `/chat/completions` protocol implemented by OpenAI itself and
//! by most local LLM runtimes (Ollama's OpenAI-compatible endpoint, LM
//! Studio, vLLM, llama.cpp's server). This is the one concrete adapter the
//! crate ships; anything else implements [`Provider`] the same way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::{ProviderError, Result};
use super::r#trait::{Provider, ProviderStream};
use super::types::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct OpenAICompatibleProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
    default_model: String,
    name: String,
}

impl OpenAICompatibleProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: None,
            base_url: base_url.into(),
            client,
            default_model: default_model.into(),
            name: name.into(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(ref key) = self.api_key {
            let value: reqwest::header::HeaderValue = format!("Bearer {}", key.trim())
                .parse()
                .map_err(|_| ProviderError::InvalidApiKey)?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().expect("valid content-type"),
        );
        Ok(headers)
    }

    fn to_wire_request(&self, request: LLMRequest) -> WireRequest {
        let mut messages = Vec::new();

        if let Some(system) = request.system {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: Some(system),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in request.messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };

            let mut text_parts = Vec::new();
            let mut tool_uses = Vec::new();
            let mut tool_results = Vec::new();

            for block in msg.content {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text),
                    ContentBlock::ToolUse { id, name, input } => tool_uses.push((id, name, input)),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => tool_results.push((tool_use_id, content)),
                    ContentBlock::Image { .. } => {
                        tracing::warn!("image content blocks not supported by this adapter");
                    }
                }
            }

            if !tool_uses.is_empty() {
                let wire_tool_calls = tool_uses
                    .into_iter()
                    .map(|(id, name, input)| WireToolCall {
                        id,
                        r#type: "function".to_string(),
                        function: WireFunctionCall {
                            name,
                            arguments: serde_json::to_string(&input).unwrap_or_default(),
                        },
                    })
                    .collect();
                let content_str = (!text_parts.is_empty()).then(|| text_parts.join("\n"));
                messages.push(WireMessage {
                    role: role.to_string(),
                    content: content_str,
                    tool_calls: Some(wire_tool_calls),
                    tool_call_id: None,
                });
            } else if !tool_results.is_empty() {
                for (tool_use_id, content) in tool_results {
                    messages.push(WireMessage {
                        role: "tool".to_string(),
                        content: Some(content),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id),
                    });
                }
            } else {
                messages.push(WireMessage {
                    role: role.to_string(),
                    content: Some(text_parts.join("\n")),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
        }

        let tools = request.tools.map(|tools| {
            tools
                .iter()
                .map(|tool| WireTool {
                    r#type: "function".to_string(),
                    function: WireFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema.clone(),
                    },
                })
                .collect()
        });

        WireRequest {
            model: request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(request.stream),
            stream_options: None,
            tools,
        }
    }

    async fn handle_error(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        if let Ok(body) = response.json::<WireErrorResponse>().await {
            let message = if status == 429 {
                match retry_after {
                    Some(secs) => format!("{} (retry after {secs} seconds)", body.error.message),
                    None => format!("{} (rate limited)", body.error.message),
                }
            } else {
                body.error.message
            };
            return if status == 429 {
                ProviderError::RateLimitExceeded(message)
            } else {
                ProviderError::ApiError {
                    status,
                    message,
                    error_type: body.error.error_type,
                }
            };
        }

        if status == 429 {
            ProviderError::RateLimitExceeded("rate limit exceeded".to_string())
        } else {
            ProviderError::ApiError {
                status,
                message: "unknown error".to_string(),
                error_type: None,
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAICompatibleProvider {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse> {
        use super::retry::{retry_with_backoff, RetryConfig};

        let request_model = request.model.clone();
        let wire_request = self.to_wire_request(request);
        let config = RetryConfig::default();

        retry_with_backoff(
            || async {
                let response = self
                    .client
                    .post(&self.base_url)
                    .headers(self.headers()?)
                    .json(&wire_request)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(self.handle_error(response).await);
                }

                let wire_response: WireResponse = response.json().await.map_err(ProviderError::from)?;
                Ok(from_wire_response(wire_response, &request_model))
            },
            &config,
        )
        .await
    }

    async fn stream(&self, request: LLMRequest) -> Result<ProviderStream> {
        use super::retry::{retry_with_backoff, RetryConfig};

        let mut wire_request = self.to_wire_request(request);
        wire_request.stream = Some(true);
        wire_request.stream_options = Some(WireStreamOptions { include_usage: true });

        let config = RetryConfig::default();
        let response = retry_with_backoff(
            || async {
                let response = self
                    .client
                    .post(&self.base_url)
                    .headers(self.headers()?)
                    .json(&wire_request)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(self.handle_error(response).await);
                }
                Ok(response)
            },
            &config,
        )
        .await?;

        let byte_stream = response.bytes_stream();
        let buffer = Arc::new(Mutex::new(String::new()));

        #[derive(Default)]
        struct ToolCallAccum {
            id: String,
            name: String,
            arguments: String,
        }

        struct StreamState {
            emitted_message_start: bool,
            emitted_content_start: bool,
            tool_calls: HashMap<usize, ToolCallAccum>,
        }

        let state = Arc::new(Mutex::new(StreamState {
            emitted_message_start: false,
            emitted_content_start: false,
            tool_calls: HashMap::new(),
        }));

        let event_stream = byte_stream
            .map(move |chunk_result| -> Vec<std::result::Result<StreamEvent, ProviderError>> {
                match chunk_result {
                    Err(e) => vec![Err(ProviderError::StreamError(e.to_string()))],
                    Ok(chunk) => {
                        let mut buf = buffer.lock().expect("SSE buffer lock poisoned");
                        buf.push_str(&String::from_utf8_lossy(&chunk));

                        let mut events = Vec::new();
                        let mut st = state.lock().expect("SSE state lock poisoned");

                        while let Some(pos) = buf.find('\n') {
                            let line = buf[..pos].trim().to_string();
                            buf.drain(..=pos);

                            let Some(json_str) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            if json_str == "[DONE]" {
                                for (idx, accum) in st.tool_calls.drain() {
                                    let input = serde_json::from_str(&accum.arguments)
                                        .unwrap_or_else(|_| serde_json::json!({}));
                                    events.push(Ok(StreamEvent::ContentBlockStart {
                                        index: idx,
                                        content_block: ContentBlock::ToolUse {
                                            id: accum.id,
                                            name: accum.name,
                                            input,
                                        },
                                    }));
                                }
                                events.push(Ok(StreamEvent::MessageStop));
                                continue;
                            }

                            match serde_json::from_str::<WireStreamChunk>(json_str) {
                                Ok(chunk) => {
                                    if !st.emitted_message_start && !chunk.id.is_empty() {
                                        st.emitted_message_start = true;
                                        events.push(Ok(StreamEvent::MessageStart {
                                            message: StreamMessage {
                                                id: chunk.id.clone(),
                                                model: chunk.model.clone().unwrap_or_default(),
                                                role: Role::Assistant,
                                                usage: TokenUsage::default(),
                                            },
                                        }));
                                    }

                                    let delta = chunk.choices.first().and_then(|c| c.delta.as_ref());
                                    let content = delta.and_then(|d| d.content.clone());
                                    let finish_reason = chunk
                                        .choices
                                        .first()
                                        .and_then(|c| c.finish_reason.clone());

                                    if let Some(tc_list) = delta.and_then(|d| d.tool_calls.as_ref()) {
                                        for item in tc_list {
                                            let accum = st.tool_calls.entry(item.index).or_default();
                                            if let Some(ref id) = item.id
                                                && !id.is_empty()
                                            {
                                                accum.id = id.clone();
                                            }
                                            if let Some(ref func) = item.function {
                                                if let Some(ref name) = func.name
                                                    && !name.is_empty()
                                                {
                                                    accum.name = name.clone();
                                                }
                                                if let Some(ref args) = func.arguments {
                                                    accum.arguments.push_str(args);
                                                }
                                            }
                                        }
                                    }

                                    if let Some(ref reason) = finish_reason
                                        && (reason == "tool_calls" || reason == "function_call")
                                    {
                                        for (idx, accum) in st.tool_calls.drain() {
                                            let input = serde_json::from_str(&accum.arguments)
                                                .unwrap_or_else(|_| serde_json::json!({}));
                                            events.push(Ok(StreamEvent::ContentBlockStart {
                                                index: idx,
                                                content_block: ContentBlock::ToolUse {
                                                    id: accum.id,
                                                    name: accum.name,
                                                    input,
                                                },
                                            }));
                                        }
                                    }

                                    if let Some(ref c) = content {
                                        if !st.emitted_content_start {
                                            st.emitted_content_start = true;
                                            events.push(Ok(StreamEvent::ContentBlockStart {
                                                index: 0,
                                                content_block: ContentBlock::Text { text: String::new() },
                                            }));
                                        }
                                        if !c.is_empty() {
                                            events.push(Ok(StreamEvent::ContentBlockDelta {
                                                index: 0,
                                                delta: ContentDelta::TextDelta { text: c.clone() },
                                            }));
                                        }
                                    }

                                    if let Some(ref usage) = chunk.usage
                                        && finish_reason.is_some()
                                    {
                                        let stop_reason = finish_reason.map(|s| match s.as_str() {
                                            "stop" => StopReason::EndTurn,
                                            "length" => StopReason::MaxTokens,
                                            "tool_calls" | "function_call" => StopReason::ToolUse,
                                            _ => StopReason::EndTurn,
                                        });
                                        events.push(Ok(StreamEvent::MessageDelta {
                                            delta: MessageDelta {
                                                stop_reason,
                                                stop_sequence: None,
                                            },
                                            usage: TokenUsage {
                                                input_tokens: usage.prompt_tokens.unwrap_or(0),
                                                output_tokens: usage.completion_tokens.unwrap_or(0),
                                            },
                                        }));
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!("failed to parse stream chunk: {e}");
                                }
                            }
                        }

                        if events.is_empty() {
                            vec![Ok(StreamEvent::Ping)]
                        } else {
                            events
                        }
                    }
                }
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
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
        &self.default_model
    }

    fn supported_models(&self) -> Vec<String> {
        vec![self.default_model.clone()]
    }

    fn context_window(&self, _model: &str) -> Option<u32> {
        None
    }

    fn calculate_cost(&self, _model: &str, _input_tokens: u32, _output_tokens: u32) -> f64 {
        0.0
    }
}

fn from_wire_response(response: WireResponse, request_model: &str) -> LLMResponse {
    let choice = response.choices.into_iter().next().unwrap_or(WireChoice {
        index: 0,
        message: WireMessage {
            role: "assistant".to_string(),
            content: Some(String::new()),
            tool_calls: None,
            tool_call_id: None,
        },
        finish_reason: Some("error".to_string()),
    });

    let mut content_blocks = Vec::new();
    if let Some(content) = choice.message.content
        && !content.is_empty()
    {
        content_blocks.push(ContentBlock::Text { text: content });
    }
    if let Some(tool_calls) = choice.message.tool_calls {
        for tc in tool_calls {
            let input = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));
            content_blocks.push(ContentBlock::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            });
        }
    }

    let stop_reason = choice.finish_reason.and_then(|r| match r.as_str() {
        "stop" => Some(StopReason::EndTurn),
        "length" => Some(StopReason::MaxTokens),
        "tool_calls" | "function_call" => Some(StopReason::ToolUse),
        _ => None,
    });

    LLMResponse {
        id: response.id,
        model: if response.model.is_empty() {
            request_model.to_string()
        } else {
            response.model
        },
        content: content_blocks,
        stop_reason,
        usage: TokenUsage {
            input_tokens: response.usage.prompt_tokens.unwrap_or(0),
            output_tokens: response.usage.completion_tokens.unwrap_or(0),
        },
    }
}

#[derive(Debug, Clone, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<WireStreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Clone, Serialize)]
struct WireStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponse {
    id: String,
    model: String,
    choices: Vec<WireChoice>,
    usage: WireUsage,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChoice {
    #[allow(dead_code)]
    index: u32,
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireStreamChunk {
    id: String,
    model: Option<String>,
    choices: Vec<WireStreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireStreamChoice {
    delta: Option<WireMessageDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamingToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamingFunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamingFunctionCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireMessageDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamingToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireErrorResponse {
    error: WireError,
}

#[derive(Debug, Clone, Deserialize)]
struct WireError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_provider_has_expected_defaults() {
        let provider = OpenAICompatibleProvider::new("local", "http://localhost:11434/v1/chat/completions", "llama3");
        assert_eq!(provider.name(), "local");
        assert_eq!(provider.default_model(), "llama3");
        assert!(provider.supports_streaming());
        assert!(provider.supports_tools());
        assert!(!provider.supports_vision());
    }

    #[test]
    fn with_api_key_sets_bearer_header() {
        let provider = OpenAICompatibleProvider::new("openai", "https://api.openai.com/v1/chat/completions", "gpt-4")
            .with_api_key("sk-test");
        let headers = provider.headers().unwrap();
        assert_eq!(headers.get(reqwest::header::AUTHORIZATION).unwrap(), "Bearer sk-test");
    }
}
