//! Accumulates a provider stream into a single [`LLMResponse`], forwarding
//! text/thinking deltas to a callback as they arrive. Guards against a
//! stream that stalls silently with an idle timeout.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::provider::{
    ContentBlock, ContentDelta, LLMResponse, ProviderError, ProviderStream, StopReason,
    StreamEvent, TokenUsage,
};

pub enum StreamDelta {
    Text(String),
    Thinking(String),
}

struct BlockState {
    block: ContentBlock,
    json_buf: String,
}

/// Outcome of consuming one stream. `stop_reason: None` means the stream
/// ended (idle timeout or closed) without a terminal `MessageStop` —
/// callers treat this as a dropped connection eligible for retry.
pub async fn accumulate(
    mut stream: ProviderStream,
    idle_timeout: Duration,
    cancellation: &CancellationToken,
    mut on_delta: impl FnMut(StreamDelta),
) -> Result<LLMResponse, ProviderError> {
    let mut id = String::new();
    let mut model = String::new();
    let mut stop_reason: Option<StopReason> = None;
    let mut usage = TokenUsage::default();
    let mut blocks: Vec<BlockState> = Vec::new();

    loop {
        if cancellation.is_cancelled() {
            break;
        }

        let next = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(_elapsed) => {
                tracing::warn!("stream idle timeout after {:?}, treating as dropped", idle_timeout);
                break;
            }
        };

        match next? {
            StreamEvent::MessageStart { message } => {
                id = message.id;
                model = message.model;
                usage.input_tokens = message.usage.input_tokens;
            }
            StreamEvent::ContentBlockStart { index, content_block } => {
                while blocks.len() <= index {
                    blocks.push(BlockState {
                        block: ContentBlock::Text { text: String::new() },
                        json_buf: String::new(),
                    });
                }
                blocks[index] = BlockState {
                    block: content_block,
                    json_buf: String::new(),
                };
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                if index >= blocks.len() {
                    continue;
                }
                match delta {
                    ContentDelta::TextDelta { text } => {
                        on_delta(StreamDelta::Text(text.clone()));
                        if let ContentBlock::Text { text: ref mut t } = blocks[index].block {
                            t.push_str(&text);
                        }
                    }
                    ContentDelta::InputJsonDelta { partial_json } => {
                        blocks[index].json_buf.push_str(&partial_json);
                    }
                    ContentDelta::ReasoningDelta { text } => {
                        on_delta(StreamDelta::Thinking(text));
                    }
                }
            }
            StreamEvent::ContentBlockStop { index } => {
                if let Some(state) = blocks.get_mut(index) {
                    if let ContentBlock::ToolUse { ref mut input, .. } = state.block {
                        if !state.json_buf.is_empty() {
                            if let Ok(parsed) = serde_json::from_str(&state.json_buf) {
                                *input = parsed;
                            }
                        }
                    }
                }
            }
            StreamEvent::MessageDelta { delta, usage: delta_usage } => {
                stop_reason = delta.stop_reason;
                if delta_usage.input_tokens > usage.input_tokens {
                    usage.input_tokens = delta_usage.input_tokens;
                }
                if delta_usage.output_tokens > usage.output_tokens {
                    usage.output_tokens = delta_usage.output_tokens;
                }
            }
            StreamEvent::MessageStop => break,
            StreamEvent::Ping => {}
            StreamEvent::Error { error } => return Err(ProviderError::StreamError(error)),
        }
    }

    let content: Vec<ContentBlock> = blocks
        .into_iter()
        .map(|b| b.block)
        .filter(|b| !matches!(b, ContentBlock::Text { text } if text.is_empty()))
        .collect();

    Ok(LLMResponse {
        id,
        model,
        content,
        stop_reason,
        usage,
    })
}
