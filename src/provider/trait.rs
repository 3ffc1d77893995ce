use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::{ProviderError, Result};
use super::types::{LLMRequest, LLMResponse};

pub type ProviderStream = Pin<Box<dyn Stream<Item = std::result::Result<super::types::StreamEvent, ProviderError>> + Send>>;

/// A streaming language-model backend. Only the wire contract matters here —
/// concrete adapters (HTTP clients to specific vendors or local runtimes)
/// are external collaborators; this crate depends only on this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Single-shot, non-streaming completion.
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse>;

    /// Streaming completion. Must eventually yield `MessageStop` or end the
    /// stream; a stream that neither errors nor terminates for longer than
    /// the caller's idle timeout is treated as dropped.
    async fn stream(&self, request: LLMRequest) -> Result<ProviderStream>;

    fn supports_streaming(&self) -> bool;
    fn supports_tools(&self) -> bool;
    fn supports_vision(&self) -> bool;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn supported_models(&self) -> Vec<String>;
    async fn fetch_models(&self) -> Vec<String> {
        self.supported_models()
    }
    fn context_window(&self, model: &str) -> Option<u32>;
    fn calculate_cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64;
}
