use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("invalid API key")]
    InvalidApiKey,

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("API error (status {status}): {message}")]
    ApiError {
        status: u16,
        message: String,
        error_type: Option<String>,
    },

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("request error: {0}")]
    RequestError(String),

    #[error("model '{0}' is not supported by this provider")]
    UnsupportedModel(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::RequestError(err.to_string())
    }
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimitExceeded(_)
                | ProviderError::StreamError(_)
                | ProviderError::RequestError(_)
        )
    }
}
