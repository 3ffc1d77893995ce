//! Utility modules for common functionality

pub mod retry;
pub mod sanitize;
mod string;

pub use retry::{RetryConfig, RetryableError, retry, retry_with_check};
pub use sanitize::redact_tool_input;
pub use string::truncate_str;
