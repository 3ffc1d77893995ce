//! Provider adapters: the streaming-event contract the Agent Loop depends
//! on, plus the one concrete adapter the crate ships.

pub mod error;
pub mod factory;
pub mod mock;
pub mod openai_compatible;
pub mod retry;
#[allow(clippy::module_inception)]
mod r#trait;
pub mod types;

pub use error::{ProviderError, Result};
pub use factory::create_provider;
pub use mock::{MockProvider, ScriptedTurn};
pub use openai_compatible::OpenAICompatibleProvider;
pub use r#trait::{Provider, ProviderStream};
pub use types::*;
