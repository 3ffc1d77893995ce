//! Layered configuration: compiled-in defaults, a TOML file under the
//! user's config directory, then environment variable overrides.

pub mod secrets;
pub mod types;

pub use secrets::SecretString;
pub use types::{
    AgentConfig, Config, DatabaseConfig, LoggingConfig, ProviderConfig, ProviderConfigs,
    agentcore_home, keys_path,
};
