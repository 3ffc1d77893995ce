//! Configuration types, defaults, loading, and environment overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded in layers: compiled-in defaults, the
/// system config file, then environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub providers: ProviderConfigs,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            providers: ProviderConfigs::default(),
            agent: AgentConfig::default(),
        }
    }
}

/// Agent Loop and Context Manager behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool approval policy: "ask", "auto-session", "auto-always".
    #[serde(default = "default_approval_policy")]
    pub approval_policy: String,

    /// Hard turn cap per user message (§4.8).
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// `ollamaLimit` before `safetyMargin` is subtracted (§4.2).
    #[serde(default = "default_context_limit")]
    pub context_limit: u32,

    /// Tokens subtracted from `context_limit` to get `effectiveLimit`.
    #[serde(default = "default_safety_margin")]
    pub safety_margin: u32,

    /// Max output tokens requested per provider call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Usage fraction at which `context-warning-low` fires (§4.6).
    #[serde(default = "default_warn_low")]
    pub warn_low: f64,

    /// Usage fraction at which compression is triggered (§4.6).
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f64,

    /// Idle timeout for a single provider stream, in seconds (§5).
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

fn default_approval_policy() -> String {
    "ask".to_string()
}
fn default_max_turns() -> u32 {
    10
}
fn default_context_limit() -> u32 {
    200_000
}
fn default_safety_margin() -> u32 {
    4_096
}
fn default_max_tokens() -> u32 {
    65_536
}
fn default_warn_low() -> f64 {
    0.70
}
fn default_compression_threshold() -> f64 {
    0.85
}
fn default_stream_idle_timeout_secs() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            approval_policy: default_approval_policy(),
            max_turns: default_max_turns(),
            context_limit: default_context_limit(),
            safety_margin: default_safety_margin(),
            max_tokens: default_max_tokens(),
            warn_low: default_warn_low(),
            compression_threshold: default_compression_threshold(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

/// A single provider endpoint: either a hosted vendor (api_key) or a local
/// runtime (base_url, no key needed).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default)]
    pub models: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// Named provider endpoints. `custom` holds arbitrary
/// `[providers.custom.<name>]` entries for local runtimes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfigs {
    #[serde(default)]
    pub openai: Option<ProviderConfig>,
    #[serde(default)]
    pub custom: BTreeMap<String, ProviderConfig>,
}

impl ProviderConfigs {
    pub fn active_custom(&self) -> Option<(&str, &ProviderConfig)> {
        self.custom
            .iter()
            .find(|(_, cfg)| cfg.enabled)
            .map(|(name, cfg)| (name.as_str(), cfg))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    agentcore_home().join("agentcore.db")
}

fn expand_tilde(p: &Path) -> PathBuf {
    if let Ok(rest) = p.strip_prefix("~") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest)
    } else {
        p.to_path_buf()
    }
}

/// Canonical base directory: `~/.agentcore/`. Config, database, and the
/// dated memory log all live here.
pub fn agentcore_home() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let p = home.join(".agentcore");
    if !p.exists() {
        let _ = std::fs::create_dir_all(&p);
    }
    p
}

pub fn keys_path() -> PathBuf {
    agentcore_home().join("keys.toml")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// JSON-formatted log lines instead of the human-readable default.
    #[serde(default)]
    pub json_output: bool,
    /// Directory for rotated, non-blocking file output. `None` logs to stderr only.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_output: false,
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KeysFile {
    #[serde(default)]
    providers: ProviderConfigs,
}

fn load_keys_from_file() -> Result<KeysFile> {
    let path = keys_path();
    if !path.exists() {
        return Ok(KeysFile::default());
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read keys file: {path:?}"))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse keys file: {path:?}"))
}

fn merge_provider_keys(mut base: ProviderConfigs, overlay: ProviderConfigs) -> ProviderConfigs {
    if let Some(openai) = overlay.openai {
        base.openai = Some(openai);
    }
    for (name, cfg) in overlay.custom {
        base.custom.insert(name, cfg);
    }
    base
}

impl Config {
    /// Load from defaults, then `~/.agentcore/config.toml`, then
    /// `./agentcore.toml`, then `~/.agentcore/keys.toml`, then environment
    /// variables.
    pub fn load() -> Result<Self> {
        tracing::debug!("loading configuration");

        let mut config = Self::default();

        let system_path = Self::system_config_path();
        if system_path.exists() {
            tracing::debug!(?system_path, "loading system config");
            config = Self::merge_from_file(config, &system_path)?;
        }

        let local_path = Self::local_config_path();
        if local_path.exists() {
            tracing::debug!(?local_path, "loading local config");
            config = Self::merge_from_file(config, &local_path)?;
        }

        if let Ok(keys) = load_keys_from_file() {
            config.providers = merge_provider_keys(config.providers, keys.providers);
        }

        config = Self::apply_env_overrides(config)?;
        config.database.path = expand_tilde(&config.database.path);

        Ok(config)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();

        if !path.exists() {
            anyhow::bail!("config file not found: {path:?}");
        }
        config = Self::merge_from_file(config, path)?;
        config = Self::apply_env_overrides(config)?;
        config.database.path = expand_tilde(&config.database.path);

        Ok(config)
    }

    pub fn system_config_path() -> PathBuf {
        agentcore_home().join("config.toml")
    }

    fn local_config_path() -> PathBuf {
        PathBuf::from("./agentcore.toml")
    }

    fn merge_from_file(_base: Self, path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path:?}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config file: {path:?}"))
    }

    fn apply_env_overrides(mut config: Self) -> Result<Self> {
        if let Ok(db_path) = std::env::var("AGENTCORE_DB_PATH") {
            config.database.path = PathBuf::from(db_path);
        }
        if let Ok(log_level) = std::env::var("AGENTCORE_LOG_LEVEL") {
            config.logging.level = log_level;
        }
        if let Ok(log_dir) = std::env::var("AGENTCORE_LOG_DIR") {
            config.logging.directory = Some(PathBuf::from(log_dir));
        }
        if let Ok(json) = std::env::var("AGENTCORE_LOG_JSON") {
            config.logging.json_output = json == "1" || json.eq_ignore_ascii_case("true");
        }
        if let Ok(max_turns) = std::env::var("AGENTCORE_MAX_TURNS")
            && let Ok(n) = max_turns.parse()
        {
            config.agent.max_turns = n;
        }
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            config
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default)
                .api_key = Some(api_key);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_thresholds() {
        let config = Config::default();
        assert_eq!(config.agent.max_turns, 10);
        assert!(config.agent.warn_low < config.agent.compression_threshold);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn load_from_path_rejects_missing_file() {
        let err = Config::load_from_path("/nonexistent/agentcore.toml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn load_from_path_parses_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentcore.toml");
        fs::write(
            &path,
            r#"
            [agent]
            max_turns = 20
            "#,
        )
        .unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.agent.max_turns, 20);
    }
}
