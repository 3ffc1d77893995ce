//! Provider Factory
//!
//! Builds a [`Provider`] from configuration. Priority: an enabled custom
//! (local) endpoint first, then the hosted OpenAI-compatible endpoint.

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;

use super::openai_compatible::OpenAICompatibleProvider;
use super::r#trait::Provider;

pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    if let Some((name, cfg)) = config.providers.active_custom() {
        let base_url = cfg
            .base_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("custom provider '{name}' has no base_url"))?;
        tracing::info!(provider = name, %base_url, "using enabled custom provider");
        let model = cfg.default_model.clone().unwrap_or_else(|| "local-model".to_string());
        let mut provider = OpenAICompatibleProvider::new(name, base_url, model);
        if let Some(ref key) = cfg.api_key {
            provider = provider.with_api_key(key.clone());
        }
        return Ok(Arc::new(provider));
    }

    if let Some(cfg) = config.providers.openai.as_ref().filter(|c| c.enabled) {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("openai provider enabled but no api_key configured"))?;
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
        let model = cfg.default_model.clone().unwrap_or_else(|| "gpt-4-turbo-preview".to_string());
        tracing::info!("using enabled provider: openai");
        return Ok(Arc::new(
            OpenAICompatibleProvider::new("openai", base_url, model).with_api_key(api_key),
        ));
    }

    Err(anyhow::anyhow!(
        "no provider enabled; configure [providers.openai] or [providers.custom.<name>]"
    ))
}
