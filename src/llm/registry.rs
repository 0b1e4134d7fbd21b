//! Provider registry for the upstream services the gateway can reach

use super::{all_providers, find_provider, LlmError, LlmService, LoggingService, OpenAiCompatibleService};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const FALLBACK_PROVIDER: &str = "deepseek";

/// Configuration for upstream providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider id -> API key
    pub api_keys: HashMap<String, String>,
    pub default_provider: Option<String>,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            default_provider: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    /// Read each provider's key from its environment variable
    pub fn from_env(timeout: Duration) -> Self {
        let api_keys = all_providers()
            .iter()
            .filter_map(|p| {
                std::env::var(p.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .map(|k| (p.id.to_string(), k))
            })
            .collect();

        Self {
            api_keys,
            default_provider: std::env::var("CHROMA_DEFAULT_PROVIDER").ok(),
            timeout,
        }
    }
}

/// Registry of upstream services keyed by provider id
pub struct ProviderRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    configured: Vec<String>,
    default_provider: String,
}

impl ProviderRegistry {
    /// Every catalogued provider gets a service; providers without a key
    /// fail at request time with a config error.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut services: HashMap<String, Arc<dyn LlmService>> = HashMap::new();
        let mut configured = Vec::new();

        for def in all_providers() {
            let key = config.api_keys.get(def.id).cloned();
            if key.is_some() {
                configured.push(def.id.to_string());
            }
            let service = OpenAiCompatibleService::new(def, key, config.timeout)?;
            services.insert(def.id.to_string(), Arc::new(LoggingService::new(Arc::new(service))));
        }

        let default_provider = config
            .default_provider
            .as_deref()
            .and_then(find_provider)
            .map(|p| p.id.to_string())
            .or_else(|| configured.first().cloned())
            .unwrap_or_else(|| FALLBACK_PROVIDER.to_string());

        tracing::info!(
            configured = ?configured,
            default_provider = %default_provider,
            "Provider registry ready"
        );

        Ok(Self {
            services,
            configured,
            default_provider,
        })
    }

    /// Registry over explicit services (embedding, tests)
    pub fn with_services(services: Vec<Arc<dyn LlmService>>) -> Self {
        let configured: Vec<String> = services.iter().map(|s| s.provider_id().to_string()).collect();
        let default_provider = configured
            .first()
            .cloned()
            .unwrap_or_else(|| FALLBACK_PROVIDER.to_string());
        Self {
            services: services
                .into_iter()
                .map(|s| (s.provider_id().to_string(), s))
                .collect(),
            configured,
            default_provider,
        }
    }

    /// Service for a provider id; empty picks the default
    pub fn get(&self, provider: &str) -> Result<Arc<dyn LlmService>, LlmError> {
        let id = if provider.trim().is_empty() {
            self.default_provider.as_str()
        } else {
            provider.trim()
        };
        self.services
            .get(id)
            .or_else(|| {
                find_provider(id).and_then(|def| self.services.get(def.id))
            })
            .cloned()
            .ok_or_else(|| LlmError::config(format!("Unknown provider: {id}")))
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn is_configured(&self, provider: &str) -> bool {
        self.configured.iter().any(|p| p.eq_ignore_ascii_case(provider))
    }

    /// Provider/model catalog as served by `GET /api/models`
    pub fn catalog(&self) -> Value {
        let providers: serde_json::Map<String, Value> = all_providers()
            .iter()
            .filter(|def| self.services.contains_key(def.id))
            .map(|def| {
                let models: Vec<Value> = def
                    .models
                    .iter()
                    .map(|m| {
                        json!({
                            "id": m.id,
                            "description": m.description,
                            "contextWindow": m.context_window,
                        })
                    })
                    .collect();
                (
                    def.id.to_string(),
                    json!({
                        "name": def.display_name,
                        "configured": self.is_configured(def.id),
                        "defaultModel": def.default_model,
                        "models": models,
                    }),
                )
            })
            .collect();

        json!({
            "defaultProvider": self.default_provider,
            "providers": providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ErrorKind;

    fn config_with(keys: &[(&str, &str)], default_provider: Option<&str>) -> LlmConfig {
        LlmConfig {
            api_keys: keys
                .iter()
                .map(|(p, k)| ((*p).to_string(), (*k).to_string()))
                .collect(),
            default_provider: default_provider.map(String::from),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_default_provider_prefers_config() {
        let registry = ProviderRegistry::new(&config_with(&[], Some("QWEN"))).unwrap();
        assert_eq!(registry.default_provider(), "qwen");
    }

    #[test]
    fn test_default_provider_falls_back_to_configured_then_deepseek() {
        let registry = ProviderRegistry::new(&config_with(&[("openrouter", "k")], None)).unwrap();
        assert_eq!(registry.default_provider(), "openrouter");

        let registry = ProviderRegistry::new(&config_with(&[], Some("unknown"))).unwrap();
        assert_eq!(registry.default_provider(), "deepseek");
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let registry = ProviderRegistry::new(&config_with(&[], None)).unwrap();
        let err = registry.get("acme").err().unwrap();
        assert_eq!(err.kind, ErrorKind::UpstreamConfigError);
        assert!(registry.get("").is_ok());
        assert!(registry.get("DeepSeek").is_ok());
    }

    #[test]
    fn test_catalog_marks_configured_providers() {
        let registry = ProviderRegistry::new(&config_with(&[("deepseek", "k")], None)).unwrap();
        let catalog = registry.catalog();
        assert_eq!(catalog["defaultProvider"], "deepseek");
        assert_eq!(catalog["providers"]["deepseek"]["configured"], true);
        assert_eq!(catalog["providers"]["qwen"]["configured"], false);
        assert_eq!(
            catalog["providers"]["qwen"]["models"][1]["contextWindow"],
            131_072
        );
    }
}
