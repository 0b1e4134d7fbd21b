//! Centralized provider and model definitions
//!
//! Every provider here speaks the OpenAI-compatible chat-completions API, so
//! one service implementation covers them all.

/// Upstream provider definition
#[derive(Debug, Clone)]
pub struct ProviderDef {
    /// Provider id used on the wire (e.g. "deepseek")
    pub id: &'static str,
    pub display_name: &'static str,
    /// Chat-completions endpoint
    pub endpoint: &'static str,
    /// Environment variable holding the API key
    pub api_key_env: &'static str,
    /// Model used when a request names none
    pub default_model: &'static str,
    pub models: &'static [ModelDef],
}

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// Model id as the provider expects it
    pub id: &'static str,
    pub description: &'static str,
    /// Context window size in tokens
    pub context_window: u64,
}

/// Get all provider definitions
pub fn all_providers() -> &'static [ProviderDef] {
    &[
        ProviderDef {
            id: "deepseek",
            display_name: "DeepSeek",
            endpoint: "https://api.deepseek.com/chat/completions",
            api_key_env: "DEEPSEEK_API_KEY",
            default_model: "deepseek-chat",
            models: &[
                ModelDef {
                    id: "deepseek-chat",
                    description: "DeepSeek V3 (general chat)",
                    context_window: 64_000,
                },
                ModelDef {
                    id: "deepseek-reasoner",
                    description: "DeepSeek R1 (reasoning)",
                    context_window: 64_000,
                },
            ],
        },
        ProviderDef {
            id: "qwen",
            display_name: "Qwen (DashScope)",
            endpoint: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions",
            api_key_env: "DASHSCOPE_API_KEY",
            default_model: "qwen-plus",
            models: &[
                ModelDef {
                    id: "qwen-turbo",
                    description: "Qwen Turbo (fast, long context)",
                    context_window: 1_000_000,
                },
                ModelDef {
                    id: "qwen-plus",
                    description: "Qwen Plus (balanced)",
                    context_window: 131_072,
                },
                ModelDef {
                    id: "qwen-max",
                    description: "Qwen Max (most capable)",
                    context_window: 32_768,
                },
            ],
        },
        ProviderDef {
            id: "openrouter",
            display_name: "OpenRouter",
            endpoint: "https://openrouter.ai/api/v1/chat/completions",
            api_key_env: "OPENROUTER_API_KEY",
            default_model: "meta-llama/llama-3.3-70b-instruct",
            models: &[
                ModelDef {
                    id: "meta-llama/llama-3.3-70b-instruct",
                    description: "Llama 3.3 70B Instruct",
                    context_window: 128_000,
                },
                ModelDef {
                    id: "google/gemma-2-9b-it",
                    description: "Gemma 2 9B",
                    context_window: 8_192,
                },
                ModelDef {
                    id: "mistralai/mistral-7b-instruct",
                    description: "Mistral 7B Instruct",
                    context_window: 32_768,
                },
            ],
        },
    ]
}

/// Look up a provider by id (case-insensitive)
pub fn find_provider(id: &str) -> Option<&'static ProviderDef> {
    all_providers()
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

/// Context windows of every catalogued model, for `ContextLimits`
pub fn context_table() -> impl Iterator<Item = (String, u64)> {
    all_providers()
        .iter()
        .flat_map(|p| p.models.iter())
        .map(|m| (m.id.to_string(), m.context_window))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_lookup_ignores_case() {
        assert_eq!(find_provider("DeepSeek").map(|p| p.id), Some("deepseek"));
        assert!(find_provider("nope").is_none());
    }

    #[test]
    fn test_default_models_are_catalogued() {
        for provider in all_providers() {
            assert!(
                provider.models.iter().any(|m| m.id == provider.default_model),
                "{} default model missing from its catalog",
                provider.id
            );
        }
    }
}
