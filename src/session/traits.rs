//! Capabilities a session runtime depends on
//!
//! Production adapters live next to their I/O (`GatewayClient`,
//! `SqliteSettingsStore`); mocks are in `session::testing`.

use crate::llm::{ChatMessage, ExchangeOptions, ExchangeReply, LlmError, ProviderRegistry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Performs one exchange with an upstream model
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError>;
}

/// Local persistence for session settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Every persisted setting; absent keys are `None`
    async fn load(&self) -> Result<StoredSettings, String>;

    /// Persist one setting; false when the write failed
    async fn save(&self, field: SettingField, value: &str) -> bool;
}

/// Source of the provider/model catalog
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn fetch(&self) -> Result<Value, LlmError>;
}

/// Settings as they come out of the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// A persisted setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingField {
    Temperature,
    SystemPrompt,
    Provider,
    Model,
}

impl SettingField {
    /// Storage key
    pub fn key(self) -> &'static str {
        match self {
            SettingField::Temperature => "temperature",
            SettingField::SystemPrompt => "systemPrompt",
            SettingField::Provider => "provider",
            SettingField::Model => "model",
        }
    }
}

impl fmt::Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn send(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError> {
        (**self).send(messages, options).await
    }
}

#[async_trait]
impl<T: SettingsStore + ?Sized> SettingsStore for Arc<T> {
    async fn load(&self) -> Result<StoredSettings, String> {
        (**self).load().await
    }

    async fn save(&self, field: SettingField, value: &str) -> bool {
        (**self).save(field, value).await
    }
}

#[async_trait]
impl<T: ModelCatalog + ?Sized> ModelCatalog for Arc<T> {
    async fn fetch(&self) -> Result<Value, LlmError> {
        (**self).fetch().await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// In-process transport straight to the provider registry, no gateway
#[derive(Clone)]
pub struct RegistryTransport {
    registry: Arc<ProviderRegistry>,
}

impl RegistryTransport {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ChatTransport for RegistryTransport {
    async fn send(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError> {
        let service = self.registry.get(&options.provider)?;
        service.complete(messages, options).await
    }
}

#[async_trait]
impl ModelCatalog for RegistryTransport {
    async fn fetch(&self) -> Result<Value, LlmError> {
        Ok(self.registry.catalog())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ErrorKind, LlmService, Role, TokenUsage};

    struct EchoService;

    #[async_trait]
    impl LlmService for EchoService {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            options: &ExchangeOptions,
        ) -> Result<ExchangeReply, LlmError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ExchangeReply {
                text: format!("{}:{last}", options.provider),
                usage: Some(TokenUsage::exact(1, 1)),
            })
        }

        fn provider_id(&self) -> &str {
            "echo"
        }
    }

    fn options(provider: &str) -> ExchangeOptions {
        ExchangeOptions {
            temperature: 0.7,
            system_prompt: None,
            provider: provider.to_string(),
            model: None,
        }
    }

    #[test]
    fn test_setting_keys() {
        assert_eq!(SettingField::SystemPrompt.key(), "systemPrompt");
        assert_eq!(SettingField::Temperature.to_string(), "temperature");
    }

    #[tokio::test]
    async fn test_registry_transport_routes_by_provider() {
        let registry = Arc::new(ProviderRegistry::with_services(vec![Arc::new(EchoService)]));
        let transport = RegistryTransport::new(registry);

        let reply = transport
            .send(&[ChatMessage::new(Role::User, "ping")], &options("echo"))
            .await
            .unwrap();
        assert_eq!(reply.text, "echo:ping");

        let err = transport.send(&[], &options("absent")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamConfigError);
    }

    #[tokio::test]
    async fn test_registry_transport_serves_catalog() {
        let registry = Arc::new(ProviderRegistry::with_services(vec![Arc::new(EchoService)]));
        let catalog = RegistryTransport::new(registry).fetch().await.unwrap();
        assert_eq!(catalog["defaultProvider"], "echo");
    }
}
