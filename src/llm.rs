//! Upstream model abstraction
//!
//! Every provider is reached through the same chat-completions shape; the
//! registry picks one per exchange and the gateway client forwards exchanges
//! to a remote gateway instead.

mod error;
mod gateway;
mod models;
mod provider;
mod registry;
mod types;

pub use error::{error_message_from_body, ErrorKind, LlmError, Locale};
pub use gateway::GatewayClient;
pub use models::{all_providers, context_table, find_provider, ModelDef, ProviderDef};
pub use provider::OpenAiCompatibleService;
pub use registry::{LlmConfig, ProviderRegistry};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for upstream model providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Run one exchange. `messages` is the conversation without the system
    /// prompt; `options` carries it.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError>;

    /// Provider id this service talks to
    fn provider_id(&self) -> &str;
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError> {
        (**self).complete(messages, options).await
    }

    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }
}

/// Logging wrapper for upstream services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    provider_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let provider_id = inner.provider_id().to_string();
        Self { inner, provider_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(messages, options).await;
        let duration = start.elapsed();
        let model = options.model.as_deref().unwrap_or("default");

        match &result {
            Ok(reply) => {
                let usage = reply.usage.unwrap_or_default();
                tracing::info!(
                    provider = %self.provider_id,
                    model = %model,
                    duration_ms = %duration.as_millis(),
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Upstream exchange completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    provider = %self.provider_id,
                    model = %model,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.classify(),
                    "Upstream exchange failed"
                );
            }
        }

        result
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }
}
