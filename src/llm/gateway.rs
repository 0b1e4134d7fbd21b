//! HTTP client for a remote chroma gateway

use super::error::error_message_from_body;
use super::types::{ChatMessage, ExchangeOptions, ExchangeReply, TokenUsage};
use super::LlmError;
use crate::api::{ChatRequest, ChatResponse, ErrorResponse, QuotaResponse};
use crate::session::{ChatTransport, ModelCatalog};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Talks to `/api/chat`, `/api/quota` and `/api/models` on a gateway
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;
        Self::decode(response).await
    }

    /// Caller's quota position as the gateway sees it
    pub async fn quota(&self) -> Result<QuotaResponse, LlmError> {
        self.get("/api/quota").await
    }

    pub async fn models(&self) -> Result<Value, LlmError> {
        self.get("/api/models").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LlmError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, LlmError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| LlmError::protocol(format!("Failed to parse gateway response: {e}")))
    }
}

/// Typed error when the gateway says which kind it was, status mapping otherwise
fn error_from_body(status: u16, body: &str) -> LlmError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error,
            kind: Some(kind),
            ..
        }) => LlmError::new(kind, error),
        // The gateway answers 429 only for its own daily quota
        _ if status == 429 => LlmError::quota_exceeded(error_message_from_body(body)),
        _ => LlmError::from_status(status, &error_message_from_body(body)),
    }
}

#[async_trait]
impl ChatTransport for GatewayClient {
    async fn send(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError> {
        let request = ChatRequest {
            messages: messages.to_vec(),
            temperature: Some(options.temperature),
            system_prompt: options.system_prompt.clone().filter(|p| !p.trim().is_empty()),
            provider: Some(options.provider.clone()).filter(|p| !p.is_empty()),
            model: options.model.clone().filter(|m| !m.is_empty()),
        };

        let response = self.chat(&request).await?;
        let usage = response.token_usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            estimated: u.estimated,
        });
        let text = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::protocol("Gateway response has no choices"))?;

        tracing::debug!(
            remaining = response.quota.remaining,
            limit = response.quota.limit,
            "Gateway exchange completed"
        );

        Ok(ExchangeReply { text, usage })
    }
}

#[async_trait]
impl ModelCatalog for GatewayClient {
    async fn fetch(&self) -> Result<Value, LlmError> {
        self.models().await
    }
}
