//! OpenAI-compatible chat-completions provider

use super::error::error_message_from_body;
use super::models::ProviderDef;
use super::types::{ChatMessage, ExchangeOptions, ExchangeReply, TokenUsage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat-completions client for one provider
pub struct OpenAiCompatibleService {
    client: Client,
    provider_id: String,
    endpoint: String,
    default_model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleService {
    pub fn new(def: &ProviderDef, api_key: Option<String>, timeout: Duration) -> Result<Self, LlmError> {
        Self::with_endpoint(def, def.endpoint.to_string(), api_key, timeout)
    }

    /// Same provider, different endpoint (proxies, tests)
    pub fn with_endpoint(
        def: &ProviderDef,
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            provider_id: def.id.to_string(),
            endpoint,
            default_model: def.default_model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn translate_request(&self, messages: &[ChatMessage], options: &ExchangeOptions) -> CompletionRequest {
        let model = options
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        CompletionRequest {
            model,
            messages: options
                .with_system_prompt(messages)
                .into_iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content,
                })
                .collect(),
            temperature: options.temperature,
        }
    }

    fn normalize_response(resp: CompletionResponse) -> Result<ExchangeReply, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::protocol("No choices in response"))?;

        let text = choice
            .message
            .content
            .ok_or_else(|| LlmError::protocol("Response choice has no content"))?;

        Ok(ExchangeReply {
            text,
            usage: resp
                .usage
                .map(|u| TokenUsage::exact(u.prompt_tokens, u.completion_tokens)),
        })
    }
}

#[async_trait]
impl LlmService for OpenAiCompatibleService {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            LlmError::config(format!("No API key configured for provider {}", self.provider_id))
        })?;

        let request = self.translate_request(messages, options);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        if !status.is_success() {
            let message = error_message_from_body(&body);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::protocol(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn provider_id(&self) -> &str {
        &self.provider_id
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct CompletionUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{find_provider, ErrorKind, Role};

    fn service(api_key: Option<&str>) -> OpenAiCompatibleService {
        let def = find_provider("deepseek").unwrap();
        OpenAiCompatibleService::new(def, api_key.map(String::from), Duration::from_secs(5)).unwrap()
    }

    fn options(model: Option<&str>, system: Option<&str>) -> ExchangeOptions {
        ExchangeOptions {
            temperature: 0.3,
            system_prompt: system.map(String::from),
            provider: "deepseek".to_string(),
            model: model.map(String::from),
        }
    }

    #[test]
    fn test_request_uses_default_model_and_system_prompt() {
        let svc = service(Some("key"));
        let req = svc.translate_request(
            &[ChatMessage::new(Role::User, "hello")],
            &options(None, Some("be kind")),
        );
        assert_eq!(req.model, "deepseek-chat");
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].content, "hello");
    }

    #[test]
    fn test_request_honours_explicit_model() {
        let svc = service(Some("key"));
        let req = svc.translate_request(&[], &options(Some("deepseek-reasoner"), None));
        assert_eq!(req.model, "deepseek-reasoner");
        assert!(req.messages.is_empty());
    }

    #[test]
    fn test_normalize_extracts_text_and_usage() {
        let resp: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"topic:A: body:B: emotion:RED:"}}],
                "usage":{"prompt_tokens":12,"completion_tokens":8,"total_tokens":20}}"#,
        )
        .unwrap();
        let reply = OpenAiCompatibleService::normalize_response(resp).unwrap();
        assert_eq!(reply.text, "topic:A: body:B: emotion:RED:");
        assert_eq!(reply.usage, Some(TokenUsage::exact(12, 8)));
    }

    #[test]
    fn test_normalize_rejects_empty_choices() {
        let resp: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let err = OpenAiCompatibleService::normalize_response(resp).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamProtocolError);
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let svc = service(Some("  "));
        let err = svc
            .complete(&[ChatMessage::new(Role::User, "hi")], &options(None, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamConfigError);
    }
}
