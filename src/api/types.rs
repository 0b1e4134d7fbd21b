//! API request/response types shared by the gateway and its client

use crate::accounting::UsageSnapshot;
use crate::governor::QuotaStatus;
use crate::llm::{ChatMessage, ErrorKind, Role};
use serde::{Deserialize, Serialize};

/// Request body for `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Successful `POST /api/chat` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<UsageSnapshot>,
    pub quota: QuotaStatus,
}

impl ChatResponse {
    pub fn single(content: String, token_usage: Option<UsageSnapshot>, quota: QuotaStatus) -> Self {
        Self {
            choices: vec![ChatChoice {
                message: ChatMessage::new(Role::Assistant, content),
            }],
            token_usage,
            quota,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Response for `GET /api/quota`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaResponse {
    pub identity: String,
    #[serde(flatten)]
    pub status: QuotaStatus,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaStatus>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: None,
            quota: None,
        }
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_quota(mut self, quota: QuotaStatus) -> Self {
        self.quota = Some(quota);
        self
    }
}
