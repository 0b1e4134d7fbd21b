//! Common types for exchanges with upstream models

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn as sent upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Per-exchange options
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOptions {
    pub temperature: f64,
    pub system_prompt: Option<String>,
    pub provider: String,
    pub model: Option<String>,
}

impl ExchangeOptions {
    /// Messages with the system prompt, if any, prepended
    pub fn with_system_prompt(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = self.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            out.push(ChatMessage::new(Role::System, prompt));
        }
        out.extend(messages.iter().cloned());
        out
    }
}

/// Token counts reported for (or estimated from) one exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub estimated: bool,
}

impl TokenUsage {
    pub fn exact(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            estimated: false,
        }
    }
}

/// Result of one successful exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeReply {
    pub text: String,
    pub usage: Option<TokenUsage>,
}
