//! Session state types

use super::traits::StoredSettings;
use crate::accounting::UsageSnapshot;
use crate::decoder::DecodedReply;
use crate::llm::{find_provider, ChatMessage, ErrorKind, ExchangeOptions, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_PROVIDER: &str = "deepseek";
pub const MAX_TEMPERATURE: f64 = 2.0;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub author: Author,
    pub timestamp: DateTime<Utc>,
    /// Fields recovered from an assistant reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded: Option<DecodedReply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
}

impl Message {
    pub fn user(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            author: Author::User,
            timestamp: at,
            decoded: None,
            usage: None,
        }
    }

    pub fn assistant(
        text: impl Into<String>,
        at: DateTime<Utc>,
        decoded: DecodedReply,
        usage: UsageSnapshot,
    ) -> Self {
        Self {
            text: text.into(),
            author: Author::Assistant,
            timestamp: at,
            decoded: Some(decoded),
            usage: Some(usage),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        let role = match self.author {
            Author::User => Role::User,
            Author::Assistant => Role::Assistant,
        };
        ChatMessage::new(role, self.text.clone())
    }
}

/// Per-session configuration, carried across transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub temperature: f64,
    pub system_prompt: String,
    pub provider: String,
    /// Empty means the provider's default model
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_models: Option<Value>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: String::new(),
            provider: DEFAULT_PROVIDER.to_string(),
            model: String::new(),
            available_models: None,
        }
    }
}

impl SessionConfig {
    /// Overlay persisted values; absent ones take their defaults
    pub fn from_stored(stored: &StoredSettings, available_models: Option<Value>) -> Self {
        Self {
            temperature: stored
                .temperature
                .filter(|t| t.is_finite())
                .map_or(DEFAULT_TEMPERATURE, clamp_temperature),
            system_prompt: stored.system_prompt.clone().unwrap_or_default(),
            provider: stored
                .provider
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            model: stored.model.clone().unwrap_or_default(),
            available_models,
        }
    }

    pub fn exchange_options(&self) -> ExchangeOptions {
        ExchangeOptions {
            temperature: self.temperature,
            system_prompt: Some(self.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
            provider: self.provider.clone(),
            model: Some(self.model.clone()).filter(|m| !m.trim().is_empty()),
        }
    }

    /// Model that will actually answer: the configured one, else the
    /// provider's default, else empty.
    pub fn effective_model(&self) -> &str {
        if !self.model.trim().is_empty() {
            return &self.model;
        }
        find_provider(&self.provider).map_or("", |p| p.default_model)
    }
}

pub fn clamp_temperature(value: f64) -> f64 {
    value.clamp(0.0, MAX_TEMPERATURE)
}

/// Identifies one exchange within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exchange-{}", self.0)
    }
}

/// Why the last exchange failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeFailure {
    pub kind: ErrorKind,
    /// Localized, user-presentable text
    pub message: String,
    /// Raw error text for logs and diagnostics
    pub detail: String,
}

/// Lifecycle position of a session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Pending {
        exchange: ExchangeId,
        /// Topic of the previous reply, shown while waiting
        topic: Option<String>,
    },
    Ready {
        topic: Option<String>,
    },
    Failed {
        failure: ExchangeFailure,
    },
}

impl SessionStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionStatus::Pending { .. })
    }

    pub fn topic(&self) -> Option<&str> {
        match self {
            SessionStatus::Pending { topic, .. } | SessionStatus::Ready { topic } => topic.as_deref(),
            SessionStatus::Idle | SessionStatus::Failed { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Pending { .. } => "pending",
            SessionStatus::Ready { .. } => "ready",
            SessionStatus::Failed { .. } => "failed",
        }
    }
}

/// A conversation, its configuration and where it stands
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub conversation: Vec<Message>,
    pub config: SessionConfig,
    /// Last exchange id handed out
    pub exchange_seq: u64,
    pub status: SessionStatus,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            conversation: Vec::new(),
            config,
            exchange_seq: 0,
            status: SessionStatus::Idle,
        }
    }

    pub fn current_topic(&self) -> Option<&str> {
        self.status.topic()
    }

    pub fn pending_exchange(&self) -> Option<ExchangeId> {
        match self.status {
            SessionStatus::Pending { exchange, .. } => Some(exchange),
            _ => None,
        }
    }

    /// Conversation as upstream turns, without the system prompt
    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.conversation.iter().map(Message::to_chat_message).collect()
    }
}
