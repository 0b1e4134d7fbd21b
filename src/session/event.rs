//! Events that can occur in a session

use super::state::ExchangeId;
use super::traits::StoredSettings;
use crate::llm::{ExchangeReply, LlmError};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Presentation-layer events
    SubmitMessage {
        text: String,
        at: DateTime<Utc>,
    },
    ClearConversation,
    UpdateTemperature(f64),
    UpdateSystemPrompt(String),
    UpdateProvider(String),
    UpdateModel(String),
    LoadSettings,
    LoadAvailableModels,
    DeleteMessageAt(usize),

    // Results fed back by the runtime
    SettingsLoaded(StoredSettings),
    CatalogLoaded(Value),
    ExchangeCompleted {
        exchange: ExchangeId,
        reply: ExchangeReply,
        at: DateTime<Utc>,
    },
    ExchangeFailed {
        exchange: ExchangeId,
        error: LlmError,
    },
}

impl Event {
    pub fn submit(text: impl Into<String>) -> Self {
        Event::SubmitMessage {
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::SubmitMessage { .. } => "submit_message",
            Event::ClearConversation => "clear_conversation",
            Event::UpdateTemperature(_) => "update_temperature",
            Event::UpdateSystemPrompt(_) => "update_system_prompt",
            Event::UpdateProvider(_) => "update_provider",
            Event::UpdateModel(_) => "update_model",
            Event::LoadSettings => "load_settings",
            Event::LoadAvailableModels => "load_available_models",
            Event::DeleteMessageAt(_) => "delete_message_at",
            Event::SettingsLoaded(_) => "settings_loaded",
            Event::CatalogLoaded(_) => "catalog_loaded",
            Event::ExchangeCompleted { .. } => "exchange_completed",
            Event::ExchangeFailed { .. } => "exchange_failed",
        }
    }
}
