//! Effects produced by state transitions

use super::state::ExchangeId;
use super::traits::SettingField;
use crate::llm::{ChatMessage, ExchangeOptions};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run an exchange upstream (spawned, cancellable)
    RequestExchange {
        exchange: ExchangeId,
        messages: Vec<ChatMessage>,
        options: ExchangeOptions,
    },

    /// Abort the in-flight exchange
    CancelExchange,

    /// Best-effort write of one setting
    PersistSetting { field: SettingField, value: String },

    /// Read persisted settings and feed them back
    LoadSettings,

    /// Fetch the provider/model catalog in the background
    FetchCatalog,
}

impl Effect {
    pub fn persist(field: SettingField, value: impl Into<String>) -> Self {
        Effect::PersistSetting {
            field,
            value: value.into(),
        }
    }
}
