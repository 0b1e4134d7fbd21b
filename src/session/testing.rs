//! Mock capabilities for session tests

use super::traits::{ChatTransport, ModelCatalog, SettingField, SettingsStore, StoredSettings};
use crate::llm::{ChatMessage, ExchangeOptions, ExchangeReply, LlmError, TokenUsage};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Transports
// ============================================================================

/// Transport that returns queued replies in order
#[derive(Default)]
pub struct QueuedTransport {
    replies: Mutex<VecDeque<Result<ExchangeReply, LlmError>>>,
    requests: Mutex<Vec<(Vec<ChatMessage>, ExchangeOptions)>>,
}

impl QueuedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(ExchangeReply {
            text: text.to_string(),
            usage: Some(TokenUsage::exact(40, 10)),
        }));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<(Vec<ChatMessage>, ExchangeOptions)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for QueuedTransport {
    async fn send(
        &self,
        messages: &[ChatMessage],
        options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), options.clone()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::unreachable("No mock reply queued")))
    }
}

/// Transport that answers after a fixed delay; counts how many calls ran
/// to completion so cancellation is observable.
pub struct DelayedTransport {
    delay: Duration,
    text: String,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl DelayedTransport {
    pub fn new(delay: Duration, text: &str) -> Self {
        Self {
            delay,
            text: text.to_string(),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for DelayedTransport {
    async fn send(
        &self,
        _messages: &[ChatMessage],
        _options: &ExchangeOptions,
    ) -> Result<ExchangeReply, LlmError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(ExchangeReply {
            text: self.text.clone(),
            usage: None,
        })
    }
}

// ============================================================================
// Settings stores
// ============================================================================

/// In-memory settings store
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<SettingField, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, field: SettingField, value: &str) {
        self.values.lock().unwrap().insert(field, value.to_string());
    }

    pub fn get(&self, field: SettingField) -> Option<String> {
        self.values.lock().unwrap().get(&field).cloned()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn load(&self) -> Result<StoredSettings, String> {
        Ok(StoredSettings {
            temperature: self
                .get(SettingField::Temperature)
                .and_then(|t| t.parse().ok()),
            system_prompt: self.get(SettingField::SystemPrompt),
            provider: self.get(SettingField::Provider),
            model: self.get(SettingField::Model),
        })
    }

    async fn save(&self, field: SettingField, value: &str) -> bool {
        self.put(field, value);
        true
    }
}

/// Store whose every operation fails
pub struct FailingSettings;

#[async_trait]
impl SettingsStore for FailingSettings {
    async fn load(&self) -> Result<StoredSettings, String> {
        Err("settings store unavailable".to_string())
    }

    async fn save(&self, _field: SettingField, _value: &str) -> bool {
        false
    }
}

// ============================================================================
// Catalogs
// ============================================================================

pub struct StaticCatalog(Value);

impl StaticCatalog {
    pub fn new(catalog: Value) -> Self {
        Self(catalog)
    }

    pub fn empty() -> Self {
        Self(Value::Null)
    }
}

#[async_trait]
impl ModelCatalog for StaticCatalog {
    async fn fetch(&self) -> Result<Value, LlmError> {
        Ok(self.0.clone())
    }
}

pub struct FailingCatalog;

#[async_trait]
impl ModelCatalog for FailingCatalog {
    async fn fetch(&self) -> Result<Value, LlmError> {
        Err(LlmError::unreachable("catalog unavailable"))
    }
}
