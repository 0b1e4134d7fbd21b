//! Pure state transition function

use super::state::{
    clamp_temperature, ExchangeFailure, ExchangeId, Message, Session, SessionConfig, SessionStatus,
};
use super::traits::SettingField;
use super::{Effect, Event};
use crate::accounting::Accountant;
use crate::decoder::decode;
use crate::llm::{ExchangeReply, LlmError, Locale};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Inputs a transition needs besides the state itself
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub accountant: Arc<Accountant>,
    pub locale: Locale,
}

impl SessionContext {
    pub fn new(accountant: Arc<Accountant>, locale: Locale) -> Self {
        Self { accountant, locale }
    }
}

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: Session) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("An exchange is already in flight, wait for it to finish or clear the conversation")]
    ExchangeInFlight,
    #[error("Message is empty")]
    EmptyMessage,
}

/// Pure transition function: no I/O, same inputs give the same outputs.
pub fn transition(
    state: &Session,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // Message submission
        // ============================================================
        Event::SubmitMessage { text, at } => submit(state, &text, at),

        Event::ExchangeCompleted { exchange, reply, at } => {
            if state.pending_exchange() != Some(exchange) {
                return Ok(unchanged(state));
            }
            Ok(TransitionResult::new(complete(state, context, &reply, at)))
        }

        Event::ExchangeFailed { exchange, error } => {
            if state.pending_exchange() != Some(exchange) {
                return Ok(unchanged(state));
            }
            let mut next = state.clone();
            next.status = SessionStatus::Failed {
                failure: failure_from(&error, context.locale),
            };
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Conversation management
        // ============================================================
        Event::ClearConversation => {
            let next = Session {
                conversation: Vec::new(),
                config: state.config.clone(),
                exchange_seq: state.exchange_seq,
                status: SessionStatus::Idle,
            };
            let result = TransitionResult::new(next);
            if state.status.is_pending() {
                Ok(result.with_effect(Effect::CancelExchange))
            } else {
                Ok(result)
            }
        }

        Event::DeleteMessageAt(index) => {
            if index >= state.conversation.len() {
                return Ok(unchanged(state));
            }
            let mut next = state.clone();
            next.conversation.remove(index);
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Configuration
        // ============================================================
        Event::UpdateTemperature(value) => {
            if !value.is_finite() {
                return Ok(unchanged(state));
            }
            let temperature = clamp_temperature(value);
            let mut next = state.clone();
            next.config.temperature = temperature;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::persist(SettingField::Temperature, temperature.to_string())))
        }

        Event::UpdateSystemPrompt(prompt) => {
            let mut next = state.clone();
            next.config.system_prompt.clone_from(&prompt);
            Ok(TransitionResult::new(next).with_effect(Effect::persist(SettingField::SystemPrompt, prompt)))
        }

        Event::UpdateProvider(provider) => {
            let mut next = state.clone();
            next.config.provider.clone_from(&provider);
            Ok(TransitionResult::new(next).with_effect(Effect::persist(SettingField::Provider, provider)))
        }

        Event::UpdateModel(model) => {
            let mut next = state.clone();
            next.config.model.clone_from(&model);
            Ok(TransitionResult::new(next).with_effect(Effect::persist(SettingField::Model, model)))
        }

        Event::LoadSettings => Ok(unchanged(state).with_effect(Effect::LoadSettings)),

        Event::SettingsLoaded(stored) => {
            let mut next = state.clone();
            next.config = SessionConfig::from_stored(&stored, state.config.available_models.clone());
            Ok(TransitionResult::new(next))
        }

        Event::LoadAvailableModels => Ok(unchanged(state).with_effect(Effect::FetchCatalog)),

        Event::CatalogLoaded(catalog) => {
            let mut next = state.clone();
            next.config.available_models = Some(catalog);
            Ok(TransitionResult::new(next))
        }
    }
}

fn unchanged(state: &Session) -> TransitionResult {
    TransitionResult::new(state.clone())
}

fn submit(state: &Session, text: &str, at: DateTime<Utc>) -> Result<TransitionResult, TransitionError> {
    let topic = match &state.status {
        SessionStatus::Pending { .. } => return Err(TransitionError::ExchangeInFlight),
        SessionStatus::Idle | SessionStatus::Failed { .. } => None,
        SessionStatus::Ready { topic } => topic.clone(),
    };

    if text.trim().is_empty() {
        return Err(TransitionError::EmptyMessage);
    }

    let mut next = state.clone();
    next.conversation.push(Message::user(text, at));
    next.exchange_seq += 1;
    let exchange = ExchangeId(next.exchange_seq);
    next.status = SessionStatus::Pending { exchange, topic };

    let effect = Effect::RequestExchange {
        exchange,
        messages: next.chat_history(),
        options: next.config.exchange_options(),
    };
    Ok(TransitionResult::new(next).with_effect(effect))
}

/// Fold a matching reply into the session: decode, account, append
fn complete(state: &Session, context: &SessionContext, reply: &ExchangeReply, at: DateTime<Utc>) -> Session {
    let decoded = decode(&reply.text);
    let prompt = state
        .config
        .exchange_options()
        .with_system_prompt(&state.chat_history());
    let usage = context.accountant.snapshot(
        state.config.effective_model(),
        &state.config.provider,
        reply.usage,
        &prompt,
        &reply.text,
    );

    let topic = decoded.topic.clone();
    let mut next = state.clone();
    next.conversation
        .push(Message::assistant(reply.text.clone(), at, decoded, usage));
    next.status = SessionStatus::Ready { topic };
    next
}

fn failure_from(error: &LlmError, locale: Locale) -> ExchangeFailure {
    let kind = error.classify();
    ExchangeFailure {
        kind,
        message: kind.user_message(locale).to_string(),
        detail: error.message.clone(),
    }
}
