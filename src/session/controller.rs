//! Session runtime executor and the handle the presentation layer drives

use super::state::Session;
use super::traits::{ChatTransport, ModelCatalog, SettingsStore};
use super::transition::{transition, SessionContext, TransitionError};
use super::{Effect, Event};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const COMMAND_BUFFER: usize = 32;

/// An event plus, for caller-originated events, where to report rejection
struct Command {
    event: Event,
    reply: Option<oneshot::Sender<Result<(), TransitionError>>>,
}

impl Command {
    fn feedback(event: Event) -> Self {
        Self { event, reply: None }
    }
}

/// Errors surfaced through `SessionHandle`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Session runtime has stopped")]
    Closed,
}

/// Owns one session: applies transitions in order and executes effects
pub struct SessionRuntime<T, S, C>
where
    T: ChatTransport + 'static,
    S: SettingsStore + 'static,
    C: ModelCatalog + 'static,
{
    context: SessionContext,
    session: Session,
    transport: Arc<T>,
    settings: Arc<S>,
    catalog: Arc<C>,
    command_rx: mpsc::Receiver<Command>,
    /// Weak so the loop ends once every handle is dropped
    feedback_tx: mpsc::WeakSender<Command>,
    state_tx: watch::Sender<Session>,
    /// Token for the in-flight exchange
    exchange_cancel: Option<CancellationToken>,
}

impl<T, S, C> SessionRuntime<T, S, C>
where
    T: ChatTransport + 'static,
    S: SettingsStore + 'static,
    C: ModelCatalog + 'static,
{
    pub fn new(
        context: SessionContext,
        session: Session,
        transport: T,
        settings: S,
        catalog: C,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(session.clone());

        let runtime = Self {
            context,
            session,
            transport: Arc::new(transport),
            settings: Arc::new(settings),
            catalog: Arc::new(catalog),
            command_rx,
            feedback_tx: command_tx.downgrade(),
            state_tx,
            exchange_cancel: None,
        };
        let handle = SessionHandle {
            command_tx,
            state_rx,
        };
        (runtime, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!(provider = %self.session.config.provider, "Starting session runtime");

        while let Some(Command { event, reply }) = self.command_rx.recv().await {
            let result = self.process_event(event).await;
            if let Err(e) = &result {
                tracing::debug!(error = %e, "Event rejected");
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        }

        if let Some(token) = self.exchange_cancel.take() {
            token.cancel();
        }
        tracing::info!("Session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        // Loaded settings come back synchronously and are chained here
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let name = current_event.name();
            let result = transition(&self.session, &self.context, current_event)?;
            self.session = result.new_state;
            tracing::debug!(event = name, status = self.session.status.name(), "Session transition");

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }

            if !self.session.status.is_pending() {
                self.exchange_cancel = None;
            }
        }

        self.state_tx.send_replace(self.session.clone());
        Ok(())
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::RequestExchange {
                exchange,
                messages,
                options,
            } => {
                let Some(feedback_tx) = self.feedback_tx.upgrade() else {
                    tracing::debug!(%exchange, "No handles left, skipping exchange");
                    return None;
                };

                if let Some(previous) = self.exchange_cancel.take() {
                    previous.cancel();
                }
                let cancel_token = CancellationToken::new();
                self.exchange_cancel = Some(cancel_token.clone());
                let transport = self.transport.clone();

                tokio::spawn(async move {
                    tracing::info!(
                        %exchange,
                        provider = %options.provider,
                        turns = messages.len(),
                        "Requesting exchange (background)"
                    );

                    tokio::select! {
                        biased;

                        () = cancel_token.cancelled() => {
                            tracing::info!(%exchange, "Exchange cancelled");
                        }

                        result = transport.send(&messages, &options) => {
                            let event = match result {
                                Ok(reply) => Event::ExchangeCompleted {
                                    exchange,
                                    reply,
                                    at: Utc::now(),
                                },
                                Err(error) => {
                                    tracing::warn!(%exchange, error = %error, "Exchange failed");
                                    Event::ExchangeFailed { exchange, error }
                                }
                            };
                            let _ = feedback_tx.send(Command::feedback(event)).await;
                        }
                    }
                });

                None
            }

            Effect::CancelExchange => {
                if let Some(token) = self.exchange_cancel.take() {
                    token.cancel();
                }
                None
            }

            Effect::PersistSetting { field, value } => {
                let settings = self.settings.clone();
                tokio::spawn(async move {
                    if !settings.save(field, &value).await {
                        tracing::warn!(%field, "Failed to persist setting");
                    }
                });
                None
            }

            Effect::LoadSettings => match self.settings.load().await {
                Ok(stored) => Some(Event::SettingsLoaded(stored)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load settings, keeping current configuration");
                    None
                }
            },

            Effect::FetchCatalog => {
                let Some(feedback_tx) = self.feedback_tx.upgrade() else {
                    return None;
                };
                let catalog = self.catalog.clone();
                tokio::spawn(async move {
                    match catalog.fetch().await {
                        Ok(models) => {
                            let _ = feedback_tx
                                .send(Command::feedback(Event::CatalogLoaded(models)))
                                .await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to fetch model catalog");
                        }
                    }
                });
                None
            }
        }
    }
}

/// Cheap, cloneable front end to a running session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<Session>,
}

impl SessionHandle {
    /// Send an event and wait until the runtime has applied (or rejected) it
    async fn dispatch(&self, event: Event) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command {
                event,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    /// Start an exchange; returns once the session is Pending
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.dispatch(Event::submit(text)).await
    }

    pub async fn clear(&self) -> Result<(), SessionError> {
        self.dispatch(Event::ClearConversation).await
    }

    pub async fn set_temperature(&self, value: f64) -> Result<(), SessionError> {
        self.dispatch(Event::UpdateTemperature(value)).await
    }

    pub async fn set_system_prompt(&self, prompt: impl Into<String>) -> Result<(), SessionError> {
        self.dispatch(Event::UpdateSystemPrompt(prompt.into())).await
    }

    pub async fn set_provider(&self, provider: impl Into<String>) -> Result<(), SessionError> {
        self.dispatch(Event::UpdateProvider(provider.into())).await
    }

    pub async fn set_model(&self, model: impl Into<String>) -> Result<(), SessionError> {
        self.dispatch(Event::UpdateModel(model.into())).await
    }

    /// Overlay persisted settings; completes after they are applied
    pub async fn load_settings(&self) -> Result<(), SessionError> {
        self.dispatch(Event::LoadSettings).await
    }

    /// Start a background catalog fetch
    pub async fn load_models(&self) -> Result<(), SessionError> {
        self.dispatch(Event::LoadAvailableModels).await
    }

    pub async fn delete_message_at(&self, index: usize) -> Result<(), SessionError> {
        self.dispatch(Event::DeleteMessageAt(index)).await
    }

    pub fn current_topic(&self) -> Option<String> {
        self.state_rx.borrow().current_topic().map(str::to_string)
    }

    pub fn snapshot(&self) -> Session {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state_rx.clone()
    }

    /// Wait until no exchange is in flight
    pub async fn wait_until_settled(&self) -> Result<Session, SessionError> {
        let mut rx = self.state_rx.clone();
        let session = rx
            .wait_for(|s| !s.status.is_pending())
            .await
            .map_err(|_| SessionError::Closed)?
            .clone();
        Ok(session)
    }
}
