//! Session controller
//!
//! Pure transitions over `Session` (Elm style) plus a runtime that executes
//! the effects they emit against injected capabilities.

mod controller;
mod effect;
pub mod event;
pub mod state;
pub mod traits;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub mod testing;

pub use controller::{SessionError, SessionHandle, SessionRuntime};
pub use effect::Effect;
pub use event::Event;
pub use state::{
    Author, ExchangeFailure, ExchangeId, Message, Session, SessionConfig, SessionStatus,
};
pub use traits::{
    ChatTransport, ModelCatalog, RegistryTransport, SettingField, SettingsStore, StoredSettings,
};
pub use transition::{transition, SessionContext, TransitionError, TransitionResult};
