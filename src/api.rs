//! HTTP gateway API
//!
//! Mediates exchanges for remote clients: the rate governor gates each
//! exchange, the accountant reports its usage.

mod handlers;
mod types;

pub use handlers::{client_identity, create_router, AppError};
pub use types::*;

use crate::accounting::Accountant;
use crate::config::ServerConfig;
use crate::governor::RateGovernor;
use crate::llm::{Locale, ProviderRegistry};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub governor: Arc<RateGovernor>,
    pub registry: Arc<ProviderRegistry>,
    pub accountant: Arc<Accountant>,
    pub locale: Locale,
    pub trust_forwarded: bool,
}

impl AppState {
    pub fn new(config: &ServerConfig, governor: Arc<RateGovernor>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            governor,
            registry,
            accountant: Arc::new(Accountant::default()),
            locale: config.locale,
            trust_forwarded: config.trust_forwarded,
        }
    }
}
