//! Chroma Chat - color-coded conversational exchanges with LLM providers
//!
//! A session controller drives each exchange, a decoder recovers the
//! topic/body/emotion fields of a reply, an accountant reports token usage
//! against the model's context window, and a gateway with a per-client daily
//! governor mediates upstream calls.

pub mod accounting;
pub mod api;
pub mod config;
pub mod decoder;
pub mod governor;
pub mod llm;
pub mod session;
pub mod settings;
