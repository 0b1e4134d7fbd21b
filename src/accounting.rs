//! Token and context-window accounting
//!
//! Turns the usage numbers of one exchange (exact from the provider, or
//! estimated locally) into a `UsageSnapshot` with the share of the model's
//! context window consumed.

use crate::llm::{ChatMessage, TokenUsage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default context window for models nothing else matches
pub const DEFAULT_CONTEXT_WINDOW: u64 = 64_000;

/// Usage of one exchange, attached to the assistant message it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// True when the counts come from local estimation
    pub estimated: bool,
    pub max_context_tokens: u64,
    /// Share of the context window used, in [0, 100], one decimal
    pub context_usage_percent: f64,
}

// ============================================================================
// Tokenizers
// ============================================================================

/// An exact subword tokenizer for some model family
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> u64;
}

/// Tokenizers by model id, plus an optional reference tokenizer used for
/// models without their own. Empty by default, in which case every count
/// goes through the character heuristic.
#[derive(Clone, Default)]
pub struct TokenizerRegistry {
    by_model: HashMap<String, Arc<dyn Tokenizer>>,
    reference: Option<Arc<dyn Tokenizer>>,
}

impl TokenizerRegistry {
    pub fn with_model(mut self, model_id: impl Into<String>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.by_model.insert(model_id.into(), tokenizer);
        self
    }

    pub fn with_reference(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.reference = Some(tokenizer);
        self
    }

    /// Count tokens with the most specific tokenizer available
    pub fn count(&self, model_id: &str, text: &str) -> u64 {
        match self.by_model.get(model_id).or(self.reference.as_ref()) {
            Some(tokenizer) => tokenizer.count_tokens(text),
            None => heuristic_token_count(text),
        }
    }
}

impl std::fmt::Debug for TokenizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerRegistry")
            .field("models", &self.by_model.keys().collect::<Vec<_>>())
            .field("reference", &self.reference.is_some())
            .finish()
    }
}

/// Character-based estimate: denser scripts cost more tokens per char
pub fn heuristic_token_count(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let ratio = if text.chars().any(is_cjk) {
        0.6
    } else if text.chars().any(is_cyrillic) {
        0.4
    } else {
        0.3
    };
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let tokens = (text.chars().count() as f64 * ratio).ceil() as u64;
    tokens
}

fn is_cjk(ch: char) -> bool {
    matches!(
        ch,
        '\u{3040}'..='\u{30FF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{AC00}'..='\u{D7AF}'
            | '\u{F900}'..='\u{FAFF}'
    )
}

fn is_cyrillic(ch: char) -> bool {
    matches!(ch, '\u{0400}'..='\u{04FF}')
}

// ============================================================================
// Context limits
// ============================================================================

/// Model id → context window table
#[derive(Debug, Clone)]
pub struct ContextLimits {
    table: HashMap<String, u64>,
}

impl Default for ContextLimits {
    /// The context windows of the built-in model catalog
    fn default() -> Self {
        Self::new(crate::llm::context_table())
    }
}

impl ContextLimits {
    pub fn new(entries: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            table: entries.into_iter().collect(),
        }
    }

    /// Context window for a model: exact id, then substring match in either
    /// direction (longest key wins), then family keywords in the model or
    /// provider name, then the default.
    pub fn limit_for(&self, model_id: &str, provider: &str) -> u64 {
        if let Some(&limit) = self.table.get(model_id) {
            return limit;
        }

        let model = model_id.to_lowercase();
        if !model.is_empty() {
            let partial = self
                .table
                .iter()
                .filter(|(key, _)| {
                    let key = key.to_lowercase();
                    model.contains(&key) || key.contains(&model)
                })
                .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)));
            if let Some((_, &limit)) = partial {
                return limit;
            }
        }

        family_limit(&model)
            .or_else(|| family_limit(&provider.to_lowercase()))
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }
}

fn family_limit(name: &str) -> Option<u64> {
    if name.is_empty() {
        None
    } else if name.contains("deepseek") {
        Some(64_000)
    } else if name.contains("qwen") || name.contains("llama") {
        Some(128_000)
    } else if name.contains("gemma") {
        Some(8_192)
    } else if name.contains("mistral") {
        Some(32_768)
    } else {
        None
    }
}

// ============================================================================
// Accountant
// ============================================================================

/// Computes usage snapshots for exchanges
#[derive(Debug, Clone, Default)]
pub struct Accountant {
    limits: ContextLimits,
    tokenizers: TokenizerRegistry,
}

impl Accountant {
    pub fn new(limits: ContextLimits, tokenizers: TokenizerRegistry) -> Self {
        Self { limits, tokenizers }
    }

    /// Estimate usage from the prompt turns and the completion text
    pub fn estimate(&self, model_id: &str, prompt: &[ChatMessage], completion: &str) -> TokenUsage {
        let prompt_text = prompt
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt_tokens = self.tokenizers.count(model_id, &prompt_text);
        let completion_tokens = self.tokenizers.count(model_id, completion);
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            estimated: true,
        }
    }

    /// Snapshot for one exchange; estimates when no usage was reported
    pub fn snapshot(
        &self,
        model_id: &str,
        provider: &str,
        reported: Option<TokenUsage>,
        prompt: &[ChatMessage],
        completion: &str,
    ) -> UsageSnapshot {
        let usage = reported.unwrap_or_else(|| self.estimate(model_id, prompt, completion));
        let max_context_tokens = self.limits.limit_for(model_id, provider);
        UsageSnapshot {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            estimated: usage.estimated,
            max_context_tokens,
            context_usage_percent: usage_percent(usage.total_tokens, max_context_tokens),
        }
    }
}

/// `min(100, 100 * total / max)` rounded to one decimal
pub fn usage_percent(total_tokens: u64, max_context_tokens: u64) -> f64 {
    if max_context_tokens == 0 {
        return if total_tokens == 0 { 0.0 } else { 100.0 };
    }
    #[allow(clippy::cast_precision_loss)]
    let raw = 100.0 * total_tokens as f64 / max_context_tokens as f64;
    ((raw.min(100.0) * 10.0).round() / 10.0).clamp(0.0, 100.0)
}
