//! Exchange error types

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Exchange error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct LlmError {
    pub kind: ErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuotaExceeded, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamUnreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamTimeout, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamProtocolError, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamConfigError, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    /// Map a `reqwest` transport failure
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("Request timeout: {err}"))
        } else if err.is_connect() {
            Self::unreachable(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            Self::protocol(format!("Failed to decode response: {err}"))
        } else {
            Self::unclassified(format!("Request failed: {err}"))
        }
    }

    /// Map a non-success HTTP status and its extracted message
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            429 => Self::unreachable(format!("Upstream rate limited: {message}")),
            401 | 403 => Self::config(format!("Authentication failed: {message}")),
            408 | 504 => Self::timeout(format!("Upstream timed out: {message}")),
            500..=599 => Self::unreachable(format!("Server error ({status}): {message}")),
            _ => Self::unclassified(format!("HTTP {status}: {message}")),
        }
    }

    /// Final classification: a typed kind is kept, an unclassified one is
    /// refined from the message text.
    pub fn classify(&self) -> ErrorKind {
        match self.kind {
            ErrorKind::Unclassified => classify_message(&self.message),
            kind => kind,
        }
    }
}

/// Error taxonomy for exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Daily quota used up; produced by the rate governor
    QuotaExceeded,
    /// Connection refused, DNS failure, 5xx
    UpstreamUnreachable,
    UpstreamTimeout,
    /// Malformed or unexpected response shape
    UpstreamProtocolError,
    /// Missing or rejected credential
    UpstreamConfigError,
    Unclassified,
}

/// Language for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    /// Parse a locale tag such as `zh`, `zh-CN` or `en_US`
    pub fn parse(tag: &str) -> Option<Self> {
        let lang = tag
            .split(['-', '_', '.'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "en" => Some(Locale::En),
            "zh" => Some(Locale::Zh),
            _ => None,
        }
    }
}

impl ErrorKind {
    /// Message suitable for showing to the person chatting
    pub fn user_message(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (ErrorKind::QuotaExceeded, Locale::En) => {
                "You have reached today's message limit. Please come back tomorrow."
            }
            (ErrorKind::QuotaExceeded, Locale::Zh) => "今日对话次数已用完，请明天再来。",
            (ErrorKind::UpstreamUnreachable, Locale::En) => {
                "The model service is unreachable right now. Please try again shortly."
            }
            (ErrorKind::UpstreamUnreachable, Locale::Zh) => "暂时无法连接到模型服务，请稍后重试。",
            (ErrorKind::UpstreamTimeout, Locale::En) => {
                "The model took too long to answer. Please try again."
            }
            (ErrorKind::UpstreamTimeout, Locale::Zh) => "模型响应超时，请重试。",
            (ErrorKind::UpstreamProtocolError, Locale::En) => {
                "The model service returned an unexpected response."
            }
            (ErrorKind::UpstreamProtocolError, Locale::Zh) => "模型服务返回了无法识别的响应。",
            (ErrorKind::UpstreamConfigError, Locale::En) => {
                "The model service is not configured correctly (missing or invalid API key)."
            }
            (ErrorKind::UpstreamConfigError, Locale::Zh) => "模型服务配置有误（缺少或无效的 API 密钥）。",
            (ErrorKind::Unclassified, Locale::En) => "Something went wrong. Please try again.",
            (ErrorKind::Unclassified, Locale::Zh) => "出现了未知错误，请重试。",
        }
    }
}

/// Pull a human-readable message out of an error body shaped like
/// `{"error": {"message": ..}}`, `{"error": ..}` or `{"message": ..}`;
/// falls back to the raw body.
pub fn error_message_from_body(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    let candidates = [
        value.pointer("/error/message"),
        value.get("error"),
        value.get("message"),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .map(str::to_owned);
    found.unwrap_or_else(|| body.trim().to_string())
}

static SERVER_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b5\d\d\b").expect("status regex is valid"));

/// Content heuristics for errors that arrive without a kind
fn classify_message(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    if has(&["timeout", "timed out", "etimedout", "deadline exceeded"]) {
        ErrorKind::UpstreamTimeout
    } else if has(&[
        "econnrefused",
        "connection refused",
        "connection reset",
        "failed to connect",
        "enotfound",
        "dns error",
        "network",
        "rate limit",
        "too many requests",
    ]) || SERVER_ERROR_RE.is_match(&lowered)
    {
        ErrorKind::UpstreamUnreachable
    } else if has(&["api key", "api_key", "credential", "unauthorized", "401", "403"]) {
        ErrorKind::UpstreamConfigError
    } else if has(&["parse", "invalid json", "unexpected", "malformed", "decode"]) {
        ErrorKind::UpstreamProtocolError
    } else {
        ErrorKind::Unclassified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_kind_is_kept() {
        let err = LlmError::config("connection refused while reading key");
        assert_eq!(err.classify(), ErrorKind::UpstreamConfigError);
    }

    #[test]
    fn test_heuristics_for_unclassified() {
        let cases = [
            ("operation timed out after 60s", ErrorKind::UpstreamTimeout),
            ("connect ECONNREFUSED 127.0.0.1:443", ErrorKind::UpstreamUnreachable),
            ("upstream returned 502 Bad Gateway", ErrorKind::UpstreamUnreachable),
            ("Missing API key for provider", ErrorKind::UpstreamConfigError),
            ("failed to parse body", ErrorKind::UpstreamProtocolError),
            ("Rate limit hit", ErrorKind::UpstreamUnreachable),
            ("insufficient quota", ErrorKind::Unclassified),
            ("something odd", ErrorKind::Unclassified),
        ];
        for (message, expected) in cases {
            assert_eq!(
                LlmError::unclassified(message).classify(),
                expected,
                "message: {message}"
            );
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(LlmError::from_status(429, "slow down").kind, ErrorKind::UpstreamUnreachable);
        assert_eq!(LlmError::from_status(401, "bad key").kind, ErrorKind::UpstreamConfigError);
        assert_eq!(LlmError::from_status(504, "late").kind, ErrorKind::UpstreamTimeout);
        assert_eq!(LlmError::from_status(503, "down").kind, ErrorKind::UpstreamUnreachable);
        assert_eq!(LlmError::from_status(418, "teapot").kind, ErrorKind::Unclassified);
    }

    #[test]
    fn test_provider_rate_limit_is_not_a_quota_rejection() {
        let err = LlmError::from_status(429, "provider rate limit");
        assert_ne!(err.classify(), ErrorKind::QuotaExceeded);
        assert!(err.message.contains("provider rate limit"));

        let err = LlmError::unclassified("429 Too Many Requests");
        assert_ne!(err.classify(), ErrorKind::QuotaExceeded);
    }

    #[test]
    fn test_error_message_from_body_shapes() {
        assert_eq!(error_message_from_body(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(error_message_from_body(r#"{"error":"quota gone"}"#), "quota gone");
        assert_eq!(error_message_from_body(r#"{"message":"nope"}"#), "nope");
        assert_eq!(error_message_from_body("plain text "), "plain text");
    }

    #[test]
    fn test_locale_parse() {
        assert_eq!(Locale::parse("zh-CN"), Some(Locale::Zh));
        assert_eq!(Locale::parse("en_US.UTF-8"), Some(Locale::En));
        assert_eq!(Locale::parse("fr"), None);
    }

    #[test]
    fn test_every_kind_has_messages() {
        let kinds = [
            ErrorKind::QuotaExceeded,
            ErrorKind::UpstreamUnreachable,
            ErrorKind::UpstreamTimeout,
            ErrorKind::UpstreamProtocolError,
            ErrorKind::UpstreamConfigError,
            ErrorKind::Unclassified,
        ];
        for kind in kinds {
            assert!(!kind.user_message(Locale::En).is_empty());
            assert!(!kind.user_message(Locale::Zh).is_empty());
        }
    }
}
