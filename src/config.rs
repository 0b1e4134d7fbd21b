//! Environment configuration for the gateway and the terminal client

use crate::governor::DEFAULT_DAILY_LIMIT;
use crate::llm::Locale;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Gateway server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub daily_limit: u32,
    pub reap_interval: Duration,
    pub upstream_timeout: Duration,
    pub locale: Locale,
    /// Derive client identity from `X-Forwarded-For` / `X-Real-IP`
    pub trust_forwarded: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_var(&lookup, "CHROMA_PORT", 8000)?,
            daily_limit: parse_var(&lookup, "CHROMA_DAILY_LIMIT", DEFAULT_DAILY_LIMIT)?,
            reap_interval: secs_var(&lookup, "CHROMA_REAP_INTERVAL_SECS", 3600)?,
            upstream_timeout: secs_var(&lookup, "CHROMA_UPSTREAM_TIMEOUT_SECS", 60)?,
            locale: locale_var(&lookup)?,
            trust_forwarded: bool_var(&lookup, "CHROMA_TRUST_FORWARDED", true)?,
        })
    }
}

/// Terminal client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub gateway_url: String,
    pub settings_path: PathBuf,
    pub locale: Locale,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let settings_path = lookup("CHROMA_SETTINGS_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".chroma-chat").join("settings.db")
            },
            PathBuf::from,
        );

        Ok(Self {
            gateway_url: lookup("CHROMA_GATEWAY_URL")
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            settings_path,
            locale: locale_var(&lookup)?,
            timeout: secs_var(&lookup, "CHROMA_UPSTREAM_TIMEOUT_SECS", 60)?,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value: raw,
        }),
    }
}

/// A whole number of seconds; zero is rejected
fn secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match parse_var(lookup, var, default)? {
        0 => Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
            reason: "must be at least 1 second".to_string(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn bool_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected true or false".to_string(),
        }),
    }
}

fn locale_var(lookup: &impl Fn(&str) -> Option<String>) -> Result<Locale, ConfigError> {
    match lookup("CHROMA_LOCALE") {
        None => Ok(Locale::default()),
        Some(raw) if raw.trim().is_empty() => Ok(Locale::default()),
        Some(raw) => Locale::parse(raw.trim()).ok_or_else(|| ConfigError::Invalid {
            var: "CHROMA_LOCALE",
            value: raw,
            reason: "expected en or zh".to_string(),
        }),
    }
}
