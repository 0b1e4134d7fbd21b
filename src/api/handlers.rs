//! HTTP request handlers

use super::types::{ChatRequest, ChatResponse, ErrorResponse, QuotaResponse};
use super::AppState;
use crate::governor::QuotaStatus;
use crate::llm::{find_provider, ErrorKind, ExchangeOptions, LlmError};
use crate::session::state::{clamp_temperature, DEFAULT_TEMPERATURE};
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::net::SocketAddr;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/quota", get(quota))
        .route("/api/models", get(list_models))
        .route("/version", get(get_version))
        .with_state(state)
}

/// Identity the governor counts against: the first forwarded address when
/// proxies are trusted, else the peer address.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

fn identity_of(state: &AppState, headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    client_identity(
        headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.trust_forwarded,
    )
}

// ============================================================
// Chat
// ============================================================

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let identity = identity_of(&state, &headers, connect_info);

    if req.messages.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".to_string()));
    }

    // Held until the exchange succeeds; dropped on any early return
    let reservation = state.governor.try_acquire(&identity).map_err(|status| {
        tracing::info!(%identity, count = status.count, limit = status.limit, "Daily quota exhausted");
        AppError::QuotaExceeded {
            message: ErrorKind::QuotaExceeded.user_message(state.locale).to_string(),
            quota: status,
        }
    })?;

    let provider = req
        .provider
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| state.registry.default_provider().to_string());
    let options = ExchangeOptions {
        temperature: req
            .temperature
            .filter(|t| t.is_finite())
            .map_or(DEFAULT_TEMPERATURE, clamp_temperature),
        system_prompt: req.system_prompt.clone(),
        provider: provider.clone(),
        model: req.model.clone().filter(|m| !m.trim().is_empty()),
    };

    let service = state.registry.get(&provider)?;
    let reply = service.complete(&req.messages, &options).await?;

    // Only successful exchanges count against the quota
    let quota = reservation.commit();

    let model = options
        .model
        .clone()
        .or_else(|| find_provider(&provider).map(|p| p.default_model.to_string()))
        .unwrap_or_default();
    let prompt = options.with_system_prompt(&req.messages);
    let usage = state
        .accountant
        .snapshot(&model, &provider, reply.usage, &prompt, &reply.text);

    tracing::info!(
        %identity,
        %provider,
        %model,
        remaining = quota.remaining,
        total_tokens = usage.total_tokens,
        context_usage_percent = usage.context_usage_percent,
        "Exchange served"
    );

    Ok(Json(ChatResponse::single(reply.text, Some(usage), quota)))
}

// ============================================================
// Quota, models, version
// ============================================================

async fn quota(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Json<QuotaResponse> {
    let identity = identity_of(&state, &headers, connect_info);
    let status = state.governor.check(&identity);
    Json(QuotaResponse { identity, status })
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    Json(state.registry.catalog())
}

async fn get_version() -> &'static str {
    concat!("chroma_chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    QuotaExceeded { message: String, quota: QuotaStatus },
    Upstream(LlmError),
}

impl From<LlmError> for AppError {
    fn from(error: LlmError) -> Self {
        AppError::Upstream(error)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::UpstreamUnreachable | ErrorKind::UpstreamProtocolError => StatusCode::BAD_GATEWAY,
        ErrorKind::UpstreamConfigError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Unclassified => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::QuotaExceeded { message, quota } => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorResponse::new(message)
                    .with_kind(ErrorKind::QuotaExceeded)
                    .with_quota(quota),
            ),
            AppError::Upstream(error) => {
                // Quota rejections come only from this gateway's governor
                let kind = match error.classify() {
                    ErrorKind::QuotaExceeded => ErrorKind::UpstreamUnreachable,
                    kind => kind,
                };
                tracing::warn!(error = %error.message, ?kind, "Upstream exchange failed");
                (status_for(kind), ErrorResponse::new(error.message).with_kind(kind))
            }
        };

        (status, Json(body)).into_response()
    }
}
