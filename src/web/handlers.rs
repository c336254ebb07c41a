//! HTTP request handlers.

use super::AppState;
use crate::confirm::{sign_token, verify_token, ConfirmTokenPayload};
use crate::datastore::DatastoreError;
use crate::store::{MAX_HISTORY, MAX_INCIDENTS};

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_HISTORY_LIMIT: usize = 48;
const DEFAULT_INCIDENT_LIMIT: usize = 50;

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Parse an optional `limit` parameter; anything outside `1..=max` falls
/// back to `default`.
fn parse_limit(raw: Option<&str>, default: usize, max: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|limit| (1..=max).contains(limit))
        .unwrap_or(default)
}

// ============================================================================
// Service
// ============================================================================

pub async fn handle_index() -> impl IntoResponse {
    Json(json!({
        "name": "heartbeat-backend",
        "ok": true,
        "routes": ["/api/v1/health", "/api/v1/status", "/api/v1/incidents", "/api/v1/history"],
    }))
}

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

// ============================================================================
// API: Monitoring
// ============================================================================

pub async fn handle_status(State(state): State<AppState>) -> Response {
    let targets = match state.datastore.fetch_targets().await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("Failed to load targets: {}", e);
            return match e {
                DatastoreError::Status(code) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "datastore returned non-OK", "status": code })),
                )
                    .into_response(),
                DatastoreError::Transport(_) => {
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "datastore connection error")
                }
                DatastoreError::Decode(_) => {
                    error_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid datastore response")
                }
            };
        }
    };

    Json(state.dispatcher.check_all(targets).await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default, alias = "target_id")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

pub async fn handle_history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Response {
    let project_id = query.project_id.as_deref().map(str::trim).unwrap_or_default();
    if project_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "project_id is required");
    }

    let limit = parse_limit(query.limit.as_deref(), DEFAULT_HISTORY_LIMIT, MAX_HISTORY);
    let items = state.store.history(project_id, limit);

    Json(json!({ "projectId": project_id, "items": items })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct IncidentsQuery {
    #[serde(default)]
    pub limit: Option<String>,
}

pub async fn handle_incidents(State(state): State<AppState>, Query(query): Query<IncidentsQuery>) -> Response {
    let limit = parse_limit(query.limit.as_deref(), DEFAULT_INCIDENT_LIMIT, MAX_INCIDENTS);
    Json(json!({ "items": state.store.incidents(limit) })).into_response()
}

// ============================================================================
// API: Email confirmation
// ============================================================================

/// Caller address: first `X-Forwarded-For` hop, else the peer address.
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return Ok(ClientIp(ip.to_string()));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientIp(peer.unwrap_or_else(|| "unknown".to_string())))
    }
}

#[derive(Debug, Deserialize)]
pub struct SendConfirmationRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
}

pub async fn handle_send_confirmation(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<SendConfirmationRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "invalid json");
    };

    let email = req.email.trim();
    let username = req.username.trim();
    if email.is_empty() || !email.contains('@') {
        return error_response(StatusCode::BAD_REQUEST, "email is required");
    }

    if state.store.is_confirmed(email) {
        return Json(json!({ "ok": true, "alreadyConfirmed": true })).into_response();
    }

    let too_many = || {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "ok": false, "error": "too many requests" })),
        )
            .into_response()
    };
    if !state.store.allow(&format!("confirm:ip:{ip}"), Duration::from_secs(60), 10) {
        return too_many();
    }
    if !state
        .store
        .allow(&format!("confirm:email:{}", email.to_lowercase()), Duration::from_secs(10 * 60), 5)
    {
        return too_many();
    }

    let exp = Utc::now().timestamp() + state.config.confirm_token_ttl().as_secs() as i64;
    let payload = ConfirmTokenPayload::new(email, username, exp);
    let token = match sign_token(&state.config.confirm_token_secret, &payload) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to sign confirmation token: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "could not create token");
        }
    };

    let Some(link) = confirm_link(&state.config.confirm_base_url, &token, email, username) else {
        tracing::error!("Invalid CONFIRM_BASE_URL {:?}", state.config.confirm_base_url);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "could not create token");
    };

    Json(json!({ "ok": true, "expiresAt": exp, "confirmLink": link })).into_response()
}

fn confirm_link(base: &str, token: &str, email: &str, username: &str) -> Option<String> {
    let mut params = vec![("token", token), ("email", email)];
    if !username.is_empty() {
        params.push(("username", username));
    }
    reqwest::Url::parse_with_params(&format!("{base}/confirm"), &params)
        .ok()
        .map(|url| url.to_string())
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub token: String,
}

pub async fn handle_confirm(State(state): State<AppState>, Query(query): Query<ConfirmQuery>) -> Response {
    let token = query.token.trim();
    if token.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "token is required");
    }

    match verify_token(&state.config.confirm_token_secret, token, Utc::now().timestamp()) {
        Ok(payload) => {
            state.store.mark_confirmed(&payload.email);
            tracing::info!("Confirmed email {}", payload.email);
            Json(json!({ "ok": true, "email": payload.email, "username": payload.username })).into_response()
        }
        Err(e) => {
            tracing::debug!("Rejected confirmation token: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "invalid or expired token" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IsConfirmedQuery {
    #[serde(default)]
    pub email: String,
}

pub async fn handle_is_confirmed(State(state): State<AppState>, Query(query): Query<IsConfirmedQuery>) -> Response {
    let email = query.email.trim();
    if email.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "email is required");
    }
    Json(json!({ "ok": true, "confirmed": state.store.is_confirmed(email) })).into_response()
}
