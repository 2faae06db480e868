//! HTTP scan-ingest and admin surface (C8, spec.md §4.8/§6). Every handler
//! takes `State<Arc<AppState>>`; errors are mapped to the wire `ApiError`
//! shape at the edge, never inside a core service.

use std::sync::Arc;

use aln_protocol::{
    AdminAuthRequest, AdminAuthResponse, ApiError, BatchScanEntryResult, BatchScanRequest,
    BatchScanResponse, ErrorCode, HealthResponse, LogsQuery, LogsResponse, ScanHttpResponse,
    TokensResponse, TransactionStatus,
};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/admin/auth", post(admin_auth))
        .route("/api/admin/logs", get(admin_logs))
        .route("/api/tokens", get(list_tokens))
        .route("/api/session", get(get_session))
        .route("/api/state", get(get_state))
        .route("/api/scan", post(submit_scan))
        .route("/api/scan/batch", post(submit_batch))
}

fn api_error(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    (status, Json(ApiError::new(code, message))).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    match bearer_token(headers) {
        Some(token) if state.admin_auth.is_valid(token).await => Ok(()),
        _ => Err(api_error(
            StatusCode::UNAUTHORIZED,
            ErrorCode::AuthRequired,
            "valid bearer token required",
        )),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.uptime_secs(),
        timestamp: Utc::now(),
    })
}

async fn admin_auth(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AdminAuthRequest>,
) -> Response {
    match state.admin_auth.issue(&body.password).await {
        Some((token, expires_in)) => {
            Json(AdminAuthResponse { token, expires_in }).into_response()
        }
        None => api_error(StatusCode::UNAUTHORIZED, ErrorCode::AuthRequired, "invalid password"),
    }
}

async fn admin_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    let logs = state.log_buffer.recent(query.lines, query.level.as_deref());
    Json(LogsResponse {
        count: logs.len(),
        logs,
        timestamp: Utc::now(),
    })
    .into_response()
}

async fn list_tokens(State(state): State<Arc<AppState>>) -> Json<TokensResponse> {
    let tokens = state.catalog.all().await;
    Json(TokensResponse {
        count: tokens.len(),
        tokens,
        last_update: Utc::now(),
    })
}

async fn get_session(State(state): State<Arc<AppState>>) -> Response {
    match state.session_service.get_current_session().await {
        Some(session) => Json(session).into_response(),
        None => api_error(StatusCode::NOT_FOUND, ErrorCode::NotFound, "no active session"),
    }
}

async fn get_state(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let snapshot = state.projection.snapshot_with_etag().await;
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if if_none_match == snapshot.etag {
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }
    let mut response = Json(snapshot.state).into_response();
    if let Ok(value) = HeaderValue::from_str(&snapshot.etag) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}

async fn submit_scan(
    State(state): State<Arc<AppState>>,
    Json(scan): Json<aln_protocol::ScanRequest>,
) -> Response {
    if !aln_protocol::validate::is_valid_token_id(&scan.token_id) {
        return api_error(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, "invalid tokenId");
    }
    if !aln_protocol::validate::is_valid_device_id(&scan.device_id) {
        return api_error(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, "invalid deviceId");
    }

    let result = state.pipeline.submit(scan, true).await;
    let status = match result.status {
        TransactionStatus::Accepted => StatusCode::OK,
        TransactionStatus::Duplicate => StatusCode::CONFLICT,
        TransactionStatus::Rejected => StatusCode::CONFLICT,
        TransactionStatus::Error => StatusCode::BAD_REQUEST,
    };
    let token_id = result
        .transaction
        .as_ref()
        .map(|t| t.token_id.clone())
        .unwrap_or_default();
    (
        status,
        Json(ScanHttpResponse {
            status: result.status,
            message: result.message,
            token_id,
            video_queued: result.video_queued,
            wait_time: result.wait_time,
        }),
    )
        .into_response()
}

async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<BatchScanRequest>,
) -> Response {
    tracing::info!(batch_id = %batch.batch_id, count = batch.transactions.len(), "processing scan batch");
    let mut results = Vec::with_capacity(batch.transactions.len());
    for scan in batch.transactions {
        let token_id = scan.token_id.clone();
        let result = state.pipeline.submit(scan, true).await;
        results.push(BatchScanEntryResult {
            status: result.status,
            token_id,
            message: result.message,
            video_queued: result.video_queued,
        });
    }
    Json(BatchScanResponse { results }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::log_capture::LogBuffer;
    use axum::body::to_bytes;
    use clap::Parser;

    async fn harness() -> Arc<AppState> {
        let mut dir = std::env::temp_dir();
        dir.push(format!("aln-http-test-{}", uuid::Uuid::new_v4()));
        let config = Config::parse_from([
            "aln-orchestrator",
            "--admin-password",
            "secret",
            "--vlc-host",
            "127.0.0.1",
            "--vlc-port",
            "1",
            "--video-playback-enabled",
            "false",
            "--state-dir",
            dir.to_str().unwrap(),
            "--token-catalog-path",
            "does-not-exist.json",
        ]);
        let bootstrap = AppState::bootstrap(config, Arc::new(LogBuffer::new()))
            .await
            .unwrap();
        bootstrap.state
    }

    #[tokio::test]
    async fn health_reports_online() {
        let state = harness().await;
        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "online");
    }

    #[tokio::test]
    async fn admin_auth_rejects_wrong_password() {
        let state = harness().await;
        let response = admin_auth(
            State(state),
            Json(AdminAuthRequest {
                password: "wrong".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_logs_requires_bearer_token() {
        let state = harness().await;
        let response = admin_logs(State(state), HeaderMap::new(), Query(LogsQuery::default())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn get_state_returns_304_on_matching_etag() {
        let state = harness().await;
        let first = get_state(State(state.clone()), HeaderMap::new()).await;
        let etag = first.headers().get(header::ETAG).unwrap().clone();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, etag);
        let second = get_state(State(state), headers).await;
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn submit_scan_rejects_invalid_token_id() {
        let state = harness().await;
        let scan = aln_protocol::ScanRequest {
            token_id: "has a space".into(),
            team_id: Some("001".into()),
            device_id: "gm-1".into(),
            device_type: aln_protocol::DeviceType::Gm,
            mode: None,
            timestamp: None,
            client_id: None,
        };
        let response = submit_scan(State(state), Json(scan)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn submit_scan_rejects_unknown_token() {
        let state = harness().await;
        let scan = aln_protocol::ScanRequest {
            token_id: "unknown_token".into(),
            team_id: Some("001".into()),
            device_id: "gm-1".into(),
            device_type: aln_protocol::DeviceType::Gm,
            mode: None,
            timestamp: None,
            client_id: None,
        };
        let response = submit_scan(State(state), Json(scan)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: ScanHttpResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.message, "Invalid token");
    }
}
