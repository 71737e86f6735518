use axum::{
    Json,
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use super::{ApiError, ApiResponse, AppState};
use crate::db::repositories::request_log::NewRequestLog;

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled or failed to initialize".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    )
}

#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthDto>>, ApiError> {
    state.store().ping().await?;
    Ok(Json(ApiResponse::success(HealthDto {
        status: "ok",
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })))
}

pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().to_string();
    let uri = req.uri().path().to_string();

    let matched_path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string());

    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %uri,
        route = matched_path.clone(),
        user_id = tracing::field::Empty,
    );

    async move {
        let mut response = next.run(req).await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = response.status().as_u16();

        let outcome = if status >= 500 {
            "error"
        } else if status >= 400 {
            "client_error"
        } else {
            "success"
        };

        if let Some(AuthenticatedUser(user_id)) = response.extensions().get() {
            tracing::Span::current().record("user_id", user_id);
        }

        // Matched route keeps label cardinality bounded
        let metrics_path = matched_path.as_deref().unwrap_or(&uri);
        let labels = [
            ("method", method.clone()),
            ("path", metrics_path.to_string()),
            ("status", status.to_string()),
        ];

        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        info!(
            event = "http_request_finished",
            duration_ms = duration_ms,
            status_code = status,
            user_agent = %user_agent,
            outcome = %outcome,
            "Request finished"
        );

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
    .instrument(span)
    .await
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

/// Persists one audit row per API request: caller, client address, referer,
/// user agent, URL and method. Failures are logged and never affect the
/// response.
pub async fn request_log_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !state.config().observability.request_log_enabled {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let headers = req.headers();
    let mut entry = NewRequestLog {
        user_id: None,
        ip_address: client_ip(headers, peer),
        referer: header_string(headers, header::REFERER),
        user_agent: header_string(headers, header::USER_AGENT),
        url: Some(req.uri().to_string()),
        method: req.method().to_string(),
    };

    let response = next.run(req).await;

    entry.user_id = response
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|AuthenticatedUser(id)| *id);

    if let Err(e) = state.store().request_log_repo().add(entry).await {
        warn!(error = %e, "Failed to record request log");
    }

    response
}

/// First `X-Forwarded-For` hop, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<String>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or(peer)
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, None), "unknown");
        assert_eq!(
            client_ip(&headers, Some("10.0.0.1".to_string())),
            "10.0.0.1"
        );

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(
            client_ip(&headers, Some("10.0.0.1".to_string())),
            "203.0.113.7"
        );
    }
}
