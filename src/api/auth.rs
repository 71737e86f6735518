use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, FieldErrors, Payload};
use crate::services::{AccessToken, TokenPair};

#[derive(Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: String,
}

/// Id of the user a response was produced for. The auth middleware attaches
/// it to the response so outer layers (request logging) can see it.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub i32);

/// Resolves `Authorization: Bearer <access token>` into a [`Principal`]
/// request extension. Refresh tokens are rejected here.
///
/// [`Principal`]: crate::domain::Principal
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&headers).ok_or_else(|| {
        ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
    })?;

    let principal = state.auth().authenticate(token).await?;
    let user_id = principal.id;

    tracing::Span::current().record("user_id", user_id);
    request.extensions_mut().insert(principal);

    let mut response = next.run(request).await;
    response.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(response)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// POST /auth/token
pub async fn obtain_token(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<TokenRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, ApiError> {
    let mut errors = FieldErrors::new();
    if payload.username.is_empty() {
        errors.add("username", "This field is required.");
    }
    if payload.password.is_empty() {
        errors.add("password", "This field is required.");
    }
    errors.into_result()?;

    let pair = state
        .auth()
        .login(&payload.username, &payload.password)
        .await?;

    tracing::info!(username = %payload.username, "Issued token pair");
    Ok(Json(ApiResponse::success(pair)))
}

/// POST /auth/token/refresh
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<RefreshRequest>,
) -> Result<Json<ApiResponse<AccessToken>>, ApiError> {
    if payload.refresh.is_empty() {
        return Err(FieldErrors::single("refresh", "This field is required.").into());
    }

    let access = state.auth().refresh(&payload.refresh).await?;
    Ok(Json(ApiResponse::success(access)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), None);
    }
}
