//! Notifications addressed to a single user, tagged with free-form types.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::users::invalid_pk;
use super::validation::validate_id;
use super::{
    ApiError, ApiResponse, AppState, FieldErrors, NotificationDto, NotificationTypeDto, Payload,
};
use crate::constants::limits::{NOTIFICATION_TEXT_MAX, NOTIFICATION_TYPE_MAX};
use crate::db::repositories::notification::NewNotification;
use crate::domain::Principal;
use crate::permissions::{Ownership, Permission, Resource};

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    /// Recipient; defaults to the caller.
    pub user: Option<i32>,
    #[serde(default)]
    pub is_news: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub types: Vec<String>,
}

async fn recipient_ownership(
    state: &AppState,
    user_id: i32,
) -> Result<Option<Ownership>, ApiError> {
    Ok(state
        .store()
        .user_repo()
        .get(user_id)
        .await?
        .map(|u| Ownership::new(u.id, u.admin_id)))
}

/// GET /notifications/
pub async fn list(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<Vec<NotificationDto>>>, ApiError> {
    let rows = state
        .store()
        .notification_repo()
        .list_for_user(principal.id)
        .await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter().map(NotificationDto::from).collect(),
    )))
}

/// POST /notifications/
pub async fn create(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Payload(req): Payload<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<NotificationDto>>), ApiError> {
    state
        .policy()
        .require(&principal, Permission::add(Resource::Notification))?;

    let types: Vec<String> = req.types.iter().map(|t| t.trim().to_string()).collect();

    let mut errors = FieldErrors::new();
    errors.required("text", &req.text, NOTIFICATION_TEXT_MAX);
    for name in &types {
        errors.required("types", name, NOTIFICATION_TYPE_MAX);
    }
    errors.into_result()?;

    let recipient_id = req.user.unwrap_or(principal.id);
    let recipient = recipient_ownership(&state, recipient_id)
        .await?
        .ok_or_else(|| FieldErrors::single("user", invalid_pk(recipient_id)))?;
    state.policy().can_notify(&principal, &recipient)?;

    let row = state
        .store()
        .notification_repo()
        .create(NewNotification {
            user_id: recipient_id,
            is_news: req.is_news,
            text: req.text,
            types,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(row.into()))))
}

/// GET /notifications/{id}/
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<NotificationDto>>, ApiError> {
    let id = validate_id(id)?;
    let row = state
        .store()
        .notification_repo()
        .get_for_user(principal.id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification", id))?;
    Ok(Json(ApiResponse::success(row.into())))
}

/// DELETE /notifications/{id}/
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::delete(Resource::Notification))?;

    let repo = state.store().notification_repo();
    let notification = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification", id))?;
    let recipient = recipient_ownership(&state, notification.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification", id))?;
    state.policy().can_notify(&principal, &recipient)?;

    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /notificationTypes/
pub async fn list_types(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<Vec<NotificationTypeDto>>>, ApiError> {
    state
        .policy()
        .require(&principal, Permission::view(Resource::NotificationType))?;

    let types = state.store().notification_repo().list_types().await?;
    Ok(Json(ApiResponse::success(
        types.into_iter().map(NotificationTypeDto::from).collect(),
    )))
}
