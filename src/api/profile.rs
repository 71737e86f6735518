//! The caller's own account.

use axum::{Json, extract::State};
use serde::Deserialize;
use std::sync::Arc;

use super::users::{UserUpdateRequest, prepare_changes};
use super::{ApiError, ApiResponse, AppState, FieldErrors, Payload, UserDto};
use crate::db::repositories::user::verify_password;
use crate::domain::Principal;

/// Same fields as a user update. The admin-only ones (`admin`, `is_active`
/// and the billing counters) are rejected. A password change must be
/// confirmed with the current password.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub current_password: Option<String>,
    #[serde(flatten)]
    pub fields: UserUpdateRequest,
}

/// GET /EditProfile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user = state
        .store()
        .user_repo()
        .get(principal.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", principal.id))?;

    Ok(Json(ApiResponse::success(user.into())))
}

/// PATCH /EditProfile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Payload(req): Payload<ProfileUpdateRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let ProfileUpdateRequest {
        current_password,
        fields,
    } = req;

    let locked = [
        ("admin", fields.admin.is_some()),
        ("is_active", fields.is_active.is_some()),
        ("credit", fields.credit.is_some()),
        ("point", fields.point.is_some()),
        ("remained_sms", fields.remained_sms.is_some()),
        ("commission", fields.commission.is_some()),
    ];
    let mut errors = FieldErrors::new();
    for (field, _) in locked.iter().filter(|(_, present)| *present) {
        errors.add(field, "This field cannot be changed from the profile.");
    }
    errors.into_result()?;

    let repo = state.store().user_repo();
    if let Some(new_password) = fields.password.as_deref() {
        let user = repo
            .get(principal.id)
            .await?
            .ok_or_else(|| ApiError::not_found("User", principal.id))?;

        let Some(current) = current_password.as_deref() else {
            return Err(
                FieldErrors::single("current_password", "This field is required.").into(),
            );
        };
        if !verify_password(&user.password_hash, current).await? {
            return Err(
                FieldErrors::single("current_password", "Current password is incorrect.").into(),
            );
        }
        if current == new_password {
            return Err(FieldErrors::single(
                "password",
                "New password must be different from current password.",
            )
            .into());
        }
    }

    let password_changed = fields.password.is_some();
    let changes = prepare_changes(&state, principal.id, fields).await?;

    let user = repo
        .update(principal.id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User", principal.id))?;

    if password_changed {
        tracing::info!(user_id = principal.id, "Password changed");
    }

    Ok(Json(ApiResponse::success(user.into())))
}
