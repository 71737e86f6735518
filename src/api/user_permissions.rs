//! Reading and replacing a sub-user's direct permission grants.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::validate_id;
use super::{
    ApiError, ApiResponse, AppState, FieldErrors, Payload, PermissionDto, UserPermissionsDto,
};
use crate::domain::Principal;
use crate::entities::users;
use crate::permissions::{CapabilitySet, Ownership, Permission, Resource};

/// A permission given either by numeric id or by codename
/// (`view_user`, `users.add_turn`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PermissionRef {
    Id(i32),
    Codename(String),
}

impl PermissionRef {
    fn resolve(&self) -> Option<Permission> {
        match self {
            Self::Id(id) => Permission::from_id(*id),
            Self::Codename(codename) => Permission::parse_codename(codename)
                .or_else(|| codename.parse().ok().and_then(Permission::from_id)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Codename(codename) => codename.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePermissionsRequest {
    #[serde(default)]
    pub permission_id: Vec<PermissionRef>,
}

fn resolve_all(refs: &[PermissionRef]) -> Result<CapabilitySet, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut set = CapabilitySet::empty();
    for r in refs {
        match r.resolve() {
            Some(permission) => set.insert(permission),
            None => errors.add(
                "permission_id",
                format!("Invalid pk \"{}\" - object does not exist.", r.describe()),
            ),
        }
    }
    if errors.is_empty() { Ok(set) } else { Err(errors) }
}

async fn load_managed_user(
    state: &AppState,
    principal: &Principal,
    id: i32,
) -> Result<users::Model, ApiError> {
    let user = state
        .store()
        .user_repo()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    state
        .policy()
        .can_manage_permissions(principal, &Ownership::new(user.id, user.admin_id))?;
    Ok(user)
}

/// GET /UserPermissionList/{id}
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserPermissionsDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::view(Resource::User))?;

    let user = load_managed_user(&state, &principal, id).await?;

    let repo = state.store().permission_repo();
    let direct = repo.direct(user.id).await?;
    let effective = direct.union(repo.via_groups(user.id).await?);
    let groups = repo.group_names(user.id).await?;

    Ok(Json(ApiResponse::success(UserPermissionsDto {
        user: user.id,
        permissions: direct.iter().map(PermissionDto::from).collect(),
        groups,
        effective: effective.iter().map(Permission::codename).collect(),
    })))
}

/// PATCH /ChangeUserPermissionList/{id}
///
/// Replaces the user's direct grants. The caller can only hand out
/// permissions it holds itself.
pub async fn change_permissions(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
    Payload(req): Payload<ChangePermissionsRequest>,
) -> Result<StatusCode, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::change(Resource::User))?;

    let user = load_managed_user(&state, &principal, id).await?;
    let requested = resolve_all(&req.permission_id)?;
    state.policy().can_grant(&principal, &requested)?;

    state
        .store()
        .permission_repo()
        .replace_direct(user.id, requested)
        .await?;

    tracing::info!(
        user_id = user.id,
        changed_by = principal.id,
        permissions = ?requested.ids().collect::<Vec<_>>(),
        "Replaced user permissions"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ids_and_codenames() {
        let refs: Vec<PermissionRef> =
            serde_json::from_str(r#"[1, "add_turn", "users.view_ticket", "3"]"#).unwrap();
        let set = resolve_all(&refs).unwrap();
        assert!(set.contains(Permission::view(Resource::User)));
        assert!(set.contains(Permission::add(Resource::Turn)));
        assert!(set.contains(Permission::view(Resource::Ticket)));
        assert!(set.contains(Permission::change(Resource::User)));
        assert_eq!(set.iter().count(), 4);
    }

    #[test]
    fn test_unknown_permissions_are_reported() {
        let refs: Vec<PermissionRef> = serde_json::from_str(r#"[1, 99, "fly_user"]"#).unwrap();
        let errors = resolve_all(&refs).unwrap_err();
        assert!(errors.contains("permission_id"));
    }
}
