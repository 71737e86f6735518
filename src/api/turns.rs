//! Appointments ("turns") between a customer, an optional coworker and an
//! optional product.
//!
//! `/turns/` is the tenant-wide schedule; `/readTurns/` exposes the same
//! tenant view without the write routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::types::double_option;
use super::users::invalid_pk;
use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, FieldErrors, Payload, TurnDto};
use crate::calendar::parse_visit_datetime;
use crate::constants::limits::TURN_DESCRIPTION_MAX;
use crate::db::repositories::turn::{NewTurn, TurnChanges};
use crate::domain::Principal;
use crate::permissions::{Ownership, Permission, Resource};

#[derive(Debug, Deserialize)]
pub struct CreateTurnRequest {
    pub user: Option<i32>,
    pub coworker: Option<i32>,
    pub product: Option<i32>,
    pub date_visit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTurnRequest {
    pub user: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub coworker: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub product: Option<Option<i32>>,
    pub date_visit: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

fn parse_date_visit(raw: &str, errors: &mut FieldErrors) -> Option<DateTime<Utc>> {
    let parsed = parse_visit_datetime(raw);
    if parsed.is_none() {
        errors.add(
            "date_visit",
            "Datetime has wrong format. Use YYYY-MM-DD HH:MM[:SS] (Gregorian or Jalali) or RFC 3339.",
        );
    }
    parsed
}

/// A turn participant must exist (400 otherwise) and belong to the
/// principal's tenant (403 otherwise).
async fn check_participant(
    state: &AppState,
    principal: &Principal,
    field: &str,
    user_id: i32,
) -> Result<(), ApiError> {
    let user = state
        .store()
        .user_repo()
        .get(user_id)
        .await?
        .ok_or_else(|| FieldErrors::single(field, invalid_pk(user_id)))?;

    state
        .policy()
        .can_schedule_for(principal, &Ownership::new(user.id, user.admin_id))?;
    Ok(())
}

/// Products must be owned by someone in the principal's tenant.
async fn check_product(
    state: &AppState,
    principal: &Principal,
    product_id: i32,
) -> Result<(), ApiError> {
    let store = state.store();
    let owner = match store.product_repo().get(product_id).await? {
        Some(product) => store.user_repo().get(product.user_id).await?,
        None => None,
    };

    let root = principal.tenant_root();
    let in_tenant = owner.is_some_and(|o| o.id == root || o.admin_id == Some(root));
    if !in_tenant {
        return Err(FieldErrors::single("product", invalid_pk(product_id)).into());
    }
    Ok(())
}

/// GET /turns/
pub async fn list(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<Vec<TurnDto>>>, ApiError> {
    state
        .policy()
        .require(&principal, Permission::view(Resource::Turn))?;

    let turns = state
        .store()
        .turn_repo()
        .list_for_tenant(principal.tenant_root())
        .await?;
    Ok(Json(ApiResponse::success(
        turns.into_iter().map(TurnDto::from).collect(),
    )))
}

/// POST /turns/
///
/// The coworker defaults to the caller.
pub async fn create(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Payload(req): Payload<CreateTurnRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TurnDto>>), ApiError> {
    state
        .policy()
        .require(&principal, Permission::add(Resource::Turn))?;

    let mut errors = FieldErrors::new();
    if req.user.is_none() {
        errors.add("user", "This field is required.");
    }
    let date_visit = match req.date_visit.as_deref() {
        Some(raw) => parse_date_visit(raw, &mut errors),
        None => {
            errors.add("date_visit", "This field is required.");
            None
        }
    };
    if let Some(description) = req.description.as_deref() {
        errors.max_len("description", description, TURN_DESCRIPTION_MAX);
    }
    errors.into_result()?;

    let (Some(user_id), Some(date_visit)) = (req.user, date_visit) else {
        return Err(ApiError::validation("Incomplete turn"));
    };

    check_participant(&state, &principal, "user", user_id).await?;
    let coworker_id = req.coworker.unwrap_or(principal.id);
    if coworker_id != principal.id {
        check_participant(&state, &principal, "coworker", coworker_id).await?;
    }
    if let Some(product_id) = req.product {
        check_product(&state, &principal, product_id).await?;
    }

    let turn = state
        .store()
        .turn_repo()
        .create(NewTurn {
            user_id,
            coworker_id: Some(coworker_id),
            product_id: req.product,
            date_visit,
            description: req.description,
        })
        .await?;

    tracing::info!(
        turn_id = turn.id,
        customer = user_id,
        coworker = coworker_id,
        "Scheduled turn"
    );

    Ok((StatusCode::CREATED, Json(ApiResponse::success(turn.into()))))
}

/// GET /turns/{id}/
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<TurnDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::view(Resource::Turn))?;

    let turn = state
        .store()
        .turn_repo()
        .get_for_tenant(principal.tenant_root(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Turn", id))?;
    Ok(Json(ApiResponse::success(turn.into())))
}

/// PATCH and PUT /turns/{id}/
pub async fn update(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
    Payload(req): Payload<UpdateTurnRequest>,
) -> Result<Json<ApiResponse<TurnDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::change(Resource::Turn))?;

    let repo = state.store().turn_repo();
    let turn = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Turn", id))?;
    check_participant(&state, &principal, "user", turn.user_id).await?;

    let mut errors = FieldErrors::new();
    let date_visit = match req.date_visit.as_deref() {
        Some(raw) => parse_date_visit(raw, &mut errors),
        None => None,
    };
    if let Some(Some(description)) = req.description.as_ref() {
        errors.max_len("description", description, TURN_DESCRIPTION_MAX);
    }
    errors.into_result()?;

    if let Some(user_id) = req.user {
        check_participant(&state, &principal, "user", user_id).await?;
    }
    if let Some(Some(coworker_id)) = req.coworker {
        check_participant(&state, &principal, "coworker", coworker_id).await?;
    }
    if let Some(Some(product_id)) = req.product {
        check_product(&state, &principal, product_id).await?;
    }

    let turn = repo
        .update(
            turn,
            TurnChanges {
                user_id: req.user,
                coworker_id: req.coworker,
                product_id: req.product,
                date_visit,
                description: req.description,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(turn.into())))
}

/// DELETE /turns/{id}/
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::delete(Resource::Turn))?;

    let repo = state.store().turn_repo();
    let turn = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Turn", id))?;
    check_participant(&state, &principal, "user", turn.user_id).await?;

    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /readTurns/
pub async fn list_own(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<Vec<TurnDto>>>, ApiError> {
    state
        .policy()
        .require(&principal, Permission::view(Resource::Turn))?;

    let turns = state
        .store()
        .turn_repo()
        .list_for_tenant(principal.tenant_root())
        .await?;
    Ok(Json(ApiResponse::success(
        turns.into_iter().map(TurnDto::from).collect(),
    )))
}

/// GET /readTurns/{id}/
pub async fn retrieve_own(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<TurnDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::view(Resource::Turn))?;

    let turn = state
        .store()
        .turn_repo()
        .get_for_tenant(principal.tenant_root(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Turn", id))?;
    Ok(Json(ApiResponse::success(turn.into())))
}
