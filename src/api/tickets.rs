//! Support tickets. A ticket is only ever visible to, and editable by, its
//! author.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, FieldErrors, Payload, TicketDto};
use crate::constants::limits::{TICKET_SUBJECT_MAX, TICKET_TEXT_MAX};
use crate::db::repositories::ticket::{NewTicket, TicketChanges};
use crate::domain::{Principal, TicketStatus, TicketType};
use crate::permissions::{Permission, Resource};

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub message_type: TicketType,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub message_type: Option<TicketType>,
    pub subject: Option<String>,
    pub status: Option<TicketStatus>,
    pub text: Option<String>,
}

/// GET /tickets/
pub async fn list(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<Vec<TicketDto>>>, ApiError> {
    state
        .policy()
        .require(&principal, Permission::view(Resource::Ticket))?;

    let tickets = state
        .store()
        .ticket_repo()
        .list_for_user(principal.id)
        .await?;
    Ok(Json(ApiResponse::success(
        tickets.into_iter().map(TicketDto::from).collect(),
    )))
}

/// POST /tickets/
pub async fn create(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Payload(req): Payload<CreateTicketRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TicketDto>>), ApiError> {
    state
        .policy()
        .require(&principal, Permission::add(Resource::Ticket))?;

    let mut errors = FieldErrors::new();
    errors.required("subject", &req.subject, TICKET_SUBJECT_MAX);
    errors.required("text", &req.text, TICKET_TEXT_MAX);
    errors.into_result()?;

    let ticket = state
        .store()
        .ticket_repo()
        .create(NewTicket {
            user_id: principal.id,
            message_type: req.message_type,
            subject: req.subject,
            status: req.status,
            text: req.text,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(ticket.into()))))
}

/// GET /tickets/{id}/
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<TicketDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::view(Resource::Ticket))?;

    let ticket = state
        .store()
        .ticket_repo()
        .get_for_user(principal.id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket", id))?;
    Ok(Json(ApiResponse::success(ticket.into())))
}

/// PATCH and PUT /tickets/{id}/
pub async fn update(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
    Payload(req): Payload<UpdateTicketRequest>,
) -> Result<Json<ApiResponse<TicketDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::change(Resource::Ticket))?;

    let repo = state.store().ticket_repo();
    let ticket = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket", id))?;
    state.policy().can_change_ticket(&principal, ticket.user_id)?;

    let mut errors = FieldErrors::new();
    if let Some(subject) = req.subject.as_deref() {
        errors.required("subject", subject, TICKET_SUBJECT_MAX);
    }
    if let Some(text) = req.text.as_deref() {
        errors.required("text", text, TICKET_TEXT_MAX);
    }
    errors.into_result()?;

    let ticket = repo
        .update(
            ticket,
            TicketChanges {
                message_type: req.message_type,
                subject: req.subject,
                status: req.status,
                text: req.text,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(ticket.into())))
}

/// DELETE /tickets/{id}/
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::delete(Resource::Ticket))?;

    let repo = state.store().ticket_repo();
    let ticket = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ticket", id))?;
    state.policy().can_delete_ticket(&principal, ticket.user_id)?;

    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
