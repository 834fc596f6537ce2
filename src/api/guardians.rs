// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian management endpoints (admin only).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    audit::{AuditEvent, AuditEventType},
    auth::AdminOnly,
    error::ApiError,
    guardians::{Guardian, NewGuardian, RegistrySummary},
    state::AppState,
};

/// List all Guardians, ordered by share index.
#[utoipa::path(
    get,
    path = "/v1/admin/guardians",
    tag = "Guardians",
    responses(
        (status = 200, description = "Guardians", body = [Guardian]),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn list_guardians(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<Vec<Guardian>>, ApiError> {
    Ok(Json(state.registry.list()?))
}

/// Enroll a Guardian in `pending` state.
#[utoipa::path(
    post,
    path = "/v1/admin/guardians",
    tag = "Guardians",
    request_body = NewGuardian,
    responses(
        (status = 201, description = "Guardian enrolled", body = Guardian),
        (status = 400, description = "Invalid display name or share index"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 409, description = "Share index already assigned")
    )
)]
pub async fn create_guardian(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<NewGuardian>,
) -> Result<(StatusCode, Json<Guardian>), ApiError> {
    let guardian = state.registry.add(request)?;
    state.audit.record(
        AuditEvent::new(AuditEventType::GuardianAdded)
            .with_actor(caller.actor())
            .with_resource("guardian", guardian.guardian_id.clone())
            .with_details(serde_json::json!({ "share_index": guardian.share_index })),
    );
    Ok((StatusCode::CREATED, Json(guardian)))
}

/// Revoke a Guardian. Not reversible.
#[utoipa::path(
    post,
    path = "/v1/admin/guardians/{guardian_id}/revoke",
    tag = "Guardians",
    params(("guardian_id" = String, Path, description = "Guardian id")),
    responses(
        (status = 200, description = "Guardian revoked", body = Guardian),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 404, description = "Guardian not found"),
        (status = 409, description = "Guardian already revoked")
    )
)]
pub async fn revoke_guardian(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
    Path(guardian_id): Path<String>,
) -> Result<Json<Guardian>, ApiError> {
    let guardian = state.registry.revoke(&guardian_id)?;
    state.audit.record(
        AuditEvent::new(AuditEventType::GuardianRevoked)
            .with_actor(caller.actor())
            .with_resource("guardian", guardian_id),
    );
    Ok(Json(guardian))
}

/// Hard-delete a Guardian row.
#[utoipa::path(
    delete,
    path = "/v1/admin/guardians/{guardian_id}",
    tag = "Guardians",
    params(("guardian_id" = String, Path, description = "Guardian id")),
    responses(
        (status = 204, description = "Guardian deleted"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 404, description = "Guardian not found")
    )
)]
pub async fn delete_guardian(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
    Path(guardian_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.delete(&guardian_id)?;
    state.audit.record(
        AuditEvent::new(AuditEventType::GuardianDeleted)
            .with_actor(caller.actor())
            .with_resource("guardian", guardian_id),
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Guardian counts and the current sharing scheme.
#[utoipa::path(
    get,
    path = "/v1/admin/guardians/summary",
    tag = "Guardians",
    responses(
        (status = 200, description = "Registry summary", body = RegistrySummary),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn guardian_summary(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<RegistrySummary>, ApiError> {
    Ok(Json(state.registry.summary()?))
}
