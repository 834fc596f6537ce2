// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault housekeeping endpoints (admin only).
//!
//! Record contents never pass through this surface.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    audit::{AuditEvent, AuditEventType},
    auth::AdminOnly,
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordListResponse {
    pub record_ids: Vec<String>,
    pub total: usize,
}

/// List stored record ids.
#[utoipa::path(
    get,
    path = "/v1/admin/records",
    tag = "Records",
    responses(
        (status = 200, description = "Record ids", body = RecordListResponse),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn list_records(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<RecordListResponse>, ApiError> {
    let record_ids = state.vault.list_ids()?;
    let total = record_ids.len();
    Ok(Json(RecordListResponse { record_ids, total }))
}

/// Overwrite and delete a record.
#[utoipa::path(
    delete,
    path = "/v1/admin/records/{record_id}",
    tag = "Records",
    params(("record_id" = String, Path, description = "Record id")),
    responses(
        (status = 204, description = "Record destroyed"),
        (status = 400, description = "Invalid record id"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 404, description = "Record not found")
    )
)]
pub async fn destroy_record(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let result = state.vault.destroy(&record_id);
    let event = AuditEvent::new(AuditEventType::RecordDestroyed)
        .with_actor(caller.actor())
        .with_resource("record", record_id);
    match result {
        Ok(()) => {
            state.audit.record(event);
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            state.audit.record(event.failed(e.to_string()));
            Err(e.into())
        }
    }
}
