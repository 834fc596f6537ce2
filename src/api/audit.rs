// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit log queries (admin only).

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{audit::AuditEvent, auth::AdminOnly, error::ApiError, state::AppState};

/// Query parameters for audit log queries.
#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Day to read (YYYY-MM-DD, UTC); defaults to today.
    pub date: Option<String>,
}

/// Response for audit log queries.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub date: String,
    pub events: Vec<AuditEvent>,
    pub total: usize,
}

/// Read one day of audit events.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Audit",
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Audit events", body = AuditLogResponse),
        (status = 400, description = "Invalid date"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn get_audit_events(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let date = params
        .date
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
        return Err(ApiError::bad_request(format!("invalid date: {date}")));
    }
    let events = state.audit.read_events(&date)?;
    let total = events.len();
    Ok(Json(AuditLogResponse {
        date,
        events,
        total,
    }))
}
