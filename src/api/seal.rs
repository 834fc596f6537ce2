// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seal status and manual sealing.

use axum::{extract::State, Json};

use crate::{auth::AdminOnly, seal::SealStatus, state::AppState};

/// Public seal status.
///
/// Carries no share values, Guardian identities or key material, so it is
/// served without authentication.
#[utoipa::path(
    get,
    path = "/v1/seal/status",
    tag = "Seal",
    responses(
        (status = 200, description = "Seal status", body = SealStatus)
    )
)]
pub async fn seal_status(State(state): State<AppState>) -> Json<SealStatus> {
    Json(state.seal.status())
}

/// Drop the MEK and cancel any open ceremony.
///
/// Sealing a sealed service is a no-op. An interrupted ceremony is written
/// to the history as cancelled.
#[utoipa::path(
    post,
    path = "/v1/admin/seal",
    tag = "Seal",
    responses(
        (status = 200, description = "Service sealed", body = SealStatus),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn seal_now(
    AdminOnly(caller): AdminOnly,
    State(state): State<AppState>,
) -> Json<SealStatus> {
    state.ceremonies.seal_now(caller.actor());
    Json(state.seal.status())
}
