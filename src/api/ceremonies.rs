// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ceremony endpoints.
//!
//! Admins start, complete and cancel ceremonies. Guardians submit their own
//! share; the Guardian id comes from the authenticated channel, never from
//! the request body.

use std::fmt;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use zeroize::Zeroize;

use crate::{
    auth::{AdminOnly, GuardianAuth},
    ceremony::{
        CeremonyKind, CeremonySnapshot, CompletionOutcome, InitialSplitOutcome, SubmitReceipt,
    },
    error::ApiError,
    guardians::CeremonyRecord,
    state::AppState,
};

// ============================================================================
// Request Types
// ============================================================================

/// Request to open a ceremony.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartCeremonyRequest {
    /// `reshare` or `recovery`
    pub kind: CeremonyKind,
    /// Must equal the current threshold; defaults to it
    #[serde(default)]
    pub threshold: Option<u8>,
    /// Lifetime in seconds; defaults to the configured TTL
    #[serde(default)]
    pub ttl_secs: Option<i64>,
    /// Threshold of the split a reshare produces
    #[serde(default)]
    pub new_threshold: Option<u8>,
}

/// Request to split the MEK for the first time.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InitialSplitRequest {
    pub threshold: u8,
}

/// A Guardian's share submission.
#[derive(Deserialize, ToSchema)]
pub struct SubmitShareRequest {
    /// Encoded share (URL-safe base64)
    pub share: String,
}

impl fmt::Debug for SubmitShareRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubmitShareRequest([REDACTED])")
    }
}

impl Drop for SubmitShareRequest {
    fn drop(&mut self) {
        self.share.zeroize();
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Split the MEK across all eligible Guardians.
///
/// Runs once. Each share is returned exactly once and must be handed to its
/// Guardian out of band.
#[utoipa::path(
    post,
    path = "/v1/admin/ceremonies/initial-split",
    tag = "Ceremonies",
    request_body = InitialSplitRequest,
    responses(
        (status = 201, description = "Shares issued", body = InitialSplitOutcome),
        (status = 400, description = "Invalid threshold"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 409, description = "Initial split already completed")
    )
)]
pub async fn initial_split(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<InitialSplitRequest>,
) -> Result<(StatusCode, Json<InitialSplitOutcome>), ApiError> {
    let outcome = state.ceremonies.initial_split(request.threshold)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Open a reshare or recovery ceremony.
///
/// A recovery ceremony while sealed is the unlock ceremony.
#[utoipa::path(
    post,
    path = "/v1/admin/ceremonies",
    tag = "Ceremonies",
    request_body = StartCeremonyRequest,
    responses(
        (status = 201, description = "Ceremony opened", body = CeremonySnapshot),
        (status = 400, description = "Invalid parameters"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 409, description = "Ceremony already active or precondition failed"),
        (status = 503, description = "Sealed (reshare requires the MEK)")
    )
)]
pub async fn start_ceremony(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<StartCeremonyRequest>,
) -> Result<(StatusCode, Json<CeremonySnapshot>), ApiError> {
    let ttl = request.ttl_secs.map(chrono::Duration::seconds);
    let snapshot =
        state
            .ceremonies
            .start(request.kind, request.threshold, ttl, request.new_threshold)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Current (or most recent) ceremony.
#[utoipa::path(
    get,
    path = "/v1/admin/ceremonies",
    tag = "Ceremonies",
    responses(
        (status = 200, description = "Ceremony snapshot", body = CeremonySnapshot),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 404, description = "No ceremony has been started")
    )
)]
pub async fn current_ceremony(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<CeremonySnapshot>, ApiError> {
    state
        .seal
        .ceremony()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no ceremony"))
}

/// Cancel the open ceremony and drop its shares.
#[utoipa::path(
    delete,
    path = "/v1/admin/ceremonies",
    tag = "Ceremonies",
    responses(
        (status = 200, description = "Ceremony cancelled", body = CeremonySnapshot),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 409, description = "No active ceremony")
    )
)]
pub async fn cancel_ceremony(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<CeremonySnapshot>, ApiError> {
    Ok(Json(state.ceremonies.cancel()?))
}

/// Reconstruct from the collected shares and apply the ceremony's effect.
#[utoipa::path(
    post,
    path = "/v1/admin/ceremonies/complete",
    tag = "Ceremonies",
    responses(
        (status = 200, description = "Ceremony completed", body = CompletionOutcome),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 409, description = "No active ceremony or threshold not met"),
        (status = 422, description = "Shares did not reconstruct the MEK")
    )
)]
pub async fn complete_ceremony(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<CompletionOutcome>, ApiError> {
    Ok(Json(state.ceremonies.complete()?))
}

/// Durable history of finished ceremonies, oldest first.
#[utoipa::path(
    get,
    path = "/v1/admin/ceremonies/history",
    tag = "Ceremonies",
    responses(
        (status = 200, description = "Ceremony history", body = [CeremonyRecord]),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn ceremony_history(
    AdminOnly(_caller): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<Vec<CeremonyRecord>>, ApiError> {
    Ok(Json(state.registry.ceremonies()?))
}

/// Submit the calling Guardian's share.
#[utoipa::path(
    post,
    path = "/v1/ceremonies/shares",
    tag = "Ceremonies",
    request_body = SubmitShareRequest,
    responses(
        (status = 200, description = "Share accepted", body = SubmitReceipt),
        (status = 400, description = "Malformed share"),
        (status = 403, description = "Guardian not eligible"),
        (status = 409, description = "No active ceremony or duplicate submission")
    )
)]
pub async fn submit_share(
    GuardianAuth(guardian_id): GuardianAuth,
    State(state): State<AppState>,
    Json(request): Json<SubmitShareRequest>,
) -> Result<Json<SubmitReceipt>, ApiError> {
    let receipt = state
        .ceremonies
        .submit_share(&guardian_id, &request.share)?;
    Ok(Json(receipt))
}
