// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    audit::{AuditEvent, AuditEventType},
    auth::Role,
    ceremony::{
        CeremonyKind, CeremonySnapshot, CeremonyStatus, CompletionOutcome, InitialSplitOutcome,
        IssuedShare, SubmitReceipt,
    },
    guardians::{CeremonyRecord, Guardian, GuardianStatus, NewGuardian, RegistrySummary},
    seal::SealStatus,
    state::AppState,
};

pub mod audit;
pub mod ceremonies;
pub mod guardians;
pub mod health;
pub mod records;
pub mod seal;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Public
        .route("/seal/status", get(seal::seal_status))
        // Guardian
        .route("/ceremonies/shares", post(ceremonies::submit_share))
        // Admin
        .route("/admin/seal", post(seal::seal_now))
        .route(
            "/admin/ceremonies",
            get(ceremonies::current_ceremony)
                .post(ceremonies::start_ceremony)
                .delete(ceremonies::cancel_ceremony),
        )
        .route(
            "/admin/ceremonies/complete",
            post(ceremonies::complete_ceremony),
        )
        .route(
            "/admin/ceremonies/initial-split",
            post(ceremonies::initial_split),
        )
        .route(
            "/admin/ceremonies/history",
            get(ceremonies::ceremony_history),
        )
        .route(
            "/admin/guardians",
            get(guardians::list_guardians).post(guardians::create_guardian),
        )
        .route(
            "/admin/guardians/summary",
            get(guardians::guardian_summary),
        )
        .route(
            "/admin/guardians/{guardian_id}",
            delete(guardians::delete_guardian),
        )
        .route(
            "/admin/guardians/{guardian_id}/revoke",
            post(guardians::revoke_guardian),
        )
        .route("/admin/records", get(records::list_records))
        .route(
            "/admin/records/{record_id}",
            delete(records::destroy_record),
        )
        .route("/admin/audit", get(audit::get_audit_events));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        seal::seal_status,
        seal::seal_now,
        ceremonies::initial_split,
        ceremonies::start_ceremony,
        ceremonies::current_ceremony,
        ceremonies::cancel_ceremony,
        ceremonies::complete_ceremony,
        ceremonies::ceremony_history,
        ceremonies::submit_share,
        guardians::list_guardians,
        guardians::create_guardian,
        guardians::revoke_guardian,
        guardians::delete_guardian,
        guardians::guardian_summary,
        records::list_records,
        records::destroy_record,
        audit::get_audit_events
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            SealStatus,
            CeremonyKind,
            CeremonyStatus,
            CeremonySnapshot,
            SubmitReceipt,
            IssuedShare,
            InitialSplitOutcome,
            CompletionOutcome,
            ceremonies::StartCeremonyRequest,
            ceremonies::InitialSplitRequest,
            ceremonies::SubmitShareRequest,
            Guardian,
            GuardianStatus,
            NewGuardian,
            RegistrySummary,
            CeremonyRecord,
            records::RecordListResponse,
            AuditEvent,
            AuditEventType,
            audit::AuditLogResponse,
            Role
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Seal", description = "Seal status and manual sealing"),
        (name = "Ceremonies", description = "Key ceremonies and share submission"),
        (name = "Guardians", description = "Guardian registry"),
        (name = "Records", description = "Persona vault housekeeping"),
        (name = "Audit", description = "Custody audit log")
    )
)]
struct ApiDoc;
