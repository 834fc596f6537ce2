// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Caller identity could not be established or is not allowed.
#[derive(Debug)]
pub enum AuthError {
    /// No role header present
    MissingRole,
    /// Role header is not a known role
    InvalidRole,
    /// Guardian role without a Guardian id
    MissingGuardianId,
    /// Role is not allowed on this route
    InsufficientPermissions,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingRole => "missing_role",
            AuthError::InvalidRole => "invalid_role",
            AuthError::MissingGuardianId => "missing_guardian_id",
            AuthError::InsufficientPermissions => "insufficient_permissions",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingRole | AuthError::InvalidRole | AuthError::MissingGuardianId => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingRole => write!(f, "Caller role header is required"),
            AuthError::InvalidRole => write!(f, "Caller role is not recognized"),
            AuthError::MissingGuardianId => write!(f, "Guardian id header is required"),
            AuthError::InsufficientPermissions => {
                write!(f, "Insufficient permissions for this operation")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
