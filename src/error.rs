// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP error mapping.
//!
//! Every domain error becomes an [`ApiError`] with a JSON body
//! `{"error": "..."}`. A sealed service answers `503` so operators can tell
//! a locked service from a broken one. Storage and database failures are
//! logged and reported as a generic `500`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::ceremony::{CeremonyError, KeyCeremonyError};
use crate::crypto::CryptoError;
use crate::guardians::RegistryError;
use crate::seal::SealError;
use crate::vault::VaultError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Log the cause and hide it from the caller.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "Internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<SealError> for ApiError {
    fn from(e: SealError) -> Self {
        match e {
            SealError::Sealed => ApiError::unavailable(e.to_string()),
            SealError::AlreadyUnsealed => ApiError::conflict(e.to_string()),
            SealError::InvalidKeyLength(_) => ApiError::bad_request(e.to_string()),
            SealError::Ceremony(inner) => inner.into(),
        }
    }
}

impl From<CeremonyError> for ApiError {
    fn from(e: CeremonyError) -> Self {
        match e {
            CeremonyError::InvalidParameters(_) => ApiError::bad_request(e.to_string()),
            CeremonyError::GuardianIneligible(_) => {
                ApiError::new(StatusCode::FORBIDDEN, e.to_string())
            }
            CeremonyError::ShareMismatch(_) => ApiError::unprocessable(e.to_string()),
            CeremonyError::NoActiveCeremony
            | CeremonyError::DuplicateSubmission(_)
            | CeremonyError::DuplicateShareIndex(_)
            | CeremonyError::AlreadyActive
            | CeremonyError::ThresholdNotMet { .. }
            | CeremonyError::PreconditionFailed(_) => ApiError::conflict(e.to_string()),
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidParameters(_)
            | CryptoError::MalformedShare(_)
            | CryptoError::ShareCountOutOfRange(_)
            | CryptoError::InvalidKeyLength(_) => ApiError::bad_request(e.to_string()),
            CryptoError::InsufficientShares { .. } | CryptoError::AuthenticationFailed => {
                ApiError::unprocessable(e.to_string())
            }
            CryptoError::RandomUnavailable => ApiError::internal(e),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(_) => ApiError::not_found(e.to_string()),
            RegistryError::InvalidParameters(_) => ApiError::bad_request(e.to_string()),
            RegistryError::InvalidTransition { .. }
            | RegistryError::ShareIndexTaken(_)
            | RegistryError::ShareIndexExhausted => ApiError::conflict(e.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::InvalidRecordId(_) | VaultError::PathTraversalRejected => {
                ApiError::bad_request(e.to_string())
            }
            VaultError::NotFound(_) => ApiError::not_found(e.to_string()),
            VaultError::Seal(inner) => inner.into(),
            VaultError::Crypto(inner) => inner.into(),
            other => ApiError::internal(other),
        }
    }
}

impl From<KeyCeremonyError> for ApiError {
    fn from(e: KeyCeremonyError) -> Self {
        match e {
            KeyCeremonyError::Ceremony(inner) => inner.into(),
            KeyCeremonyError::Seal(inner) => inner.into(),
            KeyCeremonyError::Registry(inner) => inner.into(),
            KeyCeremonyError::Crypto(inner) => inner.into(),
        }
    }
}
