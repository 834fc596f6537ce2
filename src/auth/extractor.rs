// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for caller identity.
//!
//! ```rust,ignore
//! async fn start(AdminOnly(caller): AdminOnly) -> impl IntoResponse { .. }
//! async fn submit(GuardianAuth(guardian_id): GuardianAuth) -> impl IntoResponse { .. }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, Role};

/// Header carrying the caller role, set by the authenticated channel.
pub const ROLE_HEADER: &str = "x-custody-role";
/// Header carrying the Guardian id for `guardian` callers.
pub const GUARDIAN_ID_HEADER: &str = "x-guardian-id";

/// Identity asserted by the upstream channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub role: Role,
    /// Present for Guardian callers only
    pub guardian_id: Option<String>,
}

impl Caller {
    /// Name recorded as the audit actor.
    pub fn actor(&self) -> &str {
        match (&self.role, &self.guardian_id) {
            (Role::Guardian, Some(id)) => id.as_str(),
            _ => "admin",
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, AuthError> {
    match parts.headers.get(name) {
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()).filter(|v| !v.is_empty()))
            .map_err(|_| AuthError::InvalidRole),
        None => Ok(None),
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>().cloned() {
            return Ok(caller);
        }

        let role = header(parts, ROLE_HEADER)?.ok_or(AuthError::MissingRole)?;
        let role = Role::parse(role).ok_or(AuthError::InvalidRole)?;

        let guardian_id = match role {
            Role::Guardian => Some(
                header(parts, GUARDIAN_ID_HEADER)?
                    .ok_or(AuthError::MissingGuardianId)?
                    .to_string(),
            ),
            Role::Admin => None,
        };

        Ok(Caller { role, guardian_id })
    }
}

/// Admin-only extractor.
pub struct AdminOnly(pub Caller);

impl<S: Send + Sync> FromRequestParts<S> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        if !caller.role.has_privilege(Role::Admin) {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminOnly(caller))
    }
}

/// Guardian-only extractor yielding the Guardian id.
pub struct GuardianAuth(pub String);

impl<S: Send + Sync> FromRequestParts<S> for GuardianAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        match (caller.role, caller.guardian_id) {
            (Role::Guardian, Some(id)) => Ok(GuardianAuth(id)),
            (Role::Guardian, None) => Err(AuthError::MissingGuardianId),
            _ => Err(AuthError::InsufficientPermissions),
        }
    }
}
