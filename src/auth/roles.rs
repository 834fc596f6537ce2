// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Caller roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Caller roles.
///
/// - `Admin` - Starts, completes and cancels ceremonies; manages Guardians
/// - `Guardian` - Submits its own share to the open ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Custody operator
    Admin,
    /// Share holder
    Guardian,
}

impl Role {
    /// Check if this role may act as the required role.
    ///
    /// Admins cannot submit shares on a Guardian's behalf.
    pub fn has_privilege(&self, required: Role) -> bool {
        *self == required
    }

    /// Parse role from header value (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "guardian" => Some(Role::Guardian),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Guardian => write!(f, "guardian"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_do_not_overlap() {
        assert!(Role::Admin.has_privilege(Role::Admin));
        assert!(!Role::Admin.has_privilege(Role::Guardian));
        assert!(Role::Guardian.has_privilege(Role::Guardian));
        assert!(!Role::Guardian.has_privilege(Role::Admin));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("GUARDIAN"), Some(Role::Guardian));
        assert_eq!(Role::parse("client"), None);
    }
}
