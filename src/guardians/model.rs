// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian identity rows and ceremony history rows.
//!
//! Neither type has a field that could hold a share value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::ceremony::{CeremonyKind, CeremonyStatus};

/// Guardian lifecycle: `pending → active → revoked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GuardianStatus {
    /// Enrolled, has not yet proven possession of a share
    Pending,
    /// Submitted a valid share at least once
    Active,
    /// Permanently excluded from ceremonies
    Revoked,
}

impl GuardianStatus {
    /// Whether `self → next` is a legal transition.
    ///
    /// `active → active` is allowed so repeated verifications refresh the
    /// timestamp. Nothing leaves `revoked`.
    pub fn can_transition_to(self, next: GuardianStatus) -> bool {
        matches!(
            (self, next),
            (GuardianStatus::Pending, GuardianStatus::Active)
                | (GuardianStatus::Pending, GuardianStatus::Revoked)
                | (GuardianStatus::Active, GuardianStatus::Active)
                | (GuardianStatus::Active, GuardianStatus::Revoked)
        )
    }

    /// Pending and active Guardians take part in splits and ceremonies.
    pub fn is_eligible(self) -> bool {
        !matches!(self, GuardianStatus::Revoked)
    }
}

/// A Guardian identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Guardian {
    /// Unique Guardian identifier (UUID)
    pub guardian_id: String,
    /// Human-readable name
    pub display_name: String,
    /// Out-of-band contact (email, handle)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// x-coordinate of this Guardian's share; fixed at creation
    pub share_index: u8,
    pub status: GuardianStatus,
    pub created_at: DateTime<Utc>,
    /// Last time this Guardian submitted a valid share
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Request to enroll a Guardian.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewGuardian {
    pub display_name: String,
    #[serde(default)]
    pub contact: Option<String>,
    /// Explicit share index; the lowest free index is used when omitted
    #[serde(default)]
    pub share_index: Option<u8>,
}

/// A finished ceremony as kept in durable history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CeremonyRecord {
    pub ceremony_id: Uuid,
    pub kind: CeremonyKind,
    pub status: CeremonyStatus,
    /// Threshold in force after this ceremony (for splits and reshares)
    pub threshold: u8,
    /// Number of shares issued, for splits and reshares
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_shares: Option<u8>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CeremonyRecord {
    /// Whether this row defines the authoritative sharing scheme.
    pub fn defines_scheme(&self) -> bool {
        self.status == CeremonyStatus::Completed
            && matches!(self.kind, CeremonyKind::InitialSplit | CeremonyKind::Reshare)
    }
}

/// Read model for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RegistrySummary {
    pub total_guardians: usize,
    pub pending: usize,
    pub active: usize,
    pub revoked: usize,
    /// Threshold of the most recent completed split or reshare
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_shares: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ceremony_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions() {
        use GuardianStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Revoked));
        assert!(Active.can_transition_to(Active));
        assert!(Active.can_transition_to(Revoked));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Revoked.can_transition_to(Active));
        assert!(!Revoked.can_transition_to(Pending));
        assert!(!Revoked.can_transition_to(Revoked));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&GuardianStatus::Revoked).unwrap(),
            "\"revoked\""
        );
    }

    #[test]
    fn only_completed_splits_define_scheme() {
        let record = |kind, status| CeremonyRecord {
            ceremony_id: Uuid::new_v4(),
            kind,
            status,
            threshold: 3,
            total_shares: Some(5),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert!(record(CeremonyKind::InitialSplit, CeremonyStatus::Completed).defines_scheme());
        assert!(record(CeremonyKind::Reshare, CeremonyStatus::Completed).defines_scheme());
        assert!(!record(CeremonyKind::Reshare, CeremonyStatus::Cancelled).defines_scheme());
        assert!(!record(CeremonyKind::Recovery, CeremonyStatus::Completed).defines_scheme());
    }
}
