// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ceremony session state machine.
//!
//! ```text
//!           ┌──▶ completed
//!           ├──▶ failed
//!   open ───┼──▶ cancelled
//!           └──▶ expired
//! ```
//!
//! Every status change goes through [`CeremonySession::apply`]. Terminal
//! states are final and drop (and thereby zeroize) all collected shares.
//! Expiry is passive: any read after `expires_at` reports `expired`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{CeremonyError, CeremonyResult};
use crate::crypto::Share;

/// Purpose of a ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyKind {
    /// First split of the MEK across the Guardian set.
    InitialSplit,
    /// Reconstruct and redistribute under new parameters.
    Reshare,
    /// Reconstruct to unseal, or to test recoverability while unsealed.
    Recovery,
}

impl CeremonyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyKind::InitialSplit => "initial_split",
            CeremonyKind::Reshare => "reshare",
            CeremonyKind::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyStatus {
    Open,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl CeremonyStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CeremonyStatus::Open)
    }
}

/// Events accepted by the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyEvent {
    Complete,
    Fail,
    Cancel,
    Expire,
}

/// Immutable parameters of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyContext {
    pub id: Uuid,
    pub kind: CeremonyKind,
    /// Shares required to reconstruct.
    pub threshold: u8,
    /// Threshold of the split produced by a reshare.
    pub new_threshold: Option<u8>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a share submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub accepted: bool,
    pub shares_collected: usize,
    pub threshold_met: bool,
}

/// Read model of a session. Never includes share values or Guardian ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CeremonySnapshot {
    pub id: Uuid,
    pub kind: CeremonyKind,
    pub status: CeremonyStatus,
    pub threshold: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_threshold: Option<u8>,
    pub shares_collected: usize,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// One ceremony: parameters, status, and the in-memory share map.
#[derive(Debug)]
pub struct CeremonySession {
    context: CeremonyContext,
    status: CeremonyStatus,
    finished_at: Option<DateTime<Utc>>,
    /// Guardian id and share, in submission order.
    shares: Vec<(String, Share)>,
}

impl CeremonySession {
    /// Open a new session.
    ///
    /// # Errors
    ///
    /// [`CeremonyError::InvalidParameters`] if `threshold < 2` or
    /// `expires_at` is not after `now`.
    pub fn open(
        kind: CeremonyKind,
        threshold: u8,
        new_threshold: Option<u8>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> CeremonyResult<Self> {
        if threshold < 2 {
            return Err(CeremonyError::InvalidParameters(format!(
                "threshold must be at least 2, got {threshold}"
            )));
        }
        if matches!(new_threshold, Some(t) if t < 2) {
            return Err(CeremonyError::InvalidParameters(
                "new threshold must be at least 2".to_string(),
            ));
        }
        if expires_at <= now {
            return Err(CeremonyError::InvalidParameters(
                "expiry must be in the future".to_string(),
            ));
        }

        let context = CeremonyContext {
            id: Uuid::new_v4(),
            kind,
            threshold,
            new_threshold,
            started_at: now,
            expires_at,
        };
        info!(
            ceremony_id = %context.id,
            kind = %kind,
            threshold,
            expires_at = %expires_at,
            "Ceremony opened"
        );

        Ok(Self {
            context,
            status: CeremonyStatus::Open,
            finished_at: None,
            shares: Vec::new(),
        })
    }

    pub fn context(&self) -> &CeremonyContext {
        &self.context
    }

    pub fn id(&self) -> Uuid {
        self.context.id
    }

    pub fn kind(&self) -> CeremonyKind {
        self.context.kind
    }

    pub fn threshold(&self) -> u8 {
        self.context.threshold
    }

    /// Status as observed at `now`. An open session past its expiry reads
    /// as `expired` even before [`Self::refresh`] records it.
    pub fn status(&self, now: DateTime<Utc>) -> CeremonyStatus {
        if self.status == CeremonyStatus::Open && now >= self.context.expires_at {
            CeremonyStatus::Expired
        } else {
            self.status
        }
    }

    /// Status as last recorded, without passive expiry applied.
    pub fn state(&self) -> CeremonyStatus {
        self.status
    }

    /// Whether the session accepts submissions at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == CeremonyStatus::Open
    }

    pub fn shares_collected(&self) -> usize {
        self.shares.len()
    }

    pub fn threshold_met(&self) -> bool {
        self.shares.len() >= usize::from(self.context.threshold)
    }

    /// The single transition function. Only `open` has outgoing edges.
    pub fn apply(
        &mut self,
        event: CeremonyEvent,
        now: DateTime<Utc>,
    ) -> CeremonyResult<CeremonyStatus> {
        let next = match (self.status, event) {
            (CeremonyStatus::Open, CeremonyEvent::Complete) => CeremonyStatus::Completed,
            (CeremonyStatus::Open, CeremonyEvent::Fail) => CeremonyStatus::Failed,
            (CeremonyStatus::Open, CeremonyEvent::Cancel) => CeremonyStatus::Cancelled,
            (CeremonyStatus::Open, CeremonyEvent::Expire) => CeremonyStatus::Expired,
            _ => return Err(CeremonyError::NoActiveCeremony),
        };

        self.status = next;
        self.finished_at = Some(now);
        self.shares.clear();
        info!(ceremony_id = %self.context.id, status = ?next, "Ceremony closed");
        Ok(next)
    }

    /// Record a passive expiry if the deadline has passed.
    ///
    /// Returns `true` if this call expired the session.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == CeremonyStatus::Open && now >= self.context.expires_at {
            self.apply(CeremonyEvent::Expire, now).is_ok()
        } else {
            false
        }
    }

    /// Record `share` from `guardian_id`.
    ///
    /// Check and insert happen in one `&mut self` borrow, so callers holding
    /// the session behind a lock get an atomic check-and-insert.
    pub fn submit_share(
        &mut self,
        guardian_id: &str,
        share: Share,
        now: DateTime<Utc>,
    ) -> CeremonyResult<SubmitReceipt> {
        self.refresh(now);
        if self.status != CeremonyStatus::Open {
            return Err(CeremonyError::NoActiveCeremony);
        }
        if self.shares.iter().any(|(id, _)| id == guardian_id) {
            return Err(CeremonyError::DuplicateSubmission(guardian_id.to_string()));
        }
        if share.threshold() != self.context.threshold {
            return Err(CeremonyError::ShareMismatch(format!(
                "share threshold {} does not match ceremony threshold {}",
                share.threshold(),
                self.context.threshold
            )));
        }
        if let Some((_, first)) = self.shares.first() {
            if first.split_id() != share.split_id() {
                return Err(CeremonyError::ShareMismatch(
                    "share comes from a different split".to_string(),
                ));
            }
        }
        if self.shares.iter().any(|(_, s)| s.index() == share.index()) {
            return Err(CeremonyError::DuplicateShareIndex(share.index()));
        }

        self.shares.push((guardian_id.to_string(), share));
        let receipt = SubmitReceipt {
            accepted: true,
            shares_collected: self.shares.len(),
            threshold_met: self.threshold_met(),
        };
        debug!(
            ceremony_id = %self.context.id,
            shares_collected = receipt.shares_collected,
            threshold_met = receipt.threshold_met,
            "Share recorded"
        );
        Ok(receipt)
    }

    /// Move the collected shares, with their Guardian ids, out for
    /// reconstruction.
    ///
    /// The session stays `open`; the caller must follow with
    /// [`CeremonyEvent::Complete`] or [`CeremonyEvent::Fail`].
    pub fn take_shares(&mut self, now: DateTime<Utc>) -> CeremonyResult<Vec<(String, Share)>> {
        self.refresh(now);
        if self.status != CeremonyStatus::Open {
            return Err(CeremonyError::NoActiveCeremony);
        }
        if !self.threshold_met() {
            return Err(CeremonyError::ThresholdNotMet {
                collected: self.shares.len(),
                needed: self.context.threshold,
            });
        }
        Ok(self.shares.drain(..).collect())
    }

    /// Cancel the session, dropping all shares.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> CeremonyResult<()> {
        self.refresh(now);
        self.apply(CeremonyEvent::Cancel, now).map(|_| ())
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> CeremonySnapshot {
        let status = self.status(now);
        CeremonySnapshot {
            id: self.context.id,
            kind: self.context.kind,
            status,
            threshold: self.context.threshold,
            new_threshold: self.context.new_threshold,
            shares_collected: if status == CeremonyStatus::Open {
                self.shares.len()
            } else {
                0
            },
            started_at: self.context.started_at,
            expires_at: self.context.expires_at,
            finished_at: self.finished_at.or_else(|| {
                (status == CeremonyStatus::Expired).then_some(self.context.expires_at)
            }),
        }
    }
}
