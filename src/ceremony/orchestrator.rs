// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ceremony orchestration across the seal, the registry and the audit log.
//!
//! | Kind            | Seal state | Effect on completion                          |
//! |-----------------|------------|-----------------------------------------------|
//! | `initial_split` | any        | split MEK across eligible Guardians (no session) |
//! | `recovery`      | sealed     | reconstruct and unseal                        |
//! | `recovery`      | unsealed   | reconstruct, compare with live MEK, discard   |
//! | `reshare`       | unsealed   | reconstruct, verify, split under new threshold |
//!
//! Only successful splits and reshares change the authoritative threshold.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroize;

use super::{CeremonyContext, CeremonyError, CeremonyKind, CeremonySnapshot, CeremonyStatus, SubmitReceipt};
use crate::audit::{AuditEvent, AuditEventType, AuditLog};
use crate::crypto::shamir::{reconstruct_key, split_at, MIN_THRESHOLD};
use crate::crypto::{CryptoError, SecretKey, Share};
use crate::guardians::{CeremonyRecord, Guardian, GuardianRegistry, RegistryError};
use crate::seal::{Resolution, SealError, SealManager, SealRequirement};

#[derive(Debug, thiserror::Error)]
pub enum KeyCeremonyError {
    #[error(transparent)]
    Ceremony(CeremonyError),

    #[error(transparent)]
    Seal(SealError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<CeremonyError> for KeyCeremonyError {
    fn from(e: CeremonyError) -> Self {
        KeyCeremonyError::Ceremony(e)
    }
}

impl From<SealError> for KeyCeremonyError {
    fn from(e: SealError) -> Self {
        match e {
            SealError::Ceremony(inner) => KeyCeremonyError::Ceremony(inner),
            other => KeyCeremonyError::Seal(other),
        }
    }
}

pub type KeyCeremonyResult<T> = Result<T, KeyCeremonyError>;

/// A freshly issued share, addressed to one Guardian.
///
/// Returned exactly once; the encoded share is wiped when this is dropped.
#[derive(Debug, Serialize, ToSchema)]
pub struct IssuedShare {
    pub guardian_id: String,
    pub share_index: u8,
    /// Encoded share (URL-safe base64)
    pub share: String,
}

impl Drop for IssuedShare {
    fn drop(&mut self) {
        self.share.zeroize();
    }
}

/// Result of [`KeyCeremonies::initial_split`].
#[derive(Debug, Serialize, ToSchema)]
pub struct InitialSplitOutcome {
    pub ceremony_id: Uuid,
    pub threshold: u8,
    pub shares: Vec<IssuedShare>,
}

/// Result of [`KeyCeremonies::complete`].
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Unlock ceremony: the seal is now open.
    Unsealed { ceremony_id: Uuid },
    /// Recovery test: shares reconstruct the live MEK.
    RecoveryVerified { ceremony_id: Uuid },
    /// Reshare: new shares under `threshold`; all previous shares are obsolete.
    Reshared {
        ceremony_id: Uuid,
        threshold: u8,
        shares: Vec<IssuedShare>,
    },
}

/// Ceremony workflows.
#[derive(Debug, Clone)]
pub struct KeyCeremonies {
    seal: Arc<SealManager>,
    registry: Arc<GuardianRegistry>,
    audit: AuditLog,
    default_ttl: Duration,
}

impl KeyCeremonies {
    pub fn new(
        seal: Arc<SealManager>,
        registry: Arc<GuardianRegistry>,
        audit: AuditLog,
        default_ttl: Duration,
    ) -> Self {
        Self {
            seal,
            registry,
            audit,
            default_ttl,
        }
    }

    pub fn seal(&self) -> &Arc<SealManager> {
        &self.seal
    }

    pub fn registry(&self) -> &Arc<GuardianRegistry> {
        &self.registry
    }

    /// Split the MEK across every eligible Guardian at their share indices.
    ///
    /// When sealed with no history, a fresh MEK is generated and installed.
    /// Runs once per deployment.
    pub fn initial_split(&self, threshold: u8) -> KeyCeremonyResult<InitialSplitOutcome> {
        if self.registry.has_completed(CeremonyKind::InitialSplit)? {
            return Err(CeremonyError::PreconditionFailed(
                "initial split already completed".to_string(),
            )
            .into());
        }
        let eligible = self.registry.eligible()?;
        check_threshold(threshold, eligible.len())?;
        let xs: Vec<u8> = eligible.iter().map(|g| g.share_index).collect();

        let started_at = self.seal.now();
        let shares = match self.seal.with_key(|mek| split_at(mek.expose(), threshold, &xs)) {
            Ok(split) => split?,
            Err(SealError::Sealed) => {
                let mek = SecretKey::generate()?;
                let split = split_at(mek.expose(), threshold, &xs)?;
                self.seal.unseal_with(mek)?;
                self.record_closed();
                self.audit.record(
                    AuditEvent::new(AuditEventType::SealOpened)
                        .with_actor("admin")
                        .with_details(serde_json::json!({ "via": "initial_split" })),
                );
                split
            }
            Err(e) => return Err(e.into()),
        };

        let record = CeremonyRecord {
            ceremony_id: Uuid::new_v4(),
            kind: CeremonyKind::InitialSplit,
            status: CeremonyStatus::Completed,
            threshold,
            total_shares: Some(xs.len() as u8),
            started_at,
            finished_at: self.seal.now(),
        };
        self.registry.record_ceremony(&record)?;
        self.audit.record(
            AuditEvent::new(AuditEventType::CeremonyCompleted)
                .with_actor("admin")
                .with_resource("ceremony", record.ceremony_id.to_string())
                .with_details(serde_json::json!({
                    "kind": CeremonyKind::InitialSplit,
                    "threshold": threshold,
                    "total_shares": xs.len(),
                })),
        );
        info!(
            ceremony_id = %record.ceremony_id,
            threshold,
            total = xs.len(),
            "Initial split completed"
        );

        Ok(InitialSplitOutcome {
            ceremony_id: record.ceremony_id,
            threshold,
            shares: issue(&eligible, shares),
        })
    }

    /// Open a ceremony after checking history preconditions.
    ///
    /// `threshold` defaults to (and must equal) the authoritative threshold.
    /// `new_threshold` applies to reshares only.
    pub fn start(
        &self,
        kind: CeremonyKind,
        threshold: Option<u8>,
        ttl: Option<Duration>,
        new_threshold: Option<u8>,
    ) -> KeyCeremonyResult<CeremonySnapshot> {
        if kind == CeremonyKind::InitialSplit {
            if self.registry.has_completed(CeremonyKind::InitialSplit)? {
                return Err(CeremonyError::PreconditionFailed(
                    "initial split already completed".to_string(),
                )
                .into());
            }
            return Err(CeremonyError::InvalidParameters(
                "initial split collects no shares; run it directly".to_string(),
            )
            .into());
        }

        let scheme = self.registry.authoritative_scheme()?.ok_or_else(|| {
            CeremonyError::PreconditionFailed("no completed initial split".to_string())
        })?;
        let threshold = threshold.unwrap_or(scheme.threshold);
        if threshold != scheme.threshold {
            return Err(CeremonyError::InvalidParameters(format!(
                "threshold must equal the current threshold {}",
                scheme.threshold
            ))
            .into());
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl <= Duration::zero() {
            return Err(CeremonyError::InvalidParameters("ttl must be positive".to_string()).into());
        }
        let expires_at = self.seal.now() + ttl;

        // Recovery unseals or tests depending on the seal state found at
        // completion; a seal or unseal in between cancels the session.
        let opened = match kind {
            CeremonyKind::Recovery => self.seal.open_ceremony(
                CeremonyKind::Recovery,
                threshold,
                None,
                expires_at,
                SealRequirement::Either,
            ),
            _ => {
                let target = new_threshold.unwrap_or(threshold);
                check_threshold(target, self.registry.eligible()?.len())?;
                self.seal.open_ceremony(
                    CeremonyKind::Reshare,
                    threshold,
                    Some(target),
                    expires_at,
                    SealRequirement::Unsealed,
                )
            }
        };
        self.record_closed();
        let snapshot = opened?;

        self.audit.record(
            AuditEvent::new(AuditEventType::CeremonyStarted)
                .with_actor("admin")
                .with_resource("ceremony", snapshot.id.to_string())
                .with_details(serde_json::json!({
                    "kind": kind,
                    "threshold": threshold,
                    "expires_at": snapshot.expires_at,
                })),
        );
        Ok(snapshot)
    }

    /// Accept a Guardian's encoded share into the open ceremony.
    pub fn submit_share(
        &self,
        guardian_id: &str,
        encoded_share: &str,
    ) -> KeyCeremonyResult<SubmitReceipt> {
        let result = self.try_submit(guardian_id, encoded_share);
        self.record_closed();
        match &result {
            Ok(receipt) => {
                self.audit.record(
                    AuditEvent::new(AuditEventType::ShareAccepted)
                        .with_actor(guardian_id)
                        .with_details(serde_json::json!({
                            "shares_collected": receipt.shares_collected,
                            "threshold_met": receipt.threshold_met,
                        })),
                );
            }
            Err(e) => {
                warn!(guardian_id, error = %e, "Share rejected");
                self.audit.record(
                    AuditEvent::new(AuditEventType::ShareRejected)
                        .with_actor(guardian_id)
                        .failed(e.to_string()),
                );
            }
        }
        result
    }

    fn try_submit(&self, guardian_id: &str, encoded_share: &str) -> KeyCeremonyResult<SubmitReceipt> {
        let guardian = self
            .registry
            .get(guardian_id)?
            .ok_or_else(|| CeremonyError::GuardianIneligible("unknown guardian".to_string()))?;
        if !guardian.status.is_eligible() {
            return Err(CeremonyError::GuardianIneligible("guardian is revoked".to_string()).into());
        }

        let share = Share::decode(encoded_share)?;
        if share.index() != guardian.share_index {
            return Err(CeremonyError::GuardianIneligible(
                "share index does not belong to this guardian".to_string(),
            )
            .into());
        }

        Ok(self.seal.submit_share(guardian_id, share)?)
    }

    /// Reconstruct from the collected shares and apply the ceremony's effect.
    ///
    /// A failed reconstruction or verification marks the ceremony `failed`
    /// and leaves the seal state unchanged. Contributing Guardians are marked
    /// verified only once their shares have proven good.
    pub fn complete(&self) -> KeyCeremonyResult<CompletionOutcome> {
        let eligible = self.registry.eligible()?;
        let mut context: Option<CeremonyContext> = None;

        let completed = self.seal.complete_ceremony(|ctx, shares, live| {
            context = Some(ctx.clone());
            let key = reconstruct_key(&shares, ctx.threshold)?;
            drop(shares);
            resolve(ctx, key, live, &eligible)
        });
        self.record_closed();

        let result = completed.map(|completion| {
            for guardian_id in &completion.contributors {
                if let Err(e) = self.registry.record_verification(guardian_id) {
                    warn!(guardian_id, error = %e, "Failed to record guardian verification");
                }
            }
            completion.outcome
        });

        let Some(ctx) = context else {
            // Nothing was consumed: no open ceremony or threshold not met.
            return result;
        };

        let finished_at = self.seal.now();
        match &result {
            Ok(outcome) => {
                let (threshold, total) = match outcome {
                    CompletionOutcome::Reshared { threshold, shares, .. } => {
                        (*threshold, Some(shares.len() as u8))
                    }
                    _ => (ctx.threshold, None),
                };
                self.finish(&ctx, CeremonyStatus::Completed, threshold, total, finished_at);
                if matches!(outcome, CompletionOutcome::Unsealed { .. }) {
                    self.audit.record(
                        AuditEvent::new(AuditEventType::SealOpened)
                            .with_actor("admin")
                            .with_resource("ceremony", ctx.id.to_string()),
                    );
                }
                info!(ceremony_id = %ctx.id, kind = %ctx.kind, "Ceremony completed");
            }
            Err(e) => {
                warn!(ceremony_id = %ctx.id, kind = %ctx.kind, error = %e, "Ceremony failed");
                self.finish(&ctx, CeremonyStatus::Failed, ctx.threshold, None, finished_at);
            }
        }
        result
    }

    /// Cancel the open ceremony, dropping its shares.
    pub fn cancel(&self) -> KeyCeremonyResult<CeremonySnapshot> {
        let cancelled = self.seal.cancel_ceremony();
        self.record_closed();
        Ok(cancelled?)
    }

    /// Record passive expiry of the open ceremony, if due.
    pub fn expire_stale(&self) -> Option<Uuid> {
        let expired = self.seal.expire_stale_ceremony();
        self.record_closed();
        expired
    }

    /// Drop the MEK, recording any ceremony this interrupts.
    ///
    /// Returns `true` if the service was unsealed.
    pub fn seal_now(&self, actor: &str) -> bool {
        let closed = self.seal.seal();
        if closed {
            self.audit
                .record(AuditEvent::new(AuditEventType::SealClosed).with_actor(actor));
        }
        self.record_closed();
        closed
    }

    /// Write history rows for every session the seal manager cancelled or
    /// expired since the last call.
    fn record_closed(&self) {
        for snapshot in self.seal.take_closed() {
            let ctx = CeremonyContext {
                id: snapshot.id,
                kind: snapshot.kind,
                threshold: snapshot.threshold,
                new_threshold: snapshot.new_threshold,
                started_at: snapshot.started_at,
                expires_at: snapshot.expires_at,
            };
            let finished_at = snapshot.finished_at.unwrap_or_else(|| self.seal.now());
            if snapshot.status == CeremonyStatus::Expired {
                info!(ceremony_id = %snapshot.id, "Ceremony expired");
            }
            self.finish(&ctx, snapshot.status, snapshot.threshold, None, finished_at);
        }
    }

    /// Write the history row and audit event for a terminal ceremony.
    ///
    /// History write failures are logged; the ceremony outcome stands.
    fn finish(
        &self,
        ctx: &CeremonyContext,
        status: CeremonyStatus,
        threshold: u8,
        total: Option<u8>,
        finished_at: DateTime<Utc>,
    ) {
        let record = CeremonyRecord {
            ceremony_id: ctx.id,
            kind: ctx.kind,
            status,
            threshold,
            total_shares: total,
            started_at: ctx.started_at,
            finished_at,
        };
        if let Err(e) = self.registry.record_ceremony(&record) {
            warn!(ceremony_id = %ctx.id, error = %e, "Failed to record ceremony history");
        }

        let event_type = match status {
            CeremonyStatus::Completed => AuditEventType::CeremonyCompleted,
            CeremonyStatus::Cancelled => AuditEventType::CeremonyCancelled,
            CeremonyStatus::Expired => AuditEventType::CeremonyExpired,
            CeremonyStatus::Failed | CeremonyStatus::Open => AuditEventType::CeremonyFailed,
        };
        let mut event = AuditEvent::new(event_type)
            .with_actor(if status == CeremonyStatus::Expired { "system" } else { "admin" })
            .with_resource("ceremony", ctx.id.to_string())
            .with_details(serde_json::json!({ "kind": ctx.kind, "threshold": threshold }));
        if status == CeremonyStatus::Failed {
            event = event.failed("reconstruction or verification failed");
        }
        self.audit.record(event);
    }
}

/// Decide the side effect of a ceremony whose key has been reconstructed.
fn resolve(
    ctx: &CeremonyContext,
    key: SecretKey,
    live: Option<&SecretKey>,
    eligible: &[Guardian],
) -> KeyCeremonyResult<Resolution<CompletionOutcome>> {
    let ceremony_id = ctx.id;
    match (ctx.kind, live) {
        (CeremonyKind::Recovery, None) => {
            Ok(Resolution::unseal(key, CompletionOutcome::Unsealed { ceremony_id }))
        }
        (CeremonyKind::Recovery, Some(live)) => {
            verify_against_live(&key, live)?;
            Ok(Resolution::keep(CompletionOutcome::RecoveryVerified { ceremony_id }))
        }
        (CeremonyKind::Reshare, Some(live)) => {
            verify_against_live(&key, live)?;
            let threshold = ctx.new_threshold.unwrap_or(ctx.threshold);
            check_threshold(threshold, eligible.len())?;
            let xs: Vec<u8> = eligible.iter().map(|g| g.share_index).collect();
            let shares = split_at(key.expose(), threshold, &xs)?;
            Ok(Resolution::keep(CompletionOutcome::Reshared {
                ceremony_id,
                threshold,
                shares: issue(eligible, shares),
            }))
        }
        (CeremonyKind::Reshare, None) => Err(SealError::Sealed.into()),
        (CeremonyKind::InitialSplit, _) => Err(CeremonyError::InvalidParameters(
            "initial split has no completion step".to_string(),
        )
        .into()),
    }
}

fn verify_against_live(reconstructed: &SecretKey, live: &SecretKey) -> KeyCeremonyResult<()> {
    if reconstructed.ct_eq(live) {
        Ok(())
    } else {
        Err(CeremonyError::ShareMismatch(
            "shares do not reconstruct the current master key".to_string(),
        )
        .into())
    }
}

fn check_threshold(threshold: u8, eligible: usize) -> KeyCeremonyResult<()> {
    if threshold < MIN_THRESHOLD || usize::from(threshold) > eligible {
        return Err(CeremonyError::InvalidParameters(format!(
            "threshold {threshold} needs {MIN_THRESHOLD} <= threshold <= eligible guardians ({eligible})"
        ))
        .into());
    }
    Ok(())
}

fn issue(guardians: &[Guardian], shares: Vec<Share>) -> Vec<IssuedShare> {
    guardians
        .iter()
        .zip(shares)
        .map(|(guardian, share)| IssuedShare {
            guardian_id: guardian.guardian_id.clone(),
            share_index: share.index(),
            share: share.encode(),
        })
        .collect()
}
