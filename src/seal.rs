// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Seal Manager
//!
//! Owns the master encryption key (MEK) for the lifetime of the process.
//!
//! ```text
//!             bootstrap MEK or completed unlock ceremony
//!   sealed ───────────────────────────────────────────────▶ unsealed
//!     ▲                                                        │
//!     └──────────────────────── seal() ────────────────────────┘
//! ```
//!
//! The seal state and the optional in-flight [`CeremonySession`] live under
//! one [`RwLock`]. Mutations take the write lock; [`SealManager::status`]
//! takes the read lock and so never observes a half-applied transition.
//!
//! The MEK never leaves the manager by value. Callers borrow it for one
//! closure through [`SealManager::with_key`].

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::ceremony::{
    CeremonyContext, CeremonyError, CeremonyEvent, CeremonyKind, CeremonySession,
    CeremonySnapshot, CeremonyStatus, SubmitReceipt,
};
use crate::crypto::{SecretKey, Share, KEY_LEN};

pub use crate::clock::{Clock, ManualClock, SystemClock};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    /// The operation needs the MEK and the manager is sealed.
    #[error("service unavailable: awaiting unseal ceremony")]
    Sealed,

    #[error("already unsealed")]
    AlreadyUnsealed,

    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error(transparent)]
    Ceremony(#[from] CeremonyError),
}

pub type SealResult<T> = Result<T, SealError>;

// =============================================================================
// Status
// =============================================================================

/// Public status surface. Safe to serve unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SealStatus {
    pub sealed: bool,
    pub ceremony_active: bool,
    pub shares_collected: usize,
    pub threshold_needed: u8,
    /// Omitted while sealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsealed_at: Option<DateTime<Utc>>,
}

/// Seal state a new ceremony needs to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealRequirement {
    Sealed,
    Unsealed,
    Either,
}

/// A completed ceremony's outcome and the Guardians whose shares produced it.
#[derive(Debug)]
pub struct Completion<T> {
    pub outcome: T,
    pub contributors: Vec<String>,
}

/// What [`SealManager::complete_ceremony`] should do once shares are resolved.
pub struct Resolution<T> {
    /// Key to install; the manager must currently be sealed.
    pub unseal: Option<SecretKey>,
    pub outcome: T,
}

impl<T> Resolution<T> {
    /// Complete the ceremony and unseal with `key`.
    pub fn unseal(key: SecretKey, outcome: T) -> Self {
        Self {
            unseal: Some(key),
            outcome,
        }
    }

    /// Complete the ceremony without touching the seal state.
    pub fn keep(outcome: T) -> Self {
        Self {
            unseal: None,
            outcome,
        }
    }
}

// =============================================================================
// SealManager
// =============================================================================

enum SealState {
    Sealed,
    Unsealed {
        key: SecretKey,
        unsealed_at: DateTime<Utc>,
    },
}

struct Inner {
    state: SealState,
    ceremony: Option<CeremonySession>,
    /// Sessions cancelled or expired here and not yet handed to
    /// [`SealManager::take_closed`].
    closed: Vec<CeremonySnapshot>,
}

/// Run `f` on `session` and queue a snapshot if `f` cancelled or expired it.
fn track<R>(
    closed: &mut Vec<CeremonySnapshot>,
    session: &mut CeremonySession,
    now: DateTime<Utc>,
    f: impl FnOnce(&mut CeremonySession) -> R,
) -> R {
    let was_open = session.state() == CeremonyStatus::Open;
    let result = f(session);
    if was_open
        && matches!(
            session.state(),
            CeremonyStatus::Cancelled | CeremonyStatus::Expired
        )
    {
        closed.push(session.snapshot(now));
    }
    result
}

/// Process-wide owner of the MEK and the current ceremony.
pub struct SealManager {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SealManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealManager")
            .field("sealed", &self.is_sealed())
            .finish_non_exhaustive()
    }
}

impl Default for SealManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SealManager {
    /// A sealed manager on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// A sealed manager on `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: SealState::Sealed,
                ceremony: None,
                closed: Vec::new(),
            }),
            clock,
        }
    }

    /// Boot-time construction.
    ///
    /// With a bootstrap MEK the manager starts unsealed; otherwise it starts
    /// sealed and waits for an unlock ceremony.
    pub fn boot(bootstrap: Option<SecretKey>, clock: Arc<dyn Clock>) -> Self {
        let manager = Self::with_clock(clock);
        match bootstrap {
            Some(key) => {
                let now = manager.clock.now();
                let mut inner = manager.write();
                Self::install(&mut inner, key, now);
                drop(inner);
                info!("Booted unsealed from bootstrap MEK");
            }
            None => info!("Booted sealed, awaiting unseal ceremony"),
        }
        manager
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.read().state, SealState::Sealed)
    }

    /// Consistent snapshot of the public status surface.
    pub fn status(&self) -> SealStatus {
        let now = self.clock.now();
        let inner = self.read();
        let open = inner.ceremony.as_ref().filter(|s| s.is_open(now));

        SealStatus {
            sealed: matches!(inner.state, SealState::Sealed),
            ceremony_active: open.is_some(),
            shares_collected: open.map_or(0, |s| s.shares_collected()),
            threshold_needed: open.map_or(0, |s| s.threshold()),
            unsealed_at: match inner.state {
                SealState::Unsealed { unsealed_at, .. } => Some(unsealed_at),
                SealState::Sealed => None,
            },
        }
    }

    /// Install `mek`, copied into manager-owned memory.
    ///
    /// # Errors
    ///
    /// - [`SealError::InvalidKeyLength`] if `mek` is not 32 bytes
    /// - [`SealError::AlreadyUnsealed`] if a key is already installed
    pub fn unseal(&self, mek: &[u8]) -> SealResult<()> {
        let key = SecretKey::from_slice(mek).map_err(|_| SealError::InvalidKeyLength(mek.len()))?;
        self.unseal_with(key)
    }

    /// Install an owned key.
    pub fn unseal_with(&self, key: SecretKey) -> SealResult<()> {
        let now = self.clock.now();
        let mut inner = self.write();
        if matches!(inner.state, SealState::Unsealed { .. }) {
            return Err(SealError::AlreadyUnsealed);
        }
        Self::install(&mut inner, key, now);
        Ok(())
    }

    fn install(inner: &mut Inner, key: SecretKey, now: DateTime<Utc>) {
        if let Some(mut session) = inner.ceremony.take() {
            if track(&mut inner.closed, &mut session, now, |s| s.cancel(now)).is_ok() {
                info!(ceremony_id = %session.id(), "Ceremony cancelled by unseal");
            }
        }
        inner.state = SealState::Unsealed {
            key,
            unsealed_at: now,
        };
        info!(unsealed_at = %now, "Seal opened");
    }

    /// Drop the MEK and cancel any open ceremony. Sealing twice is a no-op.
    ///
    /// Returns `true` if this call dropped a key.
    pub fn seal(&self) -> bool {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;
        if let Some(mut session) = inner.ceremony.take() {
            if track(&mut inner.closed, &mut session, now, |s| s.cancel(now)).is_ok() {
                info!(ceremony_id = %session.id(), "Ceremony cancelled by seal");
            }
        }
        if matches!(inner.state, SealState::Unsealed { .. }) {
            // Dropping the old state wipes the key.
            inner.state = SealState::Sealed;
            info!("Seal closed");
            true
        } else {
            false
        }
    }

    /// Lend the MEK to `f` for the duration of the call.
    ///
    /// # Errors
    ///
    /// [`SealError::Sealed`] if no key is installed.
    pub fn with_key<R>(&self, f: impl FnOnce(&SecretKey) -> R) -> SealResult<R> {
        let inner = self.read();
        match &inner.state {
            SealState::Unsealed { key, .. } => Ok(f(key)),
            SealState::Sealed => Err(SealError::Sealed),
        }
    }

    // ========== Ceremonies ==========

    /// Open the unlock ceremony. Requires the manager to be sealed.
    pub fn start_unlock_ceremony(
        &self,
        threshold: u8,
        expires_at: DateTime<Utc>,
    ) -> SealResult<CeremonySnapshot> {
        self.open_ceremony(
            CeremonyKind::Recovery,
            threshold,
            None,
            expires_at,
            SealRequirement::Sealed,
        )
    }

    /// Open a session of any kind, provided none is open already and the
    /// seal state satisfies `requires`.
    pub fn open_ceremony(
        &self,
        kind: CeremonyKind,
        threshold: u8,
        new_threshold: Option<u8>,
        expires_at: DateTime<Utc>,
        requires: SealRequirement,
    ) -> SealResult<CeremonySnapshot> {
        let now = self.clock.now();
        let mut inner = self.write();
        Self::open_locked(&mut inner, now, kind, threshold, new_threshold, expires_at, requires)
    }

    fn open_locked(
        inner: &mut Inner,
        now: DateTime<Utc>,
        kind: CeremonyKind,
        threshold: u8,
        new_threshold: Option<u8>,
        expires_at: DateTime<Utc>,
        requires: SealRequirement,
    ) -> SealResult<CeremonySnapshot> {
        match (requires, &inner.state) {
            (SealRequirement::Sealed, SealState::Unsealed { .. }) => {
                return Err(SealError::AlreadyUnsealed)
            }
            (SealRequirement::Unsealed, SealState::Sealed) => return Err(SealError::Sealed),
            _ => {}
        }

        if let Some(existing) = inner.ceremony.as_mut() {
            track(&mut inner.closed, existing, now, |s| s.refresh(now));
            if existing.is_open(now) {
                return Err(CeremonyError::AlreadyActive.into());
            }
        }

        let session = CeremonySession::open(kind, threshold, new_threshold, now, expires_at)?;
        let snapshot = session.snapshot(now);
        inner.ceremony = Some(session);
        Ok(snapshot)
    }

    /// Snapshot of the current (or most recent) session.
    pub fn ceremony(&self) -> Option<CeremonySnapshot> {
        let now = self.clock.now();
        self.read().ceremony.as_ref().map(|s| s.snapshot(now))
    }

    /// Submit a Guardian's share to the open session.
    pub fn submit_share(&self, guardian_id: &str, share: Share) -> SealResult<SubmitReceipt> {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;
        let session = inner
            .ceremony
            .as_mut()
            .ok_or(CeremonyError::NoActiveCeremony)?;
        Ok(track(&mut inner.closed, session, now, |s| {
            s.submit_share(guardian_id, share, now)
        })?)
    }

    /// Cancel the open session and drop its shares.
    pub fn cancel_ceremony(&self) -> SealResult<CeremonySnapshot> {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;
        let session = inner
            .ceremony
            .as_mut()
            .ok_or(CeremonyError::NoActiveCeremony)?;
        track(&mut inner.closed, session, now, |s| s.cancel(now))?;
        Ok(session.snapshot(now))
    }

    /// Record passive expiry of the open session.
    ///
    /// Returns the id of the session this call expired.
    pub fn expire_stale_ceremony(&self) -> Option<Uuid> {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;
        let session = inner.ceremony.as_mut()?;
        track(&mut inner.closed, session, now, |s| s.refresh(now)).then(|| session.id())
    }

    /// Drain the sessions this manager cancelled or expired since the last
    /// call, for the ceremony history.
    pub fn take_closed(&self) -> Vec<CeremonySnapshot> {
        std::mem::take(&mut self.write().closed)
    }

    /// Hand the collected shares to `resolve` and apply its verdict.
    ///
    /// Runs under the write lock, so no submission, seal or cancel can
    /// interleave. `resolve` receives the session parameters, the shares
    /// (moved out of the session) and the live MEK if one is installed.
    ///
    /// On `Ok` the session becomes `completed` and, if the resolution carries
    /// a key, the manager unseals with it. On `Err` the session becomes
    /// `failed` and the seal state is untouched.
    pub fn complete_ceremony<T, E, F>(&self, resolve: F) -> Result<Completion<T>, E>
    where
        E: From<SealError>,
        F: FnOnce(&CeremonyContext, Vec<Share>, Option<&SecretKey>) -> Result<Resolution<T>, E>,
    {
        let now = self.clock.now();
        let mut guard = self.write();
        let inner = &mut *guard;

        let session = inner
            .ceremony
            .as_mut()
            .ok_or(SealError::Ceremony(CeremonyError::NoActiveCeremony))?;
        let taken = track(&mut inner.closed, session, now, |s| s.take_shares(now))
            .map_err(SealError::from)?;
        let (contributors, shares): (Vec<String>, Vec<Share>) = taken.into_iter().unzip();
        let context = session.context().clone();
        let live_key = match &inner.state {
            SealState::Unsealed { key, .. } => Some(key),
            SealState::Sealed => None,
        };

        let resolution = match resolve(&context, shares, live_key) {
            Ok(resolution) => resolution,
            Err(e) => {
                let _ = session.apply(CeremonyEvent::Fail, now);
                warn!(ceremony_id = %context.id, kind = %context.kind, "Ceremony failed");
                return Err(e);
            }
        };

        match resolution.unseal {
            Some(key) => {
                if matches!(inner.state, SealState::Unsealed { .. }) {
                    let _ = session.apply(CeremonyEvent::Fail, now);
                    return Err(SealError::AlreadyUnsealed.into());
                }
                session
                    .apply(CeremonyEvent::Complete, now)
                    .map_err(SealError::from)?;
                Self::install(inner, key, now);
            }
            None => {
                session
                    .apply(CeremonyEvent::Complete, now)
                    .map_err(SealError::from)?;
            }
        }
        Ok(Completion {
            outcome: resolution.outcome,
            contributors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::CeremonyStatus;
    use crate::crypto::shamir::{reconstruct_key, split};
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn manual() -> (Arc<ManualClock>, SealManager) {
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = SealManager::with_clock(clock.clone());
        (clock, manager)
    }

    #[test]
    fn boots_sealed_without_bootstrap() {
        let manager = SealManager::boot(None, Arc::new(SystemClock));
        assert!(manager.is_sealed());
        assert!(matches!(manager.with_key(|_| ()), Err(SealError::Sealed)));
    }

    #[test]
    fn boots_unsealed_with_bootstrap() {
        let key = SecretKey::from_slice(&[3u8; KEY_LEN]).unwrap();
        let manager = SealManager::boot(Some(key), Arc::new(SystemClock));
        assert!(!manager.is_sealed());
        assert_eq!(manager.with_key(|k| k.expose()[0]).unwrap(), 3);
    }

    #[test]
    fn seal_state_machine() {
        let (_clock, manager) = manual();
        assert!(manager.is_sealed());

        manager.unseal(&[7u8; KEY_LEN]).unwrap();
        assert!(!manager.is_sealed());
        assert_eq!(manager.with_key(|k| *k.expose()).unwrap(), [7u8; KEY_LEN]);

        manager.seal();
        assert!(manager.is_sealed());
        assert!(matches!(manager.with_key(|_| ()), Err(SealError::Sealed)));

        // Idempotent.
        manager.seal();
        assert!(manager.is_sealed());
    }

    #[test]
    fn unseal_validates_length() {
        let (_clock, manager) = manual();
        assert!(matches!(
            manager.unseal(&[0u8; 16]),
            Err(SealError::InvalidKeyLength(16))
        ));
        assert!(manager.is_sealed());
    }

    #[test]
    fn unseal_twice_is_rejected() {
        let (_clock, manager) = manual();
        manager.unseal(&[1u8; KEY_LEN]).unwrap();
        assert!(matches!(
            manager.unseal(&[2u8; KEY_LEN]),
            Err(SealError::AlreadyUnsealed)
        ));
        assert_eq!(manager.with_key(|k| k.expose()[0]).unwrap(), 1);
    }

    #[test]
    fn unseal_does_not_alias_caller_buffer() {
        let (_clock, manager) = manual();
        let mut mek = [9u8; KEY_LEN];
        manager.unseal(&mek).unwrap();
        mek.fill(0);
        assert_eq!(manager.with_key(|k| k.expose()[0]).unwrap(), 9);
    }

    #[test]
    fn status_omits_unsealed_at_when_sealed() {
        let (_clock, manager) = manual();
        let sealed = serde_json::to_value(manager.status()).unwrap();
        assert_eq!(sealed["sealed"], true);
        assert!(sealed.get("unsealedAt").is_none());

        manager.unseal(&[1u8; KEY_LEN]).unwrap();
        let unsealed = serde_json::to_value(manager.status()).unwrap();
        assert_eq!(unsealed["sealed"], false);
        assert_eq!(unsealed["unsealedAt"], "2026-03-01T12:00:00Z");
    }

    #[test]
    fn unlock_ceremony_requires_sealed() {
        let (_clock, manager) = manual();
        manager.unseal(&[1u8; KEY_LEN]).unwrap();
        assert!(matches!(
            manager.start_unlock_ceremony(3, t0() + Duration::hours(1)),
            Err(SealError::AlreadyUnsealed)
        ));
    }

    #[test]
    fn only_one_open_ceremony() {
        let (clock, manager) = manual();
        manager
            .start_unlock_ceremony(2, t0() + Duration::minutes(5))
            .unwrap();
        assert!(matches!(
            manager.start_unlock_ceremony(2, t0() + Duration::minutes(5)),
            Err(SealError::Ceremony(CeremonyError::AlreadyActive))
        ));

        clock.advance(Duration::minutes(6));
        manager
            .start_unlock_ceremony(2, clock.now() + Duration::minutes(5))
            .unwrap();
    }

    #[test]
    fn status_reports_ceremony_progress() {
        let (_clock, manager) = manual();
        let shares = split(&[5u8; KEY_LEN], 3, 5).unwrap();
        manager
            .start_unlock_ceremony(3, t0() + Duration::hours(1))
            .unwrap();

        for (guardian, share) in ["A", "B"].into_iter().zip(shares) {
            manager.submit_share(guardian, share).unwrap();
        }
        let status = manager.status();
        assert!(status.sealed);
        assert!(status.ceremony_active);
        assert_eq!(status.shares_collected, 2);
        assert_eq!(status.threshold_needed, 3);
    }

    #[test]
    fn submit_without_ceremony_fails() {
        let (_clock, manager) = manual();
        let share = split(&[5u8; KEY_LEN], 2, 2).unwrap().remove(0);
        assert!(matches!(
            manager.submit_share("A", share),
            Err(SealError::Ceremony(CeremonyError::NoActiveCeremony))
        ));
    }

    #[test]
    fn seal_cancels_open_ceremony() {
        let (_clock, manager) = manual();
        manager.unseal(&[1u8; KEY_LEN]).unwrap();
        manager
            .open_ceremony(
                CeremonyKind::Recovery,
                2,
                None,
                t0() + Duration::hours(1),
                SealRequirement::Unsealed,
            )
            .unwrap();

        assert!(manager.seal());
        assert!(manager.ceremony().is_none());
        assert!(!manager.status().ceremony_active);

        let closed = manager.take_closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, CeremonyStatus::Cancelled);
        assert!(manager.take_closed().is_empty());

        // Already sealed: nothing dropped, nothing queued.
        assert!(!manager.seal());
        assert!(manager.take_closed().is_empty());
    }

    #[test]
    fn unseal_queues_the_cancelled_unlock_ceremony() {
        let (_clock, manager) = manual();
        let snapshot = manager
            .start_unlock_ceremony(2, t0() + Duration::hours(1))
            .unwrap();
        manager.unseal(&[1u8; KEY_LEN]).unwrap();

        let closed = manager.take_closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, snapshot.id);
        assert_eq!(closed[0].status, CeremonyStatus::Cancelled);
    }

    #[test]
    fn expiry_noticed_on_submit_is_queued_once() {
        let (clock, manager) = manual();
        let snapshot = manager
            .start_unlock_ceremony(2, t0() + Duration::minutes(1))
            .unwrap();
        clock.advance(Duration::minutes(2));

        let share = split(&[5u8; KEY_LEN], 2, 2).unwrap().remove(0);
        assert!(matches!(
            manager.submit_share("A", share),
            Err(SealError::Ceremony(CeremonyError::NoActiveCeremony))
        ));
        assert_eq!(manager.expire_stale_ceremony(), None);

        let closed = manager.take_closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, snapshot.id);
        assert_eq!(closed[0].status, CeremonyStatus::Expired);
    }

    #[test]
    fn replacing_a_stale_session_queues_its_expiry() {
        let (clock, manager) = manual();
        let stale = manager
            .start_unlock_ceremony(2, t0() + Duration::minutes(1))
            .unwrap();
        clock.advance(Duration::minutes(2));
        manager
            .start_unlock_ceremony(2, clock.now() + Duration::minutes(5))
            .unwrap();

        let closed = manager.take_closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, stale.id);
        assert_eq!(closed[0].status, CeremonyStatus::Expired);
    }

    #[test]
    fn ceremony_requirement_checked_under_the_write_lock() {
        let (_clock, manager) = manual();
        let expires_at = t0() + Duration::hours(1);

        // An unseal landing between a caller's check and the open must win.
        let mut inner = manager.write();
        SealManager::install(&mut inner, SecretKey::from_slice(&[1u8; KEY_LEN]).unwrap(), t0());
        let result = SealManager::open_locked(
            &mut inner,
            t0(),
            CeremonyKind::Recovery,
            2,
            None,
            expires_at,
            SealRequirement::Sealed,
        );
        assert!(matches!(result, Err(SealError::AlreadyUnsealed)));
        assert!(inner.ceremony.is_none());
        drop(inner);

        manager.seal();
        assert!(matches!(
            manager.open_ceremony(
                CeremonyKind::Reshare,
                2,
                Some(2),
                expires_at,
                SealRequirement::Unsealed
            ),
            Err(SealError::Sealed)
        ));
        manager
            .open_ceremony(CeremonyKind::Recovery, 2, None, expires_at, SealRequirement::Either)
            .unwrap();
    }

    #[test]
    fn expiry_is_swept() {
        let (clock, manager) = manual();
        let snapshot = manager
            .start_unlock_ceremony(2, t0() + Duration::minutes(1))
            .unwrap();
        assert_eq!(manager.expire_stale_ceremony(), None);

        clock.advance(Duration::minutes(2));
        assert!(!manager.status().ceremony_active);
        assert_eq!(manager.expire_stale_ceremony(), Some(snapshot.id));
        assert_eq!(manager.expire_stale_ceremony(), None);
        assert_eq!(manager.ceremony().unwrap().status, CeremonyStatus::Expired);
    }

    #[test]
    fn completing_unlock_ceremony_unseals() {
        let (_clock, manager) = manual();
        let shares = split(&[8u8; KEY_LEN], 2, 3).unwrap();
        manager
            .start_unlock_ceremony(2, t0() + Duration::hours(1))
            .unwrap();
        for (guardian, share) in ["A", "B"].into_iter().zip(shares) {
            manager.submit_share(guardian, share).unwrap();
        }

        manager
            .complete_ceremony(|ctx, shares, live| {
                assert!(live.is_none());
                let key = reconstruct_key(&shares, ctx.threshold).unwrap();
                Ok::<_, SealError>(Resolution::unseal(key, ()))
            })
            .unwrap();

        assert!(!manager.is_sealed());
        assert_eq!(manager.with_key(|k| k.expose()[0]).unwrap(), 8);
        assert!(manager.ceremony().is_none());
    }

    #[test]
    fn failed_resolution_marks_session_failed() {
        let (_clock, manager) = manual();
        let shares = split(&[8u8; KEY_LEN], 2, 3).unwrap();
        manager
            .start_unlock_ceremony(2, t0() + Duration::hours(1))
            .unwrap();
        for (guardian, share) in ["A", "B"].into_iter().zip(shares) {
            manager.submit_share(guardian, share).unwrap();
        }

        let result: Result<Completion<()>, SealError> =
            manager.complete_ceremony(|_, _, _| Err(SealError::Sealed));
        assert!(result.is_err());
        assert!(manager.is_sealed());
        assert_eq!(manager.ceremony().unwrap().status, CeremonyStatus::Failed);
    }

    #[test]
    fn complete_before_threshold_is_rejected() {
        let (_clock, manager) = manual();
        manager
            .start_unlock_ceremony(3, t0() + Duration::hours(1))
            .unwrap();
        let result: Result<Completion<()>, SealError> =
            manager.complete_ceremony(|_, _, _| Ok(Resolution::keep(())));
        assert!(matches!(
            result,
            Err(SealError::Ceremony(CeremonyError::ThresholdNotMet { .. }))
        ));
        assert!(manager.status().ceremony_active);
    }

    #[test]
    fn concurrent_submissions_count_each_guardian_once() {
        let (_clock, manager) = manual();
        let encoded: Vec<String> = split(&[4u8; KEY_LEN], 3, 8)
            .unwrap()
            .iter()
            .map(|s| s.encode())
            .collect();
        manager
            .start_unlock_ceremony(3, t0() + Duration::hours(1))
            .unwrap();

        let accepted = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for (i, share) in encoded.iter().enumerate() {
                // Guardians 0..4 each race two submissions of their share.
                let guardian = format!("guardian-{}", i % 4);
                let manager = &manager;
                let accepted = &accepted;
                let share = Share::decode(share).unwrap();
                scope.spawn(move || {
                    if manager.submit_share(&guardian, share).is_ok() {
                        accepted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(accepted.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert_eq!(manager.status().shares_collected, 4);
    }
}
