// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian registry backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `guardians`: guardian_id → serialized [`Guardian`] (JSON bytes)
//! - `ceremonies`: ceremony_id → serialized [`CeremonyRecord`] (JSON bytes)
//!
//! The registry stores identity metadata and ceremony outcomes only. Share
//! values never pass through this module.

pub mod model;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use tracing::info;
use uuid::Uuid;

use crate::ceremony::CeremonyKind;
use crate::clock::{Clock, SystemClock};

pub use model::{CeremonyRecord, Guardian, GuardianStatus, NewGuardian, RegistrySummary};

// =============================================================================
// Table Definitions
// =============================================================================

const GUARDIANS: TableDefinition<&str, &[u8]> = TableDefinition::new("guardians");

const CEREMONIES: TableDefinition<&str, &[u8]> = TableDefinition::new("ceremonies");

/// Longest accepted display name, in characters.
pub const MAX_DISPLAY_NAME_LEN: usize = 128;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("guardian not found: {0}")]
    NotFound(String),

    #[error("illegal guardian transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: GuardianStatus,
        to: GuardianStatus,
    },

    #[error("share index {0} is already assigned")]
    ShareIndexTaken(u8),

    #[error("no free share index left")]
    ShareIndexExhausted,

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

fn decode_all<T: DeserializeOwned>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> RegistryResult<Vec<T>> {
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        rows.push(serde_json::from_slice(value.value())?);
    }
    Ok(rows)
}

// =============================================================================
// GuardianRegistry
// =============================================================================

/// Durable Guardian identity store and ceremony history.
pub struct GuardianRegistry {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for GuardianRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardianRegistry").finish_non_exhaustive()
    }
}

impl GuardianRegistry {
    /// Open (or create) the registry at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Open the registry, stamping Guardian timestamps from `clock`.
    pub fn open_with_clock(path: &Path, clock: Arc<dyn Clock>) -> RegistryResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(GUARDIANS)?;
            let _ = write_txn.open_table(CEREMONIES)?;
        }
        write_txn.commit()?;

        Ok(Self { db, clock })
    }

    // =========================================================================
    // Guardians
    // =========================================================================

    /// Enroll a Guardian in `pending` state.
    ///
    /// The share index is checked against every row in the registry,
    /// including revoked ones, so an index is never handed to two people.
    pub fn add(&self, new: NewGuardian) -> RegistryResult<Guardian> {
        let display_name = new.display_name.trim().to_string();
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(RegistryError::InvalidParameters(format!(
                "display name must be 1..={MAX_DISPLAY_NAME_LEN} characters"
            )));
        }
        if new.share_index == Some(0) {
            return Err(RegistryError::InvalidParameters(
                "share index 0 is reserved".to_string(),
            ));
        }

        let now = self.clock.now();
        let write_txn = self.db.begin_write()?;
        let guardian = {
            let mut table = write_txn.open_table(GUARDIANS)?;
            let existing: Vec<Guardian> = decode_all(&table)?;
            let used: HashSet<u8> = existing.iter().map(|g| g.share_index).collect();

            let share_index = match new.share_index {
                Some(index) if used.contains(&index) => {
                    return Err(RegistryError::ShareIndexTaken(index))
                }
                Some(index) => index,
                None => (1..=u8::MAX)
                    .find(|index| !used.contains(index))
                    .ok_or(RegistryError::ShareIndexExhausted)?,
            };

            let guardian = Guardian {
                guardian_id: Uuid::new_v4().to_string(),
                display_name,
                contact: new.contact.filter(|c| !c.trim().is_empty()),
                share_index,
                status: GuardianStatus::Pending,
                created_at: now,
                last_verified_at: None,
                revoked_at: None,
            };
            let json = serde_json::to_vec(&guardian)?;
            table.insert(guardian.guardian_id.as_str(), json.as_slice())?;
            guardian
        };
        write_txn.commit()?;

        info!(
            guardian_id = %guardian.guardian_id,
            share_index = guardian.share_index,
            "Guardian added"
        );
        Ok(guardian)
    }

    /// Look up a single Guardian.
    pub fn get(&self, guardian_id: &str) -> RegistryResult<Option<Guardian>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GUARDIANS)?;
        match table.get(guardian_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All Guardians, ordered by share index.
    pub fn list(&self) -> RegistryResult<Vec<Guardian>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(GUARDIANS)?;
        let mut guardians: Vec<Guardian> = decode_all(&table)?;
        guardians.sort_by_key(|g| g.share_index);
        Ok(guardians)
    }

    /// Guardians with the given status, ordered by share index.
    pub fn list_by_status(&self, status: GuardianStatus) -> RegistryResult<Vec<Guardian>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|g| g.status == status)
            .collect())
    }

    /// Pending and active Guardians, ordered by share index.
    pub fn eligible(&self) -> RegistryResult<Vec<Guardian>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|g| g.status.is_eligible())
            .collect())
    }

    /// Record that the Guardian proved possession of a valid share.
    ///
    /// Moves `pending` to `active` and stamps `last_verified_at`.
    pub fn record_verification(&self, guardian_id: &str) -> RegistryResult<Guardian> {
        let now = self.clock.now();
        let guardian = self.update(guardian_id, |guardian| {
            transition(guardian, GuardianStatus::Active)?;
            guardian.last_verified_at = Some(now);
            Ok(())
        })?;
        info!(guardian_id, "Guardian verified");
        Ok(guardian)
    }

    /// Soft-delete: mark the Guardian `revoked`. Not reversible.
    pub fn revoke(&self, guardian_id: &str) -> RegistryResult<Guardian> {
        let now = self.clock.now();
        let guardian = self.update(guardian_id, |guardian| {
            transition(guardian, GuardianStatus::Revoked)?;
            guardian.revoked_at = Some(now);
            Ok(())
        })?;
        info!(guardian_id, "Guardian revoked");
        Ok(guardian)
    }

    /// Hard-delete the Guardian row.
    pub fn delete(&self, guardian_id: &str) -> RegistryResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(GUARDIANS)?;
            if table.remove(guardian_id)?.is_none() {
                return Err(RegistryError::NotFound(guardian_id.to_string()));
            }
        }
        write_txn.commit()?;
        info!(guardian_id, "Guardian deleted");
        Ok(())
    }

    fn update<F>(&self, guardian_id: &str, mutate: F) -> RegistryResult<Guardian>
    where
        F: FnOnce(&mut Guardian) -> RegistryResult<()>,
    {
        let write_txn = self.db.begin_write()?;
        let guardian = {
            let mut table = write_txn.open_table(GUARDIANS)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = {
                let existing = table
                    .get(guardian_id)?
                    .ok_or_else(|| RegistryError::NotFound(guardian_id.to_string()))?;
                existing.value().to_vec()
            };

            let mut guardian: Guardian = serde_json::from_slice(&existing_bytes)?;
            mutate(&mut guardian)?;

            let json = serde_json::to_vec(&guardian)?;
            table.insert(guardian_id, json.as_slice())?;
            guardian
        };
        write_txn.commit()?;
        Ok(guardian)
    }

    // =========================================================================
    // Ceremony history
    // =========================================================================

    /// Persist the outcome of a finished ceremony.
    pub fn record_ceremony(&self, record: &CeremonyRecord) -> RegistryResult<()> {
        let json = serde_json::to_vec(record)?;
        let key = record.ceremony_id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CEREMONIES)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All ceremony rows, oldest first.
    pub fn ceremonies(&self) -> RegistryResult<Vec<CeremonyRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CEREMONIES)?;
        let mut records: Vec<CeremonyRecord> = decode_all(&table)?;
        records.sort_by_key(|r| r.finished_at);
        Ok(records)
    }

    /// Whether a ceremony of `kind` has ever completed.
    pub fn has_completed(&self, kind: CeremonyKind) -> RegistryResult<bool> {
        Ok(self
            .ceremonies()?
            .iter()
            .any(|r| r.kind == kind && r.status == crate::ceremony::CeremonyStatus::Completed))
    }

    /// The most recent completed split or reshare.
    ///
    /// Cancelled, failed and expired ceremonies never change the scheme.
    pub fn authoritative_scheme(&self) -> RegistryResult<Option<CeremonyRecord>> {
        Ok(self
            .ceremonies()?
            .into_iter()
            .filter(CeremonyRecord::defines_scheme)
            .max_by_key(|r| r.finished_at))
    }

    /// Counts per status plus the current sharing scheme.
    pub fn summary(&self) -> RegistryResult<RegistrySummary> {
        let guardians = self.list()?;
        let count = |status| guardians.iter().filter(|g| g.status == status).count();
        let scheme = self.authoritative_scheme()?;
        let last_ceremony_at: Option<DateTime<Utc>> =
            self.ceremonies()?.last().map(|r| r.finished_at);

        Ok(RegistrySummary {
            total_guardians: guardians.len(),
            pending: count(GuardianStatus::Pending),
            active: count(GuardianStatus::Active),
            revoked: count(GuardianStatus::Revoked),
            threshold: scheme.as_ref().map(|s| s.threshold),
            total_shares: scheme.and_then(|s| s.total_shares),
            last_ceremony_at,
        })
    }
}

fn transition(guardian: &mut Guardian, next: GuardianStatus) -> RegistryResult<()> {
    if !guardian.status.can_transition_to(next) {
        return Err(RegistryError::InvalidTransition {
            from: guardian.status,
            to: next,
        });
    }
    guardian.status = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::CeremonyStatus;
    use chrono::Duration;

    fn temp_registry() -> (GuardianRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = GuardianRegistry::open(&dir.path().join("guardians.redb")).unwrap();
        (registry, dir)
    }

    fn new_guardian(name: &str) -> NewGuardian {
        NewGuardian {
            display_name: name.to_string(),
            contact: None,
            share_index: None,
        }
    }

    fn record(kind: CeremonyKind, status: CeremonyStatus, threshold: u8, age_mins: i64) -> CeremonyRecord {
        let finished_at = Utc::now() - Duration::minutes(age_mins);
        CeremonyRecord {
            ceremony_id: Uuid::new_v4(),
            kind,
            status,
            threshold,
            total_shares: Some(threshold + 2),
            started_at: finished_at - Duration::minutes(1),
            finished_at,
        }
    }

    #[test]
    fn add_and_get_guardian() {
        let (registry, _dir) = temp_registry();
        let guardian = registry.add(new_guardian("Alice")).unwrap();

        assert_eq!(guardian.status, GuardianStatus::Pending);
        assert_eq!(guardian.share_index, 1);
        assert_eq!(registry.get(&guardian.guardian_id).unwrap(), Some(guardian));
        assert_eq!(registry.get("missing").unwrap(), None);
    }

    #[test]
    fn share_indices_are_unique_and_lowest_free() {
        let (registry, _dir) = temp_registry();
        let explicit = registry
            .add(NewGuardian {
                share_index: Some(2),
                ..new_guardian("Bob")
            })
            .unwrap();
        assert_eq!(explicit.share_index, 2);

        assert_eq!(registry.add(new_guardian("A")).unwrap().share_index, 1);
        assert_eq!(registry.add(new_guardian("C")).unwrap().share_index, 3);

        let taken = registry.add(NewGuardian {
            share_index: Some(3),
            ..new_guardian("D")
        });
        assert!(matches!(taken, Err(RegistryError::ShareIndexTaken(3))));
    }

    #[test]
    fn revoked_indices_are_not_reused() {
        let (registry, _dir) = temp_registry();
        let first = registry.add(new_guardian("A")).unwrap();
        registry.revoke(&first.guardian_id).unwrap();
        assert_eq!(registry.add(new_guardian("B")).unwrap().share_index, 2);
    }

    #[test]
    fn rejects_invalid_input() {
        let (registry, _dir) = temp_registry();
        assert!(matches!(
            registry.add(new_guardian("   ")),
            Err(RegistryError::InvalidParameters(_))
        ));
        assert!(matches!(
            registry.add(NewGuardian {
                share_index: Some(0),
                ..new_guardian("Zero")
            }),
            Err(RegistryError::InvalidParameters(_))
        ));
    }

    #[test]
    fn lifecycle_has_no_resurrection() {
        let (registry, _dir) = temp_registry();
        let guardian = registry.add(new_guardian("Alice")).unwrap();
        let id = guardian.guardian_id.as_str();

        let verified = registry.record_verification(id).unwrap();
        assert_eq!(verified.status, GuardianStatus::Active);
        assert!(verified.last_verified_at.is_some());
        assert_eq!(verified.share_index, guardian.share_index);

        let revoked = registry.revoke(id).unwrap();
        assert_eq!(revoked.status, GuardianStatus::Revoked);
        assert!(revoked.revoked_at.is_some());

        assert!(matches!(
            registry.record_verification(id),
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert!(matches!(
            registry.revoke(id),
            Err(RegistryError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn list_by_status_and_eligible() {
        let (registry, _dir) = temp_registry();
        let a = registry.add(new_guardian("A")).unwrap();
        let b = registry.add(new_guardian("B")).unwrap();
        let c = registry.add(new_guardian("C")).unwrap();
        registry.record_verification(&a.guardian_id).unwrap();
        registry.revoke(&b.guardian_id).unwrap();

        let active = registry.list_by_status(GuardianStatus::Active).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].guardian_id, a.guardian_id);

        let eligible: Vec<String> = registry
            .eligible()
            .unwrap()
            .into_iter()
            .map(|g| g.guardian_id)
            .collect();
        assert_eq!(eligible, vec![a.guardian_id, c.guardian_id]);
    }

    #[test]
    fn timestamps_come_from_the_injected_clock() {
        let dir = tempfile::tempdir().unwrap();
        let start = Utc::now() - Duration::days(30);
        let clock = Arc::new(crate::clock::ManualClock::new(start));
        let registry =
            GuardianRegistry::open_with_clock(&dir.path().join("guardians.redb"), clock.clone())
                .unwrap();

        let guardian = registry.add(new_guardian("Alice")).unwrap();
        assert_eq!(guardian.created_at, start);

        clock.advance(Duration::hours(1));
        let verified = registry.record_verification(&guardian.guardian_id).unwrap();
        assert_eq!(verified.last_verified_at, Some(start + Duration::hours(1)));

        clock.advance(Duration::hours(1));
        let revoked = registry.revoke(&guardian.guardian_id).unwrap();
        assert_eq!(revoked.revoked_at, Some(start + Duration::hours(2)));
    }

    #[test]
    fn hard_delete_removes_row() {
        let (registry, _dir) = temp_registry();
        let guardian = registry.add(new_guardian("A")).unwrap();
        registry.delete(&guardian.guardian_id).unwrap();
        assert_eq!(registry.get(&guardian.guardian_id).unwrap(), None);
        assert!(matches!(
            registry.delete(&guardian.guardian_id),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn authoritative_scheme_ignores_unfinished_reshares() {
        let (registry, _dir) = temp_registry();
        assert_eq!(registry.authoritative_scheme().unwrap(), None);

        registry
            .record_ceremony(&record(CeremonyKind::InitialSplit, CeremonyStatus::Completed, 3, 30))
            .unwrap();
        registry
            .record_ceremony(&record(CeremonyKind::Reshare, CeremonyStatus::Cancelled, 4, 20))
            .unwrap();
        registry
            .record_ceremony(&record(CeremonyKind::Recovery, CeremonyStatus::Completed, 3, 10))
            .unwrap();
        assert_eq!(registry.authoritative_scheme().unwrap().unwrap().threshold, 3);

        registry
            .record_ceremony(&record(CeremonyKind::Reshare, CeremonyStatus::Completed, 2, 5))
            .unwrap();
        assert_eq!(registry.authoritative_scheme().unwrap().unwrap().threshold, 2);
        assert!(registry.has_completed(CeremonyKind::InitialSplit).unwrap());
    }

    #[test]
    fn summary_counts_statuses() {
        let (registry, _dir) = temp_registry();
        let a = registry.add(new_guardian("A")).unwrap();
        let b = registry.add(new_guardian("B")).unwrap();
        registry.add(new_guardian("C")).unwrap();
        registry.record_verification(&a.guardian_id).unwrap();
        registry.revoke(&b.guardian_id).unwrap();
        registry
            .record_ceremony(&record(CeremonyKind::InitialSplit, CeremonyStatus::Completed, 2, 1))
            .unwrap();

        let summary = registry.summary().unwrap();
        assert_eq!(summary.total_guardians, 3);
        assert_eq!((summary.pending, summary.active, summary.revoked), (1, 1, 1));
        assert_eq!(summary.threshold, Some(2));
        assert_eq!(summary.total_shares, Some(4));
        assert!(summary.last_ceremony_at.is_some());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardians.redb");
        let id = {
            let registry = GuardianRegistry::open(&path).unwrap();
            registry.add(new_guardian("Persistent")).unwrap().guardian_id
        };
        let registry = GuardianRegistry::open(&path).unwrap();
        assert_eq!(registry.get(&id).unwrap().unwrap().display_name, "Persistent");
    }
}
