// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seal, unlock ceremony and vault working together.

use std::sync::Arc;

use chrono::Duration;
use relational_key_custody::{
    audit::AuditLog,
    ceremony::{CeremonyKind, CompletionOutcome, KeyCeremonies, KeyCeremonyError},
    crypto::{
        shamir::{reconstruct_key, split},
        SecretKey,
    },
    guardians::{GuardianRegistry, NewGuardian},
    seal::{Resolution, SealError, SealManager},
    vault::{PersonaVault, VaultError, VaultPaths},
};
use tempfile::TempDir;

#[test]
fn unlock_encrypt_seal_and_reopen() {
    let temp = TempDir::new().unwrap();
    let vault = PersonaVault::open(VaultPaths::new(temp.path())).unwrap();
    let seal = SealManager::new();

    let mek = SecretKey::generate().unwrap();
    let shares = split(mek.expose(), 3, 5).unwrap();

    seal.start_unlock_ceremony(3, seal.now() + Duration::hours(1))
        .unwrap();

    // Guardians A, C and E submit.
    let mut receipts = Vec::new();
    for (guardian, share) in ["A", "B", "C", "D", "E"].into_iter().zip(shares) {
        if matches!(guardian, "A" | "C" | "E") {
            receipts.push(seal.submit_share(guardian, share).unwrap());
        }
    }
    assert!(!receipts[1].threshold_met);
    let last = receipts[2];
    assert!(last.accepted);
    assert_eq!(last.shares_collected, 3);
    assert!(last.threshold_met);
    assert_eq!(seal.status().shares_collected, 3);

    seal.complete_ceremony(|ctx, collected, live| {
        assert!(live.is_none());
        let key = reconstruct_key(&collected, ctx.threshold)?;
        Ok::<_, KeyCeremonyError>(Resolution::unseal(key, ()))
    })
    .unwrap();
    assert!(!seal.is_sealed());

    vault.seal_record(&seal, "persona-42", b"hello world").unwrap();

    seal.seal();
    assert!(seal.is_sealed());
    assert!(matches!(
        vault.open_record(&seal, "persona-42"),
        Err(VaultError::Seal(SealError::Sealed))
    ));

    seal.unseal(mek.expose()).unwrap();
    assert_eq!(
        vault.open_record(&seal, "persona-42").unwrap(),
        b"hello world"
    );
}

#[test]
fn guardians_recover_a_sealed_service() {
    let temp = TempDir::new().unwrap();
    let paths = VaultPaths::new(temp.path());
    let vault = PersonaVault::open(paths.clone()).unwrap();
    let registry = Arc::new(GuardianRegistry::open(&paths.guardian_db()).unwrap());
    for name in ["A", "B", "C", "D", "E"] {
        registry
            .add(NewGuardian {
                display_name: name.to_string(),
                ..Default::default()
            })
            .unwrap();
    }

    let seal = Arc::new(SealManager::new());
    let ceremonies = KeyCeremonies::new(
        seal.clone(),
        registry.clone(),
        AuditLog::new(vault.storage().clone()),
        Duration::hours(1),
    );

    let issued: Vec<(String, String)> = ceremonies
        .initial_split(3)
        .unwrap()
        .shares
        .iter()
        .map(|s| (s.guardian_id.clone(), s.share.clone()))
        .collect();
    vault.seal_record(&seal, "persona-7", b"hello world").unwrap();

    seal.seal();
    ceremonies
        .start(CeremonyKind::Recovery, None, None, None)
        .unwrap();

    // A revoked Guardian cannot take part.
    registry.revoke(&issued[1].0).unwrap();
    assert!(ceremonies.submit_share(&issued[1].0, &issued[1].1).is_err());

    for i in [0, 2, 4] {
        ceremonies.submit_share(&issued[i].0, &issued[i].1).unwrap();
    }
    let outcome = ceremonies.complete().unwrap();
    assert!(matches!(outcome, CompletionOutcome::Unsealed { .. }));

    assert_eq!(
        vault.open_record(&seal, "persona-7").unwrap(),
        b"hello world"
    );
    assert_eq!(registry.summary().unwrap().active, 3);
}
