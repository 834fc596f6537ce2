// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::audit::AuditLog;
use crate::ceremony::KeyCeremonies;
use crate::guardians::GuardianRegistry;
use crate::seal::SealManager;
use crate::vault::PersonaVault;

/// Shared handles for the HTTP handlers.
///
/// One [`SealManager`] per process; every clone of the state points at it.
#[derive(Clone)]
pub struct AppState {
    pub seal: Arc<SealManager>,
    pub registry: Arc<GuardianRegistry>,
    pub vault: Arc<PersonaVault>,
    pub ceremonies: Arc<KeyCeremonies>,
    pub audit: AuditLog,
}

impl AppState {
    pub fn new(
        seal: Arc<SealManager>,
        registry: Arc<GuardianRegistry>,
        vault: Arc<PersonaVault>,
        ceremony_ttl: chrono::Duration,
    ) -> Self {
        let audit = AuditLog::new(vault.storage().clone());
        let ceremonies = Arc::new(KeyCeremonies::new(
            seal.clone(),
            registry.clone(),
            audit.clone(),
            ceremony_ttl,
        ));
        Self {
            seal,
            registry,
            vault,
            ceremonies,
            audit,
        }
    }
}
