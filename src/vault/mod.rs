// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Persona Vault
//!
//! At-rest storage for persona records under envelope encryption.
//!
//! ## Layout
//!
//! ```text
//! /data/
//! ├── personas/
//! │   └── {record_id}.persona.json   # EncryptedRecord (JSON)
//! ├── guardians.redb                 # Guardian registry + ceremony history
//! └── audit/
//!     └── {date}/events.jsonl
//! ```
//!
//! Every record carries its own DEK, wrapped under the MEK. Record ids are
//! validated by [`RecordId::parse`] before any path is built, so an id can
//! never address a file outside `personas/`.

pub mod fs;
pub mod paths;
pub mod persona;

use std::io;

use crate::crypto::CryptoError;
use crate::seal::SealError;

pub use fs::VaultStorage;
pub use paths::{RecordId, VaultPaths};
pub use persona::{decrypt_record, encrypt_record, EncryptedRecord, PersonaVault, WrappedKey};

/// Errors raised by the vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Record id fails the allow-list.
    #[error("invalid record id: {0}")]
    InvalidRecordId(String),

    /// Record id would resolve outside the personas directory.
    #[error("path traversal rejected")]
    PathTraversalRejected,

    /// No record is stored under the requested id.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Storage directories have not been created yet.
    #[error("storage not initialized")]
    NotInitialized,

    /// Filesystem read, write or rename failed.
    #[error("storage failure: {0}")]
    Storage(io::Error),

    /// Record file is not valid JSON for an [`EncryptedRecord`].
    #[error("record encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record file parsed but its fields are unusable.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Stored bytes did not match what was written.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Seal(#[from] SealError),
}

impl From<io::Error> for VaultError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            VaultError::NotFound(e.to_string())
        } else {
            VaultError::Storage(e)
        }
    }
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
