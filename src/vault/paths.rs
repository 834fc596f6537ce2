// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the vault layout.

use std::fmt;
use std::path::{Path, PathBuf};

use super::{VaultError, VaultResult};

/// Base directory for all persistent custody data.
pub const DATA_ROOT: &str = "/data";

/// File extension of persona record files.
pub const RECORD_EXTENSION: &str = "persona.json";

/// Longest accepted record identifier.
pub const MAX_RECORD_ID_LEN: usize = 128;

/// A record identifier that is safe to use as a file name.
///
/// Only ASCII letters, digits, `-` and `_` are accepted, so the identifier
/// can never name a parent directory, an absolute path, or embed a NUL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Validate `raw` against the allow-list.
    ///
    /// Runs before any filesystem access.
    pub fn parse(raw: &str) -> VaultResult<Self> {
        if raw.contains('\0')
            || raw.contains('/')
            || raw.contains('\\')
            || raw.starts_with('.')
            || raw.contains("..")
            || Path::new(raw).is_absolute()
        {
            return Err(VaultError::PathTraversalRejected);
        }
        if raw.is_empty() || raw.len() > MAX_RECORD_ID_LEN {
            return Err(VaultError::InvalidRecordId(format!(
                "length must be 1..={MAX_RECORD_ID_LEN}"
            )));
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(VaultError::InvalidRecordId(
                "only letters, digits, '-' and '_' are allowed".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of this record inside the personas directory.
    pub fn file_name(&self) -> String {
        format!("{}.{RECORD_EXTENSION}", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage path utilities for the vault.
#[derive(Debug, Clone)]
pub struct VaultPaths {
    root: PathBuf,
}

impl Default for VaultPaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl VaultPaths {
    /// Create a new VaultPaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all custody data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Persona Paths ==========

    /// Directory containing all persona records.
    pub fn personas_dir(&self) -> PathBuf {
        self.root.join("personas")
    }

    /// Path to a specific persona record file.
    pub fn persona_record(&self, id: &RecordId) -> PathBuf {
        self.personas_dir().join(id.file_name())
    }

    // ========== Guardian Registry ==========

    /// Path to the embedded Guardian registry database.
    pub fn guardian_db(&self) -> PathBuf {
        self.root.join("guardians.redb")
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}
