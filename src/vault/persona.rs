// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persona records under two-layer envelope encryption.
//!
//! ```text
//! plaintext ──AES-GCM(DEK, aad = record_id)──▶ ciphertext, iv, tag
//! DEK       ──AES-GCM(MEK, aad = record_id)──▶ wrapped_dek
//! ```
//!
//! A fresh DEK is generated for every call to [`encrypt_record`] and wiped
//! before the function returns. Binding the record id as AAD means a record
//! file renamed to another id no longer decrypts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroize;

use super::fs::SHRED_PASSES;
use super::{RecordId, VaultError, VaultPaths, VaultResult, VaultStorage};
use crate::crypto::envelope::{decrypt_with_aad, encrypt_with_aad};
use crate::crypto::{generate_key, Ciphertext, SecretKey, IV_LEN, KEY_LEN, TAG_LEN};
use crate::seal::{SealError, SealManager};

/// Base64 (standard alphabet, padded) encoding for byte fields.
mod b64 {
    use base64ct::{Base64, Encoding};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64::decode_vec(&encoded).map_err(serde::de::Error::custom)
    }
}

/// The DEK encrypted under the MEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

/// On-disk form of a persona record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub record_id: String,
    pub wrapped_dek: WrappedKey,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
}

impl EncryptedRecord {
    fn payload(&self) -> VaultResult<Ciphertext> {
        to_ciphertext(&self.ciphertext, &self.iv, &self.tag)
    }

    fn wrapped(&self) -> VaultResult<Ciphertext> {
        let wrapped = &self.wrapped_dek;
        if wrapped.ciphertext.len() != KEY_LEN {
            return Err(VaultError::MalformedRecord(format!(
                "wrapped DEK must be {KEY_LEN} bytes, got {}",
                wrapped.ciphertext.len()
            )));
        }
        to_ciphertext(&wrapped.ciphertext, &wrapped.iv, &wrapped.tag)
    }
}

fn to_ciphertext(data: &[u8], iv: &[u8], tag: &[u8]) -> VaultResult<Ciphertext> {
    let iv: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| VaultError::MalformedRecord(format!("iv must be {IV_LEN} bytes")))?;
    let tag: [u8; TAG_LEN] = tag
        .try_into()
        .map_err(|_| VaultError::MalformedRecord(format!("tag must be {TAG_LEN} bytes")))?;
    Ok(Ciphertext {
        data: data.to_vec(),
        iv,
        tag,
    })
}

/// Encrypt `plaintext` for `record_id` under a fresh DEK wrapped by `mek`.
pub fn encrypt_record(
    mek: &SecretKey,
    plaintext: &[u8],
    record_id: &str,
) -> VaultResult<EncryptedRecord> {
    let id = RecordId::parse(record_id)?;
    let aad = id.as_str().as_bytes();

    let dek = generate_key()?;
    let payload = encrypt_with_aad(dek.expose(), plaintext, aad)?;
    let wrapped = encrypt_with_aad(mek.expose(), dek.expose(), aad)?;
    drop(dek);

    Ok(EncryptedRecord {
        record_id: id.to_string(),
        wrapped_dek: WrappedKey {
            ciphertext: wrapped.data,
            iv: wrapped.iv.to_vec(),
            tag: wrapped.tag.to_vec(),
        },
        ciphertext: payload.data,
        iv: payload.iv.to_vec(),
        tag: payload.tag.to_vec(),
    })
}

/// Unwrap the DEK with `mek` and decrypt the payload.
///
/// # Errors
///
/// [`crate::crypto::CryptoError::AuthenticationFailed`] (wrapped in
/// [`VaultError::Crypto`]) on a wrong MEK or any tampered field.
pub fn decrypt_record(mek: &SecretKey, record: &EncryptedRecord) -> VaultResult<Vec<u8>> {
    let mut scratch = [0u8; KEY_LEN];
    decrypt_record_with_scratch(mek, record, &mut scratch)
}

/// [`decrypt_record`] with a caller-provided buffer for the unwrapped DEK.
///
/// `scratch` is zeroed before returning on every path.
pub fn decrypt_record_with_scratch(
    mek: &SecretKey,
    record: &EncryptedRecord,
    scratch: &mut [u8; KEY_LEN],
) -> VaultResult<Vec<u8>> {
    let id = RecordId::parse(&record.record_id)?;
    let aad = id.as_str().as_bytes();

    let wrapped = record.wrapped()?;
    let payload = record.payload()?;

    let mut dek = decrypt_with_aad(mek.expose(), &wrapped, aad)?;
    if dek.len() != KEY_LEN {
        dek.zeroize();
        return Err(VaultError::MalformedRecord("unwrapped DEK has wrong length".to_string()));
    }
    scratch.copy_from_slice(&dek);
    dek.zeroize();

    let result = decrypt_with_aad(&scratch[..], &payload, aad).map_err(VaultError::from);
    scratch.zeroize();
    result
}

/// File-backed store of [`EncryptedRecord`]s.
#[derive(Debug, Clone)]
pub struct PersonaVault {
    storage: VaultStorage,
}

impl PersonaVault {
    /// Wrap an already-initialized storage.
    pub fn new(storage: VaultStorage) -> Self {
        Self { storage }
    }

    /// Initialize storage under `paths` and wrap it.
    pub fn open(paths: VaultPaths) -> VaultResult<Self> {
        let mut storage = VaultStorage::new(paths);
        storage.initialize()?;
        Ok(Self::new(storage))
    }

    /// Underlying storage.
    pub fn storage(&self) -> &VaultStorage {
        &self.storage
    }

    fn record_path(&self, id: &RecordId) -> VaultResult<PathBuf> {
        self.storage
            .contained_path(self.storage.paths().personas_dir(), &id.file_name())
    }

    /// Persist `record`, replacing any record with the same id.
    pub fn store(&self, record: &EncryptedRecord) -> VaultResult<()> {
        let id = RecordId::parse(&record.record_id)?;
        let path = self.record_path(&id)?;
        self.storage.write_json(&path, record)?;
        debug!(record_id = %id, "Stored persona record");
        Ok(())
    }

    /// Read the record stored under `record_id`.
    pub fn load(&self, record_id: &str) -> VaultResult<EncryptedRecord> {
        let id = RecordId::parse(record_id)?;
        let path = self.record_path(&id)?;
        if !self.storage.exists(&path) {
            return Err(VaultError::NotFound(id.to_string()));
        }

        let record: EncryptedRecord = self.storage.read_json(&path)?;
        if record.record_id != id.as_str() {
            return Err(VaultError::MalformedRecord(
                "record id does not match file name".to_string(),
            ));
        }
        Ok(record)
    }

    /// Overwrite the record file with random bytes, then unlink it.
    ///
    /// Best-effort on copy-on-write or wear-leveled storage.
    pub fn destroy(&self, record_id: &str) -> VaultResult<()> {
        let id = RecordId::parse(record_id)?;
        let path = self.record_path(&id)?;
        if !self.storage.exists(&path) {
            return Err(VaultError::NotFound(id.to_string()));
        }

        self.storage.shred(&path, SHRED_PASSES)?;
        info!(record_id = %id, passes = SHRED_PASSES, "Destroyed persona record");
        Ok(())
    }

    /// Whether a record is stored under `record_id`.
    pub fn exists(&self, record_id: &str) -> VaultResult<bool> {
        let id = RecordId::parse(record_id)?;
        let path = self.record_path(&id)?;
        Ok(self.storage.exists(&path))
    }

    /// Ids of all stored records, sorted.
    pub fn list_ids(&self) -> VaultResult<Vec<String>> {
        self.storage.list_files(
            self.storage.paths().personas_dir(),
            super::paths::RECORD_EXTENSION,
        )
    }

    /// Encrypt under the live MEK and store.
    pub fn seal_record(
        &self,
        seal: &SealManager,
        record_id: &str,
        plaintext: &[u8],
    ) -> VaultResult<EncryptedRecord> {
        let record = seal.with_key(|mek| encrypt_record(mek, plaintext, record_id))??;
        self.store(&record)?;
        Ok(record)
    }

    /// Load and decrypt under the live MEK.
    pub fn open_record(&self, seal: &SealManager, record_id: &str) -> VaultResult<Vec<u8>> {
        if seal.is_sealed() {
            return Err(SealError::Sealed.into());
        }
        let record = self.load(record_id)?;
        seal.with_key(|mek| decrypt_record(mek, &record))?
    }
}
