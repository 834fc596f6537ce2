// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Zeroize-on-drop buffer for 256-bit secret keys.
//!
//! A [`SecretKey`] is the only type that ever holds MEK or DEK bytes. It is
//! not `Clone`, its `Debug` output is redacted, and the raw bytes are only
//! reachable through [`SecretKey::expose`], which lends them for the duration
//! of a borrow.
//!
//! On drop the buffer is overwritten with fresh random bytes and then zeroed.
//! This is best-effort hygiene against a cooperating runtime: it does not
//! defend against a compromised host, swap, or core dumps.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::{fill_random, CryptoError, CryptoResult, KEY_LEN};

/// A 32-byte symmetric key that wipes itself when dropped.
pub struct SecretKey {
    bytes: [u8; KEY_LEN],
}

impl SecretKey {
    /// Generate a fresh key from the system CSPRNG.
    pub fn generate() -> CryptoResult<Self> {
        let mut key = Self {
            bytes: [0u8; KEY_LEN],
        };
        fill_random(&mut key.bytes)?;
        Ok(key)
    }

    /// Copy key material out of `bytes` into a new buffer.
    ///
    /// The caller keeps ownership of (and responsibility for wiping) its own
    /// slice; the returned key never aliases it.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        let mut key = Self {
            bytes: [0u8; KEY_LEN],
        };
        key.bytes.copy_from_slice(bytes);
        Ok(key)
    }

    /// Take ownership of a key array, zeroing the source.
    pub fn from_array(bytes: &mut [u8; KEY_LEN]) -> Self {
        let key = Self { bytes: *bytes };
        bytes.zeroize();
        key
    }

    /// Decode a 64-character hex string into a key.
    ///
    /// The intermediate decode buffer is zeroized on every path. Errors never
    /// echo the input.
    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let mut decoded = hex::decode(encoded.trim()).map_err(|_| {
            CryptoError::InvalidParameters("key is not valid hexadecimal".to_string())
        })?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Borrow the raw key bytes for a single operation.
    ///
    /// Do not copy the result anywhere that outlives the borrow.
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Constant-time equality with another key.
    pub fn ct_eq(&self, other: &SecretKey) -> bool {
        self.bytes[..].ct_eq(&other.bytes[..]).into()
    }

    /// Overwrite with random bytes, then with zeros.
    fn wipe(&mut self) {
        // Randomness failure still leaves the zeroing pass below.
        let _ = fill_random(&mut self.bytes);
        self.bytes.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}
