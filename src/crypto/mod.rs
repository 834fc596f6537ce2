// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptographic Primitives
//!
//! Stateless building blocks for key custody:
//!
//! - [`shamir`] - threshold splitting and reconstruction of the master key
//!   over GF(2^8)
//! - [`envelope`] - AES-256-GCM authenticated encryption, key generation and
//!   buffer zeroization
//! - [`secret`] - the [`SecretKey`] buffer that holds MEK and DEK bytes and
//!   wipes itself on drop
//!
//! ## Key Hierarchy
//!
//! ```text
//! Guardian shares ──reconstruct──▶ MEK (memory only, owned by SealManager)
//!                                   │
//!                                   ▼ wraps
//!                                  DEK (fresh per record, zeroized after use)
//!                                   │
//!                                   ▼ encrypts
//!                                  persona payload
//! ```
//!
//! Randomness always comes from `ring::rand::SystemRandom`.

pub mod envelope;
pub mod secret;
pub mod shamir;

use ring::rand::{SecureRandom, SystemRandom};

pub use envelope::{decrypt, encrypt, generate_key, zeroize, Ciphertext};
pub use secret::SecretKey;
pub use shamir::{reconstruct, reshare, split, split_at, validate_share_format, Share};

/// Length in bytes of every symmetric key handled here (MEK and DEK).
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length (96 bits).
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length (128 bits).
pub const TAG_LEN: usize = 16;

/// Errors raised by the cryptographic primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Threshold or share count outside the supported range.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Fewer shares than the threshold were supplied.
    #[error("insufficient shares: need {needed}, got {provided}")]
    InsufficientShares { needed: u8, provided: usize },

    /// A share failed structural validation.
    #[error("malformed share: {0}")]
    MalformedShare(String),

    /// Threshold outside `[2, 255]`.
    #[error("share count out of range: {0}")]
    ShareCountOutOfRange(usize),

    /// Key is not exactly [`KEY_LEN`] bytes.
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The AEAD tag did not verify. Wrong key or tampered ciphertext.
    #[error("authentication failed: ciphertext was tampered with or the key is wrong")]
    AuthenticationFailed,

    /// The operating system random source failed.
    #[error("secure random source unavailable")]
    RandomUnavailable,
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Fill `buf` from the system CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> CryptoResult<()> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| CryptoError::RandomUnavailable)
}
