// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AES-256-GCM authenticated encryption.
//!
//! Every call draws a fresh 96-bit IV from the system CSPRNG and produces a
//! 128-bit tag kept separately from the ciphertext. A tag that fails to
//! verify is always a hard error: no partial plaintext ever leaves
//! [`decrypt`].

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use zeroize::Zeroize;

use super::{fill_random, CryptoError, CryptoResult, SecretKey, IV_LEN, KEY_LEN, TAG_LEN};

/// Output of [`encrypt`]: ciphertext body, IV and detached tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    /// Encrypted bytes, same length as the plaintext.
    pub data: Vec<u8>,
    /// Random 96-bit nonce.
    pub iv: [u8; IV_LEN],
    /// 128-bit GCM authentication tag.
    pub tag: [u8; TAG_LEN],
}

/// Generate a random 256-bit key.
pub fn generate_key() -> CryptoResult<SecretKey> {
    SecretKey::generate()
}

/// Encrypt `plaintext` under `key`.
///
/// Fails only if `key` is not 32 bytes (or the random source is down).
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> CryptoResult<Ciphertext> {
    encrypt_with_aad(key, plaintext, &[])
}

/// Encrypt `plaintext` under `key`, binding `aad` into the tag.
pub fn encrypt_with_aad(key: &[u8], plaintext: &[u8], aad: &[u8]) -> CryptoResult<Ciphertext> {
    let sealing_key = aead_key(key)?;

    let mut iv = [0u8; IV_LEN];
    fill_random(&mut iv)?;

    let mut data = plaintext.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(Nonce::assume_unique_for_key(iv), Aad::from(aad), &mut data)
        .map_err(|_| CryptoError::InvalidParameters("plaintext too large".to_string()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(Ciphertext {
        data,
        iv,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate `ciphertext` under `key`.
///
/// # Errors
///
/// - [`CryptoError::InvalidKeyLength`] if `key` is not 32 bytes
/// - [`CryptoError::AuthenticationFailed`] if the tag does not verify
pub fn decrypt(key: &[u8], ciphertext: &Ciphertext) -> CryptoResult<Vec<u8>> {
    decrypt_with_aad(key, ciphertext, &[])
}

/// Decrypt and authenticate `ciphertext`, checking it was bound to `aad`.
pub fn decrypt_with_aad(key: &[u8], ciphertext: &Ciphertext, aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let opening_key = aead_key(key)?;

    let mut in_out = Vec::with_capacity(ciphertext.data.len() + TAG_LEN);
    in_out.extend_from_slice(&ciphertext.data);
    in_out.extend_from_slice(&ciphertext.tag);

    let opened = opening_key
        .open_in_place(
            Nonce::assume_unique_for_key(ciphertext.iv),
            Aad::from(aad),
            &mut in_out,
        )
        .map(|plaintext| plaintext.len());

    match opened {
        Ok(len) => {
            in_out.truncate(len);
            Ok(in_out)
        }
        Err(_) => {
            in_out.zeroize();
            Err(CryptoError::AuthenticationFailed)
        }
    }
}

/// Overwrite `buffer` with zeros in place.
///
/// Call on every secret buffer right after its last use, on error paths too.
pub fn zeroize(buffer: &mut [u8]) {
    buffer.zeroize();
}

fn aead_key(key: &[u8]) -> CryptoResult<LessSafeKey> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength(key.len()));
    }
    let unbound =
        UnboundKey::new(&AES_256_GCM, key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
    Ok(LessSafeKey::new(unbound))
}
