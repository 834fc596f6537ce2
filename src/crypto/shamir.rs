// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shamir secret sharing over GF(2^8).
//!
//! Each secret byte is the constant term of its own random polynomial of
//! degree `threshold - 1`; a share is that family of polynomials evaluated at
//! one nonzero x-coordinate. Any `threshold` shares recover the secret by
//! Lagrange interpolation at x = 0, fewer reveal nothing about it.
//!
//! ## Share Encoding
//!
//! ```text
//! version(1) | threshold(1) | x(1) | split_id(4) | y(len) | checksum(4)
//! ```
//!
//! serialized as URL-safe unpadded base64. `split_id` is random per split so
//! shares from different splits cannot be mixed; `checksum` is the first four
//! bytes of SHA-256 over everything before it and catches transcription
//! errors. Neither proves a share belongs to a valid scheme: only a
//! successful reconstruction does.
//!
//! Field arithmetic uses the AES polynomial x^8 + x^4 + x^3 + x + 1 and is
//! written without data-dependent branches.

use std::borrow::Borrow;
use std::fmt;

use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use super::{fill_random, CryptoError, CryptoResult, SecretKey};

/// Current share encoding version.
pub const SHARE_VERSION: u8 = 1;

/// Smallest threshold the scheme accepts.
pub const MIN_THRESHOLD: u8 = 2;

/// Largest secret accepted by [`split`].
pub const MAX_SECRET_LEN: usize = 1024;

const SPLIT_ID_LEN: usize = 4;
const HEADER_LEN: usize = 3 + SPLIT_ID_LEN;
const CHECKSUM_LEN: usize = 4;
const MIN_ENCODED_LEN: usize = HEADER_LEN + 1 + CHECKSUM_LEN;

/// One Guardian's fragment of a split secret.
///
/// The y-values are wiped when the share is dropped.
pub struct Share {
    x: u8,
    threshold: u8,
    split_id: [u8; SPLIT_ID_LEN],
    y: Vec<u8>,
}

impl Share {
    /// The share's x-coordinate, which is also the Guardian's share index.
    pub fn index(&self) -> u8 {
        self.x
    }

    /// Threshold tag embedded at split time.
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Identifier shared by all shares of one split.
    pub fn split_id(&self) -> [u8; SPLIT_ID_LEN] {
        self.split_id
    }

    /// Encode for transport to a Guardian.
    ///
    /// The returned string is secret material: show it once, never store it.
    pub fn encode(&self) -> String {
        let mut bytes = Zeroizing::new(Vec::with_capacity(
            HEADER_LEN + self.y.len() + CHECKSUM_LEN,
        ));
        bytes.push(SHARE_VERSION);
        bytes.push(self.threshold);
        bytes.push(self.x);
        bytes.extend_from_slice(&self.split_id);
        bytes.extend_from_slice(&self.y);
        let checksum = checksum(&bytes);
        bytes.extend_from_slice(&checksum);
        Base64UrlUnpadded::encode_string(&bytes)
    }

    /// Parse and structurally validate an encoded share.
    pub fn decode(encoded: &str) -> CryptoResult<Self> {
        let bytes = Zeroizing::new(
            Base64UrlUnpadded::decode_vec(encoded.trim())
                .map_err(|_| CryptoError::MalformedShare("not valid base64".to_string()))?,
        );

        if bytes.len() < MIN_ENCODED_LEN {
            return Err(CryptoError::MalformedShare(format!(
                "expected at least {MIN_ENCODED_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let (body, tail) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if !bool::from(checksum(body)[..].ct_eq(tail)) {
            return Err(CryptoError::MalformedShare("checksum mismatch".to_string()));
        }

        if body[0] != SHARE_VERSION {
            return Err(CryptoError::MalformedShare(format!(
                "unsupported share version {}",
                body[0]
            )));
        }

        let threshold = body[1];
        if threshold < MIN_THRESHOLD {
            return Err(CryptoError::MalformedShare(format!(
                "embedded threshold {threshold} is below {MIN_THRESHOLD}"
            )));
        }

        let x = body[2];
        if x == 0 {
            return Err(CryptoError::MalformedShare(
                "share index cannot be 0".to_string(),
            ));
        }

        let mut split_id = [0u8; SPLIT_ID_LEN];
        split_id.copy_from_slice(&body[3..HEADER_LEN]);

        Ok(Self {
            x,
            threshold,
            split_id,
            y: body[HEADER_LEN..].to_vec(),
        })
    }
}

impl Drop for Share {
    fn drop(&mut self) {
        self.y.zeroize();
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.x)
            .field("threshold", &self.threshold)
            .field("split_id", &hex::encode(self.split_id))
            .field("y", &"[REDACTED]")
            .finish()
    }
}

/// Split `secret` into `total` shares, any `threshold` of which reconstruct it.
///
/// Shares are issued at x = 1..=total.
pub fn split(secret: &[u8], threshold: u8, total: u8) -> CryptoResult<Vec<Share>> {
    if threshold < MIN_THRESHOLD || threshold > total {
        return Err(CryptoError::InvalidParameters(format!(
            "require {MIN_THRESHOLD} <= threshold <= total <= 255, got threshold={threshold} total={total}"
        )));
    }
    let xs: Vec<u8> = (1..=total).collect();
    split_at(secret, threshold, &xs)
}

/// Split `secret` with shares issued at the given x-coordinates.
///
/// `xs` must be distinct and nonzero; one share is produced per entry, in
/// order. Used to issue shares directly at each Guardian's share index.
pub fn split_at(secret: &[u8], threshold: u8, xs: &[u8]) -> CryptoResult<Vec<Share>> {
    if secret.is_empty() || secret.len() > MAX_SECRET_LEN {
        return Err(CryptoError::InvalidParameters(format!(
            "secret length must be 1..={MAX_SECRET_LEN}, got {}",
            secret.len()
        )));
    }
    if threshold < MIN_THRESHOLD || usize::from(threshold) > xs.len() {
        return Err(CryptoError::InvalidParameters(format!(
            "require {MIN_THRESHOLD} <= threshold <= total, got threshold={threshold} total={}",
            xs.len()
        )));
    }
    if xs.contains(&0) {
        return Err(CryptoError::InvalidParameters(
            "x-coordinate 0 would reveal the secret".to_string(),
        ));
    }
    if has_duplicates(xs) {
        return Err(CryptoError::InvalidParameters(
            "x-coordinates must be distinct".to_string(),
        ));
    }

    let mut split_id = [0u8; SPLIT_ID_LEN];
    fill_random(&mut split_id)?;

    // coefficients[k * len + b] is the degree-(k+1) coefficient for byte b.
    let degree = usize::from(threshold) - 1;
    let len = secret.len();
    let mut coefficients = Zeroizing::new(vec![0u8; degree * len]);
    fill_random(&mut coefficients)?;

    let shares = xs
        .iter()
        .map(|&x| {
            let y = (0..len)
                .map(|b| {
                    // Horner from the highest coefficient down to the secret byte.
                    let mut acc = 0u8;
                    for k in (0..degree).rev() {
                        acc = gf_mul(acc, x) ^ coefficients[k * len + b];
                    }
                    gf_mul(acc, x) ^ secret[b]
                })
                .collect();
            Share {
                x,
                threshold,
                split_id,
                y,
            }
        })
        .collect();

    Ok(shares)
}

/// Recover the secret from at least `threshold` shares of one split.
///
/// # Errors
///
/// - [`CryptoError::ShareCountOutOfRange`] if `threshold` is below 2 or more
///   than 255 shares are supplied
/// - [`CryptoError::InsufficientShares`] if fewer than `threshold` shares
/// - [`CryptoError::MalformedShare`] on duplicate indices, shares from
///   different splits, or a threshold tag that disagrees with `threshold`
pub fn reconstruct<S: Borrow<Share>>(
    shares: &[S],
    threshold: u8,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if threshold < MIN_THRESHOLD {
        return Err(CryptoError::ShareCountOutOfRange(usize::from(threshold)));
    }
    if shares.len() > usize::from(u8::MAX) {
        return Err(CryptoError::ShareCountOutOfRange(shares.len()));
    }
    if shares.len() < usize::from(threshold) {
        return Err(CryptoError::InsufficientShares {
            needed: threshold,
            provided: shares.len(),
        });
    }

    let first = as_share(&shares[0]);
    for share in shares.iter().map(as_share) {
        if share.x == 0 || share.y.is_empty() {
            return Err(CryptoError::MalformedShare(
                "share has no usable value".to_string(),
            ));
        }
        if share.threshold != threshold {
            return Err(CryptoError::MalformedShare(format!(
                "share {} was issued for threshold {}, expected {threshold}",
                share.x, share.threshold
            )));
        }
        if share.split_id != first.split_id || share.y.len() != first.y.len() {
            return Err(CryptoError::MalformedShare(
                "shares come from different splits".to_string(),
            ));
        }
    }
    let xs: Vec<u8> = shares.iter().map(|s| as_share(s).x).collect();
    if has_duplicates(&xs) {
        return Err(CryptoError::MalformedShare(
            "duplicate share index".to_string(),
        ));
    }

    let used = &shares[..usize::from(threshold)];
    let xs = &xs[..usize::from(threshold)];

    // Lagrange basis at 0: l_i = prod_{j != i} x_j / (x_j - x_i); subtraction is XOR.
    let basis: Vec<u8> = (0..used.len())
        .map(|i| {
            let mut num = 1u8;
            let mut den = 1u8;
            for (j, &xj) in xs.iter().enumerate() {
                if i != j {
                    num = gf_mul(num, xj);
                    den = gf_mul(den, xj ^ xs[i]);
                }
            }
            gf_mul(num, gf_inv(den))
        })
        .collect();

    let len = first.y.len();
    let mut secret = Zeroizing::new(vec![0u8; len]);
    for (share, &l) in used.iter().zip(&basis) {
        let share = as_share(share);
        for (out, &y) in secret.iter_mut().zip(&share.y) {
            *out ^= gf_mul(l, y);
        }
    }

    Ok(secret)
}

/// Reconstruct a 32-byte key.
pub fn reconstruct_key<S: Borrow<Share>>(shares: &[S], threshold: u8) -> CryptoResult<SecretKey> {
    let secret = reconstruct(shares, threshold)?;
    SecretKey::from_slice(&secret)
}

/// Reconstruct from `old_shares` and split again with new parameters.
///
/// The intermediate secret is zeroized before returning, on every path.
pub fn reshare<S: Borrow<Share>>(
    old_shares: &[S],
    old_threshold: u8,
    new_threshold: u8,
    new_total: u8,
) -> CryptoResult<Vec<Share>> {
    let secret = reconstruct(old_shares, old_threshold)?;
    split(&secret, new_threshold, new_total)
}

/// Like [`reshare`] but issues the new shares at chosen x-coordinates.
pub fn reshare_at<S: Borrow<Share>>(
    old_shares: &[S],
    old_threshold: u8,
    new_threshold: u8,
    xs: &[u8],
) -> CryptoResult<Vec<Share>> {
    let secret = reconstruct(old_shares, old_threshold)?;
    split_at(&secret, new_threshold, xs)
}

/// Structural check only: decodable, long enough, checksum intact.
pub fn validate_share_format(encoded: &str) -> bool {
    Share::decode(encoded).is_ok()
}

fn as_share<S: Borrow<Share>>(share: &S) -> &Share {
    share.borrow()
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

fn has_duplicates(xs: &[u8]) -> bool {
    let mut seen = [false; 256];
    for &x in xs {
        if seen[usize::from(x)] {
            return true;
        }
        seen[usize::from(x)] = true;
    }
    false
}

// ========== GF(2^8) Arithmetic ==========

fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    for _ in 0..8 {
        product ^= a & (b & 1).wrapping_neg();
        let carry = (a >> 7).wrapping_neg();
        a = (a << 1) ^ (0x1b & carry);
        b >>= 1;
    }
    product
}

/// a^254 = a^-1 for nonzero a. Callers never pass 0.
fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp > 0 {
        if exp & 1 == 1 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secret() -> [u8; 32] {
        let mut s = [0u8; 32];
        fill_random(&mut s).unwrap();
        s
    }

    #[test]
    fn gf_mul_matches_known_products() {
        // FIPS-197 section 4.2 example.
        assert_eq!(gf_mul(0x57, 0x83), 0xc1);
        assert_eq!(gf_mul(0x57, 0x13), 0xfe);
        assert_eq!(gf_mul(0, 0xff), 0);
        assert_eq!(gf_mul(1, 0xab), 0xab);
    }

    #[test]
    fn gf_inv_is_multiplicative_inverse() {
        for a in 1..=255u8 {
            assert_eq!(gf_mul(a, gf_inv(a)), 1, "inverse failed for {a}");
        }
    }

    #[test]
    fn split_and_reconstruct_with_threshold_shares() {
        let s = secret();
        let shares = split(&s, 3, 5).unwrap();
        assert_eq!(shares.len(), 5);
        let recovered = reconstruct(&shares[..3], 3).unwrap();
        assert_eq!(recovered.as_slice(), &s);
    }

    #[test]
    fn any_three_of_five_reconstruct() {
        let s = secret();
        let shares = split(&s, 3, 5).unwrap();
        let subsets: [[usize; 3]; 4] = [[0, 1, 2], [0, 2, 4], [1, 3, 4], [4, 2, 1]];
        for subset in subsets {
            let picked: Vec<&Share> = subset.iter().map(|&i| &shares[i]).collect();
            let recovered = reconstruct(&picked, 3).unwrap();
            assert_eq!(recovered.as_slice(), &s, "subset {subset:?}");
        }
    }

    #[test]
    fn below_threshold_fails_with_insufficient_shares() {
        let shares = split(&secret(), 3, 5).unwrap();
        let result = reconstruct(&shares[..2], 3);
        assert!(matches!(
            result,
            Err(CryptoError::InsufficientShares {
                needed: 3,
                provided: 2
            })
        ));
    }

    #[test]
    fn lowering_the_threshold_argument_is_rejected() {
        let shares = split(&secret(), 3, 5).unwrap();
        let result = reconstruct(&shares[..2], 2);
        assert!(matches!(result, Err(CryptoError::MalformedShare(_))));
    }

    #[test]
    fn threshold_out_of_range_is_reported() {
        let shares = split(&secret(), 2, 3).unwrap();
        assert!(matches!(
            reconstruct(&shares, 1),
            Err(CryptoError::ShareCountOutOfRange(1))
        ));
    }

    #[test]
    fn split_rejects_bad_parameters() {
        let s = secret();
        assert!(matches!(split(&s, 1, 5), Err(CryptoError::InvalidParameters(_))));
        assert!(matches!(split(&s, 6, 5), Err(CryptoError::InvalidParameters(_))));
        assert!(matches!(split(&[], 2, 3), Err(CryptoError::InvalidParameters(_))));
        assert!(matches!(
            split_at(&s, 2, &[1, 1, 2]),
            Err(CryptoError::InvalidParameters(_))
        ));
        assert!(matches!(
            split_at(&s, 2, &[0, 1]),
            Err(CryptoError::InvalidParameters(_))
        ));
    }

    #[test]
    fn duplicate_indices_are_malformed() {
        let shares = split(&secret(), 2, 3).unwrap();
        let dup = Share::decode(&shares[0].encode()).unwrap();
        let result = reconstruct(&[&shares[0], &dup], 2);
        assert!(matches!(result, Err(CryptoError::MalformedShare(_))));
    }

    #[test]
    fn mixing_splits_is_rejected() {
        let s = secret();
        let a = split(&s, 2, 3).unwrap();
        let b = split(&s, 2, 3).unwrap();
        let result = reconstruct(&[&a[0], &b[1]], 2);
        assert!(matches!(result, Err(CryptoError::MalformedShare(_))));
    }

    #[test]
    fn split_at_issues_shares_at_requested_indices() {
        let s = secret();
        let shares = split_at(&s, 2, &[7, 42, 200]).unwrap();
        let indices: Vec<u8> = shares.iter().map(Share::index).collect();
        assert_eq!(indices, vec![7, 42, 200]);
        let recovered = reconstruct(&[&shares[2], &shares[0]], 2).unwrap();
        assert_eq!(recovered.as_slice(), &s);
    }

    #[test]
    fn maximum_share_count_round_trips() {
        let s = secret();
        let shares = split(&s, 255, 255).unwrap();
        assert_eq!(shares.len(), 255);
        let recovered = reconstruct(&shares, 255).unwrap();
        assert_eq!(recovered.as_slice(), &s);
    }

    #[test]
    fn encode_decode_preserves_share() {
        let s = secret();
        let shares = split(&s, 2, 3).unwrap();
        let decoded: Vec<Share> = shares
            .iter()
            .map(|share| Share::decode(&share.encode()).unwrap())
            .collect();
        assert_eq!(decoded[1].index(), 2);
        assert_eq!(decoded[1].threshold(), 2);
        assert_eq!(decoded[1].split_id(), shares[1].split_id());
        let recovered = reconstruct(&decoded[1..], 2).unwrap();
        assert_eq!(recovered.as_slice(), &s);
    }

    #[test]
    fn validate_share_format_checks_structure() {
        let shares = split(&secret(), 2, 3).unwrap();
        let encoded = shares[0].encode();
        assert!(validate_share_format(&encoded));

        assert!(!validate_share_format(""));
        assert!(!validate_share_format("!!!not base64!!!"));
        assert!(!validate_share_format(&Base64UrlUnpadded::encode_string(&[1, 2, 3])));

        // Change one character: the checksum no longer matches.
        let mut chars: Vec<char> = encoded.chars().collect();
        let mid = chars.len() / 2;
        chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
        let corrupted: String = chars.into_iter().collect();
        assert!(!validate_share_format(&corrupted));
    }

    #[test]
    fn reshare_changes_parameters_and_keeps_secret() {
        let s = secret();
        let old = split(&s, 2, 3).unwrap();
        let new = reshare(&old[..2], 2, 3, 5).unwrap();
        assert_eq!(new.len(), 5);
        assert_eq!(new[0].threshold(), 3);
        assert_ne!(new[0].split_id(), old[0].split_id());
        let recovered = reconstruct(&new[2..], 3).unwrap();
        assert_eq!(recovered.as_slice(), &s);
    }

    #[test]
    fn reconstruct_key_requires_32_bytes() {
        let shares = split(&[1u8; 16], 2, 2).unwrap();
        assert!(matches!(
            reconstruct_key(&shares, 2),
            Err(CryptoError::InvalidKeyLength(16))
        ));

        let s = secret();
        let shares = split(&s, 2, 2).unwrap();
        assert_eq!(reconstruct_key(&shares, 2).unwrap().expose(), &s);
    }

    #[test]
    fn debug_output_hides_share_values() {
        let shares = split(&[0xEE; 32], 2, 2).unwrap();
        let rendered = format!("{:?}", shares[0]);
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("y: ["));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn first_threshold_shares_recover_secret(
            s in prop::array::uniform32(any::<u8>()),
            (threshold, total) in (2u8..=12).prop_flat_map(|t| (Just(t), t..=16)),
        ) {
            let shares = split(&s, threshold, total).unwrap();
            let recovered = reconstruct(&shares[..usize::from(threshold)], threshold).unwrap();
            prop_assert_eq!(recovered.as_slice(), &s);
        }

        #[test]
        fn last_threshold_shares_recover_secret(
            s in prop::array::uniform32(any::<u8>()),
            (threshold, total) in (2u8..=12).prop_flat_map(|t| (Just(t), t..=16)),
        ) {
            let shares = split(&s, threshold, total).unwrap();
            let start = usize::from(total - threshold);
            let recovered = reconstruct(&shares[start..], threshold).unwrap();
            prop_assert_eq!(recovered.as_slice(), &s);
        }
    }
}
