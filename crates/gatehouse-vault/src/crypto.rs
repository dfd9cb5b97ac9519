//! AES-256-GCM encryption, HKDF key derivation and HMAC signing using `ring`.
//!
//! This module provides the core cryptographic primitives for session
//! cookies:
//!
//! - **Encryption/decryption**: AES-256-GCM authenticated encryption with
//!   randomly generated 96-bit nonces and caller-supplied additional data.
//!   The nonce is prepended to the ciphertext so a blob is self-contained.
//! - **Key derivation**: HKDF-SHA256 turns an operator secret into a 256-bit
//!   key for one purpose, selected by the `info` label.
//! - **Random generation**: Cryptographically secure random bytes via `ring`.
//!
//! # Security Notes
//!
//! - Nonces are generated randomly for each encryption operation. With a
//!   96-bit nonce and random generation, the probability of a collision is
//!   negligible for up to ~2^32 encryptions under the same key.
//! - Decryption either returns authenticated plaintext or an error; partial
//!   output is never exposed.

use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// HKDF `info` label for the session encryption key.
pub const ENCRYPTION_INFO: &[u8] = b"gatehouse session encryption key";

/// HKDF `info` label for the cookie signing key.
pub const SIGNING_INFO: &[u8] = b"gatehouse cookie signing key";

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A single-use nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` requires a [`NonceSequence`] for sealing and opening keys. Every
/// call binds a fresh key to exactly one nonce.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from `secret` with HKDF-SHA256 (empty salt).
///
/// Different `info` labels yield independent keys from the same secret.
///
/// # Errors
///
/// Returns [`VaultError::KeyDerivationFailed`] if `ring` rejects the output
/// length (never happens for [`KEY_LEN`]).
pub fn derive_key(secret: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
    let prk = salt.extract(secret);
    let info = [info];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| VaultError::KeyDerivationFailed {
            reason: "HKDF expand rejected the output length".into(),
        })?;

    let mut key = [0u8; KEY_LEN];
    okm.fill(&mut key)
        .map_err(|_| VaultError::KeyDerivationFailed {
            reason: "HKDF fill failed".into(),
        })?;
    Ok(key)
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with AES-256-GCM using the given 256-bit `key`.
///
/// `aad` is authenticated but not encrypted. Returns
/// `nonce ‖ ciphertext ‖ tag`.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the key length is wrong or
/// `ring` reports a failure.
pub fn encrypt(plaintext: &[u8], aad: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(VaultError::EncryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }

    let rng = SystemRandom::new();

    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    // `ring` encrypts in-place and appends the authentication tag.
    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    let mut blob = Vec::with_capacity(NONCE_LEN_BYTES + in_out.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&in_out);

    tracing::trace!(
        plaintext_len = plaintext.len(),
        blob_len = blob.len(),
        "encrypted data"
    );

    Ok(blob)
}

/// Decrypt a `nonce ‖ ciphertext ‖ tag` blob produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] if the blob is truncated, the key
/// is wrong, the additional data differs, or the ciphertext has been
/// tampered with.
pub fn decrypt(blob: &[u8], aad: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }
    if blob.len() < NONCE_LEN_BYTES + TAG_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("blob too short: {} bytes", blob.len()),
        });
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_LEN_BYTES);
    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    nonce_bytes.copy_from_slice(nonce);

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::DecryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;

    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::from(aad), &mut in_out)
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed: wrong key or corrupted data".into(),
        })?;

    let result = plaintext.to_vec();

    tracing::trace!(
        blob_len = blob.len(),
        plaintext_len = result.len(),
        "decrypted data"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::Internal`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| VaultError::Internal("failed to generate random bytes".into()))?;
    Ok(buf)
}

/// Compare two byte slices without an early exit on the first difference.
///
/// Lengths are not treated as secret: slices of different length compare
/// unequal immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    std::hint::black_box(diff) == 0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
