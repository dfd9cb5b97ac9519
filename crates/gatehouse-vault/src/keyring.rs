//! Rotating secret set.
//!
//! A [`Keyring`] is built from an ordered list of operator secrets, newest
//! first. The newest secret keys every new encryption and signature; all
//! secrets are accepted when opening or verifying, which lets operators
//! rotate secrets without invalidating sessions issued under the old one.
//!
//! Each secret is expanded with HKDF into two independent keys: one for
//! AES-256-GCM and one for HMAC-SHA256.

use std::fmt;

use ring::hmac;

use crate::crypto::{self, ENCRYPTION_INFO, KEY_LEN, SIGNING_INFO};
use crate::error::{Result, VaultError};

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Keys derived from a single operator secret.
struct DerivedKeys {
    encryption: [u8; KEY_LEN],
    signing: hmac::Key,
}

/// Ordered set of derived keys, newest first.
pub struct Keyring {
    keys: Vec<DerivedKeys>,
}

impl Keyring {
    /// Build a keyring from `secrets`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidSecret`] if the list is empty or any
    /// secret is shorter than [`MIN_SECRET_LEN`] bytes.
    pub fn new<I, S>(secrets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut keys = Vec::new();
        for (index, secret) in secrets.into_iter().enumerate() {
            let secret = secret.as_ref();
            if secret.len() < MIN_SECRET_LEN {
                return Err(VaultError::InvalidSecret {
                    reason: format!(
                        "secret #{index} is {} bytes, at least {MIN_SECRET_LEN} required",
                        secret.len()
                    ),
                });
            }
            let encryption = crypto::derive_key(secret, ENCRYPTION_INFO)?;
            let signing_bytes = crypto::derive_key(secret, SIGNING_INFO)?;
            keys.push(DerivedKeys {
                encryption,
                signing: hmac::Key::new(hmac::HMAC_SHA256, &signing_bytes),
            });
        }

        if keys.is_empty() {
            return Err(VaultError::InvalidSecret {
                reason: "at least one secret is required".into(),
            });
        }

        tracing::debug!(secrets = keys.len(), "keyring initialised");
        Ok(Self { keys })
    }

    /// Number of secrets in the ring.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always `false`; construction rejects empty sets.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn newest(&self) -> &DerivedKeys {
        // Construction guarantees at least one key.
        &self.keys[0]
    }

    /// Encrypt `plaintext` under the newest secret, authenticating `aad`.
    ///
    /// # Errors
    ///
    /// Propagates [`VaultError::EncryptionFailed`] from [`crypto::encrypt`].
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        crypto::encrypt(plaintext, aad, &self.newest().encryption)
    }

    /// Decrypt `blob`, trying each secret in order.
    ///
    /// The first key that authenticates wins.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DecryptionFailed`] if no key authenticates the
    /// blob.
    pub fn open(&self, blob: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        for (index, keys) in self.keys.iter().enumerate() {
            if let Ok(plaintext) = crypto::decrypt(blob, aad, &keys.encryption) {
                if index > 0 {
                    tracing::debug!(secret_index = index, "opened payload with a rotated secret");
                }
                return Ok(plaintext);
            }
        }
        Err(VaultError::DecryptionFailed {
            reason: format!("none of {} secrets authenticated the payload", self.keys.len()),
        })
    }

    /// HMAC-SHA256 of `data` under the newest secret.
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        hmac::sign(&self.newest().signing, data).as_ref().to_vec()
    }

    /// Check `tag` against every secret in constant time per key.
    pub fn verify(&self, data: &[u8], tag: &[u8]) -> bool {
        self.keys
            .iter()
            .any(|keys| hmac::verify(&keys.signing, data, tag).is_ok())
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("secrets", &self.keys.len())
            .finish_non_exhaustive()
    }
}
