//! Vault error types.
//!
//! All vault subsystems surface errors through [`VaultError`], which is the
//! single error type returned by every public API in this crate. Variants
//! never carry key material or plaintext.

/// Unified error type for the Gatehouse vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// No configured key authenticated the ciphertext.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// HKDF expansion failed.
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    // -- Secret set errors --------------------------------------------------
    /// The secret set is empty or one of the secrets is unusable.
    #[error("invalid secret: {reason}")]
    InvalidSecret { reason: String },

    // -- Generic ------------------------------------------------------------
    /// Catch-all for unexpected internal errors (CSPRNG failure and the like).
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
