//! Session cookie cryptography for Gatehouse.
//!
//! This crate provides the authenticated encryption and signing primitives
//! used by the session cookie and the login-flow transient cookies. All key
//! material is derived from operator secrets with HKDF-SHA256; encryption is
//! AES-256-GCM and signatures are HMAC-SHA256, both via `ring`.
//!
//! # Modules
//!
//! - [`crypto`]: AES-256-GCM encryption/decryption, HKDF key derivation.
//! - [`keyring`]: Ordered secret set supporting rotation.
//! - [`error`]: Unified error types.
//!
//! # Quick Start
//!
//! ```rust
//! use gatehouse_vault::Keyring;
//!
//! # fn example() -> gatehouse_vault::Result<()> {
//! // Newest secret first; older secrets still open existing cookies.
//! let keyring = Keyring::new([
//!     "new-secret-value-that-is-at-least-32-bytes",
//!     "old-secret-value-that-is-at-least-32-bytes",
//! ])?;
//!
//! let blob = keyring.seal(b"session json", b"header")?;
//! assert_eq!(keyring.open(&blob, b"header")?, b"session json");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod crypto;
pub mod error;
pub mod keyring;

// Re-export the most commonly used types at the crate root for convenience.
pub use error::{Result, VaultError};
pub use keyring::{Keyring, MIN_SECRET_LEN};
