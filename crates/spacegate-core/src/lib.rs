//! # Spacegate Core
//!
//! Pure primitives for space authorization: keys, credentials, and
//! canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Credential`] - A signed assertion about a space
//! - [`CredentialId`] - Content-addressed identifier (Blake3 hash)
//! - [`Assertion`] - Genesis, membership, and feed admission payloads
//! - [`PublicKey`] - Identifies spaces, identities, devices, and feeds
//! - [`Timeframe`] - Per-feed replay checkpoint
//!
//! ## Canonicalization
//!
//! All credentials are encoded using deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod signer;
pub mod timeframe;
pub mod types;
pub mod verification;

pub use canonical::{canonical_bytes, canonical_content_bytes, decode_credential, encode_credential};
pub use credential::{
    Assertion, AssertionType, Credential, CredentialBuilder, FeedDesignation, SpaceRole, Subject,
};
pub use crypto::{Blake3Hash, Keypair, PublicKey, Signature};
pub use error::{CoreError, Result};
pub use signer::CredentialSigner;
pub use timeframe::Timeframe;
pub use types::CredentialId;
pub use verification::{verify_credential, CredentialVerifier, SignatureVerifier, VerificationResult};

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
