//! Signing capability.
//!
//! Credentials are signed by keys whose private halves live elsewhere (a
//! keyring, a hardware device). Builders ask a [`CredentialSigner`] for the
//! signature instead of holding keys themselves.

use async_trait::async_trait;

use crate::crypto::{Keypair, PublicKey, Signature};
use crate::error::{CoreError, Result};

/// Produces signatures for keys it holds.
#[async_trait]
pub trait CredentialSigner: Send + Sync {
    /// Sign `message` with the private half of `key`.
    async fn sign(&self, key: &PublicKey, message: &[u8]) -> Result<Signature>;
}

#[async_trait]
impl CredentialSigner for Keypair {
    async fn sign(&self, key: &PublicKey, message: &[u8]) -> Result<Signature> {
        if *key != self.public_key() {
            return Err(CoreError::KeyNotFound(key.to_hex()));
        }
        Ok(Keypair::sign(self, message))
    }
}
