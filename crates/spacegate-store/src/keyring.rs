//! In-memory keyring.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use spacegate_core::{CoreError, CredentialSigner, Keypair, PublicKey, Signature};
use tracing::debug;

use crate::error::Result;
use crate::traits::Keyring;

/// Keeps generated keypairs in memory.
#[derive(Debug, Default)]
pub struct MemoryKeyring {
    keys: RwLock<HashMap<PublicKey, Keypair>>,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an existing keypair (identity or device keys).
    pub fn import(&self, keypair: Keypair) -> PublicKey {
        let key = keypair.public_key();
        self.keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, keypair);
        key
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialSigner for MemoryKeyring {
    async fn sign(&self, key: &PublicKey, message: &[u8]) -> spacegate_core::Result<Signature> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        let keypair = keys
            .get(key)
            .ok_or_else(|| CoreError::KeyNotFound(key.to_hex()))?;
        Ok(keypair.sign(message))
    }
}

#[async_trait]
impl Keyring for MemoryKeyring {
    async fn create_key(&self) -> Result<PublicKey> {
        let key = self.import(Keypair::generate());
        debug!(key = %key, "created key");
        Ok(key)
    }

    async fn has_key(&self, key: &PublicKey) -> bool {
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_sign() {
        let keyring = MemoryKeyring::new();
        let key = keyring.create_key().await.unwrap();
        assert!(keyring.has_key(&key).await);

        let signature = CredentialSigner::sign(&keyring, &key, b"payload").await.unwrap();
        assert!(key.verify(b"payload", &signature).is_ok());
    }

    #[tokio::test]
    async fn test_sign_unknown_key_fails() {
        let keyring = MemoryKeyring::new();
        let stranger = PublicKey::from_bytes([0x11; 32]);
        assert!(!keyring.has_key(&stranger).await);
        assert!(CredentialSigner::sign(&keyring, &stranger, b"x").await.is_err());
    }
}
