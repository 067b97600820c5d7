//! Keys this device signs with.

use std::sync::Arc;

use spacegate_core::{CredentialSigner, PublicKey};
use spacegate_credentials::CredentialGenerator;
use spacegate_store::Keyring;

/// Identity and device keys with the keyring that holds them.
#[derive(Clone)]
pub struct SigningContext {
    pub identity_key: PublicKey,
    pub device_key: PublicKey,
    keyring: Arc<dyn Keyring>,
    signer: Arc<dyn CredentialSigner>,
}

impl SigningContext {
    pub fn new<K>(keyring: Arc<K>, identity_key: PublicKey, device_key: PublicKey) -> Self
    where
        K: Keyring + 'static,
    {
        Self {
            identity_key,
            device_key,
            keyring: keyring.clone(),
            signer: keyring,
        }
    }

    pub fn keyring(&self) -> &Arc<dyn Keyring> {
        &self.keyring
    }

    /// Issues credentials as this identity and device.
    pub fn generator(&self) -> CredentialGenerator<'_> {
        CredentialGenerator::new(self.signer.as_ref(), self.identity_key, self.device_key)
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("identity_key", &self.identity_key)
            .field("device_key", &self.device_key)
            .finish()
    }
}
