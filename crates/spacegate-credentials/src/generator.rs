//! Credential generation.
//!
//! Builds the credentials a device writes when it founds a space, admits a
//! member or admits one of its own feeds. Private keys stay behind the
//! [`CredentialSigner`].

use spacegate_core::{
    now_millis, Assertion, Credential, CredentialBuilder, CredentialSigner, FeedDesignation,
    PublicKey, SpaceRole,
};

use crate::error::Result;

/// Issues credentials on behalf of one identity and device.
pub struct CredentialGenerator<'a> {
    signer: &'a dyn CredentialSigner,
    identity_key: PublicKey,
    device_key: PublicKey,
}

impl<'a> CredentialGenerator<'a> {
    pub fn new(signer: &'a dyn CredentialSigner, identity_key: PublicKey, device_key: PublicKey) -> Self {
        Self {
            signer,
            identity_key,
            device_key,
        }
    }

    async fn issue(
        &self,
        issuer: PublicKey,
        subject: PublicKey,
        assertion: Assertion,
    ) -> Result<Credential> {
        let builder = CredentialBuilder::new(issuer, subject, assertion).issuance_date(now_millis());
        let signature = self.signer.sign(&issuer, &builder.signing_message()).await?;
        Ok(builder.finish(signature))
    }

    /// The founding chain of a new space, in the order it must be written.
    ///
    /// 1. Genesis, issued by the space to itself
    /// 2. Admin membership for this identity, issued by the space
    /// 3. Control feed admission, issued by this identity
    /// 4. Data feed admission, issued by this identity
    pub async fn create_space_genesis(
        &self,
        space_key: PublicKey,
        control_feed_key: PublicKey,
        data_feed_key: PublicKey,
    ) -> Result<Vec<Credential>> {
        Ok(vec![
            self.issue(space_key, space_key, Assertion::SpaceGenesis { space_key })
                .await?,
            self.create_member_credential(
                space_key,
                space_key,
                self.identity_key,
                SpaceRole::Admin,
                control_feed_key,
            )
            .await?,
            self.create_feed_admission(space_key, control_feed_key, FeedDesignation::Control)
                .await?,
            self.create_feed_admission(space_key, data_feed_key, FeedDesignation::Data)
                .await?,
        ])
    }

    /// Set the role of `member` in a space.
    pub async fn create_member_credential(
        &self,
        issuer: PublicKey,
        space_key: PublicKey,
        member: PublicKey,
        role: SpaceRole,
        genesis_feed_key: PublicKey,
    ) -> Result<Credential> {
        self.issue(
            issuer,
            member,
            Assertion::SpaceMember {
                space_key,
                role,
                genesis_feed_key,
            },
        )
        .await
    }

    /// Admit a feed written by this device.
    pub async fn create_feed_admission(
        &self,
        space_key: PublicKey,
        feed_key: PublicKey,
        designation: FeedDesignation,
    ) -> Result<Credential> {
        self.issue(
            self.identity_key,
            feed_key,
            Assertion::AdmittedFeed {
                space_key,
                identity_key: self.identity_key,
                device_key: self.device_key,
                designation,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SpaceStateMachine;
    use async_trait::async_trait;
    use spacegate_core::{CoreError, Keypair, Signature};

    struct TwoKeys(Keypair, Keypair);

    #[async_trait]
    impl CredentialSigner for TwoKeys {
        async fn sign(&self, key: &PublicKey, message: &[u8]) -> spacegate_core::Result<Signature> {
            for kp in [&self.0, &self.1] {
                if kp.public_key() == *key {
                    return Ok(kp.sign(message));
                }
            }
            Err(CoreError::KeyNotFound(key.to_hex()))
        }
    }

    #[tokio::test]
    async fn test_genesis_chain_is_accepted() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let identity = Keypair::from_seed(&[0x02; 32]);
        let control = PublicKey::from_bytes([0xc0; 32]);
        let data = PublicKey::from_bytes([0xd0; 32]);
        let space_key = space.public_key();
        let identity_key = identity.public_key();
        let signer = TwoKeys(space, identity);

        let generator = CredentialGenerator::new(&signer, identity_key, identity_key);
        let chain = generator
            .create_space_genesis(space_key, control, data)
            .await
            .unwrap();
        assert_eq!(chain.len(), 4);

        let state = SpaceStateMachine::new(space_key);
        for credential in &chain {
            assert!(state.process(credential, control).await);
        }
        assert_eq!(state.get_role(&identity_key), Some(SpaceRole::Admin));
        assert_eq!(
            state.get_feed(&data).unwrap().designation,
            FeedDesignation::Data
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails() {
        let identity = Keypair::from_seed(&[0x02; 32]);
        let generator =
            CredentialGenerator::new(&identity, identity.public_key(), identity.public_key());
        let result = generator
            .create_space_genesis(
                PublicKey::from_bytes([0x01; 32]),
                PublicKey::from_bytes([0xc0; 32]),
                PublicKey::from_bytes([0xd0; 32]),
            )
            .await;
        assert!(result.is_err());
    }
}
