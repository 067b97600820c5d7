//! Test fixtures and helpers.
//!
//! Common setup code for credential and space tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use spacegate_core::{
    now_millis, Assertion, Credential, CredentialBuilder, CredentialId, FeedDesignation, Keypair,
    PublicKey, SpaceRole,
};
use spacegate_credentials::{CredentialProcessor, SpaceStateMachine};

/// An identity with a deterministic or random keypair.
pub struct TestFixture {
    pub keypair: Keypair,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[31] = 0xa5;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// A space with its founding identity and feeds.
pub struct SpaceFixture {
    pub space: Keypair,
    pub admin: Keypair,
    pub device: Keypair,
    pub control_feed: PublicKey,
    pub data_feed: PublicKey,
}

impl SpaceFixture {
    pub fn new() -> Self {
        Self {
            space: Keypair::generate(),
            admin: Keypair::generate(),
            device: Keypair::generate(),
            control_feed: PublicKey::random(),
            data_feed: PublicKey::random(),
        }
    }

    /// Deterministic keys derived from one byte.
    pub fn with_seed(seed: u8) -> Self {
        Self {
            space: Keypair::from_seed(&[seed; 32]),
            admin: Keypair::from_seed(&[seed.wrapping_add(1); 32]),
            device: Keypair::from_seed(&[seed.wrapping_add(2); 32]),
            control_feed: PublicKey::from_bytes([seed.wrapping_add(3); 32]),
            data_feed: PublicKey::from_bytes([seed.wrapping_add(4); 32]),
        }
    }

    pub fn space_key(&self) -> PublicKey {
        self.space.public_key()
    }

    pub fn admin_key(&self) -> PublicKey {
        self.admin.public_key()
    }

    /// Empty state machine for this space.
    pub fn state_machine(&self) -> SpaceStateMachine {
        SpaceStateMachine::new(self.space_key())
    }

    /// Sign a credential with the given issuer.
    pub fn issue(&self, issuer: &Keypair, subject: PublicKey, assertion: Assertion) -> Credential {
        CredentialBuilder::new(issuer.public_key(), subject, assertion)
            .issuance_date(now_millis())
            .sign(issuer)
    }

    pub fn genesis(&self) -> Credential {
        let space_key = self.space_key();
        self.issue(&self.space, space_key, Assertion::SpaceGenesis { space_key })
    }

    pub fn member(&self, issuer: &Keypair, member: PublicKey, role: SpaceRole) -> Credential {
        self.issue(
            issuer,
            member,
            Assertion::SpaceMember {
                space_key: self.space_key(),
                role,
                genesis_feed_key: self.control_feed,
            },
        )
    }

    /// Admission of `feed`, owned by the issuer.
    pub fn admit_feed(
        &self,
        issuer: &Keypair,
        feed: PublicKey,
        designation: FeedDesignation,
    ) -> Credential {
        self.issue(
            issuer,
            feed,
            Assertion::AdmittedFeed {
                space_key: self.space_key(),
                identity_key: issuer.public_key(),
                device_key: self.device.public_key(),
                designation,
            },
        )
    }

    pub fn unknown(&self, issuer: &Keypair, type_url: &str) -> Credential {
        self.issue(
            issuer,
            issuer.public_key(),
            Assertion::Unknown {
                type_url: type_url.to_string(),
                value: Bytes::from_static(b"\x01\x02"),
            },
        )
    }

    /// Genesis, admin membership, control and data feed admissions.
    pub fn genesis_chain(&self) -> Vec<Credential> {
        vec![
            self.genesis(),
            self.member(&self.space, self.admin_key(), SpaceRole::Admin),
            self.admit_feed(&self.admin, self.control_feed, FeedDesignation::Control),
            self.admit_feed(&self.admin, self.data_feed, FeedDesignation::Data),
        ]
    }
}

impl Default for SpaceFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Records every credential it is given.
#[derive(Default)]
pub struct RecordingProcessor {
    received: Mutex<Vec<Credential>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Credential> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Ids of received credentials, in delivery order.
    pub fn ids(&self) -> Vec<Option<CredentialId>> {
        self.received().iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialProcessor for RecordingProcessor {
    async fn process_credential(&self, credential: &Credential) -> anyhow::Result<()> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(credential.clone());
        Ok(())
    }
}

/// Fails on every credential, counting the attempts.
#[derive(Default)]
pub struct FailingProcessor {
    calls: AtomicUsize,
}

impl FailingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProcessor for FailingProcessor {
    async fn process_credential(&self, _credential: &Credential) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("processor failure")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_genesis_chain_is_accepted() {
        let fixture = SpaceFixture::new();
        let state = fixture.state_machine();

        for credential in fixture.genesis_chain() {
            assert!(state.process(&credential, fixture.control_feed).await);
        }

        assert_eq!(state.get_role(&fixture.admin_key()), Some(SpaceRole::Admin));
        assert_eq!(state.feeds().len(), 2);
    }

    #[tokio::test]
    async fn test_recording_processor() {
        let fixture = SpaceFixture::with_seed(9);
        let state = fixture.state_machine();
        let recorder = Arc::new(RecordingProcessor::new());

        state.add_credential_processor(recorder.clone()).await.unwrap();
        let genesis = fixture.genesis();
        assert!(state.process(&genesis, fixture.control_feed).await);

        assert_eq!(recorder.ids(), vec![genesis.id]);
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);

        let pks: Vec<_> = parties.iter().map(|p| p.public_key()).collect();
        assert_ne!(pks[0], pks[1]);
        assert_ne!(pks[1], pks[2]);
        assert_ne!(pks[0], pks[2]);
    }
}
