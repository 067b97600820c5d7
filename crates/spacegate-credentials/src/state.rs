//! Space state machine.
//!
//! Validates credentials for one space, applies them to the member and feed
//! state, keeps the ordered credential log, and fans accepted credentials
//! out to registered processors.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use spacegate_async::Lock;
use spacegate_core::{
    Assertion, AssertionType, Credential, CredentialId, CredentialVerifier, PublicKey,
    SignatureVerifier, SpaceRole, VerificationResult,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{CredentialsError, Result};
use crate::feed::{FeedInfo, FeedStateMachine};
use crate::member::{MemberInfo, MemberStateMachine};
use crate::processor::{CredentialConsumer, CredentialProcessor};

/// Capacity of the member/feed admission broadcast channels.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Mutable state, guarded by a short-lived mutex.
///
/// Log append, the processed-id set and the ready-consumer snapshot are
/// updated together so backlog replay and live delivery never overlap.
#[derive(Debug)]
struct StateInner {
    members: MemberStateMachine,
    feeds: FeedStateMachine,
    credentials: Vec<Credential>,
    processed: HashSet<CredentialId>,
    genesis: Option<Credential>,
    consumers: Vec<Arc<CredentialConsumer>>,
}

/// Outcome of applying a verified credential.
enum Applied {
    Genesis,
    Member(MemberInfo),
    Feed(FeedInfo),
    Logged,
}

/// Per-space authorization state.
pub struct SpaceStateMachine {
    space_key: PublicKey,
    lock: Lock,
    verifier: Arc<dyn CredentialVerifier>,
    inner: Mutex<StateInner>,
    member_admitted: broadcast::Sender<MemberInfo>,
    feed_admitted: broadcast::Sender<FeedInfo>,
}

impl SpaceStateMachine {
    /// Create a state machine using the signature verifier.
    pub fn new(space_key: PublicKey) -> Self {
        Self::with_verifier(space_key, Arc::new(SignatureVerifier))
    }

    /// Create a state machine with a custom verifier.
    pub fn with_verifier(space_key: PublicKey, verifier: Arc<dyn CredentialVerifier>) -> Self {
        let (member_admitted, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (feed_admitted, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            space_key,
            lock: Lock::new(),
            verifier,
            inner: Mutex::new(StateInner {
                members: MemberStateMachine::new(space_key),
                feeds: FeedStateMachine::new(space_key),
                credentials: Vec::new(),
                processed: HashSet::new(),
                genesis: None,
                consumers: Vec::new(),
            }),
            member_admitted,
            feed_admitted,
        }
    }

    /// Use a diagnostic lock that warns about long-running `process` calls.
    pub fn with_lock(mut self, lock: Lock) -> Self {
        self.lock = lock;
        self
    }

    pub fn space_key(&self) -> &PublicKey {
        &self.space_key
    }

    fn inner(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn members(&self) -> HashMap<PublicKey, MemberInfo> {
        self.inner().members.members().clone()
    }

    pub fn feeds(&self) -> HashMap<PublicKey, FeedInfo> {
        self.inner().feeds.feeds().clone()
    }

    /// The accepted credential log, in acceptance order.
    pub fn credentials(&self) -> Vec<Credential> {
        self.inner().credentials.clone()
    }

    pub fn genesis_credential(&self) -> Option<Credential> {
        self.inner().genesis.clone()
    }

    /// The first member admitted to the space.
    pub fn creator(&self) -> Option<MemberInfo> {
        self.inner().members.creator().cloned()
    }

    pub fn get_role(&self, identity_key: &PublicKey) -> Option<SpaceRole> {
        self.inner().members.get_role(identity_key)
    }

    pub fn get_feed(&self, feed_key: &PublicKey) -> Option<FeedInfo> {
        self.inner().feeds.get(feed_key).cloned()
    }

    /// Accepted credentials carrying the given assertion type.
    pub fn get_credentials_of_type(&self, assertion_type: AssertionType) -> Vec<Credential> {
        self.inner()
            .credentials
            .iter()
            .filter(|c| c.assertion_type() == assertion_type)
            .cloned()
            .collect()
    }

    /// Notified after each member admission or role change.
    pub fn subscribe_member_admitted(&self) -> broadcast::Receiver<MemberInfo> {
        self.member_admitted.subscribe()
    }

    /// Notified after each feed admission.
    pub fn subscribe_feed_admitted(&self) -> broadcast::Receiver<FeedInfo> {
        self.feed_admitted.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate and apply a credential recorded on `from_feed`.
    ///
    /// Returns true if the credential was accepted or had already been
    /// accepted. Rejections are logged and return false.
    pub async fn process(&self, credential: &Credential, from_feed: PublicKey) -> bool {
        let _guard = self.lock.acquire(Some("process")).await;

        if let Some(id) = &credential.id {
            if self.inner().processed.contains(id) {
                debug!(space_key = %self.space_key, credential = %id, "credential already processed");
                return true;
            }
        }

        if let VerificationResult::Fail { errors } = self.verifier.verify(credential).await {
            warn!(
                space_key = %self.space_key,
                issuer = %credential.issuer,
                errors = %errors.join(", "),
                "invalid credential"
            );
            return false;
        }

        let (applied, ready) = {
            let mut inner = self.inner();
            let applied = match self.apply(&mut inner, credential, from_feed) {
                Ok(applied) => applied,
                Err(reason) => {
                    warn!(
                        space_key = %self.space_key,
                        issuer = %credential.issuer,
                        assertion = credential.assertion.type_url(),
                        "{}",
                        reason
                    );
                    return false;
                }
            };

            inner.credentials.push(credential.clone());
            if let Some(id) = credential.id {
                inner.processed.insert(id);
            }

            let ready: Vec<_> = inner
                .consumers
                .iter()
                .filter(|c| c.is_ready())
                .cloned()
                .collect();
            (applied, ready)
        };

        match applied {
            Applied::Member(info) => {
                let _ = self.member_admitted.send(info);
            }
            Applied::Feed(info) => {
                let _ = self.feed_admitted.send(info);
            }
            Applied::Genesis | Applied::Logged => {}
        }

        for consumer in ready {
            consumer.process(credential).await;
        }

        true
    }

    /// Check authorization and apply to the sub-state-machines.
    ///
    /// Nothing is mutated when an error is returned.
    fn apply(
        &self,
        inner: &mut StateInner,
        credential: &Credential,
        from_feed: PublicKey,
    ) -> std::result::Result<Applied, String> {
        match &credential.assertion {
            Assertion::SpaceGenesis { space_key } => {
                if inner.genesis.is_some() {
                    return Err("space already has a genesis credential".into());
                }
                if credential.issuer != self.space_key {
                    return Err("space genesis credential must be issued by space".into());
                }
                if credential.subject.id != self.space_key {
                    return Err("space genesis credential must be issued to space".into());
                }
                if *space_key != self.space_key {
                    return Err("space genesis credential names another space".into());
                }
                inner.genesis = Some(credential.clone());
                Ok(Applied::Genesis)
            }

            Assertion::SpaceMember { space_key, .. } => {
                if *space_key != self.space_key {
                    debug!(
                        space_key = %self.space_key,
                        other = %space_key,
                        "membership credential for another space"
                    );
                    return Ok(Applied::Logged);
                }
                if inner.genesis.is_none() {
                    return Err("space must have a genesis credential before adding members".into());
                }
                if !self.can_invite_members(inner, &credential.issuer) {
                    return Err(format!(
                        "issuer {} is not authorized to invite new members",
                        credential.issuer
                    ));
                }
                inner
                    .members
                    .apply(credential)
                    .map(Applied::Member)
                    .map_err(|e| e.to_string())
            }

            Assertion::AdmittedFeed { .. } => {
                if inner.genesis.is_none() {
                    return Err("space must have a genesis credential before admitting feeds".into());
                }
                if !self.can_admit_feeds(inner, &credential.issuer) {
                    return Err(format!(
                        "issuer {} is not authorized to admit feeds",
                        credential.issuer
                    ));
                }
                inner
                    .feeds
                    .apply(credential, from_feed)
                    .map(Applied::Feed)
                    .map_err(|e| e.to_string())
            }

            Assertion::Unknown { type_url, .. } => {
                debug!(space_key = %self.space_key, type_url = %type_url, "logging unknown assertion");
                Ok(Applied::Logged)
            }
        }
    }

    fn can_invite_members(&self, inner: &StateInner, key: &PublicKey) -> bool {
        *key == self.space_key || inner.members.get_role(key) == Some(SpaceRole::Admin)
    }

    fn can_admit_feeds(&self, inner: &StateInner, key: &PublicKey) -> bool {
        matches!(
            inner.members.get_role(key),
            Some(SpaceRole::Member) | Some(SpaceRole::Admin)
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Processors
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a processor.
    ///
    /// The existing log is replayed in order before the processor receives
    /// live credentials. Returns once replay is done.
    pub async fn add_credential_processor(
        &self,
        processor: Arc<dyn CredentialProcessor>,
    ) -> Result<()> {
        let consumer = {
            let mut inner = self.inner();
            if inner.consumers.iter().any(|c| c.wraps(&processor)) {
                return Err(CredentialsError::ProcessorAlreadyAdded);
            }
            let consumer = Arc::new(CredentialConsumer::new(processor));
            inner.consumers.push(consumer.clone());
            consumer
        };

        consumer.open()?;

        let mut next = 0;
        loop {
            // Flip to live under the same mutex `process` appends under, so
            // every credential is either replayed here or delivered live.
            let credential = {
                let inner = self.inner();
                match inner.credentials.get(next) {
                    Some(credential) => credential.clone(),
                    None => {
                        consumer.mark_ready();
                        break;
                    }
                }
            };
            if consumer.is_disposed() {
                break;
            }
            consumer.process(&credential).await;
            next += 1;
        }

        debug!(space_key = %self.space_key, replayed = next, "credential processor added");
        Ok(())
    }

    /// Unregister a processor, aborting any delivery in flight.
    ///
    /// Unknown processors are ignored.
    pub async fn remove_credential_processor(&self, processor: &Arc<dyn CredentialProcessor>) {
        let consumer = {
            let mut inner = self.inner();
            let position = inner.consumers.iter().position(|c| c.wraps(processor));
            position.map(|i| inner.consumers.remove(i))
        };

        if let Some(consumer) = consumer {
            consumer.close();
        }
    }
}

impl std::fmt::Debug for SpaceStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner();
        f.debug_struct("SpaceStateMachine")
            .field("space_key", &self.space_key)
            .field("members", &inner.members.members().len())
            .field("feeds", &inner.feeds.feeds().len())
            .field("credentials", &inner.credentials.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacegate_core::{CredentialBuilder, FeedDesignation, Keypair};

    struct Recorder(Mutex<Vec<Credential>>);

    #[async_trait::async_trait]
    impl CredentialProcessor for Recorder {
        async fn process_credential(&self, credential: &Credential) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(credential.clone());
            Ok(())
        }
    }

    fn genesis(space: &Keypair) -> Credential {
        CredentialBuilder::new(
            space.public_key(),
            space.public_key(),
            Assertion::SpaceGenesis {
                space_key: space.public_key(),
            },
        )
        .sign(space)
    }

    fn member(issuer: &Keypair, space_key: PublicKey, subject: PublicKey, role: SpaceRole) -> Credential {
        CredentialBuilder::new(
            issuer.public_key(),
            subject,
            Assertion::SpaceMember {
                space_key,
                role,
                genesis_feed_key: PublicKey::from_bytes([0x07; 32]),
            },
        )
        .sign(issuer)
    }

    fn feed(issuer: &Keypair, space_key: PublicKey, feed_key: PublicKey) -> Credential {
        CredentialBuilder::new(
            issuer.public_key(),
            feed_key,
            Assertion::AdmittedFeed {
                space_key,
                identity_key: issuer.public_key(),
                device_key: issuer.public_key(),
                designation: FeedDesignation::Control,
            },
        )
        .sign(issuer)
    }

    #[tokio::test]
    async fn test_genesis_then_member_then_feed() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let admin = Keypair::from_seed(&[0x02; 32]);
        let feed_key = PublicKey::from_bytes([0xf1; 32]);
        let origin = PublicKey::from_bytes([0xc0; 32]);
        let state = SpaceStateMachine::new(space.public_key());

        assert!(state.process(&genesis(&space), origin).await);
        assert!(
            state
                .process(
                    &member(&space, space.public_key(), admin.public_key(), SpaceRole::Admin),
                    origin
                )
                .await
        );
        assert!(state.process(&feed(&admin, space.public_key(), feed_key), origin).await);

        assert_eq!(state.get_role(&admin.public_key()), Some(SpaceRole::Admin));
        assert_eq!(state.get_feed(&feed_key).unwrap().owner, admin.public_key());
        assert_eq!(state.credentials().len(), 3);
        assert_eq!(state.creator().unwrap().key, admin.public_key());
    }

    #[tokio::test]
    async fn test_member_before_genesis_rejected() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let state = SpaceStateMachine::new(space.public_key());
        let credential = member(
            &space,
            space.public_key(),
            PublicKey::from_bytes([0xa1; 32]),
            SpaceRole::Member,
        );

        assert!(!state.process(&credential, space.public_key()).await);
        assert!(state.credentials().is_empty());

        // A rejected credential is re-evaluated on redelivery.
        assert!(state.process(&genesis(&space), space.public_key()).await);
        assert!(state.process(&credential, space.public_key()).await);
    }

    #[tokio::test]
    async fn test_other_space_membership_is_logged_only() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let other = Keypair::from_seed(&[0x09; 32]);
        let subject = PublicKey::from_bytes([0xa1; 32]);
        let state = SpaceStateMachine::new(space.public_key());
        state.process(&genesis(&space), space.public_key()).await;

        let foreign = member(&other, other.public_key(), subject, SpaceRole::Admin);
        assert!(state.process(&foreign, space.public_key()).await);
        assert_eq!(state.get_role(&subject), None);
        assert_eq!(state.credentials().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_feed_rejected() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let feed_key = PublicKey::from_bytes([0xf1; 32]);
        let state = SpaceStateMachine::new(space.public_key());
        state.process(&genesis(&space), space.public_key()).await;
        state
            .process(
                &member(&space, space.public_key(), space.public_key(), SpaceRole::Admin),
                space.public_key(),
            )
            .await;

        let first = feed(&space, space.public_key(), feed_key);
        let second = CredentialBuilder::new(
            space.public_key(),
            feed_key,
            Assertion::AdmittedFeed {
                space_key: space.public_key(),
                identity_key: space.public_key(),
                device_key: space.public_key(),
                designation: FeedDesignation::Data,
            },
        )
        .issuance_date(1)
        .sign(&space);

        assert!(state.process(&first, space.public_key()).await);
        assert!(!state.process(&second, space.public_key()).await);
        assert_eq!(
            state.get_feed(&feed_key).unwrap().designation,
            FeedDesignation::Control
        );
    }

    #[tokio::test]
    async fn test_processor_added_twice_fails() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let state = SpaceStateMachine::new(space.public_key());
        let processor: Arc<dyn CredentialProcessor> = Arc::new(Recorder(Mutex::new(Vec::new())));

        state.add_credential_processor(processor.clone()).await.unwrap();
        assert!(matches!(
            state.add_credential_processor(processor.clone()).await,
            Err(CredentialsError::ProcessorAlreadyAdded)
        ));

        state.remove_credential_processor(&processor).await;
        state.add_credential_processor(processor).await.unwrap();
    }

    #[tokio::test]
    async fn test_admission_events() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let state = SpaceStateMachine::new(space.public_key());
        let mut members = state.subscribe_member_admitted();
        let mut feeds = state.subscribe_feed_admitted();

        state.process(&genesis(&space), space.public_key()).await;
        state
            .process(
                &member(&space, space.public_key(), space.public_key(), SpaceRole::Admin),
                space.public_key(),
            )
            .await;
        let feed_key = PublicKey::from_bytes([0xf1; 32]);
        state
            .process(&feed(&space, space.public_key(), feed_key), space.public_key())
            .await;

        assert_eq!(members.recv().await.unwrap().role, SpaceRole::Admin);
        assert_eq!(feeds.recv().await.unwrap().key, feed_key);
    }
}
