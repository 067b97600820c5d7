//! Feed state: admitted feed key to owner.

use std::collections::HashMap;

use spacegate_core::{Assertion, AssertionType, Credential, FeedDesignation, PublicKey};

use crate::error::{CredentialsError, Result};

/// An admitted feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedInfo {
    /// Feed key.
    pub key: PublicKey,

    /// Identity of the member that owns the feed.
    pub owner: PublicKey,

    /// Device that writes the feed.
    pub device_key: PublicKey,

    pub designation: FeedDesignation,

    /// Feed on which the admission credential was recorded.
    pub admitted_via: PublicKey,

    pub credential: Credential,
}

/// Tracks admitted feeds of one space.
///
/// A feed key can be admitted once. A second admission is rejected.
#[derive(Debug)]
pub struct FeedStateMachine {
    space_key: PublicKey,
    feeds: HashMap<PublicKey, FeedInfo>,
}

impl FeedStateMachine {
    pub fn new(space_key: PublicKey) -> Self {
        Self {
            space_key,
            feeds: HashMap::new(),
        }
    }

    pub fn space_key(&self) -> &PublicKey {
        &self.space_key
    }

    pub fn get(&self, feed_key: &PublicKey) -> Option<&FeedInfo> {
        self.feeds.get(feed_key)
    }

    pub fn contains(&self, feed_key: &PublicKey) -> bool {
        self.feeds.contains_key(feed_key)
    }

    pub fn feeds(&self) -> &HashMap<PublicKey, FeedInfo> {
        &self.feeds
    }

    /// Check that an `AdmittedFeed` credential can be applied.
    pub fn check(&self, credential: &Credential) -> Result<()> {
        if !matches!(credential.assertion, Assertion::AdmittedFeed { .. }) {
            return Err(CredentialsError::UnexpectedAssertion {
                expected: AssertionType::AdmittedFeed,
                got: credential.assertion_type(),
            });
        }
        if self.feeds.contains_key(&credential.subject.id) {
            return Err(CredentialsError::FeedAlreadyAdmitted(credential.subject.id));
        }
        Ok(())
    }

    /// Apply an `AdmittedFeed` credential recorded on `from_feed`.
    pub fn apply(&mut self, credential: &Credential, from_feed: PublicKey) -> Result<FeedInfo> {
        self.check(credential)?;

        let info = match &credential.assertion {
            Assertion::AdmittedFeed {
                identity_key,
                device_key,
                designation,
                ..
            } => FeedInfo {
                key: credential.subject.id,
                owner: *identity_key,
                device_key: *device_key,
                designation: *designation,
                admitted_via: from_feed,
                credential: credential.clone(),
            },
            other => {
                return Err(CredentialsError::UnexpectedAssertion {
                    expected: AssertionType::AdmittedFeed,
                    got: other.assertion_type(),
                })
            }
        };
        self.feeds.insert(info.key, info.clone());

        Ok(info)
    }
}
