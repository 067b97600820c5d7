//! Member state: identity key to role.

use std::collections::HashMap;

use spacegate_core::{Assertion, AssertionType, Credential, PublicKey, SpaceRole};

use crate::error::{CredentialsError, Result};

/// A member of a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Identity key of the member.
    pub key: PublicKey,

    /// Current role. Updated by each accepted membership credential.
    pub role: SpaceRole,

    /// Feed the member starts replicating from.
    pub genesis_feed_key: PublicKey,

    /// The credential that set the current role.
    pub credential: Credential,
}

/// Tracks admitted members of one space.
///
/// Authorization is checked by the caller; this only applies membership.
#[derive(Debug)]
pub struct MemberStateMachine {
    space_key: PublicKey,
    members: HashMap<PublicKey, MemberInfo>,
    creator: Option<PublicKey>,
}

impl MemberStateMachine {
    pub fn new(space_key: PublicKey) -> Self {
        Self {
            space_key,
            members: HashMap::new(),
            creator: None,
        }
    }

    pub fn space_key(&self) -> &PublicKey {
        &self.space_key
    }

    /// Role of an identity, if it was ever admitted.
    pub fn get_role(&self, identity_key: &PublicKey) -> Option<SpaceRole> {
        self.members.get(identity_key).map(|m| m.role)
    }

    pub fn get(&self, identity_key: &PublicKey) -> Option<&MemberInfo> {
        self.members.get(identity_key)
    }

    pub fn members(&self) -> &HashMap<PublicKey, MemberInfo> {
        &self.members
    }

    /// The first member admitted to the space.
    pub fn creator(&self) -> Option<&MemberInfo> {
        self.creator.as_ref().and_then(|key| self.members.get(key))
    }

    /// Apply a `SpaceMember` credential.
    ///
    /// Re-admitting an existing member replaces its role.
    pub fn apply(&mut self, credential: &Credential) -> Result<MemberInfo> {
        let Assertion::SpaceMember {
            role,
            genesis_feed_key,
            ..
        } = &credential.assertion
        else {
            return Err(CredentialsError::UnexpectedAssertion {
                expected: AssertionType::SpaceMember,
                got: credential.assertion_type(),
            });
        };

        let info = MemberInfo {
            key: credential.subject.id,
            role: *role,
            genesis_feed_key: *genesis_feed_key,
            credential: credential.clone(),
        };

        if self.creator.is_none() {
            self.creator = Some(info.key);
        }
        self.members.insert(info.key, info.clone());

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacegate_core::{CredentialBuilder, Keypair};

    fn member(space: &Keypair, subject: PublicKey, role: SpaceRole) -> Credential {
        CredentialBuilder::new(
            space.public_key(),
            subject,
            Assertion::SpaceMember {
                space_key: space.public_key(),
                role,
                genesis_feed_key: PublicKey::from_bytes([0x07; 32]),
            },
        )
        .sign(space)
    }

    #[test]
    fn test_apply_and_get_role() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let alice = PublicKey::from_bytes([0xa1; 32]);
        let bob = PublicKey::from_bytes([0xb0; 32]);
        let mut members = MemberStateMachine::new(space.public_key());

        members.apply(&member(&space, alice, SpaceRole::Admin)).unwrap();
        members.apply(&member(&space, bob, SpaceRole::Member)).unwrap();

        assert_eq!(members.get_role(&alice), Some(SpaceRole::Admin));
        assert_eq!(members.get_role(&bob), Some(SpaceRole::Member));
        assert_eq!(members.creator().map(|m| m.key), Some(alice));
        assert_eq!(members.get_role(&PublicKey::from_bytes([0; 32])), None);
    }

    #[test]
    fn test_role_change_keeps_creator() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let alice = PublicKey::from_bytes([0xa1; 32]);
        let mut members = MemberStateMachine::new(space.public_key());

        members.apply(&member(&space, alice, SpaceRole::Admin)).unwrap();
        members.apply(&member(&space, alice, SpaceRole::Removed)).unwrap();

        assert_eq!(members.get_role(&alice), Some(SpaceRole::Removed));
        assert_eq!(members.members().len(), 1);
        assert_eq!(members.creator().map(|m| m.key), Some(alice));
    }

    #[test]
    fn test_rejects_other_assertions() {
        let space = Keypair::from_seed(&[0x01; 32]);
        let genesis = CredentialBuilder::new(
            space.public_key(),
            space.public_key(),
            Assertion::SpaceGenesis {
                space_key: space.public_key(),
            },
        )
        .sign(&space);

        let mut members = MemberStateMachine::new(space.public_key());
        assert!(matches!(
            members.apply(&genesis),
            Err(CredentialsError::UnexpectedAssertion { .. })
        ));
    }
}
