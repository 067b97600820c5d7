//! Proptest generators for property-based testing.

use proptest::prelude::*;

use spacegate_core::{FeedDesignation, Keypair, PublicKey, SpaceRole};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random PublicKey (no private half).
pub fn public_key() -> impl Strategy<Value = PublicKey> {
    any::<[u8; 32]>().prop_map(PublicKey::from_bytes)
}

/// Generate a SpaceRole.
pub fn space_role() -> impl Strategy<Value = SpaceRole> {
    prop_oneof![
        Just(SpaceRole::Admin),
        Just(SpaceRole::Member),
        Just(SpaceRole::Removed),
    ]
}

/// Generate a FeedDesignation.
pub fn feed_designation() -> impl Strategy<Value = FeedDesignation> {
    prop_oneof![Just(FeedDesignation::Control), Just(FeedDesignation::Data)]
}

/// Generate a reasonable issuance date.
pub fn issuance_date() -> impl Strategy<Value = i64> {
    0i64..=1_700_000_000_000i64
}

/// One step of a credential script run against a founded space.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// The admin admits an identity derived from `seed`.
    AddMember { seed: u8, role: SpaceRole },

    /// The member derived from `seed` admits a fresh feed.
    AdmitFeed { seed: u8, feed: [u8; 32] },

    /// Redeliver the credential produced by an earlier step.
    Redeliver { step: usize },
}

impl Arbitrary for ScriptStep {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            (0u8..8, space_role()).prop_map(|(seed, role)| ScriptStep::AddMember { seed, role }),
            (0u8..8, any::<[u8; 32]>()).prop_map(|(seed, feed)| ScriptStep::AdmitFeed { seed, feed }),
            any::<usize>().prop_map(|step| ScriptStep::Redeliver { step }),
        ]
        .boxed()
    }
}

/// Generate a script of up to `max_len` steps.
pub fn credential_script(max_len: usize) -> impl Strategy<Value = Vec<ScriptStep>> {
    prop::collection::vec(any::<ScriptStep>(), 0..=max_len)
}

/// Keypair for a script member seed. Never collides with fixture seeds.
pub fn script_member(seed: u8) -> Keypair {
    let mut bytes = [0x5c; 32];
    bytes[0] = seed;
    Keypair::from_seed(&bytes)
}
