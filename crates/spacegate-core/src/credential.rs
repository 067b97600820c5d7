//! Credential: a signed, typed assertion about a space.
//!
//! A credential is immutable once created. Changes to membership or feed
//! admission are represented as new credentials.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_bytes, canonical_content_bytes};
use crate::crypto::{Blake3Hash, Keypair, PublicKey, Signature};
use crate::types::CredentialId;

/// Role of an identity within a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceRole {
    /// May admit members and feeds.
    Admin,
    /// May admit feeds.
    Member,
    /// Former member; holds no rights.
    Removed,
}

impl SpaceRole {
    /// Convert to u8 for encoding.
    pub fn to_u8(self) -> u8 {
        match self {
            SpaceRole::Admin => 1,
            SpaceRole::Member => 2,
            SpaceRole::Removed => 3,
        }
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SpaceRole::Admin),
            2 => Some(SpaceRole::Member),
            3 => Some(SpaceRole::Removed),
            _ => None,
        }
    }
}

/// What a feed carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedDesignation {
    /// Credentials.
    Control,
    /// Object mutations.
    Data,
}

impl FeedDesignation {
    /// Convert to u8 for encoding.
    pub fn to_u8(self) -> u8 {
        match self {
            FeedDesignation::Control => 1,
            FeedDesignation::Data => 2,
        }
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FeedDesignation::Control),
            2 => Some(FeedDesignation::Data),
            _ => None,
        }
    }
}

/// Type URL prefix shared by all known assertions.
pub const TYPE_URL_PREFIX: &str = "spacegate.credentials.";

/// The assertion carried by a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// Founds a space. Issued by the space key to itself.
    SpaceGenesis {
        space_key: PublicKey,
    },

    /// Sets the role of the subject identity in a space.
    SpaceMember {
        space_key: PublicKey,
        role: SpaceRole,
        /// Feed the member should start replicating from.
        genesis_feed_key: PublicKey,
    },

    /// Admits the subject feed into a space.
    AdmittedFeed {
        space_key: PublicKey,
        /// Identity that owns the feed.
        identity_key: PublicKey,
        /// Device that writes the feed.
        device_key: PublicKey,
        designation: FeedDesignation,
    },

    /// An assertion type this build does not understand.
    ///
    /// Kept so that credentials written by newer peers are still logged.
    Unknown {
        type_url: String,
        value: Bytes,
    },
}

/// Discriminant of [`Assertion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionType {
    SpaceGenesis,
    SpaceMember,
    AdmittedFeed,
    Unknown,
}

impl AssertionType {
    /// Stable type URL for known assertions.
    pub fn type_url(self) -> &'static str {
        match self {
            AssertionType::SpaceGenesis => "spacegate.credentials.SpaceGenesis",
            AssertionType::SpaceMember => "spacegate.credentials.SpaceMember",
            AssertionType::AdmittedFeed => "spacegate.credentials.AdmittedFeed",
            AssertionType::Unknown => "spacegate.credentials.Unknown",
        }
    }

    /// Resolve a type URL to a known assertion type.
    pub fn from_type_url(type_url: &str) -> Self {
        match type_url {
            "spacegate.credentials.SpaceGenesis" => AssertionType::SpaceGenesis,
            "spacegate.credentials.SpaceMember" => AssertionType::SpaceMember,
            "spacegate.credentials.AdmittedFeed" => AssertionType::AdmittedFeed,
            _ => AssertionType::Unknown,
        }
    }
}

impl Assertion {
    /// Get the assertion discriminant.
    pub fn assertion_type(&self) -> AssertionType {
        match self {
            Assertion::SpaceGenesis { .. } => AssertionType::SpaceGenesis,
            Assertion::SpaceMember { .. } => AssertionType::SpaceMember,
            Assertion::AdmittedFeed { .. } => AssertionType::AdmittedFeed,
            Assertion::Unknown { .. } => AssertionType::Unknown,
        }
    }

    /// Type URL as written on the wire.
    pub fn type_url(&self) -> &str {
        match self {
            Assertion::Unknown { type_url, .. } => type_url,
            other => other.assertion_type().type_url(),
        }
    }

    /// The space this assertion is about, if it names one.
    pub fn space_key(&self) -> Option<&PublicKey> {
        match self {
            Assertion::SpaceGenesis { space_key }
            | Assertion::SpaceMember { space_key, .. }
            | Assertion::AdmittedFeed { space_key, .. } => Some(space_key),
            Assertion::Unknown { .. } => None,
        }
    }
}

/// The entity a credential is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub id: PublicKey,
}

/// A complete credential: content + signature, with optional content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Content hash. Absent on credentials that were never hashed.
    pub id: Option<CredentialId>,

    /// Key that signed the credential.
    pub issuer: PublicKey,

    pub subject: Subject,

    pub assertion: Assertion,

    /// Issuer-claimed time (Unix milliseconds). Untrusted.
    pub issuance_date: i64,

    /// Ed25519 signature by `issuer` over the canonical content bytes.
    pub signature: Signature,
}

impl Credential {
    /// Compute the credential ID (Blake3 hash of canonical bytes).
    pub fn compute_id(&self) -> CredentialId {
        let bytes = canonical_bytes(self);
        CredentialId(Blake3Hash::hash(&bytes).0)
    }

    /// The message the issuer signs.
    pub fn signing_message(&self) -> Vec<u8> {
        canonical_content_bytes(&self.issuer, &self.subject, &self.assertion, self.issuance_date)
    }

    /// Get the assertion discriminant.
    pub fn assertion_type(&self) -> AssertionType {
        self.assertion.assertion_type()
    }

    /// Attach the computed content id.
    pub fn with_id(mut self) -> Self {
        self.id = Some(self.compute_id());
        self
    }

    /// Drop the content id.
    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }
}

/// Builder for creating credentials.
pub struct CredentialBuilder {
    issuer: PublicKey,
    subject: Subject,
    assertion: Assertion,
    issuance_date: i64,
}

impl CredentialBuilder {
    /// Start building a credential.
    pub fn new(issuer: PublicKey, subject: PublicKey, assertion: Assertion) -> Self {
        Self {
            issuer,
            subject: Subject { id: subject },
            assertion,
            issuance_date: 0,
        }
    }

    /// Set the issuance date.
    pub fn issuance_date(mut self, ts: i64) -> Self {
        self.issuance_date = ts;
        self
    }

    /// Bytes the issuer must sign.
    pub fn signing_message(&self) -> Vec<u8> {
        canonical_content_bytes(&self.issuer, &self.subject, &self.assertion, self.issuance_date)
    }

    /// Complete the credential with an externally produced signature.
    ///
    /// The content id is attached.
    pub fn finish(self, signature: Signature) -> Credential {
        Credential {
            id: None,
            issuer: self.issuer,
            subject: self.subject,
            assertion: self.assertion,
            issuance_date: self.issuance_date,
            signature,
        }
        .with_id()
    }

    /// Build and sign the credential with a local keypair.
    pub fn sign(self, keypair: &Keypair) -> Credential {
        let signature = keypair.sign(&self.signing_message());
        self.finish(signature)
    }
}
