//! Cryptographic primitives.
//!
//! Wraps Ed25519 signing and Blake3 hashing with strong types. Public keys
//! identify spaces, identities, devices and feeds alike.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Constructors, hex conversion and formatting for fixed-width byte newtypes.
///
/// `Debug` and `Display` show the first 16 hex chars.
macro_rules! fixed_bytes {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                ::hex::encode(self.0)
            }

            /// Parse exactly `2 * len` hex chars.
            pub fn from_hex(s: &str) -> ::std::result::Result<Self, ::hex::FromHexError> {
                let mut bytes = [0u8; $len];
                ::hex::decode_to_slice(s, &mut bytes)?;
                Ok(Self(bytes))
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..16])
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }
    };
}

pub(crate) use fixed_bytes;

/// Blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Blake3Hash(pub [u8; 32]);

fixed_bytes!(Blake3Hash, 32);

impl Blake3Hash {
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }
}

/// Ed25519 public key. Names spaces, identities, devices and feeds.
///
/// Ordering and hashing are over the raw bytes; serde uses the full hex
/// string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

fixed_bytes!(PublicKey, 32);

impl PublicKey {
    /// A key with no private half, for ids and tests.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CoreError> {
        VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CoreError::InvalidPublicKey)?
            .verify(message, &DalekSignature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }

    /// Eight hex chars, for task and scope names.
    pub fn truncate(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl FromStr for PublicKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 32]>::try_from(slice)
            .map(Self)
            .map_err(|_| CoreError::InvalidPublicKey)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

fixed_bytes!(Signature, 64);

impl Signature {
    /// Placeholder that never verifies.
    pub const ZERO: Self = Self([0u8; 64]);
}

/// An Ed25519 keypair.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic keypair, for fixtures.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_binds_message_and_key() {
        let device = Keypair::from_seed(&[0x42; 32]);
        let signature = device.sign(b"admit feed");

        assert!(device.public_key().verify(b"admit feed", &signature).is_ok());
        assert!(device.public_key().verify(b"admit feeD", &signature).is_err());
        assert!(PublicKey::random().verify(b"admit feed", &signature).is_err());
        assert!(device.public_key().verify(b"admit feed", &Signature::ZERO).is_err());

        let again = Keypair::from_seed(&[0x42; 32]);
        assert_eq!(again.public_key(), device.public_key());
    }

    #[test]
    fn test_public_key_serializes_as_hex() {
        let key = PublicKey::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));

        let recovered: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, key);
    }

    #[test]
    fn test_public_key_rejects_short_hex() {
        assert!(PublicKey::from_hex("abcd").is_err());
        assert!(PublicKey::try_from(&[0u8; 31][..]).is_err());
        assert!(serde_json::from_str::<PublicKey>("\"abcd\"").is_err());
    }

    #[test]
    fn test_public_key_display_is_prefix() {
        let key = PublicKey::from_bytes([0xcd; 32]);
        assert_eq!(format!("{}", key), "cd".repeat(8));
        assert_eq!(key.truncate(), "cd".repeat(4));
        assert_eq!(format!("{:?}", key), format!("PublicKey({})", "cd".repeat(8)));
    }
}
