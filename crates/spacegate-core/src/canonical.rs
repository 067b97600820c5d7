//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (dates are i64 milliseconds)
//!
//! The canonical encoding is what issuers sign and what credential ids hash,
//! so the same credential produces identical bytes on every platform. The
//! same encoding is the wire format for credentials written to control feeds.

use ciborium::value::Value;

use crate::credential::{Assertion, AssertionType, Credential, FeedDesignation, SpaceRole, Subject};
use crate::crypto::{PublicKey, Signature};
use crate::error::CoreError;
use crate::types::CredentialId;

/// Credential field keys (integer keys for compact encoding).
mod keys {
    pub const ISSUER: u64 = 0;
    pub const SUBJECT: u64 = 1;
    pub const ASSERTION: u64 = 2;
    pub const ISSUANCE_DATE: u64 = 3;
    pub const SIGNATURE: u64 = 4;
    pub const ID: u64 = 5;
}

/// Assertion field keys.
mod assertion_keys {
    pub const TYPE: u64 = 0;
    pub const SPACE_KEY: u64 = 1;
    pub const ROLE: u64 = 2;
    pub const GENESIS_FEED_KEY: u64 = 3;
    pub const IDENTITY_KEY: u64 = 4;
    pub const DEVICE_KEY: u64 = 5;
    pub const DESIGNATION: u64 = 6;
    pub const VALUE: u64 = 7;
}

/// Encode the signed content of a credential (issuer, subject, assertion, date).
pub fn canonical_content_bytes(
    issuer: &PublicKey,
    subject: &Subject,
    assertion: &Assertion,
    issuance_date: i64,
) -> Vec<u8> {
    let entries = content_entries(issuer, subject, assertion, issuance_date);
    encode_cbor_value_canonical(&Value::Map(entries))
}

/// Encode content plus signature. This is the input to the credential id.
pub fn canonical_bytes(credential: &Credential) -> Vec<u8> {
    let mut entries = content_entries(
        &credential.issuer,
        &credential.subject,
        &credential.assertion,
        credential.issuance_date,
    );
    entries.push((
        int(keys::SIGNATURE),
        Value::Bytes(credential.signature.0.to_vec()),
    ));
    encode_cbor_value_canonical(&Value::Map(entries))
}

/// Encode a credential for writing to a feed (includes the id when present).
pub fn encode_credential(credential: &Credential) -> Vec<u8> {
    let mut entries = content_entries(
        &credential.issuer,
        &credential.subject,
        &credential.assertion,
        credential.issuance_date,
    );
    entries.push((
        int(keys::SIGNATURE),
        Value::Bytes(credential.signature.0.to_vec()),
    ));
    if let Some(id) = &credential.id {
        entries.push((int(keys::ID), Value::Bytes(id.0.to_vec())));
    }
    encode_cbor_value_canonical(&Value::Map(entries))
}

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

fn key_bytes(key: &PublicKey) -> Value {
    Value::Bytes(key.0.to_vec())
}

fn content_entries(
    issuer: &PublicKey,
    subject: &Subject,
    assertion: &Assertion,
    issuance_date: i64,
) -> Vec<(Value, Value)> {
    vec![
        (int(keys::ISSUER), key_bytes(issuer)),
        (
            int(keys::SUBJECT),
            Value::Map(vec![(int(0), key_bytes(&subject.id))]),
        ),
        (int(keys::ASSERTION), assertion_to_cbor_value(assertion)),
        (
            int(keys::ISSUANCE_DATE),
            Value::Integer(issuance_date.into()),
        ),
    ]
}

fn assertion_to_cbor_value(assertion: &Assertion) -> Value {
    use assertion_keys::*;

    let mut entries = vec![(int(TYPE), Value::Text(assertion.type_url().to_string()))];

    match assertion {
        Assertion::SpaceGenesis { space_key } => {
            entries.push((int(SPACE_KEY), key_bytes(space_key)));
        }
        Assertion::SpaceMember {
            space_key,
            role,
            genesis_feed_key,
        } => {
            entries.push((int(SPACE_KEY), key_bytes(space_key)));
            entries.push((int(ROLE), int(role.to_u8() as u64)));
            entries.push((int(GENESIS_FEED_KEY), key_bytes(genesis_feed_key)));
        }
        Assertion::AdmittedFeed {
            space_key,
            identity_key,
            device_key,
            designation,
        } => {
            entries.push((int(SPACE_KEY), key_bytes(space_key)));
            entries.push((int(IDENTITY_KEY), key_bytes(identity_key)));
            entries.push((int(DEVICE_KEY), key_bytes(device_key)));
            entries.push((int(DESIGNATION), int(designation.to_u8() as u64)));
        }
        Assertion::Unknown { value, .. } => {
            entries.push((int(VALUE), Value::Bytes(value.to_vec())));
        }
    }

    Value::Map(entries)
}

fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut writer = CanonicalWriter::default();
    writer.value(value);
    writer.buf
}

/// Deterministic CBOR writer over the value kinds this module produces.
///
/// Other kinds (floats, tags) are written as null; nothing here creates them.
#[derive(Default)]
struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    const UNSIGNED: u8 = 0;
    const NEGATIVE: u8 = 1;
    const BYTES: u8 = 2;
    const TEXT: u8 = 3;
    const ARRAY: u8 = 4;
    const MAP: u8 = 5;

    /// Major type plus argument, in the shortest form that holds `arg`.
    fn head(&mut self, major: u8, arg: u64) {
        let major = major << 5;
        match arg {
            0..=23 => self.buf.push(major | arg as u8),
            24..=0xff => self.buf.extend_from_slice(&[major | 24, arg as u8]),
            0x100..=0xffff => {
                self.buf.push(major | 25);
                self.buf.extend_from_slice(&(arg as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buf.push(major | 26);
                self.buf.extend_from_slice(&(arg as u32).to_be_bytes());
            }
            _ => {
                self.buf.push(major | 27);
                self.buf.extend_from_slice(&arg.to_be_bytes());
            }
        }
    }

    fn value(&mut self, value: &Value) {
        match value {
            Value::Integer(i) => {
                let n = i128::from(*i);
                if n < 0 {
                    // -1 is argument 0.
                    self.head(Self::NEGATIVE, (-1 - n) as u64);
                } else {
                    self.head(Self::UNSIGNED, n as u64);
                }
            }
            Value::Bytes(bytes) => {
                self.head(Self::BYTES, bytes.len() as u64);
                self.buf.extend_from_slice(bytes);
            }
            Value::Text(text) => {
                self.head(Self::TEXT, text.len() as u64);
                self.buf.extend_from_slice(text.as_bytes());
            }
            Value::Array(items) => {
                self.head(Self::ARRAY, items.len() as u64);
                items.iter().for_each(|item| self.value(item));
            }
            Value::Map(entries) => self.map(entries),
            Value::Bool(true) => self.buf.push(0xf5),
            Value::Bool(false) => self.buf.push(0xf4),
            _ => self.buf.push(0xf6),
        }
    }

    /// Entries ordered by the bytes of their encoded keys.
    fn map(&mut self, entries: &[(Value, Value)]) {
        let mut encoded: Vec<(Vec<u8>, &Value)> = entries
            .iter()
            .map(|(key, value)| (encode_cbor_value_canonical(key), value))
            .collect();
        encoded.sort_by(|a, b| a.0.cmp(&b.0));

        self.head(Self::MAP, encoded.len() as u64);
        for (key, value) in encoded {
            self.buf.extend_from_slice(&key);
            self.value(value);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Decode a credential from its feed encoding.
pub fn decode_credential(bytes: &[u8]) -> Result<Credential, CoreError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let map = as_map(&value, "credential")?;

    let issuer = get_key(map, keys::ISSUER, "issuer")?;

    let subject = match get(map, keys::SUBJECT) {
        Some(Value::Map(subject)) => Subject {
            id: get_key(subject, 0, "subject.id")?,
        },
        _ => return Err(malformed("missing subject")),
    };

    let assertion = match get(map, keys::ASSERTION) {
        Some(value) => cbor_value_to_assertion(value)?,
        None => return Err(malformed("missing assertion")),
    };

    let issuance_date = match get(map, keys::ISSUANCE_DATE) {
        Some(Value::Integer(i)) => i64::try_from(*i).map_err(|_| malformed("issuance date"))?,
        _ => return Err(malformed("missing issuance date")),
    };

    let signature = match get(map, keys::SIGNATURE) {
        Some(Value::Bytes(b)) if b.len() == 64 => {
            let mut arr = [0u8; 64];
            arr.copy_from_slice(b);
            Signature(arr)
        }
        _ => return Err(malformed("invalid signature")),
    };

    let id = match get(map, keys::ID) {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            Some(CredentialId(arr))
        }
        None | Some(Value::Null) => None,
        _ => return Err(malformed("invalid id")),
    };

    Ok(Credential {
        id,
        issuer,
        subject,
        assertion,
        issuance_date,
        signature,
    })
}

fn cbor_value_to_assertion(value: &Value) -> Result<Assertion, CoreError> {
    use assertion_keys::*;

    let map = as_map(value, "assertion")?;

    let type_url = match get(map, TYPE) {
        Some(Value::Text(s)) => s.clone(),
        _ => return Err(malformed("missing assertion type")),
    };

    let assertion = match AssertionType::from_type_url(&type_url) {
        AssertionType::SpaceGenesis => Assertion::SpaceGenesis {
            space_key: get_key(map, SPACE_KEY, "space_key")?,
        },
        AssertionType::SpaceMember => {
            let role = get_small_uint(map, ROLE, "role")?;
            Assertion::SpaceMember {
                space_key: get_key(map, SPACE_KEY, "space_key")?,
                role: SpaceRole::from_u8(role)
                    .ok_or_else(|| malformed(&format!("invalid role: {}", role)))?,
                genesis_feed_key: get_key(map, GENESIS_FEED_KEY, "genesis_feed_key")?,
            }
        }
        AssertionType::AdmittedFeed => {
            let designation = get_small_uint(map, DESIGNATION, "designation")?;
            Assertion::AdmittedFeed {
                space_key: get_key(map, SPACE_KEY, "space_key")?,
                identity_key: get_key(map, IDENTITY_KEY, "identity_key")?,
                device_key: get_key(map, DEVICE_KEY, "device_key")?,
                designation: FeedDesignation::from_u8(designation)
                    .ok_or_else(|| malformed(&format!("invalid designation: {}", designation)))?,
            }
        }
        AssertionType::Unknown => {
            let value = match get(map, VALUE) {
                Some(Value::Bytes(b)) => b.clone().into(),
                None => bytes::Bytes::new(),
                _ => return Err(malformed("invalid assertion value")),
            };
            Assertion::Unknown { type_url, value }
        }
    };

    Ok(assertion)
}

fn malformed(msg: &str) -> CoreError {
    CoreError::MalformedCredential(msg.to_string())
}

fn as_map<'a>(value: &'a Value, what: &str) -> Result<&'a [(Value, Value)], CoreError> {
    match value {
        Value::Map(m) => Ok(m),
        _ => Err(malformed(&format!("{} is not a map", what))),
    }
}

fn get(map: &[(Value, Value)], key: u64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if u64::try_from(*i).ok() == Some(key)))
        .map(|(_, v)| v)
}

fn get_key(map: &[(Value, Value)], key: u64, what: &str) -> Result<PublicKey, CoreError> {
    match get(map, key) {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            Ok(PublicKey(arr))
        }
        _ => Err(malformed(&format!("invalid {}", what))),
    }
}

fn get_small_uint(map: &[(Value, Value)], key: u64, what: &str) -> Result<u8, CoreError> {
    match get(map, key) {
        Some(Value::Integer(i)) => u8::try_from(*i).map_err(|_| malformed(what)),
        _ => Err(malformed(&format!("missing {}", what))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialBuilder;
    use crate::crypto::Keypair;

    fn member_credential() -> Credential {
        let space = Keypair::from_seed(&[0x42; 32]);
        let member = Keypair::from_seed(&[0x43; 32]);
        CredentialBuilder::new(
            space.public_key(),
            member.public_key(),
            Assertion::SpaceMember {
                space_key: space.public_key(),
                role: SpaceRole::Admin,
                genesis_feed_key: PublicKey::from_bytes([0x07; 32]),
            },
        )
        .issuance_date(1_736_870_400_000)
        .sign(&space)
    }

    #[test]
    fn test_canonical_encoding_deterministic() {
        let credential = member_credential();
        assert_eq!(canonical_bytes(&credential), canonical_bytes(&credential));
        assert_eq!(credential.signing_message(), credential.signing_message());
    }

    fn written(value: Value) -> Vec<u8> {
        encode_cbor_value_canonical(&value)
    }

    #[test]
    fn test_shortest_integer_heads() {
        assert_eq!(written(Value::Integer(0.into())), [0x00]);
        assert_eq!(written(Value::Integer(23.into())), [0x17]);
        assert_eq!(written(Value::Integer(24.into())), [0x18, 24]);
        assert_eq!(written(Value::Integer(256.into())), [0x19, 0x01, 0x00]);
        assert_eq!(
            written(Value::Integer(0x1_0000.into())),
            [0x1a, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(written(Value::Integer((-1).into())), [0x20]);
        assert_eq!(written(Value::Integer((-25).into())), [0x38, 24]);
    }

    #[test]
    fn test_map_keys_sorted_by_encoding() {
        let entries = vec![
            (Value::Integer(8.into()), Value::Integer(80.into())),
            (Value::Integer(0.into()), Value::Text("a".into())),
            (Value::Integer(5.into()), Value::Integer(50.into())),
        ];
        assert_eq!(
            written(Value::Map(entries)),
            [0xa3, 0x00, 0x61, b'a', 0x05, 0x18, 50, 0x08, 0x18, 80]
        );
    }

    #[test]
    fn test_feed_encoding_preserves_credential() {
        let credential = member_credential();
        let decoded = decode_credential(&encode_credential(&credential)).unwrap();
        assert_eq!(decoded, credential);
    }

    #[test]
    fn test_unknown_assertion_survives_decoding() {
        let issuer = Keypair::from_seed(&[0x11; 32]);
        let credential = CredentialBuilder::new(
            issuer.public_key(),
            issuer.public_key(),
            Assertion::Unknown {
                type_url: "example.future.Epoch".into(),
                value: bytes::Bytes::from_static(b"\x01\x02"),
            },
        )
        .sign(&issuer)
        .without_id();

        let decoded = decode_credential(&encode_credential(&credential)).unwrap();
        assert_eq!(decoded.id, None);
        assert_eq!(decoded.assertion.type_url(), "example.future.Epoch");
        assert_eq!(decoded.assertion_type(), AssertionType::Unknown);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_credential(b"\x01\x02\x03").is_err());
        assert!(matches!(
            decode_credential(&[0xa0]),
            Err(CoreError::MalformedCredential(_))
        ));
    }
}
