//! Persisted space metadata.
//!
//! The JSON shape of [`SpaceMetadata`] is read by recovery and inspection
//! tooling. Field names and the omission of absent optional fields are part
//! of that contract.

use serde::{Deserialize, Serialize};
use spacegate_core::{PublicKey, Timeframe};

/// Durable record of one space this device participates in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceMetadata {
    /// Space key.
    pub key: PublicKey,

    /// Feed holding the genesis credential.
    pub genesis_feed_key: PublicKey,

    /// This device's control feed.
    pub control_feed_key: PublicKey,

    /// This device's data feed.
    pub data_feed_key: PublicKey,

    /// Data pipeline position at last save. Gates readiness on reopen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_timeframe: Option<Timeframe>,

    /// Id of the latest stored snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_ref: Option<String>,
}

impl SpaceMetadata {
    /// Metadata for a freshly created space whose genesis is on the control feed.
    pub fn new(key: PublicKey, control_feed_key: PublicKey, data_feed_key: PublicKey) -> Self {
        Self {
            key,
            genesis_feed_key: control_feed_key,
            control_feed_key,
            data_feed_key,
            latest_timeframe: None,
            snapshot_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; 32])
    }

    #[test]
    fn test_field_names() {
        let metadata = SpaceMetadata {
            key: key(1),
            genesis_feed_key: key(2),
            control_feed_key: key(3),
            data_feed_key: key(4),
            latest_timeframe: None,
            snapshot_ref: None,
        };
        let value = serde_json::to_value(&metadata).unwrap();
        let object = value.as_object().unwrap();

        let mut fields: Vec<_> = object.keys().cloned().collect();
        fields.sort();
        assert_eq!(
            fields,
            vec!["controlFeedKey", "dataFeedKey", "genesisFeedKey", "key"]
        );
    }

    #[test]
    fn test_optional_fields_present_when_set() {
        let mut metadata = SpaceMetadata::new(key(1), key(3), key(4));
        metadata.latest_timeframe = Some([(key(4), 12)].into_iter().collect());
        metadata.snapshot_ref = Some("abc".into());

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"latestTimeframe\""));
        assert!(json.contains("\"snapshotRef\":\"abc\""));

        let back: SpaceMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
        assert_eq!(back.genesis_feed_key, key(3));
    }
}
