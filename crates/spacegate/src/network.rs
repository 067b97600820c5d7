//! Network session hook.
//!
//! When a peer connects, each open space attaches its protocol extensions
//! to the session. The transport behind a session lives outside this crate.

use std::sync::Mutex;

use spacegate_core::PublicKey;

use crate::presence::PresenceExtension;
use crate::snapshot::ObjectSyncExtension;

/// Extension name of the presence protocol.
pub const PRESENCE_EXTENSION: &str = "spacegate.presence";

/// Extension name of the snapshot blob protocol.
pub const OBJECT_SYNC_EXTENSION: &str = "spacegate.objectsync";

/// A protocol extension attached to one session.
pub enum SessionExtension {
    Presence(PresenceExtension),
    ObjectSync(ObjectSyncExtension),
}

/// A connection to one remote peer.
pub trait NetworkSession: Send + Sync {
    fn remote_peer_id(&self) -> PublicKey;

    fn add_extension(&self, name: &str, extension: SessionExtension);
}

/// Session that keeps its extensions in memory.
pub struct MemorySession {
    remote_peer_id: PublicKey,
    extensions: Mutex<Vec<(String, SessionExtension)>>,
}

impl MemorySession {
    pub fn new(remote_peer_id: PublicKey) -> Self {
        Self {
            remote_peer_id,
            extensions: Mutex::new(Vec::new()),
        }
    }

    /// Names of attached extensions, in attach order.
    pub fn extension_names(&self) -> Vec<String> {
        self.extensions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Detach all extensions.
    pub fn take_extensions(&self) -> Vec<(String, SessionExtension)> {
        std::mem::take(&mut *self.extensions.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl NetworkSession for MemorySession {
    fn remote_peer_id(&self) -> PublicKey {
        self.remote_peer_id
    }

    fn add_extension(&self, name: &str, extension: SessionExtension) {
        self.extensions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), extension));
    }
}
