//! Presence: who is online in a space.
//!
//! The local peer announces itself every `announce_interval`. Announcements
//! from a remote peer mark it online; a peer silent for `offline_timeout`
//! drops out of [`Presence::online_peers`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use spacegate_async::Context;
use spacegate_core::{now_millis, PublicKey};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;

use crate::config::PresenceConfig;
use crate::error::Result;

const ANNOUNCE_CHANNEL_CAPACITY: usize = 64;

/// A liveness announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcement {
    pub peer_id: PublicKey,
    /// Sender's clock (Unix milliseconds). Informational.
    pub timestamp: i64,
}

/// Presence state of one space.
pub struct Presence {
    local_peer_id: PublicKey,
    config: PresenceConfig,
    seen: RwLock<HashMap<PublicKey, Instant>>,
    announcements: broadcast::Sender<Announcement>,
    ctx: Context,
}

impl Presence {
    pub fn new(local_peer_id: PublicKey, config: PresenceConfig, ctx: Context) -> Self {
        let (announcements, _) = broadcast::channel(ANNOUNCE_CHANNEL_CAPACITY);
        Self {
            local_peer_id,
            config,
            seen: RwLock::new(HashMap::new()),
            announcements,
            ctx,
        }
    }

    pub fn local_peer_id(&self) -> &PublicKey {
        &self.local_peer_id
    }

    /// Start announcing. Stops when the context is disposed.
    pub fn open(self: &Arc<Self>) -> Result<()> {
        let presence = Arc::downgrade(self);
        let period = self.config.announce_interval();
        self.ctx.spawn("presence-announce", async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match presence.upgrade() {
                    Some(presence) => presence.announce(),
                    None => break,
                }
            }
        })?;
        Ok(())
    }

    pub fn close(&self) {
        self.ctx.dispose();
    }

    /// Send one announcement to every attached session.
    pub fn announce(&self) {
        let _ = self.announcements.send(Announcement {
            peer_id: self.local_peer_id,
            timestamp: now_millis(),
        });
    }

    /// Local announcements, for forwarding to peers.
    pub fn subscribe_announcements(&self) -> broadcast::Receiver<Announcement> {
        self.announcements.subscribe()
    }

    /// Record an announcement received from a peer.
    pub fn receive(&self, announcement: Announcement) {
        if announcement.peer_id == self.local_peer_id {
            return;
        }
        trace!(peer_id = %announcement.peer_id, "presence announcement");
        self.seen
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(announcement.peer_id, Instant::now());
    }

    /// Remote peers heard from within the offline timeout, in key order.
    pub fn online_peers(&self) -> Vec<PublicKey> {
        let timeout = self.config.offline_timeout();
        let now = Instant::now();
        let mut peers: Vec<_> = self
            .seen
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, last)| now.duration_since(**last) < timeout)
            .map(|(peer, _)| *peer)
            .collect();
        peers.sort();
        peers
    }

    pub fn create_extension(self: &Arc<Self>, remote_peer_id: PublicKey) -> PresenceExtension {
        PresenceExtension {
            presence: self.clone(),
            remote_peer_id,
        }
    }
}

/// Presence protocol on one session.
pub struct PresenceExtension {
    presence: Arc<Presence>,
    remote_peer_id: PublicKey,
}

impl PresenceExtension {
    pub fn remote_peer_id(&self) -> &PublicKey {
        &self.remote_peer_id
    }

    /// Announcements to send to the remote peer.
    pub fn outgoing(&self) -> broadcast::Receiver<Announcement> {
        self.presence.subscribe_announcements()
    }

    /// Handle an announcement from the remote peer.
    pub fn on_announcement(&self, announcement: Announcement) {
        self.presence.receive(announcement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn presence(byte: u8) -> Arc<Presence> {
        Arc::new(Presence::new(
            PublicKey::from_bytes([byte; 32]),
            PresenceConfig {
                announce_interval_ms: 100,
                offline_timeout_ms: 1_000,
            },
            Context::new("presence"),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_goes_offline() {
        let local = presence(1);
        let remote = PublicKey::from_bytes([2; 32]);

        local.receive(Announcement {
            peer_id: remote,
            timestamp: 0,
        });
        assert_eq!(local.online_peers(), vec![remote]);

        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert!(local.online_peers().is_empty());
    }

    #[tokio::test]
    async fn test_own_announcements_ignored() {
        let local = presence(1);
        local.receive(Announcement {
            peer_id: *local.local_peer_id(),
            timestamp: 0,
        });
        assert!(local.online_peers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extensions_exchange_announcements() {
        let a = presence(1);
        let b = presence(2);
        let a_ext = a.create_extension(*b.local_peer_id());
        let b_ext = b.create_extension(*a.local_peer_id());
        let mut from_a = a_ext.outgoing();

        a.open().unwrap();
        let announcement = from_a.recv().await.unwrap();
        b_ext.on_announcement(announcement);

        assert_eq!(b.online_peers(), vec![*a.local_peer_id()]);

        a.close();
        assert!(a.open().is_err());
    }
}
