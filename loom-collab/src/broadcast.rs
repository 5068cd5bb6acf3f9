//! Per-project rooms with fan-out to N-1 peers.
//!
//! Uses tokio broadcast channels: one send reaches every subscriber, and
//! each peer's receiver buffers up to `capacity` frames before it starts
//! lagging. Frames carry the sending peer's id so receivers can skip their
//! own.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// One text frame in flight through a room.
#[derive(Debug, Clone)]
pub struct RelayFrame {
    pub sender: Uuid,
    pub text: Arc<str>,
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_lagged: u64,
    pub active_peers: usize,
}

/// A broadcast group for a single project room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<RelayFrame>,
    peers: RwLock<HashSet<Uuid>>,
    capacity: usize,
    messages_sent: AtomicU64,
    messages_lagged: AtomicU64,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            peers: RwLock::new(HashSet::new()),
            capacity,
            messages_sent: AtomicU64::new(0),
            messages_lagged: AtomicU64::new(0),
        }
    }

    /// Add a peer; returns its receiver.
    pub async fn add_peer(&self, peer_id: Uuid) -> broadcast::Receiver<RelayFrame> {
        self.peers.write().await.insert(peer_id);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.write().await.remove(peer_id)
    }

    /// Fan a frame out to every subscriber, sender included; filtering is the
    /// receiver's job. Returns the number of receivers.
    pub fn broadcast(&self, sender: Uuid, text: impl Into<Arc<str>>) -> usize {
        let frame = RelayFrame {
            sender,
            text: text.into(),
        };
        let count = self.sender.send(frame).unwrap_or(0);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Record frames a slow receiver skipped.
    pub fn record_lag(&self, skipped: u64) {
        self.messages_lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains(peer_id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_lagged: self.messages_lagged.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Room manager: maps project ids to broadcast groups.
///
/// Joins and leaves hold the room-map write lock, so a room is never
/// dropped while a peer is joining it.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<BroadcastGroup>>>,
    capacity: usize,
    max_peers: usize,
}

impl RoomManager {
    pub fn new(capacity: usize, max_peers: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            capacity,
            max_peers,
        }
    }

    /// Join `peer_id` to the room for `project_id`, creating it on first
    /// use. `None` when the room is full.
    pub async fn join(
        &self,
        project_id: &str,
        peer_id: Uuid,
    ) -> Option<(Arc<BroadcastGroup>, broadcast::Receiver<RelayFrame>)> {
        if self.max_peers == 0 {
            return None;
        }
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(project_id.to_owned())
            .or_insert_with(|| Arc::new(BroadcastGroup::new(self.capacity)))
            .clone();
        if room.peer_count().await >= self.max_peers {
            return None;
        }
        let rx = room.add_peer(peer_id).await;
        Some((room, rx))
    }

    /// Remove `peer_id`; drops the room once empty. Returns true if the room
    /// was dropped.
    pub async fn leave(&self, project_id: &str, peer_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(project_id).cloned() else {
            return false;
        };
        room.remove_peer(peer_id).await;
        if room.peer_count().await == 0 {
            rooms.remove(project_id);
            return true;
        }
        false
    }

    pub async fn room(&self, project_id: &str) -> Option<Arc<BroadcastGroup>> {
        self.rooms.read().await.get(project_id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_projects(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
