//! # loom-collab: Realtime collaboration layer for Loom
//!
//! Moves document patches and cursor presence between peers editing the
//! same project.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   JSON text frames   ┌──────────────┐
//! │ CollabClient │ ◄──────────────────► │ RelayServer  │
//! │ (per user)   │   jwt.<token> proto  │ (stateless)  │
//! └──────┬───────┘                      └──────┬───────┘
//!        │ TransportEvent                      │
//!        ▼                                     ▼
//! ┌──────────────┐                      ┌──────────────┐
//! │ CollabSession│                      │ RoomManager  │
//! │ Document +   │                      │ BroadcastGrp │
//! │ presence     │                      │ (fan-out)    │
//! └──────┬───────┘                      └──────────────┘
//!        │
//!        ▼
//!  SessionObserver / ProjectStore
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire frames (`patch`, `presence`)
//! - [`client`]: WebSocket transport with reconnect and backoff
//! - [`presence`]: remote cursors, TTL sweep, pointer throttle
//! - [`session`]: local/remote edit glue and the session task
//! - [`broadcast`]: room-based fan-out
//! - [`server`]: WebSocket relay server
//! - [`storage`]: project persistence (memory, RocksDB)

pub mod broadcast;
pub mod client;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, BroadcastStats, RelayFrame, RoomManager};
pub use client::{
    CollabClient, ConnectionState, ReconnectPolicy, TransportConfig, TransportError,
    TransportEvent,
};
pub use presence::{
    color_for_user, LocalUser, PresenceConfig, PresenceRecord, PresenceThrottle,
    PresenceTracker,
};
pub use protocol::{CollabMessage, PresenceUpdate, ProtocolError};
pub use server::{
    AcceptAnyToken, RelayServer, ServerConfig, ServerError, ServerStats, StaticTokens,
    TokenVerifier,
};
pub use session::{
    spawn_session, CollabSession, NoopObserver, Outbound, SessionError, SessionHandle,
    SessionObserver, SyncStatus,
};
pub use storage::{
    MemoryStore, ProjectMetadata, ProjectStore, RocksStore, StoreConfig, StoreError,
    StoredProject,
};
