//! Project persistence.
//!
//! ```text
//! ┌──────────────┐   load / create / update / delete   ┌──────────────┐
//! │ CollabSession│ ──────────────────────────────────► │ ProjectStore │
//! └──────────────┘                                     └──────┬───────┘
//!                                                             │
//!                                          ┌──────────────────┼──────────────────┐
//!                                          ▼                                     ▼
//!                                   MemoryStore                            RocksStore
//!                                   (tests, demos)             CF "documents": LZ4 JSON snapshots
//!                                                              CF "metadata" : bincode metadata
//! ```
//!
//! Only whole snapshots are stored; patch history is not kept.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::{ProjectMetadata, RocksStore, StoreConfig};

use loom_core::Document;
use thiserror::Error;

/// A project as returned by [`ProjectStore::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProject {
    pub id: String,
    pub name: String,
    pub document: Document,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Where project documents live between sessions.
pub trait ProjectStore: Send + Sync {
    fn load(&self, id: &str) -> Result<Document, StoreError>;

    /// Stores a new project under a fresh id.
    fn create(&self, name: &str, document: Document) -> Result<StoredProject, StoreError>;

    /// Overwrites the snapshot of an existing project.
    fn update(&self, id: &str, document: &Document) -> Result<(), StoreError>;

    fn delete(&self, id: &str) -> Result<(), StoreError>;
}
