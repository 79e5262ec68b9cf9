//! Main tether crate providing an object-document mapping layer over
//! document stores.
//!
//! This crate is the primary entry point for users of the tether framework.
//! It re-exports the core types from the sub-crates and provides convenient
//! access to the storage backends.
//!
//! # Features
//!
//! - **Atomic mutation** - Every change after creation is a server-side
//!   update operator; there is no dirty tracking and no whole-document
//!   writeback
//! - **Typed update surface** - Operators check the structural kind of the
//!   targeted field before anything is sent
//! - **Fork-safe connections** - A store handle never reuses a connection
//!   established in another process
//! - **Transient-fault retries** - Lost connections are retried with
//!   backoff; everything else fails fast
//!
//! # Quick Start
//!
//! ```ignore
//! use tether::{prelude::*, memory::MemoryBackend};
//! use bson::Uuid;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Person {
//!     pub id: Uuid,
//!     pub name: String,
//!     pub likes: i64,
//! }
//!
//! impl Model for Person {
//!     fn id(&self) -> &Uuid { &self.id }
//!     fn collection_name() -> &'static str { "people" }
//!     fn field_names() -> &'static [&'static str] { &["id", "name", "likes"] }
//! }
//!
//! #[tokio::main]
//! async fn main() -> TetherResult<()> {
//!     let store = Store::new(MemoryBackend::new(), "app");
//!     let people = store.collection::<Person>();
//!
//!     let mut larry = people
//!         .create(Person { id: Uuid::new(), name: "Larry Wall".into(), likes: 0 })
//!         .await?;
//!
//!     // Mutation happens on the server; the handle merges the post-update
//!     // image back onto its in-memory state.
//!     larry.update_inc("likes", 1).await?;
//!     assert_eq!(larry.likes, 1);
//!
//!     // Another handle to the same document converges via sync.
//!     let mut other = people.find_by_id(larry.id()).await?.unwrap();
//!     other.sync().await?;
//!     assert_eq!(other.likes, 1);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires the `mongodb`
//!   feature)

pub mod prelude;

pub use tether_core::{backend, binding, cursor, error, handle, kind, model, ops, path, store};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use tether_memory::{MemoryBackend, MemoryCollection, MemoryConnection};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use tether_mongodb::{MongoBackend, MongoCollection, MongoConnection};
}
