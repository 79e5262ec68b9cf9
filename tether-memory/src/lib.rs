//! In-memory storage backend for the tether object-document mapper.
//!
//! Documents are stored as BSON field maps in ordered maps behind an
//! async-aware read-write lock. Queries scan the whole collection; there is
//! no indexing beyond recording declared index specifications. The backend
//! also exposes fault-injection hooks (refusing connections, failing the
//! next N operations) so mapper retry behavior can be exercised without a
//! real server.

mod apply;
mod evaluator;
mod store;

pub use store::{MemoryBackend, MemoryCollection, MemoryConnection};
