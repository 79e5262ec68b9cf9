//! MongoDB storage backend for the tether object-document mapper.
//!
//! Connections are established lazily from a DSN each time the store asks,
//! which is what makes the mapper's fork safety and reconnect-on-retry
//! behavior work against a real server. Values are stored as-is: datetimes
//! round-trip as raw BSON datetimes with no timezone-aware wrapping.

mod store;

pub use store::{MongoBackend, MongoCollection, MongoConnection};
