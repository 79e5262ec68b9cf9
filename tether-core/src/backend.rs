//! Storage backend abstraction.
//!
//! The underlying document database is an opaque collaborator behind three
//! traits: a [`Backend`] establishes connections, a [`Connection`] hands out
//! named collection references, and a [`CollectionRef`] executes the small
//! set of store operations the mapper consumes (find, count, delete,
//! replace-with-upsert, find-and-modify returning the post-image, index
//! creation). Backends report faults as [`StoreError`]; the mapper decides
//! what is retried.

use std::fmt::Debug;

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;

use crate::error::StoreError;

/// A stream of raw result documents produced by a server-side query.
pub type DocumentStream = BoxStream<'static, Result<Document, StoreError>>;

/// Shaping options for a server-side query.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Sort specification, e.g. `doc! { "name": 1 }`.
    pub sort: Option<Document>,
    /// Maximum number of results.
    pub limit: Option<i64>,
    /// Number of leading results to skip.
    pub skip: Option<u64>,
    /// Field projection, e.g. `doc! { "name": 1 }`.
    pub projection: Option<Document>,
}

/// A parsed index specification: ordered field/direction pairs plus
/// optional backend index options.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Ordered field/direction pairs. Ordering is significant for compound
    /// indexes.
    pub keys: Vec<(String, i32)>,
    /// Backend-specific index options (e.g. `{ "unique": true }`).
    pub options: Option<Document>,
}

/// A factory for connections to one logical store.
#[async_trait]
pub trait Backend: Send + Sync + Debug + 'static {
    /// The connection type this backend produces.
    type Conn: Connection;

    /// Establishes a connection to the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectFailed`] if the store cannot be
    /// reached; this is fatal and never retried by the mapper.
    async fn connect(&self) -> Result<Self::Conn, StoreError>;
}

/// A live connection that can hand out named collection references.
pub trait Connection: Send + Sync + 'static {
    /// The collection reference type this connection produces.
    type Coll: CollectionRef;

    /// Returns a reference to the named collection in the given database.
    fn collection(&self, database: &str, name: &str) -> Self::Coll;
}

/// The store operations the mapper consumes, scoped to one collection.
///
/// References are cheap to clone and are cached by the store handle; a
/// cached reference must remain usable for as long as the connection that
/// produced it.
#[async_trait]
pub trait CollectionRef: Clone + Send + Sync + Debug + 'static {
    /// Finds at most one document matching `filter`.
    async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError>;

    /// Executes a query and returns the raw result stream.
    async fn find(&self, filter: Document, options: FindOptions) -> Result<DocumentStream, StoreError>;

    /// Counts documents matching `filter`.
    async fn count(&self, filter: Document) -> Result<u64, StoreError>;

    /// Deletes at most one document matching `filter`. Deleting an absent
    /// document is not an error.
    async fn delete_one(&self, filter: Document) -> Result<(), StoreError>;

    /// Replaces the document matching `filter` with `replacement`,
    /// inserting it if absent.
    async fn replace_upsert(&self, filter: Document, replacement: Document) -> Result<(), StoreError>;

    /// Applies an atomic update to the document matching `filter` and
    /// returns the post-update image, or `None` if no document matched.
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Creates the given indexes on this collection.
    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> Result<(), StoreError>;
}
