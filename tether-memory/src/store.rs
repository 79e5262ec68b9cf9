//! Thread-safe in-memory storage backend.
//!
//! All collections live in one map behind an async-aware read-write lock,
//! keyed by `database.collection`. Documents within a collection are kept
//! in an ordered map keyed by the string form of their identity entry, so
//! unsorted scans are deterministic.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use bson::Document;
use futures::StreamExt;
use mea::rwlock::RwLock;

use tether_core::backend::{Backend, CollectionRef, Connection, DocumentStream, FindOptions, IndexSpec};
use tether_core::error::StoreError;

use crate::apply::apply_update;
use crate::evaluator::{matches_filter, project, sort_documents};

type CollectionMap = BTreeMap<String, Document>;
type StoreMap = HashMap<String, CollectionMap>;

#[derive(Debug)]
struct Shared {
    /// `database.collection` -> (identity key -> document).
    data: RwLock<StoreMap>,
    indexes: RwLock<HashMap<String, Vec<IndexSpec>>>,
    /// Number of upcoming operations that fail with a lost connection.
    fail_next: AtomicU32,
    refuse_connections: AtomicBool,
    connects: AtomicU32,
    refs_created: AtomicU64,
}

/// In-memory storage backend with fault-injection hooks.
///
/// Cloneable; all clones share the same underlying data. Connections and
/// collection references are lightweight views onto that shared state, so
/// "reconnecting" is instant but still observable through
/// [`MemoryBackend::connect_count`] and per-reference instance numbers.
#[derive(Clone, Debug)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a new empty backend.
    pub fn new() -> Self {
        MemoryBackend {
            shared: Arc::new(Shared {
                data: RwLock::new(StoreMap::new()),
                indexes: RwLock::new(HashMap::new()),
                fail_next: AtomicU32::new(0),
                refuse_connections: AtomicBool::new(false),
                connects: AtomicU32::new(0),
                refs_created: AtomicU64::new(0),
            }),
        }
    }

    /// Makes the next `n` collection operations fail as if the connection
    /// had been lost.
    pub fn fail_next_ops(&self, n: u32) {
        self.shared.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes connection establishment itself fail until turned off again.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// How many connections have been established so far.
    pub fn connect_count(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// How many collection references have been constructed so far. Each
    /// reference carries its own creation number; see
    /// [`MemoryCollection::instance`].
    pub fn refs_created(&self) -> u64 {
        self.shared.refs_created.load(Ordering::SeqCst)
    }

    /// Seeds a raw document, bypassing the mapper. The document must carry
    /// an `_id` entry.
    pub async fn insert_raw(&self, database: &str, collection: &str, doc: Document) {
        let key = doc
            .get("_id")
            .map(|value| value.to_string())
            .unwrap_or_default();
        let mut data = self.shared.data.write().await;
        data.entry(scope(database, collection)).or_default().insert(key, doc);
    }

    /// Snapshot of every document in a collection, in identity-key order.
    pub async fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        let data = self.shared.data.read().await;
        data.get(&scope(database, collection))
            .map(|coll| coll.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The index specifications recorded for a collection.
    pub async fn index_specs(&self, database: &str, collection: &str) -> Vec<IndexSpec> {
        let indexes = self.shared.indexes.read().await;
        indexes.get(&scope(database, collection)).cloned().unwrap_or_default()
    }
}

fn scope(database: &str, collection: &str) -> String {
    format!("{database}.{collection}")
}

#[async_trait]
impl Backend for MemoryBackend {
    type Conn = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, StoreError> {
        if self.shared.refuse_connections.load(Ordering::SeqCst) {
            return Err(StoreError::ConnectFailed("connections refused".to_string()));
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// A live "connection" to the shared in-memory state.
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl Connection for MemoryConnection {
    type Coll = MemoryCollection;

    fn collection(&self, database: &str, name: &str) -> MemoryCollection {
        let instance = self.shared.refs_created.fetch_add(1, Ordering::SeqCst) + 1;
        MemoryCollection {
            scope: scope(database, name),
            instance,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A collection reference over the shared in-memory state.
#[derive(Clone, Debug)]
pub struct MemoryCollection {
    scope: String,
    /// Monotonic creation number, used to observe cache rebuilds.
    instance: u64,
    shared: Arc<Shared>,
}

impl MemoryCollection {
    /// The creation number of this reference. References handed out after
    /// a cache rebuild carry higher numbers.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    fn gate(&self) -> Result<(), StoreError> {
        let remaining = self.shared.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.shared.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::NotConnected("injected connection loss".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CollectionRef for MemoryCollection {
    async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError> {
        self.gate()?;
        let data = self.shared.data.read().await;
        let Some(coll) = data.get(&self.scope) else {
            return Ok(None);
        };
        for doc in coll.values() {
            if matches_filter(doc, &filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn find(&self, filter: Document, options: FindOptions) -> Result<DocumentStream, StoreError> {
        self.gate()?;
        let data = self.shared.data.read().await;
        let mut matched = Vec::new();
        if let Some(coll) = data.get(&self.scope) {
            for doc in coll.values() {
                if matches_filter(doc, &filter)? {
                    matched.push(doc.clone());
                }
            }
        }
        if let Some(sort) = &options.sort {
            sort_documents(&mut matched, sort);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let mut results: Vec<Document> = matched.into_iter().skip(skip).collect();
        if let Some(limit) = options.limit {
            results.truncate(limit.max(0) as usize);
        }
        if let Some(projection) = &options.projection {
            results = results.iter().map(|doc| project(doc, projection)).collect();
        }
        Ok(futures::stream::iter(results.into_iter().map(Ok)).boxed())
    }

    async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        self.gate()?;
        let data = self.shared.data.read().await;
        let Some(coll) = data.get(&self.scope) else {
            return Ok(0);
        };
        let mut count = 0;
        for doc in coll.values() {
            if matches_filter(doc, &filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_one(&self, filter: Document) -> Result<(), StoreError> {
        self.gate()?;
        let mut data = self.shared.data.write().await;
        let Some(coll) = data.get_mut(&self.scope) else {
            return Ok(());
        };
        let mut matched = None;
        for (key, doc) in coll.iter() {
            if matches_filter(doc, &filter)? {
                matched = Some(key.clone());
                break;
            }
        }
        if let Some(key) = matched {
            coll.remove(&key);
        }
        Ok(())
    }

    async fn replace_upsert(&self, filter: Document, replacement: Document) -> Result<(), StoreError> {
        self.gate()?;
        let mut data = self.shared.data.write().await;
        let coll = data.entry(self.scope.clone()).or_default();
        let mut matched = None;
        for (key, doc) in coll.iter() {
            if matches_filter(doc, &filter)? {
                matched = Some(key.clone());
                break;
            }
        }
        let key = match matched {
            Some(key) => key,
            None => replacement
                .get("_id")
                .or_else(|| filter.get("_id"))
                .map(|value| value.to_string())
                .ok_or_else(|| {
                    StoreError::Backend("upsert requires an _id in the replacement or filter".to_string())
                })?,
        };
        coll.insert(key, replacement);
        Ok(())
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.gate()?;
        let mut data = self.shared.data.write().await;
        let Some(coll) = data.get_mut(&self.scope) else {
            return Ok(None);
        };
        let mut matched = None;
        for (key, doc) in coll.iter() {
            if matches_filter(doc, &filter)? {
                matched = Some(key.clone());
                break;
            }
        }
        let Some(key) = matched else {
            return Ok(None);
        };
        let Some(doc) = coll.get_mut(&key) else {
            return Ok(None);
        };
        let mut updated = doc.clone();
        apply_update(&mut updated, &update)?;
        *doc = updated.clone();
        Ok(Some(updated))
    }

    async fn create_indexes(&self, specs: Vec<IndexSpec>) -> Result<(), StoreError> {
        self.gate()?;
        let mut indexes = self.shared.indexes.write().await;
        let recorded = indexes.entry(self.scope.clone()).or_default();
        for spec in specs {
            if !recorded.iter().any(|existing| existing.keys == spec.keys) {
                recorded.push(spec);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Uuid, doc};

    fn backend() -> (MemoryBackend, MemoryCollection) {
        let backend = MemoryBackend::new();
        let conn = MemoryConnection {
            shared: Arc::clone(&backend.shared),
        };
        let coll = conn.collection("testdb", "people");
        (backend, coll)
    }

    #[tokio::test]
    async fn replace_upsert_inserts_then_replaces() {
        let (backend, coll) = backend();
        let id = Uuid::new();

        coll.replace_upsert(doc! { "_id": id }, doc! { "_id": id, "name": "a" })
            .await
            .unwrap();
        coll.replace_upsert(doc! { "_id": id }, doc! { "_id": id, "name": "b" })
            .await
            .unwrap();

        let docs = backend.documents("testdb", "people").await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("name").unwrap(), "b");
    }

    #[tokio::test]
    async fn find_applies_sort_skip_limit_and_projection() {
        let (_backend, coll) = backend();
        for (i, name) in ["c", "a", "b", "d"].iter().enumerate() {
            let id = Uuid::new();
            coll.replace_upsert(
                doc! { "_id": id },
                doc! { "_id": id, "name": *name, "rank": i as i64 },
            )
            .await
            .unwrap();
        }

        let options = FindOptions {
            sort: Some(doc! { "name": 1 }),
            skip: Some(1),
            limit: Some(2),
            projection: Some(doc! { "name": 1 }),
        };
        let mut stream = coll.find(doc! {}, options).await.unwrap();
        let mut names = Vec::new();
        while let Some(doc) = stream.next().await {
            let doc = doc.unwrap();
            assert!(!doc.contains_key("rank"));
            names.push(doc.get_str("name").unwrap().to_string());
        }
        assert_eq!(names, ["b", "c"]);
    }

    #[tokio::test]
    async fn find_one_and_update_returns_post_image() {
        let (backend, coll) = backend();
        let id = Uuid::new();
        coll.replace_upsert(doc! { "_id": id }, doc! { "_id": id, "likes": 1_i64 })
            .await
            .unwrap();

        let updated = coll
            .find_one_and_update(doc! { "_id": id }, doc! { "$inc": { "likes": 2_i64 } })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.get_i64("likes").unwrap(), 3);

        let stored = backend.documents("testdb", "people").await;
        assert_eq!(stored[0].get_i64("likes").unwrap(), 3);

        let missing = coll
            .find_one_and_update(doc! { "_id": Uuid::new() }, doc! { "$inc": { "likes": 1 } })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn injected_faults_surface_as_lost_connections() {
        let (backend, coll) = backend();
        backend.fail_next_ops(2);

        assert!(matches!(
            coll.count(doc! {}).await,
            Err(StoreError::NotConnected(_))
        ));
        assert!(matches!(
            coll.count(doc! {}).await,
            Err(StoreError::NotConnected(_))
        ));
        assert_eq!(coll.count(doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn collection_references_carry_creation_numbers() {
        let backend = MemoryBackend::new();
        let first = backend.connect().await.unwrap().collection("db", "a");
        let second = backend.connect().await.unwrap().collection("db", "a");
        assert!(second.instance() > first.instance());
        assert_eq!(backend.refs_created(), 2);
    }

    #[tokio::test]
    async fn refused_connections_fail_fatally() {
        let backend = MemoryBackend::new();
        backend.refuse_connections(true);
        assert!(matches!(
            backend.connect().await,
            Err(StoreError::ConnectFailed(_))
        ));

        backend.refuse_connections(false);
        assert!(backend.connect().await.is_ok());
        assert_eq!(backend.connect_count(), 1);
    }

    #[tokio::test]
    async fn create_indexes_records_specs_once() {
        let (backend, coll) = backend();
        let spec = IndexSpec {
            keys: vec![("name".to_string(), 1)],
            options: Some(doc! { "unique": true }),
        };
        coll.create_indexes(vec![spec.clone()]).await.unwrap();
        coll.create_indexes(vec![spec.clone()]).await.unwrap();

        let recorded = backend.index_specs("testdb", "people").await;
        assert_eq!(recorded, vec![spec]);
    }
}
