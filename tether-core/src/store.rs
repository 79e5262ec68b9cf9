//! The store handle: connection ownership, fork safety, and binding
//! resolution.
//!
//! A [`Store`] owns one logical connection scope to the backing database.
//! The connection itself, the database name, and a cache of named
//! collection references all belong to exactly one process identifier: the
//! one recorded when the connection was established. Every collection
//! lookup first compares the current process identifier against the
//! recorded one and, on mismatch, discards and lazily rebuilds the whole
//! cached state. This exists specifically so a child process never reuses
//! its parent's live socket-backed connection after forking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use mea::mutex::Mutex;

use crate::backend::{Backend, Connection};
use crate::binding::Binding;
use crate::error::StoreError;
use crate::model::Model;

pub(crate) type ConnColl<B> = <<B as Backend>::Conn as Connection>::Coll;

struct ConnState<B: Backend> {
    /// Process identifier recorded when the connection was established.
    pid: u32,
    conn: Option<B::Conn>,
    collections: HashMap<String, ConnColl<B>>,
}

struct StoreInner<B: Backend> {
    backend: B,
    database: String,
    overrides: HashMap<&'static str, String>,
    /// Per-suffix cache of resolved collection names, so repeated binding
    /// requests do not re-resolve.
    resolved: DashMap<&'static str, String>,
    pid_source: fn() -> u32,
    state: Mutex<ConnState<B>>,
}

/// A handle to one logical database connection scope.
///
/// Cheap to clone; all clones share the same lazily-established connection
/// and collection-reference cache. Bindings requested from any clone funnel
/// through that shared cache.
pub struct Store<B: Backend> {
    inner: Arc<StoreInner<B>>,
}

impl<B: Backend> Clone for Store<B> {
    fn clone(&self) -> Self {
        Store {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> fmt::Debug for Store<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("database", &self.inner.database)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> Store<B> {
    /// Creates a store with default configuration.
    pub fn new(backend: B, database: impl Into<String>) -> Self {
        Self::builder(backend, database).build()
    }

    /// Creates a builder for a store with custom configuration.
    pub fn builder(backend: B, database: impl Into<String>) -> StoreBuilder<B> {
        StoreBuilder {
            backend,
            database: database.into(),
            overrides: HashMap::new(),
            pid_source: std::process::id,
        }
    }

    /// Returns the name of the backing database.
    pub fn database(&self) -> &str {
        &self.inner.database
    }

    /// Returns a binding between the model type `M` and its store
    /// collection.
    ///
    /// The collection name is resolved exactly once per model: a configured
    /// override wins, otherwise `M::collection_name()` is used. Bindings
    /// are not cached beyond the caller's own reference; every instance for
    /// the same model shares this store's connection cache.
    pub fn collection<M: Model>(&self) -> Binding<M, B> {
        let name = self.resolve_collection_name(M::collection_name());
        Binding::new(self.clone(), name)
    }

    fn resolve_collection_name(&self, suffix: &'static str) -> String {
        if let Some(name) = self.inner.resolved.get(suffix) {
            return name.value().clone();
        }
        let name = self
            .inner
            .overrides
            .get(suffix)
            .cloned()
            .unwrap_or_else(|| suffix.to_string());
        self.inner.resolved.insert(suffix, name.clone());
        name
    }

    /// Returns the cached store-collection reference for `name`,
    /// establishing the connection and reference lazily.
    ///
    /// On every call the current process identifier is compared to the one
    /// recorded at connection time; a mismatch discards the connection and
    /// the entire collection-reference cache before rebuilding.
    pub(crate) async fn collection_ref(&self, name: &str) -> Result<ConnColl<B>, StoreError> {
        let mut state = self.inner.state.lock().await;

        let pid = (self.inner.pid_source)();
        if state.pid != pid {
            tracing::debug!(
                recorded = state.pid,
                current = pid,
                "process identity changed, discarding cached connection state"
            );
            state.conn = None;
            state.collections.clear();
            state.pid = pid;
        }

        let conn = match state.conn.take() {
            Some(conn) => conn,
            None => self.inner.backend.connect().await?,
        };

        let coll = match state.collections.get(name) {
            Some(coll) => coll.clone(),
            None => {
                let coll = conn.collection(&self.inner.database, name);
                state.collections.insert(name.to_string(), coll.clone());
                coll
            }
        };

        state.conn = Some(conn);
        Ok(coll)
    }

    /// Discards the cached connection and collection references; the next
    /// lookup rebuilds them lazily. Called by the retry loop between
    /// transient-fault attempts.
    pub(crate) async fn invalidate(&self) {
        let mut state = self.inner.state.lock().await;
        state.conn = None;
        state.collections.clear();
    }
}

/// Builder for [`Store`] instances.
pub struct StoreBuilder<B: Backend> {
    backend: B,
    database: String,
    overrides: HashMap<&'static str, String>,
    pid_source: fn() -> u32,
}

impl<B: Backend> StoreBuilder<B> {
    /// Maps a model's default collection name to a different store
    /// collection.
    pub fn collection_override(mut self, suffix: &'static str, name: impl Into<String>) -> Self {
        self.overrides.insert(suffix, name.into());
        self
    }

    /// Overrides how the owning process is identified. Defaults to
    /// `std::process::id`; intended for tests exercising fork safety.
    pub fn pid_source(mut self, pid_source: fn() -> u32) -> Self {
        self.pid_source = pid_source;
        self
    }

    /// Builds the store. The connection is not established until first use.
    pub fn build(self) -> Store<B> {
        let pid = (self.pid_source)();
        Store {
            inner: Arc::new(StoreInner {
                backend: self.backend,
                database: self.database,
                overrides: self.overrides,
                resolved: DashMap::new(),
                pid_source: self.pid_source,
                state: Mutex::new(ConnState {
                    pid,
                    conn: None,
                    collections: HashMap::new(),
                }),
            }),
        }
    }
}
