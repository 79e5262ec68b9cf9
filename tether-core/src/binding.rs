//! The collection binding: every store round trip funnels through here.
//!
//! A [`Binding`] pairs a model type with a named store collection and owns
//! the only code path that talks to the backend. It wraps each round trip
//! in a transient-fault retry loop, decodes raw result documents into
//! document handles, and implements the merge rule used by handle
//! synchronization.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use bson::{Bson, Document, Uuid, doc};

use crate::backend::{Backend, CollectionRef, IndexSpec};
use crate::cursor::Cursor;
use crate::error::{StoreError, TetherError, TetherResult};
use crate::handle::Handle;
use crate::model::{Model, ModelExt};
use crate::store::{ConnColl, Store};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);
const RETRY_MAX_DELAY: Duration = Duration::from_millis(800);
const RETRY_ATTEMPTS: u32 = 5;

/// A binding between a model type and a store collection.
///
/// Obtained from [`Store::collection`]; cheap to clone. All operations that
/// return documents return them wrapped in [`Handle`]s tied to this
/// binding.
pub struct Binding<M: Model, B: Backend> {
    store: Store<B>,
    name: String,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model, B: Backend> Clone for Binding<M, B> {
    fn clone(&self) -> Self {
        Binding {
            store: self.store.clone(),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Model, B: Backend> fmt::Debug for Binding<M, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("collection", &self.name)
            .finish_non_exhaustive()
    }
}

fn id_filter(id: &Uuid) -> Document {
    doc! { "_id": *id }
}

impl<M: Model, B: Backend> Binding<M, B> {
    pub(crate) fn new(store: Store<B>, name: String) -> Self {
        Binding {
            store,
            name,
            _marker: PhantomData,
        }
    }

    /// The resolved name of the bound store collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store this binding was obtained from.
    pub fn store(&self) -> &Store<B> {
        &self.store
    }

    /// Runs one store operation with transient-fault retries.
    ///
    /// Connection establishment failures are fatal and surface immediately.
    /// A lost connection is retried up to a fixed number of attempts with
    /// exponential backoff, invalidating the store's cached connection
    /// before each retry so the next attempt reconnects from scratch. Any
    /// other fault, or an exhausted retry budget, surfaces as a persistence
    /// error naming the operation.
    pub(crate) async fn try_store_op<T, F, Fut>(&self, action: &'static str, mut op: F) -> TetherResult<T>
    where
        F: FnMut(ConnColl<B>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 1;
        loop {
            let outcome = match self.store.collection_ref(&self.name).await {
                Ok(coll) => op(coll).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(StoreError::ConnectFailed(message)) => {
                    return Err(TetherError::Connection(message));
                }
                Err(err) if err.is_transient() && attempt < RETRY_ATTEMPTS => {
                    tracing::warn!(
                        action,
                        attempt,
                        error = %err,
                        "transient store fault, invalidating connection and retrying"
                    );
                    self.store.invalidate().await;
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(RETRY_MAX_DELAY);
                    attempt += 1;
                }
                Err(source) => return Err(TetherError::Persistence { action, source }),
            }
        }
    }

    /// Persists `model` and returns an active handle to it.
    ///
    /// Persisting is a full-document replace keyed by the model's identity,
    /// inserting if absent, so creating the same value twice simply
    /// overwrites.
    pub async fn create(&self, model: M) -> TetherResult<Handle<M, B>> {
        self.save_model("create", &model).await?;
        Ok(Handle::new(model, self.clone()))
    }

    pub(crate) async fn save_model(&self, action: &'static str, model: &M) -> TetherResult<()> {
        let mut packed = model.pack()?;
        packed.insert("_id", *model.id());
        let filter = id_filter(model.id());
        self.try_store_op(action, |coll| {
            let filter = filter.clone();
            let packed = packed.clone();
            async move { coll.replace_upsert(filter, packed).await }
        })
        .await
    }

    /// Finds the document with the given identity.
    pub async fn find_by_id(&self, id: &Uuid) -> TetherResult<Option<Handle<M, B>>> {
        self.find_one(id_filter(id)).await
    }

    /// Finds at most one document matching `filter`.
    pub async fn find_one(&self, filter: Document) -> TetherResult<Option<Handle<M, B>>> {
        let raw = self
            .try_store_op("find_one", |coll| {
                let filter = filter.clone();
                async move { coll.find_one(filter).await }
            })
            .await?;
        match raw {
            Some(raw) => Ok(Some(self.inflate(raw)?)),
            None => Ok(None),
        }
    }

    /// Returns a lazy cursor over the documents matching `filter`.
    ///
    /// No query is issued until the cursor is first advanced; shaping
    /// methods on the cursor (sort, limit, skip, projection) may be chained
    /// before that point.
    pub fn find(&self, filter: Document) -> Cursor<M, B> {
        Cursor::new(self.clone(), filter)
    }

    /// Counts documents matching `filter`; `None` counts the whole
    /// collection.
    pub async fn count(&self, filter: Option<Document>) -> TetherResult<u64> {
        let filter = filter.unwrap_or_default();
        self.try_store_op("count", |coll| {
            let filter = filter.clone();
            async move { coll.count(filter).await }
        })
        .await
    }

    /// Creates the indexes the model declares. Safe to call repeatedly;
    /// backends treat existing identical indexes as a no-op.
    pub async fn ensure_indexes(&self) -> TetherResult<()> {
        let specs = parse_index_specs(M::indexes())?;
        if specs.is_empty() {
            return Ok(());
        }
        self.try_store_op("ensure_indexes", |coll| {
            let specs = specs.clone();
            async move { coll.create_indexes(specs).await }
        })
        .await
    }

    pub(crate) async fn delete_by_id(&self, id: &Uuid) -> TetherResult<()> {
        let filter = id_filter(id);
        self.try_store_op("remove", |coll| {
            let filter = filter.clone();
            async move { coll.delete_one(filter).await }
        })
        .await
    }

    pub(crate) async fn fetch_raw_by_id(&self, id: &Uuid) -> TetherResult<Option<Document>> {
        let filter = id_filter(id);
        self.try_store_op("sync", |coll| {
            let filter = filter.clone();
            async move { coll.find_one(filter).await }
        })
        .await
    }

    /// Applies an atomic update to the document with the given identity and
    /// returns the raw post-update image, or `None` if the document no
    /// longer exists.
    pub(crate) async fn update_by_id(&self, id: &Uuid, spec: Document) -> TetherResult<Option<Document>> {
        validate_update_spec(&spec)?;
        let filter = id_filter(id);
        self.try_store_op("update", |coll| {
            let filter = filter.clone();
            let spec = spec.clone();
            async move { coll.find_one_and_update(filter, spec).await }
        })
        .await
    }

    /// Decodes a raw store document into an active handle.
    pub(crate) fn inflate(&self, mut raw: Document) -> TetherResult<Handle<M, B>> {
        let id = raw
            .remove("_id")
            .map(|value| value.to_string())
            .unwrap_or_else(|| "<missing _id>".to_string());
        let model = M::unpack(raw).map_err(|err| TetherError::Inflation {
            id,
            reason: err.to_string(),
        })?;
        Ok(Handle::new(model, self.clone()))
    }

    /// Merges a raw store document onto the given model state.
    ///
    /// Only fields the model declares are considered, and only those the
    /// raw document defines (present and non-null). Everything else keeps
    /// its current in-memory value. Returns the merged model; the caller's
    /// state is untouched, so a decode failure leaves the handle exactly as
    /// it was.
    pub(crate) fn merge(&self, model: &M, mut raw: Document) -> TetherResult<M> {
        let id = raw
            .remove("_id")
            .map(|value| value.to_string())
            .unwrap_or_else(|| model.id().to_string());
        let mut packed = model.pack()?;
        for field in M::field_names() {
            match raw.get(*field) {
                None | Some(Bson::Null) => {}
                Some(value) => {
                    packed.insert(*field, value.clone());
                }
            }
        }
        M::unpack(packed).map_err(|err| TetherError::Inflation {
            id,
            reason: err.to_string(),
        })
    }
}

/// Rejects update specifications whose top-level keys are plain field names
/// rather than store operator keys.
pub(crate) fn validate_update_spec(spec: &Document) -> TetherResult<()> {
    if spec.is_empty() {
        return Err(TetherError::Protocol("update specification is empty".to_string()));
    }
    for key in spec.keys() {
        if !key.starts_with('$') {
            return Err(TetherError::Protocol(format!(
                "update key '{key}' is a plain field name; top-level keys must be operator keys like \"$set\""
            )));
        }
    }
    Ok(())
}

/// Parses a model's index declarations: each is an optional leading options
/// document followed by ordered field/direction pairs.
pub(crate) fn parse_index_specs(specs: Vec<Vec<Bson>>) -> TetherResult<Vec<IndexSpec>> {
    let mut parsed = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut items = spec.into_iter().peekable();
        let mut options = None;
        if matches!(items.peek(), Some(Bson::Document(_))) {
            if let Some(Bson::Document(opts)) = items.next() {
                options = Some(opts);
            }
        }
        let mut keys = Vec::new();
        while let Some(field) = items.next() {
            let Bson::String(field) = field else {
                return Err(TetherError::Configuration(format!(
                    "index field name must be a string, got {field}"
                )));
            };
            let direction = match items.next() {
                Some(Bson::Int32(d)) => d,
                Some(Bson::Int64(d)) => d as i32,
                Some(other) => {
                    return Err(TetherError::Configuration(format!(
                        "index direction for '{field}' must be an integer, got {other}"
                    )));
                }
                None => {
                    return Err(TetherError::Configuration(format!(
                        "index field '{field}' is missing a direction"
                    )));
                }
            };
            keys.push((field, direction));
        }
        if keys.is_empty() {
            return Err(TetherError::Configuration(
                "index specification declares no fields".to_string(),
            ));
        }
        parsed.push(IndexSpec { keys, options });
    }
    Ok(parsed)
}
