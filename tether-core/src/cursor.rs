//! Lazy result cursors.
//!
//! A [`Cursor`] is a forward-only walk over a query's results. Nothing is
//! sent to the store until the first advance; until then the query may be
//! shaped with sort, limit, skip, and projection. Each advance decodes one
//! raw result document into a handle, so one bad document surfaces exactly
//! where it is encountered without poisoning the rest of the walk.

use bson::Document;
use futures::StreamExt;

use crate::backend::{Backend, CollectionRef, DocumentStream, FindOptions};
use crate::binding::Binding;
use crate::error::{TetherError, TetherResult};
use crate::handle::Handle;
use crate::model::Model;

/// A lazy, forward-only cursor over query results.
pub struct Cursor<M: Model, B: Backend> {
    binding: Binding<M, B>,
    filter: Document,
    options: FindOptions,
    stream: Option<DocumentStream>,
}

impl<M: Model, B: Backend> Cursor<M, B> {
    pub(crate) fn new(binding: Binding<M, B>, filter: Document) -> Self {
        Cursor {
            binding,
            filter,
            options: FindOptions::default(),
            stream: None,
        }
    }

    /// Sets the sort order, e.g. `doc! { "name": 1 }`.
    pub fn sort(mut self, sort: Document) -> Self {
        self.options.sort = Some(sort);
        self
    }

    /// Caps the number of results.
    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Skips the first `skip` results.
    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Restricts which fields the store returns. Projected-away declared
    /// fields must be optional on the model or decoding will fail.
    pub fn projection(mut self, projection: Document) -> Self {
        self.options.projection = Some(projection);
        self
    }

    /// Advances the cursor, issuing the query on the first call.
    ///
    /// Returns `Ok(None)` once the results are exhausted. A result document
    /// that cannot be decoded surfaces as an inflation error for that
    /// advance only.
    pub async fn next(&mut self) -> TetherResult<Option<Handle<M, B>>> {
        if self.stream.is_none() {
            let stream = self
                .binding
                .try_store_op("find", |coll| {
                    let filter = self.filter.clone();
                    let options = self.options.clone();
                    async move { coll.find(filter, options).await }
                })
                .await?;
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            None => Ok(None),
            Some(Err(source)) => Err(TetherError::Persistence {
                action: "find",
                source,
            }),
            Some(Ok(raw)) => Ok(Some(self.binding.inflate(raw)?)),
        }
    }

    /// Drains the cursor into a vector.
    pub async fn all(mut self) -> TetherResult<Vec<Handle<M, B>>> {
        let mut handles = Vec::new();
        while let Some(handle) = self.next().await? {
            handles.push(handle);
        }
        Ok(handles)
    }
}
