use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, IndexModel,
    options::{ClientOptions, IndexOptions, ReturnDocument},
};

use tether_core::backend::{Backend, CollectionRef, Connection, DocumentStream, FindOptions, IndexSpec};
use tether_core::error::StoreError;

/// Classifies a driver error: server-selection and transport failures are
/// the transient class the mapper retries, everything else is a plain
/// backend fault.
fn map_store_err(err: mongodb::error::Error) -> StoreError {
    use mongodb::error::ErrorKind;
    match &*err.kind {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. } => StoreError::NotConnected(err.to_string()),
        _ => StoreError::Backend(err.to_string()),
    }
}

/// MongoDB backend. Holds only the DSN; a client is built per connection
/// request so the store handle can discard and rebuild it freely.
#[derive(Debug, Clone)]
pub struct MongoBackend {
    dsn: String,
}

impl MongoBackend {
    pub fn new(dsn: impl Into<String>) -> Self {
        MongoBackend { dsn: dsn.into() }
    }
}

#[async_trait]
impl Backend for MongoBackend {
    type Conn = MongoConnection;

    async fn connect(&self) -> Result<MongoConnection, StoreError> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| StoreError::ConnectFailed(e.to_string()))?;
        let client =
            Client::with_options(options).map_err(|e| StoreError::ConnectFailed(e.to_string()))?;
        Ok(MongoConnection { client })
    }
}

/// A live MongoDB client.
#[derive(Debug)]
pub struct MongoConnection {
    client: Client,
}

impl Connection for MongoConnection {
    type Coll = MongoCollection;

    fn collection(&self, database: &str, name: &str) -> MongoCollection {
        MongoCollection {
            inner: self.client.database(database).collection::<Document>(name),
        }
    }
}

/// A reference to one MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoCollection {
    inner: mongodb::Collection<Document>,
}

#[async_trait]
impl CollectionRef for MongoCollection {
    async fn find_one(&self, filter: Document) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(filter).await.map_err(map_store_err)
    }

    async fn find(&self, filter: Document, options: FindOptions) -> Result<DocumentStream, StoreError> {
        let mut driver_options = mongodb::options::FindOptions::default();
        driver_options.sort = options.sort;
        driver_options.limit = options.limit;
        driver_options.skip = options.skip;
        driver_options.projection = options.projection;

        let cursor = self
            .inner
            .find(filter)
            .with_options(driver_options)
            .await
            .map_err(map_store_err)?;
        Ok(cursor.map_err(map_store_err).boxed())
    }

    async fn count(&self, filter: Document) -> Result<u64, StoreError> {
        self.inner.count_documents(filter).await.map_err(map_store_err)
    }

    async fn delete_one(&self, filter: Document) -> Result<(), StoreError> {
        self.inner.delete_one(filter).await.map_err(map_store_err)?;
        Ok(())
    }

    async fn replace_upsert(&self, filter: Document, replacement: Document) -> Result<(), StoreError> {
        self.inner
            .replace_one(filter, replacement)
            .upsert(true)
            .await
            .map_err(map_store_err)?;
        Ok(())
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<Option<Document>, StoreError> {
        self.inner
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(map_store_err)
    }

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> Result<(), StoreError> {
        let mut models = Vec::with_capacity(indexes.len());
        for spec in indexes {
            let mut keys = Document::new();
            for (field, direction) in spec.keys {
                keys.insert(field, Bson::Int32(direction));
            }
            let mut model = IndexModel::builder().keys(keys).build();
            if let Some(options) = spec.options {
                model.options = Some(index_options(options)?);
            }
            models.push(model);
        }
        self.inner.create_indexes(models).await.map_err(map_store_err)?;
        Ok(())
    }
}

fn index_options(options: Document) -> Result<IndexOptions, StoreError> {
    let mut parsed = IndexOptions::default();
    for (key, value) in options {
        match (key.as_str(), value) {
            ("unique", Bson::Boolean(unique)) => parsed.unique = Some(unique),
            ("sparse", Bson::Boolean(sparse)) => parsed.sparse = Some(sparse),
            ("name", Bson::String(name)) => parsed.name = Some(name),
            (key, value) => {
                return Err(StoreError::Backend(format!(
                    "unsupported index option '{key}': {value}"
                )));
            }
        }
    }
    Ok(parsed)
}
