//! Core traits for model representation and the pack/unpack codec.
//!
//! A [`Model`] is the schema collaborator of the mapper: a plain serde type
//! that knows its identity, its default collection name, its declared field
//! names, and optionally an ordered list of index specifications. The codec
//! surface ([`ModelExt`]) converts a model to and from a flat BSON field
//! map; it is blanket-implemented and not meant to be customized.

use bson::{Bson, Document, Uuid, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};

use crate::error::{TetherError, TetherResult};

/// Core trait that all mapped document types must implement.
///
/// # Example
///
/// ```ignore
/// use tether::model::Model;
/// use bson::Uuid;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Person {
///     pub id: Uuid,
///     pub name: String,
///     pub likes: i64,
/// }
///
/// impl Model for Person {
///     fn id(&self) -> &Uuid {
///         &self.id
///     }
///
///     fn collection_name() -> &'static str {
///         "people"
///     }
///
///     fn field_names() -> &'static [&'static str] {
///         &["id", "name", "likes"]
///     }
/// }
/// ```
pub trait Model: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// Returns a reference to this model's unique identifier. Identities
    /// are assigned client-side when the model value is constructed.
    fn id(&self) -> &Uuid;

    /// The default name of the collection this model maps to. A store may
    /// override it per model; see `Store::builder`.
    fn collection_name() -> &'static str;

    /// The field names this model declares. The synchronization merge rule
    /// and dotted-path preconditions only consider declared fields.
    fn field_names() -> &'static [&'static str];

    /// Ordered index specifications for this model's collection.
    ///
    /// Each spec is an optional leading options document followed by
    /// ordered field/direction pairs. Ordering matters for compound
    /// indexes.
    ///
    /// ```ignore
    /// fn indexes() -> Vec<Vec<Bson>> {
    ///     vec![
    ///         vec![bson!({ "unique": true }), bson!("name"), bson!(1)],
    ///         vec![bson!("tags"), bson!(1), bson!("likes"), bson!(-1)],
    ///     ]
    /// }
    /// ```
    fn indexes() -> Vec<Vec<Bson>> {
        Vec::new()
    }
}

/// Extension trait providing the pack/unpack codec for models.
///
/// Automatically implemented for all types that implement [`Model`].
pub trait ModelExt: Model {
    /// Converts this model to a flat BSON field map.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the model does not
    /// serialize to a document.
    fn pack(&self) -> TetherResult<Document>;

    /// Reconstructs a model from a flat BSON field map.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is inconsistent with the model's
    /// expected shape.
    fn unpack(fields: Document) -> TetherResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn pack(&self) -> TetherResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(fields) => Ok(fields),
            other => Err(TetherError::Serialization(format!(
                "model serialized to a non-document value ({other})"
            ))),
        }
    }

    fn unpack(fields: Document) -> TetherResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(fields))?)
    }
}
