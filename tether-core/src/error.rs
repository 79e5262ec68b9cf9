//! Error types and result types for the object-document mapper.
//!
//! Two layers of failure exist: [`StoreError`] is what a storage backend
//! reports for a single round trip, and [`TetherError`] is what the mapper
//! surfaces to callers. Only the transient "not connected" class of store
//! faults is ever retried; everything else propagates immediately.

use thiserror::Error;

use crate::kind::ValueKind;

/// A fault reported by a storage backend for a single store round trip.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The connection to the store could not be established. Fatal; never
    /// retried by the mapper.
    #[error("could not establish store connection: {0}")]
    ConnectFailed(String),
    /// The connection was lost or is otherwise unusable. This is the only
    /// transient class: the binding retry loop invalidates the cached
    /// connection and tries again with backoff.
    #[error("not connected: {0}")]
    NotConnected(String),
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the retry loop may attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::NotConnected(_))
    }
}

/// Represents all possible errors surfaced by the mapper.
#[derive(Error, Debug)]
pub enum TetherError {
    /// The store could not be reached when the connection was first
    /// established.
    #[error("connection error: {0}")]
    Connection(String),
    /// A store operation failed after exhausting transient-fault retries,
    /// or failed with a non-transient fault.
    #[error("store operation '{action}' failed: {source}")]
    Persistence {
        /// Name of the operation that failed (e.g. "save", "update").
        action: &'static str,
        #[source]
        source: StoreError,
    },
    /// An update-operator precondition rejected the current value of the
    /// targeted field.
    #[error("{operator} on field '{field}': current value is {found}, which this operator does not accept")]
    TypeMismatch {
        operator: &'static str,
        field: String,
        /// Human description of the observed value ("string scalar",
        /// "list", ...).
        found: String,
    },
    /// A set would change an already-defined, non-object field from one
    /// structural kind to a different one.
    #[error("set on field '{field}': cannot assign a {assigned} value over an existing {at_rest} value")]
    KindChange {
        field: String,
        at_rest: ValueKind,
        assigned: ValueKind,
    },
    /// A set would replace a defined value with an explicitly undefined one.
    #[error("set on field '{field}': cannot assign an undefined value over a defined one, use update_clear instead")]
    UndefinedAssignment { field: String },
    /// A dotted field path could not be resolved against the handle's
    /// declared fields.
    #[error("invalid field path '{path}': {reason}")]
    Path { path: String, reason: String },
    /// A fetched document could not be decoded into the target model. The
    /// handle being synchronized is left unmodified.
    #[error("could not inflate document '{id}': {reason}")]
    Inflation { id: String, reason: String },
    /// A malformed index specification was supplied by the model.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An update spec used a plain field name where an operator key was
    /// required.
    #[error("update protocol violation: {0}")]
    Protocol(String),
    /// Serialization error when packing or unpacking a model.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for mapper operations.
pub type TetherResult<T> = Result<T, TetherError>;

impl From<bson::error::Error> for TetherError {
    fn from(err: bson::error::Error) -> Self {
        TetherError::Serialization(err.to_string())
    }
}
