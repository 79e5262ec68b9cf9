//! An object-document mapping layer that mediates all mutation through
//! atomic server-side updates.
//!
//! This crate is the core of the tether project and provides:
//!
//! - **Model traits** ([`model`]) - Core traits for defining and packing models
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Store handle** ([`store`]) - Fork-safe connection ownership and binding resolution
//! - **Collection bindings** ([`binding`]) - Store operations with transient-fault retries
//! - **Document handles** ([`handle`]) - Lifecycle state plus the typed update surface
//! - **Result cursors** ([`cursor`]) - Lazy, forward-only query results
//! - **Update operators** ([`ops`], [`kind`], [`path`]) - The operator table and its preconditions
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use tether_core::model::Model;
//! use bson::Uuid;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Person {
//!     pub id: Uuid,
//!     pub name: String,
//!     pub likes: i64,
//! }
//!
//! impl Model for Person {
//!     fn id(&self) -> &Uuid {
//!         &self.id
//!     }
//!
//!     fn collection_name() -> &'static str {
//!         "people"
//!     }
//!
//!     fn field_names() -> &'static [&'static str] {
//!         &["id", "name", "likes"]
//!     }
//! }
//! ```

pub mod backend;
pub mod binding;
pub mod cursor;
pub mod error;
pub mod handle;
pub mod kind;
pub mod model;
pub mod ops;
pub mod path;
pub mod store;

pub use backend::{Backend, CollectionRef, Connection, DocumentStream, FindOptions, IndexSpec};
pub use binding::Binding;
pub use cursor::Cursor;
pub use error::{StoreError, TetherError, TetherResult};
pub use handle::{Handle, Number};
pub use kind::{KindSet, ValueKind};
pub use model::{Model, ModelExt};
pub use ops::UpdateOp;
pub use store::{Store, StoreBuilder};
