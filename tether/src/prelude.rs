//! Convenient re-exports of commonly used types from tether.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use tether::prelude::*;
//! ```
//!
//! This provides access to:
//! - Model traits and the pack/unpack codec
//! - Store handles, bindings, document handles, and cursors
//! - Backend traits for implementing new stores
//! - Error types and result types

pub use tether_core::{
    backend::{Backend, CollectionRef, Connection, FindOptions, IndexSpec},
    binding::Binding,
    cursor::Cursor,
    error::{StoreError, TetherError, TetherResult},
    handle::{Handle, Number},
    kind::ValueKind,
    model::{Model, ModelExt},
    store::{Store, StoreBuilder},
};
