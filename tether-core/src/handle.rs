//! The document handle: lifecycle state plus the typed update surface.
//!
//! A [`Handle`] pairs an in-memory model value with the binding it came
//! from and a removed flag. All mutation goes through atomic server-side
//! updates: each typed `update_*` method checks its precondition against
//! the current in-memory state, sends a single-operator update keyed by the
//! document's identity, and merges the returned post-update image back onto
//! the handle. There is no dirty tracking and no whole-document writeback
//! after creation.

use std::fmt;
use std::ops::Deref;

use bson::{Bson, Document, Uuid, doc, ser::serialize_to_bson};
use serde::Serialize;

use crate::backend::Backend;
use crate::binding::Binding;
use crate::error::{TetherError, TetherResult};
use crate::kind::{ValueKind, describe, is_numeric};
use crate::model::{Model, ModelExt};
use crate::ops::UpdateOp;
use crate::path::resolve_path;

/// A numeric increment amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Int(i64::from(value))
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

impl From<Number> for Bson {
    fn from(value: Number) -> Self {
        match value {
            Number::Int(n) => Bson::Int64(n),
            Number::Float(n) => Bson::Double(n),
        }
    }
}

/// A live handle to a persisted document.
///
/// Dereferences to the model for read access. A handle is either active or
/// removed; mutating operations on a removed handle are no-ops reporting
/// `false`, and [`Handle::reinsert`] returns it to the active state by
/// persisting the in-memory state again.
pub struct Handle<M: Model, B: Backend> {
    model: M,
    removed: bool,
    binding: Binding<M, B>,
}

impl<M: Model, B: Backend> Clone for Handle<M, B> {
    fn clone(&self) -> Self {
        Handle {
            model: self.model.clone(),
            removed: self.removed,
            binding: self.binding.clone(),
        }
    }
}

impl<M: Model + fmt::Debug, B: Backend> fmt::Debug for Handle<M, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("model", &self.model)
            .field("removed", &self.removed)
            .finish()
    }
}

impl<M: Model, B: Backend> Deref for Handle<M, B> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.model
    }
}

impl<M: Model, B: Backend> Handle<M, B> {
    pub(crate) fn new(model: M, binding: Binding<M, B>) -> Self {
        Handle {
            model,
            removed: false,
            binding,
        }
    }

    /// The in-memory model state.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Consumes the handle and returns the model state.
    pub fn into_model(self) -> M {
        self.model
    }

    /// The document's identity.
    pub fn id(&self) -> &Uuid {
        self.model.id()
    }

    /// Whether this handle has observed the document's removal.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// The binding this handle came from.
    pub fn binding(&self) -> &Binding<M, B> {
        &self.binding
    }

    /// Deletes the document from the store and marks the handle removed.
    ///
    /// Removing an already-removed handle is a no-op. Deleting a document
    /// some other actor already deleted is also a success; the outcome is
    /// the same.
    pub async fn remove(&mut self) -> TetherResult<()> {
        if self.removed {
            return Ok(());
        }
        self.binding.delete_by_id(self.model.id()).await?;
        self.removed = true;
        Ok(())
    }

    /// Persists the in-memory state again and returns the handle to the
    /// active state. Works whether or not the document still exists in the
    /// store; an existing document is overwritten.
    pub async fn reinsert(&mut self) -> TetherResult<()> {
        self.binding.save_model("reinsert", &self.model).await?;
        self.removed = false;
        Ok(())
    }

    /// Re-reads the document from the store and merges it onto the handle.
    ///
    /// Returns `true` if the document was found and merged. If it no longer
    /// exists the handle is marked removed and `false` is returned, with
    /// the in-memory state kept as a snapshot. A removed handle is not
    /// re-fetched; synchronize again after [`Handle::reinsert`].
    ///
    /// The merge considers only declared fields the fetched document
    /// defines (present and non-null); all other in-memory state is kept.
    /// A decode failure surfaces as an inflation error and leaves the
    /// handle unmodified.
    pub async fn sync(&mut self) -> TetherResult<bool> {
        if self.removed {
            return Ok(false);
        }
        match self.binding.fetch_raw_by_id(self.model.id()).await? {
            Some(raw) => {
                self.model = self.binding.merge(&self.model, raw)?;
                Ok(true)
            }
            None => {
                self.removed = true;
                Ok(false)
            }
        }
    }

    /// Applies a raw update specification to the document.
    ///
    /// Every top-level key must be a store operator key (`$`-prefixed);
    /// plain field names are rejected before anything is sent. This is the
    /// escape hatch under the typed `update_*` methods and skips their
    /// kind preconditions.
    ///
    /// Returns `true` if the document was found and updated; if it no
    /// longer exists the handle is marked removed and `false` is returned.
    pub async fn update(&mut self, spec: Document) -> TetherResult<bool> {
        if self.removed {
            return Ok(false);
        }
        match self.binding.update_by_id(self.model.id(), spec).await? {
            Some(raw) => {
                self.model = self.binding.merge(&self.model, raw)?;
                Ok(true)
            }
            None => {
                self.removed = true;
                Ok(false)
            }
        }
    }

    /// Assigns a value to the field at `field`.
    ///
    /// Assigning over an absent field always works. Assigning over a
    /// defined value requires the same structural kind, unless the current
    /// value is object-kind, which accepts anything. Assigning an undefined
    /// value (serializing to null) over a defined one is an error; use
    /// [`Handle::update_clear`] for that.
    pub async fn update_set(&mut self, field: &str, value: impl Serialize) -> TetherResult<bool> {
        if self.removed {
            return Ok(false);
        }
        let assigned = serialize_to_bson(&value)?;
        let current = self.current_value(field)?;
        set_precondition(field, current.as_ref(), &assigned)?;
        self.update(doc! { "$set": { field: assigned } }).await
    }

    /// Atomically increments the numeric scalar at `field` by `delta`.
    /// An absent field is created holding the delta.
    pub async fn update_inc(&mut self, field: &str, delta: impl Into<Number>) -> TetherResult<bool> {
        if self.removed {
            return Ok(false);
        }
        let current = self.current_value(field)?;
        if let Some(value) = &current {
            precondition(UpdateOp::Inc, field, value)?;
            if !is_numeric(value) {
                return Err(TetherError::TypeMismatch {
                    operator: UpdateOp::Inc.name(),
                    field: field.to_string(),
                    found: describe(value).to_string(),
                });
            }
        }
        let delta: Bson = delta.into().into();
        self.update(doc! { "$inc": { field: delta } }).await
    }

    /// Appends items to the list at `field`. An absent field is created as
    /// a list of the items.
    pub async fn update_push<I>(&mut self, field: &str, items: I) -> TetherResult<bool>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        self.list_op(UpdateOp::Push, field, items).await
    }

    /// Appends items to the list at `field`, skipping any already present.
    /// Appending an already-present item is a clean no-op on that item.
    pub async fn update_add<I>(&mut self, field: &str, items: I) -> TetherResult<bool>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        self.list_op(UpdateOp::Add, field, items).await
    }

    /// Removes the last item of the list at `field`. Popping an absent or
    /// empty list is a clean no-op.
    pub async fn update_pop(&mut self, field: &str) -> TetherResult<bool> {
        self.pop_op(UpdateOp::Pop, field, 1).await
    }

    /// Removes the first item of the list at `field`. Shifting an absent or
    /// empty list is a clean no-op.
    pub async fn update_shift(&mut self, field: &str) -> TetherResult<bool> {
        self.pop_op(UpdateOp::Shift, field, -1).await
    }

    /// Removes all occurrences of the given items from the list at `field`.
    pub async fn update_remove<I>(&mut self, field: &str, items: I) -> TetherResult<bool>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        self.list_op(UpdateOp::Remove, field, items).await
    }

    /// Unsets the field at `field` entirely. Clearing works on any kind,
    /// including an already-absent field.
    pub async fn update_clear(&mut self, field: &str) -> TetherResult<bool> {
        if self.removed {
            return Ok(false);
        }
        // Resolve for path validity only; any current kind may be cleared.
        self.current_value(field)?;
        self.update(doc! { "$unset": { field: "" } }).await
    }

    async fn list_op<I>(&mut self, op: UpdateOp, field: &str, items: I) -> TetherResult<bool>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        if self.removed {
            return Ok(false);
        }
        if let Some(value) = self.current_value(field)? {
            precondition(op, field, &value)?;
        }
        let mut encoded = Vec::new();
        for item in items {
            encoded.push(serialize_to_bson(&item)?);
        }
        let spec = match op {
            UpdateOp::Remove => doc! { op.store_key(): { field: encoded } },
            _ => doc! { op.store_key(): { field: { "$each": encoded } } },
        };
        self.update(spec).await
    }

    async fn pop_op(&mut self, op: UpdateOp, field: &str, end: i32) -> TetherResult<bool> {
        if self.removed {
            return Ok(false);
        }
        if let Some(value) = self.current_value(field)? {
            precondition(op, field, &value)?;
        }
        self.update(doc! { op.store_key(): { field: end } }).await
    }

    /// Resolves the value currently at `field` against the in-memory state.
    fn current_value(&self, field: &str) -> TetherResult<Option<Bson>> {
        let packed = self.model.pack()?;
        let resolved = resolve_path(&packed, field, M::field_names())?;
        Ok(resolved.value().cloned())
    }
}

/// Checks an operator's kind precondition against a defined current value.
fn precondition(op: UpdateOp, field: &str, current: &Bson) -> TetherResult<()> {
    if op.allowed().contains(ValueKind::of(current)) {
        Ok(())
    } else {
        Err(TetherError::TypeMismatch {
            operator: op.name(),
            field: field.to_string(),
            found: describe(current).to_string(),
        })
    }
}

/// Checks the assignment rules for a set: undefined never replaces defined,
/// and a defined non-object value only accepts its own kind.
fn set_precondition(field: &str, current: Option<&Bson>, assigned: &Bson) -> TetherResult<()> {
    let Some(current) = current else {
        return Ok(());
    };
    if matches!(assigned, Bson::Null) {
        return Err(TetherError::UndefinedAssignment {
            field: field.to_string(),
        });
    }
    let at_rest = ValueKind::of(current);
    if at_rest == ValueKind::Object {
        return Ok(());
    }
    let assigned = ValueKind::of(assigned);
    if assigned != at_rest {
        return Err(TetherError::KindChange {
            field: field.to_string(),
            at_rest,
            assigned,
        });
    }
    Ok(())
}
