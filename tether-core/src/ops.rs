//! The update-operator table.
//!
//! Every typed update method on a document handle corresponds to one entry
//! here: a fixed mapping from operator to its store-side operator key and
//! the set of structural kinds the current field value may have. The table
//! is compiled into the binary; there is no dynamic dispatch.

use crate::kind::KindSet;

/// A typed update operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    /// Assign a value (`$set`).
    Set,
    /// Increment a numeric value (`$inc`).
    Inc,
    /// Append items to a list (`$push` with `$each`).
    Push,
    /// Append items to a list unless already present (`$addToSet` with
    /// `$each`).
    Add,
    /// Remove the last item of a list (`$pop: 1`).
    Pop,
    /// Remove the first item of a list (`$pop: -1`).
    Shift,
    /// Remove all occurrences of the given items (`$pullAll`).
    Remove,
    /// Unset the field entirely (`$unset`).
    Clear,
}

impl UpdateOp {
    /// The operator name used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            UpdateOp::Set => "set",
            UpdateOp::Inc => "inc",
            UpdateOp::Push => "push",
            UpdateOp::Add => "add",
            UpdateOp::Pop => "pop",
            UpdateOp::Shift => "shift",
            UpdateOp::Remove => "remove",
            UpdateOp::Clear => "clear",
        }
    }

    /// The reserved store operator key this maps to.
    pub const fn store_key(self) -> &'static str {
        match self {
            UpdateOp::Set => "$set",
            UpdateOp::Inc => "$inc",
            UpdateOp::Push => "$push",
            UpdateOp::Add => "$addToSet",
            UpdateOp::Pop | UpdateOp::Shift => "$pop",
            UpdateOp::Remove => "$pullAll",
            UpdateOp::Clear => "$unset",
        }
    }

    /// Kinds the current field value may have for this operator to apply.
    /// `Set` additionally enforces same-kind assignment and `Inc` requires
    /// the scalar to be numeric; those checks live with the handle.
    pub const fn allowed(self) -> KindSet {
        match self {
            UpdateOp::Set | UpdateOp::Clear => KindSet::ALL,
            UpdateOp::Inc => KindSet::SCALAR,
            UpdateOp::Push | UpdateOp::Add | UpdateOp::Pop | UpdateOp::Shift | UpdateOp::Remove => {
                KindSet::LIST
            }
        }
    }
}
