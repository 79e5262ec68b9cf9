//! Structural value kinds used by the update-operator preconditions.
//!
//! Every BSON value a model field can hold is classified into one of four
//! structural kinds. Operator preconditions are expressed as sets of
//! acceptable kinds ([`KindSet`]) and checked against the value currently
//! resolved at the target path.

use std::fmt;

use bson::Bson;

/// The structural kind of a defined field value.
///
/// `Object` covers opaque non-container values that carry their own
/// representation (datetimes, object ids, binary blobs, regular
/// expressions); a set over an object-kind value is always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A plain scalar: string, number, or boolean.
    Scalar,
    /// An ordered list of values.
    List,
    /// A string-keyed mapping.
    Map,
    /// An opaque object value.
    Object,
}

impl ValueKind {
    /// Classifies a BSON value. `Bson::Null` never reaches this function;
    /// the path resolver treats null as "not present".
    pub fn of(value: &Bson) -> ValueKind {
        match value {
            Bson::Array(_) => ValueKind::List,
            Bson::Document(_) => ValueKind::Map,
            Bson::DateTime(_)
            | Bson::ObjectId(_)
            | Bson::Binary(_)
            | Bson::Timestamp(_)
            | Bson::RegularExpression(_)
            | Bson::Decimal128(_) => ValueKind::Object,
            _ => ValueKind::Scalar,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            ValueKind::Scalar => 1,
            ValueKind::List => 2,
            ValueKind::Map => 4,
            ValueKind::Object => 8,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Scalar => "scalar",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// A set of acceptable structural kinds, used as an operator precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSet(u8);

impl KindSet {
    /// Every kind is acceptable.
    pub const ALL: KindSet = KindSet(
        ValueKind::Scalar.bit() | ValueKind::List.bit() | ValueKind::Map.bit() | ValueKind::Object.bit(),
    );
    /// Only plain scalars.
    pub const SCALAR: KindSet = KindSet(ValueKind::Scalar.bit());
    /// Only lists.
    pub const LIST: KindSet = KindSet(ValueKind::List.bit());

    /// Whether `kind` is a member of this set.
    pub const fn contains(self, kind: ValueKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

/// Human description of a BSON value for error messages.
pub fn describe(value: &Bson) -> &'static str {
    match value {
        Bson::Null => "null",
        Bson::String(_) | Bson::Symbol(_) => "string scalar",
        Bson::Boolean(_) => "boolean scalar",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => "numeric scalar",
        Bson::Array(_) => "list",
        Bson::Document(_) => "map",
        Bson::DateTime(_)
        | Bson::ObjectId(_)
        | Bson::Binary(_)
        | Bson::Timestamp(_)
        | Bson::RegularExpression(_)
        | Bson::Decimal128(_) => "object",
        _ => "scalar",
    }
}

/// Whether a BSON value is numeric (acceptable as an increment target).
pub fn is_numeric(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}
