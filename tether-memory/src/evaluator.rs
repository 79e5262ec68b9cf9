//! Filter evaluation, sorting, and projection over in-memory documents.
//!
//! Implements the subset of the store query language the mapper relies on:
//! top-level equality, the comparison operators (`$eq`, `$ne`, `$gt`,
//! `$gte`, `$lt`, `$lte`), `$in`, and `$exists`, with dotted-key access
//! into nested maps and lists. Equality against a list field also matches
//! when any element is equal, mirroring server behavior.

use std::cmp::Ordering;

use bson::{Bson, Document};

use tether_core::error::StoreError;

/// Looks up a dotted key. Returns `None` for anything absent; an explicit
/// null is returned as a value so `$exists` can see it.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut value = doc.get(segments.next()?)?;
    for segment in segments {
        value = match value {
            Bson::Document(map) => map.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Orders two BSON values for comparisons and sorting. Numbers compare
/// across integer and floating representations; values of unrelated types
/// do not compare.
pub(crate) fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    fn as_number(value: &Bson) -> Option<f64> {
        match value {
            Bson::Int32(n) => Some(f64::from(*n)),
            Bson::Int64(n) => Some(*n as f64),
            Bson::Double(n) => Some(*n),
            _ => None,
        }
    }

    if let (Some(a), Some(b)) = (as_number(a), as_number(b)) {
        return a.partial_cmp(&b);
    }
    match (a, b) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Some(Ordering::Equal) || a == b
}

fn matches_condition(current: Option<&Bson>, condition: &Bson) -> Result<bool, StoreError> {
    // An operator document applies each operator to the current value;
    // anything else is a plain equality condition.
    if let Bson::Document(ops) = condition {
        if ops.keys().any(|key| key.starts_with('$')) {
            for (op, operand) in ops {
                let holds = match op.as_str() {
                    "$eq" => equality_matches(current, operand),
                    "$ne" => !equality_matches(current, operand),
                    "$gt" => ordered(current, operand, |o| o == Ordering::Greater),
                    "$gte" => ordered(current, operand, |o| o != Ordering::Less),
                    "$lt" => ordered(current, operand, |o| o == Ordering::Less),
                    "$lte" => ordered(current, operand, |o| o != Ordering::Greater),
                    "$in" => match operand {
                        Bson::Array(items) => {
                            items.iter().any(|item| equality_matches(current, item))
                        }
                        other => {
                            return Err(StoreError::Backend(format!(
                                "$in requires an array operand, got {other}"
                            )));
                        }
                    },
                    "$exists" => {
                        let wanted = matches!(operand, Bson::Boolean(true));
                        current.is_some() == wanted
                    }
                    other => {
                        return Err(StoreError::Backend(format!(
                            "unsupported query operator '{other}'"
                        )));
                    }
                };
                if !holds {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    Ok(equality_matches(current, condition))
}

fn equality_matches(current: Option<&Bson>, expected: &Bson) -> bool {
    match current {
        None => matches!(expected, Bson::Null),
        Some(value) => match value {
            Bson::Array(items) => {
                values_equal(value, expected)
                    || items.iter().any(|item| values_equal(item, expected))
            }
            _ => values_equal(value, expected),
        },
    }
}

fn ordered(current: Option<&Bson>, operand: &Bson, check: impl Fn(Ordering) -> bool) -> bool {
    match current {
        Some(value) => compare(value, operand).is_some_and(check),
        None => false,
    }
}

/// Whether `doc` satisfies every condition in `filter`. An empty filter
/// matches everything.
pub(crate) fn matches_filter(doc: &Document, filter: &Document) -> Result<bool, StoreError> {
    for (key, condition) in filter {
        if !matches_condition(lookup(doc, key), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Sorts documents by the given key/direction pairs. Absent values sort
/// before present ones; incomparable pairs keep their relative order.
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (key, direction) in sort {
            let ord = match (lookup(a, key), lookup(b, key)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
            };
            let descending = matches!(direction, Bson::Int32(d) if *d < 0)
                || matches!(direction, Bson::Int64(d) if *d < 0);
            let ord = if descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Applies an inclusion projection. The identity entry is always kept.
pub(crate) fn project(doc: &Document, projection: &Document) -> Document {
    let mut projected = Document::new();
    for (key, value) in doc {
        let keep = key == "_id"
            || matches!(projection.get(key), Some(Bson::Int32(1) | Bson::Int64(1) | Bson::Boolean(true)));
        if keep {
            projected.insert(key.clone(), value.clone());
        }
    }
    projected
}
