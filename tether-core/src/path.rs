//! Dotted-path resolution over a packed field map.
//!
//! Update-operator preconditions need to inspect the value currently at a
//! dotted path such as `parents.father` or `tags.0`. This module implements
//! that lookup as an explicit tree-walk over the closed set of container
//! kinds (list, map) with a tagged present/absent result, rather than any
//! form of reflection.

use bson::{Bson, Document};

use crate::error::TetherError;
use crate::kind::describe;

/// Outcome of resolving a dotted path.
#[derive(Debug)]
pub enum Resolved<'a> {
    /// The path does not currently lead to a defined value. Missing map
    /// keys, list indices beyond the current length, and explicit nulls all
    /// resolve here.
    Absent,
    /// The path leads to a defined value.
    Present(&'a Bson),
}

impl<'a> Resolved<'a> {
    pub fn value(&self) -> Option<&'a Bson> {
        match self {
            Resolved::Absent => None,
            Resolved::Present(value) => Some(value),
        }
    }
}

fn path_error(path: &str, reason: impl Into<String>) -> TetherError {
    TetherError::Path {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Resolves `path` against a packed field map.
///
/// The first segment must name a field the model declares; referencing an
/// undeclared top-level field is a [`TetherError::Path`]. Each subsequent
/// segment dereferences either a map (missing key means "not yet present")
/// or a list (the segment must parse as a non-negative integer; an index
/// beyond the current length means "not yet present"). Attempting to
/// descend through a non-container value is an error.
pub fn resolve_path<'a>(
    packed: &'a Document,
    path: &str,
    declared: &[&str],
) -> Result<Resolved<'a>, TetherError> {
    let mut segments = path.split('.');
    let head = match segments.next() {
        Some(head) if !head.is_empty() => head,
        _ => return Err(path_error(path, "empty field path")),
    };
    if !declared.contains(&head) {
        return Err(path_error(path, format!("'{head}' is not a declared field")));
    }

    let mut value = match packed.get(head) {
        Some(value) => value,
        None => return Ok(Resolved::Absent),
    };

    for segment in segments {
        if segment.is_empty() {
            return Err(path_error(path, "empty path segment"));
        }
        value = match value {
            Bson::Document(map) => match map.get(segment) {
                Some(child) => child,
                None => return Ok(Resolved::Absent),
            },
            Bson::Array(items) => {
                let index: usize = segment.parse().map_err(|_| {
                    path_error(path, format!("segment '{segment}' is not a valid list index"))
                })?;
                match items.get(index) {
                    Some(child) => child,
                    None => return Ok(Resolved::Absent),
                }
            }
            Bson::Null => return Ok(Resolved::Absent),
            other => {
                return Err(path_error(
                    path,
                    format!("cannot descend into a {} value at segment '{segment}'", describe(other)),
                ));
            }
        };
    }

    if matches!(value, Bson::Null) {
        Ok(Resolved::Absent)
    } else {
        Ok(Resolved::Present(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    const DECLARED: &[&str] = &["name", "tags", "parents", "likes"];

    fn sample() -> Document {
        doc! {
            "name": "Larry Wall",
            "likes": 0_i64,
            "tags": ["cool", "trendy"],
            "parents": { "mother": "Anna" },
        }
    }

    #[test]
    fn resolves_top_level_fields() {
        let packed = sample();
        let resolved = resolve_path(&packed, "name", DECLARED).unwrap();
        assert_eq!(resolved.value(), Some(&Bson::String("Larry Wall".into())));
    }

    #[test]
    fn resolves_nested_map_and_list_entries() {
        let packed = sample();
        let mother = resolve_path(&packed, "parents.mother", DECLARED).unwrap();
        assert_eq!(mother.value(), Some(&Bson::String("Anna".into())));

        let tag = resolve_path(&packed, "tags.1", DECLARED).unwrap();
        assert_eq!(tag.value(), Some(&Bson::String("trendy".into())));
    }

    #[test]
    fn missing_entries_resolve_as_absent() {
        let packed = sample();
        assert!(resolve_path(&packed, "parents.father", DECLARED).unwrap().value().is_none());
        // Index beyond the current length means "not yet present".
        assert!(resolve_path(&packed, "tags.9", DECLARED).unwrap().value().is_none());
    }

    #[test]
    fn null_values_resolve_as_absent() {
        let packed = doc! { "name": Bson::Null };
        assert!(resolve_path(&packed, "name", DECLARED).unwrap().value().is_none());
    }

    #[test]
    fn undeclared_field_is_a_path_error() {
        let packed = sample();
        let err = resolve_path(&packed, "bogus", DECLARED).unwrap_err();
        assert!(matches!(err, TetherError::Path { .. }));
    }

    #[test]
    fn non_integer_list_index_is_a_path_error() {
        let packed = sample();
        let err = resolve_path(&packed, "tags.first", DECLARED).unwrap_err();
        assert!(matches!(err, TetherError::Path { .. }));
        let err = resolve_path(&packed, "tags.-1", DECLARED).unwrap_err();
        assert!(matches!(err, TetherError::Path { .. }));
    }

    #[test]
    fn descending_through_a_scalar_is_a_path_error() {
        let packed = sample();
        let err = resolve_path(&packed, "name.length", DECLARED).unwrap_err();
        assert!(matches!(err, TetherError::Path { .. }));
    }
}
