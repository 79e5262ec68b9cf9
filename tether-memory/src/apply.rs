//! Server-side update application.
//!
//! Applies an operator-keyed update specification to a stored document the
//! way a real document server would: dotted paths create intermediate maps,
//! list indices pad with nulls, and operator misuse the mapper did not
//! catch (for example racing another writer that changed a field's kind)
//! surfaces as a backend fault.

use bson::{Bson, Document};

use tether_core::error::StoreError;

use crate::evaluator::lookup;

fn fault(message: impl Into<String>) -> StoreError {
    StoreError::Backend(message.into())
}

/// Applies every operator in `spec` to `doc`, in specification order.
pub(crate) fn apply_update(doc: &mut Document, spec: &Document) -> Result<(), StoreError> {
    for (op, args) in spec {
        let Bson::Document(args) = args else {
            return Err(fault(format!("'{op}' requires a document argument, got {args}")));
        };
        for (path, operand) in args {
            match op.as_str() {
                "$set" => set_path(doc, path, operand.clone())?,
                "$unset" => unset_path(doc, path),
                "$inc" => increment(doc, path, operand)?,
                "$push" => append(doc, path, operand, false)?,
                "$addToSet" => append(doc, path, operand, true)?,
                "$pop" => pop(doc, path, operand)?,
                "$pullAll" => pull_all(doc, path, operand)?,
                other => return Err(fault(format!("unsupported update operator '{other}'"))),
            }
        }
    }
    Ok(())
}

fn increment(doc: &mut Document, path: &str, delta: &Bson) -> Result<(), StoreError> {
    let current = lookup(doc, path).cloned();
    let next = match current {
        None | Some(Bson::Null) => delta.clone(),
        Some(Bson::Int32(n)) => add_to(i64::from(n), delta)?,
        Some(Bson::Int64(n)) => add_to(n, delta)?,
        Some(Bson::Double(n)) => match delta {
            Bson::Int32(d) => Bson::Double(n + f64::from(*d)),
            Bson::Int64(d) => Bson::Double(n + *d as f64),
            Bson::Double(d) => Bson::Double(n + d),
            other => return Err(fault(format!("cannot increment by {other}"))),
        },
        Some(other) => {
            return Err(fault(format!("cannot apply $inc to non-numeric value {other}")));
        }
    };
    set_path(doc, path, next)
}

fn add_to(current: i64, delta: &Bson) -> Result<Bson, StoreError> {
    match delta {
        Bson::Int32(d) => Ok(Bson::Int64(current + i64::from(*d))),
        Bson::Int64(d) => Ok(Bson::Int64(current + d)),
        Bson::Double(d) => Ok(Bson::Double(current as f64 + d)),
        other => Err(fault(format!("cannot increment by {other}"))),
    }
}

fn operand_items(operand: &Bson) -> Vec<Bson> {
    // `{ "$each": [...] }` appends several items; anything else is one item.
    if let Bson::Document(wrapper) = operand {
        if let Some(Bson::Array(items)) = wrapper.get("$each") {
            return items.clone();
        }
    }
    vec![operand.clone()]
}

fn append(doc: &mut Document, path: &str, operand: &Bson, unique: bool) -> Result<(), StoreError> {
    let items = operand_items(operand);
    let mut list = match lookup(doc, path) {
        None | Some(Bson::Null) => Vec::new(),
        Some(Bson::Array(existing)) => existing.clone(),
        Some(other) => {
            return Err(fault(format!("cannot append to non-list value {other}")));
        }
    };
    for item in items {
        if unique && list.contains(&item) {
            continue;
        }
        list.push(item);
    }
    set_path(doc, path, Bson::Array(list))
}

fn pop(doc: &mut Document, path: &str, operand: &Bson) -> Result<(), StoreError> {
    let from_front = match operand {
        Bson::Int32(-1) | Bson::Int64(-1) => true,
        Bson::Int32(1) | Bson::Int64(1) => false,
        other => return Err(fault(format!("$pop requires 1 or -1, got {other}"))),
    };
    let mut list = match lookup(doc, path) {
        None | Some(Bson::Null) => return Ok(()),
        Some(Bson::Array(existing)) => existing.clone(),
        Some(other) => {
            return Err(fault(format!("cannot apply $pop to non-list value {other}")));
        }
    };
    if !list.is_empty() {
        if from_front {
            list.remove(0);
        } else {
            list.pop();
        }
    }
    set_path(doc, path, Bson::Array(list))
}

fn pull_all(doc: &mut Document, path: &str, operand: &Bson) -> Result<(), StoreError> {
    let Bson::Array(unwanted) = operand else {
        return Err(fault(format!("$pullAll requires an array, got {operand}")));
    };
    let list = match lookup(doc, path) {
        None | Some(Bson::Null) => return Ok(()),
        Some(Bson::Array(existing)) => existing.clone(),
        Some(other) => {
            return Err(fault(format!("cannot apply $pullAll to non-list value {other}")));
        }
    };
    let kept: Vec<Bson> = list.into_iter().filter(|item| !unwanted.contains(item)).collect();
    set_path(doc, path, Bson::Array(kept))
}

/// Writes `value` at a dotted path, creating intermediate maps for missing
/// segments and padding lists with nulls up to a written index.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<(), StoreError> {
    let segments: Vec<&str> = path.split('.').collect();
    set_in_map(doc, &segments, value, path)
}

fn set_in_map(map: &mut Document, segments: &[&str], value: Bson, path: &str) -> Result<(), StoreError> {
    let Some((head, rest)) = segments.split_first() else {
        return Err(fault(format!("empty path in update: '{path}'")));
    };
    if rest.is_empty() {
        map.insert((*head).to_string(), value);
        return Ok(());
    }
    match map.get(*head) {
        Some(Bson::Document(_) | Bson::Array(_)) => {}
        None | Some(Bson::Null) => {
            map.insert((*head).to_string(), Bson::Document(Document::new()));
        }
        Some(other) => {
            return Err(fault(format!(
                "cannot create path '{path}': '{head}' holds non-container value {other}"
            )));
        }
    }
    match map.get_mut(*head) {
        Some(child) => set_in_value(child, rest, value, path),
        None => Err(fault(format!("lost container at '{head}' in path '{path}'"))),
    }
}

fn set_in_value(target: &mut Bson, segments: &[&str], value: Bson, path: &str) -> Result<(), StoreError> {
    match target {
        Bson::Document(map) => set_in_map(map, segments, value, path),
        Bson::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return Err(fault(format!("empty path in update: '{path}'")));
            };
            let index: usize = head.parse().map_err(|_| {
                fault(format!("'{head}' is not a valid list index in path '{path}'"))
            })?;
            if index >= items.len() {
                items.resize(index + 1, Bson::Null);
            }
            if rest.is_empty() {
                items[index] = value;
                return Ok(());
            }
            if matches!(items[index], Bson::Null) {
                items[index] = Bson::Document(Document::new());
            }
            set_in_value(&mut items[index], rest, value, path)
        }
        other => Err(fault(format!(
            "cannot descend into non-container value {other} in path '{path}'"
        ))),
    }
}

/// Removes the value at a dotted path. Map entries are deleted; a list
/// element is nulled in place so sibling indices keep their positions.
fn unset_path(doc: &mut Document, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    unset_in_map(doc, &segments);
}

fn unset_in_map(map: &mut Document, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.remove(*head);
        return;
    }
    if let Some(child) = map.get_mut(*head) {
        unset_in_value(child, rest);
    }
}

fn unset_in_value(target: &mut Bson, segments: &[&str]) {
    match target {
        Bson::Document(map) => unset_in_map(map, segments),
        Bson::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return;
            };
            let Ok(index) = head.parse::<usize>() else {
                return;
            };
            let Some(slot) = items.get_mut(index) else {
                return;
            };
            if rest.is_empty() {
                *slot = Bson::Null;
            } else {
                unset_in_value(slot, rest);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_creates_intermediate_maps_and_pads_lists() {
        let mut doc = doc! { "tags": ["a"] };
        apply_update(&mut doc, &doc! { "$set": { "parents.father": "Tom" } }).unwrap();
        assert_eq!(doc.get_document("parents").unwrap().get_str("father").unwrap(), "Tom");

        apply_update(&mut doc, &doc! { "$set": { "tags.2": "c" } }).unwrap();
        assert_eq!(
            doc.get_array("tags").unwrap().as_slice(),
            &[Bson::String("a".into()), Bson::Null, Bson::String("c".into())]
        );
    }

    #[test]
    fn inc_adds_and_creates() {
        let mut doc = doc! { "likes": 1_i64 };
        apply_update(&mut doc, &doc! { "$inc": { "likes": 2_i64 } }).unwrap();
        assert_eq!(doc.get_i64("likes").unwrap(), 3);

        apply_update(&mut doc, &doc! { "$inc": { "score": 5_i64 } }).unwrap();
        assert_eq!(doc.get_i64("score").unwrap(), 5);

        let err = apply_update(&mut doc! { "likes": "many" }, &doc! { "$inc": { "likes": 1 } });
        assert!(matches!(err, Err(StoreError::Backend(_))));
    }

    #[test]
    fn push_and_add_to_set_respect_each() {
        let mut doc = doc! { "tags": ["cool"] };
        apply_update(&mut doc, &doc! { "$push": { "tags": { "$each": ["x", "cool"] } } }).unwrap();
        assert_eq!(doc.get_array("tags").unwrap().len(), 3);

        let mut doc = doc! { "tags": ["cool"] };
        apply_update(&mut doc, &doc! { "$addToSet": { "tags": { "$each": ["x", "cool"] } } }).unwrap();
        assert_eq!(doc.get_array("tags").unwrap().len(), 2);
    }

    #[test]
    fn pop_trims_either_end_and_tolerates_absent_lists() {
        let mut doc = doc! { "tags": ["a", "b", "c"] };
        apply_update(&mut doc, &doc! { "$pop": { "tags": 1 } }).unwrap();
        apply_update(&mut doc, &doc! { "$pop": { "tags": -1 } }).unwrap();
        assert_eq!(doc.get_array("tags").unwrap().as_slice(), &[Bson::String("b".into())]);

        let mut doc = doc! {};
        apply_update(&mut doc, &doc! { "$pop": { "tags": 1 } }).unwrap();
        assert!(!doc.contains_key("tags"));
    }

    #[test]
    fn pull_all_removes_every_occurrence() {
        let mut doc = doc! { "tags": ["a", "b", "a", "c"] };
        apply_update(&mut doc, &doc! { "$pullAll": { "tags": ["a", "c"] } }).unwrap();
        assert_eq!(doc.get_array("tags").unwrap().as_slice(), &[Bson::String("b".into())]);
    }

    #[test]
    fn unset_removes_map_entries_and_nulls_list_slots() {
        let mut doc = doc! { "name": "x", "tags": ["a", "b"] };
        apply_update(&mut doc, &doc! { "$unset": { "name": "" } }).unwrap();
        assert!(!doc.contains_key("name"));

        apply_update(&mut doc, &doc! { "$unset": { "tags.0": "" } }).unwrap();
        assert_eq!(
            doc.get_array("tags").unwrap().as_slice(),
            &[Bson::Null, Bson::String("b".into())]
        );
    }
}
