mod common;

use bson::{DateTime, doc};
use common::{DB, Person, person, store};
use tether::prelude::*;

#[tokio::test]
async fn typed_operators_mutate_on_the_server_and_merge_back() {
    let (backend, store) = store();
    let people = store.collection::<Person>();

    let mut larry = people.create(person("Larry Wall")).await.unwrap();

    assert!(larry.update_inc("likes", 1).await.unwrap());
    assert!(larry.update_add("tags", ["cool"]).await.unwrap());
    assert!(larry.update_set("name", "Larry M. Wall").await.unwrap());

    assert_eq!(larry.likes, 1);
    assert_eq!(larry.name, "Larry M. Wall");
    assert_eq!(larry.tags.as_deref(), Some(&["cool".to_string()][..]));

    // The store saw the same mutations, not a client-side writeback.
    let stored = &backend.documents(DB, "people").await[0];
    assert_eq!(stored.get_i64("likes").unwrap(), 1);
    assert_eq!(stored.get_str("name").unwrap(), "Larry M. Wall");

    // A second handle converges after synchronizing.
    let mut other = people.find_by_id(larry.id()).await.unwrap().unwrap();
    assert!(other.sync().await.unwrap());
    assert_eq!(other.model(), larry.model());
}

#[tokio::test]
async fn add_is_idempotent_and_push_is_not() {
    let (_backend, store) = store();
    let people = store.collection::<Person>();
    let mut handle = people.create(person("Larry Wall")).await.unwrap();

    assert!(handle.update_add("tags", ["cool"]).await.unwrap());
    assert!(handle.update_add("tags", ["cool"]).await.unwrap());
    assert_eq!(handle.tags.as_deref(), Some(&["cool".to_string()][..]));

    assert!(handle.update_push("tags", ["cool", "trendy"]).await.unwrap());
    assert_eq!(
        handle.tags.as_deref(),
        Some(&["cool".to_string(), "cool".to_string(), "trendy".to_string()][..])
    );
}

#[tokio::test]
async fn pop_shift_and_remove_trim_lists() {
    let (_backend, store) = store();
    let people = store.collection::<Person>();
    let mut handle = people.create(person("Larry Wall")).await.unwrap();

    handle
        .update_push("tags", ["a", "b", "a", "c"])
        .await
        .unwrap();

    assert!(handle.update_pop("tags").await.unwrap());
    assert_eq!(
        handle.tags.as_deref(),
        Some(&["a".to_string(), "b".to_string(), "a".to_string()][..])
    );

    assert!(handle.update_shift("tags").await.unwrap());
    assert_eq!(
        handle.tags.as_deref(),
        Some(&["b".to_string(), "a".to_string()][..])
    );

    assert!(handle.update_remove("tags", ["a"]).await.unwrap());
    assert_eq!(handle.tags.as_deref(), Some(&["b".to_string()][..]));
}

#[tokio::test]
async fn list_operators_tolerate_absent_lists() {
    let (_backend, store) = store();
    let people = store.collection::<Person>();
    let mut handle = people.create(person("Larry Wall")).await.unwrap();

    // No tags yet; popping and shifting are clean no-ops.
    assert!(handle.update_pop("tags").await.unwrap());
    assert!(handle.update_shift("tags").await.unwrap());
    assert!(handle.update_remove("tags", ["x"]).await.unwrap());
    assert_eq!(handle.tags, None);

    // Pushing to an absent list creates it.
    assert!(handle.update_push("tags", ["first"]).await.unwrap());
    assert_eq!(handle.tags.as_deref(), Some(&["first".to_string()][..]));
}

#[tokio::test]
async fn operator_kind_preconditions_reject_misuse() {
    let (_backend, store) = store();
    let people = store.collection::<Person>();
    let mut handle = people.create(person("Larry Wall")).await.unwrap();
    handle.update_push("tags", ["cool"]).await.unwrap();

    // List operators on a scalar.
    let err = handle.update_push("likes", [1]).await.unwrap_err();
    assert!(matches!(
        err,
        TetherError::TypeMismatch { operator: "push", .. }
    ));
    let err = handle.update_pop("name").await.unwrap_err();
    assert!(matches!(err, TetherError::TypeMismatch { operator: "pop", .. }));

    // Increment on non-numeric values.
    let err = handle.update_inc("name", 1).await.unwrap_err();
    match err {
        TetherError::TypeMismatch { operator, found, .. } => {
            assert_eq!(operator, "inc");
            assert_eq!(found, "string scalar");
        }
        other => panic!("unexpected error: {other}"),
    }
    let err = handle.update_inc("tags", 1).await.unwrap_err();
    assert!(matches!(err, TetherError::TypeMismatch { operator: "inc", .. }));

    // Nothing above reached the store; the handle still matches it.
    assert_eq!(handle.likes, 0);
}

#[tokio::test]
async fn inc_creates_absent_numeric_fields() {
    let (_backend, store) = store();
    let people = store.collection::<Person>();
    let mut handle = people.create(person("Larry Wall")).await.unwrap();

    assert_eq!(handle.score, None);
    assert!(handle.update_inc("score", 7_i64).await.unwrap());
    assert_eq!(handle.score, Some(7));

    assert!(handle.update_inc("score", -2_i64).await.unwrap());
    assert_eq!(handle.score, Some(5));
}

#[tokio::test]
async fn set_enforces_kind_stability() {
    let (_backend, store) = store();
    let people = store.collection::<Person>();
    let mut handle = people.create(person("Larry Wall")).await.unwrap();

    // Same kind over a defined value.
    assert!(handle.update_set("name", "Tim").await.unwrap());
    assert_eq!(handle.name, "Tim");

    // A different kind over a defined value is rejected.
    let err = handle.update_set("name", vec!["Tim"]).await.unwrap_err();
    assert!(matches!(err, TetherError::KindChange { .. }));

    // Undefined over defined is rejected; clear is the way to do that.
    let none: Option<String> = None;
    let err = handle.update_set("name", none).await.unwrap_err();
    assert!(matches!(err, TetherError::UndefinedAssignment { .. }));

    // Anything goes over an absent field.
    assert!(handle.update_set("tags", vec!["cool"]).await.unwrap());

    // Object-kind values accept any assignment.
    let joined = DateTime::from_chrono(chrono::Utc::now());
    assert!(handle.update_set("joined", joined).await.unwrap());
    assert!(
        handle
            .update_set("joined", DateTime::from_millis(86_400_000))
            .await
            .unwrap()
    );
    assert_eq!(handle.joined, Some(DateTime::from_millis(86_400_000)));
}

#[tokio::test]
async fn clear_unsets_any_field_kind() {
    let (backend, store) = store();
    let people = store.collection::<Person>();
    let mut value = person("Larry Wall");
    value.tags = Some(vec!["cool".to_string()]);
    value.score = Some(1);
    let mut handle = people.create(value).await.unwrap();

    assert!(handle.update_clear("tags").await.unwrap());
    assert!(handle.update_clear("score").await.unwrap());
    // Clearing an already-absent field is a clean no-op.
    assert!(handle.update_clear("joined").await.unwrap());

    let stored = &backend.documents(DB, "people").await[0];
    assert!(!stored.contains_key("tags"));
    assert!(!stored.contains_key("score"));
}

#[tokio::test]
async fn dotted_paths_reach_into_nested_values() {
    let (backend, store) = store();
    let people = store.collection::<Person>();
    let mut value = person("Larry Wall");
    value.parents = Some(doc! { "mother": "Anna" });
    value.tags = Some(vec!["cool".to_string(), "trendy".to_string()]);
    let mut handle = people.create(value).await.unwrap();

    assert!(handle.update_set("parents.father", "Tom").await.unwrap());
    assert!(handle.update_set("tags.1", "classic").await.unwrap());

    let parents = handle.parents.as_ref().unwrap();
    assert_eq!(parents.get_str("father").unwrap(), "Tom");
    assert_eq!(
        handle.tags.as_deref(),
        Some(&["cool".to_string(), "classic".to_string()][..])
    );

    // Preconditions apply at the resolved path, not the top-level field.
    let err = handle.update_push("parents.father", ["x"]).await.unwrap_err();
    assert!(matches!(
        err,
        TetherError::TypeMismatch { operator: "push", .. }
    ));

    let stored = &backend.documents(DB, "people").await[0];
    assert_eq!(
        stored.get_document("parents").unwrap().get_str("father").unwrap(),
        "Tom"
    );
}

#[tokio::test]
async fn invalid_paths_are_rejected_before_reaching_the_store() {
    let (backend, store) = store();
    let people = store.collection::<Person>();
    let mut handle = people.create(person("Larry Wall")).await.unwrap();

    // Undeclared top-level field.
    let err = handle.update_set("nickname", "lw").await.unwrap_err();
    assert!(matches!(err, TetherError::Path { .. }));

    // Descending through a scalar.
    let err = handle.update_set("name.first", "Larry").await.unwrap_err();
    assert!(matches!(err, TetherError::Path { .. }));

    // Non-integer list index.
    handle.update_push("tags", ["cool"]).await.unwrap();
    let err = handle.update_set("tags.first", "x").await.unwrap_err();
    assert!(matches!(err, TetherError::Path { .. }));

    let stored = &backend.documents(DB, "people").await[0];
    assert!(!stored.contains_key("nickname"));
}

#[tokio::test]
async fn raw_updates_take_operator_keys_only() {
    let (_backend, store) = store();
    let people = store.collection::<Person>();
    let mut handle = people.create(person("Larry Wall")).await.unwrap();

    // Several operators in one atomic round trip.
    assert!(
        handle
            .update(doc! {
                "$inc": { "likes": 10_i64 },
                "$set": { "name": "Larry M. Wall" },
            })
            .await
            .unwrap()
    );
    assert_eq!(handle.likes, 10);
    assert_eq!(handle.name, "Larry M. Wall");

    // A plain field name at the top level is a protocol violation.
    let err = handle.update(doc! { "name": "oops" }).await.unwrap_err();
    assert!(matches!(err, TetherError::Protocol(_)));

    let err = handle.update(doc! {}).await.unwrap_err();
    assert!(matches!(err, TetherError::Protocol(_)));
}

#[tokio::test]
async fn updating_a_vanished_document_marks_the_handle_removed() {
    let (_backend, store) = store();
    let people = store.collection::<Person>();

    let mut ours = people.create(person("Larry Wall")).await.unwrap();
    let mut theirs = people.find_by_id(ours.id()).await.unwrap().unwrap();
    theirs.remove().await.unwrap();

    assert!(!ours.update_inc("likes", 1).await.unwrap());
    assert!(ours.is_removed());
    assert_eq!(ours.likes, 0);
}
