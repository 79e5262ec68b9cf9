#![allow(dead_code)]

use bson::{Bson, Document, Uuid, bson};
use serde::{Deserialize, Serialize};
use tether::memory::MemoryBackend;
use tether::model::Model;
use tether::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub likes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined: Option<bson::DateTime>,
}

impl Model for Person {
    fn id(&self) -> &Uuid {
        &self.id
    }

    fn collection_name() -> &'static str {
        "people"
    }

    fn field_names() -> &'static [&'static str] {
        &["id", "name", "likes", "score", "tags", "parents", "joined"]
    }

    fn indexes() -> Vec<Vec<Bson>> {
        vec![
            vec![bson!({ "unique": true }), bson!("name"), bson!(1)],
            vec![bson!("tags"), bson!(1), bson!("likes"), bson!(-1)],
        ]
    }
}

pub const DB: &str = "testdb";

pub fn store() -> (MemoryBackend, Store<MemoryBackend>) {
    let backend = MemoryBackend::new();
    let store = Store::new(backend.clone(), DB);
    (backend, store)
}

pub fn person(name: &str) -> Person {
    Person {
        id: Uuid::new(),
        name: name.to_string(),
        likes: 0,
        score: None,
        tags: None,
        parents: None,
        joined: None,
    }
}
