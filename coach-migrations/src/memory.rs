//! # In-memory document store
//!
//! [MemoryStore] keeps collections in process memory and reproduces the MongoDB semantics the
//! migration engine relies on:
//!
//! | Behavior | MemoryStore | MongoDB |
//! |----------|-------------|---------|
//! | `_id` generation | `ObjectId` on insert/upsert | `ObjectId` on insert/upsert |
//! | Unique indexes | enforced on every write | enforced on every write |
//! | Re-creating an identical index | no-op | no-op |
//! | Upsert operators | `$set`, `$setOnInsert` | full update language |
//! | Bulk upsert | unordered, per-operation failures collected | unordered, `writeErrors` |
//!
//! It backs the crate's unit tests and the [TestHarness](crate::testing::TestHarness), and is
//! handy for running a registry locally without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use tokio::sync::Mutex;

use crate::error::Error;
use crate::store::{BulkWriteSummary, DocumentStore, IndexSpec, UpdateOutcome, UpsertOne};

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// A [DocumentStore] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, CollectionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents of `collection`, in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(|state| state.documents.clone())
            .unwrap_or_default()
    }

    /// Indexes created on `collection` (the implicit `_id` index is not listed).
    pub async fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(|state| state.indexes.clone())
            .unwrap_or_default()
    }

    pub async fn collection_names(&self) -> Vec<String> {
        self.collections.lock().await.keys().cloned().collect()
    }

    pub async fn drop_collection(&self, collection: &str) {
        self.collections.lock().await.remove(collection);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_indexes(&self, collection: &str, indexes: Vec<IndexSpec>) -> Result<(), Error> {
        let mut collections = self.collections.lock().await;
        let state = collections.entry(collection.to_string()).or_default();
        for index in indexes {
            if let Some(existing) = state.indexes.iter().find(|i| i.name == index.name) {
                if *existing == index {
                    continue;
                }
                return Err(Error::Store(format!(
                    "index '{}' on '{}' already exists with a different definition",
                    index.name, collection
                )));
            }
            if index.unique {
                for (position, document) in state.documents.iter().enumerate() {
                    let key = index_key(&index, document);
                    if state.documents[..position]
                        .iter()
                        .any(|other| index_key(&index, other) == key)
                    {
                        return Err(duplicate(collection, &index, document));
                    }
                }
            }
            state.indexes.push(index);
        }
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, Error> {
        let collections = self.collections.lock().await;
        let Some(state) = collections.get(collection) else {
            return Ok(None);
        };
        for document in &state.documents {
            if matches(document, &filter)? {
                return Ok(Some(document.clone()));
            }
        }
        Ok(None)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, Error> {
        let collections = self.collections.lock().await;
        let Some(state) = collections.get(collection) else {
            return Ok(vec![]);
        };
        let mut found = Vec::new();
        for document in &state.documents {
            if matches(document, &filter)? {
                found.push(match &projection {
                    Some(projection) => project(document, projection),
                    None => document.clone(),
                });
            }
        }
        Ok(found)
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<(), Error> {
        let mut collections = self.collections.lock().await;
        let state = collections.entry(collection.to_string()).or_default();
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        check_unique(state, collection, &document, None)?;
        state.documents.push(document);
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, Error> {
        let mut collections = self.collections.lock().await;
        let state = collections.entry(collection.to_string()).or_default();
        update_locked(state, collection, &filter, &update, upsert)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, Error> {
        let mut collections = self.collections.lock().await;
        let Some(state) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };
        let mut outcome = UpdateOutcome::default();
        for position in 0..state.documents.len() {
            if !matches(&state.documents[position], &filter)? {
                continue;
            }
            let mut updated = state.documents[position].clone();
            apply_update(&mut updated, &update, false)?;
            check_unique(state, collection, &updated, Some(position))?;
            outcome.matched += 1;
            if updated != state.documents[position] {
                outcome.modified += 1;
                state.documents[position] = updated;
            }
        }
        Ok(outcome)
    }

    async fn bulk_upsert(
        &self,
        collection: &str,
        operations: Vec<UpsertOne>,
    ) -> Result<BulkWriteSummary, Error> {
        let mut collections = self.collections.lock().await;
        let state = collections.entry(collection.to_string()).or_default();
        let mut summary = BulkWriteSummary::default();
        for (position, operation) in operations.iter().enumerate() {
            match update_locked(state, collection, &operation.filter, &operation.update, true) {
                Ok(outcome) => {
                    summary.matched += outcome.matched;
                    summary.modified += outcome.modified;
                    if outcome.upserted_id.is_some() {
                        summary.upserted += 1;
                    }
                }
                Err(error) => summary.failures.push((position, error.to_string())),
            }
        }
        Ok(summary)
    }
}

fn update_locked(
    state: &mut CollectionState,
    collection: &str,
    filter: &Document,
    update: &Document,
    upsert: bool,
) -> Result<UpdateOutcome, Error> {
    let mut position = None;
    for (i, document) in state.documents.iter().enumerate() {
        if matches(document, filter)? {
            position = Some(i);
            break;
        }
    }

    if let Some(position) = position {
        let mut updated = state.documents[position].clone();
        apply_update(&mut updated, update, false)?;
        check_unique(state, collection, &updated, Some(position))?;
        let modified = updated != state.documents[position];
        if modified {
            state.documents[position] = updated;
        }
        return Ok(UpdateOutcome {
            matched: 1,
            modified: u64::from(modified),
            upserted_id: None,
        });
    }

    if !upsert {
        return Ok(UpdateOutcome::default());
    }

    // Seed the new document with the filter's equality fields, as MongoDB does.
    let mut inserted = Document::new();
    for (field, value) in filter {
        if !is_operator_document(value) {
            inserted.insert(field.clone(), value.clone());
        }
    }
    apply_update(&mut inserted, update, true)?;
    if !inserted.contains_key("_id") {
        inserted.insert("_id", ObjectId::new());
    }
    check_unique(state, collection, &inserted, None)?;
    let upserted_id = inserted.get("_id").cloned();
    state.documents.push(inserted);
    Ok(UpdateOutcome {
        matched: 0,
        modified: 0,
        upserted_id,
    })
}

fn is_operator_document(value: &Bson) -> bool {
    match value {
        Bson::Document(inner) => inner.keys().next().is_some_and(|k| k.starts_with('$')),
        _ => false,
    }
}

fn matches(document: &Document, filter: &Document) -> Result<bool, Error> {
    for (field, expected) in filter {
        let actual = document.get(field);
        let Bson::Document(operators) = expected else {
            if actual != Some(expected) {
                return Ok(false);
            }
            continue;
        };
        if !is_operator_document(expected) {
            if actual != Some(expected) {
                return Ok(false);
            }
            continue;
        }
        for (operator, argument) in operators {
            let satisfied = match operator.as_str() {
                "$in" => match argument {
                    Bson::Array(candidates) => actual.is_some_and(|a| candidates.contains(a)),
                    _ => {
                        return Err(Error::Store(format!(
                            "$in on '{field}' expects an array"
                        )))
                    }
                },
                "$exists" => match argument {
                    Bson::Boolean(wanted) => actual.is_some() == *wanted,
                    _ => {
                        return Err(Error::Store(format!(
                            "$exists on '{field}' expects a boolean"
                        )))
                    }
                },
                other => {
                    return Err(Error::Store(format!(
                        "unsupported filter operator {other}"
                    )))
                }
            };
            if !satisfied {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn apply_update(target: &mut Document, update: &Document, inserting: bool) -> Result<(), Error> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(Error::Store(format!("{operator} expects a document")));
        };
        match operator.as_str() {
            "$set" => {
                for (field, value) in fields {
                    target.insert(field.clone(), value.clone());
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (field, value) in fields {
                        target.insert(field.clone(), value.clone());
                    }
                }
            }
            other => {
                return Err(Error::Store(format!(
                    "unsupported update operator {other}"
                )))
            }
        }
    }
    Ok(())
}

fn project(document: &Document, projection: &Document) -> Document {
    let excluded = |value: &Bson| matches!(value, Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false));
    let mut projected = Document::new();
    if !projection.get("_id").is_some_and(excluded) {
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
    }
    for (field, flag) in projection {
        if field == "_id" || excluded(flag) {
            continue;
        }
        if let Some(value) = document.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }
    projected
}

fn index_key(index: &IndexSpec, document: &Document) -> Vec<Bson> {
    index
        .fields()
        .map(|field| document.get(field).cloned().unwrap_or(Bson::Null))
        .collect()
}

fn duplicate(collection: &str, index: &IndexSpec, document: &Document) -> Error {
    let mut key = Document::new();
    for field in index.fields() {
        key.insert(field, document.get(field).cloned().unwrap_or(Bson::Null));
    }
    Error::DuplicateKey {
        collection: collection.to_string(),
        key: format!("index {} dup key {}", index.name, key),
    }
}

fn check_unique(
    state: &CollectionState,
    collection: &str,
    candidate: &Document,
    skip: Option<usize>,
) -> Result<(), Error> {
    let others = state
        .documents
        .iter()
        .enumerate()
        .filter(|(position, _)| Some(*position) != skip)
        .map(|(_, document)| document);

    if let Some(id) = candidate.get("_id") {
        if others.clone().any(|other| other.get("_id") == Some(id)) {
            return Err(Error::DuplicateKey {
                collection: collection.to_string(),
                key: format!("_id {id}"),
            });
        }
    }
    for index in state.indexes.iter().filter(|index| index.unique) {
        let key = index_key(index, candidate);
        if others.clone().any(|other| index_key(index, other) == key) {
            return Err(duplicate(collection, index, candidate));
        }
    }
    Ok(())
}
