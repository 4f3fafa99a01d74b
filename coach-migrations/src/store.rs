//! The document-store boundary the migration engine is written against.
//!
//! Migrations never talk to a driver directly; they go through [DocumentStore], which exposes
//! the handful of primitives the engine needs: index creation, lookups, single inserts and
//! upserts, and an unordered bulk upsert. Two implementations ship with the crate:
//! [MemoryStore](crate::memory::MemoryStore) and, behind the `mongodb` feature,
//! [MongoStore](crate::mongo::MongoStore).
//!
//! Filters passed to a store are restricted to top-level field equality plus the `$in` and
//! `$exists` operators. Updates are restricted to `$set` and `$setOnInsert`.

use async_trait::async_trait;
use bson::{doc, Document};

use crate::error::Error;

/// Sort direction of one field of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexDirection {
    Ascending,
    Descending,
}

impl IndexDirection {
    pub(crate) fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Definition of a (possibly compound, possibly unique) index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<(String, IndexDirection)>,
    pub unique: bool,
}

impl IndexSpec {
    /// An ascending index over `fields`, named the way MongoDB names it by default
    /// (`slug_1_locale_1`).
    pub fn ascending(fields: &[&str]) -> Self {
        let name = fields
            .iter()
            .map(|f| format!("{f}_1"))
            .collect::<Vec<_>>()
            .join("_");
        Self {
            name,
            keys: fields
                .iter()
                .map(|f| (f.to_string(), IndexDirection::Ascending))
                .collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(field, _)| field.as_str())
    }

    /// The index key document, e.g. `{ slug: 1, locale: 1 }`.
    pub fn key_document(&self) -> Document {
        let mut keys = Document::new();
        for (field, direction) in &self.keys {
            keys.insert(field.clone(), direction.as_i32());
        }
        keys
    }
}

/// One upsert inside a bulk write: match on `filter`, apply `update`, insert if nothing matched.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOne {
    pub filter: Document,
    pub update: Document,
}

impl UpsertOne {
    pub fn new(filter: Document, update: Document) -> Self {
        Self { filter, update }
    }

    /// Upsert with split immutable (`$setOnInsert`) and mutable (`$set`) fields.
    pub fn split(filter: Document, on_insert: Document, set: Document) -> Self {
        let mut update = Document::new();
        if !on_insert.is_empty() {
            update.insert("$setOnInsert", on_insert);
        }
        if !set.is_empty() {
            update.insert("$set", set);
        }
        Self { filter, update }
    }
}

/// Result of a single or multi-document update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    /// `_id` of the inserted document when an upsert found no match.
    pub upserted_id: Option<bson::Bson>,
}

/// Counts reported by an unordered bulk upsert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteSummary {
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
    /// Per-operation failures as `(operation index, message)`. The rest of the batch still ran.
    pub failures: Vec<(usize, String)>,
}

impl BulkWriteSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Primitives a document database must expose to run migrations.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create indexes on `collection`. Re-creating an identical index is a no-op.
    async fn create_indexes(&self, collection: &str, indexes: Vec<IndexSpec>) -> Result<(), Error>;

    async fn find_one(&self, collection: &str, filter: Document)
        -> Result<Option<Document>, Error>;

    /// Return every matching document, restricted to `projection` when given.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, Error>;

    /// Insert one document. Collisions on `_id` or on a unique index fail with
    /// [Error::DuplicateKey].
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), Error>;

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, Error>;

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, Error>;

    /// Execute `operations` as one unordered bulk write. A failing operation does not stop the
    /// others; failures are reported in [BulkWriteSummary::failures].
    async fn bulk_upsert(
        &self,
        collection: &str,
        operations: Vec<UpsertOne>,
    ) -> Result<BulkWriteSummary, Error>;
}

/// Projection that returns only the primary key.
pub fn id_only() -> Document {
    doc! { "_id": 1 }
}
