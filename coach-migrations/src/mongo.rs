//! MongoDB implementation of [DocumentStore].
//!
//! Bulk upserts go through the raw `update` command with `ordered: false` so that one failing
//! row does not prevent the rest of the batch from being written, on any server version.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::debug;

use crate::error::Error;
use crate::store::{BulkWriteSummary, DocumentStore, IndexSpec, UpdateOutcome, UpsertOne};

const DUPLICATE_KEY: i32 = 11000;

/// A [DocumentStore] backed by one MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Connect to `uri` and use the database `name`.
    pub async fn connect(uri: &str, name: &str) -> Result<Self, Error> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self::new(client.database(name)))
    }

    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY
        }
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn map_write_error(collection: &str, error: mongodb::error::Error) -> Error {
    if is_duplicate_key(&error) {
        Error::DuplicateKey {
            collection: collection.to_string(),
            key: error.to_string(),
        }
    } else {
        Error::Mongo(error)
    }
}

fn count(reply: &Document, field: &str) -> u64 {
    match reply.get(field) {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Double(n)) if *n >= 0.0 => *n as u64,
        _ => 0,
    }
}

/// Translate an `update` command reply into counts and per-operation failures.
fn summarize_update_reply(reply: &Document) -> Result<BulkWriteSummary, Error> {
    let upserted = match reply.get("upserted") {
        Some(Bson::Array(items)) => items.len() as u64,
        _ => 0,
    };

    let mut failures = Vec::new();
    if let Some(Bson::Array(errors)) = reply.get("writeErrors") {
        for error in errors {
            let Bson::Document(error) = error else {
                return Err(Error::Store(format!("unexpected write error entry: {error}")));
            };
            let position = count(error, "index") as usize;
            let message = error.get_str("errmsg").unwrap_or("write error").to_string();
            failures.push((position, message));
        }
    }

    Ok(BulkWriteSummary {
        matched: count(reply, "n").saturating_sub(upserted),
        modified: count(reply, "nModified"),
        upserted,
        failures,
    })
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn create_indexes(&self, collection: &str, indexes: Vec<IndexSpec>) -> Result<(), Error> {
        if indexes.is_empty() {
            return Ok(());
        }
        let models: Vec<IndexModel> = indexes
            .iter()
            .map(|index| {
                IndexModel::builder()
                    .keys(index.key_document())
                    .options(
                        IndexOptions::builder()
                            .name(index.name.clone())
                            .unique(index.unique)
                            .build(),
                    )
                    .build()
            })
            .collect();
        self.collection(collection).create_indexes(models).await?;
        debug!("created {} index(es) on '{collection}'", indexes.len());
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, Error> {
        Ok(self.collection(collection).find_one(filter).await?)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Vec<Document>, Error> {
        let collection = self.collection(collection);
        let mut find = collection.find(filter);
        if let Some(projection) = projection {
            find = find.projection(projection);
        }
        let cursor = find.await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), Error> {
        self.collection(collection)
            .insert_one(document)
            .await
            .map_err(|error| map_write_error(collection, error))?;
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, Error> {
        let result = self
            .collection(collection)
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(|error| map_write_error(collection, error))?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, Error> {
        let result = self
            .collection(collection)
            .update_many(filter, update)
            .await
            .map_err(|error| map_write_error(collection, error))?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn bulk_upsert(
        &self,
        collection: &str,
        operations: Vec<UpsertOne>,
    ) -> Result<BulkWriteSummary, Error> {
        if operations.is_empty() {
            return Ok(BulkWriteSummary::default());
        }
        let updates: Vec<Document> = operations
            .into_iter()
            .map(|operation| {
                doc! {
                    "q": operation.filter,
                    "u": operation.update,
                    "upsert": true,
                    "multi": false,
                }
            })
            .collect();
        let reply = self
            .database
            .run_command(doc! {
                "update": collection,
                "updates": updates,
                "ordered": false,
            })
            .await?;
        summarize_update_reply(&reply)
    }
}
