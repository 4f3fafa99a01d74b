//! The ledger: one document per applied migration, keyed by the migration id.
//!
//! Document shape: `{ _id: <migration id>, appliedAt: <datetime>, description?: <string>,
//! elapsedMs?: <int64> }`. The collection carries no index beyond its primary key; the runner
//! only ever lists ids or inserts by id.

use std::collections::BTreeSet;

use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::store::{id_only, DocumentStore};

/// Represents a migration that has been applied to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// The migration id, the ledger's primary key.
    pub id: String,
    /// When `apply` returned successfully.
    pub applied_at: DateTime<Utc>,
    /// The migration's description at application time.
    pub description: Option<String>,
    /// Wall-clock duration of `apply`.
    pub elapsed_ms: Option<i64>,
}

impl LedgerEntry {
    pub fn to_document(&self) -> Document {
        let mut document = doc! {
            "_id": self.id.clone(),
            "appliedAt": bson::DateTime::from_millis(self.applied_at.timestamp_millis()),
        };
        if let Some(description) = &self.description {
            document.insert("description", description.clone());
        }
        if let Some(elapsed_ms) = self.elapsed_ms {
            document.insert("elapsedMs", elapsed_ms);
        }
        document
    }

    pub fn from_document(document: &Document) -> Result<Self, Error> {
        let id = document.get_str("_id")?.to_string();
        let applied_at = document.get_datetime("appliedAt")?.timestamp_millis();
        let applied_at = DateTime::<Utc>::from_timestamp_millis(applied_at).ok_or_else(|| {
            Error::Store(format!("ledger entry '{id}' has an out-of-range appliedAt"))
        })?;
        let description = document.get_str("description").ok().map(str::to_string);
        let elapsed_ms = match document.get("elapsedMs") {
            Some(Bson::Int64(ms)) => Some(*ms),
            Some(Bson::Int32(ms)) => Some(i64::from(*ms)),
            _ => None,
        };
        Ok(Self {
            id,
            applied_at,
            description,
            elapsed_ms,
        })
    }
}

/// Read and append access to the ledger collection.
pub struct Ledger<'a> {
    store: &'a dyn DocumentStore,
    collection: &'a str,
}

impl<'a> Ledger<'a> {
    pub fn new(store: &'a dyn DocumentStore, collection: &'a str) -> Self {
        Self { store, collection }
    }

    pub fn collection(&self) -> &str {
        self.collection
    }

    /// Ids of every applied migration. Reads the primary key only.
    pub async fn list_applied(&self) -> Result<BTreeSet<String>, Error> {
        let documents = self
            .store
            .find(self.collection, Document::new(), Some(id_only()))
            .await?;
        documents
            .iter()
            .map(|document| -> Result<String, Error> {
                Ok(document.get_str("_id")?.to_string())
            })
            .collect()
    }

    /// Append an entry. Fails with [Error::AlreadyRecorded] rather than overwriting an
    /// existing one.
    pub async fn record_applied(&self, entry: &LedgerEntry) -> Result<(), Error> {
        match self
            .store
            .insert_one(self.collection, entry.to_document())
            .await
        {
            Err(Error::DuplicateKey { .. }) => Err(Error::AlreadyRecorded {
                id: entry.id.clone(),
            }),
            other => other,
        }
    }

    /// Every entry, sorted by id.
    pub async fn history(&self) -> Result<Vec<LedgerEntry>, Error> {
        let documents = self
            .store
            .find(self.collection, Document::new(), None)
            .await?;
        let mut entries = documents
            .iter()
            .map(LedgerEntry::from_document)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn entry(id: &str) -> LedgerEntry {
        LedgerEntry {
            id: id.to_string(),
            applied_at: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap(),
            description: Some("Create the bootstrap admin".to_string()),
            elapsed_ms: Some(42),
        }
    }

    #[test]
    fn document_shape() {
        let document = entry("0001_create_admin").to_document();
        assert_eq!(document.get_str("_id").unwrap(), "0001_create_admin");
        assert_eq!(document.get_i64("elapsedMs").unwrap(), 42);
        assert_eq!(
            LedgerEntry::from_document(&document).unwrap(),
            entry("0001_create_admin")
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let mut bare = entry("0002_x");
        bare.description = None;
        bare.elapsed_ms = None;
        let document = bare.to_document();
        assert!(!document.contains_key("description"));
        assert!(!document.contains_key("elapsedMs"));
    }

    #[tokio::test]
    async fn record_then_list() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(&store, "migrations");
        assert!(ledger.list_applied().await.unwrap().is_empty());

        ledger.record_applied(&entry("0002_b")).await.unwrap();
        ledger.record_applied(&entry("0001_a")).await.unwrap();

        let applied = ledger.list_applied().await.unwrap();
        assert_eq!(
            applied.into_iter().collect::<Vec<_>>(),
            vec!["0001_a".to_string(), "0002_b".to_string()]
        );
        let history = ledger.history().await.unwrap();
        assert_eq!(history[0].id, "0001_a");
        assert_eq!(history[1].elapsed_ms, Some(42));
    }

    #[tokio::test]
    async fn second_record_fails_loudly() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(&store, "migrations");
        ledger.record_applied(&entry("0001_a")).await.unwrap();
        let err = ledger.record_applied(&entry("0001_a")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyRecorded { ref id } if id == "0001_a"));
        assert_eq!(store.documents("migrations").await.len(), 1);
    }
}
