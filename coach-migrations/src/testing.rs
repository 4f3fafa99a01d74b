//! Testing utilities for migration development.
//!
//! [TestHarness] runs a registry against a [MemoryStore] and offers state setup and assertion
//! helpers for the resulting collections.

use std::sync::Arc;

use bson::{Bson, Document};

use crate::config::MigrationSettings;
use crate::core::{AppContext, Migration, MigrationContext, MigrationReport};
use crate::error::Error;
use crate::memory::MemoryStore;
use crate::migrator::Migrator;
use crate::store::DocumentStore;

/// Top-level fields that differ between two otherwise identical seeding runs.
const VOLATILE_FIELDS: &[&str] = &["_id", "createdAt", "updatedAt", "createdBy"];

/// A test harness for migration testing that provides state control and assertion helpers.
///
/// # Example
///
/// ```ignore
/// use coach_migrations::testing::TestHarness;
///
/// #[tokio::test]
/// async fn test() -> Result<(), coach_migrations::Error> {
///     let harness = TestHarness::new(vec![Box::new(CreateAdmin)]);
///
///     harness.run().await?;
///
///     harness.assert_collection_count("users", 1).await?;
///     harness.assert_index_exists("users", "email_1").await?;
///     assert_eq!(harness.applied_ids().await?, vec!["0001_create_admin"]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct TestHarness {
    store: Arc<MemoryStore>,
    app: AppContext,
    migrator: Migrator,
}

impl TestHarness {
    /// Create a harness over an empty store with default settings.
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Self {
        Self::with_settings(migrations, MigrationSettings::default())
    }

    pub fn with_settings(migrations: Vec<Box<dyn Migration>>, settings: MigrationSettings) -> Self {
        Self::with_migrator(Migrator::new(migrations), settings)
    }

    /// Use a pre-configured migrator (custom ledger collection, timeout, hooks).
    pub fn with_migrator(migrator: Migrator, settings: MigrationSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let app = AppContext::new(store.clone(), settings);
        Self {
            store,
            app,
            migrator,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn app(&self) -> &AppContext {
        &self.app
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    /// Run every pending migration.
    pub async fn run(&self) -> Result<MigrationReport, Error> {
        self.migrator.run_all(&self.app).await
    }

    /// Apply one migration directly, bypassing the ledger.
    ///
    /// Useful to set up the data a later migration depends on, or to apply a migration twice.
    pub async fn apply(&self, migration: &dyn Migration) -> Result<(), Error> {
        let ctx = MigrationContext::new(migration.id(), &self.app, chrono::Utc::now());
        migration.apply(&ctx).await
    }

    /// Ids recorded in the ledger, sorted.
    pub async fn applied_ids(&self) -> Result<Vec<String>, Error> {
        Ok(self
            .migrator
            .history(&self.app)
            .await?
            .into_iter()
            .map(|entry| entry.id)
            .collect())
    }

    /// Every document of `collection`, in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.store.documents(collection).await
    }

    pub async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, Error> {
        self.store.find_one(collection, filter).await
    }

    /// Insert a document (for setting up test data).
    pub async fn insert(&self, collection: &str, document: Document) -> Result<(), Error> {
        self.store.insert_one(collection, document).await
    }

    /// Assert that `collection` holds exactly `expected` documents.
    pub async fn assert_collection_count(
        &self,
        collection: &str,
        expected: usize,
    ) -> Result<(), Error> {
        let actual = self.store.documents(collection).await.len();
        if actual != expected {
            return Err(Error::Generic(format!(
                "Collection '{}' has {} documents, expected {}",
                collection, actual, expected
            )));
        }
        Ok(())
    }

    /// Assert that an index named `index_name` exists on `collection`.
    pub async fn assert_index_exists(&self, collection: &str, index_name: &str) -> Result<(), Error> {
        let indexes = self.store.indexes(collection).await;
        if !indexes.iter().any(|index| index.name == index_name) {
            return Err(Error::Generic(format!(
                "Index '{}' does not exist on '{}' (found: {})",
                index_name,
                collection,
                indexes
                    .iter()
                    .map(|index| index.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(())
    }

    /// Contents of `collection` with generated ids, ownership and timestamps stripped, sorted by
    /// `(slug, locale)`. Two runs that seeded the same data produce equal snapshots.
    pub async fn snapshot(&self, collection: &str) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .store
            .documents(collection)
            .await
            .into_iter()
            .map(|mut document| {
                for field in VOLATILE_FIELDS {
                    document.remove(*field);
                }
                document
            })
            .collect();
        documents.sort_by_key(|document| (sort_key(document, "slug"), sort_key(document, "locale")));
        documents
    }
}

fn sort_key(document: &Document, field: &str) -> String {
    match document.get(field) {
        Some(Bson::String(value)) => value.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
