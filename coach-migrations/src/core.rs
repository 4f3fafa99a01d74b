use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MigrationSettings;
use crate::error::Error;
use crate::ledger::LedgerEntry;
use crate::store::DocumentStore;

/// Process-wide services a migration may read: the database handle and the configuration.
///
/// Built once by the entry point right after the database connection is established.
#[derive(Clone)]
pub struct AppContext {
    store: Arc<dyn DocumentStore>,
    settings: Arc<MigrationSettings>,
}

impl AppContext {
    pub fn new(store: Arc<dyn DocumentStore>, settings: MigrationSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn shared_store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Everything [Migration::apply] receives for one application.
///
/// Log lines emitted while applying are recorded inside the runner's `migration{id=..}` span.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext<'a> {
    id: &'a str,
    app: &'a AppContext,
    now: DateTime<Utc>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(id: &'a str, app: &'a AppContext, now: DateTime<Utc>) -> Self {
        Self { id, app, now }
    }

    /// Id of the migration being applied.
    pub fn id(&self) -> &'a str {
        self.id
    }

    pub fn store(&self) -> &'a dyn DocumentStore {
        self.app.store()
    }

    pub fn settings(&self) -> &'a MigrationSettings {
        self.app.settings()
    }

    pub fn app(&self) -> &'a AppContext {
        self.app
    }

    /// Timestamp taken when this application started. Every row written by one application
    /// shares it.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn now_bson(&self) -> bson::DateTime {
        bson::DateTime::from_millis(self.now.timestamp_millis())
    }
}

/// Natural keys a migration expects earlier migrations to have produced.
///
/// Declared per migration and surfaced by [Migrator::status](crate::Migrator::status). The
/// fail-fast lookups in [seed](crate::seed) assert the same keys when the migration runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The bootstrap admin account, looked up by its email.
    Owner,
    /// Rows of `collection` referenced by slug in the role `role` (e.g. "primary muscle").
    Slugs {
        collection: &'static str,
        role: &'static str,
    },
    /// A configuration value that must be set.
    Setting(&'static str),
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "admin user"),
            Self::Slugs { collection, role } => write!(f, "{role} slugs in '{collection}'"),
            Self::Setting(name) => write!(f, "setting '{name}'"),
        }
    }
}

/// A trait that must be implemented to define a migration.
///
/// Migrations are applied in ascending lexicographic order of [Migration::id]; that order is the
/// only dependency mechanism. A migration that reads data written by another must have a later id.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Returns the identifier of this migration.
    ///
    /// # IMPORTANT WARNING
    ///
    /// **Once a migration has been applied to any database, its id must NEVER be changed or
    /// removed.** The ledger records applications by id. A renamed migration runs again under
    /// its new id, and the old ledger entry is left orphaned. To correct a shipped migration,
    /// add a new migration with a later id.
    ///
    /// # Requirements
    ///
    /// - Must be non-empty and contain no whitespace
    /// - Must be unique across all migrations
    /// - Should start with a zero-padded sequence number (`0007_create_tag_indexes`) so that
    ///   lexicographic order matches intended order
    fn id(&self) -> &str;

    /// Returns an optional description of what this migration does.
    ///
    /// A copy is stored in the ledger when the migration is applied. It can be edited freely
    /// afterwards.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Natural keys this migration needs to exist before it runs.
    fn requires(&self) -> &'static [Requirement] {
        &[]
    }

    /// Apply the migration.
    ///
    /// Must be idempotent: a second application after a crash or a concurrent boot has to leave
    /// the same end state. Build writes on upserts and idempotent index creation rather than on
    /// checks for a previous run.
    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error>;
}

impl PartialEq for dyn Migration {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Debug for dyn Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id())
            .field("description", &self.description())
            .finish()
    }
}

/// A report of actions performed by [Migrator::run_all](crate::Migrator::run_all).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    /// Ids applied during this run, in application order.
    pub applied: Vec<String>,
    /// Ids skipped because the ledger already had them.
    pub skipped: Vec<String>,
    /// Ledger ids with no migration in the registry.
    pub unknown: Vec<String>,
}

impl MigrationReport {
    pub fn is_up_to_date(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Lifecycle state of a registered migration as seen from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applied,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Applied => write!(f, "APPLIED"),
        }
    }
}

/// One row of [Migrator::status](crate::Migrator::status).
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatusLine {
    pub id: String,
    pub description: Option<String>,
    pub state: MigrationState,
    pub requires: &'static [Requirement],
    /// Ledger entry, present when `state` is [MigrationState::Applied].
    pub entry: Option<LedgerEntry>,
}
