#![cfg_attr(docsrs, feature(doc_cfg))]
//! `coach-migrations` keeps the coaching platform's document database at the schema and
//! reference data the application expects.
//!
//! Core concepts:
//! - Migrations are Rust code with a live handle to the store, so they can read what earlier
//!   migrations wrote, resolve references and write back.
//! - The runner is called on every boot, right after the database connection is established. It
//!   applies whatever is pending and refuses to let startup continue past a failure.
//!
//! # Guarantees
//!
//! - Forward-only: there are no down-migrations. A mistake is fixed by a new migration.
//! - Ordered: migrations run in ascending lexicographic order of their ids.
//! - At most once per database, recorded in a ledger collection (`migrations` by default) after
//!   `apply` succeeds.
//! - Idempotent: every shipped migration builds on upserts and idempotent index creation, so a
//!   crash between `apply` and the ledger write is repaired by the next boot.
//! - Fail-fast: the first failing migration aborts the run; it stays pending and the migrations
//!   before it are not re-attempted.
//!
//! # Seed data
//!
//! Reference collections (categories, muscles, equipment, exercises, sessions) are seeded by
//! migrations keyed on `(slug, locale)`. See [seed] for the helpers, and [migrations] for the
//! shipped registry.
//!
//! # Features
//!
//! - Preview / dry-run support ([Migrator::pending]).
//! - Migration history and status querying.
//! - Observability hooks, and `tracing` events for every step.
//! - Per-migration deadline.
//! - Testing utilities - available with the `testing` feature flag.
//!
//! # Stores
//!
//! - [`MemoryStore`](memory::MemoryStore) - always available.
//! - [`MongoStore`](mongo::MongoStore) - available with the `mongodb` feature flag.

mod core;
pub use crate::core::{
    AppContext, Migration, MigrationContext, MigrationReport, MigrationState, MigrationStatusLine,
    Requirement,
};

mod error;
pub use error::Error;

pub mod config;
pub use config::MigrationSettings;

pub mod ledger;
pub use ledger::{Ledger, LedgerEntry};

mod migrator;
pub use migrator::Migrator;

pub mod store;
pub use store::DocumentStore;

pub mod memory;
pub use memory::MemoryStore;

pub mod seed;

pub mod migrations;

#[cfg(feature = "mongodb")]
#[cfg_attr(docsrs, doc(cfg(feature = "mongodb")))]
pub mod mongo;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

#[cfg(all(test, feature = "mongodb"))]
pub(crate) mod test_mongo;
