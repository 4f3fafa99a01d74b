use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::MigrationSettings;
use crate::core::{
    AppContext, Migration, MigrationContext, MigrationReport, MigrationState, MigrationStatusLine,
};
use crate::error::Error;
use crate::ledger::{Ledger, LedgerEntry};

type StartHook = Box<dyn Fn(&str) + Send + Sync>;
type CompleteHook = Box<dyn Fn(&str, Duration) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&str, &Error) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    FromSettings,
    Fixed(Option<Duration>),
}

/// The entrypoint for applying a registry of [Migration]s.
///
/// Construct it with every migration shipped in the build; the order of the vector does not
/// matter, migrations always run in ascending lexicographic order of their ids.
///
/// Runs are forward-only and sequential. Each pending migration is applied, then recorded in the
/// ledger. A failing migration aborts the run and stays pending for the next boot.
///
/// No lock is taken: the runner assumes a single instance migrates at a time. Two instances
/// booting together can both apply the same pending migration; upsert-based migrations make that
/// safe for data, and the slower instance fails on its ledger insert.
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
    ledger_collection: Option<String>,
    deadline: Deadline,
    on_migration_start: Option<StartHook>,
    on_migration_complete: Option<CompleteHook>,
    on_migration_skipped: Option<StartHook>,
    on_migration_error: Option<ErrorHook>,
}

// Manual Debug impl since closures don't implement Debug
impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("migrations", &self.migrations)
            .field("ledger_collection", &self.ledger_collection)
            .field("deadline", &self.deadline)
            .field("on_migration_start", &self.on_migration_start.is_some())
            .field("on_migration_complete", &self.on_migration_complete.is_some())
            .field("on_migration_skipped", &self.on_migration_skipped.is_some())
            .field("on_migration_error", &self.on_migration_error.is_some())
            .finish()
    }
}

impl Migrator {
    /// Create a new Migrator, validating the registry.
    /// Returns an error if two migrations share an id or an id is blank.
    pub fn try_new(mut migrations: Vec<Box<dyn Migration>>) -> Result<Self, Error> {
        for migration in &migrations {
            let id = migration.id();
            if id.is_empty() {
                return Err(Error::InvalidRegistry(
                    "migration id must not be empty".to_string(),
                ));
            }
            if id.chars().any(char::is_whitespace) {
                return Err(Error::InvalidRegistry(format!(
                    "migration id '{id}' must not contain whitespace"
                )));
            }
        }

        migrations.sort_by(|a, b| a.id().cmp(b.id()));
        if let Some(pair) = migrations.windows(2).find(|pair| pair[0].id() == pair[1].id()) {
            return Err(Error::InvalidRegistry(format!(
                "duplicate migration id found: {}",
                pair[0].id()
            )));
        }

        Ok(Self {
            migrations,
            ledger_collection: None,
            deadline: Deadline::FromSettings,
            on_migration_start: None,
            on_migration_complete: None,
            on_migration_skipped: None,
            on_migration_error: None,
        })
    }

    /// Create a new Migrator, panicking if the registry is invalid.
    /// For a non-panicking version, use `try_new`.
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Self {
        match Self::try_new(migrations) {
            Ok(migrator) => migrator,
            Err(err) => panic!("{}", err),
        }
    }

    /// Use a ledger collection other than the one in [MigrationSettings::ledger_collection].
    pub fn with_ledger_collection(mut self, name: impl Into<String>) -> Self {
        self.ledger_collection = Some(name.into());
        self
    }

    /// Override the per-migration deadline from [MigrationSettings::migration_timeout_secs].
    /// `None` lets a migration run indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = Deadline::Fixed(timeout);
        self
    }

    /// Set a callback to be invoked when a migration starts.
    pub fn on_migration_start<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_migration_start = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked when a migration completes successfully.
    /// The callback receives the migration id and the duration of `apply`.
    pub fn on_migration_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.on_migration_complete = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked when a migration is skipped because the ledger already has it.
    pub fn on_migration_skipped<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_migration_skipped = Some(Box::new(callback));
        self
    }

    /// Set a callback to be invoked when a migration fails or exceeds its deadline.
    pub fn on_migration_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &Error) + Send + Sync + 'static,
    {
        self.on_migration_error = Some(Box::new(callback));
        self
    }

    /// All registered migrations, in application order.
    pub fn migrations(&self) -> &[Box<dyn Migration>] {
        &self.migrations
    }

    pub fn ledger_collection<'a>(&'a self, settings: &'a MigrationSettings) -> &'a str {
        self.ledger_collection
            .as_deref()
            .unwrap_or(&settings.ledger_collection)
    }

    fn timeout(&self, settings: &MigrationSettings) -> Option<Duration> {
        match self.deadline {
            Deadline::FromSettings => settings.migration_timeout(),
            Deadline::Fixed(timeout) => timeout,
        }
    }

    fn ledger<'a>(&'a self, app: &'a AppContext) -> Ledger<'a> {
        Ledger::new(app.store(), self.ledger_collection(app.settings()))
    }

    /// Get the history of all migrations recorded in the ledger, sorted by id.
    pub async fn history(&self, app: &AppContext) -> Result<Vec<LedgerEntry>, Error> {
        self.ledger(app).history().await
    }

    /// Preview which migrations [Migrator::run_all] would apply, in the order it would apply
    /// them, without running anything.
    pub async fn pending(&self, app: &AppContext) -> Result<Vec<&dyn Migration>, Error> {
        let applied = self.ledger(app).list_applied().await?;
        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(m.id()))
            .map(|m| m.as_ref())
            .collect())
    }

    /// State of every registered migration, in application order.
    pub async fn status(&self, app: &AppContext) -> Result<Vec<MigrationStatusLine>, Error> {
        let mut entries: BTreeMap<String, LedgerEntry> = self
            .history(app)
            .await?
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();

        Ok(self
            .migrations
            .iter()
            .map(|migration| {
                let entry = entries.remove(migration.id());
                MigrationStatusLine {
                    id: migration.id().to_string(),
                    description: migration.description().map(str::to_string),
                    state: if entry.is_some() {
                        MigrationState::Applied
                    } else {
                        MigrationState::Pending
                    },
                    requires: migration.requires(),
                    entry,
                }
            })
            .collect())
    }

    fn unknown_entries(&self, applied: &BTreeSet<String>) -> Vec<String> {
        applied
            .iter()
            .filter(|id| !self.migrations.iter().any(|m| m.id() == id.as_str()))
            .cloned()
            .collect()
    }

    /// Apply every pending migration in id order.
    ///
    /// Returns the first failure, wrapped in [Error::MigrationFailed] or
    /// [Error::DeadlineExceeded]; later migrations are not attempted. Callers are expected to
    /// abort startup on error.
    pub async fn run_all(&self, app: &AppContext) -> Result<MigrationReport, Error> {
        let ledger = self.ledger(app);
        let applied = ledger.list_applied().await?;
        let timeout = self.timeout(app.settings());

        info!(
            "[migrations] {} registered, {} recorded in '{}' (no lock taken)",
            self.migrations.len(),
            applied.len(),
            ledger.collection()
        );

        let mut report = MigrationReport {
            unknown: self.unknown_entries(&applied),
            ..Default::default()
        };
        for id in &report.unknown {
            warn!("[migrations] ledger entry {id} has no registered migration");
        }

        for migration in &self.migrations {
            let id = migration.id();

            if applied.contains(id) {
                info!("[migrations] skip {id}");
                if let Some(ref callback) = self.on_migration_skipped {
                    callback(id);
                }
                report.skipped.push(id.to_string());
                continue;
            }

            info!("[migrations] apply start {id}");
            if let Some(ref callback) = self.on_migration_start {
                callback(id);
            }

            let started = Instant::now();
            let ctx = MigrationContext::new(id, app, Utc::now());
            let apply = migration
                .apply(&ctx)
                .instrument(info_span!("migration", id = %id));
            let outcome = match timeout {
                Some(deadline) => match tokio::time::timeout(deadline, apply).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::DeadlineExceeded {
                        id: id.to_string(),
                        deadline,
                    }),
                },
                None => apply.await,
            };
            let elapsed = started.elapsed();
            let elapsed_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);

            // A migration counts as applied only once its ledger entry is written.
            let outcome = match outcome {
                Ok(()) => {
                    let entry = LedgerEntry {
                        id: id.to_string(),
                        applied_at: Utc::now(),
                        description: migration.description().map(str::to_string),
                        elapsed_ms: Some(elapsed_ms),
                    };
                    ledger.record_applied(&entry).await
                }
                Err(error) => Err(error),
            };

            if let Err(error) = outcome {
                let error = if matches!(error, Error::DeadlineExceeded { .. }) {
                    error
                } else {
                    Error::MigrationFailed {
                        id: id.to_string(),
                        source: Box::new(error),
                    }
                };
                error!(elapsed_ms, "[migrations] {id} failed: {}", error.root());
                if let Some(ref callback) = self.on_migration_error {
                    callback(id, &error);
                }
                return Err(error);
            }

            info!(elapsed_ms, "[migrations] applied {id}");
            if let Some(ref callback) = self.on_migration_complete {
                callback(id, elapsed);
            }
            report.applied.push(id.to_string());
        }

        info!("[migrations] all migrations up to date");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bson::doc;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::DocumentStore;

    /// Records every `apply` call into a shared journal; optionally fails or stalls.
    struct Scripted {
        id: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
        fail: bool,
        stall: Option<Duration>,
        records_itself: bool,
    }

    impl Scripted {
        fn new(id: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                id,
                journal: Arc::clone(journal),
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
                stall: None,
                records_itself: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn stalling(mut self, stall: Duration) -> Self {
            self.stall = Some(stall);
            self
        }

        /// Writes its own ledger entry while applying, as a concurrent instance would.
        fn recording_itself(mut self) -> Self {
            self.records_itself = true;
            self
        }
    }

    #[async_trait]
    impl Migration for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn description(&self) -> Option<&str> {
            Some("scripted")
        }

        async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.journal.lock().unwrap().push(ctx.id().to_string());
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            if self.fail {
                return Err(Error::Generic(format!("{} exploded", self.id)));
            }
            if self.records_itself {
                ctx.store()
                    .insert_one(
                        "migrations",
                        doc! { "_id": self.id, "appliedAt": bson::DateTime::now() },
                    )
                    .await?;
            }
            ctx.store()
                .update_one(
                    "scripted",
                    doc! { "_id": self.id },
                    doc! { "$set": { "seen": true } },
                    true,
                )
                .await?;
            Ok(())
        }
    }

    fn app() -> (Arc<MemoryStore>, AppContext) {
        let store = Arc::new(MemoryStore::new());
        let app = AppContext::new(store.clone(), MigrationSettings::default());
        (store, app)
    }

    fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn applies_in_lexicographic_order_regardless_of_registry_order() {
        let (_, app) = app();
        let journal = journal();
        let migrator = Migrator::new(vec![
            Box::new(Scripted::new("0002_x", &journal)),
            Box::new(Scripted::new("0001_y", &journal)),
        ]);

        let report = migrator.run_all(&app).await.unwrap();

        assert_eq!(*journal.lock().unwrap(), vec!["0001_y", "0002_x"]);
        assert_eq!(report.applied, vec!["0001_y", "0002_x"]);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn skips_migrations_already_in_the_ledger() {
        let (store, app) = app();
        store
            .insert_one(
                "migrations",
                LedgerEntry {
                    id: "0001_create_admin".to_string(),
                    applied_at: Utc::now(),
                    description: None,
                    elapsed_ms: None,
                }
                .to_document(),
            )
            .await
            .unwrap();

        let journal = journal();
        let admin = Scripted::new("0001_create_admin", &journal);
        let admin_calls = Arc::clone(&admin.calls);
        let migrator = Migrator::new(vec![
            Box::new(admin),
            Box::new(Scripted::new("0002_seed", &journal)),
        ]);

        let report = migrator.run_all(&app).await.unwrap();

        assert_eq!(admin_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped, vec!["0001_create_admin"]);
        assert_eq!(report.applied, vec!["0002_seed"]);
    }

    #[tokio::test]
    async fn second_run_applies_nothing_and_keeps_one_entry_per_migration() {
        let (store, app) = app();
        let journal = journal();
        let migrator = Migrator::new(vec![
            Box::new(Scripted::new("0001_a", &journal)),
            Box::new(Scripted::new("0002_b", &journal)),
        ]);

        migrator.run_all(&app).await.unwrap();
        let scripted_after_first = store.documents("scripted").await;
        let report = migrator.run_all(&app).await.unwrap();

        assert!(report.is_up_to_date());
        assert_eq!(report.skipped, vec!["0001_a", "0002_b"]);
        assert_eq!(store.documents("migrations").await.len(), 2);
        assert_eq!(store.documents("scripted").await, scripted_after_first);
        assert_eq!(journal.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failure_aborts_the_run_and_leaves_the_migration_pending() {
        let (_, app) = app();
        let journal = journal();
        let fourth = Scripted::new("0004", &journal);
        let fourth_calls = Arc::clone(&fourth.calls);
        let migrator = Migrator::new(vec![
            Box::new(Scripted::new("0001", &journal)),
            Box::new(Scripted::new("0002", &journal)),
            Box::new(Scripted::new("0003", &journal).failing()),
            Box::new(fourth),
        ]);

        let err = migrator.run_all(&app).await.unwrap_err();

        assert_eq!(err.migration_id(), Some("0003"));
        assert!(err.to_string().contains("0003 exploded"));
        assert_eq!(fourth_calls.load(Ordering::SeqCst), 0);
        let recorded: Vec<String> = migrator
            .history(&app)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(recorded, vec!["0001", "0002"]);

        let pending = migrator.pending(&app).await.unwrap();
        let pending: Vec<&str> = pending.iter().map(|m| m.id()).collect();
        assert_eq!(pending, vec!["0003", "0004"]);
    }

    #[tokio::test]
    async fn fixed_migration_is_retried_on_next_run() {
        let (_, app) = app();
        let journal = journal();
        let broken = Migrator::new(vec![
            Box::new(Scripted::new("0001", &journal)),
            Box::new(Scripted::new("0002", &journal).failing()),
        ]);
        assert!(broken.run_all(&app).await.is_err());

        let fixed = Migrator::new(vec![
            Box::new(Scripted::new("0001", &journal)),
            Box::new(Scripted::new("0002", &journal)),
        ]);
        let report = fixed.run_all(&app).await.unwrap();

        assert_eq!(report.skipped, vec!["0001"]);
        assert_eq!(report.applied, vec!["0002"]);
        assert_eq!(*journal.lock().unwrap(), vec!["0001", "0002", "0002"]);
    }

    #[tokio::test]
    async fn deadline_exceeded_names_the_migration() {
        let (_, app) = app();
        let journal = journal();
        let migrator = Migrator::new(vec![
            Box::new(Scripted::new("0001_slow", &journal).stalling(Duration::from_secs(30))),
            Box::new(Scripted::new("0002_next", &journal)),
        ])
        .with_timeout(Some(Duration::from_millis(20)));

        let err = migrator.run_all(&app).await.unwrap_err();

        assert!(matches!(err, Error::DeadlineExceeded { ref id, .. } if id == "0001_slow"));
        assert!(err
            .to_string()
            .starts_with("startup failed: migration 0001_slow exceeded deadline"));
        assert_eq!(*journal.lock().unwrap(), vec!["0001_slow"]);
        assert!(migrator.history(&app).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hooks_observe_each_transition() {
        let (store, app) = app();
        store
            .insert_one("migrations", doc! { "_id": "0001", "appliedAt": bson::DateTime::now() })
            .await
            .unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let journal = journal();

        let (start, complete, skipped, failed) = (
            Arc::clone(&events),
            Arc::clone(&events),
            Arc::clone(&events),
            Arc::clone(&events),
        );
        let migrator = Migrator::new(vec![
            Box::new(Scripted::new("0001", &journal)),
            Box::new(Scripted::new("0002", &journal)),
            Box::new(Scripted::new("0003", &journal).failing()),
        ])
        .on_migration_start(move |id| start.lock().unwrap().push(format!("start {id}")))
        .on_migration_complete(move |id, _| complete.lock().unwrap().push(format!("done {id}")))
        .on_migration_skipped(move |id| skipped.lock().unwrap().push(format!("skip {id}")))
        .on_migration_error(move |id, _| failed.lock().unwrap().push(format!("error {id}")));

        assert!(migrator.run_all(&app).await.is_err());
        assert_eq!(
            *events.lock().unwrap(),
            vec!["skip 0001", "start 0002", "done 0002", "start 0003", "error 0003"]
        );
    }

    #[tokio::test]
    async fn status_and_unknown_ledger_entries() {
        let (store, app) = app();
        store
            .insert_one(
                "migrations",
                doc! { "_id": "0000_renamed", "appliedAt": bson::DateTime::now() },
            )
            .await
            .unwrap();
        let journal = journal();
        let migrator = Migrator::new(vec![
            Box::new(Scripted::new("0001", &journal)),
            Box::new(Scripted::new("0002", &journal).failing()),
        ]);

        let _ = migrator.run_all(&app).await;
        let status = migrator.status(&app).await.unwrap();

        assert_eq!(status.len(), 2);
        assert_eq!(status[0].state, MigrationState::Applied);
        assert_eq!(
            status[0].entry.as_ref().and_then(|e| e.description.as_deref()),
            Some("scripted")
        );
        assert_eq!(status[1].state, MigrationState::Pending);
        assert!(status[1].entry.is_none());

        let report = Migrator::new(vec![Box::new(Scripted::new("0001", &journal))])
            .run_all(&app)
            .await
            .unwrap();
        assert_eq!(report.unknown, vec!["0000_renamed"]);
    }

    #[tokio::test]
    async fn custom_ledger_collection() {
        let (store, app) = app();
        let journal = journal();
        Migrator::new(vec![Box::new(Scripted::new("0001", &journal))])
            .with_ledger_collection("schema_history")
            .run_all(&app)
            .await
            .unwrap();
        assert_eq!(store.documents("schema_history").await.len(), 1);
        assert!(store.documents("migrations").await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_double_apply_is_caught_by_the_ledger() {
        let (store, app) = app();
        let journal = journal();
        let migrator = Migrator::new(vec![Box::new(Scripted::new("0001", &journal))]);
        migrator.run_all(&app).await.unwrap();

        // A second instance that read the ledger before our insert tries to record the same id.
        let ledger = Ledger::new(&*store, "migrations");
        let err = ledger
            .record_applied(&LedgerEntry {
                id: "0001".to_string(),
                applied_at: Utc::now(),
                description: None,
                elapsed_ms: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRecorded { .. }));
    }

    #[tokio::test]
    async fn ledger_write_failure_is_reported_as_a_migration_failure() {
        let (store, app) = app();
        let journal = journal();
        let events = Arc::new(Mutex::new(Vec::new()));
        let (complete, failed) = (Arc::clone(&events), Arc::clone(&events));
        let migrator = Migrator::new(vec![
            Box::new(Scripted::new("0001_race", &journal).recording_itself()),
            Box::new(Scripted::new("0002_next", &journal)),
        ])
        .on_migration_complete(move |id, _| complete.lock().unwrap().push(format!("done {id}")))
        .on_migration_error(move |id, _| failed.lock().unwrap().push(format!("error {id}")));

        let err = migrator.run_all(&app).await.unwrap_err();

        assert_eq!(err.migration_id(), Some("0001_race"));
        assert!(matches!(err.root(), Error::AlreadyRecorded { id } if id == "0001_race"));
        assert_eq!(*events.lock().unwrap(), vec!["error 0001_race"]);
        assert_eq!(*journal.lock().unwrap(), vec!["0001_race"]);
        assert_eq!(store.documents("migrations").await.len(), 1);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let journal = journal();
        let err = Migrator::try_new(vec![
            Box::new(Scripted::new("0001_a", &journal)),
            Box::new(Scripted::new("0001_a", &journal)),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid migration registry: duplicate migration id found: 0001_a"
        );
    }

    #[test]
    fn rejects_blank_ids() {
        let journal = journal();
        assert!(Migrator::try_new(vec![Box::new(Scripted::new("", &journal))]).is_err());
        assert!(Migrator::try_new(vec![Box::new(Scripted::new("0001 a", &journal))]).is_err());
    }

    #[test]
    #[should_panic(expected = "duplicate migration id")]
    fn new_panics_on_invalid_registry() {
        let journal = journal();
        Migrator::new(vec![
            Box::new(Scripted::new("0001", &journal)),
            Box::new(Scripted::new("0001", &journal)),
        ]);
    }
}
