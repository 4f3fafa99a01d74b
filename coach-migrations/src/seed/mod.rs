//! Building blocks for seed migrations.
//!
//! A seed migration maintains reference data keyed by a natural key rather than by a generated
//! id. Every seed migration goes through the same steps inside `apply`:
//!
//! 1. [ensure_natural_key_indexes]: unique index on the natural key plus an `updatedAt` index.
//! 2. [resolve_owner]: look up the bootstrap admin, failing fast when it is missing.
//! 3. [SlugLookup]: resolve slugs of previously seeded collections into their `_id`s, failing
//!    fast on the first unknown slug. Resolve everything before writing anything.
//! 4. [SeedRow]: one upsert per row, `$setOnInsert` for identity and creation fields, `$set`
//!    for content and `updatedAt`.
//! 5. [write_seed_rows]: a single unordered bulk write.
//!
//! [seed_reference_collection] runs the whole sequence for flat labelled collections.

mod slug;

use std::collections::HashMap;

use bson::{doc, Bson, Document};
use tracing::{info, warn};

pub use slug::{normalize_key, slugify};

use crate::core::MigrationContext;
use crate::error::Error;
use crate::store::{BulkWriteSummary, IndexSpec, UpsertOne};

/// Collection holding user accounts, including the bootstrap admin.
pub const USERS: &str = "users";

/// Natural key shared by every localized reference collection.
pub const SLUG_LOCALE: &[&str] = &["slug", "locale"];

/// Fields a seed row writes only when it is first inserted.
const IDENTITY_FIELDS: &[&str] = &["_id", "slug", "locale", "createdBy", "createdAt"];

/// Fields [SeedRow::into_upsert] sets itself on every run.
const MANAGED_FIELDS: &[&str] = &["label", "updatedAt"];

/// Create the unique natural-key index and the `updatedAt` freshness index on `collection`.
pub async fn ensure_natural_key_indexes(
    ctx: &MigrationContext<'_>,
    collection: &str,
    key_fields: &[&str],
) -> Result<(), Error> {
    ctx.store()
        .create_indexes(
            collection,
            vec![
                IndexSpec::ascending(key_fields).unique(),
                IndexSpec::ascending(&["updatedAt"]),
            ],
        )
        .await?;
    info!(
        "{}: ensured indexes on '{collection}' ({})",
        ctx.id(),
        key_fields.join(", ")
    );
    Ok(())
}

/// `_id` of the bootstrap admin, found by its normalized email.
pub async fn resolve_owner(ctx: &MigrationContext<'_>) -> Result<Bson, Error> {
    let email = ctx.settings().admin_email_key();
    let admin = ctx
        .store()
        .find_one(USERS, doc! { "email": email.clone() })
        .await?;
    match admin.and_then(|admin| admin.get("_id").cloned()) {
        Some(id) => Ok(id),
        None => Err(Error::OwnerNotFound { email }),
    }
}

/// In-memory `slug -> _id` index of one collection in one locale.
#[derive(Debug, Clone)]
pub struct SlugLookup {
    collection: String,
    locale: String,
    ids: HashMap<String, Bson>,
}

impl SlugLookup {
    /// Batch-read `collection` for `locale`, keeping only `_id` and `slug`.
    pub async fn load(
        ctx: &MigrationContext<'_>,
        collection: &str,
        locale: &str,
    ) -> Result<Self, Error> {
        let locale = normalize_key(locale);
        let documents = ctx
            .store()
            .find(
                collection,
                doc! { "locale": locale.clone() },
                Some(doc! { "_id": 1, "slug": 1 }),
            )
            .await?;

        let mut ids = HashMap::with_capacity(documents.len());
        for document in &documents {
            let slug = document.get_str("slug")?;
            let id = document.get("_id").cloned().ok_or_else(|| {
                Error::Store(format!("'{collection}' row '{slug}' has no _id"))
            })?;
            ids.insert(slug.to_string(), id);
        }

        Ok(Self {
            collection: collection.to_string(),
            locale,
            ids,
        })
    }

    /// `_id` of the row with `slug`. `role` names what the slug is used as in the error
    /// ("category", "primary muscle", ...).
    pub fn require(&self, slug: &str, role: &str) -> Result<Bson, Error> {
        let key = normalize_key(slug);
        match self.ids.get(&key) {
            Some(id) => Ok(id.clone()),
            None => Err(Error::MissingDependency {
                role: role.to_string(),
                slug: key,
                collection: self.collection.clone(),
                locale: self.locale.clone(),
            }),
        }
    }

    /// Resolve every slug in order, failing on the first unknown one.
    pub fn require_all(&self, slugs: &[&str], role: &str) -> Result<Vec<Bson>, Error> {
        slugs.iter().map(|slug| self.require(slug, role)).collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A labelled reference entry: one canonical label the slug is derived from, a display label
/// per locale, and locale-independent attributes.
///
/// The slug is shared by every locale so that references between collections do not depend on
/// the locale being seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSeed {
    pub canonical: &'static str,
    pub labels: &'static [(&'static str, &'static str)],
    pub attributes: &'static [(&'static str, &'static str)],
}

impl ReferenceSeed {
    pub const fn new(
        canonical: &'static str,
        labels: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            canonical,
            labels,
            attributes: &[],
        }
    }

    pub const fn with_attributes(
        mut self,
        attributes: &'static [(&'static str, &'static str)],
    ) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn slug(&self) -> String {
        slugify(self.canonical)
    }

    /// Display label for `locale`, if this seed has one.
    pub fn label(&self, locale: &str) -> Option<&'static str> {
        self.labels
            .iter()
            .find(|(l, _)| normalize_key(l) == locale)
            .map(|(_, label)| *label)
    }

    /// Rows for every locale in `locales` this seed has a label for.
    pub fn rows(&self, locales: &[String]) -> Vec<SeedRow> {
        let slug = self.slug();
        locales
            .iter()
            .filter_map(|locale| {
                self.label(locale).map(|label| {
                    let mut row = SeedRow::new(&slug, locale, label);
                    for (field, value) in self.attributes {
                        row = row.with(field, *value);
                    }
                    row
                })
            })
            .collect()
    }
}

/// One reference row keyed by `(slug, locale)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRow {
    slug: String,
    locale: String,
    label: String,
    content: Document,
}

impl SeedRow {
    pub fn new(slug: &str, locale: &str, label: &str) -> Self {
        Self {
            slug: normalize_key(slug),
            locale: normalize_key(locale),
            label: label.trim().to_string(),
            content: Document::new(),
        }
    }

    /// Add a mutable content field. Identity fields (`slug`, `locale`, `createdBy`,
    /// `createdAt`, `_id`) are ignored here: they are fixed at insertion. `label` and `updatedAt`
    /// are ignored too; pass the label to [SeedRow::new].
    pub fn with(mut self, field: &str, value: impl Into<Bson>) -> Self {
        if !IDENTITY_FIELDS.contains(&field) && !MANAGED_FIELDS.contains(&field) {
            self.content.insert(field, value);
        }
        self
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn content(&self) -> &Document {
        &self.content
    }

    /// The upsert for this row: identity and creation fields only on insert, label, content and
    /// `updatedAt` on every run.
    pub fn into_upsert(self, owner: &Bson, now: bson::DateTime) -> UpsertOne {
        let filter = doc! { "slug": self.slug.clone(), "locale": self.locale.clone() };
        let on_insert = doc! {
            "slug": self.slug,
            "locale": self.locale,
            "createdBy": owner.clone(),
            "createdAt": now,
        };
        let mut set = doc! { "label": self.label };
        for (field, value) in self.content {
            set.insert(field, value);
        }
        set.insert("updatedAt", now);
        UpsertOne::split(filter, on_insert, set)
    }
}

/// Upsert `rows` into `collection` as one unordered bulk write owned by `owner`.
///
/// All rows are attempted. If any failed, the batch is reported as [Error::BulkWrite] after the
/// successful rows have been written.
pub async fn write_seed_rows(
    ctx: &MigrationContext<'_>,
    collection: &str,
    rows: Vec<SeedRow>,
    owner: &Bson,
) -> Result<BulkWriteSummary, Error> {
    if rows.is_empty() {
        info!("{}: {collection} has nothing to seed", ctx.id());
        return Ok(BulkWriteSummary::default());
    }

    let now = ctx.now_bson();
    let operations = rows
        .into_iter()
        .map(|row| row.into_upsert(owner, now))
        .collect();
    let summary = ctx.store().bulk_upsert(collection, operations).await?;

    info!(
        "{}: {collection} upserted={} modified={} matched={}",
        ctx.id(),
        summary.upserted,
        summary.modified,
        summary.matched
    );

    if !summary.is_clean() {
        for (position, message) in &summary.failures {
            warn!("{}: {collection} row #{position} failed: {message}", ctx.id());
        }
        return Err(Error::BulkWrite {
            collection: collection.to_string(),
            failures: summary
                .failures
                .iter()
                .map(|(position, message)| format!("#{position}: {message}"))
                .collect(),
        });
    }
    Ok(summary)
}

/// Seed a flat, labelled reference collection keyed by `(slug, locale)`.
pub async fn seed_reference_collection(
    ctx: &MigrationContext<'_>,
    collection: &str,
    seeds: &[ReferenceSeed],
) -> Result<BulkWriteSummary, Error> {
    ensure_natural_key_indexes(ctx, collection, SLUG_LOCALE).await?;
    let owner = resolve_owner(ctx).await?;
    let locales = ctx.settings().locale_keys();
    let rows = seeds.iter().flat_map(|seed| seed.rows(&locales)).collect();
    write_seed_rows(ctx, collection, rows, &owner).await
}
