use async_trait::async_trait;
use bson::doc;
use tracing::info;

use crate::core::{Migration, MigrationContext, Requirement};
use crate::error::Error;
use crate::seed::USERS;
use crate::store::{IndexSpec, UpsertOne};

/// Creates the bootstrap admin every seed row is owned by.
///
/// The email from the configuration is the natural key. Profile fields follow the configuration
/// on every run of this migration; the role, creation date and password hash are only written
/// when the account is created.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateAdmin;

#[async_trait]
impl Migration for CreateAdmin {
    fn id(&self) -> &str {
        "0001_create_admin"
    }

    fn description(&self) -> Option<&str> {
        Some("Create the bootstrap admin account and the unique email index")
    }

    fn requires(&self) -> &'static [Requirement] {
        &[Requirement::Setting("admin_email")]
    }

    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
        let settings = ctx.settings();
        settings.validate()?;

        ctx.store()
            .create_indexes(USERS, vec![IndexSpec::ascending(&["email"]).unique()])
            .await?;

        let email = settings.admin_email_key();
        let now = ctx.now_bson();
        let mut on_insert = doc! {
            "email": email.clone(),
            "role": "admin",
            "createdAt": now,
        };
        if let Some(hash) = &settings.admin_password_hash {
            on_insert.insert("passwordHash", hash.clone());
        }
        let set = doc! {
            "firstName": settings.admin_first_name.trim(),
            "lastName": settings.admin_last_name.trim(),
            "updatedAt": now,
        };
        let upsert = UpsertOne::split(doc! { "email": email.clone() }, on_insert, set);

        let outcome = ctx
            .store()
            .update_one(USERS, upsert.filter, upsert.update, true)
            .await?;
        if outcome.upserted_id.is_some() {
            info!("{}: created admin '{email}'", ctx.id());
        } else {
            info!("{}: admin '{email}' already exists, profile refreshed", ctx.id());
        }
        Ok(())
    }
}
