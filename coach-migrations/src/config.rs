use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::seed::normalize_key;

pub const DEFAULT_LEDGER_COLLECTION: &str = "migrations";

fn default_admin_email() -> String {
    "admin@example.com".to_string()
}

fn default_admin_first_name() -> String {
    "Admin".to_string()
}

fn default_admin_last_name() -> String {
    "Coach".to_string()
}

fn default_locales() -> Vec<String> {
    vec!["fr".to_string(), "en".to_string()]
}

fn default_ledger_collection() -> String {
    DEFAULT_LEDGER_COLLECTION.to_string()
}

fn default_migration_timeout_secs() -> u64 {
    300
}

/// Environment-specific values handed unchanged to every migration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MigrationSettings {
    /// Natural key of the bootstrap admin account.
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_admin_first_name")]
    pub admin_first_name: String,
    #[serde(default = "default_admin_last_name")]
    pub admin_last_name: String,
    /// Pre-computed password hash, written only when the admin is first created.
    #[serde(default)]
    pub admin_password_hash: Option<String>,
    /// Locales reference data is seeded in.
    #[serde(default = "default_locales")]
    pub locales: Vec<String>,
    #[serde(default = "default_ledger_collection")]
    pub ledger_collection: String,
    /// Per-migration deadline in seconds. `0` disables the deadline.
    #[serde(default = "default_migration_timeout_secs")]
    pub migration_timeout_secs: u64,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            admin_email: default_admin_email(),
            admin_first_name: default_admin_first_name(),
            admin_last_name: default_admin_last_name(),
            admin_password_hash: None,
            locales: default_locales(),
            ledger_collection: default_ledger_collection(),
            migration_timeout_secs: default_migration_timeout_secs(),
        }
    }
}

impl MigrationSettings {
    /// The admin email as stored and queried: trimmed and lower-cased.
    pub fn admin_email_key(&self) -> String {
        normalize_key(&self.admin_email)
    }

    /// Configured locales, normalized and de-duplicated, in configuration order.
    pub fn locale_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::with_capacity(self.locales.len());
        for locale in &self.locales {
            let key = normalize_key(locale);
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn migration_timeout(&self) -> Option<Duration> {
        match self.migration_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Reject settings no migration could run with.
    pub fn validate(&self) -> Result<(), Error> {
        let email = self.admin_email_key();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::Config(format!(
                "admin_email must be an email address, got '{}'",
                self.admin_email
            )));
        }
        if self.locale_keys().is_empty() {
            return Err(Error::Config("at least one locale must be configured".to_string()));
        }
        if self.ledger_collection.trim().is_empty() {
            return Err(Error::Config("ledger_collection must not be empty".to_string()));
        }
        Ok(())
    }
}
