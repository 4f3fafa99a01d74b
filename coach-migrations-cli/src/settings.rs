use std::path::{Path, PathBuf};

use coach_migrations::MigrationSettings;
use config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "coach-migrate.toml";

fn default_database_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database_name() -> String {
    "coaching".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_uri")]
    pub uri: String,
    #[serde(default = "default_database_name")]
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: default_database_uri(),
            name: default_database_name(),
        }
    }
}

/// Everything the runner binary reads at boot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub migrations: MigrationSettings,
}

/// Layer the optional config file and `COACH_*` environment variables over the defaults.
///
/// Environment keys use `__` between sections, e.g. `COACH_DATABASE__URI` or
/// `COACH_MIGRATIONS__LOCALES=fr,en`.
pub fn load(path: Option<&Path>) -> Result<RunnerConfig, String> {
    load_from(path, Environment::with_prefix("COACH"))
}

fn load_from(path: Option<&Path>, environment: Environment) -> Result<RunnerConfig, String> {
    let mut builder = Config::builder();
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(format!("config file {} does not exist", path.display()));
            }
            builder = builder.add_source(File::from(path));
        }
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path));
            }
        }
    }
    builder = builder.add_source(
        environment
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("migrations.locales")
            .try_parsing(true),
    );

    let config: RunnerConfig = builder
        .build()
        .map_err(|e| format!("config build error: {e}"))?
        .try_deserialize()
        .map_err(|e| format!("config deserialize error: {e}"))?;
    config
        .migrations
        .validate()
        .map_err(|e| e.to_string())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("COACH").source(Some(source))
    }

    #[test]
    fn defaults_without_file_or_environment() {
        let config = load_from(None, env(&[])).unwrap();
        assert_eq!(config.database.uri, "mongodb://localhost:27017");
        assert_eq!(config.migrations, MigrationSettings::default());
    }

    #[test]
    fn environment_overrides_nested_keys() {
        let config = load_from(
            None,
            env(&[
                ("COACH_DATABASE__NAME", "coaching_staging"),
                ("COACH_MIGRATIONS__ADMIN_EMAIL", "ops@coach.example"),
                ("COACH_MIGRATIONS__LOCALES", "fr,en,de"),
                ("COACH_MIGRATIONS__MIGRATION_TIMEOUT_SECS", "30"),
            ]),
        )
        .unwrap();
        assert_eq!(config.database.name, "coaching_staging");
        assert_eq!(config.migrations.admin_email, "ops@coach.example");
        assert_eq!(config.migrations.locales, vec!["fr", "en", "de"]);
        assert_eq!(config.migrations.migration_timeout_secs, 30);
    }

    #[test]
    fn file_then_environment() {
        let mut file = tempfile_path("file_then_environment");
        writeln!(
            file.1,
            "[database]\nname = \"from_file\"\n\n[migrations]\nledger_collection = \"schema_history\""
        )
        .unwrap();
        let config = load_from(Some(file.0.as_path()), env(&[("COACH_DATABASE__NAME", "from_env")])).unwrap();
        assert_eq!(config.database.name, "from_env");
        assert_eq!(config.migrations.ledger_collection, "schema_history");
        std::fs::remove_file(&file.0).unwrap();
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let err = load_from(None, env(&[("COACH_MIGRATIONS__ADMIN_EMAIL", "nobody")])).unwrap_err();
        assert!(err.contains("admin_email"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(load_from(Some(Path::new("/nonexistent/coach-migrate.toml")), env(&[])).is_err());
    }

    fn tempfile_path(name: &str) -> (PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!(
            "coach-migrate-{name}-{}.toml",
            std::process::id()
        ));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
