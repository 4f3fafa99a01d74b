use std::time::Duration;

/// Error type for the coach-migrations crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The registry handed to the migrator is malformed (empty or duplicate ids).
    #[error("invalid migration registry: {0}")]
    InvalidRegistry(String),

    /// A seed references a natural key that an earlier migration should have produced.
    #[error("Missing {role} with slug '{slug}' in '{collection}' (locale {locale})")]
    MissingDependency {
        role: String,
        slug: String,
        collection: String,
        locale: String,
    },

    /// The bootstrap admin account has not been created yet.
    #[error("Admin user not found (email '{email}')")]
    OwnerNotFound { email: String },

    #[error("duplicate key in '{collection}': {key}")]
    DuplicateKey { collection: String, key: String },

    /// A ledger entry for this id already exists; the runner never overwrites one.
    #[error("migration '{id}' is already recorded in the ledger")]
    AlreadyRecorded { id: String },

    /// An unordered bulk write completed, but some of its operations failed.
    #[error("bulk write on '{collection}' had {} failed operation(s): {}", failures.len(), failures.join("; "))]
    BulkWrite {
        collection: String,
        failures: Vec<String>,
    },

    #[error("startup failed: migration {id} exceeded deadline of {}s", deadline.as_secs_f64())]
    DeadlineExceeded { id: String, deadline: Duration },

    #[error("migration {id} failed: {source}")]
    MigrationFailed {
        id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    /// A document did not have the shape the engine expects, or a backend invariant broke.
    #[error("store error: {0}")]
    Store(String),

    #[cfg(feature = "mongodb")]
    #[error("{0}")]
    Mongo(mongodb::error::Error),

    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// The underlying error when this is a runner-level wrapper, otherwise `self`.
    pub fn root(&self) -> &Error {
        match self {
            Self::MigrationFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Id of the migration this error is attributed to, if any.
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::MigrationFailed { id, .. } | Self::DeadlineExceeded { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for Error {
    fn from(value: mongodb::error::Error) -> Self {
        Self::Mongo(value)
    }
}

impl From<bson::de::Error> for Error {
    fn from(value: bson::de::Error) -> Self {
        Self::Store(value.to_string())
    }
}

impl From<bson::document::ValueAccessError> for Error {
    fn from(value: bson::document::ValueAccessError) -> Self {
        Self::Store(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Self::Generic(value)
    }
}
