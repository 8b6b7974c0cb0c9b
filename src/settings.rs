use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

use crate::error::Result;

/// Connection settings for a [`UnitOfWorkFactory`](crate::UnitOfWorkFactory).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(rename = "database_url")]
    pub url: String,
    #[serde(rename = "database_max_connections", default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(
        rename = "database_acquire_timeout_secs",
        default = "default_acquire_timeout_secs"
    )]
    pub acquire_timeout_secs: u64,
    #[serde(rename = "database_bulk_copy", default = "default_bulk_copy")]
    pub bulk_copy: bool,
    #[serde(rename = "database_read_only", default)]
    pub read_only: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_bulk_copy() -> bool {
    true
}

impl DatabaseSettings {
    /// Settings for `url` with every other value at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            bulk_copy: default_bulk_copy(),
            read_only: false,
        }
    }

    /// Loads settings from `.env` and the environment, the latter winning.
    ///
    /// Reads `DATABASE_URL` (required), `DATABASE_MAX_CONNECTIONS`,
    /// `DATABASE_ACQUIRE_TIMEOUT_SECS`, `DATABASE_BULK_COPY` and
    /// `DATABASE_READ_ONLY`.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_environment(Environment::default().try_parsing(true))
    }

    pub(crate) fn from_environment(environment: Environment) -> Result<Self> {
        let settings = Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}
