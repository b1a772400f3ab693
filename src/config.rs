//! Engine configuration, layered from defaults, an optional file and
//! `WORKFLOW__*` environment variables.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::catalogue::Circuit;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalogue: CatalogueConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Directory of the sled database
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogueConfig {
    /// Circuit seeded at start-up
    pub circuit: Circuit,
    /// How long a catalogue snapshot is served before it is reloaded
    pub cache_ttl_secs: u64,
    /// Replace a different circuit already in the database instead of
    /// refusing to start
    #[serde(default)]
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// `tracing` filter directive, e.g. `info` or `request_workflow=debug`
    pub log_level: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/workflow.db"),
        }
    }
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            circuit: Circuit::Standard,
            cache_ttl_secs: 300,
            replace_existing: false,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl CatalogueConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl EngineConfig {
    /// Load configuration. A `.env` file is honoured when present; `file` is
    /// optional and may be missing on disk.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = EngineConfig::default();
        let mut builder = Config::builder()
            .set_default(
                "database.path",
                defaults.database.path.to_string_lossy().to_string(),
            )?
            .set_default("catalogue.circuit", "standard")?
            .set_default("catalogue.cache_ttl_secs", defaults.catalogue.cache_ttl_secs)?
            .set_default("catalogue.replace_existing", false)?
            .set_default("observability.log_level", defaults.observability.log_level)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .add_source(Environment::with_prefix("WORKFLOW").separator("__"))
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("invalid workflow configuration")
    }
}
