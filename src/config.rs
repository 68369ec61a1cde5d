//! Application configuration.
//!
//! Loads named data sources from a TOML file. Each `[sources.<name>]` table
//! carries the connector `type` plus that connector's settings:
//!
//! ```toml
//! state_db = "/var/lib/query-runners/state.db"
//!
//! [sources.warehouse]
//! type = "azure_trino"
//! host = "cluster.trino.azurehdinsight.net"
//! catalog = "hive"
//! use_msi = true
//!
//! [sources.app]
//! type = "pg"
//! host = "localhost"
//! dbname = "app"
//! password = "${APP_DB_PASSWORD}"
//! port = "${APP_DB_PORT}"
//! ```
//!
//! String values of the form `${VAR}` are read from the environment when the
//! source is used. Expanded values are strings; boolean and number settings
//! accept them when they spell a valid value.

use crate::error::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Path of the organization settings database.
    pub state_db: Option<PathBuf>,

    /// Named data sources.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

/// A named data source: a connector type and its raw settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub source_type: String,

    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Settings may hold secrets; only their names are shown.
        f.debug_struct("SourceConfig")
            .field("source_type", &self.source_type)
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SourceConfig {
    /// Settings with `${VAR}` references replaced by environment values.
    pub fn resolved_settings(&self) -> Result<Map<String, Value>> {
        self.settings
            .iter()
            .map(|(key, value)| Ok((key.clone(), expand_env(key, value)?)))
            .collect()
    }
}

fn expand_env(key: &str, value: &Value) -> Result<Value> {
    let Some(var) = value
        .as_str()
        .and_then(|s| s.strip_prefix("${"))
        .and_then(|s| s.strip_suffix('}'))
    else {
        return Ok(value.clone());
    };

    std::env::var(var).map(Value::String).map_err(|_| {
        RunnerError::config(format!(
            "Setting '{key}' refers to environment variable {var}, which is not set"
        ))
    })
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("query-runners")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file is an empty config.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RunnerError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            RunnerError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named source.
    pub fn get_source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .get(name)
            .ok_or_else(|| RunnerError::config(format!("Unknown data source '{name}'")))
    }
}
