//! Organization settings store.
//!
//! Organizations live in a local SQLite database with a flat, string-keyed
//! JSON settings mapping. The list-valued login settings (allowed Google Apps
//! and Azure domains, allowed Azure roles) are edited as comma separated text.

mod migrations;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, RunnerError};

/// A list-valued organization setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ListSetting {
    GoogleAppsDomains,
    AzureAppsDomains,
    AzureRoles,
}

impl ListSetting {
    pub const ALL: [ListSetting; 3] = [
        Self::GoogleAppsDomains,
        Self::AzureAppsDomains,
        Self::AzureRoles,
    ];

    /// Key in the settings mapping.
    pub fn key(&self) -> &'static str {
        match self {
            Self::GoogleAppsDomains => "google_apps_domains",
            Self::AzureAppsDomains => "auth_azure_apps_domains",
            Self::AzureRoles => "auth_azure_roles",
        }
    }

    /// Human readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::GoogleAppsDomains => "Google Apps domains",
            Self::AzureAppsDomains => "Azure Apps domains",
            Self::AzureRoles => "Azure roles",
        }
    }
}

impl fmt::Display for ListSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Splits comma separated text, trimming items and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Joins list items for display.
pub fn join_list(items: &[String]) -> String {
    items.join(", ")
}

/// An organization record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub settings: Map<String, Value>,
}

impl Organization {
    /// Values of a list setting; missing or malformed settings read as empty.
    pub fn list_setting(&self, setting: ListSetting) -> Vec<String> {
        match self.settings.get(setting.key()) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// SQLite-backed organization store.
pub struct OrgStore {
    pool: SqlitePool,
}

impl OrgStore {
    /// Returns the default database path for the current platform.
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| RunnerError::persistence("Could not determine data directory"))?;
        Ok(data_dir.join("query-runners").join("state.db"))
    }

    /// Opens or creates the database at `path` and applies migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RunnerError::persistence(format!(
                    "Failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| RunnerError::persistence(format!("Invalid database path: {e}")))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to open settings database: {e}")))?;

        migrations::run_migrations(&pool).await?;
        info!("Settings database opened at {}", path.display());

        Ok(Self { pool })
    }

    /// Creates an organization with empty settings.
    pub async fn create(&self, name: &str, slug: &str) -> Result<Organization> {
        let name = name.trim();
        let slug = slug.trim();
        if name.is_empty() || slug.is_empty() {
            return Err(RunnerError::config("Organization name and slug are required"));
        }

        let result = sqlx::query("INSERT INTO organizations (name, slug) VALUES (?, ?)")
            .bind(name)
            .bind(slug)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    RunnerError::persistence(format!("Organization '{slug}' already exists"))
                }
                e => RunnerError::persistence(format!("Failed to create organization: {e}")),
            })?;

        debug!("Created organization {}", slug);

        Ok(Organization {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            slug: slug.to_string(),
            settings: Map::new(),
        })
    }

    /// All organizations ordered by name.
    pub async fn list(&self) -> Result<Vec<Organization>> {
        let rows = sqlx::query("SELECT id, name, slug, settings FROM organizations ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to list organizations: {e}")))?;

        rows.iter().map(row_to_org).collect()
    }

    /// The default organization: the one created first.
    pub async fn first(&self) -> Result<Organization> {
        let row = sqlx::query("SELECT id, name, slug, settings FROM organizations ORDER BY id LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RunnerError::persistence(format!("Failed to load organization: {e}")))?;

        match row {
            Some(row) => row_to_org(&row),
            None => Err(RunnerError::persistence("No organization exists")),
        }
    }

    /// Replaces a list setting on the default organization from comma
    /// separated text, returning the stored list.
    pub async fn set_list_setting(&self, setting: ListSetting, raw: &str) -> Result<Vec<String>> {
        let mut org = self.first().await?;
        let items = split_list(raw);

        org.settings.insert(
            setting.key().to_string(),
            Value::Array(items.iter().cloned().map(Value::String).collect()),
        );
        let settings = serde_json::to_string(&org.settings)
            .map_err(|e| RunnerError::internal(format!("Failed to encode settings: {e}")))?;

        sqlx::query(
            "UPDATE organizations SET settings = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(settings)
        .bind(org.id)
        .execute(&self.pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to update organization: {e}")))?;

        info!("Updated {} for {}", setting, org.slug);
        Ok(items)
    }

    /// Reads a list setting of the default organization, joined for display.
    pub async fn show_list_setting(&self, setting: ListSetting) -> Result<String> {
        let org = self.first().await?;
        Ok(join_list(&org.list_setting(setting)))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_org(row: &sqlx::sqlite::SqliteRow) -> Result<Organization> {
    let settings: String = row.get("settings");
    let settings: Map<String, Value> = serde_json::from_str(&settings).map_err(|e| {
        RunnerError::persistence(format!("Corrupt organization settings: {e}"))
    })?;

    Ok(Organization {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        settings,
    })
}
