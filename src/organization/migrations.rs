//! Schema versioning for the organization settings database.
//!
//! Forward-only migrations tracked in `schema_versions`.

use crate::error::{Result, RunnerError};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const CURRENT_VERSION: i32 = 1;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(RunnerError::persistence(format!(
            "Database schema version ({current}) is newer than supported version ({CURRENT_VERSION})"
        )));
    }

    if current < CURRENT_VERSION {
        info!(
            "Migrating settings database from version {} to {}",
            current, CURRENT_VERSION
        );
        for version in (current + 1)..=CURRENT_VERSION {
            run_migration(pool, version).await?;
            record_version(pool, version).await?;
            info!("Applied migration v{}", version);
        }
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RunnerError::persistence(format!("Failed to create schema_versions table: {e}")))?;

    Ok(())
}

/// Gets the current schema version, 0 for a fresh database.
pub async fn current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| RunnerError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        _ => Err(RunnerError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: organizations with a JSON settings blob.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            settings TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RunnerError::persistence(format!("Failed to create organizations table: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_is_migrated() {
        let pool = memory_pool().await;
        ensure_schema_versions_table(&pool).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), 0);

        run_migrations(&pool).await.unwrap();
        assert_eq!(current_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let versions: Vec<(i32,)> = sqlx::query_as("SELECT version FROM schema_versions")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(versions.len(), CURRENT_VERSION as usize);
    }

    #[tokio::test]
    async fn test_newer_database_is_rejected() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        record_version(&pool, CURRENT_VERSION + 1).await.unwrap();

        let err = run_migrations(&pool).await.unwrap_err();
        assert!(matches!(err, RunnerError::Persistence(_)));
    }
}
