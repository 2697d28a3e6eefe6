//! SQLite pool bootstrap and schema migration.

use std::path::Path;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Schema applied on every open. Statements are idempotent.
const SCHEMA_SQL: &str = include_str!("../migrations/001_schema.sql");

/// Open (creating if needed) the inbox database at `path` and apply the schema.
///
/// WAL mode lets several service instances share the file; `foreign_keys`
/// is required for the message cascade on thread deletion.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, the database
/// cannot be opened, or the migration fails.
pub async fn open(path: &Path, max_connections: u32) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .pragma("trusted_schema", "OFF")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open inbox db at {}", path.display()))?;

    migrate(&pool).await?;
    info!(path = %path.display(), "inbox database ready");
    Ok(pool)
}

/// Open a private in-memory database with the schema applied.
///
/// Limited to one connection that is never recycled: every SQLite
/// `:memory:` connection is a separate database.
///
/// # Errors
///
/// Returns an error if the pool cannot connect or the migration fails.
pub async fn open_in_memory() -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("failed to open in-memory inbox db")?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Apply the schema to an existing pool.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .context("failed to apply inbox schema migration")?;
    Ok(())
}
