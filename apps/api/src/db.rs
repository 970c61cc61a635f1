use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

/// Creates the SQLite connection pool and applies pending migrations.
///
/// SQLite allows one writer at a time; `busy_timeout` makes a contended writer
/// wait up to that long for the lock instead of failing immediately.
pub async fn create_pool(database_url: &str, busy_timeout: Duration) -> Result<SqlitePool> {
    info!("Opening SQLite ledger at {database_url}...");

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid DATABASE_URL '{database_url}'"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(busy_timeout + Duration::from_secs(5))
        .connect_with(options)
        .await
        .context("Failed to open SQLite ledger")?;

    migrate(&pool).await?;

    info!("SQLite ledger ready");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run ledger migrations")?;
    Ok(())
}

/// Single-connection in-memory ledger for tests. The connection is never
/// recycled, otherwise the database would vanish with it.
#[cfg(test)]
pub async fn in_memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .test_before_acquire(false)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
