//! Settings database operations
//!
//! Key-value accessors over the `settings` table. Values stored there
//! override the file-based [`EngineConfig`] defaults at startup.

use sqlx::{Pool, Sqlite};
use tracing::debug;

use plx_common::config::EngineConfig;

use crate::error::{Error, Result};

/// Get the on-demand integration fetch timeout
///
/// **Default:** None (caller keeps its configured value)
pub async fn get_fetch_timeout_ms(db: &Pool<Sqlite>) -> Result<Option<u64>> {
    get_setting::<u64>(db, "integration_fetch_timeout_ms").await
}

/// Get the maximum total wait for a mutation retrying on lock contention
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<Option<u64>> {
    get_setting::<u64>(db, "db_max_lock_wait_ms").await
}

/// Apply database-backed overrides to a loaded configuration
pub async fn apply_overrides(db: &Pool<Sqlite>, config: &mut EngineConfig) -> Result<()> {
    if let Some(timeout_ms) = get_fetch_timeout_ms(db).await? {
        if timeout_ms > 0 {
            config.fetch_timeout_ms = timeout_ms;
        }
    }
    if let Some(wait_ms) = get_max_lock_wait_ms(db).await? {
        config.db_max_lock_wait_ms = wait_ms;
    }

    debug!(
        fetch_timeout_ms = config.fetch_timeout_ms,
        db_max_lock_wait_ms = config.db_max_lock_wait_ms,
        "Applied settings overrides"
    );
    Ok(())
}

/// Set a setting value
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: ToString,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match row {
        Some((Some(value),)) => {
            let parsed = value.parse::<T>().map_err(|e| {
                Error::Common(plx_common::Error::Config(format!(
                    "Parse setting '{}' failed: {}",
                    key, e
                )))
            })?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}
