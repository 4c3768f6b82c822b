//! Database initialization
//!
//! Opens (or creates) the SQLite database, applies connection pragmas,
//! creates every table idempotently and seeds default settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        // Pragmas are per connection; apply them to every pooled connection.
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL: readers see the last committed state while a splice is in flight
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;

    create_playlists_table(pool).await?;
    create_widgets_table(pool).await?;
    create_playlist_items_table(pool).await?;
    create_widget_configs_table(pool).await?;
    create_playlist_references_table(pool).await?;

    create_medias_table(pool).await?;
    create_integration_tables(pool).await?;
    create_quotas_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores engine tuning key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_playlists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlists (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            name TEXT NOT NULL,
            inserted_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_playlists_organization ON playlists(organization_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_widgets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS widgets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            description TEXT,
            template TEXT NOT NULL DEFAULT '{}',
            options_schema TEXT NOT NULL DEFAULT '{}',
            data_schema TEXT NOT NULL DEFAULT '{}',
            integration TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the playlist_items table
///
/// Order is carried only by the prev/next pointers. Both pointer columns are
/// deferred foreign keys: a splice passes through states where a pointer
/// names a row that is rewritten later in the same transaction.
async fn create_playlist_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlist_items (
            id TEXT PRIMARY KEY,
            playlist_id TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
            prev_item_id TEXT REFERENCES playlist_items(id) DEFERRABLE INITIALLY DEFERRED,
            next_item_id TEXT REFERENCES playlist_items(id) DEFERRABLE INITIALLY DEFERRED,
            "offset" INTEGER NOT NULL DEFAULT 0,
            duration INTEGER NOT NULL DEFAULT 0,
            inserted_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            CHECK (prev_item_id IS NULL OR prev_item_id <> id),
            CHECK (next_item_id IS NULL OR next_item_id <> id),
            CHECK (duration >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_playlist_items_playlist ON playlist_items(playlist_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_widget_configs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS widget_configs (
            id TEXT PRIMARY KEY,
            widget_id TEXT NOT NULL REFERENCES widgets(id),
            playlist_item_id TEXT NOT NULL UNIQUE REFERENCES playlist_items(id) ON DELETE CASCADE,
            options TEXT NOT NULL DEFAULT '{}',
            data TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL DEFAULT 1,
            last_request_at TIMESTAMP,
            inserted_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            CHECK (version > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the playlist_references table
///
/// One row per playlist a widget config embeds. The child side has no
/// cascade: a referenced playlist cannot be deleted out from under a layout.
async fn create_playlist_references_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlist_references (
            playlist_item_id TEXT NOT NULL REFERENCES playlist_items(id) ON DELETE CASCADE,
            parent_playlist_id TEXT NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
            child_playlist_id TEXT NOT NULL REFERENCES playlists(id),
            PRIMARY KEY (playlist_item_id, child_playlist_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_playlist_references_child ON playlist_references(child_playlist_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_medias_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS medias (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            name TEXT NOT NULL,
            mimetype TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ready',
            inserted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_files (
            media_id TEXT NOT NULL REFERENCES medias(id) ON DELETE CASCADE,
            context TEXT NOT NULL,
            uri TEXT NOT NULL,
            size INTEGER,
            mimetype TEXT,
            PRIMARY KEY (media_id, context),
            CHECK (size IS NULL OR size >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create integration cache and credential tables
///
/// Each cached payload lives at exactly one scope; the partial unique
/// indexes keep one row per cache key.
async fn create_integration_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS integration_data (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            integration_id TEXT NOT NULL,
            scope TEXT NOT NULL CHECK (scope IN ('widget_config', 'discriminator', 'organization')),
            widget_config_id TEXT REFERENCES widget_configs(id) ON DELETE CASCADE,
            discriminator_id TEXT,
            data TEXT NOT NULL,
            fetched_at TIMESTAMP NOT NULL,
            CHECK (scope <> 'widget_config' OR widget_config_id IS NOT NULL),
            CHECK (scope <> 'discriminator' OR discriminator_id IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_integration_data_config \
         ON integration_data(widget_config_id) WHERE scope = 'widget_config'",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_integration_data_discriminator \
         ON integration_data(organization_id, integration_id, discriminator_id) WHERE scope = 'discriminator'",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_integration_data_organization \
         ON integration_data(organization_id, integration_id) WHERE scope = 'organization'",
    ];
    for sql in indexes {
        sqlx::query(sql).execute(pool).await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS integration_credentials (
            organization_id TEXT NOT NULL,
            integration_id TEXT NOT NULL,
            credentials TEXT NOT NULL,
            PRIMARY KEY (organization_id, integration_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_quotas_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quotas (
            organization_id TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            max INTEGER NOT NULL CHECK (max >= 0),
            PRIMARY KEY (organization_id, resource_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values and resets NULL
/// values to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "integration_fetch_timeout_ms", "5000").await?;
    ensure_setting(pool, "db_max_lock_wait_ms", "5000").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset to the default.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    // INSERT OR IGNORE: concurrent initializers may race past an EXISTS check
    let inserted = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?
        .rows_affected();

    if inserted > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let reset = sqlx::query("UPDATE settings SET value = ? WHERE key = ? AND value IS NULL")
        .bind(default_value)
        .bind(key)
        .execute(pool)
        .await?
        .rows_affected();

    if reset > 0 {
        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}
