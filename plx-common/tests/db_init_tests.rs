//! Tests for database initialization
//!
//! Covers first-run creation, reopening an existing database, default
//! settings and the constraints the linked-list engine relies on.

use plx_common::db::init::{ensure_setting, init_database, SCHEMA_VERSION};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("plx.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("plx.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(versions, 1, "schema version must be recorded once");
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("plx.db")).await.unwrap();

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("plx.db")).await.unwrap();

    let timeout: Option<String> = sqlx::query_scalar(
        "SELECT value FROM settings WHERE key = 'integration_fetch_timeout_ms'",
    )
    .fetch_optional(&pool)
    .await
    .unwrap();
    assert_eq!(timeout.as_deref(), Some("5000"));

    let lock_wait: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'db_max_lock_wait_ms'")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert_eq!(lock_wait.as_deref(), Some("5000"));
}

#[tokio::test]
async fn test_null_setting_reset_to_default() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("plx.db")).await.unwrap();

    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'db_max_lock_wait_ms'")
        .execute(&pool)
        .await
        .unwrap();

    ensure_setting(&pool, "db_max_lock_wait_ms", "5000").await.unwrap();

    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'db_max_lock_wait_ms'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(value.as_deref(), Some("5000"));
}

#[tokio::test]
async fn test_existing_setting_not_overwritten() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("plx.db")).await.unwrap();

    sqlx::query("UPDATE settings SET value = '750' WHERE key = 'integration_fetch_timeout_ms'")
        .execute(&pool)
        .await
        .unwrap();

    ensure_setting(&pool, "integration_fetch_timeout_ms", "5000").await.unwrap();

    let value: String = sqlx::query_scalar(
        "SELECT value FROM settings WHERE key = 'integration_fetch_timeout_ms'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(value, "750");
}

#[tokio::test]
async fn test_item_cannot_point_at_itself() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("plx.db")).await.unwrap();

    sqlx::query(
        "INSERT INTO playlists (id, organization_id, name, inserted_at, updated_at) \
         VALUES ('p1', 'org', 'P', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = sqlx::query(
        "INSERT INTO playlist_items (id, playlist_id, prev_item_id, next_item_id, inserted_at, updated_at) \
         VALUES ('i1', 'p1', NULL, 'i1', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "self-pointing item must violate CHECK constraint");
}

#[tokio::test]
async fn test_dangling_pointer_rejected_at_commit() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("plx.db")).await.unwrap();

    sqlx::query(
        "INSERT INTO playlists (id, organization_id, name, inserted_at, updated_at) \
         VALUES ('p1', 'org', 'P', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut tx = pool.begin().await.unwrap();
    // Deferred foreign key: the statement itself succeeds...
    sqlx::query(
        "INSERT INTO playlist_items (id, playlist_id, prev_item_id, next_item_id, inserted_at, updated_at) \
         VALUES ('i1', 'p1', NULL, 'missing', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
    )
    .execute(&mut *tx)
    .await
    .unwrap();

    // ...but the commit must fail
    assert!(tx.commit().await.is_err());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM playlist_items")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
