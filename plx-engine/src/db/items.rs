//! Playlist item row operations (node store)
//!
//! Every function runs on a caller-supplied connection, usually an open
//! transaction, and never commits. Pointer rewrites are single-column
//! updates so a splice touches exactly the rows it names.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use plx_common::db::PlaylistItemRow;

use crate::error::{Error, Result};

const ITEM_COLUMNS: &str = r#"id, playlist_id, prev_item_id, next_item_id, "offset", duration, inserted_at, updated_at"#;

/// Get an item by id
pub async fn get_item(conn: &mut SqliteConnection, item_id: &str) -> Result<Option<PlaylistItemRow>> {
    let row = sqlx::query_as::<_, PlaylistItemRow>(&format!(
        "SELECT {} FROM playlist_items WHERE id = ?",
        ITEM_COLUMNS
    ))
    .bind(item_id)
    .fetch_optional(conn)
    .await?;

    Ok(row)
}

/// Get an item that must belong to `playlist_id`
///
/// An item of another playlist is reported exactly like a missing one.
pub async fn get_item_in_playlist(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
    item_id: Uuid,
) -> Result<PlaylistItemRow> {
    sqlx::query_as::<_, PlaylistItemRow>(&format!(
        "SELECT {} FROM playlist_items WHERE id = ? AND playlist_id = ?",
        ITEM_COLUMNS
    ))
    .bind(item_id.to_string())
    .bind(playlist_id.to_string())
    .fetch_optional(conn)
    .await?
    .ok_or(Error::ItemNotFound(item_id))
}

/// All items of a playlist, in storage order (not play order)
pub async fn list_items(conn: &mut SqliteConnection, playlist_id: Uuid) -> Result<Vec<PlaylistItemRow>> {
    let rows = sqlx::query_as::<_, PlaylistItemRow>(&format!(
        "SELECT {} FROM playlist_items WHERE playlist_id = ?",
        ITEM_COLUMNS
    ))
    .bind(playlist_id.to_string())
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

/// Items whose prev pointer is NULL, optionally ignoring one item
///
/// `exclude` lets a move look for the head while the moving item's own
/// pointers are stale.
pub async fn list_heads(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
    exclude: Option<&str>,
) -> Result<Vec<PlaylistItemRow>> {
    let rows = sqlx::query_as::<_, PlaylistItemRow>(&format!(
        "SELECT {} FROM playlist_items \
         WHERE playlist_id = ? AND prev_item_id IS NULL AND (? IS NULL OR id <> ?)",
        ITEM_COLUMNS
    ))
    .bind(playlist_id.to_string())
    .bind(exclude)
    .bind(exclude)
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

/// Number of items in a playlist, optionally ignoring one item
pub async fn count_items(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
    exclude: Option<&str>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM playlist_items WHERE playlist_id = ? AND (? IS NULL OR id <> ?)",
    )
    .bind(playlist_id.to_string())
    .bind(exclude)
    .bind(exclude)
    .fetch_one(conn)
    .await?;

    Ok(count)
}

pub async fn insert_item(conn: &mut SqliteConnection, item: &PlaylistItemRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO playlist_items (
            id, playlist_id, prev_item_id, next_item_id, "offset", duration, inserted_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.id)
    .bind(&item.playlist_id)
    .bind(&item.prev_item_id)
    .bind(&item.next_item_id)
    .bind(item.offset)
    .bind(item.duration)
    .bind(item.inserted_at)
    .bind(item.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn set_next(
    conn: &mut SqliteConnection,
    item_id: &str,
    next_item_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query("UPDATE playlist_items SET next_item_id = ?, updated_at = ? WHERE id = ?")
        .bind(next_item_id)
        .bind(now)
        .bind(item_id)
        .execute(conn)
        .await?;

    expect_one_row(result.rows_affected(), item_id)
}

pub async fn set_prev(
    conn: &mut SqliteConnection,
    item_id: &str,
    prev_item_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query("UPDATE playlist_items SET prev_item_id = ?, updated_at = ? WHERE id = ?")
        .bind(prev_item_id)
        .bind(now)
        .bind(item_id)
        .execute(conn)
        .await?;

    expect_one_row(result.rows_affected(), item_id)
}

pub async fn set_links(
    conn: &mut SqliteConnection,
    item_id: &str,
    prev_item_id: Option<&str>,
    next_item_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE playlist_items SET prev_item_id = ?, next_item_id = ?, updated_at = ? WHERE id = ?",
    )
    .bind(prev_item_id)
    .bind(next_item_id)
    .bind(now)
    .bind(item_id)
    .execute(conn)
    .await?;

    expect_one_row(result.rows_affected(), item_id)
}

/// Update the opaque scheduling metadata of an item
pub async fn update_timing(
    conn: &mut SqliteConnection,
    item_id: &str,
    offset: i64,
    duration: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"UPDATE playlist_items SET "offset" = ?, duration = ?, updated_at = ? WHERE id = ?"#,
    )
    .bind(offset)
    .bind(duration)
    .bind(now)
    .bind(item_id)
    .execute(conn)
    .await?;

    expect_one_row(result.rows_affected(), item_id)
}

/// Delete an item row; its widget config and reference edges cascade
pub async fn delete_item(conn: &mut SqliteConnection, item_id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM playlist_items WHERE id = ?")
        .bind(item_id)
        .execute(conn)
        .await?;

    expect_one_row(result.rows_affected(), item_id)
}

fn expect_one_row(rows_affected: u64, item_id: &str) -> Result<()> {
    if rows_affected == 1 {
        Ok(())
    } else {
        // A pointer named an item that vanished inside our own transaction
        Err(Error::Internal(format!(
            "Expected to update playlist item {}, {} rows affected",
            item_id, rows_affected
        )))
    }
}
