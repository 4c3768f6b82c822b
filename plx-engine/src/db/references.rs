//! Playlist reference edges
//!
//! A row (item, parent, child) records that a config on `item` (owned by
//! `parent`) embeds playlist `child`.

use sqlx::SqliteConnection;
use uuid::Uuid;

use plx_common::db::parse_id;

use crate::error::Result;

/// Rewrite the edges contributed by one item
pub async fn replace_references(
    conn: &mut SqliteConnection,
    playlist_item_id: &str,
    parent_playlist_id: Uuid,
    children: &[Uuid],
) -> Result<()> {
    sqlx::query("DELETE FROM playlist_references WHERE playlist_item_id = ?")
        .bind(playlist_item_id)
        .execute(&mut *conn)
        .await?;

    for child in children {
        sqlx::query(
            "INSERT OR IGNORE INTO playlist_references (playlist_item_id, parent_playlist_id, child_playlist_id) \
             VALUES (?, ?, ?)",
        )
        .bind(playlist_item_id)
        .bind(parent_playlist_id.to_string())
        .bind(child.to_string())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Playlists with at least one item embedding `child_playlist_id`
pub async fn direct_parents(conn: &mut SqliteConnection, child_playlist_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT parent_playlist_id FROM playlist_references WHERE child_playlist_id = ?",
    )
    .bind(child_playlist_id.to_string())
    .fetch_all(conn)
    .await?;

    let parents = rows
        .iter()
        .map(|id| parse_id("parent_playlist_id", id))
        .collect::<plx_common::Result<Vec<_>>>()?;
    Ok(parents)
}

/// True if any other playlist embeds `playlist_id`
pub async fn is_referenced_elsewhere(conn: &mut SqliteConnection, playlist_id: Uuid) -> Result<bool> {
    let referenced: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM playlist_references WHERE child_playlist_id = ? AND parent_playlist_id <> ?)",
    )
    .bind(playlist_id.to_string())
    .bind(playlist_id.to_string())
    .fetch_one(conn)
    .await?;

    Ok(referenced)
}
