//! Playlist row operations

use sqlx::SqliteConnection;
use uuid::Uuid;

use plx_common::db::PlaylistRow;

use crate::error::{Error, Result};

pub async fn get_playlist(conn: &mut SqliteConnection, playlist_id: Uuid) -> Result<PlaylistRow> {
    sqlx::query_as::<_, PlaylistRow>(
        "SELECT id, organization_id, name, inserted_at, updated_at FROM playlists WHERE id = ?",
    )
    .bind(playlist_id.to_string())
    .fetch_optional(conn)
    .await?
    .ok_or(Error::PlaylistNotFound(playlist_id))
}

pub async fn insert_playlist(conn: &mut SqliteConnection, playlist: &PlaylistRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO playlists (id, organization_id, name, inserted_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&playlist.id)
    .bind(&playlist.organization_id)
    .bind(&playlist.name)
    .bind(playlist.inserted_at)
    .bind(playlist.updated_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Delete a playlist; items, configs and outgoing references cascade
pub async fn delete_playlist(conn: &mut SqliteConnection, playlist_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM playlists WHERE id = ?")
        .bind(playlist_id.to_string())
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::PlaylistNotFound(playlist_id));
    }
    Ok(())
}
