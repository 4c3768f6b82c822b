//! Linked-list operations over playlist item rows
//!
//! Order lives only in the prev/next pointers. Each operation here is one
//! step of a larger transaction owned by the caller: nothing commits, and
//! any error leaves the transaction to be rolled back on drop.
//!
//! Invariant maintained: one head, one tail (unless empty), every item
//! reachable from the head, and `a.next == b` exactly when `b.prev == a`.

use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use plx_common::db::PlaylistItemRow;
use plx_common::time;

use crate::db::items;
use crate::error::{Error, IntegrityError, Result};

/// Scheduling metadata of a new item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemTiming {
    pub offset: i64,
    pub duration: i64,
}

/// Current head of a playlist
///
/// `exclude` ignores one item whose pointers are mid-rewrite. Returns `None`
/// only when no other item exists.
pub async fn head_of(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
    exclude: Option<&str>,
) -> Result<Option<PlaylistItemRow>> {
    let mut heads = items::list_heads(&mut *conn, playlist_id, exclude).await?;

    match heads.len() {
        0 => {
            if items::count_items(&mut *conn, playlist_id, exclude).await? > 0 {
                return Err(Error::Integrity {
                    playlist_id,
                    kind: IntegrityError::MissingHead,
                });
            }
            Ok(None)
        }
        1 => Ok(heads.pop()),
        n => Err(Error::Integrity {
            playlist_id,
            kind: IntegrityError::MultipleHeads(n),
        }),
    }
}

/// Insert a new item after `prev_item_id` (`None` inserts at the head)
///
/// Writes the new row, then points the predecessor and successor at it.
pub async fn insert_after(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
    prev_item_id: Option<Uuid>,
    timing: ItemTiming,
) -> Result<PlaylistItemRow> {
    let (prev_id, next_id) = match prev_item_id {
        Some(prev) => {
            let prev = items::get_item_in_playlist(&mut *conn, playlist_id, prev).await?;
            (Some(prev.id), prev.next_item_id)
        }
        None => {
            let head = head_of(&mut *conn, playlist_id, None).await?;
            (None, head.map(|h| h.id))
        }
    };

    let now = time::now();
    let item = PlaylistItemRow {
        id: Uuid::new_v4().to_string(),
        playlist_id: playlist_id.to_string(),
        prev_item_id: prev_id,
        next_item_id: next_id,
        offset: timing.offset,
        duration: timing.duration,
        inserted_at: now,
        updated_at: now,
    };
    items::insert_item(&mut *conn, &item).await?;

    if let Some(prev) = item.prev_item_id.as_deref() {
        items::set_next(&mut *conn, prev, Some(&item.id), now).await?;
    }
    if let Some(next) = item.next_item_id.as_deref() {
        items::set_prev(&mut *conn, next, Some(&item.id), now).await?;
    }

    debug!(
        playlist_id = %playlist_id,
        item_id = %item.id,
        prev = ?item.prev_item_id,
        next = ?item.next_item_id,
        "Inserted playlist item"
    );
    Ok(item)
}

/// Remove an item, joining its neighbours directly
pub async fn remove(conn: &mut SqliteConnection, playlist_id: Uuid, item_id: Uuid) -> Result<()> {
    let item = items::get_item_in_playlist(&mut *conn, playlist_id, item_id).await?;

    unlink(&mut *conn, &item).await?;
    items::delete_item(&mut *conn, &item.id).await?;

    debug!(playlist_id = %playlist_id, item_id = %item_id, "Removed playlist item");
    Ok(())
}

/// Move an item to directly after `target_item_id` (`None` moves it to the head)
///
/// Phase 1 splices the item out. Phase 2 re-reads the target (or head) from
/// the post-splice state before splicing the item back in; reading the
/// pre-move neighbours instead would corrupt adjacent moves. Returns the
/// playlist the item belongs to.
pub async fn move_item(
    conn: &mut SqliteConnection,
    item_id: Uuid,
    target_item_id: Option<Uuid>,
) -> Result<Uuid> {
    let item = items::get_item(&mut *conn, &item_id.to_string())
        .await?
        .ok_or(Error::ItemNotFound(item_id))?;
    let playlist_id = plx_common::db::parse_id("playlist_id", &item.playlist_id)?;

    if target_item_id == Some(item_id) {
        return Ok(playlist_id);
    }

    let target = match target_item_id {
        Some(target) => Some(items::get_item_in_playlist(&mut *conn, playlist_id, target).await?),
        None => None,
    };

    // Already in place: a no-op, including moving the head to the head
    if item.prev_item_id == target.as_ref().map(|t| t.id.clone()) {
        return Ok(playlist_id);
    }

    // Phase 1: splice out
    unlink(&mut *conn, &item).await?;

    // Phase 2: re-read the insertion point
    let (prev_id, next_id) = match target {
        Some(target) => {
            let target = items::get_item(&mut *conn, &target.id)
                .await?
                .ok_or_else(|| Error::Internal(format!("Move target {} vanished", target.id)))?;
            (Some(target.id), target.next_item_id)
        }
        None => {
            let head = head_of(&mut *conn, playlist_id, Some(&item.id)).await?;
            (None, head.map(|h| h.id))
        }
    };

    let now = time::now();
    items::set_links(&mut *conn, &item.id, prev_id.as_deref(), next_id.as_deref(), now).await?;
    if let Some(prev) = prev_id.as_deref() {
        items::set_next(&mut *conn, prev, Some(&item.id), now).await?;
    }
    if let Some(next) = next_id.as_deref() {
        items::set_prev(&mut *conn, next, Some(&item.id), now).await?;
    }

    debug!(
        playlist_id = %playlist_id,
        item_id = %item_id,
        prev = ?prev_id,
        next = ?next_id,
        "Moved playlist item"
    );
    Ok(playlist_id)
}

/// Point an item's neighbours at each other, leaving the item's own
/// pointers stale
async fn unlink(conn: &mut SqliteConnection, item: &PlaylistItemRow) -> Result<()> {
    let now = time::now();

    if let Some(prev) = item.prev_item_id.as_deref() {
        items::set_next(&mut *conn, prev, item.next_item_id.as_deref(), now).await?;
    }
    if let Some(next) = item.next_item_id.as_deref() {
        items::set_prev(&mut *conn, next, item.prev_item_id.as_deref(), now).await?;
    }

    Ok(())
}
