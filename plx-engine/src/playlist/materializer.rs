//! List materializer
//!
//! Rebuilds play order by walking next pointers from the head. The walk is
//! bounded by the node count, so a corrupted chain fails with an integrity
//! error instead of looping or being served truncated.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::error;
use uuid::Uuid;

use plx_common::db::PlaylistItemRow;

use crate::db::items;
use crate::error::{Error, IntegrityError, Result};

/// Outcome of a successful chain verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub playlist_id: Uuid,
    pub length: usize,
    pub head: Option<String>,
    pub tail: Option<String>,
}

/// Order items by following their pointers
///
/// Pure and restartable: takes the rows of one playlist in any order.
pub fn to_ordered_sequence(
    items: Vec<PlaylistItemRow>,
) -> std::result::Result<Vec<PlaylistItemRow>, IntegrityError> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    let heads: Vec<String> = items
        .iter()
        .filter(|item| item.prev_item_id.is_none())
        .map(|item| item.id.clone())
        .collect();

    let head = match heads.as_slice() {
        [] => return Err(IntegrityError::MissingHead),
        [head] => head.clone(),
        _ => return Err(IntegrityError::MultipleHeads(heads.len())),
    };

    let mut by_id: HashMap<String, PlaylistItemRow> =
        items.into_iter().map(|item| (item.id.clone(), item)).collect();

    let mut ordered = Vec::with_capacity(total);
    let mut current = Some(head);

    while let Some(id) = current {
        if ordered.len() >= total {
            return Err(IntegrityError::CircularDependency);
        }

        let item = match by_id.remove(&id) {
            Some(item) => item,
            // Already taken: the chain loops back on itself
            None if ordered.iter().any(|seen: &PlaylistItemRow| seen.id == id) => {
                return Err(IntegrityError::CircularDependency);
            }
            None => {
                let from = ordered
                    .last()
                    .map(|prev: &PlaylistItemRow| prev.id.clone())
                    .unwrap_or_default();
                return Err(IntegrityError::DanglingPointer { from, to: id });
            }
        };

        current = item.next_item_id.clone();
        ordered.push(item);
    }

    if !by_id.is_empty() {
        return Err(IntegrityError::Orphans {
            unreachable: by_id.len(),
        });
    }

    Ok(ordered)
}

/// Check that every next pointer is mirrored by a prev pointer
///
/// Expects the output of [`to_ordered_sequence`].
pub fn verify_links(ordered: &[PlaylistItemRow]) -> std::result::Result<(), IntegrityError> {
    let ids: HashSet<&str> = ordered.iter().map(|item| item.id.as_str()).collect();
    if ids.len() != ordered.len() {
        return Err(IntegrityError::CircularDependency);
    }

    for pair in ordered.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.prev_item_id.as_deref() != Some(a.id.as_str()) {
            return Err(IntegrityError::InconsistentLink {
                from: a.id.clone(),
                to: b.id.clone(),
            });
        }
    }

    Ok(())
}

/// Load and order the items of a playlist
pub async fn materialize(conn: &mut SqliteConnection, playlist_id: Uuid) -> Result<Vec<PlaylistItemRow>> {
    let rows = items::list_items(conn, playlist_id).await?;

    to_ordered_sequence(rows).map_err(|kind| {
        error!(playlist_id = %playlist_id, error = %kind, "Playlist chain is corrupted");
        Error::Integrity { playlist_id, kind }
    })
}

/// Materialize and verify pointer symmetry
pub async fn verify_chain(conn: &mut SqliteConnection, playlist_id: Uuid) -> Result<ChainReport> {
    let ordered = materialize(conn, playlist_id).await?;

    verify_links(&ordered).map_err(|kind| {
        error!(playlist_id = %playlist_id, error = %kind, "Playlist chain is corrupted");
        Error::Integrity { playlist_id, kind }
    })?;

    Ok(ChainReport {
        playlist_id,
        length: ordered.len(),
        head: ordered.first().map(|item| item.id.clone()),
        tail: ordered.last().map(|item| item.id.clone()),
    })
}
