//! Reference graph validation
//!
//! Playlist A has an edge to playlist B when a widget config on one of A's
//! items embeds B (a playlist reference option or a layout zone). Rendering
//! follows these edges, so the graph must stay acyclic: a new edge
//! `current -> selected` is refused when `selected` already reaches
//! `current`, i.e. when `selected` is `current` or one of its ancestors.

use std::collections::HashSet;

use sqlx::SqliteConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::references;
use crate::error::{Error, Result};

/// Every playlist that (transitively) embeds `playlist_id`
///
/// Iterative reverse-edge walk with a visited set; terminates even if the
/// stored graph already contains a cycle.
pub async fn ancestors(conn: &mut SqliteConnection, playlist_id: Uuid) -> Result<HashSet<Uuid>> {
    let mut visited = HashSet::new();
    let mut pending = vec![playlist_id];

    while let Some(current) = pending.pop() {
        for parent in references::direct_parents(&mut *conn, current).await? {
            if visited.insert(parent) {
                pending.push(parent);
            }
        }
    }

    if visited.contains(&playlist_id) {
        warn!(playlist_id = %playlist_id, "Stored reference graph already contains a cycle");
    }

    Ok(visited)
}

/// Refuse an edge `current -> selected` that would close a cycle
pub async fn validate_no_circular_reference(
    conn: &mut SqliteConnection,
    current: Uuid,
    selected: Uuid,
) -> Result<()> {
    if current == selected {
        debug!(playlist_id = %current, "Rejected self reference");
        return Err(Error::CircularReference { current, selected });
    }

    if ancestors(conn, current).await?.contains(&selected) {
        debug!(current = %current, selected = %selected, "Rejected reference to ancestor");
        return Err(Error::CircularReference { current, selected });
    }

    Ok(())
}

/// Validate a batch of edges out of `current`
pub async fn validate_references(
    conn: &mut SqliteConnection,
    current: Uuid,
    selected: &[Uuid],
) -> Result<()> {
    if selected.is_empty() {
        return Ok(());
    }

    if let Some(&selected) = selected.iter().find(|&&id| id == current) {
        return Err(Error::CircularReference { current, selected });
    }

    let ancestors = ancestors(conn, current).await?;
    match selected.iter().find(|id| ancestors.contains(id)) {
        Some(&selected) => Err(Error::CircularReference { current, selected }),
        None => Ok(()),
    }
}
