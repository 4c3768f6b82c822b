//! Per-playlist mutation locks
//!
//! Structural mutations of one playlist are serialized in-process so two
//! splices never interleave their pointer rewrites. Renders never take
//! these locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Lock table keyed by playlist id
#[derive(Debug, Clone, Default)]
pub struct PlaylistLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl PlaylistLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a playlist
    ///
    /// The guard releases the lock on drop.
    pub async fn lock(&self, playlist_id: Uuid) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries only the table still holds are idle
            map.retain(|_, entry| Arc::strong_count(entry) > 1);
            map.entry(playlist_id).or_default().clone()
        };

        mutex.lock_owned().await
    }

    /// Number of playlists currently locked or waited on
    pub fn active(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.values().filter(|entry| Arc::strong_count(entry) > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_playlist_is_exclusive() {
        let locks = PlaylistLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.lock(id).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(id)).await;
        assert!(second.is_err(), "second lock must wait while the first is held");

        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), locks.lock(id)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_different_playlists_do_not_block() {
        let locks = PlaylistLocks::new();

        let _a = locks.lock(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(Uuid::new_v4())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_entries_pruned() {
        let locks = PlaylistLocks::new();

        drop(locks.lock(Uuid::new_v4()).await);
        let _held = locks.lock(Uuid::new_v4()).await;

        assert_eq!(locks.active(), 1);
        assert_eq!(locks.inner.lock().unwrap().len(), 1);
    }
}
