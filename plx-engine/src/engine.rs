//! Playlist engine facade
//!
//! Owns the pool, the collaborators and the per-playlist lock table.
//! Every structural mutation follows the same shape:
//!
//! 1. validate inputs that need no transaction (widget schema checks)
//! 2. take the playlist's lock
//! 3. in one transaction: quota, reference admission, linked-list splice,
//!    config and edge writes, commit
//!
//! Step 3 is retried as a whole on SQLite lock contention. Reads never take
//! a playlist lock.

use std::collections::HashSet;

use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use plx_common::config::EngineConfig;
use plx_common::db::{init_database, parse_id, PlaylistItemRow, PlaylistRow, WidgetConfigRow};
use plx_common::time;

use crate::collaborators::{Collaborators, ResourceType};
use crate::db::{items, playlists, references, settings, widget_configs};
use crate::error::{Error, IntegrityError, Result};
use crate::graph;
use crate::playlist::{linked_list, materializer, ChainReport, ItemTiming, PlaylistLocks};
use crate::resolve::{ContentResolver, ResolvedItem, ResolverSettings};
use crate::utils::retry_on_lock;

/// Everything needed to create an item and its widget config
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewItem {
    pub widget_id: String,
    pub offset: i64,
    pub duration: i64,
    pub options: Map<String, Value>,
    pub data: Map<String, Value>,
}

impl NewItem {
    pub fn new(widget_id: impl Into<String>) -> Self {
        Self {
            widget_id: widget_id.into(),
            ..Self::default()
        }
    }

    pub fn with_timing(mut self, offset: i64, duration: i64) -> Self {
        self.offset = offset;
        self.duration = duration;
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PlaylistEngine {
    pool: SqlitePool,
    config: EngineConfig,
    locks: PlaylistLocks,
    collaborators: Collaborators,
}

impl PlaylistEngine {
    pub fn new(pool: SqlitePool, config: EngineConfig, collaborators: Collaborators) -> Self {
        Self {
            pool,
            config,
            locks: PlaylistLocks::new(),
            collaborators,
        }
    }

    /// Open the configured database with SQLite-backed collaborators
    ///
    /// Settings stored in the database override the file configuration.
    pub async fn open(mut config: EngineConfig) -> Result<Self> {
        let pool = init_database(&config.database_path).await?;
        settings::apply_overrides(&pool, &mut config).await?;
        let collaborators = Collaborators::sqlite(pool.clone())?;

        info!(
            database = %config.database_path.display(),
            fetch_timeout_ms = config.fetch_timeout_ms,
            max_render_depth = config.max_render_depth,
            "Playlist engine ready"
        );
        Ok(Self::new(pool, config, collaborators))
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> ContentResolver {
        ContentResolver::new(
            self.pool.clone(),
            self.collaborators.clone(),
            ResolverSettings::from(&self.config),
        )
    }

    // ---- playlists ----

    pub async fn create_playlist(&self, organization_id: &str, name: &str) -> Result<PlaylistRow> {
        let playlist = retry_on_lock("create playlist", self.config.db_max_lock_wait_ms, || {
            self.create_playlist_tx(organization_id, name)
        })
        .await?;

        info!(playlist_id = %playlist.id, organization_id, "Created playlist");
        Ok(playlist)
    }

    async fn create_playlist_tx(&self, organization_id: &str, name: &str) -> Result<PlaylistRow> {
        let mut tx = self.pool.begin().await?;

        self.collaborators
            .quota
            .check_quota(&mut *tx, organization_id, ResourceType::Playlists)
            .await?;

        let now = time::now();
        let playlist = PlaylistRow {
            id: Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            name: name.to_string(),
            inserted_at: now,
            updated_at: now,
        };
        playlists::insert_playlist(&mut *tx, &playlist).await?;

        tx.commit().await?;
        Ok(playlist)
    }

    pub async fn get_playlist(&self, playlist_id: Uuid) -> Result<PlaylistRow> {
        let mut conn = self.pool.acquire().await?;
        playlists::get_playlist(&mut conn, playlist_id).await
    }

    /// Delete a playlist with its items; refused while another playlist embeds it
    pub async fn delete_playlist(&self, playlist_id: Uuid) -> Result<()> {
        let _guard = self.locks.lock(playlist_id).await;

        retry_on_lock("delete playlist", self.config.db_max_lock_wait_ms, || {
            self.delete_playlist_tx(playlist_id)
        })
        .await?;

        info!(playlist_id = %playlist_id, "Deleted playlist");
        Ok(())
    }

    async fn delete_playlist_tx(&self, playlist_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        playlists::get_playlist(&mut *tx, playlist_id).await?;
        if references::is_referenced_elsewhere(&mut *tx, playlist_id).await? {
            return Err(Error::PlaylistInUse(playlist_id));
        }
        playlists::delete_playlist(&mut *tx, playlist_id).await?;

        tx.commit().await?;
        Ok(())
    }

    // ---- items ----

    /// Insert an item after `prev_item_id`, or at the head when `None`
    pub async fn insert_item(
        &self,
        playlist_id: Uuid,
        prev_item_id: Option<Uuid>,
        new_item: NewItem,
    ) -> Result<PlaylistItemRow> {
        check_duration(new_item.duration)?;
        let children = self.prepare_options(&new_item.widget_id, &new_item.options).await?;

        let _guard = self.locks.lock(playlist_id).await;
        let item = retry_on_lock("insert playlist item", self.config.db_max_lock_wait_ms, || {
            self.insert_item_tx(playlist_id, prev_item_id, &new_item, &children)
        })
        .await?;

        debug!(
            playlist_id = %playlist_id,
            item_id = %item.id,
            operation = "insert",
            "Playlist item committed"
        );
        Ok(item)
    }

    async fn insert_item_tx(
        &self,
        playlist_id: Uuid,
        prev_item_id: Option<Uuid>,
        new_item: &NewItem,
        children: &[Uuid],
    ) -> Result<PlaylistItemRow> {
        let mut tx = self.pool.begin().await?;

        let playlist = playlists::get_playlist(&mut *tx, playlist_id).await?;
        self.collaborators
            .quota
            .check_quota(&mut *tx, &playlist.organization_id, ResourceType::PlaylistItems)
            .await?;
        admit_references(&mut *tx, playlist_id, children).await?;

        let timing = ItemTiming {
            offset: new_item.offset,
            duration: new_item.duration,
        };
        let item = linked_list::insert_after(&mut *tx, playlist_id, prev_item_id, timing).await?;
        widget_configs::insert_config(
            &mut *tx,
            &item.id,
            &new_item.widget_id,
            &new_item.options,
            &new_item.data,
            item.inserted_at,
        )
        .await?;
        if !children.is_empty() {
            references::replace_references(&mut *tx, &item.id, playlist_id, children).await?;
        }

        tx.commit().await?;
        Ok(item)
    }

    pub async fn remove_item(&self, playlist_id: Uuid, item_id: Uuid) -> Result<()> {
        let _guard = self.locks.lock(playlist_id).await;

        retry_on_lock("remove playlist item", self.config.db_max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            playlists::get_playlist(&mut *tx, playlist_id).await?;
            linked_list::remove(&mut *tx, playlist_id, item_id).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(playlist_id = %playlist_id, item_id = %item_id, operation = "remove", "Playlist item committed");
        Ok(())
    }

    /// Place an item directly after `target_item_id`, or first when `None`
    pub async fn move_item(&self, item_id: Uuid, target_item_id: Option<Uuid>) -> Result<()> {
        let playlist_id = self.playlist_of(item_id).await?;
        let _guard = self.locks.lock(playlist_id).await;

        retry_on_lock("move playlist item", self.config.db_max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            linked_list::move_item(&mut *tx, item_id, target_item_id).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        debug!(playlist_id = %playlist_id, item_id = %item_id, operation = "move", "Playlist item committed");
        Ok(())
    }

    /// Change an item's scheduling metadata; `None` keeps the current value
    pub async fn update_item(
        &self,
        item_id: Uuid,
        offset: Option<i64>,
        duration: Option<i64>,
    ) -> Result<PlaylistItemRow> {
        if let Some(duration) = duration {
            check_duration(duration)?;
        }
        let playlist_id = self.playlist_of(item_id).await?;
        let _guard = self.locks.lock(playlist_id).await;

        retry_on_lock("update playlist item", self.config.db_max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            let item = items::get_item_in_playlist(&mut *tx, playlist_id, item_id).await?;
            items::update_timing(
                &mut *tx,
                &item.id,
                offset.unwrap_or(item.offset),
                duration.unwrap_or(item.duration),
                time::now(),
            )
            .await?;
            let updated = items::get_item_in_playlist(&mut *tx, playlist_id, item_id).await?;
            tx.commit().await?;
            Ok(updated)
        })
        .await
    }

    /// Replace an item's options (and data when given)
    ///
    /// References are re-admitted and the item's edges rewritten in the
    /// same transaction; the config version goes up by one.
    pub async fn update_item_config(
        &self,
        item_id: Uuid,
        options: Map<String, Value>,
        data: Option<Map<String, Value>>,
    ) -> Result<WidgetConfigRow> {
        let playlist_id = self.playlist_of(item_id).await?;
        let current = {
            let mut conn = self.pool.acquire().await?;
            widget_configs::get_config_for_item(&mut conn, &item_id.to_string())
                .await?
                .ok_or_else(|| Error::Integrity {
                    playlist_id,
                    kind: IntegrityError::MissingConfig(item_id.to_string()),
                })?
        };
        let children = self.prepare_options(&current.widget_id, &options).await?;

        let _guard = self.locks.lock(playlist_id).await;
        let config = retry_on_lock("reconfigure playlist item", self.config.db_max_lock_wait_ms, || async {
            let mut tx = self.pool.begin().await?;
            admit_references(&mut *tx, playlist_id, &children).await?;
            let config =
                widget_configs::reconfigure(&mut *tx, item_id, &options, data.as_ref(), time::now()).await?;
            references::replace_references(&mut *tx, &config.playlist_item_id, playlist_id, &children)
                .await?;
            tx.commit().await?;
            Ok(config)
        })
        .await?;

        debug!(
            playlist_id = %playlist_id,
            item_id = %item_id,
            version = config.version,
            operation = "reconfigure",
            "Playlist item committed"
        );
        Ok(config)
    }

    // ---- reads ----

    /// Items in play order
    pub async fn materialize(&self, playlist_id: Uuid) -> Result<Vec<PlaylistItemRow>> {
        let mut conn = self.pool.acquire().await?;
        playlists::get_playlist(&mut conn, playlist_id).await?;
        materializer::materialize(&mut conn, playlist_id).await
    }

    pub async fn verify_chain(&self, playlist_id: Uuid) -> Result<ChainReport> {
        let mut conn = self.pool.acquire().await?;
        playlists::get_playlist(&mut conn, playlist_id).await?;
        materializer::verify_chain(&mut conn, playlist_id).await
    }

    pub async fn ancestors(&self, playlist_id: Uuid) -> Result<HashSet<Uuid>> {
        let mut conn = self.pool.acquire().await?;
        graph::ancestors(&mut conn, playlist_id).await
    }

    pub async fn validate_no_circular_reference(&self, current: Uuid, selected: Uuid) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        graph::validate_no_circular_reference(&mut conn, current, selected).await
    }

    pub async fn render_playlist(&self, playlist_id: Uuid, organization_id: &str) -> Result<Vec<ResolvedItem>> {
        self.resolver().render_playlist(playlist_id, organization_id).await
    }

    pub async fn resolve_item(&self, item_id: Uuid, organization_id: &str) -> Result<ResolvedItem> {
        self.resolver().resolve_item(item_id, organization_id).await
    }

    // ---- helpers ----

    async fn playlist_of(&self, item_id: Uuid) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        let item = items::get_item(&mut conn, &item_id.to_string())
            .await?
            .ok_or(Error::ItemNotFound(item_id))?;
        Ok(parse_id("playlist_id", &item.playlist_id)?)
    }

    /// Validate options against the widget schema; returns the playlists they embed
    ///
    /// References are read after schema defaults are applied, matching what
    /// the resolver will render.
    async fn prepare_options(&self, widget_id: &str, options: &Map<String, Value>) -> Result<Vec<Uuid>> {
        let widget = self
            .collaborators
            .widgets
            .get_widget(widget_id)
            .await?
            .ok_or_else(|| Error::WidgetNotFound(widget_id.to_string()))?;

        widget.options_schema.validate(options).map_err(Error::InvalidOptions)?;

        let mut effective = options.clone();
        widget.options_schema.apply_defaults(&mut effective);
        widget
            .options_schema
            .playlist_references(&effective)
            .map_err(Error::InvalidOptions)
    }
}

/// Refuse cyclic or dangling playlist references before anything is written
async fn admit_references(conn: &mut SqliteConnection, playlist_id: Uuid, children: &[Uuid]) -> Result<()> {
    graph::validate_references(&mut *conn, playlist_id, children).await?;
    for child in children {
        playlists::get_playlist(&mut *conn, *child).await?;
    }
    Ok(())
}

fn check_duration(duration: i64) -> Result<()> {
    if duration < 0 {
        return Err(Error::InvalidTiming(format!("duration {} is negative", duration)));
    }
    Ok(())
}
