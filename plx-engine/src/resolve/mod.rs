//! Content resolution pipeline
//!
//! Turns stored items into render-ready records. Per item, in order:
//!
//! 1. option defaults from the widget's options schema
//! 2. reference resolution (media records, nested playlists, layout zones)
//! 3. data defaults from the data schema
//! 4. integration merge (cache by instance, discriminator, organization;
//!    on-demand fetch on a miss)
//! 5. display window (`max_items`)
//!
//! Rendering reads a committed snapshot and never takes a playlist lock.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use tracing::{debug, error};
use uuid::Uuid;

use plx_common::config::EngineConfig;
use plx_common::db::{parse_id, PlaylistItemRow, WidgetConfigRow};
use plx_common::time;

use crate::collaborators::Collaborators;
use crate::db::{items, playlists, widget_configs};
use crate::error::{Error, IntegrityError, Result};
use crate::playlist::materializer;
use crate::schema::WidgetDescriptor;

pub mod display;
pub mod integration;
mod references;

pub use integration::{discriminator_id, IntegrationError};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Widget config as the renderer sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub id: String,
    pub widget_id: String,
    /// Options with defaults applied and references replaced by their objects
    pub options: Map<String, Value>,
    pub data: Map<String, Value>,
    pub version: i64,
    pub last_request_at: Option<DateTime<Utc>>,
}

/// Render-ready playlist item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedItem {
    pub id: String,
    pub offset: i64,
    pub duration: i64,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: ResolvedConfig,
    pub widget: WidgetDescriptor,
    /// Set when integration data could not be obtained; data then holds defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_error: Option<IntegrationError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverSettings {
    pub fetch_timeout: Duration,
    pub max_render_depth: usize,
}

impl From<&EngineConfig> for ResolverSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            fetch_timeout: time::millis_to_duration(config.fetch_timeout_ms),
            max_render_depth: config.max_render_depth,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentResolver {
    pool: SqlitePool,
    collaborators: Collaborators,
    settings: ResolverSettings,
}

impl ContentResolver {
    pub fn new(pool: SqlitePool, collaborators: Collaborators, settings: ResolverSettings) -> Self {
        Self {
            pool,
            collaborators,
            settings,
        }
    }

    /// Materialize a playlist and resolve every item in play order
    pub async fn render_playlist(&self, playlist_id: Uuid, organization_id: &str) -> Result<Vec<ResolvedItem>> {
        let mut stack = Vec::new();
        self.render(playlist_id, organization_id, &mut stack).await
    }

    /// Resolve a single item
    pub async fn resolve_item(&self, item_id: Uuid, organization_id: &str) -> Result<ResolvedItem> {
        let mut conn = self.pool.acquire().await?;
        let item = items::get_item(&mut conn, &item_id.to_string())
            .await?
            .ok_or(Error::ItemNotFound(item_id))?;
        let playlist_id = parse_id("playlist_id", &item.playlist_id)?;
        let config = widget_configs::get_config_for_item(&mut conn, &item.id)
            .await?
            .ok_or_else(|| Error::Integrity {
                playlist_id,
                kind: IntegrityError::MissingConfig(item.id.clone()),
            })?;
        drop(conn);

        let mut stack = vec![playlist_id];
        self.resolve_node(item, config, organization_id, &mut stack).await
    }

    /// Render with `stack` holding the playlists currently being expanded
    fn render<'a>(
        &'a self,
        playlist_id: Uuid,
        organization_id: &'a str,
        stack: &'a mut Vec<Uuid>,
    ) -> BoxFuture<'a, Result<Vec<ResolvedItem>>> {
        Box::pin(async move {
            // Admission refuses cycles; reaching one here means stored edges are corrupt
            if stack.contains(&playlist_id) {
                let current = stack.last().copied().unwrap_or(playlist_id);
                error!(
                    playlist_id = %playlist_id,
                    stack = ?stack,
                    "Playlist re-entered while rendering"
                );
                return Err(Error::CircularReference {
                    current,
                    selected: playlist_id,
                });
            }
            if stack.len() >= self.settings.max_render_depth {
                return Err(Error::RenderDepthExceeded {
                    playlist_id,
                    depth: stack.len(),
                });
            }

            let (ordered, mut configs) = self.snapshot(playlist_id).await?;

            stack.push(playlist_id);
            let mut resolved = Vec::with_capacity(ordered.len());
            for item in ordered {
                let config = configs.remove(&item.id).ok_or_else(|| Error::Integrity {
                    playlist_id,
                    kind: IntegrityError::MissingConfig(item.id.clone()),
                })?;
                resolved.push(self.resolve_node(item, config, organization_id, stack).await?);
            }
            stack.pop();

            debug!(playlist_id = %playlist_id, items = resolved.len(), "Rendered playlist");
            Ok(resolved)
        })
    }

    /// Ordered items and their configs from one read transaction
    async fn snapshot(
        &self,
        playlist_id: Uuid,
    ) -> Result<(Vec<PlaylistItemRow>, HashMap<String, WidgetConfigRow>)> {
        let mut tx = self.pool.begin().await?;

        playlists::get_playlist(&mut *tx, playlist_id).await?;
        let ordered = materializer::materialize(&mut *tx, playlist_id).await?;
        let configs = widget_configs::list_configs_for_playlist(&mut *tx, playlist_id).await?;

        tx.commit().await?;

        let configs = configs
            .into_iter()
            .map(|config| (config.playlist_item_id.clone(), config))
            .collect();
        Ok((ordered, configs))
    }

    async fn resolve_node(
        &self,
        item: PlaylistItemRow,
        config: WidgetConfigRow,
        organization_id: &str,
        stack: &mut Vec<Uuid>,
    ) -> Result<ResolvedItem> {
        let widget = self
            .collaborators
            .widgets
            .get_widget(&config.widget_id)
            .await?
            .ok_or_else(|| Error::WidgetNotFound(config.widget_id.clone()))?;

        let mut options = config.options.0.clone();
        widget.options_schema.apply_defaults(&mut options);

        let resolved_options = self
            .resolve_references(&widget.options_schema, &options, organization_id, stack)
            .await?;

        let mut data = config.data.0.clone();
        widget.data_schema.apply_defaults(&mut data);

        let mut last_request_at = config.last_request_at;
        let mut integration_error = None;
        if let Some(integration) = &widget.integration {
            let outcome = self
                .merge_integration(integration, organization_id, &config.id, &options)
                .await;
            if let Some(payload) = outcome.data {
                data.extend(payload);
            }
            if outcome.served_at.is_some() {
                last_request_at = outcome.served_at;
            }
            integration_error = outcome.error;
        }

        display::apply_display_window(&options, &widget.data_schema, &mut data);

        Ok(ResolvedItem {
            id: item.id,
            offset: item.offset,
            duration: item.duration,
            inserted_at: item.inserted_at,
            updated_at: item.updated_at,
            config: ResolvedConfig {
                id: config.id,
                widget_id: config.widget_id,
                options: resolved_options,
                data,
                version: config.version,
                last_request_at,
            },
            widget: widget.descriptor(),
            integration_error,
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(format!("Serialize resolved value: {}", e)))
}
