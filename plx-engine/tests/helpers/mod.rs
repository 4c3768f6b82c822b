//! Test helper utilities
//!
//! Shared setup for plx-engine integration tests

#![allow(dead_code)]

pub mod fakes;

use anyhow::Result;
use serde_json::{json, Map, Value};
use sqlx::types::Json;
use tempfile::TempDir;
use uuid::Uuid;

use plx_common::config::EngineConfig;
use plx_common::db::WidgetRow;
use plx_engine::collaborators::catalog::upsert_widget;
use plx_engine::{NewItem, PlaylistEngine};

pub use fakes::{FakeFetcher, FetchBehaviour};

/// Plain widget with a free-text title
pub const TEXT_WIDGET: &str = "text";
/// Widget embedding one playlist through a `ref` option
pub const EMBED_WIDGET: &str = "embed";
/// Layout widget whose zones each embed a playlist
pub const LAYOUT_WIDGET: &str = "layout";

/// Engine over a fresh database in a temp dir
///
/// Returns (TempDir, PlaylistEngine) - TempDir must be kept alive for duration of test
pub async fn create_test_engine() -> Result<(TempDir, PlaylistEngine)> {
    create_test_engine_with(|_| {}).await
}

pub async fn create_test_engine_with(
    adjust: impl FnOnce(&mut EngineConfig),
) -> Result<(TempDir, PlaylistEngine)> {
    let temp_dir = TempDir::new()?;
    let mut config = EngineConfig {
        database_path: temp_dir.path().join("plx.db"),
        ..EngineConfig::default()
    };
    adjust(&mut config);

    let engine = PlaylistEngine::open(config).await?;
    register_standard_widgets(&engine).await?;
    Ok((temp_dir, engine))
}

pub fn json_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub async fn register_widget(
    engine: &PlaylistEngine,
    id: &str,
    options_schema: Value,
    data_schema: Value,
    integration: Option<Value>,
) -> Result<()> {
    let mut conn = engine.pool().acquire().await?;
    upsert_widget(
        &mut conn,
        &WidgetRow {
            id: id.to_string(),
            name: id.to_uppercase(),
            slug: id.to_string(),
            description: None,
            template: Json(json!({ "component": id })),
            options_schema: Json(json_map(options_schema)),
            data_schema: Json(json_map(data_schema)),
            integration: integration.map(Json),
        },
    )
    .await?;
    Ok(())
}

async fn register_standard_widgets(engine: &PlaylistEngine) -> Result<()> {
    register_widget(engine, TEXT_WIDGET, json!({ "title": "string" }), json!({}), None).await?;
    register_widget(
        engine,
        EMBED_WIDGET,
        json!({ "playlist": { "type": "ref", "collection": "playlists", "required": true } }),
        json!({}),
        None,
    )
    .await?;
    register_widget(engine, LAYOUT_WIDGET, json!({ "layout": "layout-ref" }), json!({}), None).await?;
    Ok(())
}

pub fn text_item(title: &str) -> NewItem {
    NewItem::new(TEXT_WIDGET)
        .with_timing(0, 10_000)
        .with_options(json_map(json!({ "title": title })))
}

pub fn embed_item(playlist_id: &str) -> NewItem {
    NewItem::new(EMBED_WIDGET).with_options(json_map(json!({ "playlist": playlist_id })))
}

pub fn layout_item(zones: &[(&str, &str)]) -> NewItem {
    let zones: Map<String, Value> = zones
        .iter()
        .map(|(zone, playlist_id)| (zone.to_string(), json!({ "playlist_id": playlist_id })))
        .collect();
    NewItem::new(LAYOUT_WIDGET).with_options(json_map(json!({
        "layout": { "layout_id": "split", "zones": zones }
    })))
}

pub async fn create_playlist(engine: &PlaylistEngine, name: &str) -> Uuid {
    let playlist = engine.create_playlist("org-1", name).await.unwrap();
    Uuid::parse_str(&playlist.id).unwrap()
}

pub fn item_id(item: &plx_common::db::PlaylistItemRow) -> Uuid {
    Uuid::parse_str(&item.id).unwrap()
}

/// Item ids in play order
pub async fn order(engine: &PlaylistEngine, playlist_id: Uuid) -> Vec<String> {
    engine
        .materialize(playlist_id)
        .await
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect()
}

pub async fn count_rows(engine: &PlaylistEngine, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(engine.pool())
        .await
        .unwrap()
}
