//! Widget config row operations

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use plx_common::db::WidgetConfigRow;

use crate::error::{Error, Result};

const CONFIG_COLUMNS: &str = "id, widget_id, playlist_item_id, options, data, version, \
                              last_request_at, inserted_at, updated_at";

/// Create the config of a freshly inserted item (version 1)
pub async fn insert_config(
    conn: &mut SqliteConnection,
    playlist_item_id: &str,
    widget_id: &str,
    options: &Map<String, Value>,
    data: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<WidgetConfigRow> {
    let row = WidgetConfigRow {
        id: Uuid::new_v4().to_string(),
        widget_id: widget_id.to_string(),
        playlist_item_id: playlist_item_id.to_string(),
        options: Json(options.clone()),
        data: Json(data.clone()),
        version: 1,
        last_request_at: None,
        inserted_at: now,
        updated_at: now,
    };

    sqlx::query(&format!(
        "INSERT INTO widget_configs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        CONFIG_COLUMNS
    ))
    .bind(&row.id)
    .bind(&row.widget_id)
    .bind(&row.playlist_item_id)
    .bind(&row.options)
    .bind(&row.data)
    .bind(row.version)
    .bind(row.last_request_at)
    .bind(row.inserted_at)
    .bind(row.updated_at)
    .execute(conn)
    .await?;

    Ok(row)
}

pub async fn get_config_for_item(
    conn: &mut SqliteConnection,
    playlist_item_id: &str,
) -> Result<Option<WidgetConfigRow>> {
    let row = sqlx::query_as::<_, WidgetConfigRow>(&format!(
        "SELECT {} FROM widget_configs WHERE playlist_item_id = ?",
        CONFIG_COLUMNS
    ))
    .bind(playlist_item_id)
    .fetch_optional(conn)
    .await?;

    Ok(row)
}

/// Configs of every item in a playlist
pub async fn list_configs_for_playlist(
    conn: &mut SqliteConnection,
    playlist_id: Uuid,
) -> Result<Vec<WidgetConfigRow>> {
    let rows = sqlx::query_as::<_, WidgetConfigRow>(
        r#"
        SELECT wc.id, wc.widget_id, wc.playlist_item_id, wc.options, wc.data, wc.version,
               wc.last_request_at, wc.inserted_at, wc.updated_at
        FROM widget_configs wc
        JOIN playlist_items pi ON pi.id = wc.playlist_item_id
        WHERE pi.playlist_id = ?
        "#,
    )
    .bind(playlist_id.to_string())
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

/// Replace options (and optionally data) of an item's config, bumping the version
pub async fn reconfigure(
    conn: &mut SqliteConnection,
    playlist_item_id: Uuid,
    options: &Map<String, Value>,
    data: Option<&Map<String, Value>>,
    now: DateTime<Utc>,
) -> Result<WidgetConfigRow> {
    let row = sqlx::query_as::<_, WidgetConfigRow>(&format!(
        "UPDATE widget_configs \
         SET options = ?, data = COALESCE(?, data), version = version + 1, updated_at = ? \
         WHERE playlist_item_id = ? \
         RETURNING {}",
        CONFIG_COLUMNS
    ))
    .bind(Json(options))
    .bind(data.map(Json))
    .bind(now)
    .bind(playlist_item_id.to_string())
    .fetch_optional(conn)
    .await?;

    row.ok_or(Error::ItemNotFound(playlist_item_id))
}

/// Stamp the time integration data was last served for a config
pub async fn touch_last_request(pool: &SqlitePool, config_id: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE widget_configs SET last_request_at = ? WHERE id = ?")
        .bind(now)
        .bind(config_id)
        .execute(pool)
        .await?;

    Ok(())
}
