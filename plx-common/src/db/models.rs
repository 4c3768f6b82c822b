//! Database models
//!
//! Row structs mirror the tables created in [`super::init`]. Ids are stored
//! as hyphenated UUID text; JSON columns are decoded through `sqlx::types::Json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use uuid::Uuid;

use crate::{Error, Result};

/// Parse a stored id column
pub fn parse_id(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in {}: {} ({})", column, value, e)))
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistRow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One node of a playlist's linked list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistItemRow {
    pub id: String,
    pub playlist_id: String,
    pub prev_item_id: Option<String>,
    pub next_item_id: Option<String>,
    pub offset: i64,
    pub duration: i64,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WidgetConfigRow {
    pub id: String,
    pub widget_id: String,
    pub playlist_item_id: String,
    pub options: Json<Map<String, Value>>,
    pub data: Json<Map<String, Value>>,
    pub version: i64,
    pub last_request_at: Option<DateTime<Utc>>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WidgetRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub template: Json<Value>,
    pub options_schema: Json<Map<String, Value>>,
    pub data_schema: Json<Map<String, Value>>,
    pub integration: Option<Json<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaRow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub mimetype: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaFileRow {
    pub media_id: String,
    pub context: String,
    pub uri: String,
    pub size: Option<i64>,
    pub mimetype: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IntegrationDataRow {
    pub id: String,
    pub organization_id: String,
    pub integration_id: String,
    pub scope: String,
    pub widget_config_id: Option<String>,
    pub discriminator_id: Option<String>,
    pub data: Json<Value>,
    pub fetched_at: DateTime<Utc>,
}
