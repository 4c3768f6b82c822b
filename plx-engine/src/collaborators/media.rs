//! Media library backed by the `medias` and `media_files` tables

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;

use plx_common::db::{MediaFileRow, MediaRow};

use super::MediaLibrary;
use crate::error::Result;

/// A media with its files keyed by context (e.g. "original", "thumbnail")
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRecord {
    pub id: String,
    pub name: String,
    pub mimetype: String,
    pub status: String,
    pub files: BTreeMap<String, MediaFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFile {
    pub uri: String,
    pub size: Option<i64>,
    pub mimetype: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SqlxMediaLibrary {
    pool: SqlitePool,
}

impl SqlxMediaLibrary {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaLibrary for SqlxMediaLibrary {
    async fn get_media(&self, media_id: &str) -> Result<Option<MediaRecord>> {
        let Some(media) = sqlx::query_as::<_, MediaRow>(
            "SELECT id, organization_id, name, mimetype, status FROM medias WHERE id = ?",
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let files = sqlx::query_as::<_, MediaFileRow>(
            "SELECT media_id, context, uri, size, mimetype FROM media_files WHERE media_id = ?",
        )
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(MediaRecord {
            id: media.id,
            name: media.name,
            mimetype: media.mimetype,
            status: media.status,
            files: files
                .into_iter()
                .map(|file| {
                    (
                        file.context,
                        MediaFile {
                            uri: file.uri,
                            size: file.size,
                            mimetype: file.mimetype,
                        },
                    )
                })
                .collect(),
        }))
    }
}
