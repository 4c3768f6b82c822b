//! Quota checks against the `quotas` table
//!
//! A missing quota row means the organization is unlimited for that
//! resource type.

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::debug;

use super::{QuotaChecker, ResourceType};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxQuotaChecker;

impl SqlxQuotaChecker {
    async fn usage(
        conn: &mut SqliteConnection,
        organization_id: &str,
        resource_type: ResourceType,
    ) -> Result<i64> {
        let sql = match resource_type {
            ResourceType::Playlists => "SELECT COUNT(*) FROM playlists WHERE organization_id = ?",
            ResourceType::PlaylistItems => {
                "SELECT COUNT(*) FROM playlist_items pi \
                 JOIN playlists p ON p.id = pi.playlist_id \
                 WHERE p.organization_id = ?"
            }
            ResourceType::Medias => "SELECT COUNT(*) FROM medias WHERE organization_id = ?",
        };

        let count: i64 = sqlx::query_scalar(sql)
            .bind(organization_id)
            .fetch_one(conn)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl QuotaChecker for SqlxQuotaChecker {
    async fn check_quota(
        &self,
        conn: &mut SqliteConnection,
        organization_id: &str,
        resource_type: ResourceType,
    ) -> Result<()> {
        let max: Option<i64> = sqlx::query_scalar(
            "SELECT max FROM quotas WHERE organization_id = ? AND resource_type = ?",
        )
        .bind(organization_id)
        .bind(resource_type.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        let Some(max) = max else {
            return Ok(());
        };

        let used = Self::usage(conn, organization_id, resource_type).await?;
        debug!(
            organization_id,
            resource_type = %resource_type,
            used,
            max,
            "Checked quota"
        );

        if used >= max {
            return Err(Error::QuotaExceeded {
                organization_id: organization_id.to_string(),
                resource_type,
            });
        }
        Ok(())
    }
}

/// Set (or replace) an organization's limit for one resource type
pub async fn set_quota(
    conn: &mut SqliteConnection,
    organization_id: &str,
    resource_type: ResourceType,
    max: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO quotas (organization_id, resource_type, max) VALUES (?, ?, ?) \
         ON CONFLICT(organization_id, resource_type) DO UPDATE SET max = excluded.max",
    )
    .bind(organization_id)
    .bind(resource_type.as_str())
    .bind(max)
    .execute(conn)
    .await?;

    Ok(())
}
