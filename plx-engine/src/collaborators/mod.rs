//! Collaborator boundaries
//!
//! Quota bookkeeping, the widget catalog, the media library, the
//! integration cache, third-party fetches and refresh scheduling are owned
//! by other services. The engine reaches them through these traits; the
//! SQLite and HTTP implementations here make it usable standalone.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::Result;
use crate::schema::{IntegrationDescriptor, Widget};

pub mod catalog;
pub mod integration;
pub mod media;
pub mod quota;
pub mod refresh;

pub use catalog::SqlxWidgetCatalog;
pub use integration::{CacheKey, FetchError, HttpFetcher, SqlxIntegrationStore};
pub use media::{MediaFile, MediaRecord, SqlxMediaLibrary};
pub use quota::SqlxQuotaChecker;
pub use refresh::{ChannelRefreshScheduler, NoopRefreshScheduler, RefreshRequest};

/// Quota-limited resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Playlists,
    PlaylistItems,
    /// Counted for callers that upload media; no engine operation creates one
    Medias,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Playlists => "playlists",
            ResourceType::PlaylistItems => "playlist_items",
            ResourceType::Medias => "medias",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks an organization may create one more resource
///
/// Runs on the mutation's own transaction so the count and the insert
/// commit or roll back together.
#[async_trait]
pub trait QuotaChecker: Send + Sync {
    /// `Err(Error::QuotaExceeded)` when the organization is at its limit
    async fn check_quota(
        &self,
        conn: &mut SqliteConnection,
        organization_id: &str,
        resource_type: ResourceType,
    ) -> Result<()>;
}

#[async_trait]
pub trait WidgetCatalog: Send + Sync {
    async fn get_widget(&self, widget_id: &str) -> Result<Option<Widget>>;
}

#[async_trait]
pub trait MediaLibrary: Send + Sync {
    async fn get_media(&self, media_id: &str) -> Result<Option<MediaRecord>>;
}

/// Cache of third-party payloads
#[async_trait]
pub trait IntegrationDataStore: Send + Sync {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Value>>;

    /// Insert or replace the payload at `key`
    async fn store(&self, key: &CacheKey, data: &Value) -> Result<()>;

    async fn credentials(&self, organization_id: &str, integration_id: &str) -> Result<Option<Value>>;
}

/// Pulls a payload from a third-party source
#[async_trait]
pub trait IntegrationFetcher: Send + Sync {
    async fn fetch(
        &self,
        integration: &IntegrationDescriptor,
        credentials: Option<&Value>,
        options: &Map<String, Value>,
    ) -> std::result::Result<Value, FetchError>;
}

/// Queues background refreshes of cached integration data
///
/// Fire-and-forget: callers log failures and carry on.
pub trait RefreshScheduler: Send + Sync {
    fn schedule(&self, request: RefreshRequest) -> Result<()>;
}

/// Every collaborator the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub quota: Arc<dyn QuotaChecker>,
    pub widgets: Arc<dyn WidgetCatalog>,
    pub media: Arc<dyn MediaLibrary>,
    pub integration_data: Arc<dyn IntegrationDataStore>,
    pub fetcher: Arc<dyn IntegrationFetcher>,
    pub refresh: Arc<dyn RefreshScheduler>,
}

impl Collaborators {
    /// SQLite-backed collaborators with HTTP fetching and no refresh queue
    pub fn sqlite(pool: SqlitePool) -> Result<Self> {
        Ok(Self {
            quota: Arc::new(SqlxQuotaChecker),
            widgets: Arc::new(SqlxWidgetCatalog::new(pool.clone())),
            media: Arc::new(SqlxMediaLibrary::new(pool.clone())),
            integration_data: Arc::new(SqlxIntegrationStore::new(pool)),
            fetcher: Arc::new(HttpFetcher::new()?),
            refresh: Arc::new(NoopRefreshScheduler),
        })
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
