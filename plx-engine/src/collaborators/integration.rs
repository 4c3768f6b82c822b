//! Integration data cache and HTTP fetcher
//!
//! Cached payloads live at one of three scopes (see [`CacheScope`]); a
//! [`CacheKey`] names one slot. The store keeps at most one payload per key.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use plx_common::time;

use super::{IntegrationDataStore, IntegrationFetcher};
use crate::error::{Error, Result};
use crate::schema::{CacheScope, IntegrationDescriptor};

const USER_AGENT: &str = concat!("plx-engine/", env!("CARGO_PKG_VERSION"));

/// One slot of the integration cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    WidgetConfig {
        organization_id: String,
        integration_id: String,
        widget_config_id: String,
    },
    Discriminator {
        organization_id: String,
        integration_id: String,
        discriminator_id: String,
    },
    Organization {
        organization_id: String,
        integration_id: String,
    },
}

impl CacheKey {
    pub fn scope(&self) -> CacheScope {
        match self {
            CacheKey::WidgetConfig { .. } => CacheScope::WidgetConfig,
            CacheKey::Discriminator { .. } => CacheScope::Discriminator,
            CacheKey::Organization { .. } => CacheScope::Organization,
        }
    }

    pub fn organization_id(&self) -> &str {
        match self {
            CacheKey::WidgetConfig { organization_id, .. }
            | CacheKey::Discriminator { organization_id, .. }
            | CacheKey::Organization { organization_id, .. } => organization_id,
        }
    }

    pub fn integration_id(&self) -> &str {
        match self {
            CacheKey::WidgetConfig { integration_id, .. }
            | CacheKey::Discriminator { integration_id, .. }
            | CacheKey::Organization { integration_id, .. } => integration_id,
        }
    }

    fn widget_config_id(&self) -> Option<&str> {
        match self {
            CacheKey::WidgetConfig { widget_config_id, .. } => Some(widget_config_id),
            _ => None,
        }
    }

    fn discriminator_id(&self) -> Option<&str> {
        match self {
            CacheKey::Discriminator { discriminator_id, .. } => Some(discriminator_id),
            _ => None,
        }
    }
}

/// Failure to obtain a fresh integration payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("fetch timed out after {0} ms")]
    Timeout(u64),

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl FetchError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Timeout(_) => "timeout",
            FetchError::Credentials(_) => "credentials",
            FetchError::Malformed(_) => "malformed",
            FetchError::Storage(_) => "storage",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlxIntegrationStore {
    pool: SqlitePool,
}

impl SqlxIntegrationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Save credentials for an organization's integration
    pub async fn set_credentials(
        &self,
        organization_id: &str,
        integration_id: &str,
        credentials: &Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO integration_credentials (organization_id, integration_id, credentials) \
             VALUES (?, ?, ?) \
             ON CONFLICT(organization_id, integration_id) DO UPDATE SET credentials = excluded.credentials",
        )
        .bind(organization_id)
        .bind(integration_id)
        .bind(Json(credentials))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl IntegrationDataStore for SqlxIntegrationStore {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Value>> {
        let data: Option<Json<Value>> = sqlx::query_scalar(
            "SELECT data FROM integration_data \
             WHERE scope = ? AND organization_id = ? AND integration_id = ? \
               AND (? IS NULL OR widget_config_id = ?) \
               AND (? IS NULL OR discriminator_id = ?)",
        )
        .bind(key.scope().as_str())
        .bind(key.organization_id())
        .bind(key.integration_id())
        .bind(key.widget_config_id())
        .bind(key.widget_config_id())
        .bind(key.discriminator_id())
        .bind(key.discriminator_id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(data.map(|Json(value)| value))
    }

    async fn store(&self, key: &CacheKey, data: &Value) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM integration_data \
             WHERE scope = ? AND organization_id = ? AND integration_id = ? \
               AND (? IS NULL OR widget_config_id = ?) \
               AND (? IS NULL OR discriminator_id = ?)",
        )
        .bind(key.scope().as_str())
        .bind(key.organization_id())
        .bind(key.integration_id())
        .bind(key.widget_config_id())
        .bind(key.widget_config_id())
        .bind(key.discriminator_id())
        .bind(key.discriminator_id())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO integration_data \
             (id, organization_id, integration_id, scope, widget_config_id, discriminator_id, data, fetched_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key.organization_id())
        .bind(key.integration_id())
        .bind(key.scope().as_str())
        .bind(key.widget_config_id())
        .bind(key.discriminator_id())
        .bind(Json(data))
        .bind(time::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            scope = key.scope().as_str(),
            integration_id = key.integration_id(),
            "Stored integration data"
        );
        Ok(())
    }

    async fn credentials(&self, organization_id: &str, integration_id: &str) -> Result<Option<Value>> {
        let credentials: Option<Json<Value>> = sqlx::query_scalar(
            "SELECT credentials FROM integration_credentials WHERE organization_id = ? AND integration_id = ?",
        )
        .bind(organization_id)
        .bind(integration_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credentials.map(|Json(value)| value))
    }
}

/// Fetches integration payloads with a GET on the integration's endpoint
///
/// Scalar options become query parameters; an `api_key` or `token` in the
/// credentials is sent as a bearer token.
pub struct HttpFetcher {
    http_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self { http_client })
    }
}

fn query_pairs(options: &Map<String, Value>) -> Vec<(String, String)> {
    options
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

fn bearer_token(credentials: &Value) -> Option<&str> {
    ["api_key", "token"]
        .iter()
        .find_map(|key| credentials.get(*key).and_then(Value::as_str))
}

#[async_trait]
impl IntegrationFetcher for HttpFetcher {
    async fn fetch(
        &self,
        integration: &IntegrationDescriptor,
        credentials: Option<&Value>,
        options: &Map<String, Value>,
    ) -> std::result::Result<Value, FetchError> {
        let endpoint = integration
            .endpoint
            .as_deref()
            .ok_or_else(|| FetchError::Malformed(format!("integration {} has no endpoint", integration.id)))?;

        let token = credentials.and_then(bearer_token);
        if integration.requires_credentials && token.is_none() {
            return Err(FetchError::Credentials(format!(
                "no credentials configured for {}",
                integration.id
            )));
        }

        let mut request = self.http_client.get(endpoint).query(&query_pairs(options));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        debug!(integration_id = %integration.id, endpoint, "Fetching integration data");

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::Credentials(format!("endpoint returned {}", status)));
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("endpoint returned {}", status)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        if !payload.is_object() {
            return Err(FetchError::Malformed("payload is not a JSON object".to_string()));
        }
        Ok(payload)
    }
}
