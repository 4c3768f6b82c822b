//! Integration-data merge
//!
//! Lookup order is instance, then discriminator, then organization. A miss
//! on an on-demand integration fetches synchronously (bounded by the fetch
//! timeout), stores the payload at the integration's declared scope and
//! uses it. Failures never fail the render: they come back as an
//! [`IntegrationError`] next to default data.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use plx_common::time;

use super::display::MAX_ITEMS_OPTION;
use super::ContentResolver;
use crate::collaborators::{CacheKey, FetchError, RefreshRequest};
use crate::db::widget_configs;
use crate::schema::{CacheScope, IntegrationDescriptor};

static NULL: Value = Value::Null;

/// Advisory failure attached to a resolved item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationError {
    pub code: String,
    pub message: String,
}

impl From<&FetchError> for IntegrationError {
    fn from(err: &FetchError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Cache discriminator for an instance's options
///
/// SHA-256 over the integration id and the canonical JSON of the
/// discriminating option values (all options except `max_items` when none
/// are declared).
/// Instances with equal values share one cached fetch.
pub fn discriminator_id(integration: &IntegrationDescriptor, options: &Map<String, Value>) -> String {
    let selected: BTreeMap<&str, &Value> = if integration.discriminator_keys.is_empty() {
        // The display window is per instance and never splits the cache
        options
            .iter()
            .filter(|(key, _)| key.as_str() != MAX_ITEMS_OPTION)
            .map(|(key, value)| (key.as_str(), value))
            .collect()
    } else {
        integration
            .discriminator_keys
            .iter()
            .map(|key| (key.as_str(), options.get(key).unwrap_or(&NULL)))
            .collect()
    };

    let canonical = serde_json::to_vec(&selected).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(integration.id.as_bytes());
    hasher.update([0u8]);
    hasher.update(&canonical);
    format!("{:x}", hasher.finalize())
}

/// Cache keys in lookup priority order
pub fn lookup_keys(
    integration: &IntegrationDescriptor,
    organization_id: &str,
    widget_config_id: &str,
    options: &Map<String, Value>,
) -> [CacheKey; 3] {
    [
        key_for_scope(CacheScope::WidgetConfig, integration, organization_id, widget_config_id, options),
        key_for_scope(CacheScope::Discriminator, integration, organization_id, widget_config_id, options),
        key_for_scope(CacheScope::Organization, integration, organization_id, widget_config_id, options),
    ]
}

pub fn key_for_scope(
    scope: CacheScope,
    integration: &IntegrationDescriptor,
    organization_id: &str,
    widget_config_id: &str,
    options: &Map<String, Value>,
) -> CacheKey {
    let organization_id = organization_id.to_string();
    let integration_id = integration.id.clone();

    match scope {
        CacheScope::WidgetConfig => CacheKey::WidgetConfig {
            organization_id,
            integration_id,
            widget_config_id: widget_config_id.to_string(),
        },
        CacheScope::Discriminator => CacheKey::Discriminator {
            organization_id,
            integration_id,
            discriminator_id: discriminator_id(integration, options),
        },
        CacheScope::Organization => CacheKey::Organization {
            organization_id,
            integration_id,
        },
    }
}

#[derive(Debug, Default)]
pub(super) struct IntegrationOutcome {
    pub data: Option<Map<String, Value>>,
    pub error: Option<IntegrationError>,
    pub served_at: Option<DateTime<Utc>>,
}

impl ContentResolver {
    pub(super) async fn merge_integration(
        &self,
        integration: &IntegrationDescriptor,
        organization_id: &str,
        widget_config_id: &str,
        options: &Map<String, Value>,
    ) -> IntegrationOutcome {
        let store = &self.collaborators.integration_data;

        for key in lookup_keys(integration, organization_id, widget_config_id, options) {
            match store.lookup(&key).await {
                Ok(Some(Value::Object(payload))) => {
                    debug!(
                        integration_id = %integration.id,
                        scope = key.scope().as_str(),
                        "Integration cache hit"
                    );
                    return IntegrationOutcome {
                        data: Some(payload),
                        error: None,
                        served_at: self.mark_served(widget_config_id).await,
                    };
                }
                Ok(Some(_)) => {
                    warn!(
                        integration_id = %integration.id,
                        scope = key.scope().as_str(),
                        "Ignoring cached integration data that is not a JSON object"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        integration_id = %integration.id,
                        scope = key.scope().as_str(),
                        error = %e,
                        "Integration cache lookup failed"
                    );
                }
            }
        }

        if !integration.pull_on_demand {
            return IntegrationOutcome::default();
        }

        let payload = match self.fetch_on_demand(integration, organization_id, options).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    integration_id = %integration.id,
                    organization_id,
                    error = %e,
                    "On-demand integration fetch failed, rendering with defaults"
                );
                return IntegrationOutcome {
                    error: Some(IntegrationError::from(&e)),
                    ..IntegrationOutcome::default()
                };
            }
        };

        let key = key_for_scope(integration.scope, integration, organization_id, widget_config_id, options);
        let error = match store.store(&key, &Value::Object(payload.clone())).await {
            Ok(()) => {
                self.schedule_refresh(integration, key, options);
                None
            }
            Err(e) => {
                warn!(integration_id = %integration.id, error = %e, "Failed to cache integration data");
                Some(IntegrationError::from(&FetchError::Storage(e.to_string())))
            }
        };

        IntegrationOutcome {
            data: Some(payload),
            error,
            served_at: self.mark_served(widget_config_id).await,
        }
    }

    async fn fetch_on_demand(
        &self,
        integration: &IntegrationDescriptor,
        organization_id: &str,
        options: &Map<String, Value>,
    ) -> Result<Map<String, Value>, FetchError> {
        let credentials = self
            .collaborators
            .integration_data
            .credentials(organization_id, &integration.id)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;

        let timeout = self.settings.fetch_timeout;
        let fetch = self
            .collaborators
            .fetcher
            .fetch(integration, credentials.as_ref(), options);

        match tokio::time::timeout(timeout, fetch).await {
            Err(_) => Err(FetchError::Timeout(timeout.as_millis() as u64)),
            Ok(Err(e)) => Err(e),
            Ok(Ok(Value::Object(payload))) => Ok(payload),
            Ok(Ok(_)) => Err(FetchError::Malformed("payload is not a JSON object".to_string())),
        }
    }

    fn schedule_refresh(&self, integration: &IntegrationDescriptor, key: CacheKey, options: &Map<String, Value>) {
        let Some(seconds) = integration.pull_interval_seconds.filter(|s| *s > 0) else {
            return;
        };

        let request = RefreshRequest {
            key,
            options: options.clone(),
            interval: Duration::from_secs(seconds),
        };
        if let Err(e) = self.collaborators.refresh.schedule(request) {
            warn!(integration_id = %integration.id, error = %e, "Failed to schedule integration refresh");
        }
    }

    /// Stamp `last_request_at`; a failed stamp only loses bookkeeping
    async fn mark_served(&self, widget_config_id: &str) -> Option<DateTime<Utc>> {
        let now = time::now();
        match widget_configs::touch_last_request(&self.pool, widget_config_id, now).await {
            Ok(()) => Some(now),
            Err(e) => {
                warn!(widget_config_id, error = %e, "Failed to record integration request time");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn integration(keys: &[&str]) -> IntegrationDescriptor {
        serde_json::from_value(json!({
            "id": "weather",
            "discriminator_keys": keys,
        }))
        .unwrap()
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_discriminator_ignores_undeclared_options() {
        let weather = integration(&["city"]);

        let a = discriminator_id(&weather, &map(json!({ "city": "Paris", "max_items": 3 })));
        let b = discriminator_id(&weather, &map(json!({ "city": "Paris", "max_items": 10 })));
        let c = discriminator_id(&weather, &map(json!({ "city": "Oslo", "max_items": 3 })));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_discriminator_uses_all_options_when_undeclared() {
        let weather = integration(&[]);

        let a = discriminator_id(&weather, &map(json!({ "city": "Paris", "units": "metric" })));
        let b = discriminator_id(&weather, &map(json!({ "units": "metric", "city": "Paris" })));
        let c = discriminator_id(&weather, &map(json!({ "city": "Paris", "units": "imperial" })));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_undeclared_discriminator_ignores_display_window() {
        let weather = integration(&[]);

        let a = discriminator_id(&weather, &map(json!({ "city": "Paris", "max_items": 2 })));
        let b = discriminator_id(&weather, &map(json!({ "city": "Paris", "max_items": 4 })));
        let c = discriminator_id(&weather, &map(json!({ "city": "Paris" })));

        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_lookup_keys_in_priority_order() {
        let keys = lookup_keys(&integration(&[]), "org", "cfg", &Map::new());
        let scopes: Vec<CacheScope> = keys.iter().map(CacheKey::scope).collect();

        assert_eq!(
            scopes,
            vec![CacheScope::WidgetConfig, CacheScope::Discriminator, CacheScope::Organization]
        );
    }

    #[test]
    fn test_fetch_error_maps_to_code() {
        let error = IntegrationError::from(&FetchError::Timeout(5000));

        assert_eq!(error.code, "timeout");
        assert!(error.message.contains("5000"));
    }
}
