//! Reference resolution
//!
//! Replaces reference option values with the objects they name. A
//! reference to something that no longer exists resolves to `null`.

use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{to_json, ContentResolver};
use crate::error::{Error, Result};
use crate::schema::{layout_zone_playlists, Collection, FieldType, WidgetSchema};

impl ContentResolver {
    pub(super) async fn resolve_references(
        &self,
        schema: &WidgetSchema,
        options: &Map<String, Value>,
        organization_id: &str,
        stack: &mut Vec<Uuid>,
    ) -> Result<Map<String, Value>> {
        let mut resolved = options.clone();

        for (name, spec) in schema.fields() {
            let Some(value) = options.get(name).filter(|value| !value.is_null()) else {
                continue;
            };

            let replacement = match &spec.field_type {
                FieldType::Ref(Collection::Medias) => self.resolve_media(value).await?,
                FieldType::Ref(Collection::Playlists) => {
                    match value.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
                        Some(playlist_id) => {
                            self.resolve_playlist(playlist_id, organization_id, stack).await?
                        }
                        None => Value::Null,
                    }
                }
                FieldType::LayoutRef => self.resolve_layout(value, organization_id, stack).await?,
                _ => continue,
            };
            resolved.insert(name.clone(), replacement);
        }

        Ok(resolved)
    }

    async fn resolve_media(&self, value: &Value) -> Result<Value> {
        let media_id = match value {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => return Ok(Value::Null),
        };

        match self.collaborators.media.get_media(&media_id).await? {
            Some(media) => to_json(&media),
            None => {
                debug!(media_id = %media_id, "Referenced media not found");
                Ok(Value::Null)
            }
        }
    }

    /// The nested playlist's resolved items
    async fn resolve_playlist(
        &self,
        playlist_id: Uuid,
        organization_id: &str,
        stack: &mut Vec<Uuid>,
    ) -> Result<Value> {
        match self.render(playlist_id, organization_id, stack).await {
            Ok(items) => to_json(&items),
            Err(Error::PlaylistNotFound(missing)) if missing == playlist_id => {
                debug!(playlist_id = %playlist_id, "Referenced playlist not found");
                Ok(Value::Null)
            }
            Err(e) => Err(e),
        }
    }

    /// The layout value with each zone's resolved items under `items`
    async fn resolve_layout(
        &self,
        value: &Value,
        organization_id: &str,
        stack: &mut Vec<Uuid>,
    ) -> Result<Value> {
        let zones = match layout_zone_playlists(value) {
            Ok(zones) => zones,
            Err(e) => {
                warn!(error = %e, "Skipping malformed layout reference");
                return Ok(value.clone());
            }
        };

        let mut layout = value.clone();
        for (zone, playlist_id) in zones {
            let items = self.resolve_playlist(playlist_id, organization_id, stack).await?;
            if let Some(zone) = layout
                .get_mut("zones")
                .and_then(|zones| zones.get_mut(zone.as_str()))
                .and_then(Value::as_object_mut)
            {
                zone.insert("items".to_string(), items);
            }
        }

        Ok(layout)
    }
}
