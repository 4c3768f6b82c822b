//! Widget schema interpretation
//!
//! Widgets declare their options and data as JSON schemas. Every
//! per-widget behaviour of the engine (validation, defaults, which options
//! are references, which data fields are lists) is read from these schemas
//! so new widget types need no engine changes.
//!
//! A field is either a bare type name or an object:
//!
//! ```json
//! {
//!   "title": "string",
//!   "max_items": { "type": "number", "default": 10 },
//!   "image": { "type": "ref", "collection": "medias", "required": true },
//!   "layout": { "type": "layout-ref" }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Collection a `ref` field points into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    Medias,
    Playlists,
    Other(String),
}

impl Collection {
    fn parse(name: &str) -> Self {
        match name {
            "medias" => Collection::Medias,
            "playlists" => Collection::Playlists,
            other => Collection::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Map,
    List,
    Ref(Collection),
    /// `{ "layout_id": .., "zones": { <zone>: { "playlist_id": <uuid> } } }`
    LayoutRef,
    /// Unknown type names are carried through unvalidated
    Other(String),
}

impl FieldType {
    fn parse(name: &str, collection: Option<&str>) -> Result<Self, String> {
        Ok(match name {
            "string" | "color" | "url" | "text" => FieldType::String,
            "number" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "map" => FieldType::Map,
            "list" => FieldType::List,
            "layout-ref" => FieldType::LayoutRef,
            "ref" => {
                let collection =
                    collection.ok_or_else(|| "ref field without collection".to_string())?;
                FieldType::Ref(Collection::parse(collection))
            }
            other => FieldType::Other(other.to_string()),
        })
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Map => value.is_object(),
            FieldType::List => value.is_array(),
            FieldType::Ref(Collection::Playlists) => value
                .as_str()
                .map(|s| Uuid::parse_str(s).is_ok())
                .unwrap_or(false),
            FieldType::Ref(_) => value.is_string() || value.is_number(),
            FieldType::LayoutRef => layout_zone_playlists(value).is_ok(),
            FieldType::Other(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
}

impl FieldSpec {
    fn parse(name: &str, raw: &Value) -> Result<Self, String> {
        match raw {
            Value::String(type_name) => Ok(FieldSpec {
                field_type: FieldType::parse(type_name, None)
                    .map_err(|e| format!("field '{}': {}", name, e))?,
                required: false,
                default: None,
            }),
            Value::Object(spec) => {
                let type_name = spec
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| format!("field '{}': missing type", name))?;
                let collection = spec.get("collection").and_then(Value::as_str);
                Ok(FieldSpec {
                    field_type: FieldType::parse(type_name, collection)
                        .map_err(|e| format!("field '{}': {}", name, e))?,
                    required: spec.get("required").and_then(Value::as_bool).unwrap_or(false),
                    default: spec.get("default").cloned(),
                })
            }
            _ => Err(format!("field '{}': schema must be a type name or an object", name)),
        }
    }
}

/// Parsed options or data schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WidgetSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl WidgetSchema {
    pub fn parse(raw: &Map<String, Value>) -> Result<Self, String> {
        let fields = raw
            .iter()
            .map(|(name, spec)| FieldSpec::parse(name, spec).map(|spec| (name.clone(), spec)))
            .collect::<Result<BTreeMap<_, _>, String>>()?;
        Ok(Self { fields })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    /// Fill fields with no explicit value (absent or null) from schema defaults
    pub fn apply_defaults(&self, values: &mut Map<String, Value>) {
        for (name, spec) in &self.fields {
            let Some(default) = &spec.default else {
                continue;
            };
            let missing = values.get(name).map(Value::is_null).unwrap_or(true);
            if missing {
                values.insert(name.clone(), default.clone());
            }
        }
    }

    /// Check required fields and value types
    pub fn validate(&self, values: &Map<String, Value>) -> Result<(), String> {
        for (name, spec) in &self.fields {
            match values.get(name) {
                None | Some(Value::Null) => {
                    if spec.required && spec.default.is_none() {
                        return Err(format!("'{}' is required", name));
                    }
                }
                Some(value) => {
                    if !spec.field_type.accepts(value) {
                        return Err(format!("'{}' is not a valid {:?}", name, spec.field_type));
                    }
                }
            }
        }
        Ok(())
    }

    /// Playlists embedded by these option values, deduplicated
    pub fn playlist_references(&self, values: &Map<String, Value>) -> Result<Vec<Uuid>, String> {
        let mut playlists = Vec::new();

        for (name, spec) in &self.fields {
            let Some(value) = values.get(name).filter(|v| !v.is_null()) else {
                continue;
            };
            match &spec.field_type {
                FieldType::Ref(Collection::Playlists) => {
                    let id = value
                        .as_str()
                        .and_then(|s| Uuid::parse_str(s).ok())
                        .ok_or_else(|| format!("'{}' is not a playlist id", name))?;
                    playlists.push(id);
                }
                FieldType::LayoutRef => {
                    let zones = layout_zone_playlists(value)
                        .map_err(|e| format!("'{}': {}", name, e))?;
                    playlists.extend(zones.into_iter().map(|(_, id)| id));
                }
                _ => {}
            }
        }

        playlists.sort();
        playlists.dedup();
        Ok(playlists)
    }

    /// True when the field is list-typed, or unknown to the schema
    pub fn is_list_field(&self, name: &str) -> bool {
        match self.fields.get(name) {
            Some(spec) => matches!(spec.field_type, FieldType::List | FieldType::Other(_)),
            None => true,
        }
    }
}

/// Zone name and playlist id of every zone in a layout-ref value
pub fn layout_zone_playlists(value: &Value) -> Result<Vec<(String, Uuid)>, String> {
    let zones = value
        .get("zones")
        .and_then(Value::as_object)
        .ok_or_else(|| "layout reference without zones".to_string())?;

    zones
        .iter()
        .map(|(zone, spec)| {
            spec.get("playlist_id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(|id| (zone.clone(), id))
                .ok_or_else(|| format!("zone '{}' has no valid playlist_id", zone))
        })
        .collect()
}

/// Where fetched integration data is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// One payload per widget config
    WidgetConfig,
    /// Shared by configs whose discriminating options match
    #[default]
    Discriminator,
    /// Shared by the whole organization
    Organization,
}

impl CacheScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheScope::WidgetConfig => "widget_config",
            CacheScope::Discriminator => "discriminator",
            CacheScope::Organization => "organization",
        }
    }
}

/// Third-party data source attached to a widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationDescriptor {
    pub id: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub pull_on_demand: bool,
    #[serde(default)]
    pub requires_credentials: bool,
    #[serde(default)]
    pub scope: CacheScope,
    /// Options that distinguish payloads; empty means all options
    #[serde(default)]
    pub discriminator_keys: Vec<String>,
    /// Background refresh period for cacheable integrations
    #[serde(default)]
    pub pull_interval_seconds: Option<u64>,
}

/// Catalog widget with parsed schemas
#[derive(Debug, Clone)]
pub struct Widget {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub template: Value,
    pub options_schema: WidgetSchema,
    pub data_schema: WidgetSchema,
    pub integration: Option<IntegrationDescriptor>,
}

impl Widget {
    /// The renderer-facing part of the widget
    pub fn descriptor(&self) -> WidgetDescriptor {
        WidgetDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            template: self.template.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDescriptor {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub template: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(raw: Value) -> WidgetSchema {
        WidgetSchema::parse(raw.as_object().unwrap()).unwrap()
    }

    fn map(raw: Value) -> Map<String, Value> {
        raw.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_bare_and_object_fields() {
        let s = schema(json!({
            "title": "string",
            "count": { "type": "number", "default": 3, "required": true },
            "image": { "type": "ref", "collection": "medias" },
        }));

        assert_eq!(s.field("title").unwrap().field_type, FieldType::String);
        assert_eq!(s.field("count").unwrap().default, Some(json!(3)));
        assert_eq!(
            s.field("image").unwrap().field_type,
            FieldType::Ref(Collection::Medias)
        );
    }

    #[test]
    fn test_ref_without_collection_rejected() {
        let raw = json!({ "image": { "type": "ref" } });
        assert!(WidgetSchema::parse(raw.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_defaults_fill_absent_and_null_only() {
        let s = schema(json!({
            "x": { "type": "number", "default": 5 },
            "y": { "type": "number", "default": 6 },
            "z": { "type": "number", "default": 7 },
        }));
        let mut values = map(json!({ "x": 1, "y": null }));

        s.apply_defaults(&mut values);

        assert_eq!(values, map(json!({ "x": 1, "y": 6, "z": 7 })));
    }

    #[test]
    fn test_validate_required_and_types() {
        let s = schema(json!({
            "title": { "type": "string", "required": true },
            "speed": "number",
        }));

        assert!(s.validate(&map(json!({ "title": "hi", "speed": 2 }))).is_ok());
        assert!(s.validate(&map(json!({ "speed": 2 }))).unwrap_err().contains("title"));
        assert!(s
            .validate(&map(json!({ "title": "hi", "speed": "fast" })))
            .unwrap_err()
            .contains("speed"));
    }

    #[test]
    fn test_playlist_references_from_ref_and_layout() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let s = schema(json!({
            "fallback": { "type": "ref", "collection": "playlists" },
            "layout": "layout-ref",
            "image": { "type": "ref", "collection": "medias" },
        }));
        let values = map(json!({
            "fallback": a.to_string(),
            "image": "m-1",
            "layout": {
                "layout_id": "split",
                "zones": {
                    "left": { "playlist_id": b.to_string() },
                    "right": { "playlist_id": a.to_string() }
                }
            }
        }));

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(s.playlist_references(&values).unwrap(), expected);
    }

    #[test]
    fn test_bad_zone_is_invalid() {
        let s = schema(json!({ "layout": "layout-ref" }));
        let values = map(json!({ "layout": { "zones": { "left": { "playlist_id": 7 } } } }));

        assert!(s.validate(&values).is_err());
        assert!(s.playlist_references(&values).is_err());
    }

    #[test]
    fn test_list_field_detection() {
        let s = schema(json!({ "items": "list", "title": "string" }));

        assert!(s.is_list_field("items"));
        assert!(!s.is_list_field("title"));
        assert!(s.is_list_field("undeclared"));
    }

    #[test]
    fn test_integration_descriptor_defaults() {
        let integration: IntegrationDescriptor =
            serde_json::from_value(json!({ "id": "rss" })).unwrap();

        assert_eq!(integration.scope, CacheScope::Discriminator);
        assert!(!integration.pull_on_demand);
        assert!(integration.discriminator_keys.is_empty());
    }
}
