//! Widget catalog backed by the `widgets` table

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{SqliteConnection, SqlitePool};

use plx_common::db::WidgetRow;

use super::WidgetCatalog;
use crate::error::{Error, Result};
use crate::schema::{IntegrationDescriptor, Widget, WidgetSchema};

#[derive(Debug, Clone)]
pub struct SqlxWidgetCatalog {
    pool: SqlitePool,
}

impl SqlxWidgetCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WidgetCatalog for SqlxWidgetCatalog {
    async fn get_widget(&self, widget_id: &str) -> Result<Option<Widget>> {
        let row = sqlx::query_as::<_, WidgetRow>(
            "SELECT id, name, slug, description, template, options_schema, data_schema, integration \
             FROM widgets WHERE id = ?",
        )
        .bind(widget_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(widget_from_row).transpose()
    }
}

/// Parse the stored schemas of a catalog row
pub fn widget_from_row(row: WidgetRow) -> Result<Widget> {
    let invalid = |what: &str, e: String| {
        Error::Internal(format!("Widget {} has an invalid {}: {}", row.id, what, e))
    };

    let options_schema =
        WidgetSchema::parse(&row.options_schema.0).map_err(|e| invalid("options schema", e))?;
    let data_schema =
        WidgetSchema::parse(&row.data_schema.0).map_err(|e| invalid("data schema", e))?;
    let integration = match &row.integration {
        Some(Json(raw)) if !raw.is_null() => Some(
            serde_json::from_value::<IntegrationDescriptor>(raw.clone())
                .map_err(|e| invalid("integration", e.to_string()))?,
        ),
        _ => None,
    };

    Ok(Widget {
        id: row.id,
        name: row.name,
        slug: row.slug,
        description: row.description,
        template: row.template.0,
        options_schema,
        data_schema,
        integration,
    })
}

/// Register a widget in the catalog, replacing any widget with the same id
pub async fn upsert_widget(conn: &mut SqliteConnection, row: &WidgetRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO widgets (id, name, slug, description, template, options_schema, data_schema, integration)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            slug = excluded.slug,
            description = excluded.description,
            template = excluded.template,
            options_schema = excluded.options_schema,
            data_schema = excluded.data_schema,
            integration = excluded.integration
        "#,
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(&row.slug)
    .bind(&row.description)
    .bind(&row.template)
    .bind(&row.options_schema)
    .bind(&row.data_schema)
    .bind(&row.integration)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CacheScope;
    use plx_common::db::init_database;
    use serde_json::json;
    use tempfile::TempDir;

    fn row(integration: Option<serde_json::Value>) -> WidgetRow {
        WidgetRow {
            id: "rss".to_string(),
            name: "RSS".to_string(),
            slug: "rss".to_string(),
            description: None,
            template: Json(json!({ "component": "Feed" })),
            options_schema: Json(json!({ "url": "url" }).as_object().unwrap().clone()),
            data_schema: Json(json!({ "entries": "list" }).as_object().unwrap().clone()),
            integration: integration.map(Json),
        }
    }

    #[tokio::test]
    async fn test_round_trips_through_table() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("plx.db")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        upsert_widget(&mut conn, &row(Some(json!({ "id": "rss", "scope": "organization" }))))
            .await
            .unwrap();

        let catalog = SqlxWidgetCatalog::new(pool.clone());
        let widget = catalog.get_widget("rss").await.unwrap().unwrap();
        assert_eq!(widget.integration.unwrap().scope, CacheScope::Organization);
        assert!(widget.data_schema.is_list_field("entries"));
        assert!(catalog.get_widget("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_bad_integration_is_internal_error() {
        let err = widget_from_row(row(Some(json!({ "scope": "planet" })))).unwrap_err();
        assert!(err.to_string().contains("integration"));
    }
}
