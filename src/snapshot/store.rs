/// Published snapshot persistence, keyed by slug
///
/// The snapshot row is only ever replaced whole. Readers must never see a
/// partially written snapshot, so the upsert rewrites every column on
/// conflict rather than patching.
use crate::error::PublishResult;
use crate::models::PublishedContent;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Store for `published_operator_content` rows
#[derive(Clone)]
pub struct SnapshotStore {
    db: SqlitePool,
}

impl SnapshotStore {
    /// Create a new snapshot store
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Full-replace upsert of the snapshot row for a slug
    pub async fn upsert(
        &self,
        slug: &str,
        operator_id: &str,
        content_data: &serde_json::Value,
        seo_data: &serde_json::Value,
        generated_at: DateTime<Utc>,
    ) -> PublishResult<()> {
        sqlx::query(
            "INSERT INTO published_operator_content
             (slug, operator_id, content_data, seo_data, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(slug) DO UPDATE SET
                operator_id = excluded.operator_id,
                content_data = excluded.content_data,
                seo_data = excluded.seo_data,
                generated_at = excluded.generated_at",
        )
        .bind(slug)
        .bind(operator_id)
        .bind(content_data.to_string())
        .bind(seo_data.to_string())
        .bind(generated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Fetch the snapshot row for a slug
    pub async fn get_by_slug(&self, slug: &str) -> PublishResult<Option<PublishedContent>> {
        let row = sqlx::query_as::<_, PublishedContent>(
            "SELECT slug, operator_id, content_data, seo_data, generated_at
             FROM published_operator_content
             WHERE slug = ?1",
        )
        .bind(slug)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    /// Delete the snapshot row for a slug
    pub async fn delete_by_slug(&self, slug: &str) -> PublishResult<()> {
        sqlx::query("DELETE FROM published_operator_content WHERE slug = ?1")
            .bind(slug)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
