/// Public content reader
///
/// Public pages prefer the pre-generated snapshot; when no snapshot exists
/// (legacy records, or one was never generated) the same view is assembled
/// live from the primary and extension tables, filtered to published
/// operators. Read-path failures degrade to "treat as unpublished" rather
/// than surfacing errors.
use crate::{
    extensions::ExtensionStore,
    operators::OperatorStore,
    snapshot::{
        generator::{transform_operator, transform_payment_method, transform_security},
        Snapshot, SnapshotStore,
    },
};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read-side access to published operator content
#[derive(Clone)]
pub struct PublicContentReader {
    db: SqlitePool,
    snapshots: SnapshotStore,
    operators: OperatorStore,
    extensions: Arc<ExtensionStore>,
}

impl PublicContentReader {
    /// Create a new reader
    pub fn new(
        db: SqlitePool,
        snapshots: SnapshotStore,
        operators: OperatorStore,
        extensions: Arc<ExtensionStore>,
    ) -> Self {
        Self {
            db,
            snapshots,
            operators,
            extensions,
        }
    }

    /// Fetch the pre-generated snapshot content for a slug.
    ///
    /// `None` on row-not-found and on storage errors alike, so callers can
    /// fall back without the page crashing.
    pub async fn get_by_slug(&self, slug: &str) -> Option<Value> {
        match self.snapshots.get_by_slug(slug).await {
            Ok(Some(row)) => match serde_json::from_str(&row.content_data) {
                Ok(content) => Some(content),
                Err(e) => {
                    warn!("Corrupt snapshot content for slug {}: {}", slug, e);
                    None
                }
            },
            Ok(None) => {
                debug!("No snapshot for slug {}", slug);
                None
            }
            Err(e) => {
                warn!("Snapshot read failed for slug {}: {}", slug, e);
                None
            }
        }
    }

    /// Snapshot-or-fallback view for a slug
    pub async fn get_view(&self, slug: &str) -> Option<Value> {
        if let Some(content) = self.get_by_slug(slug).await {
            return Some(content);
        }

        let snapshot = self.assemble_live(slug).await?;
        serde_json::to_value(&snapshot).ok()
    }

    /// Assemble the public view live from the primary and extension
    /// tables, restricted to published operators. Mirrors the generator's
    /// output shape so pages render identically either way.
    pub async fn assemble_live(&self, slug: &str) -> Option<Snapshot> {
        let operator = match self.operators.get_published_by_slug(slug).await {
            Ok(Some(operator)) => operator,
            Ok(None) => {
                debug!("No published operator for slug {}", slug);
                return None;
            }
            Err(e) => {
                warn!("Live assembly read failed for slug {}: {}", slug, e);
                return None;
            }
        };

        let assembled = tokio::try_join!(
            self.extensions.fetch_bonuses(&operator.id),
            self.extensions.fetch_payment_methods(&operator.id),
            self.extensions.fetch_features(&operator.id),
            self.extensions.fetch_security(&operator.id),
            self.extensions.fetch_faqs(&operator.id),
            self.fetch_content_sections(&operator.id),
            self.fetch_media_assets(&operator.id),
            self.fetch_seo_metadata(&operator.id),
        );

        let (bonuses, payments, features, security, faqs, content_sections, media_assets, seo) =
            match assembled {
                Ok(parts) => parts,
                Err(e) => {
                    warn!("Live assembly failed for slug {}: {}", slug, e);
                    return None;
                }
            };

        Some(Snapshot {
            operator: transform_operator(&operator),
            bonuses,
            payments: payments.iter().map(transform_payment_method).collect(),
            features,
            security: security.as_ref().map(transform_security),
            faqs,
            content_sections,
            media_assets,
            seo_metadata: seo,
        })
    }

    async fn fetch_content_sections(
        &self,
        operator_id: &str,
    ) -> crate::error::PublishResult<Vec<crate::models::ContentSection>> {
        let rows = sqlx::query_as::<_, crate::models::ContentSection>(
            "SELECT id, operator_id, section_key, title, body_html, order_number
             FROM content_sections
             WHERE operator_id = ?1
             ORDER BY order_number ASC",
        )
        .bind(operator_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn fetch_media_assets(
        &self,
        operator_id: &str,
    ) -> crate::error::PublishResult<Vec<crate::models::MediaAsset>> {
        let rows = sqlx::query_as::<_, crate::models::MediaAsset>(
            "SELECT id, operator_id, kind, url, alt_text, order_number
             FROM media_assets
             WHERE operator_id = ?1
             ORDER BY order_number ASC",
        )
        .bind(operator_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn fetch_seo_metadata(
        &self,
        operator_id: &str,
    ) -> crate::error::PublishResult<Option<crate::models::SeoMetadata>> {
        let row = sqlx::query_as::<_, crate::models::SeoMetadata>(
            "SELECT id, operator_id, meta_title, meta_description, canonical_url
             FROM seo_metadata
             WHERE operator_id = ?1",
        )
        .bind(operator_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }
}
