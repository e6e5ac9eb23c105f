/// Operator store: primary record persistence
///
/// Draft persistence and publish-state mutation are disjoint write paths.
/// The auto-save path strips the publishing-control fields from any
/// payload before writing; only `mark_published` (called by the publish
/// coordinator) ever flips them.
use crate::{
    error::{PublishError, PublishResult},
    models::{Operator, PublishStatus},
};
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

/// Payload keys the auto-save path must never write
const PUBLISH_CONTROL_FIELDS: &[&str] = &[
    "published",
    "published_at",
    "publishedAt",
    "publish_status",
    "publishStatus",
];

/// Fields for creating a new draft operator
#[derive(Debug, Clone, Default)]
pub struct NewOperator {
    pub id: Option<String>,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub logo_url: Option<String>,
    pub hero_image_url: Option<String>,
    pub rating_overall: f64,
    pub rating_trust: f64,
    pub rating_payout: f64,
    pub rating_support: f64,
}

/// Store for the `operators` table
#[derive(Clone)]
pub struct OperatorStore {
    db: SqlitePool,
}

impl OperatorStore {
    /// Create a new operator store
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Fetch an operator by ID
    pub async fn get(&self, operator_id: &str) -> PublishResult<Option<Operator>> {
        let row = sqlx::query_as::<_, Operator>("SELECT * FROM operators WHERE id = ?1")
            .bind(operator_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row)
    }

    /// Fetch a published operator by slug
    pub async fn get_published_by_slug(&self, slug: &str) -> PublishResult<Option<Operator>> {
        let row = sqlx::query_as::<_, Operator>(
            "SELECT * FROM operators WHERE slug = ?1 AND published = 1",
        )
        .bind(slug)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    /// Create a new draft operator
    pub async fn create(&self, new: NewOperator) -> PublishResult<Operator> {
        let id = new.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO operators
             (id, slug, name, description, logo_url, hero_image_url,
              rating_overall, rating_trust, rating_payout, rating_support,
              published, publish_status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, 'draft', ?11, ?11)",
        )
        .bind(&id)
        .bind(&new.slug)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.logo_url)
        .bind(&new.hero_image_url)
        .bind(new.rating_overall)
        .bind(new.rating_trust)
        .bind(new.rating_payout)
        .bind(new.rating_support)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| PublishError::Internal("Created operator not found".to_string()))
    }

    /// Auto-save draft fields.
    ///
    /// Publishing-control fields are stripped from the payload regardless
    /// of input; the stripped payload is stored as the draft snapshot and
    /// any recognized display fields are applied to their columns.
    pub async fn auto_save(&self, operator_id: &str, payload: Value) -> PublishResult<()> {
        let draft = strip_publish_fields(payload);

        let name = draft.get("name").and_then(Value::as_str).map(String::from);
        let description = draft
            .get("description")
            .and_then(Value::as_str)
            .map(String::from);
        let logo_url = string_field(&draft, &["logoUrl", "logo_url"]);
        let hero_image_url = string_field(&draft, &["heroImageUrl", "hero_image_url"]);

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE operators SET
                name = COALESCE(?1, name),
                description = COALESCE(?2, description),
                logo_url = COALESCE(?3, logo_url),
                hero_image_url = COALESCE(?4, hero_image_url),
                draft_data = ?5,
                last_auto_saved_at = ?6,
                updated_at = ?6
             WHERE id = ?7",
        )
        .bind(name)
        .bind(description)
        .bind(logo_url)
        .bind(hero_image_url)
        .bind(draft.to_string())
        .bind(now)
        .bind(operator_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PublishError::NotFound(format!(
                "Operator {} not found",
                operator_id
            )));
        }

        debug!("Auto-saved draft for operator {}", operator_id);
        Ok(())
    }

    /// Flip the publishing-control fields in one write. Called only by the
    /// publish coordinator after the snapshot commit succeeded.
    pub async fn mark_published(&self, operator_id: &str) -> PublishResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE operators SET
                published = 1,
                published_at = ?1,
                publish_status = ?2,
                updated_at = ?1
             WHERE id = ?3",
        )
        .bind(now)
        .bind(PublishStatus::Published.as_str())
        .bind(operator_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PublishError::Commit(format!(
                "Operator {} disappeared during publish",
                operator_id
            )));
        }

        Ok(())
    }

    /// Deep-copy an operator and all its extension rows to a new ID.
    /// The copy always starts as a draft.
    pub async fn duplicate(&self, operator_id: &str) -> PublishResult<String> {
        let source = self.get(operator_id).await?.ok_or_else(|| {
            PublishError::NotFound(format!("Operator {} not found", operator_id))
        })?;

        let new_id = Uuid::new_v4().to_string();
        let suffix = &new_id[..8];
        let new_slug = format!("{}-copy-{}", source.slug, suffix);
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO operators
             (id, slug, name, description, logo_url, hero_image_url,
              rating_overall, rating_trust, rating_payout, rating_support,
              published, published_at, publish_status, scheduled_publish_at,
              last_auto_saved_at, draft_data, created_at, updated_at)
             SELECT ?1, ?2, name || ' (Copy)', description, logo_url, hero_image_url,
                    rating_overall, rating_trust, rating_payout, rating_support,
                    0, NULL, 'draft', NULL,
                    NULL, draft_data, ?3, ?3
             FROM operators WHERE id = ?4",
        )
        .bind(&new_id)
        .bind(&new_slug)
        .bind(now)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        // Extension rows get fresh IDs derived per row
        sqlx::query(
            "INSERT INTO operator_bonuses
             (id, operator_id, title, description, bonus_type, value, promo_code, order_number)
             SELECT lower(hex(randomblob(16))), ?1, title, description, bonus_type, value,
                    promo_code, order_number
             FROM operator_bonuses WHERE operator_id = ?2",
        )
        .bind(&new_id)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO operator_payment_methods
             (id, operator_id, method_name, min_amount, max_amount, fee_percentage,
              fee_fixed, fee_level, processing_time)
             SELECT lower(hex(randomblob(16))), ?1, method_name, min_amount, max_amount,
                    fee_percentage, fee_fixed, fee_level, processing_time
             FROM operator_payment_methods WHERE operator_id = ?2",
        )
        .bind(&new_id)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO operator_features (id, operator_id, label, available, highlighted)
             SELECT lower(hex(randomblob(16))), ?1, label, available, highlighted
             FROM operator_features WHERE operator_id = ?2",
        )
        .bind(&new_id)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO operator_security
             (id, operator_id, ssl_enabled, ssl_provider, license_number, license_authority,
              compliance_certifications, provably_fair, provably_fair_description,
              complaints_platform, audit_info)
             SELECT lower(hex(randomblob(16))), ?1, ssl_enabled, ssl_provider, license_number,
                    license_authority, compliance_certifications, provably_fair,
                    provably_fair_description, complaints_platform, audit_info
             FROM operator_security WHERE operator_id = ?2",
        )
        .bind(&new_id)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO operator_faqs (id, operator_id, question, answer, order_number)
             SELECT lower(hex(randomblob(16))), ?1, question, answer, order_number
             FROM operator_faqs WHERE operator_id = ?2",
        )
        .bind(&new_id)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO content_sections
             (id, operator_id, section_key, title, body_html, order_number)
             SELECT lower(hex(randomblob(16))), ?1, section_key, title, body_html, order_number
             FROM content_sections WHERE operator_id = ?2",
        )
        .bind(&new_id)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO media_assets (id, operator_id, kind, url, alt_text, order_number)
             SELECT lower(hex(randomblob(16))), ?1, kind, url, alt_text, order_number
             FROM media_assets WHERE operator_id = ?2",
        )
        .bind(&new_id)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO seo_metadata
             (id, operator_id, meta_title, meta_description, canonical_url)
             SELECT lower(hex(randomblob(16))), ?1, meta_title, meta_description, canonical_url
             FROM seo_metadata WHERE operator_id = ?2",
        )
        .bind(&new_id)
        .bind(operator_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Duplicated operator {} as {}", operator_id, new_id);
        Ok(new_id)
    }

    /// Delete an operator. Extension rows cascade; the published snapshot
    /// row (keyed by slug, not FK) is removed explicitly.
    pub async fn delete(&self, operator_id: &str) -> PublishResult<()> {
        let Some(operator) = self.get(operator_id).await? else {
            return Err(PublishError::NotFound(format!(
                "Operator {} not found",
                operator_id
            )));
        };

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM published_operator_content WHERE slug = ?1")
            .bind(&operator.slug)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM operators WHERE id = ?1")
            .bind(operator_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!("Deleted operator {}", operator_id);
        Ok(())
    }
}

/// Remove publishing-control fields from an auto-save payload
fn strip_publish_fields(mut payload: Value) -> Value {
    if let Some(map) = payload.as_object_mut() {
        for field in PUBLISH_CONTROL_FIELDS {
            map.remove(*field);
        }
    }
    payload
}

fn string_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(String::from)
}
