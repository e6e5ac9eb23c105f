/// Static content generator
///
/// Reads an operator's primary record plus all extension tables in
/// parallel and denormalizes them into one self-contained snapshot in the
/// shape consumed by public pages. Returns `Ok(None)` when the primary
/// record is missing; callers treat that as "generation failed, abort
/// publish".
use crate::{
    error::PublishResult,
    extensions::ExtensionStore,
    models::{
        Bonus, ContentSection, Faq, Feature, MediaAsset, Operator, PaymentMethod, Security,
        SeoMetadata,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fee level substituted when a payment method carries none
const DEFAULT_FEE_LEVEL: &str = "Medium";

/// Operator record transformed into the public view shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOperator {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub logo: Option<String>,
    pub hero_image: Option<String>,
    pub ratings: PublicRatings,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Rating sub-scores in the public shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRatings {
    pub overall: f64,
    pub trust: f64,
    pub payout: f64,
    pub support: f64,
}

/// Payment method in the public shape, with fee level defaulted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPaymentMethod {
    pub id: String,
    pub name: String,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub fee_percentage: Option<f64>,
    pub fee_fixed: Option<f64>,
    pub fee_level: String,
    pub processing_time: Option<String>,
}

/// Security info in the public shape, certifications parsed out of JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSecurity {
    pub ssl_enabled: bool,
    pub ssl_provider: Option<String>,
    pub license_number: Option<String>,
    pub license_authority: Option<String>,
    pub compliance_certifications: Vec<String>,
    pub provably_fair: bool,
    pub provably_fair_description: Option<String>,
    pub complaints_platform: Option<String>,
    pub audit_info: Option<String>,
}

/// The fully denormalized snapshot served to public pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub operator: PublicOperator,
    pub bonuses: Vec<Bonus>,
    pub payments: Vec<PublicPaymentMethod>,
    pub features: Vec<Feature>,
    pub security: Option<PublicSecurity>,
    pub faqs: Vec<Faq>,
    pub content_sections: Vec<ContentSection>,
    pub media_assets: Vec<MediaAsset>,
    pub seo_metadata: Option<SeoMetadata>,
}

/// Denormalizes an operator and its extensions into a snapshot
#[derive(Clone)]
pub struct StaticContentGenerator {
    db: SqlitePool,
    extensions: Arc<ExtensionStore>,
}

impl StaticContentGenerator {
    /// Create a new generator
    pub fn new(db: SqlitePool, extensions: Arc<ExtensionStore>) -> Self {
        Self { db, extensions }
    }

    /// Generate the snapshot for an operator.
    ///
    /// `Ok(None)` when the primary record does not exist.
    pub async fn generate(&self, operator_id: &str) -> PublishResult<Option<Snapshot>> {
        let operator = sqlx::query_as::<_, Operator>("SELECT * FROM operators WHERE id = ?1")
            .bind(operator_id)
            .fetch_optional(&self.db)
            .await?;

        let Some(operator) = operator else {
            warn!("Cannot generate snapshot: operator {} not found", operator_id);
            return Ok(None);
        };

        let (bonuses, payments, features, security, faqs, content_sections, media_assets, seo) =
            tokio::try_join!(
                self.extensions.fetch_bonuses(operator_id),
                self.extensions.fetch_payment_methods(operator_id),
                self.extensions.fetch_features(operator_id),
                self.extensions.fetch_security(operator_id),
                self.extensions.fetch_faqs(operator_id),
                self.fetch_content_sections(operator_id),
                self.fetch_media_assets(operator_id),
                self.fetch_seo_metadata(operator_id),
            )?;

        debug!(
            "Generated snapshot for {}: {} bonuses, {} payments, {} features, {} faqs, {} sections",
            operator_id,
            bonuses.len(),
            payments.len(),
            features.len(),
            faqs.len(),
            content_sections.len()
        );

        Ok(Some(Snapshot {
            operator: transform_operator(&operator),
            bonuses,
            payments: payments.iter().map(transform_payment_method).collect(),
            features,
            security: security.as_ref().map(transform_security),
            faqs,
            content_sections,
            media_assets,
            seo_metadata: seo,
        }))
    }

    async fn fetch_content_sections(&self, operator_id: &str) -> PublishResult<Vec<ContentSection>> {
        let rows = sqlx::query_as::<_, ContentSection>(
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

    async fn fetch_media_assets(&self, operator_id: &str) -> PublishResult<Vec<MediaAsset>> {
        let rows = sqlx::query_as::<_, MediaAsset>(
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

    async fn fetch_seo_metadata(&self, operator_id: &str) -> PublishResult<Option<SeoMetadata>> {
        let row = sqlx::query_as::<_, SeoMetadata>(
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

/// Transform the primary record into the public view shape
pub fn transform_operator(operator: &Operator) -> PublicOperator {
    PublicOperator {
        id: operator.id.clone(),
        slug: operator.slug.clone(),
        name: operator.name.clone(),
        description: operator.description.clone(),
        logo: operator.logo_url.clone(),
        hero_image: operator.hero_image_url.clone(),
        ratings: PublicRatings {
            overall: operator.rating_overall,
            trust: operator.rating_trust,
            payout: operator.rating_payout,
            support: operator.rating_support,
        },
        published_at: operator.published_at,
    }
}

/// Transform a payment method, defaulting the fee level
pub fn transform_payment_method(method: &PaymentMethod) -> PublicPaymentMethod {
    PublicPaymentMethod {
        id: method.id.clone(),
        name: method.method_name.clone(),
        min_amount: method.min_amount,
        max_amount: method.max_amount,
        fee_percentage: method.fee_percentage,
        fee_fixed: method.fee_fixed,
        fee_level: method
            .fee_level
            .clone()
            .filter(|level| !level.is_empty())
            .unwrap_or_else(|| DEFAULT_FEE_LEVEL.to_string()),
        processing_time: method.processing_time.clone(),
    }
}

/// Transform the security row, parsing the certifications array
pub fn transform_security(security: &Security) -> PublicSecurity {
    let certifications: Vec<String> =
        serde_json::from_str(&security.compliance_certifications).unwrap_or_default();

    PublicSecurity {
        ssl_enabled: security.ssl_enabled,
        ssl_provider: security.ssl_provider.clone(),
        license_number: security.license_number.clone(),
        license_authority: security.license_authority.clone(),
        compliance_certifications: certifications,
        provably_fair: security.provably_fair,
        provably_fair_description: security.provably_fair_description.clone(),
        complaints_platform: security.complaints_platform.clone(),
        audit_info: security.audit_info.clone(),
    }
}
