/// Database models for operators, extension rows, and published snapshots
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Prefix marking an operator that only exists client-side and has never
/// been persisted. Extension writes for such IDs are skipped; a local-only
/// draft path owns them until the operator is first saved.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Whether an operator ID denotes a not-yet-persisted draft
pub fn is_temp_id(operator_id: &str) -> bool {
    operator_id.starts_with(TEMP_ID_PREFIX)
}

/// Publish status of an operator record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Draft,
    Published,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Draft => "draft",
            PublishStatus::Published => "published",
        }
    }
}

/// Primary operator record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub logo_url: Option<String>,
    pub hero_image_url: Option<String>,
    pub rating_overall: f64,
    pub rating_trust: f64,
    pub rating_payout: f64,
    pub rating_support: f64,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub publish_status: String,
    pub scheduled_publish_at: Option<DateTime<Utc>>,
    pub last_auto_saved_at: Option<DateTime<Utc>>,
    /// Opaque draft snapshot written by the auto-save path (JSON text)
    pub draft_data: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bonus offered by an operator, ordered by `order_number`
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Bonus {
    pub id: String,
    pub operator_id: String,
    pub title: String,
    pub description: String,
    pub bonus_type: Option<String>,
    pub value: Option<String>,
    pub promo_code: Option<String>,
    pub order_number: i64,
}

/// Payment method supported by an operator
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub operator_id: String,
    pub method_name: String,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub fee_percentage: Option<f64>,
    pub fee_fixed: Option<f64>,
    pub fee_level: Option<String>,
    pub processing_time: Option<String>,
}

/// Feature flag with an optional highlight
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub operator_id: String,
    pub label: String,
    pub available: bool,
    pub highlighted: bool,
}

/// Security information, at most one row per operator
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Security {
    pub id: String,
    pub operator_id: String,
    pub ssl_enabled: bool,
    pub ssl_provider: Option<String>,
    pub license_number: Option<String>,
    pub license_authority: Option<String>,
    /// JSON array of certification names
    pub compliance_certifications: String,
    pub provably_fair: bool,
    pub provably_fair_description: Option<String>,
    pub complaints_platform: Option<String>,
    pub audit_info: Option<String>,
}

/// FAQ entry with a stable identity used for diff-based upserts
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Faq {
    pub id: String,
    pub operator_id: String,
    pub question: String,
    pub answer: String,
    pub order_number: i64,
}

/// Rich-text content block keyed by section
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContentSection {
    pub id: String,
    pub operator_id: String,
    pub section_key: String,
    pub title: Option<String>,
    pub body_html: String,
    pub order_number: i64,
}

/// Auxiliary media attached to an operator
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: String,
    pub operator_id: String,
    pub kind: String,
    pub url: String,
    pub alt_text: Option<String>,
    pub order_number: i64,
}

/// Editor-supplied SEO overrides
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SeoMetadata {
    pub id: String,
    pub operator_id: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
}

/// Published snapshot row, keyed by slug
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PublishedContent {
    pub slug: String,
    pub operator_id: String,
    /// Fully denormalized public view (JSON text)
    pub content_data: String,
    /// Derived SEO document (JSON text)
    pub seo_data: String,
    pub generated_at: DateTime<Utc>,
}
