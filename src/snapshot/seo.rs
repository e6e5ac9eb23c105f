/// SEO derivation for published snapshots
///
/// Everything here is computed purely from the snapshot. Given the same
/// snapshot the output is identical, so republishing unchanged content
/// produces an identical seo_data document.
use crate::snapshot::generator::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Maximum length of the derived meta description
const DESCRIPTION_MAX_CHARS: usize = 150;

/// Section key the description extract is taken from
const OVERVIEW_SECTION_KEY: &str = "overview";

/// Derived SEO document stored alongside the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeoData {
    pub title: String,
    pub description: String,
    pub og_title: String,
    pub og_description: String,
    pub og_type: String,
    pub og_image: Option<String>,
    pub structured_data: serde_json::Value,
}

/// Compute SEO metadata from a snapshot. No reads, deterministic.
pub fn compute_seo(snapshot: &Snapshot) -> SeoData {
    let operator = &snapshot.operator;

    let title = snapshot
        .seo_metadata
        .as_ref()
        .and_then(|meta| meta.meta_title.clone())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| format!("{} Review: Bonuses, Payment Methods & FAQ", operator.name));

    let description = snapshot
        .seo_metadata
        .as_ref()
        .and_then(|meta| meta.meta_description.clone())
        .filter(|desc| !desc.is_empty())
        .unwrap_or_else(|| derive_description(snapshot));

    let og_image = operator.hero_image.clone().or_else(|| operator.logo.clone());

    let structured_data = json!({
        "@context": "https://schema.org",
        "@type": "Review",
        "itemReviewed": {
            "@type": "Organization",
            "name": operator.name,
            "image": operator.logo,
        },
        "reviewRating": {
            "@type": "Rating",
            "ratingValue": operator.ratings.overall,
            "bestRating": 5,
            "worstRating": 0,
        },
        "author": {
            "@type": "Organization",
            "name": "Operator Review",
        },
    });

    SeoData {
        og_title: title.clone(),
        og_description: description.clone(),
        og_type: "article".to_string(),
        og_image,
        title,
        description,
        structured_data,
    }
}

/// Plain-text extract of the overview section, falling back to the
/// operator description
fn derive_description(snapshot: &Snapshot) -> String {
    let source = snapshot
        .content_sections
        .iter()
        .find(|section| section.section_key == OVERVIEW_SECTION_KEY)
        .map(|section| section.body_html.as_str())
        .unwrap_or(snapshot.operator.description.as_str());

    truncate_plain(&strip_html(source), DESCRIPTION_MAX_CHARS)
}

/// Strip HTML tags and collapse whitespace into single spaces
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                // Tag boundaries separate words
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, ellipsized on overflow
pub fn truncate_plain(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", truncated.trim_end())
}
