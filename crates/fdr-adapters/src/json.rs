//! JSON catalog extraction for API-backed sources (currently Meesho).
//!
//! The catalog feed nests pricing and links under per-item objects; this
//! module flattens one item at a time into a [`DealDraft`], skipping items
//! without a usable name or sale price.

use chrono::{DateTime, Utc};
use fdr_core::{Category, DealDraft, Platform};
use serde_json::Value as JsonValue;

use crate::category::categorize;
use crate::html::derive_original;
use crate::AdapterError;

/// Assumed discount when the feed omits the list price.
const DEFAULT_DISCOUNT: u8 = 50;

pub fn parse_catalog_json(body: &[u8]) -> Result<Vec<DealDraft>, AdapterError> {
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|err| AdapterError::Payload(format!("invalid catalog JSON: {err}")))?;

    let Some(items) = value.get("catalogs").and_then(JsonValue::as_array) else {
        return Err(AdapterError::Payload(
            "catalog JSON missing 'catalogs' array".to_string(),
        ));
    };

    Ok(items.iter().filter_map(parse_catalog_item).collect())
}

fn parse_catalog_item(item: &JsonValue) -> Option<DealDraft> {
    let name = json_str(item, &["name"])?.trim();
    if name.len() < 5 {
        return None;
    }
    let mut title = name.to_string();
    if title.len() > 200 {
        let cut = (0..=200).rev().find(|&i| title.is_char_boundary(i)).unwrap_or(0);
        title.truncate(cut);
    }

    let discounted_rupees = json_i64(item, &["pricing", "deal_price"])?;
    if discounted_rupees < 0 {
        return None;
    }
    let original_rupees = json_i64(item, &["pricing", "mrp"])
        .filter(|&mrp| mrp >= discounted_rupees)
        .unwrap_or_else(|| derive_original(discounted_rupees, DEFAULT_DISCOUNT));

    let category_hint = json_str(item, &["category_name"]).unwrap_or_default();
    let category = categorize(&format!("{title} {category_hint}"), Category::Fashion);

    let image_url = json_str(item, &["image", "url"])
        .filter(|url| url.starts_with("http"))
        .map(ToString::to_string);
    let deal_url = json_str(item, &["share", "url"])
        .map(ToString::to_string)
        .unwrap_or_else(|| "https://www.meesho.com".to_string());

    let expires_at = json_str(item, &["valid_till"])
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc));

    Some(DealDraft {
        title,
        platform: Platform::Meesho,
        category,
        original_price: original_rupees * 100,
        discounted_price: discounted_rupees * 100,
        image_url,
        deal_url,
        expires_at,
    })
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

fn json_i64(value: &JsonValue, path: &[&str]) -> Option<i64> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_i64()
}
