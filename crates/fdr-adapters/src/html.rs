//! HTML listing extraction shared by the storefront adapters.
//!
//! Each platform supplies a selector set for its listing markup; the walk
//! over deal cards, price normalization, and link/image cleanup are common.
//! Cards missing a usable title or price are skipped, never fatal.

use fdr_core::{Category, DealDraft, Platform};
use scraper::{ElementRef, Html, Selector};

use crate::category::categorize;
use crate::AdapterError;

/// Cap per listing page, matching how many cards a deals page surfaces.
const MAX_CARDS: usize = 15;

#[derive(Debug, Clone, Copy)]
pub struct SelectorSet {
    pub card: &'static str,
    pub title: &'static str,
    /// Second title fragment (e.g. product name after brand), joined with a space.
    pub title_extra: Option<&'static str>,
    pub price: &'static str,
    pub strike_price: Option<&'static str>,
    pub discount_badge: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct HtmlListingRules {
    pub platform: Platform,
    pub base_url: &'static str,
    pub selectors: SelectorSet,
    /// Assumed discount when the listing shows no badge; the engine
    /// recomputes the real percentage from the price pair on admission.
    pub default_discount: u8,
    pub default_category: Category,
}

pub fn parse_listing_html(rules: &HtmlListingRules, html: &str) -> Result<Vec<DealDraft>, AdapterError> {
    let document = Html::parse_document(html);
    let card_selector = compile(rules.selectors.card)?;

    let mut drafts = Vec::new();
    for card in document.select(&card_selector).take(MAX_CARDS) {
        let Some(draft) = parse_card(rules, card)? else {
            continue;
        };
        drafts.push(draft);
    }
    Ok(drafts)
}

fn parse_card(rules: &HtmlListingRules, card: ElementRef<'_>) -> Result<Option<DealDraft>, AdapterError> {
    let mut title = match select_text(card, rules.selectors.title)? {
        Some(title) => title,
        None => return Ok(None),
    };
    if let Some(extra_selector) = rules.selectors.title_extra {
        if let Some(extra) = select_text(card, extra_selector)? {
            title = format!("{title} {extra}");
        }
    }
    if title.len() < 5 {
        return Ok(None);
    }
    if title.len() > 200 {
        let cut = (0..=200).rev().find(|&i| title.is_char_boundary(i)).unwrap_or(0);
        title.truncate(cut);
    }

    let Some(price_text) = select_text(card, rules.selectors.price)? else {
        return Ok(None);
    };
    let Some(discounted_rupees) = parse_rupees(&price_text) else {
        return Ok(None);
    };

    let mut discount = rules.default_discount;
    if let Some(badge_selector) = rules.selectors.discount_badge {
        if let Some(badge_text) = select_text(card, badge_selector)? {
            if let Some(pct) = first_integer(&badge_text) {
                discount = pct.min(100) as u8;
            }
        }
    }

    let mut original_rupees = discounted_rupees;
    if let Some(strike_selector) = rules.selectors.strike_price {
        if let Some(strike_text) = select_text(card, strike_selector)? {
            if let Some(rupees) = parse_rupees(&strike_text) {
                original_rupees = rupees;
            }
        }
    }
    if original_rupees == discounted_rupees && discount > 0 && discount < 100 {
        original_rupees = derive_original(discounted_rupees, discount);
    }
    if original_rupees < discounted_rupees {
        // A strike-through lower than the sale price is junk markup.
        original_rupees = discounted_rupees;
    }

    let image_url = select_attr(card, "img", "src")?.filter(|src| src.starts_with("http"));
    let deal_url = match select_attr(card, "a[href]", "href")? {
        Some(href) if href.starts_with('/') => format!("{}{href}", rules.base_url),
        Some(href) if href.starts_with("http") => href,
        _ => rules.base_url.to_string(),
    };

    Ok(Some(DealDraft {
        category: categorize(&title, rules.default_category),
        title,
        platform: rules.platform,
        original_price: original_rupees * 100,
        discounted_price: discounted_rupees * 100,
        image_url,
        deal_url,
        expires_at: None,
    }))
}

fn compile(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|err| AdapterError::Payload(err.to_string()))
}

fn select_text(scope: ElementRef<'_>, selector: &str) -> Result<Option<String>, AdapterError> {
    let selector = compile(selector)?;
    Ok(scope.select(&selector).next().and_then(|node| {
        let text = node.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }))
}

fn select_attr(
    scope: ElementRef<'_>,
    selector: &str,
    attr: &str,
) -> Result<Option<String>, AdapterError> {
    let selector = compile(selector)?;
    Ok(scope
        .select(&selector)
        .next()
        .and_then(|node| node.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// First run of digits (commas tolerated inside the run) after stripping
/// rupee markers, as an integer rupee amount.
pub fn parse_rupees(text: &str) -> Option<i64> {
    let cleaned = text.replace("Rs.", "").replace('₹', "");
    let mut digits = String::new();
    let mut started = false;
    for ch in cleaned.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            started = true;
        } else if ch == ',' && started {
            continue;
        } else if started {
            break;
        }
    }
    digits.parse().ok()
}

pub fn first_integer(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Reconstructs the list price implied by a sale price and a discount badge.
pub fn derive_original(discounted_rupees: i64, discount_percent: u8) -> i64 {
    let remaining = 1.0 - discount_percent as f64 / 100.0;
    (discounted_rupees as f64 / remaining).round() as i64
}
