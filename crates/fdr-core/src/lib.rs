//! Core domain model for FDR: deals, platforms, categories, query specs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "fdr-core";

/// Retail platforms we aggregate deals from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Flipkart,
    Myntra,
    Meesho,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Amazon,
        Platform::Flipkart,
        Platform::Myntra,
        Platform::Meesho,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Flipkart => "flipkart",
            Platform::Myntra => "myntra",
            Platform::Meesho => "meesho",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(Platform::Amazon),
            "flipkart" => Ok(Platform::Flipkart),
            "myntra" => Ok(Platform::Myntra),
            "meesho" => Ok(Platform::Meesho),
            other => Err(ValidationError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Product categories a deal can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Electronics,
    Fashion,
    Home,
    Beauty,
    Sports,
    Books,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Electronics,
        Category::Fashion,
        Category::Home,
        Category::Beauty,
        Category::Sports,
        Category::Books,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::Fashion => "fashion",
            Category::Home => "home",
            Category::Beauty => "beauty",
            Category::Sports => "sports",
            Category::Books => "books",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "electronics" => Ok(Category::Electronics),
            "fashion" => Ok(Category::Fashion),
            "home" => Ok(Category::Home),
            "beauty" => Ok(Category::Beauty),
            "sports" => Ok(Category::Sports),
            "books" => Ok(Category::Books),
            other => Err(ValidationError::UnknownCategory(other.to_string())),
        }
    }
}

/// Field-level rejection reasons for deal construction and query specs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("deal_url must not be empty")]
    EmptyDealUrl,
    #[error("original_price must be positive, got {0}")]
    NonPositiveOriginalPrice(i64),
    #[error("discounted_price must not be negative, got {0}")]
    NegativeDiscountedPrice(i64),
    #[error("discounted_price {discounted} exceeds original_price {original}")]
    DiscountExceedsOriginal { discounted: i64, original: i64 },
    #[error("discount_percentage {0} is outside 0..=100")]
    DiscountPercentageOutOfRange(u16),
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("unknown sort order '{0}'")]
    UnknownSortOrder(String),
    #[error("min_discount {0} is outside 0..=100")]
    MinDiscountOutOfRange(u16),
    #[error("min_price must not be negative, got {0}")]
    NegativeMinPrice(i64),
    #[error("max_price must not be negative, got {0}")]
    NegativeMaxPrice(i64),
    #[error("page must be at least 1")]
    PageOutOfRange,
    #[error("page_size {0} is outside 1..=100")]
    PageSizeOutOfRange(u32),
}

/// Discount percentage implied by a price pair, rounded to nearest integer.
pub fn derive_discount_percentage(original_price: i64, discounted_price: i64) -> u8 {
    if original_price <= 0 {
        return 0;
    }
    let saved = (original_price - discounted_price).max(0) as f64;
    let pct = (saved / original_price as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Validated input for constructing a [`Deal`]. Prices are in paise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeal {
    pub title: String,
    pub platform: Platform,
    pub category: Category,
    pub original_price: i64,
    pub discounted_price: i64,
    pub discount_percentage: u8,
    pub image_url: Option<String>,
    pub deal_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewDeal {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.deal_url.trim().is_empty() {
            return Err(ValidationError::EmptyDealUrl);
        }
        if self.original_price <= 0 {
            return Err(ValidationError::NonPositiveOriginalPrice(
                self.original_price,
            ));
        }
        if self.discounted_price < 0 {
            return Err(ValidationError::NegativeDiscountedPrice(
                self.discounted_price,
            ));
        }
        if self.discounted_price > self.original_price {
            return Err(ValidationError::DiscountExceedsOriginal {
                discounted: self.discounted_price,
                original: self.original_price,
            });
        }
        if self.discount_percentage > 100 {
            return Err(ValidationError::DiscountPercentageOutOfRange(
                self.discount_percentage as u16,
            ));
        }
        Ok(())
    }
}

/// One discount listing at a moment in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub title: String,
    pub platform: Platform,
    pub category: Category,
    pub original_price: i64,
    pub discounted_price: i64,
    pub discount_percentage: u8,
    pub image_url: Option<String>,
    pub deal_url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
}

impl Deal {
    /// Validates the input and assigns a fresh id plus an ingestion timestamp.
    pub fn create(new: NewDeal) -> Result<Deal, ValidationError> {
        Self::create_at(new, Utc::now())
    }

    pub fn create_at(new: NewDeal, now: DateTime<Utc>) -> Result<Deal, ValidationError> {
        new.validate()?;
        Ok(Deal {
            id: Uuid::new_v4(),
            title: new.title,
            platform: new.platform,
            category: new.category,
            original_price: new.original_price,
            discounted_price: new.discounted_price,
            discount_percentage: new.discount_percentage,
            image_url: new.image_url,
            deal_url: new.deal_url,
            expires_at: new.expires_at,
            scraped_at: now,
        })
    }

    /// Expiry check: absent expiry means the deal never expires.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at > now,
        }
    }

    /// Re-checks the record invariants after a partial update.
    pub fn revalidate(&self) -> Result<(), ValidationError> {
        NewDeal {
            title: self.title.clone(),
            platform: self.platform,
            category: self.category,
            original_price: self.original_price,
            discounted_price: self.discounted_price,
            discount_percentage: self.discount_percentage,
            image_url: self.image_url.clone(),
            deal_url: self.deal_url.clone(),
            expires_at: self.expires_at,
        }
        .validate()
    }
}

/// Normalized candidate record handed from a source adapter to the engine.
///
/// Carries no discount percentage; the engine derives it from the price
/// pair before admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealDraft {
    pub title: String,
    pub platform: Platform,
    pub category: Category,
    pub original_price: i64,
    pub discounted_price: i64,
    pub image_url: Option<String>,
    pub deal_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update for a stored deal. `None` leaves a field untouched; the
/// nullable fields take a double `Option` so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealPatch {
    pub title: Option<String>,
    pub platform: Option<Platform>,
    pub category: Option<Category>,
    pub original_price: Option<i64>,
    pub discounted_price: Option<i64>,
    pub discount_percentage: Option<u8>,
    pub image_url: Option<Option<String>>,
    pub deal_url: Option<String>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl DealPatch {
    pub fn is_empty(&self) -> bool {
        *self == DealPatch::default()
    }
}

/// Sort orders accepted by the query interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    DiscountDesc,
    DiscountAsc,
    PriceAsc,
    PriceDesc,
    Platform,
    #[default]
    Newest,
}

impl FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discount_desc" => Ok(SortOrder::DiscountDesc),
            "discount_asc" => Ok(SortOrder::DiscountAsc),
            "price_asc" => Ok(SortOrder::PriceAsc),
            "price_desc" => Ok(SortOrder::PriceDesc),
            "platform" => Ok(SortOrder::Platform),
            "newest" => Ok(SortOrder::Newest),
            other => Err(ValidationError::UnknownSortOrder(other.to_string())),
        }
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Validated description of one read request against the deal store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub platforms: Vec<Platform>,
    pub categories: Vec<Category>,
    pub min_discount: Option<u8>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub sort: SortOrder,
    pub page: u32,
    pub page_size: u32,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            platforms: Vec::new(),
            categories: Vec::new(),
            min_discount: None,
            min_price: None,
            max_price: None,
            sort: SortOrder::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QuerySpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(min_discount) = self.min_discount {
            if min_discount > 100 {
                return Err(ValidationError::MinDiscountOutOfRange(min_discount as u16));
            }
        }
        if let Some(min_price) = self.min_price {
            if min_price < 0 {
                return Err(ValidationError::NegativeMinPrice(min_price));
            }
        }
        if let Some(max_price) = self.max_price {
            if max_price < 0 {
                return Err(ValidationError::NegativeMaxPrice(max_price));
            }
        }
        if self.page < 1 {
            return Err(ValidationError::PageOutOfRange);
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            return Err(ValidationError::PageSizeOutOfRange(self.page_size));
        }
        Ok(())
    }
}
