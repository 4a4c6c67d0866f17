//! Source adapter contracts and one adapter per retail platform.
//!
//! Adapters own the platform-specific payload shape and nothing else: each
//! one fetches its listing through the shared [`HttpClient`] and normalizes
//! the result into [`DealDraft`]s. Parsing is a separate pure seam
//! (`parse_payload`) so fixtures exercise the extraction logic offline.

pub mod category;
pub mod html;
pub mod json;

mod http;

use async_trait::async_trait;
use fdr_core::{Category, DealDraft, Platform};
use thiserror::Error;
use uuid::Uuid;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, HttpClient,
    HttpClientConfig, RetryDisposition,
};

use html::{parse_listing_html, HtmlListingRules, SelectorSet};
use json::parse_catalog_json;

pub const CRATE_NAME: &str = "fdr-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no listing endpoint configured")]
    MissingEndpoint,
    #[error("missing credentials: set {0}")]
    MissingCredentials(String),
    #[error(transparent)]
    Http(#[from] FetchError),
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// Per-call configuration resolved by the engine from the source registry.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    pub run_id: Uuid,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Env var the key was looked up from, for actionable error messages.
    pub api_key_env: Option<String>,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetches the live listing and normalizes it into candidate drafts.
    async fn fetch(
        &self,
        http: &HttpClient,
        ctx: &FetchContext,
    ) -> Result<Vec<DealDraft>, AdapterError>;

    /// Pure payload normalization, shared by `fetch` and fixture tests.
    fn parse_payload(&self, body: &[u8]) -> Result<Vec<DealDraft>, AdapterError>;
}

/// Storefront adapter driven by a per-platform selector set.
#[derive(Debug, Clone, Copy)]
struct HtmlListingAdapter {
    rules: HtmlListingRules,
}

#[async_trait]
impl SourceAdapter for HtmlListingAdapter {
    fn platform(&self) -> Platform {
        self.rules.platform
    }

    async fn fetch(
        &self,
        http: &HttpClient,
        ctx: &FetchContext,
    ) -> Result<Vec<DealDraft>, AdapterError> {
        let endpoint = ctx.endpoint.as_deref().ok_or(AdapterError::MissingEndpoint)?;
        let body = http.fetch_bytes(endpoint, None).await?;
        self.parse_payload(&body)
    }

    fn parse_payload(&self, body: &[u8]) -> Result<Vec<DealDraft>, AdapterError> {
        let text = String::from_utf8_lossy(body);
        parse_listing_html(&self.rules, &text)
    }
}

/// Catalog-API adapter for sources that gate their feed behind a key.
#[derive(Debug, Clone, Copy)]
struct CatalogApiAdapter {
    platform: Platform,
}

#[async_trait]
impl SourceAdapter for CatalogApiAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(
        &self,
        http: &HttpClient,
        ctx: &FetchContext,
    ) -> Result<Vec<DealDraft>, AdapterError> {
        let endpoint = ctx.endpoint.as_deref().ok_or(AdapterError::MissingEndpoint)?;
        let api_key = ctx.api_key.as_deref().ok_or_else(|| {
            AdapterError::MissingCredentials(
                ctx.api_key_env
                    .clone()
                    .unwrap_or_else(|| "MEESHO_API_KEY".to_string()),
            )
        })?;
        let body = http.fetch_bytes(endpoint, Some(api_key)).await?;
        self.parse_payload(&body)
    }

    fn parse_payload(&self, body: &[u8]) -> Result<Vec<DealDraft>, AdapterError> {
        parse_catalog_json(body)
    }
}

pub fn amazon_adapter() -> impl SourceAdapter {
    HtmlListingAdapter {
        rules: HtmlListingRules {
            platform: Platform::Amazon,
            base_url: "https://www.amazon.in",
            selectors: SelectorSet {
                card: "div.deal-card",
                title: ".deal-title",
                title_extra: None,
                price: ".deal-price",
                strike_price: Some(".deal-mrp"),
                discount_badge: Some(".savingsPercentage"),
            },
            default_discount: 30,
            default_category: Category::Electronics,
        },
    }
}

pub fn flipkart_adapter() -> impl SourceAdapter {
    HtmlListingAdapter {
        rules: HtmlListingRules {
            platform: Platform::Flipkart,
            base_url: "https://www.flipkart.com",
            selectors: SelectorSet {
                card: "div._13oc-S",
                title: "div._4rR01T",
                title_extra: None,
                price: "div._30jeq3",
                strike_price: Some("div._3I9_wc"),
                discount_badge: Some("div._3Ay6sb"),
            },
            default_discount: 25,
            default_category: Category::Electronics,
        },
    }
}

pub fn myntra_adapter() -> impl SourceAdapter {
    HtmlListingAdapter {
        rules: HtmlListingRules {
            platform: Platform::Myntra,
            base_url: "https://www.myntra.com",
            selectors: SelectorSet {
                card: "li.product-base",
                title: "h3.product-brand",
                title_extra: Some("h4.product-product"),
                price: "span.product-discountedPrice",
                strike_price: Some("span.product-strike"),
                discount_badge: Some("span.product-discountPercentage"),
            },
            default_discount: 40,
            default_category: Category::Fashion,
        },
    }
}

pub fn meesho_adapter() -> impl SourceAdapter {
    CatalogApiAdapter {
        platform: Platform::Meesho,
    }
}

pub fn adapter_for_platform(platform: Platform) -> Box<dyn SourceAdapter> {
    match platform {
        Platform::Amazon => Box::new(amazon_adapter()),
        Platform::Flipkart => Box::new(flipkart_adapter()),
        Platform::Myntra => Box::new(myntra_adapter()),
        Platform::Meesho => Box::new(meesho_adapter()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catalog_adapter_requires_credentials() {
        let adapter = meesho_adapter();
        let http = HttpClient::new(HttpClientConfig::default()).expect("client");
        let ctx = FetchContext {
            endpoint: Some("https://api.meesho.example/catalogs".to_string()),
            api_key: None,
            api_key_env: Some("MEESHO_API_KEY".to_string()),
            ..FetchContext::default()
        };
        let err = adapter.fetch(&http, &ctx).await.unwrap_err();
        assert!(matches!(err, AdapterError::MissingCredentials(name) if name == "MEESHO_API_KEY"));
    }

    #[tokio::test]
    async fn html_adapter_requires_endpoint() {
        let adapter = amazon_adapter();
        let http = HttpClient::new(HttpClientConfig::default()).expect("client");
        let err = adapter
            .fetch(&http, &FetchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::MissingEndpoint));
    }

    #[test]
    fn registry_covers_every_platform() {
        for platform in Platform::ALL {
            assert_eq!(adapter_for_platform(platform).platform(), platform);
        }
    }
}
