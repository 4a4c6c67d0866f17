//! Parses captured listing payloads for every platform adapter.

use std::fs;
use std::path::{Path, PathBuf};

use fdr_adapters::{
    adapter_for_platform, amazon_adapter, flipkart_adapter, meesho_adapter, myntra_adapter,
    SourceAdapter,
};
use fdr_core::{Category, Platform};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

fn fixture_bytes(platform: &str, file: &str) -> Vec<u8> {
    let path = workspace_root()
        .join("fixtures")
        .join(platform)
        .join("sample")
        .join(file);
    fs::read(&path).unwrap_or_else(|err| panic!("reading {}: {err}", path.display()))
}

#[test]
fn amazon_listing_parses_and_skips_junk_cards() {
    let adapter = amazon_adapter();
    let drafts = adapter
        .parse_payload(&fixture_bytes("amazon", "listing.html"))
        .expect("parse");

    // The sponsored card with a too-short title is dropped.
    assert_eq!(drafts.len(), 2);

    let headphones = &drafts[0];
    assert_eq!(headphones.platform, Platform::Amazon);
    assert_eq!(headphones.category, Category::Electronics);
    assert_eq!(headphones.original_price, 9999_00);
    assert_eq!(headphones.discounted_price, 2799_00);
    assert_eq!(headphones.deal_url, "https://www.amazon.in/deal/123");
    assert_eq!(
        headphones.image_url.as_deref(),
        Some("https://m.media.example/images/headphones.jpg")
    );

    // No strike-through price: the list price is reconstructed from the badge.
    let keyboard = &drafts[1];
    assert_eq!(keyboard.discounted_price, 2399_00);
    assert_eq!(keyboard.original_price, 5998_00);
    assert_eq!(keyboard.image_url, None);
}

#[test]
fn flipkart_listing_maps_categories_from_titles() {
    let adapter = flipkart_adapter();
    let drafts = adapter
        .parse_payload(&fixture_bytes("flipkart", "listing.html"))
        .expect("parse");
    assert_eq!(drafts.len(), 2);

    let phone = &drafts[0];
    assert_eq!(phone.category, Category::Electronics);
    assert_eq!(phone.original_price, 39999_00);
    assert_eq!(phone.discounted_price, 13999_00);
    assert_eq!(phone.deal_url, "https://www.flipkart.com/deal/456");

    let yoga_mat = &drafts[1];
    assert_eq!(yoga_mat.category, Category::Sports);
    assert_eq!(yoga_mat.original_price, 1499_00);
    assert_eq!(yoga_mat.discounted_price, 449_00);
}

#[test]
fn myntra_listing_joins_brand_and_product_titles() {
    let adapter = myntra_adapter();
    let drafts = adapter
        .parse_payload(&fixture_bytes("myntra", "listing.html"))
        .expect("parse");
    assert_eq!(drafts.len(), 2);

    let shoes = &drafts[0];
    assert_eq!(shoes.title, "Nike Men's Premium Running Shoes");
    assert_eq!(shoes.category, Category::Fashion);
    assert_eq!(shoes.original_price, 4999_00);
    assert_eq!(shoes.discounted_price, 999_00);
    assert_eq!(shoes.deal_url, "https://www.myntra.com/deal/789");

    let handbag = &drafts[1];
    assert_eq!(handbag.title, "Lavie Women's Leather Handbag");
    assert_eq!(handbag.category, Category::Fashion);
    assert_eq!(handbag.original_price, 5999_00);
    assert_eq!(handbag.discounted_price, 1499_00);
}

#[test]
fn meesho_catalog_parses_nested_pricing() {
    let adapter = meesho_adapter();
    let drafts = adapter
        .parse_payload(&fixture_bytes("meesho", "catalogs.json"))
        .expect("parse");
    assert_eq!(drafts.len(), 2);

    let dress = &drafts[0];
    assert_eq!(dress.platform, Platform::Meesho);
    assert_eq!(dress.category, Category::Fashion);
    assert_eq!(dress.original_price, 2999_00);
    assert_eq!(dress.discounted_price, 349_00);
    assert!(dress.expires_at.is_some());

    let wall_art = &drafts[1];
    assert_eq!(wall_art.category, Category::Home);
    assert_eq!(wall_art.expires_at, None);
}

#[test]
fn every_platform_fixture_yields_admissible_prices() {
    let fixtures = [
        (Platform::Amazon, "amazon", "listing.html"),
        (Platform::Flipkart, "flipkart", "listing.html"),
        (Platform::Myntra, "myntra", "listing.html"),
        (Platform::Meesho, "meesho", "catalogs.json"),
    ];
    for (platform, dir, file) in fixtures {
        let adapter = adapter_for_platform(platform);
        let drafts = adapter
            .parse_payload(&fixture_bytes(dir, file))
            .unwrap_or_else(|err| panic!("{platform} fixture failed: {err}"));
        assert!(!drafts.is_empty(), "{platform} fixture produced no drafts");
        for draft in drafts {
            assert!(draft.original_price > 0);
            assert!(draft.discounted_price >= 0);
            assert!(draft.discounted_price <= draft.original_price);
            assert!(!draft.title.is_empty());
            assert!(!draft.deal_url.is_empty());
        }
    }
}
