//! Authoritative in-memory deal collection with expiry-aware queries.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use fdr_core::{Deal, DealPatch, Platform, QuerySpec, SortOrder, ValidationError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fdr-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("deal {0} not found")]
    NotFound(Uuid),
    #[error("deal {0} already exists")]
    DuplicateId(Uuid),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One page of query results plus the pre-pagination match count.
#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub deals: Vec<Deal>,
    pub total: usize,
}

/// Summary metrics over the active subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DealStats {
    pub total_deals: usize,
    pub avg_discount: u8,
    pub best_discount: u8,
    pub platforms: usize,
}

/// In-memory deal collection keyed by id.
///
/// Bulk reads (`query`, `stats`) restrict to active records; `get` is
/// expiry-agnostic. All operations take the lock for bounded local work
/// only, so readers and writers interleave freely between calls.
#[derive(Debug, Default)]
pub struct DealStore {
    deals: RwLock<HashMap<Uuid, Deal>>,
}

impl DealStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a constructed deal. `DuplicateId` here indicates an
    /// identifier-generation bug upstream and is logged as such.
    pub async fn create(&self, deal: Deal) -> Result<Deal, StoreError> {
        let mut deals = self.deals.write().await;
        if deals.contains_key(&deal.id) {
            warn!(id = %deal.id, "duplicate deal id on insert");
            return Err(StoreError::DuplicateId(deal.id));
        }
        deals.insert(deal.id, deal.clone());
        Ok(deal)
    }

    /// Lookup by id, including expired records.
    pub async fn get(&self, id: Uuid) -> Result<Deal, StoreError> {
        let deals = self.deals.read().await;
        deals.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    /// Applies a partial update and re-validates the merged record. The
    /// stored record is untouched when the result would violate invariants.
    pub async fn update(&self, id: Uuid, patch: DealPatch) -> Result<Deal, StoreError> {
        let mut deals = self.deals.write().await;
        let existing = deals.get(&id).ok_or(StoreError::NotFound(id))?;

        let mut updated = existing.clone();
        if let Some(title) = patch.title {
            updated.title = title;
        }
        if let Some(platform) = patch.platform {
            updated.platform = platform;
        }
        if let Some(category) = patch.category {
            updated.category = category;
        }
        if let Some(original_price) = patch.original_price {
            updated.original_price = original_price;
        }
        if let Some(discounted_price) = patch.discounted_price {
            updated.discounted_price = discounted_price;
        }
        if let Some(discount_percentage) = patch.discount_percentage {
            updated.discount_percentage = discount_percentage;
        }
        if let Some(image_url) = patch.image_url {
            updated.image_url = image_url;
        }
        if let Some(deal_url) = patch.deal_url {
            updated.deal_url = deal_url;
        }
        if let Some(expires_at) = patch.expires_at {
            updated.expires_at = expires_at;
        }

        updated.revalidate()?;
        deals.insert(id, updated.clone());
        Ok(updated)
    }

    /// Removes a deal; returns whether a record was present.
    pub async fn delete(&self, id: Uuid) -> bool {
        let mut deals = self.deals.write().await;
        deals.remove(&id).is_some()
    }

    /// Deletes every record whose expiry is at or before `now`; returns the
    /// count removed. Idempotent for a fixed `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut deals = self.deals.write().await;
        let before = deals.len();
        deals.retain(|_, deal| deal.is_active(now));
        let cleared = before - deals.len();
        if cleared > 0 {
            debug!(cleared, "swept expired deals");
        }
        cleared
    }

    /// Filtered, sorted, paginated read over the active subset.
    pub async fn query(&self, spec: &QuerySpec) -> Result<QueryPage, StoreError> {
        spec.validate()?;
        let now = Utc::now();

        let mut matched: Vec<Deal> = {
            let deals = self.deals.read().await;
            deals
                .values()
                .filter(|deal| deal.is_active(now))
                .filter(|deal| spec.platforms.is_empty() || spec.platforms.contains(&deal.platform))
                .filter(|deal| {
                    spec.categories.is_empty() || spec.categories.contains(&deal.category)
                })
                .filter(|deal| {
                    spec.min_discount
                        .is_none_or(|min| deal.discount_percentage >= min)
                })
                .filter(|deal| spec.min_price.is_none_or(|min| deal.discounted_price >= min))
                .filter(|deal| spec.max_price.is_none_or(|max| deal.discounted_price <= max))
                .cloned()
                .collect()
        };

        matched.sort_by(|a, b| compare_deals(a, b, spec.sort));

        let total = matched.len();
        let start = (spec.page as usize - 1).saturating_mul(spec.page_size as usize);
        let deals = matched
            .into_iter()
            .skip(start)
            .take(spec.page_size as usize)
            .collect();

        Ok(QueryPage { deals, total })
    }

    /// Summary metrics over the records active at `now`.
    pub async fn stats(&self, now: DateTime<Utc>) -> DealStats {
        let deals = self.deals.read().await;
        let active: Vec<&Deal> = deals.values().filter(|deal| deal.is_active(now)).collect();

        let total_deals = active.len();
        if total_deals == 0 {
            return DealStats {
                total_deals: 0,
                avg_discount: 0,
                best_discount: 0,
                platforms: 0,
            };
        }

        let discount_sum: u64 = active
            .iter()
            .map(|deal| deal.discount_percentage as u64)
            .sum();
        let avg_discount =
            ((discount_sum as f64 / total_deals as f64).round() as u64).min(100) as u8;
        let best_discount = active
            .iter()
            .map(|deal| deal.discount_percentage)
            .max()
            .unwrap_or(0);
        let platforms = active
            .iter()
            .map(|deal| deal.platform)
            .collect::<HashSet<Platform>>()
            .len();

        DealStats {
            total_deals,
            avg_discount,
            best_discount,
            platforms,
        }
    }

    pub async fn len(&self) -> usize {
        self.deals.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.deals.read().await.is_empty()
    }
}

/// Requested order first, then ascending id so repeated queries over
/// unchanged data paginate identically.
fn compare_deals(a: &Deal, b: &Deal, sort: SortOrder) -> Ordering {
    let primary = match sort {
        SortOrder::DiscountDesc => b.discount_percentage.cmp(&a.discount_percentage),
        SortOrder::DiscountAsc => a.discount_percentage.cmp(&b.discount_percentage),
        SortOrder::PriceAsc => a.discounted_price.cmp(&b.discounted_price),
        SortOrder::PriceDesc => b.discounted_price.cmp(&a.discounted_price),
        SortOrder::Platform => a.platform.as_str().cmp(b.platform.as_str()),
        SortOrder::Newest => b.scraped_at.cmp(&a.scraped_at),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fdr_core::{Category, NewDeal};

    fn new_deal(platform: Platform, discount: u8, discounted_price: i64) -> NewDeal {
        let original_price = if discount >= 100 {
            discounted_price.max(1) * 100
        } else {
            // Pick an original so that the stored pair is self-consistent.
            ((discounted_price as f64) / (1.0 - discount as f64 / 100.0)).round() as i64
        };
        NewDeal {
            title: format!("{platform} deal at {discount}% off"),
            platform,
            category: Category::Electronics,
            original_price: original_price.max(discounted_price.max(1)),
            discounted_price,
            discount_percentage: discount,
            image_url: None,
            deal_url: format!("https://{platform}.example/deal"),
            expires_at: None,
        }
    }

    async fn insert(store: &DealStore, new: NewDeal) -> Deal {
        let deal = Deal::create(new).expect("valid deal");
        store.create(deal).await.expect("insert")
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = DealStore::new();
        let deal = insert(&store, new_deal(Platform::Amazon, 50, 100)).await;
        let fetched = store.get(deal.id).await.expect("present");
        assert_eq!(fetched, deal);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let store = DealStore::new();
        let deal = insert(&store, new_deal(Platform::Amazon, 50, 100)).await;
        let err = store.create(deal.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == deal.id));
    }

    #[tokio::test]
    async fn get_missing_id_is_not_found() {
        let store = DealStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_merges_and_revalidates() {
        let store = DealStore::new();
        let deal = insert(&store, new_deal(Platform::Amazon, 50, 100)).await;

        let updated = store
            .update(
                deal.id,
                DealPatch {
                    title: Some("Updated title".to_string()),
                    image_url: Some(Some("https://img.example/1.jpg".to_string())),
                    ..DealPatch::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.title, "Updated title");
        assert_eq!(updated.image_url.as_deref(), Some("https://img.example/1.jpg"));
        assert_eq!(updated.id, deal.id);
        assert_eq!(updated.scraped_at, deal.scraped_at);
    }

    #[tokio::test]
    async fn invalid_update_leaves_record_untouched() {
        let store = DealStore::new();
        let deal = insert(&store, new_deal(Platform::Amazon, 50, 100)).await;

        let err = store
            .update(
                deal.id,
                DealPatch {
                    discounted_price: Some(deal.original_price + 1),
                    ..DealPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let fetched = store.get(deal.id).await.expect("present");
        assert_eq!(fetched.discounted_price, deal.discounted_price);
    }

    #[tokio::test]
    async fn update_can_clear_expiry() {
        let store = DealStore::new();
        let mut new = new_deal(Platform::Amazon, 50, 100);
        new.expires_at = Some(Utc::now() + Duration::hours(1));
        let deal = insert(&store, new).await;

        let updated = store
            .update(
                deal.id,
                DealPatch {
                    expires_at: Some(None),
                    ..DealPatch::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.expires_at, None);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = DealStore::new();
        let deal = insert(&store, new_deal(Platform::Amazon, 50, 100)).await;
        assert!(store.delete(deal.id).await);
        assert!(!store.delete(deal.id).await);
    }

    #[tokio::test]
    async fn sweep_is_idempotent_for_a_fixed_now() {
        let store = DealStore::new();
        let now = Utc::now();

        let mut expired = new_deal(Platform::Amazon, 50, 100);
        expired.expires_at = Some(now - Duration::seconds(1));
        insert(&store, expired).await;

        let mut boundary = new_deal(Platform::Flipkart, 60, 200);
        boundary.expires_at = Some(now);
        insert(&store, boundary).await;

        let mut alive = new_deal(Platform::Myntra, 70, 300);
        alive.expires_at = Some(now + Duration::hours(1));
        insert(&store, alive).await;

        assert_eq!(store.sweep_expired(now).await, 2);
        assert_eq!(store.sweep_expired(now).await, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn expired_deal_is_invisible_before_sweep() {
        let store = DealStore::new();
        let now = Utc::now();
        let mut new = new_deal(Platform::Amazon, 50, 100);
        new.expires_at = Some(now - Duration::seconds(1));
        let deal = insert(&store, new).await;

        let page = store.query(&QuerySpec::default()).await.expect("query");
        assert_eq!(page.total, 0);
        assert!(page.deals.is_empty());

        let stats = store.stats(now).await;
        assert_eq!(stats.total_deals, 0);
        assert_eq!(stats.avg_discount, 0);
        assert_eq!(stats.best_discount, 0);
        assert_eq!(stats.platforms, 0);

        // Id lookup stays expiry-agnostic.
        assert!(store.get(deal.id).await.is_ok());

        assert_eq!(store.sweep_expired(now).await, 1);
        assert!(store.get(deal.id).await.is_err());
    }

    #[tokio::test]
    async fn discount_desc_ties_break_by_ascending_id() {
        let store = DealStore::new();
        let a = insert(&store, new_deal(Platform::Amazon, 50, 100)).await;
        let b = insert(&store, new_deal(Platform::Flipkart, 80, 50)).await;
        let c = insert(&store, new_deal(Platform::Amazon, 50, 200)).await;

        let page = store
            .query(&QuerySpec {
                sort: SortOrder::DiscountDesc,
                ..QuerySpec::default()
            })
            .await
            .expect("query");

        let (first_tied, second_tied) = if a.id < c.id { (a.id, c.id) } else { (c.id, a.id) };
        let ids: Vec<Uuid> = page.deals.iter().map(|deal| deal.id).collect();
        assert_eq!(ids, vec![b.id, first_tied, second_tied]);
    }

    #[tokio::test]
    async fn filters_are_conjunctive_and_monotonic() {
        let store = DealStore::new();
        insert(&store, new_deal(Platform::Amazon, 30, 500)).await;
        insert(&store, new_deal(Platform::Amazon, 60, 1500)).await;
        insert(&store, new_deal(Platform::Flipkart, 60, 500)).await;
        insert(&store, new_deal(Platform::Myntra, 90, 2500)).await;

        let mut spec = QuerySpec::default();
        let unfiltered = store.query(&spec).await.expect("query").total;
        assert_eq!(unfiltered, 4);

        spec.platforms = vec![Platform::Amazon, Platform::Flipkart];
        let by_platform = store.query(&spec).await.expect("query").total;
        assert!(by_platform <= unfiltered);
        assert_eq!(by_platform, 3);

        spec.min_discount = Some(60);
        let by_discount = store.query(&spec).await.expect("query").total;
        assert!(by_discount <= by_platform);
        assert_eq!(by_discount, 2);

        spec.min_price = Some(400);
        spec.max_price = Some(1000);
        let by_price = store.query(&spec).await.expect("query").total;
        assert!(by_price <= by_discount);
        assert_eq!(by_price, 1);
    }

    #[tokio::test]
    async fn pagination_concatenation_is_complete_and_duplicate_free() {
        let store = DealStore::new();
        for i in 0..23 {
            insert(&store, new_deal(Platform::Amazon, 20 + (i % 5), 100 + i as i64)).await;
        }

        let full = store
            .query(&QuerySpec {
                sort: SortOrder::PriceAsc,
                page_size: 100,
                ..QuerySpec::default()
            })
            .await
            .expect("query");
        assert_eq!(full.total, 23);

        let page_size = 5u32;
        let mut concatenated = Vec::new();
        for page in 1..=full.total.div_ceil(page_size as usize) as u32 {
            let chunk = store
                .query(&QuerySpec {
                    sort: SortOrder::PriceAsc,
                    page,
                    page_size,
                    ..QuerySpec::default()
                })
                .await
                .expect("query");
            assert_eq!(chunk.total, full.total);
            concatenated.extend(chunk.deals);
        }

        assert_eq!(concatenated.len(), full.total);
        let distinct: HashSet<Uuid> = concatenated.iter().map(|deal| deal.id).collect();
        assert_eq!(distinct.len(), full.total);
        assert_eq!(concatenated, full.deals);
    }

    #[tokio::test]
    async fn repeated_queries_return_identical_ordering() {
        let store = DealStore::new();
        for _ in 0..10 {
            insert(&store, new_deal(Platform::Meesho, 40, 750)).await;
        }
        let spec = QuerySpec {
            sort: SortOrder::DiscountDesc,
            ..QuerySpec::default()
        };
        let first = store.query(&spec).await.expect("query");
        let second = store.query(&spec).await.expect("query");
        assert_eq!(first.deals, second.deals);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty_with_full_total() {
        let store = DealStore::new();
        insert(&store, new_deal(Platform::Amazon, 50, 100)).await;

        let page = store
            .query(&QuerySpec {
                page: 9,
                page_size: 10,
                ..QuerySpec::default()
            })
            .await
            .expect("query");
        assert_eq!(page.total, 1);
        assert!(page.deals.is_empty());
    }

    #[tokio::test]
    async fn invalid_spec_is_rejected_before_planning() {
        let store = DealStore::new();
        let err = store
            .query(&QuerySpec {
                page: 0,
                ..QuerySpec::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::PageOutOfRange)
        ));
    }

    #[tokio::test]
    async fn stats_cover_the_active_subset() {
        let store = DealStore::new();
        let now = Utc::now();
        insert(&store, new_deal(Platform::Amazon, 50, 100)).await;
        insert(&store, new_deal(Platform::Flipkart, 70, 200)).await;
        insert(&store, new_deal(Platform::Amazon, 65, 300)).await;

        let mut expired = new_deal(Platform::Meesho, 99, 10);
        expired.expires_at = Some(now - Duration::seconds(1));
        insert(&store, expired).await;

        let stats = store.stats(now).await;
        assert_eq!(stats.total_deals, 3);
        // round((50 + 70 + 65) / 3) = round(61.67) = 62
        assert_eq!(stats.avg_discount, 62);
        assert_eq!(stats.best_discount, 70);
        assert_eq!(stats.platforms, 2);
    }
}
