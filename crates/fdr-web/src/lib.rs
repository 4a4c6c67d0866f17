//! Axum JSON API over the deal store and aggregation engine.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use fdr_core::{Category, Platform, QuerySpec, SortOrder, ValidationError};
use fdr_engine::{AggregationEngine, EngineError};
use fdr_store::{DealStats, DealStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "fdr-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DealStore>,
    pub engine: Arc<AggregationEngine>,
}

impl AppState {
    pub fn new(store: Arc<DealStore>, engine: Arc<AggregationEngine>) -> Self {
        Self { store, engine }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/deals", get(list_deals_handler))
        .route("/api/deals/stats", get(stats_handler))
        .route("/api/deals/{id}", get(deal_by_id_handler))
        .route("/api/deals/refresh", post(refresh_handler))
        .route("/api/deals/refresh/{platform}", post(refresh_one_handler))
        .route("/api/deals/expired", delete(clear_expired_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let port: u16 = std::env::var("FDR_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Raw query string fields, parsed into a [`QuerySpec`] by the handler so
/// a bad value yields a 400 naming the field rather than axum's generic
/// rejection.
#[derive(Debug, Default, Deserialize)]
struct DealsQuery {
    /// Comma-separated platform names.
    platforms: Option<String>,
    /// Comma-separated category names.
    categories: Option<String>,
    min_discount: Option<u16>,
    min_price: Option<i64>,
    max_price: Option<i64>,
    sort_by: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl DealsQuery {
    fn into_spec(self) -> Result<QuerySpec, ValidationError> {
        let mut spec = QuerySpec::default();
        if let Some(raw) = self.platforms {
            spec.platforms = split_list(&raw)
                .map(Platform::from_str)
                .collect::<Result<Vec<_>, _>>()?;
        }
        if let Some(raw) = self.categories {
            spec.categories = split_list(&raw)
                .map(Category::from_str)
                .collect::<Result<Vec<_>, _>>()?;
        }
        if let Some(raw) = self.min_discount {
            let value =
                u8::try_from(raw).map_err(|_| ValidationError::MinDiscountOutOfRange(raw))?;
            spec.min_discount = Some(value);
        }
        spec.min_price = self.min_price;
        spec.max_price = self.max_price;
        if let Some(raw) = self.sort_by {
            spec.sort = SortOrder::from_str(&raw)?;
        }
        if let Some(page) = self.page {
            spec.page = page;
        }
        if let Some(page_size) = self.page_size {
            spec.page_size = page_size;
        }
        spec.validate()?;
        Ok(spec)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    total_deals: usize,
    avg_discount: u8,
    best_discount: u8,
    platforms: usize,
}

impl From<DealStats> for StatsResponse {
    fn from(stats: DealStats) -> Self {
        Self {
            total_deals: stats.total_deals,
            avg_discount: stats.avg_discount,
            best_discount: stats.best_discount,
            platforms: stats.platforms,
        }
    }
}

fn error_response(status: StatusCode, message: &str, detail: impl ToString) -> Response {
    (
        status,
        Json(json!({ "message": message, "error": detail.to_string() })),
    )
        .into_response()
}

async fn list_deals_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DealsQuery>,
) -> Response {
    let spec = match query.into_spec() {
        Ok(spec) => spec,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, "Invalid query", err),
    };
    match state.store.query(&spec).await {
        Ok(page) => Json(page).into_response(),
        Err(StoreError::Validation(err)) => {
            error_response(StatusCode::BAD_REQUEST, "Invalid query", err)
        }
        Err(err) => {
            error!(error = %err, "deal query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch deals", err)
        }
    }
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Response {
    let stats = state.store.stats(Utc::now()).await;
    Json(StatsResponse::from(stats)).into_response()
}

async fn deal_by_id_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, "Invalid deal id", err),
    };
    match state.store.get(id).await {
        Ok(deal) => Json(deal).into_response(),
        Err(StoreError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Deal not found", id)
        }
        Err(err) => {
            error!(error = %err, "deal lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch deal", err)
        }
    }
}

async fn refresh_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.refresh().await {
        Ok(report) => Json(report).into_response(),
        Err(EngineError::RefreshInProgress) => error_response(
            StatusCode::CONFLICT,
            "A refresh is already in progress",
            EngineError::RefreshInProgress,
        ),
        Err(EngineError::AggregationFailed(report)) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "message": "All sources failed to produce deals",
                "report": *report,
            })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "refresh failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Refresh failed", err)
        }
    }
}

async fn refresh_one_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(platform): AxumPath<String>,
) -> Response {
    let platform = match Platform::from_str(&platform) {
        Ok(platform) => platform,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, "Unknown platform", err),
    };
    match state.engine.refresh_one(platform).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(EngineError::RefreshInProgress) => error_response(
            StatusCode::CONFLICT,
            "A refresh is already in progress",
            EngineError::RefreshInProgress,
        ),
        Err(err @ EngineError::UnknownSource(_)) => {
            error_response(StatusCode::NOT_FOUND, "No such source", err)
        }
        Err(err @ EngineError::SourceFailed { .. }) => {
            error_response(StatusCode::BAD_GATEWAY, "Source failed", err)
        }
        Err(err) => {
            error!(error = %err, "single-source refresh failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Refresh failed", err)
        }
    }
}

async fn clear_expired_handler(State(state): State<Arc<AppState>>) -> Response {
    let cleared = state.store.sweep_expired(Utc::now()).await;
    Json(json!({ "cleared": cleared })).into_response()
}
