//! Refresh-cycle orchestration: concurrent source fan-out, admission
//! filtering, and write-through to the deal store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fdr_adapters::{
    adapter_for_platform, AdapterError, FetchContext, HttpClient, HttpClientConfig, SourceAdapter,
};
use fdr_core::{derive_discount_percentage, Deal, DealDraft, NewDeal, Platform};
use fdr_store::DealStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fdr-engine";

/// Minimum recomputed discount a candidate needs to be persisted.
pub const DEFAULT_MIN_DISCOUNT: u8 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry yaml")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub platform: Platform,
    pub display_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub min_discount: u8,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub sources_path: PathBuf,
    pub scheduler_enabled: bool,
    pub refresh_cron: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_discount: DEFAULT_MIN_DISCOUNT,
            http_timeout_secs: 20,
            user_agent: "fdr-bot/0.1".to_string(),
            sources_path: PathBuf::from("./sources.yaml"),
            scheduler_enabled: false,
            refresh_cron: "0 0 */6 * * *".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_discount: std::env::var("FDR_MIN_DISCOUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_discount),
            http_timeout_secs: std::env::var("FDR_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            user_agent: std::env::var("FDR_USER_AGENT").unwrap_or(defaults.user_agent),
            sources_path: std::env::var("FDR_SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.sources_path),
            scheduler_enabled: std::env::var("FDR_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.scheduler_enabled),
            refresh_cron: std::env::var("FDR_REFRESH_CRON").unwrap_or(defaults.refresh_cron),
        }
    }
}

/// Outcome for one source within a refresh cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub platform: Platform,
    pub admitted: usize,
    pub below_threshold: usize,
    pub invalid: usize,
    pub error: Option<String>,
}

impl SourceOutcome {
    fn empty(platform: Platform) -> Self {
        Self {
            platform,
            admitted: 0,
            below_threshold: 0,
            invalid: 0,
            error: None,
        }
    }

    fn failed(platform: Platform, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(platform)
        }
    }
}

/// Per-run report compiled after every source has finished or failed.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub expired_cleared: usize,
    pub total_admitted: usize,
    pub sources: Vec<SourceOutcome>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a refresh cycle is already in progress")]
    RefreshInProgress,
    #[error("all sources failed or admitted zero deals")]
    AggregationFailed(Box<RefreshReport>),
    #[error("no configured source for platform {0}")]
    UnknownSource(Platform),
    #[error("source {platform} failed")]
    SourceFailed {
        platform: Platform,
        #[source]
        source: AdapterError,
    },
}

struct EngineSource {
    config: SourceConfig,
    adapter: Arc<dyn SourceAdapter>,
}

/// Runs refresh cycles against the deal store. At most one cycle executes
/// at a time; a second trigger is rejected synchronously, never queued.
pub struct AggregationEngine {
    store: Arc<DealStore>,
    http: Arc<HttpClient>,
    sources: Vec<EngineSource>,
    min_discount: u8,
    in_flight: AtomicBool,
}

/// Clears the in-progress flag on every exit path, including panics in the
/// cycle body.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AggregationEngine {
    pub fn new(store: Arc<DealStore>, config: &EngineConfig, registry: SourceRegistry) -> Result<Self> {
        let http = HttpClient::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..HttpClientConfig::default()
        })
        .context("building http client")?;

        let sources = registry
            .sources
            .into_iter()
            .map(|config| EngineSource {
                adapter: Arc::from(adapter_for_platform(config.platform)),
                config,
            })
            .collect();

        Ok(Self {
            store,
            http: Arc::new(http),
            sources,
            min_discount: config.min_discount,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Constructor with explicit adapters, used by tests to stand in for
    /// live sources.
    pub fn with_adapters(
        store: Arc<DealStore>,
        http: HttpClient,
        sources: Vec<(SourceConfig, Arc<dyn SourceAdapter>)>,
        min_discount: u8,
    ) -> Self {
        Self {
            store,
            http: Arc::new(http),
            sources: sources
                .into_iter()
                .map(|(config, adapter)| EngineSource { config, adapter })
                .collect(),
            min_discount,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<DealStore> {
        &self.store
    }

    fn acquire_guard(&self) -> Result<RefreshGuard<'_>, EngineError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::RefreshInProgress);
        }
        Ok(RefreshGuard(&self.in_flight))
    }

    fn fetch_context(config: &SourceConfig, run_id: Uuid) -> FetchContext {
        FetchContext {
            run_id,
            endpoint: config.endpoint.clone(),
            api_key: config
                .api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok()),
            api_key_env: config.api_key_env.clone(),
        }
    }

    /// One full refresh cycle: sweep, fan out to every enabled source,
    /// admit candidates, compile the report. Partial success is success;
    /// the cycle fails only when no source contributed a single deal.
    pub async fn refresh(&self) -> Result<RefreshReport, EngineError> {
        let _guard = self.acquire_guard()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let expired_cleared = self.store.sweep_expired(started_at).await;
        info!(%run_id, expired_cleared, "refresh cycle started");

        let mut tasks: JoinSet<(Platform, Result<Vec<DealDraft>, AdapterError>)> = JoinSet::new();
        for source in self.sources.iter().filter(|s| s.config.enabled) {
            let adapter = Arc::clone(&source.adapter);
            let http = Arc::clone(&self.http);
            let ctx = Self::fetch_context(&source.config, run_id);
            let platform = source.config.platform;
            tasks.spawn(async move { (platform, adapter.fetch(&http, &ctx).await) });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((platform, Ok(drafts))) => {
                    outcomes.push(self.admit_drafts(platform, drafts).await);
                }
                Ok((platform, Err(err))) => {
                    warn!(%run_id, %platform, error = %err, "source failed");
                    outcomes.push(SourceOutcome::failed(platform, err.to_string()));
                }
                Err(join_err) => {
                    // A panicking adapter is isolated to its own task.
                    warn!(%run_id, error = %join_err, "adapter task aborted");
                }
            }
        }
        outcomes.sort_by_key(|outcome| outcome.platform);

        let total_admitted = outcomes.iter().map(|outcome| outcome.admitted).sum();
        let report = RefreshReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            expired_cleared,
            total_admitted,
            sources: outcomes,
        };

        if report.total_admitted == 0 {
            warn!(%run_id, "refresh cycle admitted nothing");
            return Err(EngineError::AggregationFailed(Box::new(report)));
        }
        info!(%run_id, total_admitted, "refresh cycle finished");
        Ok(report)
    }

    /// Single-source cycle: no sweep, and the source's failure propagates
    /// directly since there is no partial success to fall back on.
    pub async fn refresh_one(&self, platform: Platform) -> Result<SourceOutcome, EngineError> {
        let _guard = self.acquire_guard()?;

        let source = self
            .sources
            .iter()
            .find(|s| s.config.enabled && s.config.platform == platform)
            .ok_or(EngineError::UnknownSource(platform))?;

        let run_id = Uuid::new_v4();
        let ctx = Self::fetch_context(&source.config, run_id);
        let drafts = source
            .adapter
            .fetch(&self.http, &ctx)
            .await
            .map_err(|source| EngineError::SourceFailed { platform, source })?;

        Ok(self.admit_drafts(platform, drafts).await)
    }

    /// Recomputes each candidate's discount from its price pair, drops
    /// sub-threshold candidates, and persists the rest as new records.
    /// Validation rejects count against the source without failing it.
    async fn admit_drafts(&self, platform: Platform, drafts: Vec<DealDraft>) -> SourceOutcome {
        let mut outcome = SourceOutcome::empty(platform);

        for draft in drafts {
            let discount = derive_discount_percentage(draft.original_price, draft.discounted_price);
            if discount < self.min_discount {
                outcome.below_threshold += 1;
                continue;
            }

            let new = NewDeal {
                title: draft.title,
                platform: draft.platform,
                category: draft.category,
                original_price: draft.original_price,
                discounted_price: draft.discounted_price,
                discount_percentage: discount,
                image_url: draft.image_url,
                deal_url: draft.deal_url,
                expires_at: draft.expires_at,
            };
            let deal = match Deal::create(new) {
                Ok(deal) => deal,
                Err(err) => {
                    warn!(%platform, error = %err, "candidate failed validation");
                    outcome.invalid += 1;
                    continue;
                }
            };
            match self.store.create(deal).await {
                Ok(_) => outcome.admitted += 1,
                Err(err) => {
                    warn!(%platform, error = %err, "candidate rejected by store");
                    outcome.invalid += 1;
                }
            }
        }

        outcome
    }

    /// Optional cron-driven refresh, mirroring how deployments keep the
    /// inventory fresh without an external trigger.
    pub async fn maybe_build_scheduler(
        self: &Arc<Self>,
        config: &EngineConfig,
    ) -> Result<Option<JobScheduler>> {
        if !config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let engine = Arc::clone(self);
        let job = Job::new_async(config.refresh_cron.as_str(), move |_uuid, _lock| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                match engine.refresh().await {
                    Ok(report) => {
                        info!(run_id = %report.run_id, total_admitted = report.total_admitted, "scheduled refresh finished")
                    }
                    Err(EngineError::RefreshInProgress) => {
                        warn!("scheduled refresh skipped; a cycle is already running")
                    }
                    Err(err) => warn!(error = %err, "scheduled refresh failed"),
                }
            })
        })
        .with_context(|| format!("creating refresh job for cron {}", config.refresh_cron))?;
        sched.add(job).await.context("adding refresh job")?;
        Ok(Some(sched))
    }
}
