//! Interactive path: register the keyword, refresh it if stale, and wait a
//! bounded time for the refresh before answering with whatever is stored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::api::latency::LatencyStats;
use crate::config::{ON_DEMAND_WAIT_SECS, STALE_THRESHOLD_HOURS};
use crate::db::{KeywordRegistry, MetricStore};
use crate::discovery::DiscoveryEngine;
use crate::error::{AppError, Result};
use crate::orchestrator::jobs::Pipeline;
use crate::types::{normalize_keyword, Keyword, Period, ScoreRecord, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Every configured source had data within the staleness threshold.
    Fresh,
    /// A refresh ran and finished inside the wait ceiling.
    Completed,
    /// The wait ceiling passed; the refresh keeps running in the background.
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub keyword: Keyword,
    pub refresh: RefreshOutcome,
    pub score: ScoreRecord,
}

#[derive(Clone)]
pub struct OnDemand {
    registry: KeywordRegistry,
    metrics: MetricStore,
    pipeline: Pipeline,
    discovery: DiscoveryEngine,
    in_flight: Arc<DashMap<String, watch::Receiver<bool>>>,
    latency: Arc<LatencyStats>,
    wait: Duration,
}

impl OnDemand {
    pub fn new(
        registry: KeywordRegistry,
        metrics: MetricStore,
        pipeline: Pipeline,
        discovery: DiscoveryEngine,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self {
            registry,
            metrics,
            pipeline,
            discovery,
            in_flight: Arc::new(DashMap::new()),
            latency,
            wait: Duration::from_secs(ON_DEMAND_WAIT_SECS),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Register (or reactivate) a searched keyword and make sure its data is
    /// fresh. New keywords get a background scale classification.
    pub async fn track(&self, raw: &str, now: DateTime<Utc>) -> Result<(Keyword, RefreshOutcome)> {
        let keyword = normalize_keyword(raw);
        if keyword.is_empty() {
            return Err(AppError::NotFound(raw.to_string()));
        }

        let (tracked, needs_scale) = self.registry.ensure_tracked(&keyword, now).await?;
        if needs_scale {
            // Fire and forget.
            drop(self.discovery.classify_new_keyword(&keyword));
        }

        let outcome = self.ensure_fresh(&keyword, now).await?;
        Ok((tracked, outcome))
    }

    /// Search path: track, then score from whatever data exists now.
    pub async fn search(&self, raw: &str, period: Period, now: DateTime<Utc>) -> Result<SearchResult> {
        let (keyword, refresh) = self.track(raw, now).await?;
        let score = self
            .pipeline
            .scorer()
            .compute_composite_score(&keyword.keyword, period, now)
            .await?;
        Ok(SearchResult {
            keyword,
            refresh,
            score,
        })
    }

    /// Fresh means a record within the staleness threshold from every
    /// configured source. Google-Trends points are stamped at midnight and
    /// stand for the whole day.
    pub async fn is_fresh(&self, keyword: &str, now: DateTime<Utc>) -> Result<bool> {
        let since = now - ChronoDuration::hours(STALE_THRESHOLD_HOURS);
        let have = self.metrics.sources_since(keyword, since).await?;
        for source in self.pipeline.collectors().configured_sources() {
            if have.contains(&source) {
                continue;
            }
            if source == Source::GoogleTrends {
                let day_start = since.date_naive().and_time(NaiveTime::MIN).and_utc();
                if self.metrics.has_search_volume_since(keyword, day_start).await? {
                    continue;
                }
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Start (or join) a refresh if the keyword is stale and wait for it up
    /// to the ceiling. The refresh is never cancelled by the timeout.
    pub async fn ensure_fresh(&self, keyword: &str, now: DateTime<Utc>) -> Result<RefreshOutcome> {
        if self.is_fresh(keyword, now).await? {
            debug!(keyword, "Data is fresh");
            return Ok(RefreshOutcome::Fresh);
        }

        let mut done = self.refresh_in_flight(keyword);
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.wait, done.wait_for(|finished| *finished)).await {
            // A dropped sender also means the task is over.
            Ok(_) => RefreshOutcome::Completed,
            Err(_) => {
                info!(keyword, wait_secs = self.wait.as_secs(), "Refresh still running, returning current data");
                RefreshOutcome::TimedOut
            }
        };
        self.latency.record(started.elapsed());
        Ok(outcome)
    }

    /// Receiver for the keyword's running refresh, spawning one if none is.
    fn refresh_in_flight(&self, keyword: &str) -> watch::Receiver<bool> {
        let tx = match self.in_flight.entry(keyword.to_string()) {
            Entry::Occupied(e) => {
                debug!(keyword, "Joining in-flight refresh");
                return e.get().clone();
            }
            Entry::Vacant(e) => {
                let (tx, rx) = watch::channel(false);
                e.insert(rx);
                tx
            }
        };
        let rx = tx.subscribe();

        let pipeline = self.pipeline.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let keyword = keyword.to_string();
        tokio::spawn(async move {
            info!(keyword = %keyword, "On-demand refresh started");
            match pipeline.refresh_keyword(&keyword, Utc::now()).await {
                Ok(()) => info!(keyword = %keyword, "On-demand refresh complete"),
                Err(e) => error!(keyword = %keyword, "On-demand refresh failed: {e}"),
            }
            in_flight.remove(&keyword);
            if tx.send(true).is_err() {
                debug!(keyword = %keyword, "No one waiting on refresh");
            }
        });
        rx
    }

    /// Refreshes currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
