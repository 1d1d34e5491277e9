use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collectors::{Collector, CollectorSet};
use crate::config::{
    Pacing, CATCH_UP_FRESHNESS_HOURS, DISCOVERY_INTERVAL_SECS, EXPIRY_INTERVAL_SECS,
    SCALE_REFINEMENT_INTERVAL_SECS, SCRAPE_AND_SCORE_INTERVAL_SECS, USER_KEYWORD_EXPIRY_DAYS,
};
use crate::db::{KeywordRegistry, MetricStore};
use crate::discovery::DiscoveryEngine;
use crate::error::Result;
use crate::orchestrator::scheduler::JobScheduler;
use crate::scorer::TrendScorer;
use crate::types::Source;

pub const SCRAPE_AND_SCORE_JOB: &str = "scrape_and_score";
pub const DISCOVERY_JOB: &str = "discovery";
pub const EXPIRY_JOB: &str = "expire_user_keywords";
pub const REFINEMENT_JOB: &str = "scale_refinement";

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub keywords: usize,
    pub scored: usize,
    pub catch_up_targeted: usize,
    pub catch_up_recovered: usize,
}

/// Call `collector` until it succeeds, sleeping `backoff[i]` after the i-th
/// failure. Makes `backoff.len() + 1` attempts at most.
pub async fn collect_with_retry(
    collector: &dyn Collector,
    keyword: &str,
    store: &MetricStore,
    backoff: &[Duration],
) -> bool {
    for attempt in 0..=backoff.len() {
        if collector.collect(keyword, store).await {
            return true;
        }
        if let Some(delay) = backoff.get(attempt) {
            warn!(
                source = %collector.source(),
                keyword,
                attempt = attempt + 1,
                "Collection failed, retrying in {:?}",
                delay
            );
            tokio::time::sleep(*delay).await;
        }
    }
    warn!(source = %collector.source(), keyword, "Collection failed after all retries");
    false
}

/// Scrape, score and maintenance passes shared by the scheduler and the
/// on-demand path.
#[derive(Clone)]
pub struct Pipeline {
    registry: KeywordRegistry,
    metrics: MetricStore,
    scorer: TrendScorer,
    collectors: CollectorSet,
    pacing: Pacing,
}

impl Pipeline {
    pub fn new(
        registry: KeywordRegistry,
        metrics: MetricStore,
        scorer: TrendScorer,
        collectors: CollectorSet,
        pacing: Pacing,
    ) -> Self {
        Self {
            registry,
            metrics,
            scorer,
            collectors,
            pacing,
        }
    }

    pub fn collectors(&self) -> &CollectorSet {
        &self.collectors
    }

    pub fn scorer(&self) -> &TrendScorer {
        &self.scorer
    }

    /// Run every configured collector once for `keyword`. Google-Trends gets
    /// the backoff table; other sources are logged and skipped on failure.
    /// Returns how many sources succeeded.
    pub async fn scrape_keyword(&self, keyword: &str) -> usize {
        let mut succeeded = 0usize;
        for collector in self.collectors.configured() {
            let ok = if collector.source() == Source::GoogleTrends {
                collect_with_retry(
                    collector.as_ref(),
                    keyword,
                    &self.metrics,
                    &self.pacing.google_trends_backoff,
                )
                .await
            } else {
                let ok = collector.collect(keyword, &self.metrics).await;
                if !ok {
                    warn!(source = %collector.source(), keyword, "Collection failed, skipping source");
                }
                ok
            };
            if ok {
                succeeded += 1;
            }
        }
        debug!(keyword, succeeded, "Scraped keyword");
        succeeded
    }

    /// Scrape every active keyword, pausing between keywords.
    pub async fn scrape_all(&self) -> Result<Vec<String>> {
        let keywords = self.registry.active_keywords().await?;
        info!(count = keywords.len(), "Scraping active keywords");
        for (i, keyword) in keywords.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing.keyword_pause).await;
            }
            self.scrape_keyword(keyword).await;
        }
        Ok(keywords)
    }

    /// Re-scrape only the active keywords without a Google-Trends point in the
    /// last day, then rescore the ones that recovered.
    pub async fn catch_up(&self, now: DateTime<Utc>) -> Result<(usize, usize)> {
        let Some(trends) = self.collectors.get(Source::GoogleTrends) else {
            return Ok((0, 0));
        };

        let since = now - ChronoDuration::hours(CATCH_UP_FRESHNESS_HOURS);
        let mut targets = Vec::new();
        for keyword in self.registry.active_keywords().await? {
            if !self.metrics.has_search_volume_since(&keyword, since).await? {
                targets.push(keyword);
            }
        }
        if targets.is_empty() {
            debug!("Catch-up: every active keyword has fresh search interest");
            return Ok((0, 0));
        }
        info!(count = targets.len(), "Catch-up: re-scraping keywords missing search interest");

        let mut recovered = Vec::new();
        for (i, keyword) in targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing.catch_up_keyword_pause).await;
            }
            if collect_with_retry(
                trends.as_ref(),
                keyword,
                &self.metrics,
                &self.pacing.catch_up_backoff,
            )
            .await
            {
                recovered.push(keyword.clone());
            }
        }
        if !recovered.is_empty() {
            self.scorer.score_keywords(&recovered, now).await;
        }
        info!(
            targeted = targets.len(),
            recovered = recovered.len(),
            "Catch-up complete"
        );
        Ok((targets.len(), recovered.len()))
    }

    /// The 6-hourly pass: scrape everything, score, then catch up.
    pub async fn scrape_and_score(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        let keywords = self.scrape_all().await?;
        let scored = self.scorer.score_keywords(&keywords, now).await;
        let (catch_up_targeted, catch_up_recovered) = self.catch_up(now).await?;
        Ok(BatchReport {
            keywords: keywords.len(),
            scored,
            catch_up_targeted,
            catch_up_recovered,
        })
    }

    /// Scrape and rescore one keyword. Used by the on-demand path.
    pub async fn refresh_keyword(&self, keyword: &str, now: DateTime<Utc>) -> Result<()> {
        self.scrape_keyword(keyword).await;
        self.scorer.compute_and_store_scores(keyword, now).await?;
        Ok(())
    }

    /// Flip `user_search` keywords not searched for 30 days to inactive.
    pub async fn expire_user_keywords(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - ChronoDuration::days(USER_KEYWORD_EXPIRY_DAYS);
        let expired = self.registry.expire_stale_user_keywords(cutoff).await?;
        info!(expired, "Stale user keywords expired");
        Ok(expired)
    }
}

/// Register the four recurring jobs.
pub fn register_jobs(scheduler: &mut JobScheduler, pipeline: Pipeline, discovery: DiscoveryEngine) {
    let p = pipeline.clone();
    scheduler.register(
        SCRAPE_AND_SCORE_JOB,
        Duration::from_secs(SCRAPE_AND_SCORE_INTERVAL_SECS),
        move || {
            let p = p.clone();
            async move {
                let report = p.scrape_and_score(Utc::now()).await?;
                info!(?report, "Scrape and score pass complete");
                Ok(())
            }
            .boxed()
        },
    );

    let d = discovery.clone();
    scheduler.register(
        DISCOVERY_JOB,
        Duration::from_secs(DISCOVERY_INTERVAL_SECS),
        move || {
            let d = d.clone();
            async move {
                d.run_discovery(Utc::now()).await?;
                Ok(())
            }
            .boxed()
        },
    );

    let p = pipeline;
    scheduler.register(
        EXPIRY_JOB,
        Duration::from_secs(EXPIRY_INTERVAL_SECS),
        move || {
            let p = p.clone();
            async move {
                p.expire_user_keywords(Utc::now()).await?;
                Ok(())
            }
            .boxed()
        },
    );

    let d = discovery;
    scheduler.register(
        REFINEMENT_JOB,
        Duration::from_secs(SCALE_REFINEMENT_INTERVAL_SECS),
        move || {
            let d = d.clone();
            async move {
                d.refine_scales().await?;
                Ok(())
            }
            .boxed()
        },
    );
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{test_pool, ScoreStore};
    use crate::types::{metric, KeywordStatus, MetricRecord};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Collector that fails `failures` times, then writes one point per call.
    pub(crate) struct FlakyCollector {
        pub source: Source,
        pub failures: AtomicUsize,
        pub calls: AtomicUsize,
        pub value: f64,
    }

    impl FlakyCollector {
        pub(crate) fn new(source: Source, failures: usize) -> Self {
            Self {
                source,
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                value: 40.0,
            }
        }
    }

    #[async_trait]
    impl Collector for FlakyCollector {
        fn source(&self) -> Source {
            self.source
        }

        async fn collect(&self, keyword: &str, store: &MetricStore) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| f.checked_sub(1))
                .is_ok()
            {
                return false;
            }
            let name = if self.source == Source::GoogleTrends {
                metric::SEARCH_VOLUME
            } else {
                metric::SOLD_COUNT
            };
            store
                .record(&MetricRecord::new(keyword, self.source, name, self.value, Utc::now()))
                .await
                .is_ok()
        }
    }

    pub(crate) struct Fixture {
        pub registry: KeywordRegistry,
        pub metrics: MetricStore,
        pub scores: ScoreStore,
        pub pipeline: Pipeline,
    }

    pub(crate) async fn fixture(collectors: Vec<Arc<dyn Collector>>) -> Fixture {
        let pool = test_pool().await;
        let registry = KeywordRegistry::new(pool.clone());
        let metrics = MetricStore::new(pool.clone());
        let scores = ScoreStore::new(pool);
        let scorer = TrendScorer::new(metrics.clone(), scores.clone(), registry.clone());
        let pipeline = Pipeline::new(
            registry.clone(),
            metrics.clone(),
            scorer,
            CollectorSet::new(collectors),
            Pacing::none(),
        );
        Fixture {
            registry,
            metrics,
            scores,
            pipeline,
        }
    }

    #[tokio::test]
    async fn retry_stops_at_first_success() {
        let f = fixture(Vec::new()).await;
        let flaky = FlakyCollector::new(Source::GoogleTrends, 2);
        let backoff = vec![Duration::ZERO; 3];
        assert!(collect_with_retry(&flaky, "y2k", &f.metrics, &backoff).await);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);

        let dead = FlakyCollector::new(Source::GoogleTrends, 10);
        assert!(!collect_with_retry(&dead, "y2k", &f.metrics, &backoff).await);
        assert_eq!(dead.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn only_google_trends_is_retried_in_a_batch() {
        let trends = Arc::new(FlakyCollector::new(Source::GoogleTrends, 1));
        let ebay = Arc::new(FlakyCollector::new(Source::Ebay, 1));
        let f = fixture(vec![ebay.clone(), trends.clone()]).await;

        assert_eq!(f.pipeline.scrape_keyword("y2k").await, 1);
        assert_eq!(trends.calls.load(Ordering::SeqCst), 2);
        assert_eq!(ebay.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_scores_every_active_keyword() {
        let trends = Arc::new(FlakyCollector::new(Source::GoogleTrends, 0));
        let f = fixture(vec![trends.clone()]).await;
        let now = Utc::now();
        f.registry
            .load_seeds(&["y2k".to_string(), "gorpcore".to_string()], now)
            .await
            .unwrap();
        f.registry.insert_discovered("mob wife", now).await.unwrap();

        let report = f.pipeline.scrape_and_score(now).await.unwrap();
        assert_eq!(report.keywords, 2);
        assert_eq!(report.scored, 2);
        assert_eq!(report.catch_up_targeted, 0);
        assert_eq!(trends.calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.scores.count_for("y2k").await.unwrap(), 5);
        assert_eq!(f.scores.count_for("mob wife").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn catch_up_targets_keywords_missing_search_interest() {
        // The regular pass exhausts its 4 attempts; catch-up then recovers.
        let trends = Arc::new(FlakyCollector::new(Source::GoogleTrends, 4));
        let f = fixture(vec![trends.clone()]).await;
        let now = Utc::now();
        f.registry.load_seeds(&["y2k".to_string()], now).await.unwrap();

        let report = f.pipeline.scrape_and_score(now).await.unwrap();
        assert_eq!(report.catch_up_targeted, 1);
        assert_eq!(report.catch_up_recovered, 1);
        assert_eq!(trends.calls.load(Ordering::SeqCst), 5);
        assert!(f
            .metrics
            .has_search_volume_since("y2k", now - ChronoDuration::hours(CATCH_UP_FRESHNESS_HOURS))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn catch_up_is_a_no_op_without_google_trends() {
        let f = fixture(vec![Arc::new(FlakyCollector::new(Source::Ebay, 0))]).await;
        f.registry.load_seeds(&["y2k".to_string()], Utc::now()).await.unwrap();
        assert_eq!(f.pipeline.catch_up(Utc::now()).await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn expiry_uses_a_thirty_day_cutoff() {
        let f = fixture(Vec::new()).await;
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        f.registry
            .ensure_tracked("old search", now - ChronoDuration::days(31))
            .await
            .unwrap();
        f.registry
            .ensure_tracked("recent search", now - ChronoDuration::days(29))
            .await
            .unwrap();

        assert_eq!(f.pipeline.expire_user_keywords(now).await.unwrap(), 1);
        let old = f.registry.get("old search").await.unwrap().unwrap();
        assert_eq!(old.status, KeywordStatus::Inactive);
        let recent = f.registry.get("recent search").await.unwrap().unwrap();
        assert_eq!(recent.status, KeywordStatus::Active);
    }

    #[tokio::test]
    async fn registers_four_jobs() {
        let f = fixture(Vec::new()).await;
        let discovery = DiscoveryEngine::new(
            f.registry.clone(),
            f.metrics.clone(),
            f.scores.clone(),
            crate::discovery::Classifier::disabled(),
            Vec::new(),
            Pacing::none(),
        );
        let mut scheduler = JobScheduler::new();
        register_jobs(&mut scheduler, f.pipeline.clone(), discovery);

        let names: Vec<String> = scheduler.status().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![DISCOVERY_JOB, EXPIRY_JOB, REFINEMENT_JOB, SCRAPE_AND_SCORE_JOB]
        );
        scheduler.run_now(EXPIRY_JOB).await.unwrap();
        assert_eq!(scheduler.status()[1].last_outcome.as_deref(), Some("ok"));
    }
}
