//! Boundary to the per-source scrapers. The core only sees what they write
//! into the Metric Store and whether an attempt looked like a transient failure.

pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::db::MetricStore;
use crate::error::Result;
use crate::types::Source;

pub use remote::{RemoteCollector, RemoteDiscoveryFeed};

/// One metric source.
#[async_trait]
pub trait Collector: Send + Sync {
    fn source(&self) -> Source;

    /// Unconfigured sources are skipped and never required to be fresh.
    fn is_configured(&self) -> bool {
        true
    }

    /// Collect for one keyword, writing records into `store`. `false` means a
    /// transient failure worth retrying; "ran fine, no data" is `true`.
    async fn collect(&self, keyword: &str, store: &MetricStore) -> bool;
}

/// Both discovery lists from one read of a feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedSnapshot {
    #[serde(default)]
    pub trending_terms: Vec<String>,
    #[serde(default)]
    pub recent_titles: Vec<String>,
}

/// Free-text and trending-term lists used by discovery.
#[async_trait]
pub trait DiscoveryFeed: Send + Sync {
    fn source(&self) -> Source;

    async fn trending_terms(&self) -> Vec<String> {
        Vec::new()
    }

    async fn recent_titles(&self) -> Vec<String> {
        Vec::new()
    }

    /// What a discovery pass reads. Feeds that serve both lists from a single
    /// request override this to fetch once.
    async fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            trending_terms: self.trending_terms().await,
            recent_titles: self.recent_titles().await,
        }
    }
}

/// Shared HTTP client for outbound collaborator calls.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

/// The collectors the orchestrator drives, Google-Trends first.
#[derive(Clone, Default)]
pub struct CollectorSet {
    collectors: Vec<Arc<dyn Collector>>,
}

impl CollectorSet {
    pub fn new(mut collectors: Vec<Arc<dyn Collector>>) -> Self {
        collectors.sort_by_key(|c| c.source() != Source::GoogleTrends);
        Self { collectors }
    }

    pub fn from_config(cfg: &Config, client: reqwest::Client) -> Self {
        let collectors = cfg
            .collector_urls
            .iter()
            .map(|(source, url)| {
                Arc::new(RemoteCollector::new(*source, url.clone(), client.clone())) as Arc<dyn Collector>
            })
            .collect();
        Self::new(collectors)
    }

    pub fn configured(&self) -> impl Iterator<Item = &Arc<dyn Collector>> {
        self.collectors.iter().filter(|c| c.is_configured())
    }

    /// Sources that must have recent data for a keyword to count as fresh.
    pub fn configured_sources(&self) -> Vec<Source> {
        self.configured().map(|c| c.source()).collect()
    }

    pub fn get(&self, source: Source) -> Option<&Arc<dyn Collector>> {
        self.configured().find(|c| c.source() == source)
    }

    pub fn is_empty(&self) -> bool {
        self.configured().next().is_none()
    }
}

/// Build discovery feeds for every `DISCOVERY_<SOURCE>_URL`.
pub fn discovery_feeds(cfg: &Config, client: reqwest::Client) -> Vec<Arc<dyn DiscoveryFeed>> {
    cfg.discovery_urls
        .iter()
        .map(|(source, url)| {
            Arc::new(RemoteDiscoveryFeed::new(*source, url.clone(), client.clone())) as Arc<dyn DiscoveryFeed>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(Source, bool);

    #[async_trait]
    impl Collector for Named {
        fn source(&self) -> Source {
            self.0
        }
        fn is_configured(&self) -> bool {
            self.1
        }
        async fn collect(&self, _keyword: &str, _store: &MetricStore) -> bool {
            true
        }
    }

    #[test]
    fn google_trends_runs_first_and_unconfigured_sources_are_hidden() {
        let set = CollectorSet::new(vec![
            Arc::new(Named(Source::Ebay, true)),
            Arc::new(Named(Source::Etsy, false)),
            Arc::new(Named(Source::GoogleTrends, true)),
        ]);
        assert_eq!(set.configured_sources(), vec![Source::GoogleTrends, Source::Ebay]);
        assert!(set.get(Source::Etsy).is_none());
        assert!(!set.is_empty());
        assert!(CollectorSet::default().is_empty());
    }
}
