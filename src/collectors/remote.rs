use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Collector, DiscoveryFeed, FeedSnapshot};
use crate::db::MetricStore;
use crate::error::{AppError, Result};
use crate::types::{MetricRecord, Source};

/// One point as returned by a scraper service.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePoint {
    pub metric: String,
    pub value: f64,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct RemotePayload {
    #[serde(default)]
    points: Vec<RemotePoint>,
}

/// Write scraper points into the store. Points without a timestamp are
/// stamped `now`. Returns how many changed the store.
pub async fn store_points(
    store: &MetricStore,
    keyword: &str,
    source: Source,
    points: &[RemotePoint],
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut written = 0usize;
    for point in points {
        if !point.value.is_finite() {
            continue;
        }
        let mut record = MetricRecord::new(
            keyword,
            source,
            &point.metric,
            point.value,
            point.recorded_at.unwrap_or(now),
        );
        if let Some(region) = point.region.as_deref().filter(|r| !r.is_empty()) {
            record = record.with_region(region);
        }
        if store.record(&record).await? {
            written += 1;
        }
    }
    Ok(written)
}

/// Collector that asks an external scraper service for one keyword:
/// `GET {url}?keyword=...` returning `{"points": [...]}`.
pub struct RemoteCollector {
    source: Source,
    url: String,
    http: reqwest::Client,
}

impl RemoteCollector {
    pub fn new(source: Source, url: String, http: reqwest::Client) -> Self {
        Self { source, url, http }
    }

    async fn fetch(&self, keyword: &str) -> Result<Vec<RemotePoint>> {
        let resp = self
            .http
            .get(&self.url)
            .query(&[("keyword", keyword)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Collector(format!(
                "{} returned {}",
                self.source,
                resp.status()
            )));
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let payload: RemotePayload = serde_json::from_str(&body)?;
        Ok(payload.points)
    }
}

#[async_trait]
impl Collector for RemoteCollector {
    fn source(&self) -> Source {
        self.source
    }

    async fn collect(&self, keyword: &str, store: &MetricStore) -> bool {
        let points = match self.fetch(keyword).await {
            Ok(points) => points,
            Err(e) => {
                warn!(source = %self.source, keyword, "Collection failed: {e}");
                return false;
            }
        };
        if points.is_empty() {
            debug!(source = %self.source, keyword, "No data returned");
            return true;
        }
        match store_points(store, keyword, self.source, &points, Utc::now()).await {
            Ok(written) => {
                debug!(source = %self.source, keyword, written, received = points.len(), "Stored points");
                true
            }
            Err(e) => {
                warn!(source = %self.source, keyword, "Failed to store points: {e}");
                false
            }
        }
    }
}

/// Discovery feed backed by `GET {url}` returning
/// `{"trending_terms": [...], "recent_titles": [...]}`.
pub struct RemoteDiscoveryFeed {
    source: Source,
    url: String,
    http: reqwest::Client,
}

impl RemoteDiscoveryFeed {
    pub fn new(source: Source, url: String, http: reqwest::Client) -> Self {
        Self { source, url, http }
    }

    async fn try_fetch(&self) -> Result<FeedSnapshot> {
        let resp = self.http.get(&self.url).send().await?.error_for_status()?;
        Ok(resp.json::<FeedSnapshot>().await?)
    }
}

#[async_trait]
impl DiscoveryFeed for RemoteDiscoveryFeed {
    fn source(&self) -> Source {
        self.source
    }

    async fn trending_terms(&self) -> Vec<String> {
        self.snapshot().await.trending_terms
    }

    async fn recent_titles(&self) -> Vec<String> {
        self.snapshot().await.recent_titles
    }

    /// One GET per pass. Feed failures are data-quality problems: logged,
    /// treated as empty.
    async fn snapshot(&self) -> FeedSnapshot {
        self.try_fetch().await.unwrap_or_else(|e| {
            warn!(source = %self.source, "Discovery feed failed: {e}");
            FeedSnapshot::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::metric;
    use chrono::TimeZone;

    #[test]
    fn payload_fields_default_when_missing() {
        let payload: RemotePayload = serde_json::from_str("{}").unwrap();
        assert!(payload.points.is_empty());

        let payload: RemotePayload = serde_json::from_str(
            r#"{"points":[{"metric":"sold_count","value":4.0},
                          {"metric":"search_volume_region","value":70,"region":"US-CA",
                           "recorded_at":"2026-03-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(payload.points.len(), 2);
        assert_eq!(payload.points[1].region.as_deref(), Some("US-CA"));
        assert!(payload.points[0].recorded_at.is_none());
    }

    #[tokio::test]
    async fn stored_points_follow_the_merge_rules() {
        let store = MetricStore::new(test_pool().await);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let point = |metric: &str, value: f64| RemotePoint {
            metric: metric.to_string(),
            value,
            region: None,
            recorded_at: None,
        };

        let first = vec![point(metric::SEARCH_VOLUME, 35.0), point(metric::SOLD_COUNT, 3.0)];
        assert_eq!(store_points(&store, "y2k", Source::GoogleTrends, &first, now).await.unwrap(), 2);

        // A rate-limited zero the same day is dropped; NaN is ignored.
        let second = vec![point(metric::SEARCH_VOLUME, 0.0), point(metric::SOLD_COUNT, f64::NAN)];
        assert_eq!(store_points(&store, "y2k", Source::GoogleTrends, &second, now).await.unwrap(), 0);
        assert_eq!(store.all_search_volume("y2k").await.unwrap(), vec![35.0]);
    }

    #[test]
    fn discovery_payload_accepts_partial_bodies() {
        let payload: FeedSnapshot =
            serde_json::from_str(r#"{"recent_titles":["thrifted y2k haul"]}"#).unwrap();
        assert!(payload.trending_terms.is_empty());
        assert_eq!(payload.recent_titles, vec!["thrifted y2k haul".to_string()]);
    }

    #[tokio::test]
    async fn snapshot_reads_the_feed_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = axum::Router::new().route(
            "/feed",
            axum::routing::get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    axum::Json(serde_json::json!({
                        "trending_terms": ["tenniscore"],
                        "recent_titles": ["quiet luxury haul"]
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let feed = RemoteDiscoveryFeed::new(Source::Reddit, format!("http://{addr}/feed"), reqwest::Client::new());
        let snapshot = feed.snapshot().await;
        assert_eq!(snapshot.trending_terms, vec!["tenniscore".to_string()]);
        assert_eq!(snapshot.recent_titles, vec!["quiet luxury haul".to_string()]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_feed_is_empty() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let feed = RemoteDiscoveryFeed::new(Source::Reddit, format!("http://{addr}/feed"), reqwest::Client::new());
        assert_eq!(feed.snapshot().await, FeedSnapshot::default());
    }
}
