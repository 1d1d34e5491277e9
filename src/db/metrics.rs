use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::db::models::{
    DailyAverageRow, KeywordDailyRow, MonthValueRow, RegionRow, SourcedValueRow, ValueAtRow,
};
use crate::db::{from_ts, placeholders, to_ts};
use crate::error::Result;
use crate::types::{metric, DailyPoint, MetricRecord, Source};

/// What the Google-Trends daily merge did with an incoming reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Existing reading was zero or lower; overwritten.
    Improved,
    /// Existing reading was non-zero and not lower; incoming value dropped.
    Kept,
}

/// Append-only store of raw observations. Writes are insert-or-ignore on the
/// full record key, except the Google-Trends daily series which merges.
#[derive(Clone)]
pub struct MetricStore {
    pool: sqlx::SqlitePool,
}

impl MetricStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Write one record, routing the Google-Trends daily interest series
    /// through the monotonic merge. Returns true if the store changed.
    pub async fn record(&self, rec: &MetricRecord) -> Result<bool> {
        if rec.source == Source::GoogleTrends
            && rec.metric == metric::SEARCH_VOLUME
            && rec.region.is_none()
        {
            let outcome = self
                .upsert_daily_search_volume(&rec.keyword, rec.recorded_at.date_naive(), rec.value)
                .await?;
            return Ok(outcome != UpsertOutcome::Kept);
        }
        self.insert(rec).await
    }

    /// Plain insert-or-ignore. Returns false when an identical key already exists.
    pub async fn insert(&self, rec: &MetricRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO metrics (keyword, source, metric, value, region, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rec.keyword)
        .bind(rec.source.as_str())
        .bind(&rec.metric)
        .bind(rec.value)
        .bind(rec.region.as_deref().unwrap_or(""))
        .bind(to_ts(rec.recorded_at))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Merge one daily Google-Trends reading. An existing point for the same
    /// keyword and date is overwritten only if it is exactly zero or the new
    /// value is strictly greater; a rate-limited zero never erases real data.
    pub async fn upsert_daily_search_volume(
        &self,
        keyword: &str,
        date: NaiveDate,
        value: f64,
    ) -> Result<UpsertOutcome> {
        let day = date.format("%Y-%m-%d").to_string();
        let existing: Option<(i64, f64)> = sqlx::query_as(
            r#"
            SELECT id, value FROM metrics
            WHERE keyword = ? AND source = ? AND metric = ? AND region = ''
              AND date(recorded_at, 'unixepoch') = ?
            ORDER BY value DESC
            LIMIT 1
            "#,
        )
        .bind(keyword)
        .bind(Source::GoogleTrends.as_str())
        .bind(metric::SEARCH_VOLUME)
        .bind(&day)
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some((id, current)) => {
                if current == 0.0 || value > current {
                    sqlx::query("UPDATE metrics SET value = ? WHERE id = ?")
                        .bind(value)
                        .bind(id)
                        .execute(&self.pool)
                        .await?;
                    debug!(keyword, %day, current, value, "search volume improved");
                    Ok(UpsertOutcome::Improved)
                } else {
                    Ok(UpsertOutcome::Kept)
                }
            }
            None => {
                let recorded_at = date
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc())
                    .unwrap_or_default();
                self.insert(&MetricRecord::new(
                    keyword,
                    Source::GoogleTrends,
                    metric::SEARCH_VOLUME,
                    value,
                    recorded_at,
                ))
                .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// `(recorded_at, value)` for any of `metrics`, optionally restricted to
    /// `sources`, at or after `since`, oldest first. Regional breakdowns are excluded.
    pub async fn points_since(
        &self,
        keyword: &str,
        metrics: &[&str],
        sources: Option<&[Source]>,
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let mut sql = format!(
            "SELECT value, recorded_at FROM metrics WHERE keyword = ? AND region = '' AND metric IN ({})",
            placeholders(metrics.len())
        );
        if let Some(sources) = sources {
            sql.push_str(&format!(" AND source IN ({})", placeholders(sources.len())));
        }
        sql.push_str(" AND recorded_at >= ? ORDER BY recorded_at");

        let mut query = sqlx::query_as::<_, ValueAtRow>(&sql).bind(keyword);
        for m in metrics {
            query = query.bind(*m);
        }
        for s in sources.unwrap_or(&[]) {
            query = query.bind(s.as_str());
        }
        let rows = query.bind(to_ts(since)).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|r| (from_ts(r.recorded_at), r.value))
            .collect())
    }

    /// Same as `points_since` but keeps the source of each point.
    pub async fn sourced_points_since(
        &self,
        keyword: &str,
        metric_name: &str,
        sources: &[Source],
        since: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, Source, f64)>> {
        let sql = format!(
            r#"
            SELECT value, recorded_at, source FROM metrics
            WHERE keyword = ? AND metric = ? AND region = '' AND source IN ({})
              AND recorded_at >= ?
            ORDER BY recorded_at
            "#,
            placeholders(sources.len())
        );
        let mut query = sqlx::query_as::<_, SourcedValueRow>(&sql)
            .bind(keyword)
            .bind(metric_name);
        for s in sources {
            query = query.bind(s.as_str());
        }
        let rows = query.bind(to_ts(since)).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| Some((from_ts(r.recorded_at), Source::parse(&r.source)?, r.value)))
            .collect())
    }

    /// Every `search_volume` value ever recorded for the keyword, any source.
    pub async fn all_search_volume(&self, keyword: &str) -> Result<Vec<f64>> {
        let values: Vec<f64> = sqlx::query_scalar(
            r#"
            SELECT value FROM metrics
            WHERE keyword = ? AND metric = ? AND region = ''
            ORDER BY recorded_at
            "#,
        )
        .bind(keyword)
        .bind(metric::SEARCH_VOLUME)
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    /// Daily mean of the Google-Trends interest series, oldest first.
    pub async fn daily_search_volume(
        &self,
        keyword: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<DailyPoint>> {
        let rows: Vec<DailyAverageRow> = sqlx::query_as(
            r#"
            SELECT date(recorded_at, 'unixepoch') AS date, AVG(value) AS value
            FROM metrics
            WHERE keyword = ? AND source = ? AND metric = ? AND region = ''
              AND recorded_at >= ?
            GROUP BY date(recorded_at, 'unixepoch')
            ORDER BY date ASC
            "#,
        )
        .bind(keyword)
        .bind(Source::GoogleTrends.as_str())
        .bind(metric::SEARCH_VOLUME)
        .bind(since.map(to_ts).unwrap_or(i64::MIN))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let date = NaiveDate::parse_from_str(&r.date, "%Y-%m-%d").ok()?;
                Some(DailyPoint { date, value: r.value })
            })
            .collect())
    }

    /// Daily Google-Trends means for every non-inactive keyword since `since`.
    pub async fn daily_search_volume_tracked(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, DailyPoint)>> {
        let rows: Vec<KeywordDailyRow> = sqlx::query_as(
            r#"
            SELECT m.keyword AS keyword, date(m.recorded_at, 'unixepoch') AS date, AVG(m.value) AS value
            FROM metrics m
            JOIN keywords k ON m.keyword = k.keyword
            WHERE m.source = ? AND m.metric = ? AND m.region = ''
              AND m.recorded_at >= ? AND k.status != 'inactive'
            GROUP BY m.keyword, date(m.recorded_at, 'unixepoch')
            ORDER BY m.keyword, date
            "#,
        )
        .bind(Source::GoogleTrends.as_str())
        .bind(metric::SEARCH_VOLUME)
        .bind(to_ts(since))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let date = NaiveDate::parse_from_str(&r.date, "%Y-%m-%d").ok()?;
                Some((r.keyword, DailyPoint { date, value: r.value }))
            })
            .collect())
    }

    /// `(month 1-12, value)` pairs across the whole Google-Trends history.
    pub async fn search_volume_by_month(&self, keyword: &str) -> Result<Vec<(u32, f64)>> {
        let rows: Vec<MonthValueRow> = sqlx::query_as(
            r#"
            SELECT CAST(strftime('%m', recorded_at, 'unixepoch') AS INTEGER) AS month, value
            FROM metrics
            WHERE keyword = ? AND source = ? AND metric = ? AND region = ''
            ORDER BY recorded_at
            "#,
        )
        .bind(keyword)
        .bind(Source::GoogleTrends.as_str())
        .bind(metric::SEARCH_VOLUME)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|r| (1..=12).contains(&r.month))
            .map(|r| (r.month as u32, r.value))
            .collect())
    }

    /// Sources with at least one record for the keyword at or after `since`.
    pub async fn sources_since(
        &self,
        keyword: &str,
        since: DateTime<Utc>,
    ) -> Result<HashSet<Source>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT source FROM metrics WHERE keyword = ? AND recorded_at >= ?",
        )
        .bind(keyword)
        .bind(to_ts(since))
        .fetch_all(&self.pool)
        .await?;
        Ok(names.iter().filter_map(|n| Source::parse(n)).collect())
    }

    /// Whether the Google-Trends interest series has a point at or after `since`.
    pub async fn has_search_volume_since(
        &self,
        keyword: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM metrics
            WHERE keyword = ? AND source = ? AND metric = ? AND recorded_at >= ?
            "#,
        )
        .bind(keyword)
        .bind(Source::GoogleTrends.as_str())
        .bind(metric::SEARCH_VOLUME)
        .bind(to_ts(since))
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Most recent value of `metric_name` from any of `sources` since `since`.
    pub async fn latest_value(
        &self,
        keyword: &str,
        metric_name: &str,
        sources: &[Source],
        since: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let sql = format!(
            r#"
            SELECT value FROM metrics
            WHERE keyword = ? AND metric = ? AND source IN ({}) AND recorded_at >= ?
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
            placeholders(sources.len())
        );
        let mut query = sqlx::query_scalar::<_, f64>(&sql)
            .bind(keyword)
            .bind(metric_name);
        for s in sources {
            query = query.bind(s.as_str());
        }
        Ok(query.bind(to_ts(since)).fetch_optional(&self.pool).await?)
    }

    /// Regional breakdown, highest first. `since = None` reads all history.
    pub async fn regions(
        &self,
        keyword: &str,
        metric_name: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(String, f64)>> {
        let rows: Vec<RegionRow> = sqlx::query_as(
            r#"
            SELECT region, value FROM metrics
            WHERE keyword = ? AND metric = ? AND region != '' AND recorded_at >= ?
            ORDER BY value DESC
            "#,
        )
        .bind(keyword)
        .bind(metric_name)
        .bind(since.map(to_ts).unwrap_or(i64::MIN))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.region, r.value)).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::{Duration, TimeZone};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    async fn stored_value(store: &MetricStore, d: u32) -> f64 {
        let points = store.daily_search_volume("y2k", None).await.unwrap();
        points.iter().find(|p| p.date == day(d)).unwrap().value
    }

    #[tokio::test]
    async fn zero_reading_is_improved_by_real_value() {
        let store = MetricStore::new(test_pool().await);
        store.upsert_daily_search_volume("y2k", day(1), 0.0).await.unwrap();
        let outcome = store.upsert_daily_search_volume("y2k", day(1), 42.0).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Improved);
        assert_eq!(stored_value(&store, 1).await, 42.0);
    }

    #[tokio::test]
    async fn zero_reading_never_overwrites_real_value() {
        let store = MetricStore::new(test_pool().await);
        store.upsert_daily_search_volume("y2k", day(1), 42.0).await.unwrap();
        let outcome = store.upsert_daily_search_volume("y2k", day(1), 0.0).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Kept);
        assert_eq!(stored_value(&store, 1).await, 42.0);
    }

    #[tokio::test]
    async fn higher_reading_replaces_lower_and_no_duplicate_points() {
        let store = MetricStore::new(test_pool().await);
        store.upsert_daily_search_volume("y2k", day(1), 10.0).await.unwrap();
        store.upsert_daily_search_volume("y2k", day(1), 25.0).await.unwrap();
        store.upsert_daily_search_volume("y2k", day(1), 20.0).await.unwrap();
        assert_eq!(stored_value(&store, 1).await, 25.0);
        assert_eq!(store.all_search_volume("y2k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_routes_google_trends_through_merge() {
        let store = MetricStore::new(test_pool().await);
        let morning = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2026, 3, 2, 20, 0, 0).unwrap();
        let rec = |at, v| MetricRecord::new("y2k", Source::GoogleTrends, metric::SEARCH_VOLUME, v, at);

        assert!(store.record(&rec(morning, 30.0)).await.unwrap());
        assert!(!store.record(&rec(evening, 0.0)).await.unwrap());
        assert_eq!(store.all_search_volume("y2k").await.unwrap(), vec![30.0]);
    }

    #[tokio::test]
    async fn plain_inserts_are_idempotent() {
        let store = MetricStore::new(test_pool().await);
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let rec = MetricRecord::new("y2k", Source::Ebay, metric::SOLD_COUNT, 12.0, at);
        assert!(store.insert(&rec).await.unwrap());
        assert!(!store.insert(&rec).await.unwrap());

        let points = store
            .points_since("y2k", &[metric::SOLD_COUNT], None, at - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
    }

    #[tokio::test]
    async fn regional_rows_stay_out_of_series_queries() {
        let store = MetricStore::new(test_pool().await);
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        store
            .insert(
                &MetricRecord::new("y2k", Source::GoogleTrends, metric::SEARCH_VOLUME_REGION, 80.0, at)
                    .with_region("US-CA"),
            )
            .await
            .unwrap();
        store
            .insert(
                &MetricRecord::new("y2k", Source::GoogleTrends, metric::SEARCH_VOLUME_REGION, 60.0, at)
                    .with_region("US-NY"),
            )
            .await
            .unwrap();

        let regions = store
            .regions("y2k", metric::SEARCH_VOLUME_REGION, None)
            .await
            .unwrap();
        assert_eq!(regions, vec![("US-CA".to_string(), 80.0), ("US-NY".to_string(), 60.0)]);
        assert!(store.all_search_volume("y2k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sources_since_reports_only_recent_sources() {
        let store = MetricStore::new(test_pool().await);
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        store
            .insert(&MetricRecord::new("y2k", Source::Ebay, metric::SOLD_COUNT, 3.0, now - Duration::hours(1)))
            .await
            .unwrap();
        store
            .insert(&MetricRecord::new("y2k", Source::Etsy, metric::SOLD_COUNT, 3.0, now - Duration::hours(9)))
            .await
            .unwrap();

        let fresh = store.sources_since("y2k", now - Duration::hours(6)).await.unwrap();
        assert!(fresh.contains(&Source::Ebay));
        assert!(!fresh.contains(&Source::Etsy));
    }
}
