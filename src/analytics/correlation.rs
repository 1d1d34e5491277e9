use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::db::MetricStore;
use crate::error::Result;
use crate::scorer::growth::mean;
use crate::types::round_to;

/// Pairs need at least this many shared dates.
pub const MIN_COMMON_DATES: usize = 5;
pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_PERIOD_DAYS: i64 = 30;
/// Lookback ceiling; longer requests are clamped to it.
pub const MAX_PERIOD_DAYS: i64 = 365;

/// Clamp a requested lookback into `1..=MAX_PERIOD_DAYS`.
pub fn lookback_days(requested: i64) -> i64 {
    requested.clamp(1, MAX_PERIOD_DAYS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub keyword: String,
    pub correlation: f64,
    pub direction: Direction,
}

/// Pearson's r. `None` when either side is constant or the inputs differ in length.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    let r = cov / (vx.sqrt() * vy.sqrt());
    r.is_finite().then_some(r)
}

/// Correlate `keyword`'s daily series against every other series in
/// `series`, strongest first by |r|.
pub fn correlate(
    keyword: &str,
    series: &HashMap<String, BTreeMap<NaiveDate, f64>>,
    top_n: usize,
) -> Vec<Correlation> {
    let Some(target) = series.get(keyword) else {
        return Vec::new();
    };

    let mut results: Vec<Correlation> = series
        .iter()
        .filter(|(other, _)| other.as_str() != keyword)
        .filter_map(|(other, points)| {
            let (x, y): (Vec<f64>, Vec<f64>) = target
                .iter()
                .filter_map(|(date, v)| points.get(date).map(|w| (*v, *w)))
                .unzip();
            if x.len() < MIN_COMMON_DATES {
                return None;
            }
            let r = pearson(&x, &y)?;
            Some(Correlation {
                keyword: other.clone(),
                correlation: round_to(r, 3),
                direction: if r > 0.0 {
                    Direction::Positive
                } else {
                    Direction::Negative
                },
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.correlation
            .abs()
            .total_cmp(&a.correlation.abs())
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    results.truncate(top_n);
    results
}

/// Keywords whose search interest moved with (or against) `keyword` over the
/// last `period_days`, clamped by [`lookback_days`].
pub async fn keyword_correlations(
    metrics: &MetricStore,
    keyword: &str,
    period_days: i64,
    top_n: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Correlation>> {
    let rows = metrics
        .daily_search_volume_tracked(now - Duration::days(lookback_days(period_days)))
        .await?;

    let mut series: HashMap<String, BTreeMap<NaiveDate, f64>> = HashMap::new();
    for (kw, point) in rows {
        series.entry(kw).or_default().insert(point.date, point.value);
    }
    debug!(keyword, series = series.len(), "Correlating search interest");
    Ok(correlate(keyword, &series, top_n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, KeywordRegistry};
    use crate::types::{metric, MetricRecord, Source};
    use chrono::TimeZone;

    fn daily(values: &[f64]) -> BTreeMap<NaiveDate, f64> {
        let start = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::days(i as i64), *v))
            .collect()
    }

    #[test]
    fn pearson_extremes() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((pearson(&x, &[2.0, 4.0, 6.0, 8.0, 10.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&x, &[5.0, 4.0, 3.0, 2.0, 1.0]).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&x, &[3.0; 5]), None);
        assert_eq!(pearson(&x, &[1.0, 2.0]), None);
    }

    #[test]
    fn ranks_by_absolute_correlation_and_skips_short_overlaps() {
        let mut series = HashMap::new();
        series.insert("y2k".to_string(), daily(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]));
        series.insert("low rise".to_string(), daily(&[11.0, 19.0, 33.0, 41.0, 48.0, 62.0]));
        series.insert("quiet luxury".to_string(), daily(&[60.0, 50.0, 40.0, 30.0, 20.0, 10.0]));
        series.insert("flat".to_string(), daily(&[5.0; 6]));
        series.insert("short".to_string(), daily(&[1.0, 2.0, 3.0, 4.0]));

        let out = correlate("y2k", &series, DEFAULT_TOP_N);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].keyword, "quiet luxury");
        assert_eq!(out[0].correlation, -1.0);
        assert_eq!(out[0].direction, Direction::Negative);
        assert_eq!(out[1].keyword, "low rise");
        assert_eq!(out[1].direction, Direction::Positive);

        assert_eq!(correlate("y2k", &series, 1).len(), 1);
        assert!(correlate("unknown", &series, 5).is_empty());
    }

    #[tokio::test]
    async fn reads_tracked_daily_series() {
        let pool = test_pool().await;
        let registry = KeywordRegistry::new(pool.clone());
        let metrics = MetricStore::new(pool);
        let now = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();
        registry
            .load_seeds(&["y2k".to_string(), "cargo pants".to_string()], now)
            .await
            .unwrap();

        for day in 0..6i64 {
            let at = now - Duration::days(6 - day);
            for (kw, value) in [("y2k", 10.0 + day as f64), ("cargo pants", 50.0 - 3.0 * day as f64)] {
                metrics
                    .record(&MetricRecord::new(kw, Source::GoogleTrends, metric::SEARCH_VOLUME, value, at))
                    .await
                    .unwrap();
            }
        }

        let out = keyword_correlations(&metrics, "y2k", 30, 5, now).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].keyword, "cargo pants");
        assert_eq!(out[0].correlation, -1.0);

        let wide = keyword_correlations(&metrics, "y2k", 100_000_000, 5, now).await.unwrap();
        assert_eq!(wide, out);
        let narrow = keyword_correlations(&metrics, "y2k", -4, 5, now).await.unwrap();
        assert!(narrow.is_empty());
    }

    #[test]
    fn lookback_is_bounded() {
        assert_eq!(lookback_days(0), 1);
        assert_eq!(lookback_days(-30), 1);
        assert_eq!(lookback_days(90), 90);
        assert_eq!(lookback_days(i64::MAX), MAX_PERIOD_DAYS);
    }
}
