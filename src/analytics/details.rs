use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::{MetricStore, ScoreStore};
use crate::error::Result;
use crate::types::{metric, Period, ScoreRecord, Source};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionValue {
    pub region: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionScope {
    #[default]
    Us,
    Global,
}

impl RegionScope {
    pub fn metric(&self) -> &'static str {
        match self {
            RegionScope::Us => metric::SEARCH_VOLUME_REGION,
            RegionScope::Global => metric::SEARCH_VOLUME_REGION_GLOBAL,
        }
    }
}

/// Everything the detail page shows for one keyword and period.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordDetails {
    pub keyword: String,
    pub period_days: i64,
    pub score: Option<ScoreRecord>,
    pub search_volume: Vec<SeriesPoint>,
    pub avg_price: Vec<SeriesPoint>,
    pub sales_volume: Vec<SeriesPoint>,
    pub price_volatility: Option<f64>,
    pub regions_us: Vec<RegionValue>,
    pub regions_global: Vec<RegionValue>,
}

fn regions(rows: Vec<(String, f64)>) -> Vec<RegionValue> {
    rows.into_iter()
        .map(|(region, value)| RegionValue { region, value })
        .collect()
}

pub async fn keyword_details(
    metrics: &MetricStore,
    scores: &ScoreStore,
    keyword: &str,
    period: Period,
    now: DateTime<Utc>,
) -> Result<KeywordDetails> {
    let start = now - Duration::days(period.days());

    let search_volume = metrics
        .points_since(keyword, &[metric::SEARCH_VOLUME], Some(&[Source::GoogleTrends]), start)
        .await?
        .into_iter()
        .map(|(date, value)| SeriesPoint {
            date,
            value,
            source: None,
        })
        .collect();

    let sourced = |rows: Vec<(DateTime<Utc>, Source, f64)>| -> Vec<SeriesPoint> {
        rows.into_iter()
            .map(|(date, source, value)| SeriesPoint {
                date,
                value,
                source: Some(source),
            })
            .collect()
    };
    let avg_price = sourced(
        metrics
            .sourced_points_since(keyword, metric::AVG_PRICE, &Source::MARKETPLACES, start)
            .await?,
    );
    let sales_volume = sourced(
        metrics
            .sourced_points_since(keyword, metric::SOLD_COUNT, &Source::MARKETPLACES, start)
            .await?,
    );

    Ok(KeywordDetails {
        keyword: keyword.to_string(),
        period_days: period.days(),
        score: scores.get(keyword, period).await?,
        search_volume,
        avg_price,
        sales_volume,
        price_volatility: metrics
            .latest_value(keyword, metric::PRICE_VOLATILITY, &Source::MARKETPLACES, start)
            .await?,
        regions_us: regions(
            metrics
                .regions(keyword, RegionScope::Us.metric(), Some(start))
                .await?,
        ),
        regions_global: regions(
            metrics
                .regions(keyword, RegionScope::Global.metric(), Some(start))
                .await?,
        ),
    })
}

/// Region heatmap across all history for one scope.
pub async fn keyword_regions(
    metrics: &MetricStore,
    keyword: &str,
    scope: RegionScope,
) -> Result<Vec<RegionValue>> {
    Ok(regions(metrics.regions(keyword, scope.metric(), None).await?))
}
