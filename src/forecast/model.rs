use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::db::MetricStore;
use crate::error::Result;
use crate::scorer::growth::mean;
use crate::types::{DailyPoint, ForecastPoint};

/// Fewer daily points than this and no forecast is attempted.
pub const MIN_POINTS: usize = 7;
/// Only the most recent N daily points are fitted.
pub const FIT_WINDOW: usize = 21;
pub const POLY_DEGREE: usize = 1;
/// 95% interval.
pub const CONFIDENCE_Z: f64 = 1.96;
/// Residual spread assumed when the fit has too few residuals to measure one.
pub const DEFAULT_RESIDUAL_STD: f64 = 5.0;
pub const DEFAULT_HORIZON_DAYS: usize = 14;
pub const DEFAULT_SLOPE_WINDOW_DAYS: i64 = 14;
const MIN_SLOPE_POINTS: usize = 3;
const RECENT_MEAN_POINTS: usize = 7;

/// Google-Trends interest is a 0..=100 index.
const INDEX_MIN: f64 = 0.0;
const INDEX_MAX: f64 = 100.0;

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub keyword: String,
    pub historical: Vec<DailyPoint>,
    pub forecast: Vec<ForecastPoint>,
    pub insufficient_data: bool,
    pub fit_window_days: usize,
    pub model: String,
}

/// Least-squares polynomial of degree 0 or 1 over `x = 0..n`.
/// Returns `(slope, intercept)`; degree 0 has zero slope.
pub fn fit_line(values: &[f64], degree: usize) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let y_mean = mean(values);
    if degree == 0 || values.len() < 2 {
        return (0.0, y_mean);
    }
    let x_mean = (n - 1.0) / 2.0;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    let slope = if den == 0.0 { 0.0 } else { num / den };
    (slope, y_mean - slope * x_mean)
}

/// Project a daily history forward `horizon_days`. Pure; used by
/// `ForecastEngine::forecast_search_volume`.
pub fn build_forecast(keyword: &str, historical: Vec<DailyPoint>, horizon_days: usize) -> Forecast {
    if historical.len() < MIN_POINTS {
        return Forecast {
            keyword: keyword.to_string(),
            historical,
            forecast: Vec::new(),
            insufficient_data: true,
            fit_window_days: 0,
            model: "none".to_string(),
        };
    }

    let fit_start = historical.len().saturating_sub(FIT_WINDOW);
    let y: Vec<f64> = historical[fit_start..].iter().map(|p| p.value).collect();
    let degree = POLY_DEGREE.min(y.len() - 1);
    let (slope, intercept) = fit_line(&y, degree);

    let residuals: Vec<f64> = y
        .iter()
        .enumerate()
        .map(|(i, v)| v - (intercept + slope * i as f64))
        .collect();
    let residual_std = if residuals.len() > 1 {
        let m = mean(&residuals);
        (residuals.iter().map(|r| (r - m).powi(2)).sum::<f64>() / residuals.len() as f64).sqrt()
    } else {
        DEFAULT_RESIDUAL_STD
    };

    let last_date = historical[historical.len() - 1].date;
    let forecast = (0..horizon_days)
        .map(|i| {
            let x = (y.len() + i) as f64;
            let value = (intercept + slope * x).clamp(INDEX_MIN, INDEX_MAX);
            ForecastPoint {
                date: last_date + Duration::days(i as i64 + 1),
                value,
                lower: (value - CONFIDENCE_Z * residual_std).clamp(INDEX_MIN, INDEX_MAX),
                upper: (value + CONFIDENCE_Z * residual_std).clamp(INDEX_MIN, INDEX_MAX),
            }
        })
        .collect();

    info!(keyword, horizon_days, fit_window = y.len(), residual_std, "Forecast generated");

    Forecast {
        keyword: keyword.to_string(),
        historical,
        forecast,
        insufficient_data: false,
        fit_window_days: y.len(),
        model: format!("polynomial_deg{degree}"),
    }
}

/// `(slope per day, mean of the last 7 points)`, or `(0, 0)` below 3 points.
pub fn slope_and_recent_mean(values: &[f64]) -> (f64, f64) {
    if values.len() < MIN_SLOPE_POINTS {
        return (0.0, 0.0);
    }
    let (slope, _) = fit_line(values, 1);
    let recent = &values[values.len().saturating_sub(RECENT_MEAN_POINTS)..];
    (slope, mean(recent))
}

/// Search-interest forecasting over the Metric Store.
#[derive(Clone)]
pub struct ForecastEngine {
    metrics: MetricStore,
}

impl ForecastEngine {
    pub fn new(metrics: MetricStore) -> Self {
        Self { metrics }
    }

    pub async fn forecast_search_volume(&self, keyword: &str, horizon_days: usize) -> Result<Forecast> {
        let historical = self.metrics.daily_search_volume(keyword, None).await?;
        Ok(build_forecast(keyword, historical, horizon_days))
    }

    /// Linear slope of daily search interest over the last `window_days`.
    pub async fn get_volume_slope(
        &self,
        keyword: &str,
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<(f64, f64)> {
        let points = self
            .metrics
            .daily_search_volume(keyword, Some(now - Duration::days(window_days)))
            .await?;
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        Ok(slope_and_recent_mean(&values))
    }
}
