use serde::Serialize;

use crate::db::MetricStore;
use crate::error::Result;
use crate::scorer::growth::mean;
use crate::types::round_to;

pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A month needs this many values to be reported.
const MIN_VALUES_PER_MONTH: usize = 2;
/// Fewer reported months than this means no pattern.
const MIN_MONTHS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthStat {
    pub month: u32,
    pub label: &'static str,
    pub avg: f64,
    pub std: f64,
    pub count: usize,
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Month-of-year averages over `(month, value)` pairs.
pub fn monthly_pattern(points: &[(u32, f64)]) -> Vec<MonthStat> {
    let mut by_month: [Vec<f64>; 12] = Default::default();
    for (month, value) in points {
        if (1..=12).contains(month) {
            by_month[(*month - 1) as usize].push(*value);
        }
    }

    let stats: Vec<MonthStat> = by_month
        .iter()
        .enumerate()
        .filter(|(_, values)| values.len() >= MIN_VALUES_PER_MONTH)
        .map(|(i, values)| MonthStat {
            month: i as u32 + 1,
            label: MONTH_LABELS[i],
            avg: round_to(mean(values), 2),
            std: round_to(sample_std(values), 2),
            count: values.len(),
        })
        .collect();

    if stats.len() < MIN_MONTHS {
        return Vec::new();
    }
    stats
}

pub async fn seasonal_pattern(metrics: &MetricStore, keyword: &str) -> Result<Vec<MonthStat>> {
    let points = metrics.search_volume_by_month(keyword).await?;
    Ok(monthly_pattern(&points))
}
