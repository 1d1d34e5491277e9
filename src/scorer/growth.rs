use chrono::{DateTime, Utc};

/// Percentage change of the second-half mean over the first-half mean.
///
/// - second half empty → 0
/// - first half empty or with mean zero → 100 if the second half is positive, else 0
///
/// Series that start from zero are therefore capped at +100%.
///
/// An empty first half counts as zero, so a brand-new series with positive
/// readings reports +100% rather than 0%.
pub fn growth_rate(first_half: &[f64], second_half: &[f64]) -> f64 {
    if second_half.is_empty() {
        return 0.0;
    }
    let avg_first = mean(first_half);
    let avg_second = mean(second_half);
    if avg_first == 0.0 {
        return if avg_second > 0.0 { 100.0 } else { 0.0 };
    }
    (avg_second - avg_first) / avg_first * 100.0
}

/// Partition points by timestamp: strictly before `midpoint` is the first half.
pub fn split_at_midpoint(
    points: &[(DateTime<Utc>, f64)],
    midpoint: DateTime<Utc>,
) -> (Vec<f64>, Vec<f64>) {
    let mut first = Vec::new();
    let mut second = Vec::new();
    for (at, value) in points {
        if *at < midpoint {
            first.push(*value);
        } else {
            second.push(*value);
        }
    }
    (first, second)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}
