use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{MetricStore, ScoreStore};
use crate::error::Result;
use crate::forecast::model::{ForecastEngine, DEFAULT_SLOPE_WINDOW_DAYS};
use crate::scorer::ranking::percentile_rank;
use crate::scorer::trend_scorer::{PRICE_WEIGHT, VOLUME_WEIGHT};
use crate::types::{round_to, LifecycleStage, Period, Scale};

/// Days ahead the ranking forecast looks.
pub const RANK_HORIZON_DAYS: i64 = 7;
const TOP_N: usize = 10;
const MAX_CHALLENGERS: usize = 3;

/// Slope cutoffs (interest points per day) for stage warnings.
const NEARING_PEAK_SLOPE: f64 = -0.5;
const ENTERING_SATURATION_SLOPE: f64 = -1.0;
const ENTERING_DECLINE_SLOPE: f64 = -1.5;
const REVIVAL_SLOPE: f64 = 1.0;
const ACCELERATING_SLOPE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageWarning {
    #[serde(rename = "Accelerating Soon")]
    AcceleratingSoon,
    #[serde(rename = "Nearing Peak")]
    NearingPeak,
    #[serde(rename = "Entering Saturation")]
    EnteringSaturation,
    #[serde(rename = "Entering Decline")]
    EnteringDecline,
    #[serde(rename = "Possible Revival")]
    PossibleRevival,
}

/// Heuristic overlay: flag a likely stage change when the slope points away
/// from the current stage and the projected growth agrees.
pub fn predict_stage_warning(
    stage: LifecycleStage,
    projected_volume_growth: f64,
    slope: f64,
) -> Option<StageWarning> {
    match stage {
        LifecycleStage::Emerging if slope >= ACCELERATING_SLOPE && projected_volume_growth > 20.0 => {
            Some(StageWarning::AcceleratingSoon)
        }
        LifecycleStage::Emerging | LifecycleStage::Accelerating if slope <= NEARING_PEAK_SLOPE => {
            Some(StageWarning::NearingPeak)
        }
        LifecycleStage::Peak if slope <= ENTERING_SATURATION_SLOPE && projected_volume_growth < -5.0 => {
            Some(StageWarning::EnteringSaturation)
        }
        LifecycleStage::Saturation
            if slope <= ENTERING_DECLINE_SLOPE && projected_volume_growth < -20.0 =>
        {
            Some(StageWarning::EnteringDecline)
        }
        LifecycleStage::Decline | LifecycleStage::Dormant if slope >= REVIVAL_SLOPE => {
            Some(StageWarning::PossibleRevival)
        }
        _ => None,
    }
}

/// What the projection needs per keyword.
#[derive(Debug, Clone)]
pub struct ProjectionInput {
    pub keyword: String,
    pub composite_score: f64,
    pub volume_growth: f64,
    pub price_growth: f64,
    pub lifecycle_stage: LifecycleStage,
    pub scale: Scale,
    pub slope: f64,
    pub current_volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankProjection {
    pub keyword: String,
    pub current_rank: usize,
    pub projected_rank: usize,
    /// Positive means rising.
    pub rank_delta: i64,
    pub composite_score: f64,
    pub projected_volume_growth: f64,
    pub projected_composite: f64,
    pub lifecycle_stage: LifecycleStage,
    pub stage_warning: Option<StageWarning>,
    pub slope: f64,
    pub scale: Scale,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankingForecast {
    pub top10: Vec<RankProjection>,
    pub challengers: Vec<RankProjection>,
    pub horizon_days: i64,
    pub period_days: i64,
}

/// Project every keyword `horizon_days` forward and compare current and
/// projected percentile ranks.
pub fn project_rankings(inputs: Vec<ProjectionInput>, horizon_days: i64, period: Period) -> RankingForecast {
    let mut projections: Vec<RankProjection> = inputs
        .iter()
        .map(|input| {
            let delta_pct = if input.current_volume > 0.0 {
                input.slope * horizon_days as f64 / input.current_volume * 100.0
            } else {
                0.0
            };
            let projected_vg = input.volume_growth + delta_pct;
            let projected_composite = VOLUME_WEIGHT * projected_vg + PRICE_WEIGHT * input.price_growth;
            RankProjection {
                keyword: input.keyword.clone(),
                current_rank: 0,
                projected_rank: 0,
                rank_delta: 0,
                composite_score: input.composite_score,
                projected_volume_growth: round_to(projected_vg, 1),
                projected_composite: round_to(projected_composite, 1),
                lifecycle_stage: input.lifecycle_stage,
                stage_warning: predict_stage_warning(input.lifecycle_stage, projected_vg, input.slope),
                slope: round_to(input.slope, 3),
                scale: input.scale,
            }
        })
        .collect();

    let indices: Vec<usize> = (0..projections.len()).collect();
    let current = percentile_rank(
        indices.clone(),
        |i| projections[*i].scale,
        |i| projections[*i].composite_score,
    );
    let projected = percentile_rank(
        indices,
        |i| projections[*i].scale,
        |i| projections[*i].projected_composite,
    );
    let current_order: Vec<usize> = current.into_iter().map(|(i, _)| i).collect();
    let projected_order: Vec<usize> = projected.into_iter().map(|(i, _)| i).collect();

    for (rank, i) in current_order.iter().enumerate() {
        projections[*i].current_rank = rank + 1;
    }
    for (rank, i) in projected_order.iter().enumerate() {
        projections[*i].projected_rank = rank + 1;
    }
    for p in projections.iter_mut() {
        p.rank_delta = p.current_rank as i64 - p.projected_rank as i64;
    }

    // Challengers are ordered by the unrounded slope.
    let mut challengers: Vec<(f64, RankProjection)> = current_order
        .iter()
        .skip(TOP_N)
        .filter(|i| inputs[**i].slope > 0.0)
        .map(|i| (inputs[*i].slope, projections[*i].clone()))
        .collect();
    challengers.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let top10 = current_order
        .iter()
        .take(TOP_N)
        .map(|i| projections[*i].clone())
        .collect();

    RankingForecast {
        top10,
        challengers: challengers
            .into_iter()
            .take(MAX_CHALLENGERS)
            .map(|(_, p)| p)
            .collect(),
        horizon_days,
        period_days: period.days(),
    }
}

/// Gathers stored scores and slopes, then projects ranks.
pub async fn ranking_forecast(
    scores: &ScoreStore,
    metrics: &MetricStore,
    period: Period,
    now: DateTime<Utc>,
) -> Result<RankingForecast> {
    let engine = ForecastEngine::new(metrics.clone());
    let rows = scores.ranking_rows(period).await?;

    let mut inputs = Vec::with_capacity(rows.len());
    for row in rows {
        let (slope, current_volume) = engine
            .get_volume_slope(&row.keyword, DEFAULT_SLOPE_WINDOW_DAYS, now)
            .await?;
        inputs.push(ProjectionInput {
            lifecycle_stage: LifecycleStage::parse(&row.lifecycle_stage)
                .unwrap_or(LifecycleStage::Peak),
            scale: row.scale.as_deref().and_then(Scale::parse).unwrap_or(Scale::Macro),
            composite_score: row.composite_score,
            volume_growth: row.volume_growth,
            price_growth: row.price_growth,
            keyword: row.keyword,
            slope,
            current_volume,
        });
    }

    Ok(project_rankings(inputs, RANK_HORIZON_DAYS, period))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(keyword: &str, composite: f64, slope: f64, current_volume: f64) -> ProjectionInput {
        ProjectionInput {
            keyword: keyword.to_string(),
            composite_score: composite,
            volume_growth: composite / 0.6,
            price_growth: 0.0,
            lifecycle_stage: LifecycleStage::Peak,
            scale: Scale::Macro,
            slope,
            current_volume,
        }
    }

    #[test]
    fn rising_slope_improves_projected_rank() {
        let inputs = vec![
            input("leader", 30.0, 0.0, 50.0),
            input("runner", 24.0, 2.0, 20.0),
        ];
        let result = project_rankings(inputs, 7, Period::default());
        let runner = result.top10.iter().find(|p| p.keyword == "runner").unwrap();
        // 40 + (2 * 7 / 20) * 100 = 110 projected vg → composite 66
        assert_eq!(runner.projected_volume_growth, 110.0);
        assert_eq!(runner.projected_composite, 66.0);
        assert_eq!(runner.current_rank, 2);
        assert_eq!(runner.projected_rank, 1);
        assert_eq!(runner.rank_delta, 1);

        let leader = result.top10.iter().find(|p| p.keyword == "leader").unwrap();
        assert_eq!(leader.rank_delta, -1);
    }

    #[test]
    fn zero_current_volume_means_no_projection() {
        let result = project_rankings(vec![input("flat", 12.0, 5.0, 0.0)], 7, Period::default());
        assert_eq!(result.top10[0].projected_composite, 12.0);
        assert_eq!(result.top10[0].rank_delta, 0);
    }

    #[test]
    fn challengers_come_from_outside_top_ten_with_positive_slope() {
        let mut inputs: Vec<ProjectionInput> = (0..10)
            .map(|i| input(&format!("top{i}"), 100.0 - i as f64, 0.0, 10.0))
            .collect();
        inputs.push(input("slow", 5.0, 0.2, 10.0));
        inputs.push(input("fast", 4.0, 3.0, 10.0));
        inputs.push(input("falling", 3.0, -1.0, 10.0));
        inputs.push(input("mid", 2.0, 1.0, 10.0));
        inputs.push(input("tiny", 1.0, 0.1, 10.0));

        let result = project_rankings(inputs, 7, Period::default());
        assert_eq!(result.top10.len(), 10);
        assert_eq!(result.horizon_days, 7);
        let names: Vec<&str> = result.challengers.iter().map(|c| c.keyword.as_str()).collect();
        assert_eq!(names, vec!["fast", "mid", "slow"]);
    }

    #[test]
    fn warnings_depend_on_stage_and_slope() {
        use LifecycleStage::*;
        assert_eq!(predict_stage_warning(Accelerating, 15.0, -0.8), Some(StageWarning::NearingPeak));
        assert_eq!(predict_stage_warning(Emerging, 40.0, 2.0), Some(StageWarning::AcceleratingSoon));
        assert_eq!(predict_stage_warning(Peak, -10.0, -1.2), Some(StageWarning::EnteringSaturation));
        assert_eq!(predict_stage_warning(Peak, 2.0, -1.2), None);
        assert_eq!(predict_stage_warning(Saturation, -30.0, -2.0), Some(StageWarning::EnteringDecline));
        assert_eq!(predict_stage_warning(Dormant, 0.0, 1.5), Some(StageWarning::PossibleRevival));
        assert_eq!(predict_stage_warning(Decline, -40.0, 0.3), None);
    }

    #[test]
    fn empty_input_gives_empty_forecast() {
        let result = project_rankings(Vec::new(), 7, Period::new(30).unwrap());
        assert!(result.top10.is_empty());
        assert!(result.challengers.is_empty());
        assert_eq!(result.period_days, 30);
    }
}
