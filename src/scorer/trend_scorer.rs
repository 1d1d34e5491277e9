use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use crate::db::{KeywordRegistry, MetricStore, ScoreStore};
use crate::error::Result;
use crate::scorer::growth::{growth_rate, split_at_midpoint};
use crate::scorer::lifecycle::{classify, LifecycleInputs};
use crate::scorer::ranking::{rank_rows, RankedTrend};
use crate::types::{metric, round_to, Period, Scale, ScoreRecord, Source};

pub const VOLUME_WEIGHT: f64 = 0.6;
pub const PRICE_WEIGHT: f64 = 0.4;

/// Weighted blend of the two growth signals, rounded to 2 places.
pub fn composite(volume_growth: f64, price_growth: f64) -> f64 {
    round_to(VOLUME_WEIGHT * volume_growth + PRICE_WEIGHT * price_growth, 2)
}

/// Turns raw metrics into per-period scores and lifecycle stages.
#[derive(Clone)]
pub struct TrendScorer {
    metrics: MetricStore,
    scores: ScoreStore,
    registry: KeywordRegistry,
}

impl TrendScorer {
    pub fn new(metrics: MetricStore, scores: ScoreStore, registry: KeywordRegistry) -> Self {
        Self {
            metrics,
            scores,
            registry,
        }
    }

    /// Score one keyword over the `period` window ending at `now`. Reads only;
    /// nothing is stored.
    pub async fn compute_composite_score(
        &self,
        keyword: &str,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<ScoreRecord> {
        let start = now - Duration::days(period.days());
        let midpoint = now - Duration::seconds(period.days() * 86_400 / 2);

        // Negative volumes and non-positive prices are collector bugs; skip them.
        let volume_points: Vec<_> = self
            .metrics
            .points_since(keyword, &metric::VOLUME, None, start)
            .await?
            .into_iter()
            .filter(|(_, v)| v.is_finite() && *v >= 0.0)
            .collect();
        let price_points: Vec<_> = self
            .metrics
            .points_since(keyword, &[metric::AVG_PRICE], Some(&Source::MARKETPLACES), start)
            .await?
            .into_iter()
            .filter(|(_, v)| v.is_finite() && *v > 0.0)
            .collect();

        let (vol_first, vol_second) = split_at_midpoint(&volume_points, midpoint);
        let (price_first, price_second) = split_at_midpoint(&price_points, midpoint);

        let volume_growth = round_to(growth_rate(&vol_first, &vol_second), 2);
        let price_growth = round_to(growth_rate(&price_first, &price_second), 2);
        let composite_score = composite(volume_growth, price_growth);

        let total_volume: f64 = volume_points.iter().map(|(_, v)| v).sum();
        let acceleration = self.acceleration(keyword, period, composite_score).await?;
        let scale = self.registry.scale_of(keyword).await?.unwrap_or(Scale::Macro);

        let lifecycle_stage = classify(&LifecycleInputs {
            total_volume,
            volume_growth,
            acceleration,
            scale,
        });

        debug!(
            keyword,
            period = period.days(),
            total_volume,
            volume_growth,
            price_growth,
            acceleration,
            stage = %lifecycle_stage,
            "Computed score"
        );

        Ok(ScoreRecord {
            keyword: keyword.to_string(),
            period_days: period.days(),
            volume_growth,
            price_growth,
            composite_score,
            lifecycle_stage,
            computed_at: now,
        })
    }

    /// `composite` minus the score currently stored for the same period.
    /// Zero until the keyword has at least two stored scores.
    pub async fn acceleration(&self, keyword: &str, period: Period, composite: f64) -> Result<f64> {
        if self.scores.count_for(keyword).await? < 2 {
            return Ok(0.0);
        }
        Ok(self
            .scores
            .get(keyword, period)
            .await?
            .map(|previous| composite - previous.composite_score)
            .unwrap_or(0.0))
    }

    /// Recompute and replace the score for every period.
    pub async fn compute_and_store_scores(
        &self,
        keyword: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoreRecord>> {
        let mut stored = Vec::with_capacity(5);
        for period in Period::all() {
            let score = self.compute_composite_score(keyword, period, now).await?;
            self.scores.replace(&score).await?;
            stored.push(score);
        }
        Ok(stored)
    }

    /// Score every keyword in `keywords`. A failing keyword is logged and
    /// skipped. Returns how many were scored.
    pub async fn score_keywords(&self, keywords: &[String], now: DateTime<Utc>) -> usize {
        let mut scored = 0usize;
        for keyword in keywords {
            match self.compute_and_store_scores(keyword, now).await {
                Ok(_) => scored += 1,
                Err(e) => error!(keyword = %keyword, "Scoring failed: {e}"),
            }
        }
        info!(scored, total = keywords.len(), "Scoring pass complete");
        scored
    }

    /// Current top trends for a period, percentile-ranked within scale.
    pub async fn top_trends(&self, period: Period, limit: usize) -> Result<Vec<RankedTrend>> {
        let rows = self.scores.ranking_rows(period).await?;
        Ok(rank_rows(rows, limit))
    }
}
