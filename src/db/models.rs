//! Database row types for the metrics, keywords and scores tables.
//! Used by sqlx for typed queries; converted into `crate::types` at the store boundary.

use crate::db::from_ts;
use crate::types::{Keyword, KeywordOrigin, KeywordStatus, LifecycleStage, Scale, ScoreRecord};

#[derive(Debug, sqlx::FromRow)]
pub struct KeywordRow {
    pub keyword: String,
    pub origin: String,
    pub status: String,
    pub scale: Option<String>,
    pub added_at: i64,
    pub last_searched_at: Option<i64>,
}

impl From<KeywordRow> for Keyword {
    fn from(row: KeywordRow) -> Self {
        Keyword {
            origin: KeywordOrigin::parse(&row.origin).unwrap_or(KeywordOrigin::UserSearch),
            status: KeywordStatus::parse(&row.status).unwrap_or(KeywordStatus::Active),
            scale: row.scale.as_deref().and_then(Scale::parse),
            added_at: from_ts(row.added_at),
            last_searched_at: row.last_searched_at.map(from_ts),
            keyword: row.keyword,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScoreRow {
    pub keyword: String,
    pub period_days: i64,
    pub volume_growth: f64,
    pub price_growth: f64,
    pub composite_score: f64,
    pub lifecycle_stage: String,
    pub computed_at: i64,
}

impl From<ScoreRow> for ScoreRecord {
    fn from(row: ScoreRow) -> Self {
        ScoreRecord {
            period_days: row.period_days,
            volume_growth: row.volume_growth,
            price_growth: row.price_growth,
            composite_score: row.composite_score,
            lifecycle_stage: LifecycleStage::parse(&row.lifecycle_stage)
                .unwrap_or(LifecycleStage::Peak),
            computed_at: from_ts(row.computed_at),
            keyword: row.keyword,
        }
    }
}

/// A stored score joined with its keyword's scale and origin, for ranking.
#[derive(Debug, sqlx::FromRow)]
pub struct RankedScoreRow {
    pub keyword: String,
    pub composite_score: f64,
    pub volume_growth: f64,
    pub price_growth: f64,
    pub lifecycle_stage: String,
    pub computed_at: i64,
    pub scale: Option<String>,
    pub origin: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ValueAtRow {
    pub value: f64,
    pub recorded_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SourcedValueRow {
    pub value: f64,
    pub recorded_at: i64,
    pub source: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DailyAverageRow {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct KeywordDailyRow {
    pub keyword: String,
    pub date: String,
    pub value: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RegionRow {
    pub region: String,
    pub value: f64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct MonthValueRow {
    pub month: i64,
    pub value: f64,
}
