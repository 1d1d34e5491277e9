use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SCORE_PERIODS;
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Sources and metric names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    GoogleTrends,
    Ebay,
    Reddit,
    Depop,
    Etsy,
    Poshmark,
    News,
    Tiktok,
    Pinterest,
}

impl Source {
    pub const ALL: [Source; 9] = [
        Source::GoogleTrends,
        Source::Ebay,
        Source::Reddit,
        Source::Depop,
        Source::Etsy,
        Source::Poshmark,
        Source::News,
        Source::Tiktok,
        Source::Pinterest,
    ];

    /// Sources whose `avg_price` feeds price growth.
    pub const MARKETPLACES: [Source; 4] =
        [Source::Ebay, Source::Etsy, Source::Poshmark, Source::Depop];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::GoogleTrends => "google_trends",
            Source::Ebay => "ebay",
            Source::Reddit => "reddit",
            Source::Depop => "depop",
            Source::Etsy => "etsy",
            Source::Poshmark => "poshmark",
            Source::News => "news",
            Source::Tiktok => "tiktok",
            Source::Pinterest => "pinterest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Source::ALL.iter().copied().find(|src| src.as_str() == s)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub mod metric {
    pub const SEARCH_VOLUME: &str = "search_volume";
    pub const SEARCH_VOLUME_REGION: &str = "search_volume_region";
    pub const SEARCH_VOLUME_REGION_GLOBAL: &str = "search_volume_region_global";
    pub const SOLD_COUNT: &str = "sold_count";
    pub const MENTION_COUNT: &str = "mention_count";
    pub const LISTING_COUNT: &str = "listing_count";
    pub const AVG_PRICE: &str = "avg_price";
    pub const PRICE_VOLATILITY: &str = "price_volatility";

    /// Volume proxies summed into volume growth and total volume.
    pub const VOLUME: [&str; 4] = [SEARCH_VOLUME, SOLD_COUNT, MENTION_COUNT, LISTING_COUNT];
}

// ---------------------------------------------------------------------------
// MetricRecord
// ---------------------------------------------------------------------------

/// One raw observation. Immutable once written, except the Google-Trends
/// daily series (see `MetricStore::upsert_daily_search_volume`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub keyword: String,
    pub source: Source,
    pub metric: String,
    pub value: f64,
    pub region: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl MetricRecord {
    pub fn new(
        keyword: &str,
        source: Source,
        metric: &str,
        value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            keyword: keyword.to_string(),
            source,
            metric: metric.to_string(),
            value,
            region: None,
            recorded_at,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Keyword
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordOrigin {
    Seed,
    UserSearch,
    AutoDiscovered,
}

impl KeywordOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordOrigin::Seed => "seed",
            KeywordOrigin::UserSearch => "user_search",
            KeywordOrigin::AutoDiscovered => "auto_discovered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seed" => Some(KeywordOrigin::Seed),
            "user_search" => Some(KeywordOrigin::UserSearch),
            "auto_discovered" => Some(KeywordOrigin::AutoDiscovered),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeywordOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordStatus {
    Active,
    Inactive,
    /// Discovered but not yet promoted; excluded from scheduled collection.
    PendingReview,
}

impl KeywordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordStatus::Active => "active",
            KeywordStatus::Inactive => "inactive",
            KeywordStatus::PendingReview => "pending_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(KeywordStatus::Active),
            "inactive" => Some(KeywordStatus::Inactive),
            "pending_review" => Some(KeywordStatus::PendingReview),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeywordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Multi-year cultural shift.
    Macro,
    /// Social-media-driven fad lasting weeks or months.
    Micro,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Macro => "macro",
            Scale::Micro => "micro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "macro" => Some(Scale::Macro),
            "micro" => Some(Scale::Micro),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    pub origin: KeywordOrigin,
    pub status: KeywordStatus,
    pub scale: Option<Scale>,
    pub added_at: DateTime<Utc>,
    pub last_searched_at: Option<DateTime<Utc>>,
}

/// Lowercase, trim, collapse internal whitespace to a single space.
pub fn normalize_keyword(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// A validated scoring window: 7, 14, 30, 60 or 90 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(i64);

impl Period {
    pub fn new(days: i64) -> Result<Self> {
        if SCORE_PERIODS.contains(&days) {
            Ok(Self(days))
        } else {
            Err(AppError::InvalidPeriod(days))
        }
    }

    pub fn all() -> impl Iterator<Item = Period> {
        SCORE_PERIODS.iter().map(|d| Period(*d))
    }

    pub fn days(&self) -> i64 {
        self.0
    }
}

impl Default for Period {
    fn default() -> Self {
        Period(7)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleStage {
    Emerging,
    Accelerating,
    Peak,
    Saturation,
    Decline,
    Dormant,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Emerging => "Emerging",
            LifecycleStage::Accelerating => "Accelerating",
            LifecycleStage::Peak => "Peak",
            LifecycleStage::Saturation => "Saturation",
            LifecycleStage::Decline => "Decline",
            LifecycleStage::Dormant => "Dormant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Emerging" => Some(LifecycleStage::Emerging),
            "Accelerating" => Some(LifecycleStage::Accelerating),
            "Peak" => Some(LifecycleStage::Peak),
            "Saturation" => Some(LifecycleStage::Saturation),
            "Decline" => Some(LifecycleStage::Decline),
            "Dormant" => Some(LifecycleStage::Dormant),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current score for one `(keyword, period_days)`. Derived from metrics only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub keyword: String,
    pub period_days: i64,
    pub volume_growth: f64,
    pub price_growth: f64,
    pub composite_score: f64,
    pub lifecycle_stage: LifecycleStage,
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Series points
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_keyword("  Barrel   Leg\tJeans "), "barrel leg jeans");
        assert_eq!(normalize_keyword("GORPCORE"), "gorpcore");
        assert_eq!(normalize_keyword("   "), "");
    }

    #[test]
    fn period_accepts_only_scoring_windows() {
        for days in SCORE_PERIODS {
            assert_eq!(Period::new(days).unwrap().days(), days);
        }
        assert!(matches!(Period::new(21), Err(AppError::InvalidPeriod(21))));
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn enum_strings_round_trip_through_parse() {
        for source in Source::ALL {
            assert_eq!(Source::parse(source.as_str()), Some(source));
        }
        assert_eq!(KeywordStatus::parse("pending_review"), Some(KeywordStatus::PendingReview));
        assert_eq!(KeywordOrigin::parse("user_search"), Some(KeywordOrigin::UserSearch));
        assert_eq!(LifecycleStage::parse("Saturation"), Some(LifecycleStage::Saturation));
        assert_eq!(Scale::parse("huge"), None);
    }

    #[test]
    fn round_to_two_places() {
        assert_eq!(round_to(12.345_6, 2), 12.35);
        assert_eq!(round_to(-3.333, 1), -3.3);
    }
}
