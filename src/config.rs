use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::Source;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_CLASSIFIER_MODEL: &str = "claude-haiku-4-5-20251001";

/// Scrape-all-then-score interval (seconds). Catch-up runs right after each pass.
pub const SCRAPE_AND_SCORE_INTERVAL_SECS: u64 = 6 * 3600;

/// Keyword auto-discovery interval (seconds).
pub const DISCOVERY_INTERVAL_SECS: u64 = 24 * 3600;

/// Stale user-keyword expiry interval (seconds).
pub const EXPIRY_INTERVAL_SECS: u64 = 24 * 3600;

/// Statistical scale refinement interval (seconds).
pub const SCALE_REFINEMENT_INTERVAL_SECS: u64 = 7 * 24 * 3600;

/// Data older than this triggers an on-demand scrape for interactive requests.
pub const STALE_THRESHOLD_HOURS: i64 = 6;

/// A keyword without a Google-Trends point this recent is re-targeted by catch-up.
pub const CATCH_UP_FRESHNESS_HOURS: i64 = 24;

/// `user_search` keywords not searched for this many days flip to inactive.
pub const USER_KEYWORD_EXPIRY_DAYS: i64 = 30;

/// Ceiling on how long an interactive request waits for its on-demand scrape.
pub const ON_DEMAND_WAIT_SECS: u64 = 30;

/// Timeout applied to every outbound collector/classifier HTTP call.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Scoring windows, in days.
pub const SCORE_PERIODS: [i64; 5] = [7, 14, 30, 60, 90];

/// Retry delays for Google-Trends during the regular batch (seconds).
/// Attempt count = len + 1.
pub const GOOGLE_TRENDS_BACKOFF_SECS: &[u64] = &[5, 10, 20];

/// Larger retry delays used by the catch-up pass (seconds).
pub const CATCH_UP_BACKOFF_SECS: &[u64] = &[30, 60, 120];

/// Pause between keywords in batch scrapes (seconds).
pub const KEYWORD_PAUSE_SECS: u64 = 5;

/// Pause between keywords in the catch-up pass (seconds).
pub const CATCH_UP_KEYWORD_PAUSE_SECS: u64 = 15;

/// Pause between scale classification calls during backfill (milliseconds).
pub const CLASSIFY_PAUSE_MS: u64 = 300;

/// Lifecycle volume cutoffs, per scale.
pub mod lifecycle_thresholds {
    pub const MACRO_DORMANT: f64 = 5.0;
    pub const MACRO_EMERGING_CEILING: f64 = 100.0;
    pub const MACRO_PEAK_FLOOR: f64 = 50.0;

    pub const MICRO_DORMANT: f64 = 2.0;
    pub const MICRO_EMERGING_CEILING: f64 = 15.0;
    pub const MICRO_PEAK_FLOOR: f64 = 5.0;
}

/// Statistical scale refinement gates. Both signals must agree.
pub mod refinement_thresholds {
    pub const MICRO_MIN_CV: f64 = 0.65;
    pub const MICRO_MIN_SCORE_VARIANCE: f64 = 1500.0;
    pub const MACRO_MAX_CV: f64 = 0.15;
    pub const MACRO_MAX_SCORE_VARIANCE: f64 = 150.0;
    pub const MIN_VOLUME_POINTS: usize = 5;
    pub const MIN_SCORE_POINTS: usize = 3;
}

/// Delays applied by batch jobs between requests. Split out so tests can run
/// the orchestration paths with no sleeping.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub keyword_pause: Duration,
    pub catch_up_keyword_pause: Duration,
    pub google_trends_backoff: Vec<Duration>,
    pub catch_up_backoff: Vec<Duration>,
    pub classify_pause: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            keyword_pause: Duration::ZERO,
            catch_up_keyword_pause: Duration::ZERO,
            google_trends_backoff: vec![Duration::ZERO; GOOGLE_TRENDS_BACKOFF_SECS.len()],
            catch_up_backoff: vec![Duration::ZERO; CATCH_UP_BACKOFF_SECS.len()],
            classify_pause: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            keyword_pause: Duration::from_secs(KEYWORD_PAUSE_SECS),
            catch_up_keyword_pause: Duration::from_secs(CATCH_UP_KEYWORD_PAUSE_SECS),
            google_trends_backoff: GOOGLE_TRENDS_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            catch_up_backoff: CATCH_UP_BACKOFF_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            classify_pause: Duration::from_millis(CLASSIFY_PAUSE_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Inline seed keywords (SEED_KEYWORDS, comma-separated).
    pub seed_keywords: Vec<String>,
    /// JSON array of seed keywords (SEED_KEYWORDS_PATH). Optional.
    pub seed_keywords_path: Option<String>,
    /// Classification collaborator credentials (ANTHROPIC_API_KEY). Empty = disabled.
    pub anthropic_api_key: Option<String>,
    pub classifier_model: String,
    /// Per-source collector endpoints (COLLECTOR_<SOURCE>_URL).
    /// A source without an endpoint is unconfigured and never required to be fresh.
    pub collector_urls: Vec<(Source, String)>,
    /// Per-source discovery text feeds (DISCOVERY_<SOURCE>_URL).
    pub discovery_urls: Vec<(Source, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "trends.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            seed_keywords: std::env::var("SEED_KEYWORDS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            seed_keywords_path: non_empty_var("SEED_KEYWORDS_PATH"),
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            classifier_model: std::env::var("CLASSIFIER_MODEL")
                .unwrap_or_else(|_| DEFAULT_CLASSIFIER_MODEL.to_string()),
            collector_urls: per_source_urls("COLLECTOR"),
            discovery_urls: per_source_urls("DISCOVERY"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads `<PREFIX>_<SOURCE>_URL` for every known source, e.g. `COLLECTOR_GOOGLE_TRENDS_URL`.
fn per_source_urls(prefix: &str) -> Vec<(Source, String)> {
    Source::ALL
        .iter()
        .filter_map(|source| {
            let var = format!("{prefix}_{}_URL", source.as_str().to_uppercase());
            non_empty_var(&var).map(|url| (*source, url))
        })
        .collect()
}
