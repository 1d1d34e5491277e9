use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analytics::correlation::{lookback_days, Correlation, DEFAULT_PERIOD_DAYS, DEFAULT_TOP_N};
use crate::analytics::details::{KeywordDetails, RegionValue};
use crate::analytics::seasonality::MonthStat;
use crate::analytics::{keyword_correlations, keyword_details, keyword_regions, seasonal_pattern, RegionScope};
use crate::api::health::{HealthReport, HealthState};
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::db::{KeywordRegistry, MetricStore, ScoreStore};
use crate::discovery::DiscoveryEngine;
use crate::error::AppError;
use crate::forecast::model::DEFAULT_HORIZON_DAYS;
use crate::forecast::{ranking_forecast, Forecast, ForecastEngine, RankingForecast};
use crate::orchestrator::on_demand::SearchResult;
use crate::orchestrator::scheduler::{JobScheduler, JobStatus};
use crate::orchestrator::{OnDemand, RefreshOutcome};
use crate::scorer::{RankedTrend, TrendScorer};
use crate::types::{normalize_keyword, Keyword, Period, ScoreRecord};

/// Top-trends list length when the caller does not ask for one.
const DEFAULT_TOP_LIMIT: usize = 10;
/// Forecast horizons are capped to keep the band meaningful.
const MAX_HORIZON_DAYS: usize = 90;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub registry: KeywordRegistry,
    pub metrics: MetricStore,
    pub scores: ScoreStore,
    pub scorer: TrendScorer,
    pub forecast: ForecastEngine,
    pub discovery: DiscoveryEngine,
    pub on_demand: OnDemand,
    pub scheduler: Arc<JobScheduler>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/trends/top", get(get_top_trends))
        .route("/trends/search", get(search_trend))
        .route("/trends/compare", get(compare_trends))
        .route("/trends/similar", get(get_similar))
        .route("/trends/ranking-forecast", get(get_ranking_forecast))
        .route("/trends/:keyword/forecast", get(get_forecast))
        .route("/trends/:keyword/details", get(get_details))
        .route("/trends/:keyword/regions", get(get_regions))
        .route("/trends/:keyword/correlations", get(get_correlations))
        .route("/trends/:keyword/seasonality", get(get_seasonality))
        .route("/keywords", get(list_keywords))
        .route("/keywords/:keyword/activate", post(activate_keyword))
        .route("/keywords/:keyword", axum::routing::delete(remove_keyword))
        .route("/stats/jobs", get(get_job_status))
        .route("/jobs/:name/run", post(run_job))
        .route("/stats/latency", get(get_latency))
        .route("/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PeriodQuery {
    pub period: Option<i64>,
}

#[derive(Deserialize)]
pub struct TopQuery {
    pub period: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
    pub period: Option<i64>,
}

#[derive(Deserialize)]
pub struct CompareQuery {
    /// Comma-separated.
    pub keywords: String,
    pub period: Option<i64>,
}

#[derive(Deserialize)]
pub struct SimilarQuery {
    pub keyword: String,
    /// Also ask the classification collaborator for a synonym.
    pub semantic: Option<bool>,
}

#[derive(Deserialize)]
pub struct ForecastQuery {
    pub horizon: Option<usize>,
}

#[derive(Deserialize)]
pub struct RunJobQuery {
    /// Block until the job finishes instead of starting it in the background.
    pub wait: Option<bool>,
}

#[derive(Deserialize)]
pub struct RegionsQuery {
    pub scope: Option<RegionScope>,
}

#[derive(Deserialize)]
pub struct CorrelationQuery {
    pub period: Option<i64>,
    pub top_n: Option<usize>,
}

fn period_of(raw: Option<i64>) -> Result<Period, AppError> {
    raw.map(Period::new).transpose().map(Option::unwrap_or_default)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TopTrendsResponse {
    pub period_days: i64,
    pub trends: Vec<RankedTrend>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub keyword: String,
    pub period_days: i64,
    pub refresh: RefreshOutcome,
    pub score: ScoreRecord,
    pub details: KeywordDetails,
}

#[derive(Serialize)]
pub struct SimilarResponse {
    pub similar: Option<String>,
    pub synonym: Option<String>,
}

#[derive(Serialize)]
pub struct RegionsResponse {
    pub keyword: String,
    pub scope: RegionScope,
    pub regions: Vec<RegionValue>,
}

#[derive(Serialize)]
pub struct CorrelationsResponse {
    pub keyword: String,
    pub period_days: i64,
    pub correlations: Vec<Correlation>,
}

#[derive(Serialize)]
pub struct SeasonalityResponse {
    pub keyword: String,
    pub months: Vec<MonthStat>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub on_demand_wait: LatencySummary,
    pub refreshes_in_flight: usize,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_top_trends(
    State(state): State<ApiState>,
    Query(params): Query<TopQuery>,
) -> Result<Json<TopTrendsResponse>, AppError> {
    let period = period_of(params.period)?;
    let trends = state
        .scorer
        .top_trends(period, params.limit.unwrap_or(DEFAULT_TOP_LIMIT))
        .await?;
    Ok(Json(TopTrendsResponse {
        period_days: period.days(),
        trends,
    }))
}

async fn search_trend(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let period = period_of(params.period)?;
    let now = Utc::now();
    let SearchResult {
        keyword,
        refresh,
        score,
    } = state.on_demand.search(&params.keyword, period, now).await?;
    let details = keyword_details(&state.metrics, &state.scores, &keyword.keyword, period, now).await?;
    Ok(Json(SearchResponse {
        keyword: keyword.keyword,
        period_days: period.days(),
        refresh,
        score,
        details,
    }))
}

async fn compare_trends(
    State(state): State<ApiState>,
    Query(params): Query<CompareQuery>,
) -> Result<Json<Vec<SearchResult>>, AppError> {
    let period = period_of(params.period)?;
    let mut results = Vec::new();
    for raw in params.keywords.split(',').filter(|k| !k.trim().is_empty()) {
        results.push(state.on_demand.search(raw, period, Utc::now()).await?);
    }
    Ok(Json(results))
}

async fn get_similar(
    State(state): State<ApiState>,
    Query(params): Query<SimilarQuery>,
) -> Result<Json<SimilarResponse>, AppError> {
    let similar = state.discovery.check_similar(&params.keyword).await?;
    let synonym = if params.semantic.unwrap_or(false) {
        state.discovery.suggest_synonym(&params.keyword).await?
    } else {
        None
    };
    Ok(Json(SimilarResponse { similar, synonym }))
}

async fn get_ranking_forecast(
    State(state): State<ApiState>,
    Query(params): Query<PeriodQuery>,
) -> Result<Json<RankingForecast>, AppError> {
    let period = period_of(params.period)?;
    let forecast = ranking_forecast(&state.scores, &state.metrics, period, Utc::now()).await?;
    Ok(Json(forecast))
}

async fn get_forecast(
    State(state): State<ApiState>,
    Path(keyword): Path<String>,
    Query(params): Query<ForecastQuery>,
) -> Result<Json<Forecast>, AppError> {
    let horizon = params
        .horizon
        .unwrap_or(DEFAULT_HORIZON_DAYS)
        .clamp(1, MAX_HORIZON_DAYS);
    let forecast = state
        .forecast
        .forecast_search_volume(&normalize_keyword(&keyword), horizon)
        .await?;
    Ok(Json(forecast))
}

async fn get_details(
    State(state): State<ApiState>,
    Path(keyword): Path<String>,
    Query(params): Query<PeriodQuery>,
) -> Result<Json<KeywordDetails>, AppError> {
    let period = period_of(params.period)?;
    let details = keyword_details(
        &state.metrics,
        &state.scores,
        &normalize_keyword(&keyword),
        period,
        Utc::now(),
    )
    .await?;
    Ok(Json(details))
}

async fn get_regions(
    State(state): State<ApiState>,
    Path(keyword): Path<String>,
    Query(params): Query<RegionsQuery>,
) -> Result<Json<RegionsResponse>, AppError> {
    let keyword = normalize_keyword(&keyword);
    let scope = params.scope.unwrap_or_default();
    let regions = keyword_regions(&state.metrics, &keyword, scope).await?;
    Ok(Json(RegionsResponse {
        keyword,
        scope,
        regions,
    }))
}

async fn get_correlations(
    State(state): State<ApiState>,
    Path(keyword): Path<String>,
    Query(params): Query<CorrelationQuery>,
) -> Result<Json<CorrelationsResponse>, AppError> {
    let keyword = normalize_keyword(&keyword);
    let period_days = lookback_days(params.period.unwrap_or(DEFAULT_PERIOD_DAYS));
    let correlations = keyword_correlations(
        &state.metrics,
        &keyword,
        period_days,
        params.top_n.unwrap_or(DEFAULT_TOP_N),
        Utc::now(),
    )
    .await?;
    Ok(Json(CorrelationsResponse {
        keyword,
        period_days,
        correlations,
    }))
}

async fn get_seasonality(
    State(state): State<ApiState>,
    Path(keyword): Path<String>,
) -> Result<Json<SeasonalityResponse>, AppError> {
    let keyword = normalize_keyword(&keyword);
    let months = seasonal_pattern(&state.metrics, &keyword).await?;
    Ok(Json(SeasonalityResponse { keyword, months }))
}

async fn list_keywords(State(state): State<ApiState>) -> Result<Json<Vec<Keyword>>, AppError> {
    Ok(Json(state.registry.list_tracked().await?))
}

async fn activate_keyword(
    State(state): State<ApiState>,
    Path(keyword): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let keyword = normalize_keyword(&keyword);
    state.registry.activate(&keyword).await?;
    Ok(Json(MessageResponse {
        message: format!("Keyword '{keyword}' activated"),
    }))
}

async fn remove_keyword(
    State(state): State<ApiState>,
    Path(keyword): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let keyword = normalize_keyword(&keyword);
    state.registry.deactivate(&keyword).await?;
    Ok(Json(MessageResponse {
        message: format!("Keyword '{keyword}' removed from tracking"),
    }))
}

async fn get_job_status(State(state): State<ApiState>) -> Json<Vec<JobStatus>> {
    Json(state.health.jobs())
}

async fn run_job(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(params): Query<RunJobQuery>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = if params.wait.unwrap_or(false) {
        state.scheduler.run_now(&name).await?;
        format!("Job '{name}' finished")
    } else {
        state.scheduler.trigger(&name)?;
        format!("Job '{name}' started")
    };
    Ok(Json(MessageResponse { message }))
}

async fn get_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        on_demand_wait: state.latency.summary(),
        refreshes_in_flight: state.on_demand.in_flight(),
    })
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthReport> {
    let database = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();
    let tracked = state.registry.tracked_names().await.ok().map(|k| k.len());
    Json(state.health.report(database, tracked, Utc::now()))
}
