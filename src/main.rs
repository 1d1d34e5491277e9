mod analytics;
mod api;
mod collectors;
mod config;
mod db;
mod discovery;
mod error;
mod forecast;
mod orchestrator;
mod scorer;
mod types;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::collectors::{discovery_feeds, http_client, CollectorSet};
use crate::config::{Config, Pacing};
use crate::db::{KeywordRegistry, MetricStore, ScoreStore};
use crate::discovery::{Classifier, DiscoveryEngine};
use crate::error::Result;
use crate::forecast::ForecastEngine;
use crate::orchestrator::{register_jobs, JobScheduler, OnDemand, Pipeline};
use crate::scorer::TrendScorer;
use crate::types::normalize_keyword;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let registry = KeywordRegistry::new(pool.clone());
    let metrics = MetricStore::new(pool.clone());
    let scores = ScoreStore::new(pool.clone());

    // --- Seeds ---
    let seeds = seed_keywords(&cfg);
    let inserted = registry.load_seeds(&seeds, Utc::now()).await?;
    info!(configured = seeds.len(), inserted, "Seed keywords loaded");

    // --- Collaborators ---
    let http = http_client()?;
    let collectors = CollectorSet::from_config(&cfg, http.clone());
    if collectors.is_empty() {
        warn!("No COLLECTOR_<SOURCE>_URL set; scheduled scrapes will collect nothing");
    } else {
        info!(sources = ?collectors.configured_sources(), "Collectors configured");
    }
    let classifier = Classifier::from_config(&cfg, http.clone());
    let feeds = discovery_feeds(&cfg, http);

    let pacing = Pacing::default();
    let scorer = TrendScorer::new(metrics.clone(), scores.clone(), registry.clone());
    let pipeline = Pipeline::new(
        registry.clone(),
        metrics.clone(),
        scorer.clone(),
        collectors,
        pacing.clone(),
    );
    let discovery = DiscoveryEngine::new(
        registry.clone(),
        metrics.clone(),
        scores.clone(),
        classifier.clone(),
        feeds,
        pacing,
    );

    // Scale backfill (background, one-shot)
    let backfill = discovery.clone();
    tokio::spawn(async move {
        match backfill.backfill_scales().await {
            Ok(n) => info!(classified = n, "Scale backfill complete"),
            Err(e) => error!("Scale backfill failed: {e}"),
        }
    });

    // --- Scheduler ---
    let mut scheduler = JobScheduler::new();
    register_jobs(&mut scheduler, pipeline.clone(), discovery.clone());
    let scheduler = Arc::new(scheduler);
    scheduler.start();

    // HTTP API server
    let latency = Arc::new(LatencyStats::new());
    let api_state = ApiState {
        pool: pool.clone(),
        on_demand: OnDemand::new(
            registry.clone(),
            metrics.clone(),
            pipeline,
            discovery.clone(),
            Arc::clone(&latency),
        ),
        forecast: ForecastEngine::new(metrics.clone()),
        health: Arc::new(HealthState::new(Arc::clone(&scheduler))),
        scheduler: Arc::clone(&scheduler),
        registry,
        metrics,
        scores,
        scorer,
        discovery,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
        })
        .await?;

    scheduler.stop();
    info!("Shut down");
    Ok(())
}

/// Inline seeds plus the optional JSON file, normalized and deduplicated.
/// A missing or malformed file is logged, not fatal.
fn seed_keywords(cfg: &Config) -> Vec<String> {
    let mut seeds: Vec<String> = cfg.seed_keywords.clone();

    if let Some(path) = &cfg.seed_keywords_path {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(from_file) => seeds.extend(from_file),
                Err(e) => error!(path = %path, "Failed to parse seed keywords: {e}"),
            },
            Err(e) => warn!(path = %path, "Seed keywords file not readable: {e}"),
        }
    }

    let mut out: Vec<String> = Vec::with_capacity(seeds.len());
    for keyword in seeds.iter().map(|s| normalize_keyword(s)) {
        if !keyword.is_empty() && !out.contains(&keyword) {
            out.push(keyword);
        }
    }
    out
}
