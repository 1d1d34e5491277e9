use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::collectors::DiscoveryFeed;
use crate::config::refinement_thresholds::*;
use crate::config::Pacing;
use crate::db::{KeywordRegistry, MetricStore, ScoreStore};
use crate::discovery::classifier::Classifier;
use crate::discovery::extract::extract_candidate_terms;
use crate::error::Result;
use crate::scorer::growth::{mean, variance};
use crate::types::{normalize_keyword, Scale};

/// Candidates this short are never tracked.
const MIN_CANDIDATE_LEN: usize = 3;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub candidates: usize,
    pub added: usize,
    pub suppressed: usize,
    pub reactivated: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RefinementReport {
    pub updated: usize,
    pub skipped: usize,
}

/// Scale the statistics support, if they agree strongly enough.
/// `None` means keep whatever tag the keyword already has.
pub fn refined_scale(cv: f64, score_variance: f64) -> Option<Scale> {
    if cv > MICRO_MIN_CV && score_variance > MICRO_MIN_SCORE_VARIANCE {
        Some(Scale::Micro)
    } else if cv < MACRO_MAX_CV && score_variance < MACRO_MAX_SCORE_VARIANCE {
        Some(Scale::Macro)
    } else {
        None
    }
}

/// Word-set containment match for interactive suggestions. A tracked keyword
/// matches when its words are a subset of the query's or vice versa; the
/// match with the most words wins, first one on ties.
pub fn most_specific_overlap<'a>(query: &str, tracked: &'a [String]) -> Option<&'a str> {
    let query_words: HashSet<&str> = query.split_whitespace().collect();
    let mut best: Option<(&str, usize)> = None;
    for keyword in tracked.iter().filter(|k| k.as_str() != query) {
        let words: HashSet<&str> = keyword.split_whitespace().collect();
        if !(words.is_subset(&query_words) || query_words.is_subset(&words)) {
            continue;
        }
        if best.map_or(true, |(_, n)| words.len() > n) {
            best = Some((keyword.as_str(), words.len()));
        }
    }
    best.map(|(k, _)| k)
}

/// Classify one keyword's scale in the background. Nobody awaits the handle
/// outside tests.
fn spawn_scale_classification(
    registry: KeywordRegistry,
    classifier: Classifier,
    keyword: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let scale = classifier.classify_scale(&keyword).await;
        match registry.set_scale(&keyword, scale).await {
            Ok(()) => info!(keyword = %keyword, scale = %scale, "Scale assigned"),
            Err(e) => error!(keyword = %keyword, "Failed to store scale: {e}"),
        }
    })
}

/// Keyword discovery, semantic dedup and scale management.
#[derive(Clone)]
pub struct DiscoveryEngine {
    registry: KeywordRegistry,
    metrics: MetricStore,
    scores: ScoreStore,
    classifier: Classifier,
    feeds: Vec<Arc<dyn DiscoveryFeed>>,
    pacing: Pacing,
}

impl DiscoveryEngine {
    pub fn new(
        registry: KeywordRegistry,
        metrics: MetricStore,
        scores: ScoreStore,
        classifier: Classifier,
        feeds: Vec<Arc<dyn DiscoveryFeed>>,
        pacing: Pacing,
    ) -> Self {
        Self {
            registry,
            metrics,
            scores,
            classifier,
            feeds,
            pacing,
        }
    }

    /// Gather candidates from every feed, drop known and duplicate ones, and
    /// insert the rest as `pending_review`.
    pub async fn run_discovery(&self, now: DateTime<Utc>) -> Result<DiscoveryReport> {
        info!(feeds = self.feeds.len(), "Running keyword auto-discovery");

        let mut titles = Vec::new();
        let mut terms = Vec::new();
        for feed in &self.feeds {
            let snapshot = feed.snapshot().await;
            debug!(
                source = %feed.source(),
                titles = snapshot.recent_titles.len(),
                terms = snapshot.trending_terms.len(),
                "Feed read"
            );
            titles.extend(snapshot.recent_titles);
            terms.extend(snapshot.trending_terms);
        }

        let mut seen = HashSet::new();
        let candidates: Vec<String> = extract_candidate_terms(&titles)
            .into_iter()
            .chain(terms)
            .map(|c| normalize_keyword(&c))
            .filter(|c| c.len() >= MIN_CANDIDATE_LEN && seen.insert(c.clone()))
            .collect();

        let known: HashSet<String> = self.registry.all_names().await?.into_iter().collect();
        let mut tracked = self.registry.tracked_names().await?;
        let mut report = DiscoveryReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            if known.contains(&candidate) {
                if self.registry.reactivate(&candidate).await? {
                    info!(keyword = %candidate, "Discovery reactivated keyword");
                    report.reactivated += 1;
                    tracked.push(candidate);
                }
                continue;
            }

            if let Some(existing) = self.classifier.find_synonym(&candidate, &tracked, true).await {
                debug!(keyword = %candidate, existing = %existing, "Skipping synonym of tracked keyword");
                report.suppressed += 1;
                continue;
            }

            if self.registry.insert_discovered(&candidate, now).await? {
                report.added += 1;
                tracked.push(candidate);
            }
        }

        info!(
            added = report.added,
            suppressed = report.suppressed,
            reactivated = report.reactivated,
            "Auto-discovery complete"
        );
        Ok(report)
    }

    /// Deterministic suggestion for a user query. `None` if the query is
    /// already tracked or nothing overlaps.
    pub async fn check_similar(&self, query: &str) -> Result<Option<String>> {
        let query = normalize_keyword(query);
        let tracked = self.registry.tracked_names().await?;
        if tracked.iter().any(|k| *k == query) {
            return Ok(None);
        }
        Ok(most_specific_overlap(&query, &tracked).map(str::to_string))
    }

    /// Single-affirmative semantic suggestion; the user decides.
    pub async fn suggest_synonym(&self, query: &str) -> Result<Option<String>> {
        let query = normalize_keyword(query);
        let tracked = self.registry.tracked_names().await?;
        Ok(self.classifier.find_synonym(&query, &tracked, false).await)
    }

    /// Background scale classification for a newly tracked keyword.
    pub fn classify_new_keyword(&self, keyword: &str) -> JoinHandle<()> {
        spawn_scale_classification(self.registry.clone(), self.classifier.clone(), keyword.to_string())
    }

    /// Classify every non-inactive keyword that has no scale yet.
    pub async fn backfill_scales(&self) -> Result<usize> {
        let keywords = self.registry.unscaled().await?;
        if keywords.is_empty() {
            return Ok(0);
        }
        info!(count = keywords.len(), "Backfilling scale classifications");
        for keyword in &keywords {
            let scale = self.classifier.classify_scale(keyword).await;
            self.registry.set_scale(keyword, scale).await?;
            info!(keyword = %keyword, scale = %scale, "Scale assigned");
            if self.classifier.is_enabled() {
                tokio::time::sleep(self.pacing.classify_pause).await;
            }
        }
        Ok(keywords.len())
    }

    /// Re-evaluate scale tags for active keywords from accumulated data.
    pub async fn refine_scales(&self) -> Result<RefinementReport> {
        let mut report = RefinementReport::default();

        for (keyword, current) in self.registry.active_with_scale().await? {
            let volumes = self.metrics.all_search_volume(&keyword).await?;
            let scores = self.scores.composite_scores(&keyword).await?;
            if volumes.len() < MIN_VOLUME_POINTS || scores.len() < MIN_SCORE_POINTS {
                report.skipped += 1;
                continue;
            }

            let volume_mean = mean(&volumes);
            if volume_mean == 0.0 {
                report.skipped += 1;
                continue;
            }
            let cv = variance(&volumes).sqrt() / volume_mean;
            let score_variance = variance(&scores);

            let Some(new_scale) = refined_scale(cv, score_variance) else {
                continue;
            };
            let current_scale = current.unwrap_or(Scale::Macro);
            if new_scale != current_scale {
                self.registry.set_scale(&keyword, new_scale).await?;
                info!(
                    keyword = %keyword,
                    from = %current_scale,
                    to = %new_scale,
                    cv,
                    score_variance,
                    points = volumes.len(),
                    "Scale refined"
                );
                report.updated += 1;
            }
        }

        info!(updated = report.updated, skipped = report.skipped, "Scale refinement complete");
        Ok(report)
    }
}
