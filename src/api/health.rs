//! Shared state for the /health endpoint: uptime, database reachability and
//! the scheduler's job registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::orchestrator::scheduler::{JobScheduler, JobStatus};

pub struct HealthState {
    started_at: DateTime<Utc>,
    scheduler: Arc<JobScheduler>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: bool,
    pub scheduler_running: bool,
    pub uptime_secs: i64,
    pub tracked_keywords: Option<usize>,
    /// Jobs whose last run returned an error.
    pub failing_jobs: Vec<String>,
}

impl HealthState {
    pub fn new(scheduler: Arc<JobScheduler>) -> Self {
        Self {
            started_at: Utc::now(),
            scheduler,
        }
    }

    pub fn jobs(&self) -> Vec<JobStatus> {
        self.scheduler.status()
    }

    /// "ok" needs a reachable database and no failing job; otherwise "degraded".
    pub fn report(&self, database: bool, tracked_keywords: Option<usize>, now: DateTime<Utc>) -> HealthReport {
        let failing_jobs: Vec<String> = self
            .jobs()
            .into_iter()
            .filter(|j| j.last_outcome.as_deref().is_some_and(|o| o != "ok"))
            .map(|j| j.name)
            .collect();
        HealthReport {
            status: if database && failing_jobs.is_empty() {
                "ok"
            } else {
                "degraded"
            },
            database,
            scheduler_running: self.scheduler.is_running(),
            uptime_secs: (now - self.started_at).num_seconds(),
            tracked_keywords,
            failing_jobs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use futures_util::FutureExt;
    use std::time::Duration;

    #[tokio::test]
    async fn failing_job_degrades_health() {
        let mut scheduler = JobScheduler::new();
        scheduler.register("discovery", Duration::from_secs(60), || async { Ok(()) }.boxed());
        scheduler.register("scrape_and_score", Duration::from_secs(60), || {
            async { Err(AppError::Collector("locked".to_string())) }.boxed()
        });
        let scheduler = Arc::new(scheduler);
        let health = HealthState::new(Arc::clone(&scheduler));

        scheduler.run_now("discovery").await.unwrap();
        let report = health.report(true, Some(3), Utc::now());
        assert_eq!(report.status, "ok");
        assert!(!report.scheduler_running);
        assert!(report.failing_jobs.is_empty());

        scheduler.run_now("scrape_and_score").await.unwrap();
        let report = health.report(true, Some(3), Utc::now());
        assert_eq!(report.status, "degraded");
        assert_eq!(report.failing_jobs, vec!["scrape_and_score".to_string()]);

        assert_eq!(health.report(false, None, Utc::now()).status, "degraded");
    }
}
