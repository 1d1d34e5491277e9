//! Named interval jobs with a start/stop lifecycle and a status registry the
//! API reads.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::{AppError, Result};

/// A job body. Called once per tick; errors are logged and recorded, never
/// propagated to the loop.
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub interval_secs: u64,
    pub run_count: u64,
    pub running: bool,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    /// `"ok"` or the error message of the last run.
    pub last_outcome: Option<String>,
}

struct Job {
    name: String,
    every: Duration,
    run: JobFn,
}

pub struct JobScheduler {
    jobs: Vec<Arc<Job>>,
    status: Arc<DashMap<String, JobStatus>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            status: Arc::new(DashMap::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register a job. It first runs one full interval after `start`.
    pub fn register<F>(&mut self, name: &str, every: Duration, run: F)
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.status.insert(
            name.to_string(),
            JobStatus {
                name: name.to_string(),
                interval_secs: every.as_secs(),
                run_count: 0,
                running: false,
                last_started_at: None,
                last_finished_at: None,
                last_outcome: None,
            },
        );
        self.jobs.push(Arc::new(Job {
            name: name.to_string(),
            every,
            run: Arc::new(run),
        }));
    }

    /// Spawn one interval loop per job. Calling `start` twice is a no-op.
    pub fn start(&self) {
        let Ok(mut handles) = self.handles.lock() else {
            return;
        };
        if !handles.is_empty() {
            warn!("Scheduler already started");
            return;
        }
        for job in &self.jobs {
            let job = Arc::clone(job);
            let status = Arc::clone(&self.status);
            handles.push(tokio::spawn(run_loop(job, status)));
        }
        info!(jobs = self.jobs.len(), "Scheduler started");
    }

    /// Abort every job loop. A job body mid-run is dropped at its next await.
    pub fn stop(&self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
        for mut entry in self.status.iter_mut() {
            entry.running = false;
        }
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.handles
            .lock()
            .map(|h| h.iter().any(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Run one job right now, outside its interval.
    pub async fn run_now(&self, name: &str) -> Result<()> {
        let job = self.find(name)?;
        execute(&job, &self.status).await;
        Ok(())
    }

    /// Start one job in the background without waiting for it.
    pub fn trigger(&self, name: &str) -> Result<()> {
        let job = self.find(name)?;
        let status = Arc::clone(&self.status);
        tokio::spawn(async move { execute(&job, &status).await });
        Ok(())
    }

    fn find(&self, name: &str) -> Result<Arc<Job>> {
        self.jobs
            .iter()
            .find(|j| j.name == name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("job {name}")))
    }

    /// Status of every registered job, by name.
    pub fn status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.status.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

async fn run_loop(job: Arc<Job>, status: Arc<DashMap<String, JobStatus>>) {
    let mut ticker = interval(job.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // first tick fires immediately

    loop {
        ticker.tick().await;
        execute(&job, &status).await;
    }
}

async fn execute(job: &Job, status: &DashMap<String, JobStatus>) {
    if let Some(mut s) = status.get_mut(&job.name) {
        s.running = true;
        s.last_started_at = Some(Utc::now());
    }
    info!(job = %job.name, "Job started");

    let outcome = (job.run)().await;

    let message = match &outcome {
        Ok(()) => {
            info!(job = %job.name, "Job finished");
            "ok".to_string()
        }
        Err(e) => {
            error!(job = %job.name, "Job failed: {e}");
            e.to_string()
        }
    };
    if let Some(mut s) = status.get_mut(&job.name) {
        s.running = false;
        s.run_count += 1;
        s.last_finished_at = Some(Utc::now());
        s.last_outcome = Some(message);
    }
}
