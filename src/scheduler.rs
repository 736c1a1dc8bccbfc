//! Periodic background jobs
//!
//! Each job runs on its own interval. A failed run is logged and counted; the job is
//! simply tried again on its next tick.

use crate::casino::{Casino, MinesReaper};
use crate::credit::CreditService;
use crate::errors::CasinoResult;
use crate::metrics::CasinoMetrics;
use crate::models::RatingPeriod;
use crate::rating::RatingService;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// One pass. Returns how many records it touched.
    async fn run(&self) -> CasinoResult<usize>;
}

/// Creates top-3 leaderboard rewards for every period.
pub struct RewardJob {
    ratings: RatingService,
}

impl RewardJob {
    pub fn new(ratings: RatingService) -> Self {
        Self { ratings }
    }
}

#[async_trait]
impl ScheduledJob for RewardJob {
    fn name(&self) -> &'static str {
        "leaderboard_rewards"
    }

    async fn run(&self) -> CasinoResult<usize> {
        let runs = RatingPeriod::ALL.map(|period| self.ratings.calculate_rewards(period));
        let mut created = 0;
        for result in join_all(runs).await {
            created += result?.len();
        }
        Ok(created)
    }
}

/// Flags loans past their due date.
pub struct OverdueSweepJob {
    credit: CreditService,
}

impl OverdueSweepJob {
    pub fn new(credit: CreditService) -> Self {
        Self { credit }
    }
}

#[async_trait]
impl ScheduledJob for OverdueSweepJob {
    fn name(&self) -> &'static str {
        "overdue_credit_sweep"
    }

    async fn run(&self) -> CasinoResult<usize> {
        self.credit.mark_overdue().await
    }
}

/// Closes abandoned mines rounds.
pub struct IdleMinesJob {
    reaper: MinesReaper,
}

impl IdleMinesJob {
    pub fn new(reaper: MinesReaper) -> Self {
        Self { reaper }
    }
}

#[async_trait]
impl ScheduledJob for IdleMinesJob {
    fn name(&self) -> &'static str {
        "idle_mines_sweep"
    }

    async fn run(&self) -> CasinoResult<usize> {
        self.reaper.sweep().await
    }
}

/// A job and how often it runs.
pub struct ScheduledEntry {
    pub job: Arc<dyn ScheduledJob>,
    pub every: Duration,
}

/// The standard job set with intervals from the casino's configuration.
pub fn standard_jobs(casino: &Casino) -> Vec<ScheduledEntry> {
    let config = &casino.config().scheduler;
    vec![
        ScheduledEntry {
            job: Arc::new(RewardJob::new(casino.ratings().clone())),
            every: Duration::from_secs(config.rewards_interval_secs),
        },
        ScheduledEntry {
            job: Arc::new(OverdueSweepJob::new(casino.credit().clone())),
            every: Duration::from_secs(config.overdue_interval_secs),
        },
        ScheduledEntry {
            job: Arc::new(IdleMinesJob::new(casino.mines_reaper())),
            every: Duration::from_secs(config.mines_sweep_interval_secs),
        },
    ]
}

/// Runs `job` once, logging and counting the result. Returns whether it succeeded.
pub async fn run_once(job: &dyn ScheduledJob, metrics: &CasinoMetrics) -> bool {
    match job.run().await {
        Ok(touched) => {
            metrics.record_job(true);
            tracing::info!(job = job.name(), touched, "scheduled job finished");
            true
        }
        Err(e) => {
            metrics.record_job(false);
            tracing::warn!(job = job.name(), error = %e, "scheduled job failed; retrying next run");
            false
        }
    }
}

pub struct Scheduler {
    metrics: Arc<CasinoMetrics>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    /// Starts one task per entry. The first run of each job happens immediately.
    pub fn spawn(entries: Vec<ScheduledEntry>, metrics: Arc<CasinoMetrics>) -> Arc<Self> {
        let scheduler = Arc::new(Self { metrics, running: Arc::new(AtomicBool::new(true)) });
        for entry in entries {
            scheduler.clone().spawn_task(entry);
        }
        scheduler
    }

    fn spawn_task(self: Arc<Self>, entry: ScheduledEntry) {
        tokio::spawn(async move {
            tracing::debug!(job = entry.job.name(), every_secs = entry.every.as_secs(), "job scheduled");
            let mut tick = tokio::time::interval(entry.every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                run_once(entry.job.as_ref(), &self.metrics).await;
            }
        });
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Jobs finish their current run and exit at their next tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
