//! Runtime counters for the casino core

use crate::common::types::Cents;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub struct CasinoMetrics {
    start_time: Instant,
    bets_created: AtomicU64,
    bets_completed: AtomicU64,
    stakes_declined: AtomicU64,
    total_staked: AtomicU64,
    total_paid: AtomicU64,
    overrides_applied: AtomicU64,
    jobs_run: AtomicU64,
    jobs_failed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub bets_created: u64,
    pub bets_completed: u64,
    pub stakes_declined: u64,
    pub total_staked: Cents,
    pub total_paid: Cents,
    pub overrides_applied: u64,
    pub jobs_run: u64,
    pub jobs_failed: u64,
}

impl MetricsSnapshot {
    /// Paid out per staked cent, in percent. Zero before the first bet.
    pub fn return_to_player_percent(&self) -> f64 {
        if self.total_staked == 0 {
            return 0.0;
        }
        self.total_paid as f64 * 100.0 / self.total_staked as f64
    }
}

impl CasinoMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            bets_created: AtomicU64::new(0),
            bets_completed: AtomicU64::new(0),
            stakes_declined: AtomicU64::new(0),
            total_staked: AtomicU64::new(0),
            total_paid: AtomicU64::new(0),
            overrides_applied: AtomicU64::new(0),
            jobs_run: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    pub fn record_bet_created(&self, stake: Cents) {
        self.bets_created.fetch_add(1, Ordering::Relaxed);
        self.total_staked.fetch_add(stake, Ordering::Relaxed);
    }

    pub fn record_bet_completed(&self, paid: Cents) {
        self.bets_completed.fetch_add(1, Ordering::Relaxed);
        self.total_paid.fetch_add(paid, Ordering::Relaxed);
    }

    pub fn record_declined(&self) {
        self.stakes_declined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_override(&self) {
        self.overrides_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job(&self, succeeded: bool) {
        self.jobs_run.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            bets_created: self.bets_created.load(Ordering::Relaxed),
            bets_completed: self.bets_completed.load(Ordering::Relaxed),
            stakes_declined: self.stakes_declined.load(Ordering::Relaxed),
            total_staked: self.total_staked.load(Ordering::Relaxed),
            total_paid: self.total_paid.load(Ordering::Relaxed),
            overrides_applied: self.overrides_applied.load(Ordering::Relaxed),
            jobs_run: self.jobs_run.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for CasinoMetrics {
    fn default() -> Self {
        Self::new()
    }
}
