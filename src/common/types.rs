//! Canonical scalar types and small helpers shared across modules.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

/// Stable chat-platform user identifier.
pub type UserId = i64;

/// Money in minor currency units. Never a float.
pub type Cents = u64;

/// Scales `amount` by `numerator / denominator`, rounding down.
///
/// Intermediate math is done in `u128` so large stakes cannot overflow.
pub fn scale(amount: Cents, numerator: u64, denominator: u64) -> Cents {
    if denominator == 0 {
        return 0;
    }
    let scaled = amount as u128 * numerator as u128 / denominator as u128;
    scaled.min(Cents::MAX as u128) as Cents
}

/// Percentage of an amount, rounded down (`percent_of(1000, 10) == 100`).
pub fn percent_of(amount: Cents, percent: u32) -> Cents {
    scale(amount, percent as u64, 100)
}

/// Fixed-width millisecond timestamp used in ordered storage keys.
pub fn sortable_millis(at: DateTime<Utc>) -> String {
    format!("{:020}", at.timestamp_millis().max(0))
}

/// Randomness shared by the services. The lock is never held across an await.
#[derive(Clone)]
pub struct SharedRng(Arc<Mutex<StdRng>>);

impl SharedRng {
    pub fn from_entropy() -> Self {
        Self(Arc::new(Mutex::new(StdRng::from_entropy())))
    }

    /// Deterministic stream for tests and simulations.
    pub fn seeded(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(StdRng::seed_from_u64(seed))))
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}
