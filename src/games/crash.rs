//! Crash multiplier curve
//!
//! The crash point is drawn once per round from weighted bands that favour low values,
//! scaled by the house edge, clamped to [1.1, 10.0] and rounded to one decimal.
//! Multipliers are carried as integer tenths so payouts never touch floating point.

use crate::games::types::FairnessOverride;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiplier in tenths: `Multiplier::from_tenths(25)` is 2.5x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const START: Multiplier = Multiplier(10);
    pub const STEP: Multiplier = Multiplier(1);
    pub const MIN_CRASH: Multiplier = Multiplier(11);
    pub const MAX: Multiplier = Multiplier(100);

    pub const fn from_tenths(tenths: u32) -> Self {
        Self(tenths)
    }

    pub fn tenths(&self) -> u32 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 10.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + Self::STEP.0)
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

const HOUSE_EDGE: f64 = 0.95;

/// (cumulative probability, band low, band high)
const BANDS: [(f64, f64, f64); 5] = [
    (0.40, 1.1, 2.0),
    (0.65, 2.0, 3.0),
    (0.85, 3.0, 5.0),
    (0.95, 5.0, 8.0),
    (1.00, 8.0, 10.0),
];

fn band_value(r: f64) -> f64 {
    let mut floor = 0.0;
    for (ceiling, low, high) in BANDS {
        if r < ceiling {
            return low + (r - floor) / (ceiling - floor) * (high - low);
        }
        floor = ceiling;
    }
    BANDS[BANDS.len() - 1].2
}

/// Fair crash point.
pub fn calculate_crash_point<R: Rng + ?Sized>(rng: &mut R) -> Multiplier {
    let raw = band_value(rng.gen::<f64>()) * HOUSE_EDGE;
    let tenths = (raw * 10.0).round() as u32;
    Multiplier(tenths.clamp(Multiplier::MIN_CRASH.0, Multiplier::MAX.0))
}

/// Crash point honouring an override. A forced loss crashes at the start multiplier,
/// before any cash-out can be accepted; a forced win only crashes at the cap.
pub fn crash_point_for<R: Rng + ?Sized>(rng: &mut R, fairness: FairnessOverride) -> Multiplier {
    match fairness {
        FairnessOverride::None => calculate_crash_point(rng),
        FairnessOverride::ForceWin => Multiplier::MAX,
        FairnessOverride::ForceLoss => Multiplier::START,
    }
}
