//! Outcome engines, payout tables and live-session bookkeeping for each game.

pub mod crash;
pub mod crash_round;
pub mod dice;
pub mod mines;
pub mod payout;
pub mod sessions;
pub mod slots;
pub mod types;
pub mod wheel;

pub use crash::Multiplier;
pub use crash_round::{CrashRound, RoundState, Transition};
pub use sessions::SessionPool;
pub use types::*;
