//! Fairbet - provably-fair game and ledger core for a chat casino
//!
//! Outcome engines and payout tables are pure functions under [`games`]. Money moves
//! only through the [`ledger`], always inside a [`unit_of_work::UnitOfWork`] holding the
//! affected users' locks. [`casino::Casino`] wires the services together behind the
//! play entry points a chat transport calls.

pub mod bets;
pub mod casino;
pub mod clock;
pub mod command;
pub mod common;
pub mod credit;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod rating;
pub mod records;
pub mod scheduler;
pub mod storage;
pub mod unit_of_work;
pub mod users;

pub use bets::{BetManager, Settlement};
pub use casino::{Casino, PlayRequest, PlayResult};
pub use clock::{ManualClock, SystemClock};
pub use common::config::{CasinoConfig, ConfigBuilder, ConfigLoader};
pub use common::types::{Cents, SharedRng, UserId};
pub use errors::{CasinoError, CasinoResult};
pub use ledger::Ledger;
pub use storage::{MemoryStorage, OptimizedStorage};
