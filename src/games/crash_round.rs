//! Live crash round
//!
//! A round is a small state machine, `Running -> CashedOut | Crashed`, behind a mutex.
//! The ticking task and the cash-out handler both go through [`CrashRound::advance`] /
//! [`CrashRound::cash_out`], which compare the current state and transition it in one
//! critical section. Exactly one caller ever observes the terminal transition, and only
//! that caller settles the bet.

use crate::common::types::{Cents, UserId};
use crate::games::crash::Multiplier;
use crate::games::sessions::Owned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RoundState {
    Running { multiplier: Multiplier },
    CashedOut { at: Multiplier },
    Crashed { at: Multiplier },
}

/// Result of one attempted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Still running at the new multiplier.
    Ticked(Multiplier),
    /// This call moved the round to `Crashed`.
    Crashed(Multiplier),
    /// This call moved the round to `CashedOut`.
    CashedOut(Multiplier),
    /// Someone else already ended the round.
    Closed(RoundState),
}

pub struct CrashRound {
    pub id: Uuid,
    pub bet_id: Uuid,
    pub user_id: UserId,
    pub stake: Cents,
    crash_point: Multiplier,
    state: Mutex<RoundState>,
}

impl CrashRound {
    pub fn new(bet_id: Uuid, user_id: UserId, stake: Cents, crash_point: Multiplier) -> Self {
        Self {
            id: Uuid::new_v4(),
            bet_id,
            user_id,
            stake,
            crash_point,
            state: Mutex::new(RoundState::Running { multiplier: Multiplier::START }),
        }
    }

    pub fn crash_point(&self) -> Multiplier {
        self.crash_point
    }

    pub async fn state(&self) -> RoundState {
        *self.state.lock().await
    }

    /// One tick: raise the multiplier by one step, crashing if it reaches the crash point.
    pub async fn advance(&self) -> Transition {
        let mut state = self.state.lock().await;
        let RoundState::Running { multiplier } = *state else {
            return Transition::Closed(*state);
        };
        if multiplier >= self.crash_point {
            *state = RoundState::Crashed { at: self.crash_point };
            return Transition::Crashed(self.crash_point);
        }
        let next = multiplier.next();
        if next >= self.crash_point {
            *state = RoundState::Crashed { at: self.crash_point };
            Transition::Crashed(self.crash_point)
        } else {
            *state = RoundState::Running { multiplier: next };
            Transition::Ticked(next)
        }
    }

    /// Claims the round at the current multiplier. Too late once the crash point is reached.
    pub async fn cash_out(&self) -> Transition {
        let mut state = self.state.lock().await;
        let RoundState::Running { multiplier } = *state else {
            return Transition::Closed(*state);
        };
        if multiplier >= self.crash_point {
            *state = RoundState::Crashed { at: self.crash_point };
            return Transition::Crashed(self.crash_point);
        }
        *state = RoundState::CashedOut { at: multiplier };
        Transition::CashedOut(multiplier)
    }
}

impl Owned for CrashRound {
    fn owner(&self) -> UserId {
        self.user_id
    }
}
