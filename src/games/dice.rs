//! Dice duel: player and house each roll one die, higher wins.

use crate::games::types::{FairnessOverride, GameOutcome};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub player: u8,
    pub house: u8,
}

impl DiceRoll {
    pub fn outcome(&self) -> GameOutcome {
        match self.player.cmp(&self.house) {
            std::cmp::Ordering::Greater => GameOutcome::Win,
            std::cmp::Ordering::Equal => GameOutcome::Push,
            std::cmp::Ordering::Less => GameOutcome::Loss,
        }
    }
}

pub fn roll<R: Rng + ?Sized>(rng: &mut R, fairness: FairnessOverride) -> DiceRoll {
    match fairness {
        FairnessOverride::None => DiceRoll {
            house: rng.gen_range(1..=6),
            player: rng.gen_range(1..=6),
        },
        FairnessOverride::ForceWin => {
            let house = rng.gen_range(1..=5);
            DiceRoll { house, player: rng.gen_range(house + 1..=6) }
        }
        FairnessOverride::ForceLoss => {
            let player = rng.gen_range(1..=5);
            DiceRoll { player, house: rng.gen_range(player + 1..=6) }
        }
    }
}
