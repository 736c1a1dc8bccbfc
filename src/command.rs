//! Chat command adapter
//!
//! Players trigger games with many phrasings (`/dice 20`, `roll 20`, `roulette 10 red`,
//! `wheel red 10`, `/rocket@bot 5.50`). All of them reduce to one [`Command`], which
//! [`dispatch`] hands to the matching game routine.

use crate::casino::{Casino, CrashStart, MinesStatus, PlayRequest, PlayResult};
use crate::common::types::{Cents, UserId};
use crate::errors::{CasinoError, CasinoResult};
use crate::games::wheel::WheelBet;
use crate::games::GameType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub game: GameType,
    pub stake: Cents,
    pub wheel_bet: Option<WheelBet>,
}

impl Command {
    pub fn into_request(self, user_id: UserId, display_name: &str, context: &str) -> PlayRequest {
        PlayRequest {
            user_id,
            display_name: display_name.to_string(),
            context: context.to_string(),
            stake: self.stake,
        }
    }
}

/// Parses a decimal currency amount into cents without going through floats.
/// Accepts an optional `$`, and `.` or `,` as the decimal mark, with at most two
/// fractional digits.
pub fn parse_cents(text: &str) -> CasinoResult<Cents> {
    let invalid = || CasinoError::InvalidAmount(format!("'{}' is not an amount", text.trim()));
    let raw = text.trim().trim_start_matches('$');
    let (whole, fraction) = match raw.split_once(|c: char| c == '.' || c == ',') {
        Some((whole, fraction)) => (whole, fraction),
        None => (raw, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > 2 {
        return Err(CasinoError::InvalidAmount("use at most two decimal places".into()));
    }

    let whole: Cents = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let fraction: Cents = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<Cents>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };
    whole
        .checked_mul(100)
        .and_then(|cents| cents.checked_add(fraction))
        .ok_or_else(invalid)
}

/// Turns one chat message into a [`Command`].
pub fn parse_command(text: &str) -> CasinoResult<Command> {
    let mut words = text.split_whitespace();
    let trigger = words
        .next()
        .ok_or_else(|| CasinoError::InvalidMove("empty command".into()))?;
    // `/dice@somebot`
    let trigger = trigger.split('@').next().unwrap_or(trigger);
    let game: GameType = trigger.parse().map_err(CasinoError::InvalidMove)?;
    let args: Vec<&str> = words.collect();

    match (game, args.as_slice()) {
        (GameType::Wheel, [first, second]) => {
            let (stake, wheel_bet) = match (parse_cents(first), second.parse::<WheelBet>()) {
                (Ok(stake), Ok(bet)) => (stake, bet),
                _ => (
                    parse_cents(second)?,
                    first.parse::<WheelBet>().map_err(CasinoError::InvalidMove)?,
                ),
            };
            Ok(Command { game, stake, wheel_bet: Some(wheel_bet) })
        }
        (GameType::Wheel, _) => Err(CasinoError::InvalidMove(
            "wheel needs an amount and a bet, e.g. `wheel 10 red`".into(),
        )),
        (_, [amount]) => Ok(Command { game, stake: parse_cents(amount)?, wheel_bet: None }),
        _ => Err(CasinoError::InvalidMove(format!("usage: {} <amount>", game))),
    }
}

/// What a dispatched command produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Play {
    Finished(PlayResult),
    MinesOpened(MinesStatus),
    CrashStarted(CrashStart),
}

pub async fn dispatch(casino: &Casino, command: Command, request: &PlayRequest) -> CasinoResult<Play> {
    tracing::debug!(user_id = request.user_id, game = %command.game, stake = request.stake, "dispatching command");
    match command.game {
        GameType::Dice => casino.play_dice(request).await.map(Play::Finished),
        GameType::Wheel => {
            let bet = command
                .wheel_bet
                .ok_or_else(|| CasinoError::InvalidMove("pick a wheel bet".into()))?;
            casino.play_wheel(request, bet).await.map(Play::Finished)
        }
        GameType::Slots => casino.play_slots(request).await.map(Play::Finished),
        GameType::Mines => casino.start_mines(request).await.map(Play::MinesOpened),
        GameType::Crash => casino.start_crash(request).await.map(Play::CrashStarted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("20").unwrap(), 2_000);
        assert_eq!(parse_cents("10.5").unwrap(), 1_050);
        assert_eq!(parse_cents("$0,07").unwrap(), 7);
        assert_eq!(parse_cents(".25").unwrap(), 25);
        assert!(parse_cents("1.234").is_err());
        assert!(parse_cents("-5").is_err());
        assert!(parse_cents("ten").is_err());
        assert!(parse_cents("").is_err());
        assert!(parse_cents("99999999999999999999").is_err());
    }

    #[test]
    fn test_aliases_reach_one_shape() {
        let canonical = parse_command("dice 20").unwrap();
        assert_eq!(parse_command("/roll 20").unwrap(), canonical);
        assert_eq!(parse_command("/dice@casino_bot 20.00").unwrap(), canonical);
        assert_eq!(parse_command("rocket 5").unwrap().game, GameType::Crash);
        assert_eq!(parse_command("/spin 1").unwrap().game, GameType::Slots);
    }

    #[test]
    fn test_wheel_selection_either_order() {
        let expected = Command { game: GameType::Wheel, stake: 1_000, wheel_bet: Some(WheelBet::Red) };
        assert_eq!(parse_command("wheel 10 red").unwrap(), expected);
        assert_eq!(parse_command("roulette red 10").unwrap(), expected);
        let number = parse_command("wheel 10 7").unwrap();
        assert_eq!(number.wheel_bet, Some(WheelBet::Number(7)));
        assert_eq!(number.stake, 1_000);
        assert!(parse_command("wheel 10").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(parse_command(""), Err(CasinoError::InvalidMove(_))));
        assert!(matches!(parse_command("poker 10"), Err(CasinoError::InvalidMove(_))));
        assert!(matches!(parse_command("dice"), Err(CasinoError::InvalidMove(_))));
        assert!(matches!(parse_command("dice abc"), Err(CasinoError::InvalidAmount(_))));
    }
}
