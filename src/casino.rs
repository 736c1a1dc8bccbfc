//! Play entry points
//!
//! Every game runs the same two phases. Phase one opens the bet in a single unit of
//! work: account on first contact, override resolution, nonce, stake debit and the
//! pending row. The outcome is then drawn by a pure engine, and phase two settles
//! through [`BetManager::complete_bet`]. A failure between the phases leaves a pending
//! bet that [`BetManager::pending_bets`] reports, never a lost stake.
//!
//! Mines and crash rounds stay open between player actions. They live in
//! [`SessionPool`]s; a crash round is driven by a ticking task and settled by
//! whichever side wins the round's state transition. Mines rounds the player
//! abandons are closed by a [`MinesReaper`] sweep.

use crate::bets::{BetManager, NewBet, Settlement};
use crate::common::config::CasinoConfig;
use crate::common::traits::{Clock, KvStore, RoundObserver, SilentObserver};
use crate::common::types::{Cents, SharedRng, UserId};
use crate::credit::CreditService;
use crate::errors::{CasinoError, CasinoResult};
use crate::games::crash::{self, Multiplier};
use crate::games::mines::{self, MineField, MinesRound, MinesState, Reveal};
use crate::games::payout;
use crate::games::sessions::Owned;
use crate::games::slots;
use crate::games::wheel::{self, WheelBet};
use crate::games::{dice, CrashRound, FairnessOverride, GameType, RoundOutcome, SessionPool, Transition};
use crate::ledger::Ledger;
use crate::metrics::CasinoMetrics;
use crate::models::{Bet, FairnessProof};
use crate::rating::RatingService;
use crate::unit_of_work::Store;
use crate::users::{self, AccountService, AccountSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Canonical play request, whatever phrasing the player used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRequest {
    pub user_id: UserId,
    pub display_name: String,
    /// Originating chat or conversation reference
    pub context: String,
    pub stake: Cents,
}

/// A settled single-shot round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayResult {
    pub outcome: RoundOutcome,
    pub settlement: Settlement,
}

/// Seed material disclosed for a slot spin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinDisclosure {
    pub bet_id: Uuid,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

pub struct MinesSession {
    pub id: Uuid,
    pub bet_id: Uuid,
    pub user_id: UserId,
    pub stake: Cents,
    round: Mutex<MinesRound>,
    last_active_ms: AtomicI64,
}

impl MinesSession {
    fn touch(&self, at: DateTime<Utc>) {
        self.last_active_ms.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    fn idle_since(&self, cutoff_ms: i64) -> bool {
        self.last_active_ms.load(Ordering::SeqCst) <= cutoff_ms
    }
}

impl Owned for MinesSession {
    fn owner(&self) -> UserId {
        self.user_id
    }
}

/// Player's view of an open mines round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinesStatus {
    pub session_id: Uuid,
    pub moves: u32,
    /// Multiplier in hundredths if cashed out now
    pub multiplier: u64,
    pub cash_out_value: Cents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MinesMove {
    Safe(MinesStatus),
    /// The move cap was reached and the round paid out.
    CashedOut(PlayResult),
    Exploded(PlayResult),
}

/// A crash round that just started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashStart {
    pub round_id: Uuid,
    pub bet_id: Uuid,
}

struct Opened {
    bet: Bet,
    fairness: FairnessOverride,
    nonce: u64,
}

pub struct Casino {
    config: Arc<CasinoConfig>,
    store: Store,
    clock: Arc<dyn Clock>,
    rng: SharedRng,
    metrics: Arc<CasinoMetrics>,
    ledger: Ledger,
    bets: BetManager,
    accounts: AccountService,
    ratings: RatingService,
    credit: CreditService,
    mines: Arc<SessionPool<MinesSession>>,
    crash_rounds: Arc<SessionPool<CrashRound>>,
    observer: Arc<dyn RoundObserver>,
}

impl Casino {
    pub fn new(config: CasinoConfig, kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>, rng: SharedRng) -> Self {
        let config = Arc::new(config);
        let store = Store::new(kv);
        let metrics = Arc::new(CasinoMetrics::new());
        let settings = AccountSettings {
            wallet: config.wallet.clone(),
            vip: config.vip.clone(),
            bonus: config.bonus.clone(),
            heist: config.heist.clone(),
        };
        Self {
            ledger: Ledger::new(store.clone(), clock.clone()),
            bets: BetManager::new(store.clone(), config.clone(), clock.clone(), metrics.clone()),
            accounts: AccountService::new(store.clone(), clock.clone(), settings, rng.clone()),
            ratings: RatingService::new(store.clone(), clock.clone(), config.rewards.clone()),
            credit: CreditService::new(store.clone(), clock.clone(), config.credit.clone()),
            mines: Arc::new(SessionPool::new()),
            crash_rounds: Arc::new(SessionPool::new()),
            observer: Arc::new(SilentObserver),
            config,
            store,
            clock,
            rng,
            metrics,
        }
    }

    /// Sends live crash events to `observer` instead of dropping them.
    pub fn with_observer(mut self, observer: Arc<dyn RoundObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &CasinoConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn bets(&self) -> &BetManager {
        &self.bets
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn ratings(&self) -> &RatingService {
        &self.ratings
    }

    pub fn credit(&self) -> &CreditService {
        &self.credit
    }

    pub fn metrics(&self) -> &Arc<CasinoMetrics> {
        &self.metrics
    }

    /// Sweeper for mines rounds idle longer than the configured limit.
    pub fn mines_reaper(&self) -> MinesReaper {
        MinesReaper {
            sessions: self.mines.clone(),
            bets: self.bets.clone(),
            clock: self.clock.clone(),
            idle_for: chrono::Duration::seconds(self.config.scheduler.mines_idle_secs as i64),
        }
    }

    /// `seed_for` picks the server seed to record on the bet, given the resolved
    /// override and the nonce.
    async fn open_bet<F>(&self, request: &PlayRequest, game: GameType, seed_for: F) -> CasinoResult<Opened>
    where
        F: FnOnce(FairnessOverride, u64) -> CasinoResult<Option<String>>,
    {
        let user = request.user_id;
        let mut uow = self.store.begin(&[user]).await;
        let now = self.clock.now();

        self.accounts.ensure_user_in(&mut uow, user, &request.display_name, now)?;
        users::active_user_in(&uow, user)?;
        let fairness = users::resolve_override_in(&mut uow, user, now)?;
        let nonce = users::next_nonce_in(&mut uow, user, game)?;
        let server_seed = seed_for(fairness, nonce)?;
        let new_bet = NewBet {
            user_id: user,
            context: request.context.clone(),
            game,
            stake: request.stake,
            proof: server_seed.map(|server_seed| FairnessProof { server_seed, nonce }),
        };
        let bet = match self.bets.create_bet_in(&mut uow, new_bet, now) {
            Ok(bet) => bet,
            Err(e) => {
                if e.is_recoverable() {
                    self.metrics.record_declined();
                }
                tracing::debug!(user_id = user, game = %game, stake = request.stake, error = %e, "play declined");
                return Err(e);
            }
        };
        uow.commit()?;

        self.metrics.record_bet_created(bet.stake);
        if fairness != FairnessOverride::None {
            self.metrics.record_override();
        }
        tracing::debug!(user_id = user, bet_id = %bet.id, game = %game, stake = bet.stake, "bet opened");
        Ok(Opened { bet, fairness, nonce })
    }

    async fn settle(&self, bet_id: Uuid, outcome: RoundOutcome, payout: Cents) -> CasinoResult<PlayResult> {
        let settlement = self.bets.complete_bet(bet_id, &outcome.to_string(), payout).await?;
        Ok(PlayResult { outcome, settlement })
    }

    pub async fn play_dice(&self, request: &PlayRequest) -> CasinoResult<PlayResult> {
        let opened = self.open_bet(request, GameType::Dice, no_seed).await?;
        let roll = self.rng.with(|rng| dice::roll(rng, opened.fairness));
        let payout = payout::dice_payout(opened.bet.stake, &roll);
        self.settle(opened.bet.id, RoundOutcome::Dice { player: roll.player, house: roll.house }, payout)
            .await
    }

    pub async fn play_wheel(&self, request: &PlayRequest, bet: WheelBet) -> CasinoResult<PlayResult> {
        let bet = bet.validate()?;
        let opened = self.open_bet(request, GameType::Wheel, no_seed).await?;
        let number = self.rng.with(|rng| wheel::spin(rng, bet, opened.fairness))?;
        let payout = payout::wheel_payout(opened.bet.stake, bet, number);
        self.settle(opened.bet.id, RoundOutcome::Wheel { bet, number }, payout).await
    }

    /// Slot spin keyed by a server seed, the user id as client seed and the user's
    /// slots nonce. The seed is stored on the bet for later disclosure. Under an
    /// override the seed is chosen so that it spins the forced result, so every
    /// disclosed spin recomputes.
    pub async fn play_slots(&self, request: &PlayRequest) -> CasinoResult<PlayResult> {
        let client_seed = request.user_id.to_string();
        let opened = self
            .open_bet(request, GameType::Slots, |fairness, nonce| {
                self.rng
                    .with(|rng| slots::server_seed_for(rng, &client_seed, nonce, fairness))
                    .map(Some)
            })
            .await?;
        let server_seed = opened.bet.server_seed.as_deref().ok_or(CasinoError::BetNotFound(opened.bet.id))?;
        let symbols = slots::spin(server_seed, &client_seed, opened.nonce)?;
        let payout = payout::slots_payout(opened.bet.stake, &symbols);
        self.settle(opened.bet.id, RoundOutcome::Slots { symbols, client_seed }, payout).await
    }

    pub async fn slot_disclosure(&self, bet_id: Uuid) -> CasinoResult<SpinDisclosure> {
        let bet = self.bets.get_bet(bet_id).await?;
        match (bet.game, bet.server_seed, bet.nonce) {
            (GameType::Slots, Some(server_seed), Some(nonce)) => Ok(SpinDisclosure {
                bet_id,
                server_seed_hash: slots::server_seed_hash(&server_seed),
                server_seed,
                client_seed: bet.user_id.to_string(),
                nonce,
            }),
            _ => Err(CasinoError::BetNotFound(bet_id)),
        }
    }

    pub async fn start_mines(&self, request: &PlayRequest) -> CasinoResult<MinesStatus> {
        let opened = self.open_bet(request, GameType::Mines, no_seed).await?;
        let seed = mines::field_seed(request.user_id, opened.nonce, self.clock.now().timestamp_millis());
        let session = Arc::new(MinesSession {
            id: Uuid::new_v4(),
            bet_id: opened.bet.id,
            user_id: request.user_id,
            stake: opened.bet.stake,
            round: Mutex::new(MinesRound::new(MineField::generate(seed, opened.fairness))),
            last_active_ms: AtomicI64::new(self.clock.now().timestamp_millis()),
        });
        self.mines.insert(session.id, session.clone());
        Ok(status_of(&session, 0))
    }

    fn mines_session(&self, user: UserId, session_id: Uuid) -> CasinoResult<Arc<MinesSession>> {
        self.mines.get_for(session_id, user).ok_or(CasinoError::SessionNotFound(session_id))
    }

    pub async fn reveal_mine(&self, user: UserId, session_id: Uuid, row: usize, col: usize) -> CasinoResult<MinesMove> {
        let session = self.mines_session(user, session_id)?;
        let cell = mines::cell_index(row, col)?;
        let mut round = session.round.lock().await;
        session.touch(self.clock.now());
        match round.reveal(cell)? {
            Reveal::Safe { moves, forced_cashout: false } => Ok(MinesMove::Safe(status_of(&session, moves))),
            Reveal::Safe { moves, forced_cashout: true } => {
                self.mines.remove(session_id);
                let outcome = RoundOutcome::Mines { moves, exploded: false, cancelled: false };
                let result = self.settle(session.bet_id, outcome, payout::mines_payout(session.stake, moves)).await?;
                Ok(MinesMove::CashedOut(result))
            }
            Reveal::Mine => {
                self.mines.remove(session_id);
                let outcome = RoundOutcome::Mines { moves: round.moves(), exploded: true, cancelled: false };
                Ok(MinesMove::Exploded(self.settle(session.bet_id, outcome, 0).await?))
            }
        }
    }

    pub async fn cash_out_mines(&self, user: UserId, session_id: Uuid) -> CasinoResult<PlayResult> {
        let session = self.mines_session(user, session_id)?;
        let mut round = session.round.lock().await;
        let moves = round.cash_out()?;
        self.mines.remove(session_id);
        let outcome = RoundOutcome::Mines { moves, exploded: false, cancelled: false };
        self.settle(session.bet_id, outcome, payout::mines_payout(session.stake, moves)).await
    }

    /// Abandons a round with no open cells and refunds the stake.
    pub async fn cancel_mines(&self, user: UserId, session_id: Uuid) -> CasinoResult<PlayResult> {
        let session = self.mines_session(user, session_id)?;
        let mut round = session.round.lock().await;
        round.cancel()?;
        self.mines.remove(session_id);
        let outcome = RoundOutcome::Mines { moves: 0, exploded: false, cancelled: true };
        let settlement = self.bets.refund_bet(session.bet_id, &outcome.to_string()).await?;
        Ok(PlayResult { outcome, settlement })
    }

    pub fn open_mines_sessions(&self, user: UserId) -> Vec<Uuid> {
        self.mines.open_for(user)
    }

    /// Opens a crash round and starts its ticker.
    pub async fn start_crash(&self, request: &PlayRequest) -> CasinoResult<CrashStart> {
        let opened = self.open_bet(request, GameType::Crash, no_seed).await?;
        let crash_point = self.rng.with(|rng| crash::crash_point_for(rng, opened.fairness));
        let round = Arc::new(CrashRound::new(opened.bet.id, request.user_id, opened.bet.stake, crash_point));
        self.crash_rounds.insert(round.id, round.clone());
        tracing::debug!(round_id = %round.id, bet_id = %opened.bet.id, crash_point = %crash_point, "crash round started");

        let start = CrashStart { round_id: round.id, bet_id: opened.bet.id };
        let ticker = CrashTicker {
            round,
            bets: self.bets.clone(),
            rounds: self.crash_rounds.clone(),
            observer: self.observer.clone(),
        };
        let interval = Duration::from_millis(self.config.crash.tick_interval_ms);
        tokio::spawn(ticker.run(interval));
        Ok(start)
    }

    /// Cashes out at the current multiplier. If the round has just reached its crash
    /// point the bet is settled as lost instead.
    pub async fn cash_out_crash(&self, user: UserId, round_id: Uuid) -> CasinoResult<PlayResult> {
        let round = self
            .crash_rounds
            .get_for(round_id, user)
            .ok_or(CasinoError::SessionNotFound(round_id))?;
        let cashed_out_at = match round.cash_out().await {
            Transition::CashedOut(at) => Some(at),
            Transition::Crashed(_) => None,
            Transition::Ticked(_) | Transition::Closed(_) => return Err(CasinoError::AlreadyCompleted(round.bet_id)),
        };
        settle_crash(&self.bets, &self.crash_rounds, self.observer.as_ref(), &round, cashed_out_at).await
    }

    pub fn open_crash_rounds(&self) -> usize {
        self.crash_rounds.open_count()
    }
}

fn no_seed(_: FairnessOverride, _: u64) -> CasinoResult<Option<String>> {
    Ok(None)
}

/// Closes mines rounds nobody has touched for a while. A round with open cells is
/// cashed out at its current value; an untouched round is refunded.
#[derive(Clone)]
pub struct MinesReaper {
    sessions: Arc<SessionPool<MinesSession>>,
    bets: BetManager,
    clock: Arc<dyn Clock>,
    idle_for: chrono::Duration,
}

impl MinesReaper {
    /// Returns how many rounds were closed.
    pub async fn sweep(&self) -> CasinoResult<usize> {
        let cutoff_ms = self.clock.now().timestamp_millis() - self.idle_for.num_milliseconds();
        let mut closed = 0;
        for session in self.sessions.all() {
            if !session.idle_since(cutoff_ms) {
                continue;
            }
            let mut round = session.round.lock().await;
            // the player may have moved or finished while we waited for the lock
            if round.state() != MinesState::Active || !session.idle_since(cutoff_ms) {
                continue;
            }
            let settled = if round.moves() == 0 {
                round.cancel()?;
                self.sessions.remove(session.id);
                let outcome = RoundOutcome::Mines { moves: 0, exploded: false, cancelled: true };
                self.bets.refund_bet(session.bet_id, &outcome.to_string()).await
            } else {
                let moves = round.cash_out()?;
                self.sessions.remove(session.id);
                let outcome = RoundOutcome::Mines { moves, exploded: false, cancelled: false };
                let payout = payout::mines_payout(session.stake, moves);
                self.bets.complete_bet(session.bet_id, &outcome.to_string(), payout).await
            };
            match settled {
                Ok(settlement) => {
                    closed += 1;
                    tracing::info!(
                        session_id = %session.id,
                        user_id = session.user_id,
                        moves = round.moves(),
                        payout = settlement.base_payout,
                        "idle mines round closed"
                    );
                }
                Err(CasinoError::AlreadyCompleted(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(closed)
    }
}

fn status_of(session: &MinesSession, moves: u32) -> MinesStatus {
    MinesStatus {
        session_id: session.id,
        moves,
        multiplier: payout::mines_multiplier(moves),
        cash_out_value: payout::mines_payout(session.stake, moves),
    }
}

/// Settles a crash round. Only the caller that won the round's terminal transition
/// may call this.
async fn settle_crash(
    bets: &BetManager,
    rounds: &SessionPool<CrashRound>,
    observer: &dyn RoundObserver,
    round: &CrashRound,
    cashed_out_at: Option<Multiplier>,
) -> CasinoResult<PlayResult> {
    let outcome = RoundOutcome::Crash { crash_point: round.crash_point(), cashed_out_at };
    let payout = cashed_out_at.map(|at| payout::crash_payout(round.stake, at)).unwrap_or(0);
    let settled = bets.complete_bet(round.bet_id, &outcome.to_string(), payout).await;
    rounds.remove(round.id);
    let settlement = settled?;
    observer.on_settled(round.id, &settlement).await;
    Ok(PlayResult { outcome, settlement })
}

struct CrashTicker {
    round: Arc<CrashRound>,
    bets: BetManager,
    rounds: Arc<SessionPool<CrashRound>>,
    observer: Arc<dyn RoundObserver>,
}

impl CrashTicker {
    async fn run(self, interval: Duration) {
        let mut tick = tokio::time::interval(interval);
        // the first tick of an interval completes immediately
        tick.tick().await;
        loop {
            tick.tick().await;
            match self.round.advance().await {
                Transition::Ticked(multiplier) => self.observer.on_tick(self.round.id, multiplier).await,
                Transition::Crashed(at) => {
                    tracing::debug!(round_id = %self.round.id, crash_point = %at, "round crashed");
                    if let Err(e) =
                        settle_crash(&self.bets, &self.rounds, self.observer.as_ref(), &self.round, None).await
                    {
                        tracing::error!(round_id = %self.round.id, bet_id = %self.round.bet_id, error = %e, "failed to settle crashed round");
                    }
                    break;
                }
                // cashed out by the player, who settles
                Transition::CashedOut(_) | Transition::Closed(_) => break,
            }
        }
    }
}
