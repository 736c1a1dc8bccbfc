//! Fairbet service binary
//!
//! Runs the background jobs against a configured store, and offers offline tools for
//! operators: return-to-player simulation, slot spin verification and ledger audits.

use clap::{Parser, Subcommand};
use fairbet::common::traits::Clock;
use fairbet::games::crash::{self, Multiplier};
use fairbet::games::mines::{self, MineField, MinesRound, Reveal, CELLS};
use fairbet::games::wheel::{self, WheelBet};
use fairbet::games::{dice, payout, slots, FairnessOverride, GameType};
use fairbet::scheduler::{self, Scheduler};
use fairbet::storage::open_backend;
use fairbet::unit_of_work::Store;
use fairbet::{Casino, CasinoConfig, CasinoResult, ConfigLoader, Ledger, SharedRng, SystemClock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fairbet")]
#[command(about = "Provably-fair casino core", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the store and run the scheduled jobs until Ctrl-C
    Run,

    /// Estimate return-to-player with the outcome engines
    Simulate {
        #[arg(short, long)]
        game: GameType,

        #[arg(short, long, default_value_t = 100_000)]
        rounds: u64,

        /// Stake per round in cents
        #[arg(short, long, default_value_t = 1_000)]
        stake: u64,

        /// Crash: cash out at this multiplier, in tenths
        #[arg(long, default_value_t = 20)]
        cash_out_tenths: u32,

        /// Mines: safe cells to open before cashing out
        #[arg(long, default_value_t = 3)]
        moves: u32,

        #[arg(long, default_value_t = 7)]
        seed: u64,
    },

    /// Recompute a slot spin from disclosed seeds
    VerifySpin {
        #[arg(long)]
        server_seed: String,

        #[arg(long)]
        client_seed: String,

        #[arg(long)]
        nonce: u64,
    },

    /// Compare a wallet balance against its transaction log
    Audit {
        #[arg(short, long)]
        user: i64,
    },

    /// Write the default configuration
    InitConfig {
        #[arg(short, long, default_value = "fairbet.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "fairbet=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let load_config = || {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &cli.config {
            loader = loader.with_path(path);
        }
        loader.load()
    };

    match cli.command {
        Commands::Run => run(load_config()?).await?,
        Commands::Simulate { game, rounds, stake, cash_out_tenths, moves, seed } => {
            let options = SimulationOptions {
                cash_out: Multiplier::from_tenths(cash_out_tenths),
                moves,
            };
            let paid = simulate(game, rounds, stake, &options, seed)?;
            let staked = rounds as u128 * stake as u128;
            println!("game:            {}", game);
            println!("rounds:          {}", rounds);
            println!("staked:          {}", staked);
            println!("paid:            {}", paid);
            println!("return to player: {:.2}%", paid as f64 * 100.0 / staked.max(1) as f64);
        }
        Commands::VerifySpin { server_seed, client_seed, nonce } => {
            let symbols = slots::spin(&server_seed, &client_seed, nonce)?;
            println!("server seed hash: {}", slots::server_seed_hash(&server_seed));
            println!("symbols:          {} {} {}", symbols[0], symbols[1], symbols[2]);
        }
        Commands::Audit { user } => {
            let config = load_config()?;
            let store = Store::new(open_backend(&config.storage)?);
            let ledger = Ledger::new(store, Arc::new(SystemClock));
            let audit = ledger.audit(user).await?;
            println!("{}", serde_json::to_string_pretty(&audit)?);
            if !audit.consistent {
                std::process::exit(2);
            }
        }
        Commands::InitConfig { path } => {
            ConfigLoader::save(&CasinoConfig::default(), &path)?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

async fn run(config: CasinoConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(backend = ?config.storage.backend, data_dir = %config.storage.data_dir, "starting fairbet");
    let kv = open_backend(&config.storage)?;
    let clock = Arc::new(SystemClock);
    let started = clock.now();
    let casino = Casino::new(config, kv, clock, SharedRng::from_entropy());

    // open rounds do not survive a restart
    casino.bets().refund_stranded(started).await?;

    let scheduler = Scheduler::spawn(scheduler::standard_jobs(&casino), casino.metrics().clone());
    tokio::signal::ctrl_c().await?;
    scheduler.stop();

    let snapshot = casino.metrics().snapshot();
    tracing::info!(
        bets = snapshot.bets_completed,
        jobs = snapshot.jobs_run,
        jobs_failed = snapshot.jobs_failed,
        "shutting down"
    );
    Ok(())
}

struct SimulationOptions {
    cash_out: Multiplier,
    moves: u32,
}

/// Total paid over `rounds` fair rounds.
fn simulate(game: GameType, rounds: u64, stake: u64, options: &SimulationOptions, seed: u64) -> CasinoResult<u128> {
    let mut rng = StdRng::seed_from_u64(seed);
    let fair = FairnessOverride::None;
    let mut paid: u128 = 0;
    for round in 0..rounds {
        let payout = match game {
            GameType::Dice => payout::dice_payout(stake, &dice::roll(&mut rng, fair)),
            GameType::Wheel => {
                let number = wheel::spin(&mut rng, WheelBet::Red, fair)?;
                payout::wheel_payout(stake, WheelBet::Red, number)
            }
            GameType::Slots => {
                let server_seed = slots::generate_server_seed(&mut rng);
                payout::slots_payout(stake, &slots::spin(&server_seed, "simulation", round)?)
            }
            GameType::Mines => {
                let field = MineField::generate(mines::field_seed(0, round, 0), fair);
                let mut grid = MinesRound::new(field);
                let mut cells: Vec<usize> = (0..CELLS).collect();
                cells.shuffle(&mut rng);
                let mut exploded = false;
                for cell in cells.into_iter().take(options.moves as usize) {
                    if let Ok(Reveal::Mine) = grid.reveal(cell) {
                        exploded = true;
                        break;
                    }
                }
                if exploded { 0 } else { payout::mines_payout(stake, grid.moves()) }
            }
            GameType::Crash => {
                if crash::calculate_crash_point(&mut rng) > options.cash_out {
                    payout::crash_payout(stake, options.cash_out)
                } else {
                    0
                }
            }
        };
        paid += payout as u128;
    }
    Ok(paid)
}
