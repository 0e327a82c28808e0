//! Headless battle runner.
//!
//! Runs one battle without any presentation layer: a scripted pilot drives
//! the controlled combatant while the core's controllers drive the
//! opponents. Progress is logged to stderr; the outcome goes to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Default battle (double mode, normal difficulty)
//! cargo run -p skirmish-headless
//!
//! # One opponent, hard AI, fixed seed, JSON result
//! cargo run -p skirmish-headless -- --mode single --difficulty hard --seed 7 --json
//!
//! # Load tunables from a file
//! cargo run -p skirmish-headless -- --config battle.json
//! ```

mod pilot;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_core::{Battle, BattleConfig, Difficulty};

use crate::pilot::Pilot;

#[derive(Parser, Debug)]
#[command(name = "skirmish-headless")]
#[command(about = "Headless arena battle runner")]
#[command(version)]
struct Args {
    /// JSON battle config file
    #[arg(long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Battle mode: single or double
    #[arg(short, long, default_value = "double")]
    mode: String,

    /// AI difficulty override: easy, normal or hard
    #[arg(short, long)]
    difficulty: Option<Difficulty>,

    /// RNG seed override
    #[arg(long)]
    seed: Option<u64>,

    /// Give up after this many seconds
    #[arg(long, default_value = "120")]
    max_seconds: u64,

    /// Print the final snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<BattleConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            BattleConfig::from_json_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => BattleConfig::default(),
    };
    if let Some(difficulty) = args.difficulty {
        config.difficulty = difficulty;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&args)?;
    let tick = config.tick_interval();
    let battle = Battle::new(config)?;
    battle
        .initialize(&args.mode)
        .await
        .with_context(|| format!("starting '{}' battle", args.mode))?;

    tracing::info!(seed = battle.seed(), mode = %args.mode, "Headless battle running");

    let mut pilot = Pilot::new();
    let deadline = Instant::now() + Duration::from_secs(args.max_seconds);
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_report = Instant::now();

    while battle.is_playing() && Instant::now() < deadline {
        ticker.tick().await;
        pilot.step(&battle);

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let snap = battle.snapshot();
            if let Some(me) = &snap.controlled {
                tracing::info!(
                    elapsed_ms = snap.elapsed_ms,
                    score = snap.score,
                    health = me.health,
                    mana = me.mana,
                    opponents_alive = snap.opponents.iter().filter(|o| o.alive).count(),
                    "Progress"
                );
            }
        }
    }

    let snapshot = battle.snapshot();
    let outcome = battle.outcome();
    battle.shutdown();

    let stats = pilot.stats();
    tracing::info!(
        moves = stats.moves,
        hits = stats.hits,
        casts = stats.casts,
        "Pilot finished"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        let verdict = match outcome {
            Some(true) => "VICTORY",
            Some(false) => "DEFEAT",
            None => "TIMEOUT",
        };
        println!(
            "{verdict} after {:.1}s, score {}",
            Duration::from_millis(snapshot.elapsed_ms).as_secs_f32(),
            snapshot.score
        );
    }
    Ok(())
}
