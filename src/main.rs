// Headless TaskBots run
// Plays a level at a fixed 60 Hz with a random keyboard "player" and logs how it goes

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use winit::keyboard::KeyCode;

use taskbots::engine::input::KeyboardControlInput;
use taskbots::game::{GameplayConfig, Level, LevelConfig, LevelOutcome};
use taskbots::logging;

const DEMO_LEVEL: &str = include_str!("../levels/demo.ron");
const FRAME_TIME: f32 = 1.0 / 60.0;
/// How often the random player reconsiders its keys.
const DECISION_INTERVAL: f32 = 0.4;
const KEYS: [KeyCode; 5] = [KeyCode::KeyW, KeyCode::KeyS, KeyCode::KeyA, KeyCode::KeyD, KeyCode::Space];

/// Headless TaskBots level runner
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Level file (RON). Plays the built-in demo level when omitted
    level: Option<PathBuf>,
    /// Gameplay tuning file (RON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for the random player
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = match &args.config {
        Some(path) => GameplayConfig::load(path).with_context(|| format!("loading gameplay config {}", path.display()))?,
        None => GameplayConfig::default(),
    };
    let level_config = match &args.level {
        Some(path) => LevelConfig::load(path).with_context(|| format!("loading level {}", path.display()))?,
        None => LevelConfig::from_ron_str(DEMO_LEVEL).context("parsing built-in demo level")?,
    };

    let mut level = Level::new(config, &level_config)?;
    let mut keyboard = KeyboardControlInput::new();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut until_decision = 0.0;
    let mut until_report = 5.0;

    while level.outcome() == LevelOutcome::InProgress {
        until_decision -= FRAME_TIME;
        if until_decision <= 0.0 {
            until_decision = DECISION_INTERVAL;
            let key = KEYS[rng.gen_range(0..KEYS.len())];
            let event = if keyboard.is_key_held(key) && rng.gen_bool(0.6) {
                keyboard.key_released(key)
            } else {
                keyboard.key_pressed(key)
            };
            if let Some(event) = event {
                level.handle_input(event)?;
            }
        }

        level.update(FRAME_TIME)?;

        until_report -= FRAME_TIME;
        if until_report <= 0.0 {
            until_report = 5.0;
            report(&level);
        }
    }

    report(&level);
    println!("{:?} after {:.1}s", level.outcome(), level.elapsed());
    Ok(())
}

fn report(level: &Level) {
    let good = level
        .task_bots()
        .iter()
        .filter(|&&bot| level.is_good(bot) == Some(true))
        .count();
    log::info!(
        "t={:>5.1}s  good {}/{}  player charge {:>3.0}%{}",
        level.elapsed(),
        good,
        level.task_bots().len(),
        level.charge_percentage(level.player()).unwrap_or(0.0) * 100.0,
        if level.is_player_powered_down() { " (powered down)" } else { "" },
    );
}
