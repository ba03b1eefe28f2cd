use env_logger::{Builder, Env};
use log::LevelFilter;

/// Install the global logger. `RUST_LOG` still wins when set.
///
/// Verbose runs show per-bot state transitions at debug level.
pub fn init(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let env = Env::default().default_filter_or(level.to_string());
    // a second init from tests is harmless
    let _ = Builder::from_env(env).try_init();
}
