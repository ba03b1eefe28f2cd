// Game module - TaskBots, the player's beam and the level that runs them
// Systems take the whole Scene plus the per-frame context

pub mod animation;
pub mod beam;
pub mod behavior;
pub mod charge;
pub mod components;
pub mod config;
pub mod error;
pub mod level;
pub mod movement;
pub mod playerbot;
pub mod rules;
pub mod snapshot;
pub mod states;
pub mod taskbot;

pub use config::{GameplayConfig, LevelConfig};
pub use error::{ConfigError, SimError, SimResult};
pub use level::{Level, LevelOutcome, RenderState};
