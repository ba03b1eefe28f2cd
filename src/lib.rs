// TaskBots simulation core
// Headless: rendering and audio belong to whatever embeds a Level

pub mod engine;
pub mod game;
pub mod logging;
