// Engine module - reusable simulation building blocks
// Nothing in here knows about TaskBots, beams or level rules

pub mod components;
pub mod input;
pub mod navigation;
pub mod state_machine;
pub mod steering;
pub mod systems;

// Re-export commonly used items
pub use components::*;
