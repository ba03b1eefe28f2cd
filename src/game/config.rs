// Gameplay tuning and level descriptions
// Both load from RON; every field falls back to the shipped tuning when omitted

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fs;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::engine::CompassDirection;
use crate::game::components::Locomotion;
use crate::game::error::ConfigError;

// ============================================================================
// GAMEPLAY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamConfig {
    /// Furthest a target may be from the antenna.
    pub arc_length: f32,
    /// Largest distance-scaled angle off the facing vector.
    pub max_arc_angle: f32,
    pub maximum_fire_duration: f32,
    pub charge_loss_per_second: f32,
    pub cool_down_duration: f32,
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self {
            arc_length: 300.0,
            max_arc_angle: 0.35,
            maximum_fire_duration: 2.0,
            charge_loss_per_second: 90.0,
            cool_down_duration: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerBotConfig {
    pub movement_speed: f32,
    pub angular_speed: f32,
    pub physics_body_radius: f32,
    pub physics_body_offset: Vec2,
    pub agent_offset: Vec2,
    pub antenna_offset: Vec2,
    pub initial_charge: f32,
    pub maximum_charge: f32,
    pub hit_state_duration: f32,
    pub recharge_delay_when_inactive: f32,
    pub recharge_amount_per_second: f32,
    pub appear_duration: f32,
}

impl Default for PlayerBotConfig {
    fn default() -> Self {
        Self {
            movement_speed: 210.0,
            angular_speed: PI * 1.4,
            physics_body_radius: 30.0,
            physics_body_offset: Vec2::new(0.0, -25.0),
            agent_offset: Vec2::new(0.0, -25.0),
            antenna_offset: Vec2::new(0.0, 50.0),
            initial_charge: 100.0,
            maximum_charge: 100.0,
            hit_state_duration: 0.75,
            recharge_delay_when_inactive: 2.0,
            recharge_amount_per_second: 10.0,
            appear_duration: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskBotConfig {
    pub rules_update_wait_duration: f32,
    pub behavior_update_wait_duration: f32,
    /// How close a returning bot must get before it resumes patrolling.
    pub threshold_proximity_to_patrol_path_start_point: f32,
    pub maximum_speed_when_good: f32,
    pub maximum_speed_when_bad: f32,
    pub maximum_acceleration: f32,
    pub agent_mass: f32,
    pub physics_body_radius: f32,
    pub physics_body_offset: Vec2,
    pub agent_offset: Vec2,
    pub max_prediction_time_when_following_path: f32,
    pub max_prediction_time_for_obstacle_avoidance: f32,
    pub patrol_path_radius: f32,
    pub hunt_path_radius: f32,
    pub return_to_patrol_path_radius: f32,
    pub pathfinding_graph_buffer_radius: f32,
    pub pre_attack_state_duration: f32,
    pub zapped_state_duration: f32,
}

impl TaskBotConfig {
    pub fn maximum_speed(&self, is_good: bool) -> f32 {
        if is_good { self.maximum_speed_when_good } else { self.maximum_speed_when_bad }
    }
}

impl Default for TaskBotConfig {
    fn default() -> Self {
        Self {
            rules_update_wait_duration: 1.0,
            behavior_update_wait_duration: 0.25,
            threshold_proximity_to_patrol_path_start_point: 50.0,
            maximum_speed_when_good: 250.0,
            maximum_speed_when_bad: 120.0,
            maximum_acceleration: 300.0,
            agent_mass: 0.25,
            physics_body_radius: 35.0,
            physics_body_offset: Vec2::new(0.0, -25.0),
            agent_offset: Vec2::new(0.0, -25.0),
            max_prediction_time_when_following_path: 1.0,
            max_prediction_time_for_obstacle_avoidance: 1.0,
            patrol_path_radius: 10.0,
            hunt_path_radius: 20.0,
            return_to_patrol_path_radius: 20.0,
            pathfinding_graph_buffer_radius: 30.0,
            pre_attack_state_duration: 0.8,
            zapped_state_duration: 0.75,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlyingBotConfig {
    pub maximum_charge: f32,
    pub blast_radius: f32,
    pub blast_charge_loss_per_second: f32,
    pub blast_duration: f32,
    /// Portion of the blast during which it affects anything.
    pub blast_effect_duration: f32,
    pub blast_emitter_offset: Vec2,
    pub beam_target_offset: Vec2,
}

impl Default for FlyingBotConfig {
    fn default() -> Self {
        Self {
            maximum_charge: 100.0,
            blast_radius: 100.0,
            blast_charge_loss_per_second: 25.0,
            blast_duration: 1.25,
            blast_effect_duration: 0.75,
            blast_emitter_offset: Vec2::new(0.0, 20.0),
            beam_target_offset: Vec2::new(0.0, 65.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundBotConfig {
    pub maximum_charge: f32,
    pub charge_loss_per_contact: f32,
    pub maximum_attack_distance: f32,
    pub attack_end_proximity: f32,
    pub pre_attack_rotation_speed: f32,
    pub movement_speed_multiplier_when_attacking: f32,
    pub angular_speed_multiplier_when_attacking: f32,
    pub delay_between_attacks: f32,
    pub beam_target_offset: Vec2,
}

impl Default for GroundBotConfig {
    fn default() -> Self {
        Self {
            maximum_charge: 100.0,
            charge_loss_per_contact: 25.0,
            maximum_attack_distance: 300.0,
            attack_end_proximity: 7.0,
            pre_attack_rotation_speed: FRAC_PI_4,
            movement_speed_multiplier_when_attacking: 2.5,
            angular_speed_multiplier_when_attacking: 2.5,
            delay_between_attacks: 2.0,
            beam_target_offset: Vec2::new(0.0, 40.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockingConfig {
    pub separation_radius: f32,
    pub separation_angle: f32,
    pub separation_weight: f32,
    pub alignment_radius: f32,
    pub alignment_angle: f32,
    pub alignment_weight: f32,
    pub cohesion_radius: f32,
    pub cohesion_angle: f32,
    pub cohesion_weight: f32,
    pub agent_search_distance_for_flocking: f32,
}

impl Default for FlockingConfig {
    fn default() -> Self {
        Self {
            separation_radius: 25.3,
            separation_angle: 3.0 * FRAC_PI_4,
            separation_weight: 2.0,
            alignment_radius: 43.333,
            alignment_angle: FRAC_PI_4,
            alignment_weight: 1.667,
            cohesion_radius: 50.0,
            cohesion_angle: FRAC_PI_2,
            cohesion_weight: 1.667,
            agent_search_distance_for_flocking: 50.0,
        }
    }
}

/// Weights of the non-flocking goals in every TaskBot behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringWeights {
    pub target_speed: f32,
    pub avoid_obstacles: f32,
    pub follow_path: f32,
    pub stay_on_path: f32,
    /// Direct seek used when no path could be found.
    pub seek_fallback: f32,
}

impl Default for SteeringWeights {
    fn default() -> Self {
        Self {
            target_speed: 0.5,
            avoid_obstacles: 1.0,
            follow_path: 1.0,
            stay_on_path: 1.0,
            seek_fallback: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Frames longer than this are clamped.
    pub maximum_update_delta_time: f32,
    pub path_containment_slack: f32,
    /// Time for the displayed charge bar to catch up with the real charge.
    pub charge_bar_update_duration: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            maximum_update_delta_time: 1.0 / 60.0,
            path_containment_slack: 5.0,
            charge_bar_update_duration: 0.1,
        }
    }
}

/// Every gameplay tuning value, grouped by the entity it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplayConfig {
    pub beam: BeamConfig,
    pub player_bot: PlayerBotConfig,
    pub task_bot: TaskBotConfig,
    pub flying_bot: FlyingBotConfig,
    pub ground_bot: GroundBotConfig,
    pub flocking: FlockingConfig,
    pub steering: SteeringWeights,
    pub simulation: SimulationConfig,
}

impl GameplayConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_ron_str(&read(path.as_ref())?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.maximum_update_delta_time <= 0.0 {
            return Err(ConfigError::Invalid(
                "simulation.maximum_update_delta_time must be positive".into(),
            ));
        }
        if self.beam.arc_length <= 0.0 {
            return Err(ConfigError::Invalid("beam.arc_length must be positive".into()));
        }
        if self.task_bot.agent_mass <= 0.0 {
            return Err(ConfigError::Invalid("task_bot.agent_mass must be positive".into()));
        }
        Ok(())
    }

    pub fn maximum_charge(&self, locomotion: Locomotion) -> f32 {
        match locomotion {
            Locomotion::Ground => self.ground_bot.maximum_charge,
            Locomotion::Flying => self.flying_bot.maximum_charge,
        }
    }

    pub fn beam_target_offset(&self, locomotion: Locomotion) -> Vec2 {
        match locomotion {
            Locomotion::Ground => self.ground_bot.beam_target_offset,
            Locomotion::Flying => self.flying_bot.beam_target_offset,
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// LEVEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStart {
    pub position: Vec2,
    #[serde(default)]
    pub orientation: CompassDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskBotSpawn {
    pub locomotion: Locomotion,
    pub is_good: bool,
    pub good_path: Vec<Vec2>,
    pub bad_path: Vec<Vec2>,
    #[serde(default)]
    pub orientation: CompassDirection,
}

impl TaskBotSpawn {
    /// Bots start on the first point of the path matching their alignment.
    pub fn start_position(&self) -> Vec2 {
        let path = if self.is_good { &self.good_path } else { &self.bad_path };
        path.first().copied().unwrap_or(Vec2::ZERO)
    }
}

/// Static description of one level, already parsed into points and polygons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Distance scale for the near/medium/far fuzzy rules.
    pub proximity_factor: f32,
    /// Seconds before the level is lost.
    pub time_limit: f32,
    pub player: PlayerStart,
    #[serde(default)]
    pub obstacles: Vec<Vec<Vec2>>,
    #[serde(default)]
    pub task_bots: Vec<TaskBotSpawn>,
}

impl LevelConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_ron_str(&read(path.as_ref())?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proximity_factor <= 0.0 {
            return Err(ConfigError::Invalid("proximity_factor must be positive".into()));
        }
        if let Some(index) = self.obstacles.iter().position(|o| o.len() < 3) {
            return Err(ConfigError::Invalid(format!(
                "obstacle {index} needs at least three vertices"
            )));
        }
        for (index, bot) in self.task_bots.iter().enumerate() {
            if bot.good_path.is_empty() || bot.bad_path.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "task bot {index} needs at least one point on both patrol paths"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_shipped_tuning() {
        let config = GameplayConfig::default();
        assert_eq!(config.beam.arc_length, 300.0);
        assert_eq!(config.task_bot.maximum_speed(true), 250.0);
        assert_eq!(config.task_bot.maximum_speed(false), 120.0);
        assert_eq!(config.beam_target_offset(Locomotion::Flying), Vec2::new(0.0, 65.0));
        assert_eq!(config.simulation.maximum_update_delta_time, 1.0 / 60.0);
    }

    #[test]
    fn test_partial_ron_keeps_other_defaults() {
        let config = GameplayConfig::from_ron_str(
            "(beam: (arc_length: 250.0), ground_bot: (delay_between_attacks: 3.0))",
        )
        .unwrap();
        assert_eq!(config.beam.arc_length, 250.0);
        assert_eq!(config.beam.max_arc_angle, 0.35);
        assert_eq!(config.ground_bot.delay_between_attacks, 3.0);
        assert_eq!(config.player_bot, PlayerBotConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = GameplayConfig::from_ron_str("(beam: (arc_length: 0.0))").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(matches!(GameplayConfig::from_ron_str("(beam: 3"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_level_parses_from_ron() {
        let level = LevelConfig::from_ron_str(
            r#"(
                proximity_factor: 900.0,
                time_limit: 120.0,
                player: (position: (0.0, 0.0), orientation: North),
                obstacles: [[(100.0, 100.0), (200.0, 100.0), (200.0, 200.0)]],
                task_bots: [(
                    locomotion: Ground,
                    is_good: false,
                    good_path: [(10.0, 0.0)],
                    bad_path: [(300.0, 0.0), (400.0, 0.0)],
                )],
            )"#,
        )
        .unwrap();
        assert_eq!(level.player.orientation, CompassDirection::North);
        assert_eq!(level.task_bots[0].start_position(), Vec2::new(300.0, 0.0));
        assert_eq!(level.task_bots[0].orientation, CompassDirection::East);
    }

    #[test]
    fn test_level_rejects_degenerate_obstacle() {
        let err = LevelConfig::from_ron_str(
            "(proximity_factor: 900.0, time_limit: 60.0, player: (position: (0.0, 0.0)), obstacles: [[(0.0, 0.0), (1.0, 1.0)]])",
        )
        .unwrap_err();
        assert!(err.to_string().contains("obstacle 0"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = LevelConfig::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("not/here.ron"));
    }
}
