// Game components for PlayerBots and TaskBots
// Engine components (Transform, Orientation, Agent, PhysicsBody) live in crate::engine

use bevy_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::engine::state_machine::StateMachine;
use crate::engine::CompassDirection;
use crate::game::states::{BeamState, PlayerBotState, TaskBotState};

// ============================================================================
// ENTITY KINDS
// ============================================================================

/// The player-controlled bot.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PlayerBot {
    /// Set when charge runs out; cleared once fully recharged.
    pub is_powered_down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locomotion {
    Ground,
    Flying,
}

/// High-level goal of a TaskBot. Picks which behavior its agent follows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mandate {
    FollowGoodPatrolPath,
    FollowBadPatrolPath,
    HuntAgent(Entity),
    ReturnToPositionOnPath(Vec2),
}

/// A non-player bot. Good bots patrol peacefully; bad bots hunt.
#[derive(Component, Debug, Clone)]
pub struct TaskBot {
    pub locomotion: Locomotion,
    pub is_good: bool,
    pub mandate: Mandate,
    pub good_path: Vec<Vec2>,
    pub bad_path: Vec<Vec2>,
    /// Route found for the current behavior, for debug drawing.
    pub debug_path: Vec<Vec2>,
    /// Point a ground bot charges toward.
    pub target_position: Option<Vec2>,
}

impl TaskBot {
    pub fn new(locomotion: Locomotion, is_good: bool, good_path: Vec<Vec2>, bad_path: Vec<Vec2>) -> Self {
        Self {
            locomotion,
            is_good,
            mandate: if is_good { Mandate::FollowGoodPatrolPath } else { Mandate::FollowBadPatrolPath },
            good_path,
            bad_path,
            debug_path: Vec::new(),
            target_position: None,
        }
    }

    pub fn patrol_path(&self, is_good: bool) -> &[Vec2] {
        if is_good { &self.good_path } else { &self.bad_path }
    }

    /// Nearest vertex of the good or bad patrol path.
    pub fn closest_point_on_path(&self, is_good: bool, from: Vec2) -> Option<Vec2> {
        self.patrol_path(is_good).iter().copied().min_by(|a, b| {
            a.distance_squared(from)
                .partial_cmp(&b.distance_squared(from))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

/// Offset of the steering agent from the render node.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct AgentOffset(pub Vec2);

/// Where beams aim at (TaskBots) or fire from (PlayerBot), relative to the node.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Antenna {
    pub offset: Vec2,
}

// ============================================================================
// CHARGE
// ============================================================================

/// Charge in `[0, maximum]`. Only changes through the clamped mutators.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Charge {
    charge: f32,
    maximum: f32,
    /// Smoothed fraction shown by charge bars.
    displayed_percentage: f32,
}

impl Charge {
    pub fn new(charge: f32, maximum: f32) -> Self {
        let maximum = maximum.max(0.0);
        let charge = if charge.is_nan() { 0.0 } else { charge.clamp(0.0, maximum) };
        let mut state = Self { charge, maximum, displayed_percentage: 0.0 };
        state.displayed_percentage = state.percentage();
        state
    }

    pub fn charge(&self) -> f32 {
        self.charge
    }

    pub fn maximum(&self) -> f32 {
        self.maximum
    }

    pub fn percentage(&self) -> f32 {
        if self.maximum > 0.0 { self.charge / self.maximum } else { 0.0 }
    }

    pub fn displayed_percentage(&self) -> f32 {
        self.displayed_percentage
    }

    pub fn has_charge(&self) -> bool {
        self.charge > 0.0
    }

    pub fn is_fully_charged(&self) -> bool {
        self.charge >= self.maximum
    }

    pub fn lose_charge(&mut self, amount: f32) {
        self.set_charge(self.charge - amount);
    }

    pub fn add_charge(&mut self, amount: f32) {
        self.set_charge(self.charge + amount);
    }

    /// Clamped to `0..=maximum`. NaN leaves the charge as it was.
    pub fn set_charge(&mut self, charge: f32) {
        if charge.is_nan() {
            return;
        }
        self.charge = charge.clamp(0.0, self.maximum);
    }

    /// Move the displayed level toward the real one by at most `step`.
    pub fn ease_display(&mut self, step: f32) {
        let target = self.percentage();
        let delta = (target - self.displayed_percentage).clamp(-step, step);
        self.displayed_percentage += delta;
    }
}

// ============================================================================
// MOVEMENT & INPUT
// ============================================================================

/// A displacement or rotation request, optionally relative to the heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementRequest {
    pub displacement: Vec2,
    pub relative_to_orientation: bool,
}

impl MovementRequest {
    pub fn absolute(displacement: Vec2) -> Self {
        Self { displacement, relative_to_orientation: false }
    }

    pub fn relative(displacement: Vec2) -> Self {
        Self { displacement, relative_to_orientation: true }
    }
}

/// Direct (non-steering) movement, used by the player and by ground-bot charges.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Movement {
    pub next_translation: Option<MovementRequest>,
    pub next_rotation: Option<MovementRequest>,
    /// Keep facing the beam target while it is locked.
    pub allows_strafing: bool,
    pub movement_speed: f32,
    pub angular_speed: f32,
}

impl Movement {
    pub fn new(movement_speed: f32, angular_speed: f32) -> Self {
        Self {
            next_translation: None,
            next_rotation: None,
            allows_strafing: false,
            movement_speed,
            angular_speed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputState {
    pub translation: Option<MovementRequest>,
    pub rotation: Option<MovementRequest>,
    pub beam_is_triggered: bool,
    pub allows_strafing: bool,
}

/// Latest control state for the player. Applied to Movement and Beam while enabled.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct PlayerInput {
    pub state: InputState,
    pub is_enabled: bool,
}

impl Default for PlayerInput {
    fn default() -> Self {
        Self { state: InputState::default(), is_enabled: true }
    }
}

impl PlayerInput {
    /// What should reach Movement and Beam right now.
    pub fn effective_state(&self) -> InputState {
        if self.is_enabled { self.state } else { InputState::default() }
    }
}

// ============================================================================
// ANIMATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationState {
    Idle,
    WalkForward,
    WalkBackward,
    PreAttack,
    Attack,
    Zapped,
    Hit,
    Inactive,
}

impl AnimationState {
    /// Movement may replace idle and walking, never an attack or reaction.
    pub fn can_be_overwritten(state: Option<AnimationState>) -> bool {
        matches!(
            state,
            Some(AnimationState::Idle | AnimationState::WalkForward | AnimationState::WalkBackward)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurrentAnimation {
    pub state: AnimationState,
    pub direction: CompassDirection,
    pub elapsed: f32,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct Animation {
    pub requested: Option<AnimationState>,
    pub current: Option<CurrentAnimation>,
}

impl Animation {
    pub fn requesting(state: AnimationState) -> Self {
        Self { requested: Some(state), current: None }
    }

    pub fn current_state(&self) -> Option<AnimationState> {
        self.current.map(|c| c.state)
    }
}

// ============================================================================
// INTELLIGENCE
// ============================================================================

#[derive(Component, Debug, Clone)]
pub struct TaskBotIntelligence {
    pub machine: StateMachine<TaskBotState>,
}

#[derive(Component, Debug, Clone)]
pub struct PlayerBotIntelligence {
    pub machine: StateMachine<PlayerBotState>,
}

/// Cadence of fuzzy-rule evaluation for a TaskBot.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Rules {
    pub since_last_evaluation: f32,
}

// ============================================================================
// WEAPONS & EFFECTS
// ============================================================================

#[derive(Component, Debug, Clone)]
pub struct Beam {
    pub is_triggered: bool,
    pub machine: StateMachine<BeamState>,
}

/// Visible beam, attached while firing.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct BeamEmitter {
    pub source: Vec2,
    pub target: Option<Vec2>,
}

/// Blast particles, attached while a flying bot is blasting.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct BlastEmitter {
    pub is_good: bool,
    pub position: Vec2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_clamps_on_overshoot() {
        let mut charge = Charge::new(10.0, 100.0);
        charge.lose_charge(50.0);
        assert_eq!(charge.charge(), 0.0);
        assert!(!charge.has_charge());

        charge.add_charge(500.0);
        assert_eq!(charge.charge(), 100.0);
        assert!(charge.is_fully_charged());
    }

    #[test]
    fn test_charge_ignores_nan() {
        let mut charge = Charge::new(40.0, 100.0);
        charge.set_charge(f32::NAN);
        charge.lose_charge(f32::NAN);
        charge.add_charge(f32::NAN);
        assert_eq!(charge.charge(), 40.0);
        assert_eq!(charge.percentage(), 0.4);

        let fresh = Charge::new(f32::NAN, 100.0);
        assert_eq!(fresh.charge(), 0.0);
        assert!(!fresh.displayed_percentage().is_nan());
    }

    #[test]
    fn test_charge_stays_in_range_for_random_deltas() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x7a5c);
        let mut charge = Charge::new(50.0, 100.0);
        for _ in 0..1_000 {
            let amount: f32 = rng.gen_range(-250.0..250.0);
            if rng.gen_bool(0.5) {
                charge.lose_charge(amount);
            } else {
                charge.add_charge(amount);
            }
            assert!((0.0..=100.0).contains(&charge.charge()));
        }
    }

    #[test]
    fn test_displayed_percentage_eases_toward_charge() {
        let mut charge = Charge::new(100.0, 100.0);
        charge.lose_charge(50.0);
        charge.ease_display(0.2);
        assert!((charge.displayed_percentage() - 0.8).abs() < 1e-6);
        charge.ease_display(1.0);
        assert!((charge.displayed_percentage() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_closest_point_on_path() {
        let bot = TaskBot::new(
            Locomotion::Ground,
            false,
            vec![Vec2::new(0.0, 0.0)],
            vec![Vec2::new(100.0, 0.0), Vec2::new(20.0, 10.0)],
        );
        assert_eq!(bot.closest_point_on_path(false, Vec2::ZERO), Some(Vec2::new(20.0, 10.0)));
        assert_eq!(bot.closest_point_on_path(true, Vec2::ZERO), Some(Vec2::ZERO));
    }

    #[test]
    fn test_disabled_input_reports_no_input() {
        let mut input = PlayerInput::default();
        input.state.beam_is_triggered = true;
        assert!(input.effective_state().beam_is_triggered);
        input.is_enabled = false;
        assert_eq!(input.effective_state(), InputState::default());
    }

    #[test]
    fn test_only_locomotion_animations_can_be_overwritten() {
        assert!(AnimationState::can_be_overwritten(Some(AnimationState::WalkBackward)));
        assert!(!AnimationState::can_be_overwritten(Some(AnimationState::Attack)));
        assert!(!AnimationState::can_be_overwritten(None));
    }
}
