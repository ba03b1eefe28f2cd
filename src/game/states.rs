// Behavioral states for every stateful entity, with their legal exits
// Entry/exit effects and per-tick updates live with the owning entity's logic

use bevy_ecs::prelude::*;

use crate::engine::state_machine::MachineState;
use crate::game::components::Locomotion;

// ============================================================================
// TASKBOT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskBotState {
    /// Steering agent drives the bot along its mandate.
    AgentControlled { elapsed: f32, since_behavior_update: f32 },
    /// Ground bot turns on the spot to face its attack target.
    RotateToAttack,
    GroundPreAttack { elapsed: f32 },
    /// Ground bot charges; tracks distance so overshooting ends the attack.
    GroundAttack { last_distance: f32 },
    FlyingPreAttack { elapsed: f32 },
    FlyingBlast { elapsed: f32 },
    Zapped { elapsed: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskBotStateKind {
    AgentControlled,
    RotateToAttack,
    GroundPreAttack,
    GroundAttack,
    FlyingPreAttack,
    FlyingBlast,
    Zapped,
}

impl TaskBotStateKind {
    /// States present in a bot's machine, by locomotion.
    pub fn is_declared_for(self, locomotion: Locomotion) -> bool {
        use TaskBotStateKind::*;
        match self {
            AgentControlled | Zapped => true,
            RotateToAttack | GroundPreAttack | GroundAttack => locomotion == Locomotion::Ground,
            FlyingPreAttack | FlyingBlast => locomotion == Locomotion::Flying,
        }
    }
}

impl MachineState for TaskBotState {
    type Kind = TaskBotStateKind;

    fn kind(&self) -> TaskBotStateKind {
        match self {
            TaskBotState::AgentControlled { .. } => TaskBotStateKind::AgentControlled,
            TaskBotState::RotateToAttack => TaskBotStateKind::RotateToAttack,
            TaskBotState::GroundPreAttack { .. } => TaskBotStateKind::GroundPreAttack,
            TaskBotState::GroundAttack { .. } => TaskBotStateKind::GroundAttack,
            TaskBotState::FlyingPreAttack { .. } => TaskBotStateKind::FlyingPreAttack,
            TaskBotState::FlyingBlast { .. } => TaskBotStateKind::FlyingBlast,
            TaskBotState::Zapped { .. } => TaskBotStateKind::Zapped,
        }
    }

    fn fresh(kind: TaskBotStateKind) -> Self {
        match kind {
            TaskBotStateKind::AgentControlled => TaskBotState::AgentControlled {
                elapsed: 0.0,
                since_behavior_update: 0.0,
            },
            TaskBotStateKind::RotateToAttack => TaskBotState::RotateToAttack,
            TaskBotStateKind::GroundPreAttack => TaskBotState::GroundPreAttack { elapsed: 0.0 },
            TaskBotStateKind::GroundAttack => TaskBotState::GroundAttack { last_distance: f32::MAX },
            TaskBotStateKind::FlyingPreAttack => TaskBotState::FlyingPreAttack { elapsed: 0.0 },
            TaskBotStateKind::FlyingBlast => TaskBotState::FlyingBlast { elapsed: 0.0 },
            TaskBotStateKind::Zapped => TaskBotState::Zapped { elapsed: 0.0 },
        }
    }

    fn is_valid_next_state(&self, next: TaskBotStateKind) -> bool {
        use TaskBotStateKind::*;
        match self.kind() {
            AgentControlled => matches!(next, FlyingPreAttack | RotateToAttack | Zapped),
            RotateToAttack => matches!(next, AgentControlled | GroundPreAttack | Zapped),
            GroundPreAttack => matches!(next, AgentControlled | GroundAttack | Zapped),
            GroundAttack => matches!(next, AgentControlled | Zapped),
            FlyingPreAttack => matches!(next, AgentControlled | FlyingBlast | Zapped),
            FlyingBlast => matches!(next, AgentControlled | Zapped),
            Zapped => matches!(next, AgentControlled | FlyingBlast | Zapped),
        }
    }
}

// ============================================================================
// PLAYERBOT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerBotState {
    Appear { elapsed: f32 },
    PlayerControlled,
    Hit { elapsed: f32 },
    Recharging { elapsed: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerBotStateKind {
    Appear,
    PlayerControlled,
    Hit,
    Recharging,
}

impl PlayerBotStateKind {
    /// TaskBots may only hunt or be beamed at a player in these states.
    pub fn is_targetable(self) -> bool {
        matches!(self, PlayerBotStateKind::PlayerControlled | PlayerBotStateKind::Hit)
    }
}

impl MachineState for PlayerBotState {
    type Kind = PlayerBotStateKind;

    fn kind(&self) -> PlayerBotStateKind {
        match self {
            PlayerBotState::Appear { .. } => PlayerBotStateKind::Appear,
            PlayerBotState::PlayerControlled => PlayerBotStateKind::PlayerControlled,
            PlayerBotState::Hit { .. } => PlayerBotStateKind::Hit,
            PlayerBotState::Recharging { .. } => PlayerBotStateKind::Recharging,
        }
    }

    fn fresh(kind: PlayerBotStateKind) -> Self {
        match kind {
            PlayerBotStateKind::Appear => PlayerBotState::Appear { elapsed: 0.0 },
            PlayerBotStateKind::PlayerControlled => PlayerBotState::PlayerControlled,
            PlayerBotStateKind::Hit => PlayerBotState::Hit { elapsed: 0.0 },
            PlayerBotStateKind::Recharging => PlayerBotState::Recharging { elapsed: 0.0 },
        }
    }

    fn is_valid_next_state(&self, next: PlayerBotStateKind) -> bool {
        use PlayerBotStateKind::*;
        match self.kind() {
            Appear => next == PlayerControlled,
            PlayerControlled => matches!(next, Hit | Recharging),
            Hit => matches!(next, PlayerControlled | Recharging),
            Recharging => next == PlayerControlled,
        }
    }
}

// ============================================================================
// BEAM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeamState {
    Idle,
    Firing { target: Option<Entity>, elapsed: f32 },
    Cooling { elapsed: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeamStateKind {
    Idle,
    Firing,
    Cooling,
}

impl MachineState for BeamState {
    type Kind = BeamStateKind;

    fn kind(&self) -> BeamStateKind {
        match self {
            BeamState::Idle => BeamStateKind::Idle,
            BeamState::Firing { .. } => BeamStateKind::Firing,
            BeamState::Cooling { .. } => BeamStateKind::Cooling,
        }
    }

    fn fresh(kind: BeamStateKind) -> Self {
        match kind {
            BeamStateKind::Idle => BeamState::Idle,
            BeamStateKind::Firing => BeamState::Firing { target: None, elapsed: 0.0 },
            BeamStateKind::Cooling => BeamState::Cooling { elapsed: 0.0 },
        }
    }

    fn is_valid_next_state(&self, next: BeamStateKind) -> bool {
        match self.kind() {
            BeamStateKind::Idle => next == BeamStateKind::Firing,
            BeamStateKind::Firing => matches!(next, BeamStateKind::Idle | BeamStateKind::Cooling),
            BeamStateKind::Cooling => next == BeamStateKind::Idle,
        }
    }
}
