// PlayerBot states and control input

use bevy_ecs::prelude::*;
use log::{debug, trace};

use crate::engine::input::ControlInput;
use crate::game::components::*;
use crate::game::error::{SimResult, WorldExt};
use crate::game::level::Scene;
use crate::game::snapshot::FrameContext;
use crate::game::states::{PlayerBotState, PlayerBotStateKind};

/// Request a player state change. Returns whether it happened.
pub fn enter_state(scene: &mut Scene, entity: Entity, next: PlayerBotStateKind) -> SimResult<bool> {
    let world = &mut scene.world;
    let current = {
        let mut intelligence = world.require_mut::<PlayerBotIntelligence>(entity)?;
        let current = intelligence.machine.kind();
        if intelligence.machine.enter(next).is_none() {
            trace!("player {entity}: refused {current:?} -> {next:?}");
            return Ok(false);
        }
        current
    };
    debug!("player {entity}: {current:?} -> {next:?}");

    // exit hooks
    match current {
        PlayerBotStateKind::Appear => set_input_enabled(world, entity, true)?,
        PlayerBotStateKind::PlayerControlled => set_input_enabled(world, entity, false)?,
        PlayerBotStateKind::Recharging => {
            world.require_mut::<PlayerBot>(entity)?.is_powered_down = false;
            set_input_enabled(world, entity, true)?;
        }
        PlayerBotStateKind::Hit => {}
    }

    // entry hooks
    match next {
        PlayerBotStateKind::Appear => set_input_enabled(world, entity, false)?,
        PlayerBotStateKind::PlayerControlled => {
            set_input_enabled(world, entity, true)?;
            world.require_mut::<Animation>(entity)?.requested = Some(AnimationState::Idle);
        }
        PlayerBotStateKind::Hit => {
            set_input_enabled(world, entity, false)?;
            world.require_mut::<Animation>(entity)?.requested = Some(AnimationState::Hit);
        }
        PlayerBotStateKind::Recharging => {
            set_input_enabled(world, entity, false)?;
            world.require_mut::<Animation>(entity)?.requested = Some(AnimationState::Inactive);
        }
    }
    Ok(true)
}

/// Advance the player's state by one frame.
pub fn intelligence_system(scene: &mut Scene, frame: &mut FrameContext) -> SimResult<()> {
    let players: Vec<Entity> = scene
        .world
        .query_filtered::<Entity, With<PlayerBotIntelligence>>()
        .iter(&scene.world)
        .collect();
    for entity in players {
        update_state(scene, frame.delta_time(), entity)?;
    }
    Ok(())
}

fn update_state(scene: &mut Scene, delta_time: f32, entity: Entity) -> SimResult<()> {
    let player = scene.config.player_bot;
    let state = *scene.world.require::<PlayerBotIntelligence>(entity)?.machine.current();

    match state {
        PlayerBotState::Appear { elapsed } => {
            let elapsed = elapsed + delta_time;
            set_state(&mut scene.world, entity, PlayerBotState::Appear { elapsed })?;
            if elapsed >= player.appear_duration {
                enter_state(scene, entity, PlayerBotStateKind::PlayerControlled)?;
            }
        }
        PlayerBotState::PlayerControlled => {
            scene.world.require_mut::<Animation>(entity)?.requested = Some(AnimationState::Idle);
        }
        PlayerBotState::Hit { elapsed } => {
            let elapsed = elapsed + delta_time;
            set_state(&mut scene.world, entity, PlayerBotState::Hit { elapsed })?;
            if elapsed >= player.hit_state_duration {
                let next = if scene.world.require::<PlayerBot>(entity)?.is_powered_down {
                    PlayerBotStateKind::Recharging
                } else {
                    PlayerBotStateKind::PlayerControlled
                };
                enter_state(scene, entity, next)?;
            }
        }
        PlayerBotState::Recharging { elapsed } => {
            let elapsed = elapsed + delta_time;
            set_state(&mut scene.world, entity, PlayerBotState::Recharging { elapsed })?;
            if elapsed < player.recharge_delay_when_inactive {
                return Ok(());
            }
            let full = {
                let mut charge = scene.world.require_mut::<Charge>(entity)?;
                charge.add_charge(player.recharge_amount_per_second * delta_time);
                charge.is_fully_charged()
            };
            if full {
                enter_state(scene, entity, PlayerBotStateKind::PlayerControlled)?;
            }
        }
    }
    Ok(())
}

fn set_state(world: &mut World, entity: Entity, state: PlayerBotState) -> SimResult<()> {
    *world.require_mut::<PlayerBotIntelligence>(entity)?.machine.current_mut() = state;
    Ok(())
}

// ============================================================================
// INPUT
// ============================================================================

/// Enable or disable control input, pushing the resulting state to Movement and Beam.
pub fn set_input_enabled(world: &mut World, entity: Entity, enabled: bool) -> SimResult<()> {
    let state = {
        let mut input = world.require_mut::<PlayerInput>(entity)?;
        input.is_enabled = enabled;
        input.effective_state()
    };
    apply_input_state(world, entity, state)
}

/// Record a control event. While input is enabled it takes effect immediately.
pub fn handle_control_input(world: &mut World, entity: Entity, event: ControlInput) -> SimResult<()> {
    let (enabled, state) = {
        let mut input = world.require_mut::<PlayerInput>(entity)?;
        let state = &mut input.state;
        match event {
            ControlInput::Displacement(displacement) => {
                state.translation = Some(MovementRequest::absolute(displacement));
            }
            ControlInput::AngularDisplacement(displacement) => {
                state.rotation = Some(MovementRequest::absolute(displacement));
            }
            ControlInput::RelativeDisplacement(displacement) => {
                state.translation = Some(MovementRequest::relative(displacement));
            }
            ControlInput::RelativeAngularDisplacement(displacement) => {
                state.rotation = Some(MovementRequest::relative(displacement));
            }
            ControlInput::BeginAttack { allows_strafing } => {
                state.allows_strafing = allows_strafing;
                state.beam_is_triggered = true;
            }
            ControlInput::FinishAttack => state.beam_is_triggered = false,
        }
        (input.is_enabled, input.state)
    };
    if enabled {
        apply_input_state(world, entity, state)?;
    }
    Ok(())
}

fn apply_input_state(world: &mut World, entity: Entity, state: InputState) -> SimResult<()> {
    {
        let mut movement = world.require_mut::<Movement>(entity)?;
        movement.allows_strafing = state.allows_strafing;
        movement.next_translation = state.translation;
        movement.next_rotation = state.rotation;
    }
    world.require_mut::<Beam>(entity)?.is_triggered = state.beam_is_triggered;
    Ok(())
}
