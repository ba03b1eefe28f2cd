// Direct movement for entities not steered by an agent
// (the player, and ground bots while they charge)

use bevy_ecs::prelude::*;
use glam::Vec2;

use crate::engine::{Orientation, Transform};
use crate::game::components::*;
use crate::game::error::{SimResult, WorldExt};
use crate::game::level::Scene;
use crate::game::snapshot::FrameContext;
use crate::game::states::BeamState;

pub fn movement_system(scene: &mut Scene, frame: &mut FrameContext) -> SimResult<()> {
    let movers: Vec<Entity> = scene
        .world
        .query_filtered::<Entity, With<Movement>>()
        .iter(&scene.world)
        .collect();
    for entity in movers {
        move_entity(&mut scene.world, entity, frame.delta_time())?;
    }
    Ok(())
}

fn move_entity(world: &mut World, entity: Entity, delta_time: f32) -> SimResult<()> {
    let strafe_target = strafe_vector(world, entity)?;
    let mut movement = *world.require::<Movement>(entity)?;
    let mut orientation = *world.require::<Orientation>(entity)?;
    let mut position = world.require::<Transform>(entity)?.position;
    let mut animation = None;

    if movement.allows_strafing {
        if let Some(vector) = strafe_target {
            movement.next_rotation = Some(MovementRequest::absolute(vector));
        }
    }

    match movement.next_rotation.and_then(|r| rotated_angle(&orientation, &movement, r, delta_time)) {
        Some(angle) => {
            orientation.set_z_rotation(angle);
            animation = Some(AnimationState::Idle);
        }
        None => movement.next_rotation = None,
    }

    if let Some(request) = movement.next_translation {
        match translation(&orientation, &mut movement, request, delta_time) {
            Some(step) => {
                position += step;
                if movement.next_rotation.is_none() {
                    let displacement = request.displacement;
                    orientation.set_z_rotation(displacement.y.atan2(displacement.x));
                }
                animation = Some(if step.dot(orientation.facing()) >= 0.0 {
                    AnimationState::WalkForward
                } else {
                    AnimationState::WalkBackward
                });
            }
            None => movement.next_translation = None,
        }
    }

    *world.require_mut::<Movement>(entity)? = movement;
    *world.require_mut::<Orientation>(entity)? = orientation;
    world.require_mut::<Transform>(entity)?.position = position;

    if let Some(state) = animation {
        let mut current = world.require_mut::<Animation>(entity)?;
        // never cut short an attack, hit or zap
        if AnimationState::can_be_overwritten(current.current_state())
            && AnimationState::can_be_overwritten(current.requested)
        {
            current.requested = Some(state);
        }
    }
    Ok(())
}

/// Vector from the antenna to the beam's locked target, if any.
fn strafe_vector(world: &World, entity: Entity) -> SimResult<Option<Vec2>> {
    let Some(beam) = world.get::<Beam>(entity) else {
        return Ok(None);
    };
    let BeamState::Firing { target: Some(target), .. } = *beam.machine.current() else {
        return Ok(None);
    };
    let Some(target_position) = world.get::<Transform>(target).map(|t| t.position) else {
        return Ok(None);
    };
    let antenna = world.require::<Transform>(entity)?.position + world.get::<Antenna>(entity).map_or(Vec2::ZERO, |a| a.offset);
    Ok(Some(target_position - antenna))
}

/// New heading for a rotation request, or `None` if it asks for nothing.
fn rotated_angle(orientation: &Orientation, movement: &Movement, request: MovementRequest, delta_time: f32) -> Option<f32> {
    let displacement = request.displacement;
    if displacement == Vec2::ZERO {
        return None;
    }
    if request.relative_to_orientation {
        if displacement.y == 0.0 {
            return None;
        }
        let step = movement.angular_speed * delta_time;
        Some(orientation.z_rotation() + step.copysign(displacement.y))
    } else {
        Some(displacement.y.atan2(displacement.x))
    }
}

/// World-space step for a translation request, or `None` if it asks for nothing.
/// A relative request with no rotation pending also locks the heading it implies.
fn translation(orientation: &Orientation, movement: &mut Movement, request: MovementRequest, delta_time: f32) -> Option<Vec2> {
    let mut displacement = request.displacement;
    if displacement == Vec2::ZERO {
        return None;
    }
    if request.relative_to_orientation {
        if displacement.x == 0.0 {
            return None;
        }
        let mut angle = orientation.z_rotation();
        if displacement.x < 0.0 {
            angle += std::f32::consts::PI;
        }
        let relative = displacement;
        displacement = Vec2::from_angle(angle) * relative.length();
        if movement.next_rotation.is_none() {
            movement.next_rotation = Some(MovementRequest::absolute(displacement * relative.x));
        }
    }

    let scale = displacement.length().min(1.0);
    Some(displacement.normalize_or_zero() * scale * movement.movement_speed * delta_time)
}
