// TaskBot state driver: entry/exit hooks, per-tick updates and alignment
//
// `enter_state` is the only way a TaskBot changes state. It checks the
// transition table, runs the old state's exit hook, swaps the state and runs
// the new state's entry hook.

use bevy_ecs::prelude::*;
use glam::Vec2;
use log::{debug, trace};

use crate::engine::steering::{Agent, Behavior};
use crate::engine::{Orientation, Transform};
use crate::game::behavior::apply_mandate_behavior;
use crate::game::charge::apply_charge_loss;
use crate::game::components::*;
use crate::game::error::{SimResult, WorldExt};
use crate::game::level::Scene;
use crate::game::snapshot::FrameContext;
use crate::game::states::{TaskBotState, TaskBotStateKind};

/// Request a state change. Returns whether it happened.
pub fn enter_state(
    scene: &mut Scene,
    frame: &mut FrameContext,
    entity: Entity,
    next: TaskBotStateKind,
) -> SimResult<bool> {
    let locomotion = scene.world.require::<TaskBot>(entity)?.locomotion;
    let machine = &scene.world.require::<TaskBotIntelligence>(entity)?.machine;
    let current = machine.kind();
    if !next.is_declared_for(locomotion) || !machine.can_enter(next) {
        trace!("task bot {entity}: refused {current:?} -> {next:?}");
        return Ok(false);
    }

    will_exit(scene, entity, current)?;
    scene.world.require_mut::<TaskBotIntelligence>(entity)?.machine.enter(next);
    debug!("task bot {entity}: {current:?} -> {next:?}");
    did_enter(scene, frame, entity, next)?;
    Ok(true)
}

/// Run the entry hook of the state a freshly spawned bot starts in.
pub fn start(scene: &mut Scene, frame: &mut FrameContext, entity: Entity) -> SimResult<()> {
    let kind = scene.world.require::<TaskBotIntelligence>(entity)?.machine.kind();
    did_enter(scene, frame, entity, kind)
}

fn will_exit(scene: &mut Scene, entity: Entity, leaving: TaskBotStateKind) -> SimResult<()> {
    let world = &mut scene.world;
    match leaving {
        TaskBotStateKind::AgentControlled => {
            world.require_mut::<Agent>(entity)?.behavior = Behavior::new();
        }
        TaskBotStateKind::GroundAttack => {
            let ground = &scene.config.ground_bot;
            let mut movement = world.require_mut::<Movement>(entity)?;
            movement.next_translation = None;
            movement.next_rotation = None;
            movement.movement_speed /= ground.movement_speed_multiplier_when_attacking;
            movement.angular_speed /= ground.angular_speed_multiplier_when_attacking;
        }
        TaskBotStateKind::FlyingBlast => {
            world.entity_mut(entity).remove::<BlastEmitter>();
        }
        _ => {}
    }
    Ok(())
}

fn did_enter(scene: &mut Scene, frame: &mut FrameContext, entity: Entity, entered: TaskBotStateKind) -> SimResult<()> {
    match entered {
        TaskBotStateKind::AgentControlled => {
            let Scene { world, graph, config, .. } = scene;
            apply_mandate_behavior(world, graph, config, frame, entity)?;
            // bots that kept some charge recover fully
            if let Some(mut charge) = world.get_mut::<Charge>(entity) {
                if charge.has_charge() {
                    let maximum = charge.maximum();
                    charge.set_charge(maximum);
                }
            }
        }
        TaskBotStateKind::RotateToAttack => request_animation(&mut scene.world, entity, AnimationState::WalkForward)?,
        TaskBotStateKind::GroundPreAttack | TaskBotStateKind::FlyingPreAttack => {
            request_animation(&mut scene.world, entity, AnimationState::PreAttack)?
        }
        TaskBotStateKind::GroundAttack => {
            request_animation(&mut scene.world, entity, AnimationState::Attack)?;
            for other in scene.contacts.touching(entity) {
                apply_attack_damage(scene, frame, other)?;
            }

            let position = scene.world.require::<Agent>(entity)?.position;
            let target = scene.world.require::<TaskBot>(entity)?.target_position.unwrap_or(position);
            let ground = scene.config.ground_bot;
            {
                let mut movement = scene.world.require_mut::<Movement>(entity)?;
                movement.movement_speed *= ground.movement_speed_multiplier_when_attacking;
                movement.angular_speed *= ground.angular_speed_multiplier_when_attacking;
                movement.next_translation = Some(MovementRequest::absolute(target - position));
                movement.next_rotation = None;
            }
            if let TaskBotState::GroundAttack { last_distance } =
                scene.world.require_mut::<TaskBotIntelligence>(entity)?.machine.current_mut()
            {
                *last_distance = position.distance(target);
            }
        }
        TaskBotStateKind::FlyingBlast => {
            request_animation(&mut scene.world, entity, AnimationState::Attack)?;
            let is_good = scene.world.require::<TaskBot>(entity)?.is_good;
            let position = scene.world.require::<Transform>(entity)?.position + scene.config.flying_bot.blast_emitter_offset;
            scene.world.entity_mut(entity).insert(BlastEmitter { is_good, position });
        }
        TaskBotStateKind::Zapped => request_animation(&mut scene.world, entity, AnimationState::Zapped)?,
    }
    Ok(())
}

fn request_animation(world: &mut World, entity: Entity, state: AnimationState) -> SimResult<()> {
    world.require_mut::<Animation>(entity)?.requested = Some(state);
    Ok(())
}

// ============================================================================
// UPDATE
// ============================================================================

/// Advance the current state of every TaskBot by one frame.
pub fn intelligence_system(scene: &mut Scene, frame: &mut FrameContext) -> SimResult<()> {
    let bots: Vec<Entity> = scene
        .world
        .query_filtered::<Entity, (With<TaskBot>, With<TaskBotIntelligence>)>()
        .iter(&scene.world)
        .collect();
    for entity in bots {
        update_state(scene, frame, entity)?;
    }
    Ok(())
}

fn update_state(scene: &mut Scene, frame: &mut FrameContext, entity: Entity) -> SimResult<()> {
    let delta_time = frame.delta_time();
    let task_bot = scene.config.task_bot;
    let state = *scene.world.require::<TaskBotIntelligence>(entity)?.machine.current();

    match state {
        TaskBotState::AgentControlled { elapsed, since_behavior_update } => {
            let since = since_behavior_update + delta_time;
            let refresh = since >= task_bot.behavior_update_wait_duration;
            set_state(
                &mut scene.world,
                entity,
                TaskBotState::AgentControlled {
                    elapsed: elapsed + delta_time,
                    since_behavior_update: if refresh { 0.0 } else { since },
                },
            )?;
            if refresh {
                resume_patrol_if_arrived(&mut scene.world, entity, task_bot.threshold_proximity_to_patrol_path_start_point)?;
                let Scene { world, graph, config, .. } = scene;
                apply_mandate_behavior(world, graph, config, frame, entity)?;
            }
        }
        TaskBotState::RotateToAttack => {
            let position = scene.world.require::<Agent>(entity)?.position;
            let Some(target) = scene.world.require::<TaskBot>(entity)?.target_position else {
                enter_state(scene, frame, entity, TaskBotStateKind::AgentControlled)?;
                return Ok(());
            };
            let step = scene.config.ground_bot.pre_attack_rotation_speed * delta_time;
            let facing_target = {
                let mut orientation = scene.world.require_mut::<Orientation>(entity)?;
                let delta = shortest_angle_to(orientation.facing(), target - position);
                let turn = if step >= delta.abs() { delta } else { step.copysign(delta) };
                let rotation = orientation.z_rotation() + turn;
                orientation.set_z_rotation(rotation);
                turn == delta
            };
            if facing_target {
                enter_state(scene, frame, entity, TaskBotStateKind::GroundPreAttack)?;
            } else {
                request_animation(&mut scene.world, entity, AnimationState::WalkForward)?;
            }
        }
        TaskBotState::GroundPreAttack { elapsed } | TaskBotState::FlyingPreAttack { elapsed } => {
            let elapsed = elapsed + delta_time;
            if elapsed >= task_bot.pre_attack_state_duration {
                let next = match state {
                    TaskBotState::GroundPreAttack { .. } => TaskBotStateKind::GroundAttack,
                    _ => TaskBotStateKind::FlyingBlast,
                };
                enter_state(scene, frame, entity, next)?;
            } else {
                let waiting = match state {
                    TaskBotState::GroundPreAttack { .. } => TaskBotState::GroundPreAttack { elapsed },
                    _ => TaskBotState::FlyingPreAttack { elapsed },
                };
                set_state(&mut scene.world, entity, waiting)?;
            }
        }
        TaskBotState::GroundAttack { last_distance } => {
            let position = scene.world.require::<Agent>(entity)?.position;
            let target = scene.world.require::<TaskBot>(entity)?.target_position.unwrap_or(position);
            let distance = position.distance(target);
            // overshooting or being knocked away also ends the charge
            if distance < scene.config.ground_bot.attack_end_proximity || distance > last_distance {
                enter_state(scene, frame, entity, TaskBotStateKind::AgentControlled)?;
            } else {
                set_state(&mut scene.world, entity, TaskBotState::GroundAttack { last_distance: distance })?;
            }
        }
        TaskBotState::FlyingBlast { elapsed } => {
            let elapsed = elapsed + delta_time;
            set_state(&mut scene.world, entity, TaskBotState::FlyingBlast { elapsed })?;
            if elapsed < scene.config.flying_bot.blast_effect_duration {
                apply_blast(scene, frame, entity)?;
            }
            if elapsed >= scene.config.flying_bot.blast_duration {
                enter_state(scene, frame, entity, TaskBotStateKind::AgentControlled)?;
            }
        }
        TaskBotState::Zapped { elapsed } => {
            let elapsed = elapsed + delta_time;
            set_state(&mut scene.world, entity, TaskBotState::Zapped { elapsed })?;
            if elapsed >= task_bot.zapped_state_duration || scene.world.require::<TaskBot>(entity)?.is_good {
                enter_state(scene, frame, entity, TaskBotStateKind::AgentControlled)?;
            }
        }
    }
    Ok(())
}

fn set_state(world: &mut World, entity: Entity, state: TaskBotState) -> SimResult<()> {
    *world.require_mut::<TaskBotIntelligence>(entity)?.machine.current_mut() = state;
    Ok(())
}

/// Signed angle from `heading` to `target`, counter-clockwise positive.
pub fn shortest_angle_to(heading: Vec2, target: Vec2) -> f32 {
    heading.perp_dot(target).atan2(heading.dot(target))
}

fn resume_patrol_if_arrived(world: &mut World, entity: Entity, threshold: f32) -> SimResult<()> {
    let position = world.require::<Agent>(entity)?.position;
    let mut bot = world.require_mut::<TaskBot>(entity)?;
    if let Mandate::ReturnToPositionOnPath(point) = bot.mandate {
        if position.distance(point) <= threshold {
            bot.mandate = if bot.is_good { Mandate::FollowGoodPatrolPath } else { Mandate::FollowBadPatrolPath };
            debug!("task bot {entity}: back on patrol");
        }
    }
    Ok(())
}

// ============================================================================
// ALIGNMENT & ATTACKS
// ============================================================================

/// Flip a bot between good and bad, with the speed, mandate, charge and
/// state changes that go with it. Setting the current value does nothing.
pub fn set_good(scene: &mut Scene, frame: &mut FrameContext, entity: Entity, is_good: bool) -> SimResult<()> {
    let position = scene.world.require::<Agent>(entity)?.position;
    let maximum_speed = scene.config.task_bot.maximum_speed(is_good);
    let locomotion = {
        let mut bot = scene.world.require_mut::<TaskBot>(entity)?;
        if bot.is_good == is_good {
            return Ok(());
        }
        bot.is_good = is_good;
        bot.mandate = match bot.closest_point_on_path(is_good, position) {
            Some(point) => Mandate::ReturnToPositionOnPath(point),
            None if is_good => Mandate::FollowGoodPatrolPath,
            None => Mandate::FollowBadPatrolPath,
        };
        bot.locomotion
    };
    debug!("task bot {entity}: now {}", if is_good { "good" } else { "bad" });
    scene.world.require_mut::<Agent>(entity)?.max_speed = maximum_speed;

    if is_good {
        if let Some(mut charge) = scene.world.get_mut::<Charge>(entity) {
            charge.set_charge(0.0);
        }
        let next = match locomotion {
            Locomotion::Flying => TaskBotStateKind::FlyingBlast,
            Locomotion::Ground => TaskBotStateKind::AgentControlled,
        };
        enter_state(scene, frame, entity, next)?;
    } else {
        if let Some(mut charge) = scene.world.get_mut::<Charge>(entity) {
            let maximum = charge.maximum();
            charge.set_charge(maximum);
        }
        enter_state(scene, frame, entity, TaskBotStateKind::Zapped)?;
    }
    Ok(())
}

/// A ground bot's charge hitting something: drains an active player, corrupts a good bot.
fn apply_attack_damage(scene: &mut Scene, frame: &mut FrameContext, victim: Entity) -> SimResult<()> {
    if let Some(player) = scene.world.get::<PlayerBot>(victim) {
        if !player.is_powered_down && scene.world.get::<Charge>(victim).is_some() {
            let amount = scene.config.ground_bot.charge_loss_per_contact;
            apply_charge_loss(scene, frame, victim, amount)?;
        }
    } else if scene.world.get::<TaskBot>(victim).is_some_and(|bot| bot.is_good) {
        set_good(scene, frame, victim, false)?;
    }
    Ok(())
}

/// React to `entity` starting to touch `other`.
pub fn contact_began(scene: &mut Scene, frame: &mut FrameContext, entity: Entity, other: Entity) -> SimResult<()> {
    let Some(bot) = scene.world.get::<TaskBot>(entity) else {
        return Ok(());
    };
    let (locomotion, is_good) = (bot.locomotion, bot.is_good);
    let state = scene.world.require::<TaskBotIntelligence>(entity)?.machine.kind();

    match locomotion {
        Locomotion::Ground if state == TaskBotStateKind::GroundAttack => apply_attack_damage(scene, frame, other),
        Locomotion::Flying if !is_good => {
            let is_prey = match scene.world.get::<PlayerBot>(other) {
                Some(player) => !player.is_powered_down,
                None => scene.world.get::<TaskBot>(other).is_some_and(|bot| bot.is_good),
            };
            if is_prey {
                enter_state(scene, frame, entity, TaskBotStateKind::FlyingPreAttack)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// One tick of a flying bot's blast against everything in range.
fn apply_blast(scene: &mut Scene, frame: &mut FrameContext, entity: Entity) -> SimResult<()> {
    let is_good = scene.world.require::<TaskBot>(entity)?.is_good;
    let radius = scene.config.flying_bot.blast_radius;
    let drain = scene.config.flying_bot.blast_charge_loss_per_second * frame.delta_time();
    let in_range: Vec<Entity> = match frame.entity_snapshot(&scene.world, entity) {
        Some(snapshot) => snapshot.within(radius).map(|d| d.target).collect(),
        None => return Ok(()),
    };

    for other in in_range {
        if is_good {
            let Some(bot) = scene.world.get::<TaskBot>(other) else {
                continue;
            };
            if bot.is_good {
                continue;
            }
            let attacking = scene.world.get::<TaskBotIntelligence>(other).is_some_and(|i| {
                matches!(i.machine.kind(), TaskBotStateKind::FlyingBlast | TaskBotStateKind::GroundAttack)
            });
            if !attacking {
                set_good(scene, frame, other, true)?;
            }
        } else if let Some(player) = scene.world.get::<PlayerBot>(other) {
            if !player.is_powered_down && scene.world.get::<Charge>(other).is_some() {
                apply_charge_loss(scene, frame, other, drain)?;
            }
        } else if scene.world.get::<TaskBot>(other).is_some_and(|bot| bot.is_good) {
            set_good(scene, frame, other, false)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_shortest_angle_is_signed() {
        assert_relative_eq!(shortest_angle_to(Vec2::X, Vec2::Y), FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(shortest_angle_to(Vec2::X, -Vec2::Y), -FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(shortest_angle_to(Vec2::X, -Vec2::X).abs(), PI, epsilon = 1e-6);
        assert_relative_eq!(shortest_angle_to(Vec2::Y, Vec2::new(-1.0, 1.0)), PI / 4.0, epsilon = 1e-6);
    }
}
