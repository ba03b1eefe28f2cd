// The player's beam: target selection and the Idle/Firing/Cooling cycle

use bevy_ecs::prelude::*;
use glam::Vec2;
use log::{debug, trace};

use crate::engine::navigation::PolygonObstacle;
use crate::engine::{Orientation, Transform};
use crate::game::charge::apply_charge_loss;
use crate::game::components::{AgentOffset, Antenna, Beam, BeamEmitter, Charge, TaskBot};
use crate::game::config::BeamConfig;
use crate::game::error::{SimResult, WorldExt};
use crate::game::level::Scene;
use crate::game::snapshot::FrameContext;
use crate::game::states::{BeamState, BeamStateKind};

/// Where the beam fires from and which way it points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSource {
    pub position: Vec2,
    pub antenna: Vec2,
    pub facing: Vec2,
}

/// A bot the beam could lock onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamCandidate {
    pub entity: Entity,
    pub distance: f32,
    pub position: Vec2,
    /// Point on the bot the beam aims at.
    pub target_point: Vec2,
}

/// Angle off the facing vector, shrunk for nearby targets to ease aiming.
pub fn scaled_arc_angle(source: &BeamSource, candidate: &BeamCandidate, arc_length: f32) -> f32 {
    let to_target = candidate.target_point - source.antenna;
    let length = to_target.length();
    if length <= f32::EPSILON {
        return 0.0;
    }
    let angle = (to_target.dot(source.facing) / length).clamp(-1.0, 1.0).acos();
    angle * (candidate.distance / arc_length)
}

/// Obstacles only hide a bot when they reach lower than one of the two parties.
pub fn has_line_of_sight(source: &BeamSource, candidate: &BeamCandidate, obstacles: &[PolygonObstacle]) -> bool {
    !obstacles.iter().any(|obstacle| {
        obstacle.intersects_segment(source.antenna, candidate.target_point)
            && (obstacle.lowest_y() < candidate.position.y || obstacle.lowest_y() < source.position.y)
    })
}

/// Pick the beam's target among hostile `candidates`, nearest first.
/// The current target is kept for as long as it stays eligible.
pub fn select_beam_target(
    current: Option<Entity>,
    source: &BeamSource,
    candidates: &[BeamCandidate],
    obstacles: &[PolygonObstacle],
    config: &BeamConfig,
) -> Option<Entity> {
    let eligible: Vec<Entity> = candidates
        .iter()
        .filter(|candidate| {
            candidate.distance <= config.arc_length
                && scaled_arc_angle(source, candidate, config.arc_length) <= config.max_arc_angle
                && has_line_of_sight(source, candidate, obstacles)
        })
        .map(|candidate| candidate.entity)
        .collect();

    match current {
        Some(current) if eligible.contains(&current) => Some(current),
        _ => eligible.first().copied(),
    }
}

// ============================================================================
// SYSTEM
// ============================================================================

pub fn beam_system(scene: &mut Scene, frame: &mut FrameContext) -> SimResult<()> {
    let beams: Vec<Entity> = scene
        .world
        .query_filtered::<Entity, With<Beam>>()
        .iter(&scene.world)
        .collect();
    for entity in beams {
        update_beam(scene, frame, entity)?;
    }
    Ok(())
}

fn update_beam(scene: &mut Scene, frame: &mut FrameContext, entity: Entity) -> SimResult<()> {
    let delta_time = frame.delta_time();
    let config = scene.config.beam;
    let (state, is_triggered) = {
        let beam = scene.world.require::<Beam>(entity)?;
        (*beam.machine.current(), beam.is_triggered)
    };

    match state {
        BeamState::Idle => {
            if is_triggered {
                enter_state(scene, frame, entity, BeamStateKind::Firing)?;
            }
        }
        BeamState::Firing { target, elapsed } => {
            let elapsed = elapsed + delta_time;
            set_state(&mut scene.world, entity, BeamState::Firing { target, elapsed })?;
            if elapsed >= config.maximum_fire_duration {
                enter_state(scene, frame, entity, BeamStateKind::Cooling)?;
            } else if !is_triggered {
                enter_state(scene, frame, entity, BeamStateKind::Idle)?;
            } else {
                fire(scene, frame, entity, delta_time)?;
            }
        }
        BeamState::Cooling { elapsed } => {
            let elapsed = elapsed + delta_time;
            set_state(&mut scene.world, entity, BeamState::Cooling { elapsed })?;
            if elapsed >= config.cool_down_duration {
                enter_state(scene, frame, entity, BeamStateKind::Idle)?;
            }
        }
    }
    Ok(())
}

fn enter_state(scene: &mut Scene, frame: &mut FrameContext, entity: Entity, next: BeamStateKind) -> SimResult<bool> {
    let Some(previous) = scene.world.require_mut::<Beam>(entity)?.machine.enter(next) else {
        trace!("beam {entity}: refused -> {next:?}");
        return Ok(false);
    };
    debug!("beam {entity}: {:?} -> {next:?}", previous);

    if let BeamState::Firing { .. } = previous {
        scene.world.entity_mut(entity).remove::<BeamEmitter>();
    }
    if next == BeamStateKind::Firing {
        let source = beam_source(&scene.world, entity)?.antenna;
        scene.world.entity_mut(entity).insert(BeamEmitter { source, target: None });
        fire(scene, frame, entity, 0.0)?;
    }
    Ok(true)
}

fn set_state(world: &mut World, entity: Entity, state: BeamState) -> SimResult<()> {
    *world.require_mut::<Beam>(entity)?.machine.current_mut() = state;
    Ok(())
}

fn beam_source(world: &World, entity: Entity) -> SimResult<BeamSource> {
    let position = world.require::<Transform>(entity)?.position;
    let antenna = world.require::<Antenna>(entity)?.offset;
    let facing = world.require::<Orientation>(entity)?.facing();
    Ok(BeamSource { position, antenna: position + antenna, facing })
}

/// Bad TaskBots from the shooter's snapshot, nearest first. Positions are the
/// captured agent positions, so they agree with the snapshot distances.
fn hostile_candidates(scene: &Scene, frame: &mut FrameContext, entity: Entity) -> Vec<BeamCandidate> {
    let world = &scene.world;
    let snapshot = frame.snapshot(world);
    let Some(mine) = snapshot.entity(entity) else {
        return Vec::new();
    };
    mine.entity_distances
        .iter()
        .filter_map(|d| {
            let bot = world.get::<TaskBot>(d.target).filter(|bot| !bot.is_good)?;
            let position = snapshot.position(d.target)? - world.get::<AgentOffset>(d.target)?.0;
            Some(BeamCandidate {
                entity: d.target,
                distance: d.distance,
                position,
                target_point: position + scene.config.beam_target_offset(bot.locomotion),
            })
        })
        .collect()
}

/// One firing tick: retarget, drain, and stop once the target has been converted.
fn fire(scene: &mut Scene, frame: &mut FrameContext, entity: Entity, delta_time: f32) -> SimResult<()> {
    let BeamState::Firing { target: current, elapsed } = *scene.world.require::<Beam>(entity)?.machine.current() else {
        return Ok(());
    };
    let source = beam_source(&scene.world, entity)?;
    let candidates = hostile_candidates(scene, frame, entity);
    let target = select_beam_target(current, &source, &candidates, scene.graph.obstacles(), &scene.config.beam);
    if target != current {
        trace!("beam {entity}: target {current:?} -> {target:?}");
    }
    set_state(&mut scene.world, entity, BeamState::Firing { target, elapsed })?;

    let target_point = target.and_then(|t| candidates.iter().find(|c| c.entity == t)).map(|c| c.target_point);
    if let Some(mut emitter) = scene.world.get_mut::<BeamEmitter>(entity) {
        emitter.source = source.antenna;
        emitter.target = target_point;
    }

    let Some(target) = target else {
        return Ok(());
    };
    if scene.world.get::<Charge>(target).is_some() {
        let drain = scene.config.beam.charge_loss_per_second * delta_time;
        apply_charge_loss(scene, frame, target, drain)?;
    }
    if scene.world.require::<TaskBot>(target)?.is_good {
        scene.world.require_mut::<Beam>(entity)?.is_triggered = false;
        enter_state(scene, frame, entity, BeamStateKind::Idle)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> BeamSource {
        BeamSource { position: Vec2::ZERO, antenna: Vec2::ZERO, facing: Vec2::X }
    }

    fn candidate(raw: u32, position: Vec2) -> BeamCandidate {
        BeamCandidate {
            entity: Entity::from_raw(raw),
            distance: position.length(),
            position,
            target_point: position,
        }
    }

    fn wall(min: Vec2, max: Vec2) -> PolygonObstacle {
        PolygonObstacle::new(vec![min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)])
    }

    #[test]
    fn test_target_in_arc_is_selected() {
        let config = BeamConfig::default();
        let ahead = candidate(1, Vec2::new(50.0, 0.0));
        assert_eq!(select_beam_target(None, &source(), &[ahead], &[], &config), Some(ahead.entity));
    }

    #[test]
    fn test_target_beyond_arc_length_is_rejected() {
        let config = BeamConfig::default();
        let far = candidate(1, Vec2::new(50.0, 400.0));
        assert_eq!(select_beam_target(None, &source(), &[far], &[], &config), None);
    }

    #[test]
    fn test_arc_angle_widens_up_close() {
        let config = BeamConfig::default();
        // 45 degrees off the facing vector
        let near = candidate(1, Vec2::new(20.0, 20.0));
        let far = candidate(2, Vec2::new(150.0, 150.0));
        assert_eq!(select_beam_target(None, &source(), &[near], &[], &config), Some(near.entity));
        assert_eq!(select_beam_target(None, &source(), &[far], &[], &config), None);
    }

    #[test]
    fn test_current_target_is_kept_over_closer_bot() {
        let config = BeamConfig::default();
        let closer = candidate(1, Vec2::new(40.0, 0.0));
        let current = candidate(2, Vec2::new(120.0, 0.0));
        let picked = select_beam_target(Some(current.entity), &source(), &[closer, current], &[], &config);
        assert_eq!(picked, Some(current.entity));
    }

    #[test]
    fn test_lost_target_falls_back_to_nearest() {
        let config = BeamConfig::default();
        let closer = candidate(1, Vec2::new(40.0, 0.0));
        let gone = Entity::from_raw(9);
        assert_eq!(select_beam_target(Some(gone), &source(), &[closer], &[], &config), Some(closer.entity));
    }

    #[test]
    fn test_low_obstacle_blocks_line_of_sight() {
        let config = BeamConfig::default();
        let target = BeamCandidate { target_point: Vec2::new(200.0, 40.0), ..candidate(1, Vec2::new(200.0, 0.0)) };
        let low_wall = wall(Vec2::new(90.0, -50.0), Vec2::new(110.0, 100.0));
        assert_eq!(select_beam_target(None, &source(), &[target], &[low_wall], &config), None);
    }

    #[test]
    fn test_obstacle_behind_both_parties_does_not_block() {
        let config = BeamConfig::default();
        // the wall's lowest point sits above both the shooter and the target
        let target = BeamCandidate { target_point: Vec2::new(200.0, 40.0), ..candidate(1, Vec2::new(200.0, 0.0)) };
        let backdrop = wall(Vec2::new(90.0, 10.0), Vec2::new(110.0, 100.0));
        assert_eq!(
            select_beam_target(None, &source(), &[target], &[backdrop], &config),
            Some(target.entity)
        );
    }

    #[test]
    fn test_candidates_use_captured_positions() {
        use crate::engine::navigation::NavigationGraph;
        use crate::engine::state_machine::StateMachine;
        use crate::engine::steering::Agent;
        use crate::engine::systems::ContactSet;
        use crate::game::components::{Locomotion, PlayerBot, PlayerBotIntelligence};
        use crate::game::config::GameplayConfig;
        use crate::game::states::PlayerBotStateKind;

        let config = GameplayConfig::default();
        let mut scene = Scene {
            world: World::new(),
            graph: NavigationGraph::new(Vec::new(), 0.0),
            config,
            contacts: ContactSet::default(),
        };
        let player = scene
            .world
            .spawn((
                Agent::new(30.0, 1.0, 0.0, 0.0),
                PlayerBot::default(),
                PlayerBotIntelligence { machine: StateMachine::new(PlayerBotStateKind::PlayerControlled) },
            ))
            .id();
        let offset = Vec2::new(0.0, 20.0);
        let mut agent = Agent::new(35.0, 0.25, 120.0, 300.0);
        agent.position = Vec2::new(120.0, 20.0);
        let bot = scene
            .world
            .spawn((
                agent,
                AgentOffset(offset),
                // not yet synced with the agent this frame
                Transform { position: Vec2::new(-400.0, 0.0) },
                TaskBot::new(Locomotion::Flying, false, vec![Vec2::ZERO], vec![Vec2::ZERO]),
            ))
            .id();

        let mut frame = FrameContext::new(1.0 / 60.0, 900.0);
        let candidates = hostile_candidates(&scene, &mut frame, player);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].entity, bot);
        assert_eq!(candidates[0].position, Vec2::new(120.0, 0.0));
        assert!((candidates[0].distance - 120.0_f32.hypot(20.0)).abs() < 1e-3);
        assert_eq!(
            candidates[0].target_point,
            Vec2::new(120.0, 0.0) + config.beam_target_offset(Locomotion::Flying)
        );
    }
}
