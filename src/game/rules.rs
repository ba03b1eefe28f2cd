// Fuzzy rules that pick a bad TaskBot's mandate
//
// Facts are graded in [0, 1] from the bot's snapshot: how much of the level
// has turned bad, and how near the player and the nearest good bot are.
// Rules combine facts with min (AND) and max (OR).

use bevy_ecs::prelude::*;
use log::debug;

use crate::engine::steering::Agent;
use crate::game::components::{Locomotion, Mandate, Rules, TaskBot, TaskBotIntelligence};
use crate::game::error::{SimResult, WorldExt};
use crate::game::level::Scene;
use crate::game::snapshot::{EntityDistance, EntitySnapshot, FrameContext};
use crate::game::states::{TaskBotState, TaskBotStateKind};
use crate::game::taskbot;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Proximity {
    pub near: f32,
    pub medium: f32,
    pub far: f32,
}

impl Proximity {
    /// Grade a distance against thirds of the proximity factor.
    pub fn grade(target: Option<EntityDistance>, proximity_factor: f32) -> Self {
        let Some(target) = target else {
            return Self::default();
        };
        let third = proximity_factor / 3.0;
        let d = target.distance;
        Self {
            near: grade((third - d) / third),
            medium: grade(1.0 - (d - third).abs() / third),
            far: grade((d - third) / third),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FuzzyFacts {
    pub bad_low: f32,
    pub bad_medium: f32,
    pub bad_high: f32,
    pub player: Proximity,
    pub good_task_bot: Proximity,
}

fn grade(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

impl FuzzyFacts {
    pub fn from_snapshot(snapshot: &EntitySnapshot) -> Self {
        let p = snapshot.bad_bot_percentage;
        let bad_medium = if p <= 1.0 / 3.0 { 3.0 * p } else { 1.0 - (3.0 * p - 1.0) };
        Self {
            bad_low: grade(1.0 - 3.0 * p),
            bad_medium: grade(bad_medium),
            bad_high: grade(3.0 * p - 1.0),
            player: Proximity::grade(snapshot.player_bot_target, snapshot.proximity_factor),
            good_task_bot: Proximity::grade(snapshot.nearest_good_task_bot, snapshot.proximity_factor),
        }
    }

    pub fn hunt_player(&self) -> f32 {
        let (player, good) = (&self.player, &self.good_task_bot);
        [
            self.bad_high.min(player.near),
            self.bad_medium.min(player.near),
            self.bad_high.min(player.medium).min(good.medium),
        ]
        .into_iter()
        .fold(0.0, f32::max)
    }

    pub fn hunt_task_bot(&self) -> f32 {
        let (player, good) = (&self.player, &self.good_task_bot);
        [
            self.bad_low.min(good.near),
            self.bad_medium.min(good.near),
            self.bad_low.min(player.medium).min(good.medium),
            self.bad_medium.min(player.far).min(good.medium),
        ]
        .into_iter()
        .fold(0.0, f32::max)
    }
}

/// The agent a bad bot should hunt, or `None` to keep to its patrol.
pub fn choose_hunt_target(snapshot: &EntitySnapshot) -> Option<Entity> {
    let facts = FuzzyFacts::from_snapshot(snapshot);
    let hunt_player = facts.hunt_player();
    let hunt_task_bot = facts.hunt_task_bot();

    if hunt_player >= hunt_task_bot && hunt_player > 0.0 {
        snapshot.player_bot_target.map(|d| d.target)
    } else if hunt_task_bot > hunt_player {
        snapshot.nearest_good_task_bot.map(|d| d.target)
    } else {
        None
    }
}

/// Re-evaluate the rules for every TaskBot whose wait has elapsed.
pub fn rules_system(scene: &mut Scene, frame: &mut FrameContext) -> SimResult<()> {
    let delta_time = frame.delta_time();
    let wait = scene.config.task_bot.rules_update_wait_duration;

    let mut due = Vec::new();
    for (entity, mut rules) in scene.world.query::<(Entity, &mut Rules)>().iter_mut(&mut scene.world) {
        rules.since_last_evaluation += delta_time;
        if rules.since_last_evaluation >= wait {
            rules.since_last_evaluation = 0.0;
            due.push(entity);
        }
    }

    for entity in due {
        if scene.world.require::<TaskBot>(entity)?.is_good {
            continue;
        }
        let target = frame
            .entity_snapshot(&scene.world, entity)
            .and_then(choose_hunt_target);
        update_mandate(&mut scene.world, entity, target)?;
        try_begin_ground_attack(scene, frame, entity)?;
    }
    Ok(())
}

fn update_mandate(world: &mut World, entity: Entity, target: Option<Entity>) -> SimResult<()> {
    let position = world.require::<Agent>(entity)?.position;
    let mut bot = world.require_mut::<TaskBot>(entity)?;
    let mandate = match target {
        Some(target) => Mandate::HuntAgent(target),
        None if bot.mandate == Mandate::FollowBadPatrolPath => return Ok(()),
        None => match bot.closest_point_on_path(false, position) {
            Some(point) => Mandate::ReturnToPositionOnPath(point),
            None => Mandate::FollowBadPatrolPath,
        },
    };
    if bot.mandate != mandate {
        debug!("task bot {entity}: mandate {:?} -> {:?}", bot.mandate, mandate);
        bot.mandate = mandate;
    }
    Ok(())
}

/// A hunting ground bot with a clear, short line to its prey turns to charge it.
fn try_begin_ground_attack(scene: &mut Scene, frame: &mut FrameContext, entity: Entity) -> SimResult<()> {
    let world = &scene.world;
    let bot = world.require::<TaskBot>(entity)?;
    if bot.locomotion != Locomotion::Ground {
        return Ok(());
    }
    let Mandate::HuntAgent(target) = bot.mandate else {
        return Ok(());
    };
    let TaskBotState::AgentControlled { elapsed, .. } = *world.require::<TaskBotIntelligence>(entity)?.machine.current()
    else {
        return Ok(());
    };
    if elapsed < scene.config.ground_bot.delay_between_attacks {
        return Ok(());
    }

    let position = world.require::<Agent>(entity)?.position;
    let Some(target_position) = world.get::<Agent>(target).map(|a| a.position) else {
        return Ok(());
    };
    if position.distance(target_position) > scene.config.ground_bot.maximum_attack_distance {
        return Ok(());
    }
    if scene
        .graph
        .obstacles()
        .iter()
        .any(|o| o.intersects_segment(position, target_position))
    {
        return Ok(());
    }

    scene.world.require_mut::<TaskBot>(entity)?.target_position = Some(target_position);
    taskbot::enter_state(scene, frame, entity, TaskBotStateKind::RotateToAttack)?;
    Ok(())
}
