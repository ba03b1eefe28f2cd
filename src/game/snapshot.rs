// Once-per-frame view of where every bot is relative to every other bot
//
// `FrameContext` is created at the top of `Level::update` and dropped at the
// end of it. The first query in a frame builds the `LevelSnapshot`; every
// later query in the same frame reads that same snapshot.

use std::cmp::Ordering;
use std::collections::HashMap;

use bevy_ecs::prelude::*;
use glam::Vec2;

use crate::engine::steering::Agent;
use crate::game::components::{PlayerBot, PlayerBotIntelligence, TaskBot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityDistance {
    pub target: Entity,
    pub distance: f32,
}

/// What one bot sees this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub proximity_factor: f32,
    /// Bad TaskBots over all TaskBots, 0 when there are none.
    pub bad_bot_percentage: f32,
    /// Nearest player that may currently be targeted.
    pub player_bot_target: Option<EntityDistance>,
    pub nearest_good_task_bot: Option<EntityDistance>,
    /// Every other bot, nearest first.
    pub entity_distances: Vec<EntityDistance>,
}

impl EntitySnapshot {
    pub fn distance_to(&self, target: Entity) -> Option<f32> {
        self.entity_distances
            .iter()
            .find(|d| d.target == target)
            .map(|d| d.distance)
    }

    /// Bots no further than `radius`, nearest first.
    pub fn within(&self, radius: f32) -> impl Iterator<Item = EntityDistance> + '_ {
        self.entity_distances
            .iter()
            .copied()
            .take_while(move |d| d.distance <= radius)
    }
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Player { targetable: bool },
    TaskBot { is_good: bool },
}

#[derive(Debug, Clone, Default)]
pub struct LevelSnapshot {
    entities: HashMap<Entity, EntitySnapshot>,
    /// Agent positions the distances were measured from.
    positions: HashMap<Entity, Vec2>,
}

impl LevelSnapshot {
    /// Build distances between every pair of bots that own a steering agent.
    pub fn capture(world: &World, proximity_factor: f32) -> Self {
        let mut bots: Vec<(Entity, Vec2, Role)> = Vec::new();
        for entity in world.iter_entities() {
            let Some(agent) = entity.get::<Agent>() else {
                continue;
            };
            let role = if entity.contains::<PlayerBot>() {
                let targetable = entity
                    .get::<PlayerBotIntelligence>()
                    .is_some_and(|i| i.machine.kind().is_targetable());
                Role::Player { targetable }
            } else if let Some(bot) = entity.get::<TaskBot>() {
                Role::TaskBot { is_good: bot.is_good }
            } else {
                continue;
            };
            bots.push((entity.id(), agent.position, role));
        }

        let (good, bad) = bots.iter().fold((0usize, 0usize), |(good, bad), (_, _, role)| match role {
            Role::TaskBot { is_good: true } => (good + 1, bad),
            Role::TaskBot { is_good: false } => (good, bad + 1),
            Role::Player { .. } => (good, bad),
        });
        let bad_bot_percentage = if good + bad == 0 { 0.0 } else { bad as f32 / (good + bad) as f32 };

        let positions: HashMap<Entity, Vec2> = bots.iter().map(|(entity, position, _)| (*entity, *position)).collect();
        let mut entities = HashMap::with_capacity(bots.len());
        for (entity, position, _) in &bots {
            let mut distances: Vec<(EntityDistance, Role)> = bots
                .iter()
                .filter(|(other, _, _)| other != entity)
                .map(|(other, other_position, role)| {
                    (EntityDistance { target: *other, distance: position.distance(*other_position) }, *role)
                })
                .collect();
            distances.sort_by(|a, b| a.0.distance.partial_cmp(&b.0.distance).unwrap_or(Ordering::Equal));

            let player_bot_target = distances
                .iter()
                .find(|(_, role)| matches!(role, Role::Player { targetable: true }))
                .map(|(d, _)| *d);
            let nearest_good_task_bot = distances
                .iter()
                .find(|(_, role)| matches!(role, Role::TaskBot { is_good: true }))
                .map(|(d, _)| *d);

            entities.insert(
                *entity,
                EntitySnapshot {
                    proximity_factor,
                    bad_bot_percentage,
                    player_bot_target,
                    nearest_good_task_bot,
                    entity_distances: distances.into_iter().map(|(d, _)| d).collect(),
                },
            );
        }

        Self { entities, positions }
    }

    pub fn entity(&self, entity: Entity) -> Option<&EntitySnapshot> {
        self.entities.get(&entity)
    }

    /// Agent position of `entity` at capture time.
    pub fn position(&self, entity: Entity) -> Option<Vec2> {
        self.positions.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ============================================================================
// FRAME CONTEXT
// ============================================================================

/// Per-frame scratch state handed to every system in one `update`.
pub struct FrameContext {
    delta_time: f32,
    proximity_factor: f32,
    snapshot: Option<LevelSnapshot>,
    captures: usize,
}

impl FrameContext {
    pub fn new(delta_time: f32, proximity_factor: f32) -> Self {
        Self {
            delta_time,
            proximity_factor,
            snapshot: None,
            captures: 0,
        }
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// The frame's snapshot, captured from `world` on first use.
    pub fn snapshot(&mut self, world: &World) -> &LevelSnapshot {
        let proximity_factor = self.proximity_factor;
        let captures = &mut self.captures;
        self.snapshot.get_or_insert_with(|| {
            *captures += 1;
            LevelSnapshot::capture(world, proximity_factor)
        })
    }

    pub fn entity_snapshot(&mut self, world: &World, entity: Entity) -> Option<&EntitySnapshot> {
        self.snapshot(world).entity(entity)
    }

    /// How many snapshots this frame has built. Never more than one.
    pub fn snapshot_captures(&self) -> usize {
        self.captures
    }
}
