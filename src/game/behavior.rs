// Steering behaviors for each TaskBot mandate
//
// Behaviors are plain data rebuilt from scratch whenever AgentControlled
// refreshes them. Hunting and returning route through the navigation graph;
// patrolling follows the level's patrol loop directly.

use bevy_ecs::prelude::*;
use glam::Vec2;
use log::trace;

use crate::engine::navigation::NavigationGraph;
use crate::engine::steering::{Agent, Behavior, Goal, SteeringPath};
use crate::game::components::{Mandate, TaskBot};
use crate::game::config::GameplayConfig;
use crate::game::error::{SimResult, WorldExt};
use crate::game::snapshot::FrameContext;

/// Builds the behavior for one mandate, along with the route it follows.
pub struct BehaviorFactory<'a> {
    graph: &'a mut NavigationGraph,
    config: &'a GameplayConfig,
}

impl<'a> BehaviorFactory<'a> {
    pub fn new(graph: &'a mut NavigationGraph, config: &'a GameplayConfig) -> Self {
        Self { graph, config }
    }

    /// Chase `target` through the graph, flocking with nearby bad bots.
    pub fn hunt(
        &mut self,
        agent: &Agent,
        target: Vec2,
        path_radius: f32,
        flockmates: Vec<Entity>,
    ) -> (Behavior, Vec<Vec2>) {
        let mut behavior = self.base(agent);

        if !flockmates.is_empty() {
            let flocking = &self.config.flocking;
            behavior.add_goal(
                Goal::Separation {
                    agents: flockmates.clone(),
                    max_distance: flocking.separation_radius,
                    max_angle: flocking.separation_angle,
                },
                flocking.separation_weight,
            );
            behavior.add_goal(
                Goal::Alignment {
                    agents: flockmates.clone(),
                    max_distance: flocking.alignment_radius,
                    max_angle: flocking.alignment_angle,
                },
                flocking.alignment_weight,
            );
            behavior.add_goal(
                Goal::Cohesion {
                    agents: flockmates,
                    max_distance: flocking.cohesion_radius,
                    max_angle: flocking.cohesion_angle,
                },
                flocking.cohesion_weight,
            );
        }

        let points = self.add_route_goals(&mut behavior, agent.position, target, path_radius);
        (behavior, points)
    }

    /// Head back to `point` on a patrol path.
    pub fn return_to(&mut self, agent: &Agent, point: Vec2, path_radius: f32) -> (Behavior, Vec<Vec2>) {
        let mut behavior = self.base(agent);
        let points = self.add_route_goals(&mut behavior, agent.position, point, path_radius);
        (behavior, points)
    }

    /// Loop around `points` forever.
    pub fn patrol(&mut self, agent: &Agent, points: &[Vec2], path_radius: f32) -> (Behavior, Vec<Vec2>) {
        let mut behavior = self.base(agent);
        if let Some(path) = SteeringPath::new(points.to_vec(), path_radius, true) {
            self.add_path_goals(&mut behavior, path);
        }
        (behavior, points.to_vec())
    }

    fn base(&self, agent: &Agent) -> Behavior {
        let weights = &self.config.steering;
        Behavior::new()
            .with_goal(Goal::TargetSpeed(agent.max_speed), weights.target_speed)
            .with_goal(
                Goal::AvoidObstacles {
                    max_prediction_time: self.config.task_bot.max_prediction_time_for_obstacle_avoidance,
                },
                weights.avoid_obstacles,
            )
    }

    fn add_route_goals(&mut self, behavior: &mut Behavior, from: Vec2, to: Vec2, path_radius: f32) -> Vec<Vec2> {
        let points = self.graph.find_path(from, to);
        match SteeringPath::new(points.clone(), path_radius, false) {
            Some(path) => self.add_path_goals(behavior, path),
            None => {
                trace!("no route from {from} to {to}, seeking directly");
                behavior.add_goal(Goal::Seek(to), self.config.steering.seek_fallback);
            }
        }
        points
    }

    fn add_path_goals(&self, behavior: &mut Behavior, path: SteeringPath) {
        let prediction = self.config.task_bot.max_prediction_time_when_following_path;
        let weights = &self.config.steering;
        behavior.add_goal(
            Goal::StayOnPath { path: path.clone(), max_prediction_time: prediction },
            weights.stay_on_path,
        );
        behavior.add_goal(
            Goal::FollowPath { path, max_prediction_time: prediction, forward: true },
            weights.follow_path,
        );
    }
}

/// Other bad TaskBots within flocking range of `entity`, from the frame snapshot.
fn flockmates(world: &World, frame: &mut FrameContext, entity: Entity, search_distance: f32) -> Vec<Entity> {
    let Some(snapshot) = frame.entity_snapshot(world, entity) else {
        return Vec::new();
    };
    snapshot
        .within(search_distance)
        .filter(|d| world.get::<TaskBot>(d.target).is_some_and(|bot| !bot.is_good))
        .map(|d| d.target)
        .collect()
}

/// Attach the behavior for the bot's current mandate and record its route.
/// An empty behavior is attached when the mandate has nothing to steer toward.
pub fn apply_mandate_behavior(
    world: &mut World,
    graph: &mut NavigationGraph,
    config: &GameplayConfig,
    frame: &mut FrameContext,
    entity: Entity,
) -> SimResult<()> {
    let bot = world.require::<TaskBot>(entity)?;
    let mandate = bot.mandate;
    let patrol = bot.patrol_path(matches!(mandate, Mandate::FollowGoodPatrolPath)).to_vec();
    let is_bad = !bot.is_good;
    let agent = world.require::<Agent>(entity)?.clone();
    let task_bot = &config.task_bot;

    let (behavior, points) = match mandate {
        Mandate::FollowGoodPatrolPath | Mandate::FollowBadPatrolPath => {
            BehaviorFactory::new(graph, config).patrol(&agent, &patrol, task_bot.patrol_path_radius)
        }
        Mandate::HuntAgent(target) => {
            let Some(target_position) = world.get::<Agent>(target).map(|a| a.position) else {
                trace!("hunt target {target} has no agent");
                return set_behavior(world, entity, Behavior::new(), Vec::new());
            };
            let mates = if is_bad {
                flockmates(world, frame, entity, config.flocking.agent_search_distance_for_flocking)
            } else {
                Vec::new()
            };
            BehaviorFactory::new(graph, config).hunt(&agent, target_position, task_bot.hunt_path_radius, mates)
        }
        Mandate::ReturnToPositionOnPath(point) => {
            BehaviorFactory::new(graph, config).return_to(&agent, point, task_bot.return_to_patrol_path_radius)
        }
    };
    set_behavior(world, entity, behavior, points)
}

pub fn set_behavior(world: &mut World, entity: Entity, behavior: Behavior, debug_path: Vec<Vec2>) -> SimResult<()> {
    world.require_mut::<Agent>(entity)?.behavior = behavior;
    world.require_mut::<TaskBot>(entity)?.debug_path = debug_path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::navigation::PolygonObstacle;

    fn square(center: Vec2, half: f32) -> PolygonObstacle {
        PolygonObstacle::new(vec![
            center + Vec2::new(-half, -half),
            center + Vec2::new(half, -half),
            center + Vec2::new(half, half),
            center + Vec2::new(-half, half),
        ])
    }

    fn agent_at(position: Vec2) -> Agent {
        let mut agent = Agent::new(35.0, 0.25, 120.0, 300.0);
        agent.position = position;
        agent
    }

    #[test]
    fn test_hunt_routes_around_obstacle() {
        let config = GameplayConfig::default();
        let mut graph = NavigationGraph::new(vec![square(Vec2::ZERO, 50.0)], 30.0);
        let agent = agent_at(Vec2::new(-200.0, 0.0));

        let (behavior, points) = BehaviorFactory::new(&mut graph, &config).hunt(
            &agent,
            Vec2::new(200.0, 0.0),
            20.0,
            Vec::new(),
        );

        assert!(points.len() > 2);
        assert!(behavior.has_path_goals());
        assert!(matches!(behavior.goals()[0].goal, Goal::TargetSpeed(speed) if speed == 120.0));
    }

    #[test]
    fn test_path_goals_omitted_when_start_is_buried() {
        let config = GameplayConfig::default();
        // inside the raw polygon, so even ignoring its buffer nothing is visible
        let mut graph = NavigationGraph::new(vec![square(Vec2::ZERO, 50.0)], 30.0);
        let agent = agent_at(Vec2::new(10.0, 0.0));

        let (behavior, points) = BehaviorFactory::new(&mut graph, &config).return_to(
            &agent,
            Vec2::new(400.0, 0.0),
            20.0,
        );

        assert!(points.is_empty());
        assert!(!behavior.has_path_goals());
        assert!(behavior.goals().iter().any(|g| matches!(g.goal, Goal::Seek(_))));
    }

    #[test]
    fn test_hunt_flocks_only_when_mates_present() {
        let config = GameplayConfig::default();
        let mut graph = NavigationGraph::new(Vec::new(), 30.0);
        let agent = agent_at(Vec2::ZERO);
        let mate = Entity::from_raw(7);

        let (alone, _) = BehaviorFactory::new(&mut graph, &config).hunt(&agent, Vec2::X * 100.0, 20.0, Vec::new());
        let (flocking, _) =
            BehaviorFactory::new(&mut graph, &config).hunt(&agent, Vec2::X * 100.0, 20.0, vec![mate]);

        assert_eq!(flocking.goals().len(), alone.goals().len() + 3);
        assert!(flocking.goals().iter().any(|g| matches!(g.goal, Goal::Cohesion { .. })));
    }

    #[test]
    fn test_patrol_is_cyclical() {
        let config = GameplayConfig::default();
        let mut graph = NavigationGraph::new(Vec::new(), 30.0);
        let points = [Vec2::ZERO, Vec2::new(100.0, 0.0), Vec2::new(100.0, 100.0)];

        let (behavior, route) = BehaviorFactory::new(&mut graph, &config).patrol(&agent_at(Vec2::ZERO), &points, 10.0);

        assert_eq!(route, points.to_vec());
        let follow = behavior
            .goals()
            .iter()
            .find_map(|g| match &g.goal {
                Goal::FollowPath { path, .. } => Some(path),
                _ => None,
            })
            .unwrap();
        assert!(follow.is_cyclical());
    }
}
