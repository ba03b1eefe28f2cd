// Goal-based steering for autonomous agents.
//
// An `Agent` is a 2D point mass. Its `Behavior` is a plain list of weighted
// goals; every frame the goals are evaluated against a read-only
// `SteeringContext` (neighbour samples + scenery) and the summed force is
// integrated into velocity, position and heading.

use std::collections::HashMap;
use std::f32::consts::PI;

use bevy_ecs::prelude::*;
use glam::Vec2;

use super::navigation::{closest_point_on_segment, PolygonObstacle};

const EPSILON: f32 = 1e-5;

// ============================================================================
// AGENT SNAPSHOT
// ============================================================================

/// Read-only data for one agent, collected from ECS before steering runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSample {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Everything a goal may look at besides its own agent.
pub struct SteeringContext<'a> {
    pub agents: &'a HashMap<Entity, AgentSample>,
    pub obstacles: &'a [PolygonObstacle],
}

// ============================================================================
// PATHS
// ============================================================================

/// Polyline with a corridor radius, optionally closed into a loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SteeringPath {
    points: Vec<Vec2>,
    radius: f32,
    cyclical: bool,
    /// Distance along the path at the start of each segment.
    offsets: Vec<f32>,
    length: f32,
}

impl SteeringPath {
    /// Returns `None` for fewer than two points; a path needs a segment.
    pub fn new(points: Vec<Vec2>, radius: f32, cyclical: bool) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let mut path = Self {
            points,
            radius,
            cyclical,
            offsets: Vec::new(),
            length: 0.0,
        };
        let mut length = 0.0;
        let mut offsets = Vec::new();
        for (_, a, b) in path.segments() {
            offsets.push(length);
            length += a.distance(b);
        }
        path.offsets = offsets;
        path.length = length;
        Some(path)
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn is_cyclical(&self) -> bool {
        self.cyclical
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    fn segments(&self) -> impl Iterator<Item = (usize, Vec2, Vec2)> + '_ {
        let n = self.points.len();
        let count = if self.cyclical { n } else { n - 1 };
        (0..count).map(move |i| (i, self.points[i], self.points[(i + 1) % n]))
    }

    /// Closest point on the path to `point`, with its distance along the path.
    pub fn closest_point(&self, point: Vec2) -> (f32, Vec2) {
        let mut best = (0.0, self.points[0]);
        let mut best_distance = f32::INFINITY;
        for (i, a, b) in self.segments() {
            let candidate = closest_point_on_segment(point, a, b);
            let distance = candidate.distance_squared(point);
            if distance < best_distance {
                best_distance = distance;
                best = (self.offsets[i] + a.distance(candidate), candidate);
            }
        }
        best
    }

    /// Point at `distance` along the path. Wraps on loops, clamps otherwise.
    pub fn point_at(&self, distance: f32) -> Vec2 {
        if self.length <= EPSILON {
            return self.points[0];
        }
        let distance = if self.cyclical {
            distance.rem_euclid(self.length)
        } else {
            distance.clamp(0.0, self.length)
        };
        let mut last = self.points[0];
        for (i, a, b) in self.segments() {
            let segment = a.distance(b);
            let start = self.offsets[i];
            if distance <= start + segment {
                if segment <= EPSILON {
                    return a;
                }
                return a.lerp(b, (distance - start) / segment);
            }
            last = b;
        }
        last
    }
}

// ============================================================================
// GOALS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Goal {
    /// Accelerate or brake along the current heading toward a speed.
    TargetSpeed(f32),
    Seek(Vec2),
    Flee(Vec2),
    AvoidObstacles { max_prediction_time: f32 },
    Separation { agents: Vec<Entity>, max_distance: f32, max_angle: f32 },
    Alignment { agents: Vec<Entity>, max_distance: f32, max_angle: f32 },
    Cohesion { agents: Vec<Entity>, max_distance: f32, max_angle: f32 },
    FollowPath { path: SteeringPath, max_prediction_time: f32, forward: bool },
    StayOnPath { path: SteeringPath, max_prediction_time: f32 },
}

impl Goal {
    pub fn is_path_goal(&self) -> bool {
        matches!(self, Goal::FollowPath { .. } | Goal::StayOnPath { .. })
    }

    /// Unweighted steering force, bounded by the agent's max acceleration.
    pub fn force(&self, agent: &Agent, context: &SteeringContext<'_>) -> Vec2 {
        let force = match self {
            Goal::TargetSpeed(speed) => {
                let direction = agent.velocity.try_normalize().unwrap_or_else(|| agent.heading());
                direction * (speed - agent.speed())
            }
            Goal::Seek(target) => seek(agent, *target),
            Goal::Flee(threat) => {
                let desired = (agent.position - *threat).normalize_or_zero() * agent.max_speed;
                desired - agent.velocity
            }
            Goal::AvoidObstacles { max_prediction_time } => {
                avoid_obstacles(agent, context.obstacles, *max_prediction_time)
            }
            Goal::Separation { agents, max_distance, max_angle } => {
                let mut push = Vec2::ZERO;
                for (offset, distance, _) in neighbours(agent, agents, context, *max_distance, *max_angle) {
                    push -= offset / distance * (1.0 - distance / max_distance);
                }
                push.normalize_or_zero() * agent.max_acceleration
            }
            Goal::Alignment { agents, max_distance, max_angle } => {
                let mut heading = Vec2::ZERO;
                for (_, _, sample) in neighbours(agent, agents, context, *max_distance, *max_angle) {
                    heading += sample.velocity;
                }
                match heading.try_normalize() {
                    Some(direction) => direction * agent.max_speed - agent.velocity,
                    None => Vec2::ZERO,
                }
            }
            Goal::Cohesion { agents, max_distance, max_angle } => {
                let mut sum = Vec2::ZERO;
                let mut count = 0;
                for (_, _, sample) in neighbours(agent, agents, context, *max_distance, *max_angle) {
                    sum += sample.position;
                    count += 1;
                }
                if count == 0 {
                    Vec2::ZERO
                } else {
                    seek(agent, sum / count as f32)
                }
            }
            Goal::FollowPath { path, max_prediction_time, forward } => {
                let predicted = agent.position + agent.velocity * *max_prediction_time;
                let (along, _) = path.closest_point(predicted);
                let lookahead = (agent.speed() * max_prediction_time).max(path.radius());
                let target = if *forward { along + lookahead } else { along - lookahead };
                seek(agent, path.point_at(target))
            }
            Goal::StayOnPath { path, max_prediction_time } => {
                let predicted = agent.position + agent.velocity * *max_prediction_time;
                let (_, closest) = path.closest_point(predicted);
                if closest.distance(predicted) > path.radius() {
                    seek(agent, closest)
                } else {
                    Vec2::ZERO
                }
            }
        };
        force.clamp_length_max(agent.max_acceleration)
    }
}

fn seek(agent: &Agent, target: Vec2) -> Vec2 {
    let desired = (target - agent.position).normalize_or_zero() * agent.max_speed;
    desired - agent.velocity
}

/// Neighbours of `agent` within range and inside its forward view cone,
/// yielded as (offset, distance, sample).
fn neighbours<'a>(
    agent: &'a Agent,
    entities: &'a [Entity],
    context: &'a SteeringContext<'_>,
    max_distance: f32,
    max_angle: f32,
) -> impl Iterator<Item = (Vec2, f32, AgentSample)> + 'a {
    let heading = agent.heading();
    entities
        .iter()
        .filter_map(move |entity| context.agents.get(entity))
        .filter_map(move |sample| {
            let offset = sample.position - agent.position;
            let distance = offset.length();
            if distance <= EPSILON || distance > max_distance {
                return None;
            }
            let angle = heading.dot(offset / distance).clamp(-1.0, 1.0).acos();
            (angle <= max_angle).then_some((offset, distance, *sample))
        })
}

fn avoid_obstacles(agent: &Agent, obstacles: &[PolygonObstacle], prediction_time: f32) -> Vec2 {
    let probes = [agent.position, agent.position + agent.velocity * prediction_time];
    let clearance = agent.radius.max(EPSILON);
    let mut force = Vec2::ZERO;
    for obstacle in obstacles {
        for probe in probes {
            let closest = obstacle.closest_boundary_point(probe);
            let distance = probe.distance(closest);
            if obstacle.contains_point(probe) {
                force += (closest - probe).normalize_or_zero() * agent.max_acceleration;
            } else if distance < clearance {
                let strength = 1.0 - distance / clearance;
                force += (probe - closest).normalize_or_zero() * agent.max_acceleration * strength;
            }
        }
    }
    force
}

// ============================================================================
// BEHAVIOR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedGoal {
    pub goal: Goal,
    pub weight: f32,
}

/// A weighted set of goals. Rebuilt wholesale rather than edited in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Behavior {
    goals: Vec<WeightedGoal>,
}

impl Behavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_goal(&mut self, goal: Goal, weight: f32) {
        self.goals.push(WeightedGoal { goal, weight });
    }

    pub fn with_goal(mut self, goal: Goal, weight: f32) -> Self {
        self.add_goal(goal, weight);
        self
    }

    pub fn goals(&self) -> &[WeightedGoal] {
        &self.goals
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn has_path_goals(&self) -> bool {
        self.goals.iter().any(|g| g.goal.is_path_goal())
    }

    pub fn steering_force(&self, agent: &Agent, context: &SteeringContext<'_>) -> Vec2 {
        self.goals
            .iter()
            .map(|g| g.goal.force(agent, context) * g.weight)
            .sum()
    }
}

// ============================================================================
// AGENT
// ============================================================================

/// Point-mass steering agent.
#[derive(Component, Debug, Clone)]
pub struct Agent {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Heading in radians.
    pub rotation: f32,
    pub mass: f32,
    pub radius: f32,
    pub max_speed: f32,
    pub max_acceleration: f32,
    pub behavior: Behavior,
}

impl Agent {
    pub fn new(radius: f32, mass: f32, max_speed: f32, max_acceleration: f32) -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            mass,
            radius,
            max_speed,
            max_acceleration,
            behavior: Behavior::new(),
        }
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    pub fn heading(&self) -> Vec2 {
        Vec2::from_angle(self.rotation)
    }

    pub fn sample(&self) -> AgentSample {
        AgentSample {
            position: self.position,
            velocity: self.velocity,
        }
    }

    /// Advance one step under the attached behavior. Non-positive steps do nothing.
    pub fn integrate(&mut self, delta_time: f32, context: &SteeringContext<'_>) {
        if delta_time <= 0.0 {
            return;
        }
        let force = self.behavior.steering_force(self, context);
        let acceleration = (force / self.mass.max(EPSILON)).clamp_length_max(self.max_acceleration);
        self.velocity = (self.velocity + acceleration * delta_time).clamp_length_max(self.max_speed);
        self.position += self.velocity * delta_time;
        if self.velocity.length_squared() > EPSILON {
            self.rotation = self.velocity.y.atan2(self.velocity.x).rem_euclid(2.0 * PI);
        }
    }
}
