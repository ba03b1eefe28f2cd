// One playable level: spawning, the per-frame system pipeline and the outcome
//
// Systems run in a fixed order every frame:
//   rules -> intelligence -> movement -> agent -> charge -> beam -> animation
// followed by contact detection and the outcome check.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use glam::Vec2;
use log::{debug, info};

use crate::engine::input::ControlInput;
use crate::engine::navigation::{NavigationGraph, PolygonObstacle};
use crate::engine::state_machine::StateMachine;
use crate::engine::steering::{Agent, AgentSample, SteeringContext};
use crate::engine::systems::{detect_contacts, ContactSet};
use crate::engine::{Orientation, PhysicsBody, Transform};
use crate::game::components::*;
use crate::game::config::{GameplayConfig, LevelConfig, TaskBotSpawn};
use crate::game::error::{SimResult, WorldExt};
use crate::game::snapshot::FrameContext;
use crate::game::states::{BeamStateKind, PlayerBotStateKind, TaskBotStateKind};
use crate::game::{animation, beam, charge, movement, playerbot, rules, taskbot};

/// Everything the systems read and write during a frame.
pub struct Scene {
    pub world: World,
    pub graph: NavigationGraph,
    pub config: GameplayConfig,
    /// Contacts as of the end of the previous frame.
    pub contacts: ContactSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    InProgress,
    /// Every TaskBot is good.
    Success,
    /// The time limit ran out first.
    Failure,
}

/// What a renderer needs to draw one bot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub position: Vec2,
    pub z_rotation: f32,
    pub animation: Option<AnimationState>,
}

pub struct Level {
    scene: Scene,
    player: Entity,
    task_bots: Vec<Entity>,
    proximity_factor: f32,
    time_limit: f32,
    elapsed: f32,
    outcome: LevelOutcome,
}

impl Level {
    pub fn new(config: GameplayConfig, level: &LevelConfig) -> SimResult<Self> {
        let obstacles: Vec<PolygonObstacle> = level.obstacles.iter().cloned().map(PolygonObstacle::new).collect();
        let graph = NavigationGraph::with_containment_slack(
            obstacles,
            config.task_bot.pathfinding_graph_buffer_radius,
            config.simulation.path_containment_slack,
        );

        let mut scene = Scene {
            world: World::new(),
            graph,
            config,
            contacts: ContactSet::default(),
        };

        let player = spawn_player(&mut scene.world, &config, level.player.position, Orientation::from_compass(level.player.orientation));
        playerbot::set_input_enabled(&mut scene.world, player, false)?;

        let task_bots: Vec<Entity> = level
            .task_bots
            .iter()
            .map(|spawn| spawn_task_bot(&mut scene.world, &config, spawn))
            .collect();

        let mut frame = FrameContext::new(0.0, level.proximity_factor);
        for &entity in &task_bots {
            taskbot::start(&mut scene, &mut frame, entity)?;
        }

        info!(
            "level ready: {} task bots, {} obstacles, {:.0}s limit",
            task_bots.len(),
            level.obstacles.len(),
            level.time_limit
        );

        Ok(Self {
            scene,
            player,
            task_bots,
            proximity_factor: level.proximity_factor,
            time_limit: level.time_limit,
            elapsed: 0.0,
            outcome: LevelOutcome::InProgress,
        })
    }

    /// Advance the simulation. Does nothing once the level is decided.
    pub fn update(&mut self, delta_time: f32) -> SimResult<()> {
        if self.outcome != LevelOutcome::InProgress {
            return Ok(());
        }
        let delta_time = delta_time.clamp(0.0, self.scene.config.simulation.maximum_update_delta_time);
        let mut frame = FrameContext::new(delta_time, self.proximity_factor);
        let scene = &mut self.scene;

        rules::rules_system(scene, &mut frame)?;
        taskbot::intelligence_system(scene, &mut frame)?;
        playerbot::intelligence_system(scene, &mut frame)?;
        movement::movement_system(scene, &mut frame)?;
        agent_system(scene, &mut frame)?;
        charge::charge_system(scene, &mut frame)?;
        beam::beam_system(scene, &mut frame)?;
        animation::animation_system(scene, &mut frame)?;

        let now = detect_contacts(&mut scene.world);
        for pair in scene.contacts.refresh(now) {
            let (a, b) = pair.entities();
            taskbot::contact_began(scene, &mut frame, a, b)?;
            taskbot::contact_began(scene, &mut frame, b, a)?;
        }

        sync_agent_to_node(&mut scene.world, self.player)?;

        self.elapsed += delta_time;
        self.outcome = self.check_outcome()?;
        if self.outcome != LevelOutcome::InProgress {
            info!("level finished after {:.1}s: {:?}", self.elapsed, self.outcome);
        }
        Ok(())
    }

    fn check_outcome(&self) -> SimResult<LevelOutcome> {
        let world = &self.scene.world;
        let mut all_good = true;
        for &entity in &self.task_bots {
            all_good &= world.require::<TaskBot>(entity)?.is_good;
        }
        Ok(if all_good {
            LevelOutcome::Success
        } else if self.elapsed >= self.time_limit {
            LevelOutcome::Failure
        } else {
            LevelOutcome::InProgress
        })
    }

    /// Feed one control event to the player.
    pub fn handle_input(&mut self, event: ControlInput) -> SimResult<()> {
        playerbot::handle_control_input(&mut self.scene.world, self.player, event)
    }

    pub fn outcome(&self) -> LevelOutcome {
        self.outcome
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn time_remaining(&self) -> f32 {
        (self.time_limit - self.elapsed).max(0.0)
    }

    pub fn player(&self) -> Entity {
        self.player
    }

    pub fn task_bots(&self) -> &[Entity] {
        &self.task_bots
    }

    pub fn world(&self) -> &World {
        &self.scene.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.scene.world
    }

    pub fn graph(&self) -> &NavigationGraph {
        &self.scene.graph
    }

    pub fn config(&self) -> &GameplayConfig {
        &self.scene.config
    }

    pub fn render_state(&self, entity: Entity) -> Option<RenderState> {
        let world = &self.scene.world;
        let animation = world.get::<Animation>(entity)?;
        Some(RenderState {
            position: world.get::<Transform>(entity)?.position,
            z_rotation: world.get::<Orientation>(entity)?.z_rotation(),
            animation: animation.requested.or(animation.current_state()),
        })
    }

    pub fn is_good(&self, entity: Entity) -> Option<bool> {
        self.scene.world.get::<TaskBot>(entity).map(|bot| bot.is_good)
    }

    pub fn charge_percentage(&self, entity: Entity) -> Option<f32> {
        self.scene.world.get::<Charge>(entity).map(Charge::percentage)
    }

    pub fn is_player_powered_down(&self) -> bool {
        self.scene
            .world
            .get::<PlayerBot>(self.player)
            .is_some_and(|player| player.is_powered_down)
    }

    pub fn task_bot_state(&self, entity: Entity) -> Option<TaskBotStateKind> {
        self.scene
            .world
            .get::<TaskBotIntelligence>(entity)
            .map(|i| i.machine.kind())
    }

    pub fn player_state(&self) -> Option<PlayerBotStateKind> {
        self.scene
            .world
            .get::<PlayerBotIntelligence>(self.player)
            .map(|i| i.machine.kind())
    }

    pub fn beam_state(&self) -> Option<BeamStateKind> {
        self.scene.world.get::<Beam>(self.player).map(|b| b.machine.kind())
    }
}

// ============================================================================
// SPAWNING
// ============================================================================

fn spawn_player(world: &mut World, config: &GameplayConfig, position: Vec2, orientation: Orientation) -> Entity {
    let player = &config.player_bot;
    let mut agent = Agent::new(player.physics_body_radius, 1.0, 0.0, 0.0);
    agent.position = position + player.agent_offset;
    agent.rotation = orientation.z_rotation();

    world
        .spawn((
            PlayerBot::default(),
            Transform::from_position(position),
            orientation,
            PhysicsBody { radius: player.physics_body_radius, offset: player.physics_body_offset },
            agent,
            AgentOffset(player.agent_offset),
            Antenna { offset: player.antenna_offset },
            Charge::new(player.initial_charge, player.maximum_charge),
            Movement::new(player.movement_speed, player.angular_speed),
            PlayerInput::default(),
            Animation::default(),
            PlayerBotIntelligence { machine: StateMachine::new(PlayerBotStateKind::Appear) },
            Beam { is_triggered: false, machine: StateMachine::new(BeamStateKind::Idle) },
        ))
        .id()
}

fn spawn_task_bot(world: &mut World, config: &GameplayConfig, spawn: &TaskBotSpawn) -> Entity {
    let task_bot = &config.task_bot;
    let position = spawn.start_position();
    let orientation = Orientation::from_compass(spawn.orientation);
    let maximum_charge = config.maximum_charge(spawn.locomotion);

    let mut agent = Agent::new(
        task_bot.physics_body_radius,
        task_bot.agent_mass,
        task_bot.maximum_speed(spawn.is_good),
        task_bot.maximum_acceleration,
    );
    agent.position = position + task_bot.agent_offset;
    agent.rotation = orientation.z_rotation();

    let mut entity = world.spawn((
        TaskBot::new(spawn.locomotion, spawn.is_good, spawn.good_path.clone(), spawn.bad_path.clone()),
        Transform::from_position(position),
        orientation,
        PhysicsBody { radius: task_bot.physics_body_radius, offset: task_bot.physics_body_offset },
        agent,
        AgentOffset(task_bot.agent_offset),
        Charge::new(if spawn.is_good { 0.0 } else { maximum_charge }, maximum_charge),
        Animation::default(),
        TaskBotIntelligence { machine: StateMachine::new(TaskBotStateKind::AgentControlled) },
        Rules::default(),
    ));
    if spawn.locomotion == Locomotion::Ground {
        // ground bots charge with the same direct movement the player uses
        entity.insert(Movement::new(config.player_bot.movement_speed, config.player_bot.angular_speed));
    }
    let id = entity.id();
    debug!("spawned {:?} task bot {id} at {position}", spawn.locomotion);
    id
}

// ============================================================================
// AGENT SYNC
// ============================================================================

/// Step every TaskBot's steering agent and reconcile it with the render node.
fn agent_system(scene: &mut Scene, frame: &mut FrameContext) -> SimResult<()> {
    let world = &mut scene.world;

    for (mut agent, transform, orientation, offset) in world
        .query::<(&mut Agent, &Transform, &Orientation, &AgentOffset)>()
        .iter_mut(world)
    {
        agent.position = transform.position + offset.0;
        agent.rotation = orientation.z_rotation();
    }

    let samples: HashMap<Entity, AgentSample> = world
        .query::<(Entity, &Agent)>()
        .iter(world)
        .map(|(entity, agent)| (entity, agent.sample()))
        .collect();
    let context = SteeringContext { agents: &samples, obstacles: scene.graph.obstacles() };

    let bots: Vec<Entity> = world
        .query_filtered::<Entity, (With<TaskBot>, With<Agent>)>()
        .iter(world)
        .collect();
    for entity in bots {
        world.require_mut::<Agent>(entity)?.integrate(frame.delta_time(), &context);

        let steered = world.require::<TaskBotIntelligence>(entity)?.machine.kind() == TaskBotStateKind::AgentControlled;
        if !steered {
            sync_agent_to_node(world, entity)?;
            continue;
        }
        let (position, rotation, moving) = {
            let agent = world.require::<Agent>(entity)?;
            (agent.position, agent.rotation, agent.velocity != Vec2::ZERO)
        };
        let offset = world.require::<AgentOffset>(entity)?.0;
        world.require_mut::<Transform>(entity)?.position = position - offset;
        if moving {
            world.require_mut::<Orientation>(entity)?.set_z_rotation(rotation);
        }
        world.require_mut::<Animation>(entity)?.requested = Some(AnimationState::WalkForward);
    }
    Ok(())
}

fn sync_agent_to_node(world: &mut World, entity: Entity) -> SimResult<()> {
    let position = world.require::<Transform>(entity)?.position + world.require::<AgentOffset>(entity)?.0;
    let rotation = world.require::<Orientation>(entity)?.z_rotation();
    let mut agent = world.require_mut::<Agent>(entity)?;
    agent.position = position;
    agent.rotation = rotation;
    Ok(())
}
