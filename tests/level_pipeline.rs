// End-to-end runs of the frame pipeline through the public Level API

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;

use taskbots::engine::CompassDirection;
use taskbots::engine::input::ControlInput;
use taskbots::engine::state_machine::MachineState;
use taskbots::game::components::{Animation, Charge, Locomotion, TaskBot, TaskBotIntelligence};
use taskbots::game::config::{PlayerStart, TaskBotSpawn};
use taskbots::game::states::{BeamStateKind, PlayerBotStateKind, TaskBotState, TaskBotStateKind};
use taskbots::game::{GameplayConfig, Level, LevelConfig, LevelOutcome, SimError};

const FRAME: f32 = 1.0 / 60.0;

fn level_config(task_bots: Vec<TaskBotSpawn>) -> LevelConfig {
    LevelConfig {
        proximity_factor: 900.0,
        time_limit: 60.0,
        player: PlayerStart { position: Vec2::ZERO, orientation: CompassDirection::East },
        obstacles: Vec::new(),
        task_bots,
    }
}

fn bad_bot(locomotion: Locomotion, at: Vec2) -> TaskBotSpawn {
    TaskBotSpawn {
        locomotion,
        is_good: false,
        good_path: vec![at + Vec2::new(0.0, 300.0), at + Vec2::new(200.0, 300.0)],
        bad_path: vec![at],
        orientation: CompassDirection::West,
    }
}

fn run(level: &mut Level, seconds: f32) {
    for _ in 0..(seconds / FRAME).ceil() as usize {
        level.update(FRAME).unwrap();
    }
}

/// Bad bots that never move or charge, so they sit still in front of the beam.
fn sitting_duck_config() -> GameplayConfig {
    let mut config = GameplayConfig::default();
    config.task_bot.maximum_speed_when_bad = 0.0;
    config.ground_bot.maximum_attack_distance = 0.0;
    config
}

#[test]
fn test_beam_converts_bot_in_front_of_player() {
    let mut level = Level::new(sitting_duck_config(), &level_config(vec![bad_bot(Locomotion::Ground, Vec2::new(120.0, 0.0))])).unwrap();
    let bot = level.task_bots()[0];

    // pressed during the appear animation, takes effect once input is enabled
    level.handle_input(ControlInput::BeginAttack { allows_strafing: false }).unwrap();
    run(&mut level, 0.25);
    assert_eq!(level.beam_state(), Some(BeamStateKind::Idle));

    let mut fired = false;
    for _ in 0..180 {
        level.update(FRAME).unwrap();
        fired |= level.beam_state() == Some(BeamStateKind::Firing);
        if level.is_good(bot) == Some(true) {
            break;
        }
    }

    assert!(fired);
    assert_eq!(level.is_good(bot), Some(true), "beam never converted the bot");
    assert_eq!(level.charge_percentage(bot), Some(0.0));
    assert_eq!(level.beam_state(), Some(BeamStateKind::Idle));
    assert_eq!(level.outcome(), LevelOutcome::Success);
}

#[test]
fn test_beam_ignores_bot_behind_player() {
    let mut level = Level::new(sitting_duck_config(), &level_config(vec![bad_bot(Locomotion::Flying, Vec2::new(-150.0, 0.0))])).unwrap();
    let bot = level.task_bots()[0];

    level.handle_input(ControlInput::BeginAttack { allows_strafing: false }).unwrap();
    run(&mut level, 1.5);

    assert_eq!(level.beam_state(), Some(BeamStateKind::Firing));
    assert_eq!(level.is_good(bot), Some(false));
    assert_eq!(level.charge_percentage(bot), Some(1.0));
}

/// Run for `seconds`, collapsing consecutive frames in the same state.
fn timeline<K: PartialEq + Copy>(level: &mut Level, seconds: f32, state: impl Fn(&Level) -> K) -> Vec<(K, usize)> {
    let mut runs: Vec<(K, usize)> = Vec::new();
    for _ in 0..(seconds / FRAME) as usize {
        level.update(FRAME).unwrap();
        let kind = state(level);
        match runs.last_mut() {
            Some((last, frames)) if *last == kind => *frames += 1,
            _ => runs.push((kind, 1)),
        }
    }
    runs
}

#[test]
fn test_held_beam_overheats_and_cools_down() {
    let mut level = Level::new(sitting_duck_config(), &level_config(vec![bad_bot(Locomotion::Flying, Vec2::new(-150.0, 0.0))])).unwrap();

    level.handle_input(ControlInput::BeginAttack { allows_strafing: false }).unwrap();
    let runs = timeline(&mut level, 5.0, |level| level.beam_state().unwrap());
    let kinds: Vec<BeamStateKind> = runs.iter().map(|(kind, _)| *kind).collect();

    assert_eq!(
        kinds[..5],
        [BeamStateKind::Idle, BeamStateKind::Firing, BeamStateKind::Cooling, BeamStateKind::Idle, BeamStateKind::Firing]
    );
    // two seconds of fire, one of cooling, then straight back to firing
    assert!((119..=122).contains(&runs[1].1), "fired for {} frames", runs[1].1);
    assert!((59..=62).contains(&runs[2].1), "cooled for {} frames", runs[2].1);
    assert_eq!(runs[3].1, 1);
}

#[test]
fn test_released_beam_goes_idle_without_cooling() {
    let mut level = Level::new(sitting_duck_config(), &level_config(vec![bad_bot(Locomotion::Flying, Vec2::new(-150.0, 0.0))])).unwrap();

    level.handle_input(ControlInput::BeginAttack { allows_strafing: false }).unwrap();
    run(&mut level, 1.0);
    assert_eq!(level.beam_state(), Some(BeamStateKind::Firing));

    level.handle_input(ControlInput::FinishAttack).unwrap();
    let runs = timeline(&mut level, 3.0, |level| level.beam_state().unwrap());
    assert_eq!(runs, vec![(BeamStateKind::Idle, runs[0].1)]);
}

#[test]
fn test_zapped_flyer_recovers_after_beam_lets_go() {
    let mut level = Level::new(sitting_duck_config(), &level_config(vec![bad_bot(Locomotion::Flying, Vec2::new(120.0, 0.0))])).unwrap();
    let bot = level.task_bots()[0];

    level.handle_input(ControlInput::BeginAttack { allows_strafing: false }).unwrap();
    let zapped = (0..120).any(|_| {
        level.update(FRAME).unwrap();
        level.task_bot_state(bot) == Some(TaskBotStateKind::Zapped)
    });
    assert!(zapped, "beam never reached the flyer");
    run(&mut level, 0.25);

    level.handle_input(ControlInput::FinishAttack).unwrap();
    level.update(FRAME).unwrap();
    assert_eq!(level.beam_state(), Some(BeamStateKind::Idle));
    let drained = level.charge_percentage(bot).unwrap();
    assert!(drained > 0.0 && drained < 1.0);

    run(&mut level, 0.5);
    assert_eq!(level.task_bot_state(bot), Some(TaskBotStateKind::Zapped));

    run(&mut level, 0.35);
    assert_eq!(level.task_bot_state(bot), Some(TaskBotStateKind::AgentControlled));
    assert_eq!(level.is_good(bot), Some(false));
    // survivors recharge on recovery
    assert_eq!(level.charge_percentage(bot), Some(1.0));
}

#[test]
fn test_bad_flyer_blast_drains_player() {
    let mut level = Level::new(sitting_duck_config(), &level_config(vec![bad_bot(Locomotion::Flying, Vec2::new(50.0, 0.0))])).unwrap();
    let bot = level.task_bots()[0];
    let player = level.player();

    let mut lowest = 1.0_f32;
    let mut runs: Vec<TaskBotStateKind> = Vec::new();
    for _ in 0..(3.0 / FRAME) as usize {
        level.update(FRAME).unwrap();
        lowest = lowest.min(level.charge_percentage(player).unwrap());
        let state = level.task_bot_state(bot).unwrap();
        if runs.last() != Some(&state) {
            runs.push(state);
        }
    }

    assert_eq!(
        runs[..3],
        [TaskBotStateKind::FlyingPreAttack, TaskBotStateKind::FlyingBlast, TaskBotStateKind::AgentControlled]
    );
    // 25 per second over the 0.75 s blast effect
    assert!(lowest < 0.9 && lowest > 0.5, "player charge bottomed out at {lowest}");
    assert_eq!(level.is_good(bot), Some(false));
}

#[test]
fn test_converted_flyer_blast_converts_bad_bots_nearby() {
    let flyer = bad_bot(Locomotion::Flying, Vec2::new(120.0, 0.0));
    let ground = bad_bot(Locomotion::Ground, Vec2::new(120.0, 80.0));
    let mut level = Level::new(sitting_duck_config(), &level_config(vec![flyer, ground])).unwrap();
    let (flyer, ground) = (level.task_bots()[0], level.task_bots()[1]);

    level.handle_input(ControlInput::BeginAttack { allows_strafing: false }).unwrap();
    let converted = (0..(4.0 / FRAME) as usize).any(|_| {
        level.update(FRAME).unwrap();
        level.is_good(flyer) == Some(true)
    });
    assert!(converted, "beam never converted the flyer");
    assert_eq!(level.task_bot_state(flyer), Some(TaskBotStateKind::FlyingBlast));
    assert_eq!(level.beam_state(), Some(BeamStateKind::Idle));
    // the beam never touched the ground bot
    assert_eq!(level.charge_percentage(ground), Some(1.0));

    run(&mut level, 0.5);
    assert_eq!(level.is_good(ground), Some(true));
    assert_eq!(level.charge_percentage(ground), Some(0.0));
    assert_eq!(level.outcome(), LevelOutcome::Success);
}

#[test]
fn test_ground_bot_hunts_and_hits_player() {
    let mut level = Level::new(GameplayConfig::default(), &level_config(vec![bad_bot(Locomotion::Ground, Vec2::new(200.0, 0.0))])).unwrap();
    let bot = level.task_bots()[0];

    let mut attacked = false;
    let mut hit = false;
    for _ in 0..(12.0 / FRAME) as usize {
        level.update(FRAME).unwrap();
        attacked |= level.task_bot_state(bot) == Some(TaskBotStateKind::GroundAttack);
        hit |= level.player_state() == Some(PlayerBotStateKind::Hit);
    }

    assert!(attacked, "ground bot never charged");
    assert!(hit, "player was never hit");
    assert!(level.charge_percentage(level.player()).unwrap() < 1.0);
}

#[test]
fn test_missing_component_is_reported_not_skipped() {
    let mut level = Level::new(GameplayConfig::default(), &level_config(vec![bad_bot(Locomotion::Ground, Vec2::new(800.0, 800.0))])).unwrap();
    let player = level.player();
    level.world_mut().entity_mut(player).remove::<Animation>();

    // the player leaves Appear after half a second and needs its animation then
    let error = (0..60).find_map(|_| level.update(FRAME).err()).expect("update should fail");
    let SimError::MissingComponent { entity, component } = error;
    assert_eq!(entity, player);
    assert_eq!(component, "Animation");
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(42)]
fn test_random_play_keeps_every_bot_consistent(#[case] seed: u64) {
    let level_config = LevelConfig::from_ron_str(include_str!("../levels/demo.ron")).unwrap();
    let mut level = Level::new(GameplayConfig::default(), &level_config).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let events = [
        ControlInput::RelativeDisplacement(Vec2::new(1.0, 0.0)),
        ControlInput::RelativeDisplacement(Vec2::new(-1.0, 0.0)),
        ControlInput::RelativeDisplacement(Vec2::ZERO),
        ControlInput::RelativeAngularDisplacement(Vec2::new(0.0, 1.0)),
        ControlInput::RelativeAngularDisplacement(Vec2::ZERO),
        ControlInput::BeginAttack { allows_strafing: false },
        ControlInput::FinishAttack,
    ];

    for frame in 0..(30.0 / FRAME) as usize {
        if frame % 20 == 0 {
            level.handle_input(events[rng.gen_range(0..events.len())]).unwrap();
        }
        level.update(FRAME).unwrap();

        for &bot in level.task_bots() {
            let world = level.world();
            let locomotion = world.get::<TaskBot>(bot).unwrap().locomotion;
            let state = level.task_bot_state(bot).unwrap();
            assert!(state.is_declared_for(locomotion), "{locomotion:?} bot in {state:?}");

            let machine = &world.get::<TaskBotIntelligence>(bot).unwrap().machine;
            if let Some(previous) = machine.entered_from() {
                assert!(
                    TaskBotState::fresh(previous).is_valid_next_state(machine.kind()),
                    "{previous:?} -> {:?}",
                    machine.kind()
                );
            }

            let charge = world.get::<Charge>(bot).unwrap();
            assert!((0.0..=charge.maximum()).contains(&charge.charge()));
            // good bots are always drained
            if level.is_good(bot) == Some(true) {
                assert_eq!(charge.charge(), 0.0);
            }
        }
        let player_charge = level.world().get::<Charge>(level.player()).unwrap();
        assert!((0.0..=player_charge.maximum()).contains(&player_charge.charge()));
        if level.is_player_powered_down() {
            assert!(matches!(
                level.player_state(),
                Some(PlayerBotStateKind::Hit | PlayerBotStateKind::Recharging)
            ));
        }
    }
    assert!(level.elapsed() > 0.0);
}

#[test]
fn test_outcome_is_final() {
    let mut good = bad_bot(Locomotion::Ground, Vec2::new(300.0, 0.0));
    good.is_good = true;
    let mut level = Level::new(GameplayConfig::default(), &level_config(vec![good])).unwrap();

    level.update(FRAME).unwrap();
    assert_eq!(level.outcome(), LevelOutcome::Success);
    let elapsed = level.elapsed();
    run(&mut level, 1.0);
    assert_eq!(level.elapsed(), elapsed);
}
