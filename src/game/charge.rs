// Charge loss and its consequences
//
// Every drain goes through `apply_charge_loss` so the owner can react:
// TaskBots may flip alignment or get zapped, the player gets hit or powers down.

use bevy_ecs::prelude::*;
use log::debug;

use crate::game::components::{Charge, Locomotion, PlayerBot, TaskBot};
use crate::game::error::{SimResult, WorldExt};
use crate::game::level::Scene;
use crate::game::playerbot;
use crate::game::snapshot::FrameContext;
use crate::game::states::{PlayerBotStateKind, TaskBotStateKind};
use crate::game::taskbot;

/// Drain `amount` from `entity` and run its reaction.
pub fn apply_charge_loss(scene: &mut Scene, frame: &mut FrameContext, entity: Entity, amount: f32) -> SimResult<()> {
    let has_charge = {
        let mut charge = scene.world.require_mut::<Charge>(entity)?;
        charge.lose_charge(amount);
        charge.has_charge()
    };

    if scene.world.get::<PlayerBot>(entity).is_some() {
        if has_charge {
            playerbot::enter_state(scene, entity, PlayerBotStateKind::Hit)?;
        } else {
            scene.world.require_mut::<PlayerBot>(entity)?.is_powered_down = true;
            debug!("player {entity}: powered down");
            playerbot::enter_state(scene, entity, PlayerBotStateKind::Recharging)?;
        }
        return Ok(());
    }

    match scene.world.require::<TaskBot>(entity)?.locomotion {
        Locomotion::Ground => {
            taskbot::set_good(scene, frame, entity, !has_charge)?;
            if !scene.world.require::<TaskBot>(entity)?.is_good {
                taskbot::enter_state(scene, frame, entity, TaskBotStateKind::Zapped)?;
            }
        }
        Locomotion::Flying => {
            taskbot::enter_state(scene, frame, entity, TaskBotStateKind::Zapped)?;
            taskbot::set_good(scene, frame, entity, !has_charge)?;
        }
    }
    Ok(())
}

/// Ease every displayed charge bar toward its real level.
pub fn charge_system(scene: &mut Scene, frame: &mut FrameContext) -> SimResult<()> {
    let duration = scene.config.simulation.charge_bar_update_duration;
    let step = if duration > 0.0 { frame.delta_time() / duration } else { 1.0 };
    for mut charge in scene.world.query::<&mut Charge>().iter_mut(&mut scene.world) {
        charge.ease_display(step);
    }
    Ok(())
}
