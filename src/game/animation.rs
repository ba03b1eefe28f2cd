// Turns animation requests into the animation a renderer should show

use bevy_ecs::prelude::*;

use crate::engine::Orientation;
use crate::game::components::{Animation, CurrentAnimation};
use crate::game::error::SimResult;
use crate::game::level::Scene;
use crate::game::snapshot::FrameContext;

pub fn animation_system(scene: &mut Scene, frame: &mut FrameContext) -> SimResult<()> {
    let delta_time = frame.delta_time();
    for (mut animation, orientation) in scene
        .world
        .query::<(&mut Animation, &Orientation)>()
        .iter_mut(&mut scene.world)
    {
        advance(&mut animation, orientation, delta_time);
    }
    Ok(())
}

/// Consume the pending request. Re-requesting the running state keeps its clock.
fn advance(animation: &mut Animation, orientation: &Orientation, delta_time: f32) {
    let direction = orientation.compass_direction();
    let current = match (animation.requested.take(), animation.current) {
        (Some(state), Some(current)) if current.state == state => CurrentAnimation {
            direction,
            elapsed: current.elapsed + delta_time,
            ..current
        },
        (Some(state), _) => CurrentAnimation { state, direction, elapsed: 0.0 },
        (None, Some(current)) => CurrentAnimation {
            elapsed: current.elapsed + delta_time,
            ..current
        },
        (None, None) => return,
    };
    animation.current = Some(current);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CompassDirection;
    use crate::game::components::AnimationState;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_request_becomes_current_with_direction() {
        let mut animation = Animation::requesting(AnimationState::WalkForward);
        advance(&mut animation, &Orientation::new(FRAC_PI_2), 0.1);

        assert_eq!(animation.requested, None);
        let current = animation.current.unwrap();
        assert_eq!(current.state, AnimationState::WalkForward);
        assert_eq!(current.direction, CompassDirection::North);
        assert_eq!(current.elapsed, 0.0);
    }

    #[test]
    fn test_new_state_restarts_clock() {
        let mut animation = Animation::requesting(AnimationState::Idle);
        let orientation = Orientation::new(0.0);
        advance(&mut animation, &orientation, 0.1);
        advance(&mut animation, &orientation, 0.1);
        assert!(animation.current.unwrap().elapsed > 0.0);

        animation.requested = Some(AnimationState::Zapped);
        advance(&mut animation, &orientation, 0.1);
        assert_eq!(animation.current.unwrap().state, AnimationState::Zapped);
        assert_eq!(animation.current.unwrap().elapsed, 0.0);
    }
}
