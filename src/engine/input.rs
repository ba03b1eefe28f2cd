// Keyboard and mouse control source
// Translates winit events into abstract control events for the simulation core

use std::collections::HashSet;

use glam::Vec2;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Device-independent control events consumed by the player's input component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlInput {
    /// Absolute displacement, up is (0, 1).
    Displacement(Vec2),
    /// Absolute facing request.
    AngularDisplacement(Vec2),
    /// Forward (1, 0) or backward (-1, 0) relative to the current heading.
    RelativeDisplacement(Vec2),
    /// Counter-clockwise when y > 0, clockwise when y < 0.
    RelativeAngularDisplacement(Vec2),
    BeginAttack { allows_strafing: bool },
    FinishAttack,
}

const FORWARD: Vec2 = Vec2::new(1.0, 0.0);
const BACKWARD: Vec2 = Vec2::new(-1.0, 0.0);
const CLOCKWISE: Vec2 = Vec2::new(0.0, -1.0);
const COUNTER_CLOCKWISE: Vec2 = Vec2::new(0.0, 1.0);

pub struct KeyboardControlInput {
    keys_held: HashSet<KeyCode>,
    current_displacement: Vec2,
}

impl Default for KeyboardControlInput {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardControlInput {
    /// Keyboard players steer by rotating, so the beam never locks facing.
    pub const ALLOWS_STRAFING: bool = false;

    pub fn new() -> Self {
        Self {
            keys_held: HashSet::new(),
            current_displacement: Vec2::ZERO,
        }
    }

    /// Feed a winit WindowEvent. Returns the control event it produced, if any.
    pub fn process_event(&mut self, event: &WindowEvent) -> Option<ControlInput> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return None;
                };
                match event.state {
                    ElementState::Pressed => self.key_pressed(key),
                    ElementState::Released => self.key_released(key),
                }
            }
            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => match state {
                ElementState::Pressed => Some(ControlInput::BeginAttack {
                    allows_strafing: Self::ALLOWS_STRAFING,
                }),
                ElementState::Released => Some(ControlInput::FinishAttack),
            },
            _ => None,
        }
    }

    pub fn key_pressed(&mut self, key: KeyCode) -> Option<ControlInput> {
        // OS key repeat
        if !self.keys_held.insert(key) {
            return None;
        }
        if let Some(relative) = relative_displacement(key) {
            self.current_displacement += relative;
            return Some(self.displacement_event(relative));
        }
        is_attack_key(key).then_some(ControlInput::BeginAttack {
            allows_strafing: Self::ALLOWS_STRAFING,
        })
    }

    pub fn key_released(&mut self, key: KeyCode) -> Option<ControlInput> {
        if !self.keys_held.remove(&key) {
            return None;
        }
        if let Some(relative) = relative_displacement(key) {
            self.current_displacement -= relative;
            if self.keys_held.is_empty() {
                self.current_displacement = Vec2::ZERO;
            }
            return Some(self.displacement_event(relative));
        }
        is_attack_key(key).then_some(ControlInput::FinishAttack)
    }

    /// Drop all held keys, e.g. on focus loss.
    pub fn reset(&mut self) -> [ControlInput; 2] {
        self.keys_held.clear();
        self.current_displacement = Vec2::ZERO;
        [
            ControlInput::RelativeDisplacement(Vec2::ZERO),
            ControlInput::RelativeAngularDisplacement(Vec2::ZERO),
        ]
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    fn displacement_event(&self, changed: Vec2) -> ControlInput {
        if changed == FORWARD || changed == BACKWARD {
            ControlInput::RelativeDisplacement(self.current_displacement)
        } else {
            ControlInput::RelativeAngularDisplacement(self.current_displacement)
        }
    }
}

fn relative_displacement(key: KeyCode) -> Option<Vec2> {
    match key {
        KeyCode::KeyW | KeyCode::ArrowUp => Some(FORWARD),
        KeyCode::KeyS | KeyCode::ArrowDown => Some(BACKWARD),
        KeyCode::KeyA | KeyCode::ArrowLeft => Some(COUNTER_CLOCKWISE),
        KeyCode::KeyD | KeyCode::ArrowRight => Some(CLOCKWISE),
        _ => None,
    }
}

fn is_attack_key(key: KeyCode) -> bool {
    matches!(key, KeyCode::KeyF | KeyCode::Space | KeyCode::Enter)
}
