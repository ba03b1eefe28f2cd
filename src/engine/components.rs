// Core ECS components shared by every bot in a level
// Positions are in level points, y up, rotations in radians counter-clockwise from +x

use std::f32::consts::TAU;

use bevy_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// World position of an entity's render node.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec2) -> Self {
        Self { position }
    }
}

// ============================================================================
// ORIENTATION
// ============================================================================

/// Sixteen-point compass used to pick an animation direction.
/// Listed counter-clockwise starting at east, matching `zRotation == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompassDirection {
    #[default]
    East,
    EastByNorthEast,
    NorthEast,
    NorthByNorthEast,
    North,
    NorthByNorthWest,
    NorthWest,
    WestByNorthWest,
    West,
    WestBySouthWest,
    SouthWest,
    SouthBySouthWest,
    South,
    SouthBySouthEast,
    SouthEast,
    EastBySouthEast,
}

impl CompassDirection {
    pub const ALL: [CompassDirection; 16] = [
        CompassDirection::East,
        CompassDirection::EastByNorthEast,
        CompassDirection::NorthEast,
        CompassDirection::NorthByNorthEast,
        CompassDirection::North,
        CompassDirection::NorthByNorthWest,
        CompassDirection::NorthWest,
        CompassDirection::WestByNorthWest,
        CompassDirection::West,
        CompassDirection::WestBySouthWest,
        CompassDirection::SouthWest,
        CompassDirection::SouthBySouthWest,
        CompassDirection::South,
        CompassDirection::SouthBySouthEast,
        CompassDirection::SouthEast,
        CompassDirection::EastBySouthEast,
    ];

    /// Bucket an arbitrary rotation into the nearest compass point.
    pub fn from_rotation(z_rotation: f32) -> Self {
        let normalized = z_rotation.rem_euclid(TAU) / TAU;
        let index = (normalized * 16.0).round() as usize % 16;
        Self::ALL[index]
    }

    pub fn z_rotation(self) -> f32 {
        (self as usize) as f32 / 16.0 * TAU
    }
}

/// Heading of an entity, always kept in `[0, 2π)`.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct Orientation {
    z_rotation: f32,
}

impl Orientation {
    pub fn new(z_rotation: f32) -> Self {
        let mut orientation = Self::default();
        orientation.set_z_rotation(z_rotation);
        orientation
    }

    pub fn from_compass(direction: CompassDirection) -> Self {
        Self::new(direction.z_rotation())
    }

    pub fn z_rotation(&self) -> f32 {
        self.z_rotation
    }

    pub fn set_z_rotation(&mut self, z_rotation: f32) {
        let wrapped = z_rotation.rem_euclid(TAU);
        // rem_euclid can round up to exactly TAU for tiny negative inputs
        self.z_rotation = if wrapped >= TAU { 0.0 } else { wrapped };
    }

    pub fn compass_direction(&self) -> CompassDirection {
        CompassDirection::from_rotation(self.z_rotation)
    }

    /// Unit vector pointing along the heading.
    pub fn facing(&self) -> Vec2 {
        Vec2::from_angle(self.z_rotation)
    }
}

/// Circular physics body used for contact detection.
/// `offset` is measured from the render node's position.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct PhysicsBody {
    pub radius: f32,
    pub offset: Vec2,
}

impl PhysicsBody {
    pub fn center(&self, transform: &Transform) -> Vec2 {
        transform.position + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_orientation_wraps_into_range() {
        let orientation = Orientation::new(-FRAC_PI_2);
        assert_relative_eq!(orientation.z_rotation(), 3.0 * FRAC_PI_2, epsilon = 1e-5);

        let orientation = Orientation::new(5.0 * PI);
        assert_relative_eq!(orientation.z_rotation(), PI, epsilon = 1e-5);

        let orientation = Orientation::new(-1e-9);
        assert!(orientation.z_rotation() < TAU);
    }

    #[test]
    fn test_compass_buckets() {
        assert_eq!(CompassDirection::from_rotation(0.0), CompassDirection::East);
        assert_eq!(CompassDirection::from_rotation(FRAC_PI_2), CompassDirection::North);
        assert_eq!(CompassDirection::from_rotation(PI), CompassDirection::West);
        assert_eq!(CompassDirection::from_rotation(-FRAC_PI_2), CompassDirection::South);
        // just under a full turn rounds back to east
        assert_eq!(CompassDirection::from_rotation(TAU - 0.01), CompassDirection::East);
    }

    #[test]
    fn test_compass_round_trips_its_own_rotation() {
        for direction in CompassDirection::ALL {
            assert_eq!(CompassDirection::from_rotation(direction.z_rotation()), direction);
        }
    }
}
