// Engine-level systems that do not depend on game rules
// Currently: circle-vs-circle contact tracking for physics bodies

use std::collections::HashSet;

use bevy_ecs::prelude::*;

use super::components::*;

/// Unordered pair of entities in contact, stored lowest id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactPair(Entity, Entity);

impl ContactPair {
    pub fn new(a: Entity, b: Entity) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    pub fn entities(&self) -> (Entity, Entity) {
        (self.0, self.1)
    }

    pub fn involves(&self, entity: Entity) -> bool {
        self.0 == entity || self.1 == entity
    }

    /// The other half of the pair, if `entity` is part of it.
    pub fn other(&self, entity: Entity) -> Option<Entity> {
        if self.0 == entity {
            Some(self.1)
        } else if self.1 == entity {
            Some(self.0)
        } else {
            None
        }
    }
}

/// Contacts that persist across frames, so begin events fire once.
#[derive(Debug, Default, Clone)]
pub struct ContactSet {
    current: HashSet<ContactPair>,
}

impl ContactSet {
    pub fn contains(&self, pair: ContactPair) -> bool {
        self.current.contains(&pair)
    }

    /// Every entity currently touching `entity`.
    pub fn touching(&self, entity: Entity) -> Vec<Entity> {
        self.current.iter().filter_map(|pair| pair.other(entity)).collect()
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Replace the tracked contacts and return the pairs that just began.
    pub fn refresh(&mut self, now: HashSet<ContactPair>) -> Vec<ContactPair> {
        let mut began: Vec<ContactPair> = now.difference(&self.current).copied().collect();
        began.sort_by_key(|pair| pair.entities());
        self.current = now;
        began
    }
}

/// Detect overlapping physics bodies.
/// Brute force pairs; levels hold a handful of bots.
pub fn detect_contacts(world: &mut World) -> HashSet<ContactPair> {
    let mut query = world.query::<(Entity, &Transform, &PhysicsBody)>();
    let bodies: Vec<(Entity, glam::Vec2, f32)> = query
        .iter(world)
        .map(|(entity, transform, body)| (entity, body.center(transform), body.radius))
        .collect();

    let mut contacts = HashSet::new();
    for (i, (a, a_center, a_radius)) in bodies.iter().enumerate() {
        for (b, b_center, b_radius) in &bodies[i + 1..] {
            if a_center.distance(*b_center) < a_radius + b_radius {
                contacts.insert(ContactPair::new(*a, *b));
            }
        }
    }
    contacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn spawn_body(world: &mut World, position: Vec2) -> Entity {
        world
            .spawn((
                Transform::from_position(position),
                PhysicsBody { radius: 10.0, offset: Vec2::new(0.0, -5.0) },
            ))
            .id()
    }

    #[test]
    fn test_detects_overlapping_bodies() {
        let mut world = World::new();
        let a = spawn_body(&mut world, Vec2::ZERO);
        let b = spawn_body(&mut world, Vec2::new(15.0, 0.0));
        let _far = spawn_body(&mut world, Vec2::new(100.0, 0.0));

        let contacts = detect_contacts(&mut world);
        assert_eq!(contacts.len(), 1);
        assert!(contacts.contains(&ContactPair::new(b, a)));
    }

    #[test]
    fn test_refresh_reports_only_new_pairs() {
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);
        let c = Entity::from_raw(3);
        let mut set = ContactSet::default();

        let began = set.refresh(HashSet::from([ContactPair::new(a, b)]));
        assert_eq!(began, vec![ContactPair::new(a, b)]);

        let began = set.refresh(HashSet::from([ContactPair::new(a, b), ContactPair::new(c, a)]));
        assert_eq!(began, vec![ContactPair::new(a, c)]);
        assert_eq!(set.touching(a).len(), 2);
        assert!(set.contains(ContactPair::new(b, a)));
    }
}
