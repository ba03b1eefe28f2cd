// Error types for the simulation core
// Degraded outcomes (no path, no target, refused transition) are not errors

use std::path::PathBuf;

use bevy_ecs::prelude::*;
use bevy_ecs::world::Mut;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// An entity's logic needed a component the entity was spawned without.
    #[error("entity {entity} is missing required component `{component}`")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },
}

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn missing<T: Component>(entity: Entity) -> SimError {
    let full = std::any::type_name::<T>();
    SimError::MissingComponent {
        entity,
        component: full.rsplit("::").next().unwrap_or(full),
    }
}

/// Fail-fast component access.
pub trait WorldExt {
    fn require<T: Component>(&self, entity: Entity) -> SimResult<&T>;
    fn require_mut<T: Component>(&mut self, entity: Entity) -> SimResult<Mut<'_, T>>;
}

impl WorldExt for World {
    fn require<T: Component>(&self, entity: Entity) -> SimResult<&T> {
        self.get::<T>(entity).ok_or_else(|| missing::<T>(entity))
    }

    fn require_mut<T: Component>(&mut self, entity: Entity) -> SimResult<Mut<'_, T>> {
        self.get_mut::<T>(entity).ok_or_else(|| missing::<T>(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Transform;

    #[test]
    fn test_missing_component_names_the_type() {
        let mut world = World::new();
        let entity = world.spawn_empty().id();
        let err = world.require::<Transform>(entity).unwrap_err();
        let SimError::MissingComponent { component, .. } = &err;
        assert_eq!(*component, "Transform");
        assert!(err.to_string().contains("Transform"));
    }

    #[test]
    fn test_require_mut_reaches_component() {
        let mut world = World::new();
        let entity = world.spawn(Transform::default()).id();
        world.require_mut::<Transform>(entity).unwrap().position.x = 4.0;
        assert_eq!(world.require::<Transform>(entity).unwrap().position.x, 4.0);
    }
}
