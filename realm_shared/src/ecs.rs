//! Entity/component storage (minimal ECS).
//!
//! Each loaded world owns one `EntityStore`. It is not archetype-based;
//! components live in typed storages keyed by entity id, and iteration order
//! follows entity id so per-tick updates are stable.

use std::{
    any::{Any, TypeId},
    collections::{BTreeMap, BTreeSet, HashMap},
};

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Opaque entity id, unique within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

trait ComponentStorage: Send + Sync {
    fn remove(&mut self, entity: EntityId);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static + Send + Sync> ComponentStorage for BTreeMap<EntityId, T> {
    fn remove(&mut self, entity: EntityId) {
        BTreeMap::remove(self, &entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Entities and their typed components.
#[derive(Default)]
pub struct EntityStore {
    next_id: u64,
    alive: BTreeSet<EntityId>,
    storages: HashMap<TypeId, Box<dyn ComponentStorage>>,
}

impl EntityStore {
    /// Creates a new entity.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.alive.insert(id);
        id
    }

    /// Removes an entity and all of its components. Returns false if it was not alive.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        if !self.alive.remove(&entity) {
            return false;
        }
        for storage in self.storages.values_mut() {
            storage.remove(entity);
        }
        true
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.alive.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.alive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Drops every entity. Ids are not reused.
    pub fn clear(&mut self) {
        self.alive.clear();
        self.storages.clear();
    }

    /// Inserts/replaces a component for a live entity.
    pub fn insert<T: 'static + Send + Sync>(&mut self, entity: EntityId, component: T) {
        if !self.alive.contains(&entity) {
            return;
        }
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(BTreeMap::<EntityId, T>::new()));

        let storage = storage
            .as_any_mut()
            .downcast_mut::<BTreeMap<EntityId, T>>()
            .expect("storage type mismatch");

        storage.insert(entity, component);
    }

    /// Gets a component reference.
    pub fn get<T: 'static + Send + Sync>(&self, entity: EntityId) -> Option<&T> {
        self.storage::<T>().and_then(|storage| storage.get(&entity))
    }

    /// Gets a mutable component reference.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.storage_mut::<T>()
            .and_then(|storage| storage.get_mut(&entity))
    }

    /// Iterates entities with a given component, in id order.
    pub fn iter<T: 'static + Send + Sync>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.storage::<T>()
            .into_iter()
            .flat_map(|storage| storage.iter().map(|(k, v)| (*k, v)))
    }

    /// Mutably iterates entities with a given component, in id order.
    pub fn iter_mut<T: 'static + Send + Sync>(
        &mut self,
    ) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.storage_mut::<T>()
            .into_iter()
            .flat_map(|storage| storage.iter_mut().map(|(k, v)| (*k, v)))
    }

    /// Applies every entity's velocity to its position, scaled by `dt_sec`.
    pub fn integrate_motion(&mut self, dt_sec: f32) {
        let velocities: Vec<(EntityId, Velocity)> =
            self.iter::<Velocity>().map(|(id, v)| (id, *v)).collect();
        for (id, vel) in velocities {
            if let Some(pos) = self.get_mut::<Position>(id) {
                pos.0.x += vel.0.x * dt_sec;
                pos.0.y += vel.0.y * dt_sec;
                pos.0.z += vel.0.z * dt_sec;
            }
        }
    }

    fn storage<T: 'static + Send + Sync>(&self) -> Option<&BTreeMap<EntityId, T>> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.as_any().downcast_ref::<BTreeMap<EntityId, T>>())
    }

    fn storage_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut BTreeMap<EntityId, T>> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.as_any_mut().downcast_mut::<BTreeMap<EntityId, T>>())
    }
}

/// Common component: position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position(pub Vec3);

/// Common component: velocity in blocks per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Velocity(pub Vec3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn despawn_drops_components() {
        let mut store = EntityStore::default();
        let e = store.spawn();
        store.insert(e, Position(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(store.get::<Position>(e).unwrap().0.x, 1.0);

        assert!(store.despawn(e));
        assert!(store.get::<Position>(e).is_none());
        assert!(!store.despawn(e));
        assert!(store.is_empty());
    }

    #[test]
    fn motion_is_integrated_for_moving_entities_only() {
        let mut store = EntityStore::default();
        let moving = store.spawn();
        let still = store.spawn();
        store.insert(moving, Position(Vec3::ZERO));
        store.insert(moving, Velocity(Vec3::new(2.0, 0.0, -4.0)));
        store.insert(still, Position(Vec3::new(5.0, 5.0, 5.0)));

        store.integrate_motion(0.5);

        assert_eq!(store.get::<Position>(moving).unwrap().0, Vec3::new(1.0, 0.0, -2.0));
        assert_eq!(store.get::<Position>(still).unwrap().0, Vec3::new(5.0, 5.0, 5.0));
    }
}
