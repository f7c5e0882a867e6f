// src/scene/registry.rs
// In-memory object arena implementing SceneQuery

use super::{Capabilities, ObjectId, ObjectRecord, SceneQuery};

/// Slot arena with id reuse through a free list
#[derive(Debug, Default)]
pub struct Scene {
    slots: Vec<Option<ObjectRecord>>,
    free: Vec<u32>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, record: ObjectRecord) -> ObjectId {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(record);
            return ObjectId(index);
        }
        self.slots.push(Some(record));
        ObjectId(self.slots.len() as u32 - 1)
    }

    pub fn despawn(&mut self, id: ObjectId) -> Option<ObjectRecord> {
        let taken = self.slots.get_mut(id.index())?.take();
        if taken.is_some() {
            self.free.push(id.0);
        }
        taken
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SceneQuery for Scene {
    fn query(&self, required: Capabilities) -> Vec<ObjectId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Some(r) if r.capabilities().contains(required) => Some(ObjectId(i as u32)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    fn record_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::ShadingClass;
    use crate::scene::{Material, ShadowCaster, Transform};
    use glam::Vec3;

    #[test]
    fn query_filters_by_capability() {
        let mut scene = Scene::new();
        let a = scene.spawn(ObjectRecord::new().with(Transform::default()));
        let b = scene.spawn(
            ObjectRecord::new()
                .with(Transform::default())
                .with(ShadowCaster(true)),
        );
        assert_eq!(scene.query(Capabilities::TRANSFORM), vec![a, b]);
        assert_eq!(scene.query(Capabilities::SHADOW_CASTER), vec![b]);
        assert_eq!(scene.query_component::<ShadowCaster>(), vec![b]);
    }

    #[test]
    fn despawned_ids_are_reused() {
        let mut scene = Scene::new();
        let a = scene.spawn(ObjectRecord::new());
        let _b = scene.spawn(ObjectRecord::new());
        assert!(scene.despawn(a).is_some());
        assert!(scene.despawn(a).is_none());
        assert!(scene.record(a).is_none());
        let c = scene.spawn(ObjectRecord::new());
        assert_eq!(c, a);
        assert_eq!(scene.len(), 2);
    }

    #[test]
    fn typed_read_write() {
        let mut scene = Scene::new();
        let id = scene.spawn(ObjectRecord::new());
        assert!(scene.read::<Material>(id).is_none());
        assert!(scene.write(id, Material::new(Vec3::X, 4.0)));
        assert!(scene.write(id, ShadingClass::Flat));
        assert_eq!(scene.read::<Material>(id).map(|m| m.shininess), Some(4.0));
        assert_eq!(scene.read::<ShadingClass>(id), Some(ShadingClass::Flat));
        assert!(!scene.write(ObjectId(99), ShadingClass::Flat));
    }
}
