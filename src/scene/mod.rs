//! Scene access for the frame pipeline.
//!
//! Objects are dense [`ObjectId`]s into a fixed capability record. The passes
//! only talk to the [`SceneQuery`] trait; [`Scene`] is the in-memory
//! implementation used by the binaries and tests.

pub mod registry;
pub mod transform;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

use crate::core::backend::MeshId;
use crate::core::state::ShadingClass;
use crate::lighting::light::Light;

pub use registry::Scene;
pub use transform::Transform;

/// Dense object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Component presence mask used to filter queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const TRANSFORM: Capabilities = Capabilities(1 << 0);
    pub const MESH: Capabilities = Capabilities(1 << 1);
    pub const MATERIAL: Capabilities = Capabilities(1 << 2);
    pub const LIGHT: Capabilities = Capabilities(1 << 3);
    pub const SHADING: Capabilities = Capabilities(1 << 4);
    pub const SHADOW_CASTER: Capabilities = Capabilities(1 << 5);

    pub fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

/// GPU mesh reference plus the object-space bounding radius of its vertices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshHandle {
    pub mesh: MeshId,
    pub bounding_radius: f32,
}

/// Diffuse colour and Blinn-Phong exponent (0..=128, 0 disables specular)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub diffuse: Vec3,
    pub shininess: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec3::splat(0.8),
            shininess: 16.0,
        }
    }
}

impl Material {
    pub fn new(diffuse: Vec3, shininess: f32) -> Self {
        Self { diffuse, shininess }
    }
}

/// Whether the object is drawn into the shadow atlas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowCaster(pub bool);

/// Fixed per-object component record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectRecord {
    pub transform: Option<Transform>,
    pub mesh: Option<MeshHandle>,
    pub material: Option<Material>,
    pub light: Option<Light>,
    pub shading: Option<ShadingClass>,
    pub shadow_caster: Option<ShadowCaster>,
}

impl ObjectRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Component>(mut self, value: T) -> Self {
        *T::slot_mut(&mut self) = Some(value);
        self
    }

    pub fn has<T: Component>(&self) -> bool {
        T::slot(self).is_some()
    }

    pub fn capabilities(&self) -> Capabilities {
        fn flag<T: Component>(record: &ObjectRecord) -> Capabilities {
            if record.has::<T>() {
                T::CAPABILITY
            } else {
                Capabilities::NONE
            }
        }
        flag::<Transform>(self)
            | flag::<MeshHandle>(self)
            | flag::<Material>(self)
            | flag::<Light>(self)
            | flag::<ShadingClass>(self)
            | flag::<ShadowCaster>(self)
    }
}

/// A typed slot of [`ObjectRecord`]
pub trait Component: Clone + Sized {
    const CAPABILITY: Capabilities;

    fn slot(record: &ObjectRecord) -> &Option<Self>;
    fn slot_mut(record: &mut ObjectRecord) -> &mut Option<Self>;
}

macro_rules! impl_component {
    ($ty:ty, $field:ident, $cap:ident) => {
        impl Component for $ty {
            const CAPABILITY: Capabilities = Capabilities::$cap;

            fn slot(record: &ObjectRecord) -> &Option<Self> {
                &record.$field
            }

            fn slot_mut(record: &mut ObjectRecord) -> &mut Option<Self> {
                &mut record.$field
            }
        }
    };
}

impl_component!(Transform, transform, TRANSFORM);
impl_component!(MeshHandle, mesh, MESH);
impl_component!(Material, material, MATERIAL);
impl_component!(Light, light, LIGHT);
impl_component!(ShadingClass, shading, SHADING);
impl_component!(ShadowCaster, shadow_caster, SHADOW_CASTER);

/// Capability-filtered iteration and typed per-object access
pub trait SceneQuery {
    /// Ids of live objects carrying every capability in `required`, ascending
    fn query(&self, required: Capabilities) -> Vec<ObjectId>;

    fn record(&self, id: ObjectId) -> Option<&ObjectRecord>;

    fn record_mut(&mut self, id: ObjectId) -> Option<&mut ObjectRecord>;

    /// Ids of live objects carrying component `T`
    fn query_component<T: Component>(&self) -> Vec<ObjectId>
    where
        Self: Sized,
    {
        self.query(T::CAPABILITY)
    }

    fn read<T: Component>(&self, id: ObjectId) -> Option<T>
    where
        Self: Sized,
    {
        self.record(id).and_then(|r| T::slot(r).clone())
    }

    /// Returns false when `id` does not name a live object.
    fn write<T: Component>(&mut self, id: ObjectId, value: T) -> bool
    where
        Self: Sized,
    {
        match self.record_mut(id) {
            Some(record) => {
                *T::slot_mut(record) = Some(value);
                true
            }
            None => false,
        }
    }
}
