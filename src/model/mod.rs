//! Model transcoder (spec §4.2): MLOD read, LOD classification/model-info
//! synthesis, ODOL conversion, buoyancy, and ODOL write, grounded in
//! `p3d.h`/`p3d.cpp`.

mod buoyancy;
mod lod;
mod material;
mod mlod;
mod odol;

pub use buoyancy::{generate_buoyancy, BuoyancyData};
pub use lod::{classify_lods, synthesize_model_info, ModelInfo, SpecialLods};
pub use material::{LightMode, FogMode, Material, StageTexture, StageTransform, UvSource};
pub use mlod::{read_mlod, MlodFace, MlodLod, MlodModel, MlodPoint, Selection, Tag};
pub use odol::{convert_lod, write_odol, OdolFace, OdolLod, OdolProxy, OdolSection, OdolSelection};

/// A plain 3-component vector, used throughout the transcoder in place of
/// the original tool's hand-rolled `vector3`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, o: Vec3) -> f32 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    pub fn cross(self, o: Vec3) -> Vec3 {
        Vec3::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    pub fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }

    pub fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }

    pub fn scale(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn normalize(self) -> Vec3 {
        let len = self.length();
        if len <= f32::EPSILON {
            Vec3::ZERO
        } else {
            self.scale(1.0 / len)
        }
    }

    pub fn min(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x.min(o.x), self.y.min(o.y), self.z.min(o.z))
    }

    pub fn max(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x.max(o.x), self.y.max(o.y), self.z.max(o.z))
    }
}

/// An axis-aligned bounding box, `min`/`max` inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = BoundingBox { min: first, max: first };
        for p in iter {
            bbox.min = bbox.min.min(p);
            bbox.max = bbox.max.max(p);
        }
        Some(bbox)
    }

    pub fn autocenter(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }

    pub fn extents(&self) -> Vec3 {
        self.max.sub(self.min)
    }
}
