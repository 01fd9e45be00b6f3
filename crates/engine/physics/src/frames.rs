//! World, local and storage frames of one grid
//!
//! - **World**: the host's global space.
//! - **Local**: integer voxel coordinates of the grid, rotating and
//!   translating with it. local→world is `rotation * local + position`,
//!   where `position` is the world placement of local (0,0,0). The rigid
//!   body itself sits on the centroid.
//! - **Storage**: `local + center_offset + region_origin`, where the grid's
//!   voxels are persisted like ordinary world voxels.

use crate::aabb::Aabb;
use crate::math::{from_point, from_vector, to_isometry, to_point, to_vector};
use crate::region::StorageRegion;
use crate::shape::LocalBounds;
use crate::transform::GridTransform;
use glam::{IVec3, Vec3};
use rapier3d::prelude::*;

/// A ray or segment hit against a grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRayHit {
    /// World-space hit point
    pub point: Vec3,
    /// World-space surface normal
    pub normal: Vec3,
    /// Position along the segment in [0, 1]
    pub fraction: f32,
}

/// Frame data of one grid at one instant
///
/// Built from the live body under the simulation lock and then used without
/// it; it does not follow the body after creation.
#[derive(Clone)]
pub struct GridFrame {
    /// Pose of local (0,0,0)
    transform: GridTransform,
    centroid: Vec3,
    bounds: LocalBounds,
    region: StorageRegion,
    shape: SharedShape,
}

impl GridFrame {
    /// Frame around a body pose
    ///
    /// `body` is the live body pose, whose origin sits on `centroid`.
    pub fn new(
        body: GridTransform,
        centroid: Vec3,
        bounds: LocalBounds,
        region: StorageRegion,
        shape: SharedShape,
    ) -> Self {
        Self {
            transform: GridTransform::new(body.position - body.rotation * centroid, body.rotation),
            centroid,
            bounds,
            region,
            shape,
        }
    }

    /// Pose of local (0,0,0), the pose published for presentation
    pub fn transform(&self) -> GridTransform {
        self.transform
    }

    /// World position of the centroid, where the rigid body sits
    pub fn body_position(&self) -> Vec3 {
        self.local_to_world(self.centroid)
    }

    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    pub fn region(&self) -> &StorageRegion {
        &self.region
    }

    pub fn local_to_world(&self, local: Vec3) -> Vec3 {
        self.transform.rotation * local + self.transform.position
    }

    pub fn world_to_local(&self, world: Vec3) -> Vec3 {
        self.transform.rotation.inverse() * (world - self.transform.position)
    }

    pub fn local_to_storage(&self, local: IVec3) -> IVec3 {
        self.region.local_to_storage(local)
    }

    pub fn storage_to_local(&self, storage: IVec3) -> IVec3 {
        self.region.storage_to_local(storage)
    }

    /// Storage cell holding the world point
    pub fn world_to_storage(&self, world: Vec3) -> IVec3 {
        self.local_to_storage(self.local_cell(world))
    }

    /// World position of a storage cell's minimum corner
    pub fn storage_to_world(&self, storage: IVec3) -> Vec3 {
        self.local_to_world(self.storage_to_local(storage).as_vec3())
    }

    /// Local voxel cell containing the world point
    pub fn local_cell(&self, world: Vec3) -> IVec3 {
        self.world_to_local(world).floor().as_ivec3()
    }

    /// World position of the centre of a local voxel
    pub fn voxel_center(&self, local: IVec3) -> Vec3 {
        self.local_to_world(local.as_vec3() + Vec3::splat(0.5))
    }

    /// World-space AABB of the rotated voxel bounds
    pub fn world_aabb(&self) -> Aabb {
        self.bounds.to_aabb().transformed(|corner| self.local_to_world(corner))
    }

    /// Whether the world point lies inside the grid's collision shape
    ///
    /// Tests the world AABB first; most queried points are rejected there.
    pub fn contains_world_point(&self, world: Vec3) -> bool {
        if !self.world_aabb().contains_point(world) {
            return false;
        }
        self.shape.contains_point(&self.isometry(), &to_point(world))
    }

    /// Cast the segment `origin → end` against the collision shape
    pub fn raycast(&self, origin: Vec3, end: Vec3) -> Option<GridRayHit> {
        let direction = end - origin;
        if direction.length_squared() <= f32::EPSILON {
            return None;
        }

        let segment = Aabb::new(origin.min(end), origin.max(end));
        if !segment.intersects(&self.world_aabb()) {
            return None;
        }

        let ray = Ray::new(to_point(origin), to_vector(direction));
        let hit = self
            .shape
            .cast_ray_and_get_normal(&self.isometry(), &ray, 1.0, true)?;
        Some(GridRayHit {
            point: from_point(&ray.point_at(hit.time_of_impact)),
            normal: from_vector(&hit.normal),
            fraction: hit.time_of_impact,
        })
    }

    fn isometry(&self) -> Isometry<Real> {
        to_isometry(self.body_position(), self.transform.rotation)
    }
}
