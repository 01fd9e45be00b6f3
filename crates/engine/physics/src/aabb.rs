//! Axis-aligned bounding boxes in glam types

use glam::{IVec3, Vec3};

/// Axis-Aligned Bounding Box
///
/// Represents a box aligned to the world coordinate axes. All corners are axis-aligned,
/// making intersection tests simple min/max comparisons.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Transform a local box into world space
    ///
    /// Each corner is mapped through `transform`; the result is the tight AABB
    /// around the rotated box (OBB → AABB), so it may be larger than the input.
    pub fn transformed(&self, transform: impl Fn(Vec3) -> Vec3) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut world_min = Vec3::splat(f32::MAX);
        let mut world_max = Vec3::splat(f32::MIN);

        for corner in corners {
            let world_corner = transform(corner);
            world_min = world_min.min(world_corner);
            world_max = world_max.max(world_corner);
        }

        Self {
            min: world_min,
            max: world_max,
        }
    }

    /// Test intersection with another AABB (touching counts)
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Check if a point is inside the AABB
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Integer cells of edge `cell_size` overlapped by this box (inclusive range)
    pub fn cell_range(&self, cell_size: i32) -> (IVec3, IVec3) {
        let size = cell_size.max(1) as f32;
        let min = (self.min / size).floor().as_ivec3();
        let max = (self.max / size).floor().as_ivec3();
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_transformed_translation_only() {
        let local = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let world = local.transformed(|corner| corner + Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(world.min, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(world.max, Vec3::new(11.0, 1.0, 1.0));
    }

    #[test]
    fn test_transformed_rotation_grows_box() {
        let local = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let rotated = local.transformed(|corner| rotation * corner);
        let half_diagonal = 0.5 * std::f32::consts::SQRT_2;
        assert!((rotated.max.x - half_diagonal).abs() < 1e-5);
        assert!((rotated.max.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_intersects_and_contains() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(1.0), Vec3::splat(2.0));
        let c = Aabb::new(Vec3::splat(1.5), Vec3::splat(2.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains_point(Vec3::splat(0.5)));
        assert!(!a.contains_point(Vec3::new(0.5, 1.5, 0.5)));
    }

    #[test]
    fn test_cell_range_floors_negative_coordinates() {
        let aabb = Aabb::new(Vec3::new(-1.0, 0.0, 15.9), Vec3::new(16.0, 3.0, 17.0));
        let (min, max) = aabb.cell_range(16);
        assert_eq!(min, IVec3::new(-1, 0, 0));
        assert_eq!(max, IVec3::new(1, 0, 1));
    }
}
