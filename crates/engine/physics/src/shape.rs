//! Collision shape and mass properties from a sparse voxel map
//!
//! Voxels are split in two groups:
//!
//! - **Simple** voxels fill their unit cube. They are handed to a [`BoxMerger`]
//!   which fuses neighbours into larger boxes so the compound shape stays small.
//! - **Complex** voxels (slabs, stairs, fences...) are converted one by one from
//!   their declared outline into a few boxes. The conversion is cached per voxel
//!   type in a [`ShapeCache`].
//!
//! All parts are positioned relative to the grid centroid, because the rigid
//! body origin sits on the centroid rather than on local (0,0,0).

use crate::aabb::Aabb;
use crate::config::PhysicsConfig;
use glam::{DVec3, IVec3, Vec3};
use rapier3d::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use voxel::{UnitBox, VoxelType, VoxelTypeId};

/// Half extent of the stand-in box used when a voxel outline decomposes to nothing
const TOKEN_HALF_EXTENT: f32 = 0.05;

/// Radius of the placeholder shape for a grid without voxels
const PLACEHOLDER_RADIUS: f32 = 0.001;

/// One voxel as seen by the builder
#[derive(Debug, Clone)]
pub struct VoxelSample {
    pub position: IVec3,
    pub kind: Arc<VoxelType>,
    pub mass: f32,
}

/// A box of whole voxels produced by a [`BoxMerger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedBox {
    /// Minimum voxel corner
    pub min: IVec3,
    /// Size in voxels along each axis
    pub size: IVec3,
}

impl MergedBox {
    pub fn volume(&self) -> i32 {
        self.size.x * self.size.y * self.size.z
    }
}

/// Combines full-cube voxels into larger boxes
///
/// Implementations must cover exactly the input cells: every cell in one box,
/// no box reaching outside the input.
pub trait BoxMerger: Send {
    fn merge(&self, cells: &[IVec3]) -> Vec<MergedBox>;
}

/// Greedy merger: grows each box along X, then Y, then Z
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyBoxMerger;

impl BoxMerger for GreedyBoxMerger {
    fn merge(&self, cells: &[IVec3]) -> Vec<MergedBox> {
        let mut remaining: HashSet<IVec3> = cells.iter().copied().collect();
        let mut order: Vec<IVec3> = remaining.iter().copied().collect();
        order.sort_by_key(|c| (c.z, c.y, c.x));

        let mut boxes = Vec::new();
        for start in order {
            if !remaining.contains(&start) {
                continue;
            }

            let mut size_x = 1;
            while remaining.contains(&(start + IVec3::new(size_x, 0, 0))) {
                size_x += 1;
            }

            let mut size_y = 1;
            'grow_y: loop {
                for dx in 0..size_x {
                    if !remaining.contains(&(start + IVec3::new(dx, size_y, 0))) {
                        break 'grow_y;
                    }
                }
                size_y += 1;
            }

            let mut size_z = 1;
            'grow_z: loop {
                for dy in 0..size_y {
                    for dx in 0..size_x {
                        if !remaining.contains(&(start + IVec3::new(dx, dy, size_z))) {
                            break 'grow_z;
                        }
                    }
                }
                size_z += 1;
            }

            for dz in 0..size_z {
                for dy in 0..size_y {
                    for dx in 0..size_x {
                        remaining.remove(&(start + IVec3::new(dx, dy, dz)));
                    }
                }
            }

            boxes.push(MergedBox {
                min: start,
                size: IVec3::new(size_x, size_y, size_z),
            });
        }

        boxes
    }
}

/// Cached outline of one voxel type
#[derive(Debug, Clone)]
pub enum CachedOutline {
    /// Fills the unit cube; goes through the merger
    Full,
    /// Decomposed sub-boxes, never empty
    Boxes(Arc<[UnitBox]>),
}

/// Per-voxel-type outline cache
///
/// Voxel catalogs are static for a session, so entries are never evicted.
#[derive(Debug, Default)]
pub struct ShapeCache {
    entries: HashMap<VoxelTypeId, CachedOutline>,
    hits: u64,
    misses: u64,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up (or decompose and remember) the outline of `kind`
    pub fn outline(&mut self, kind: &VoxelType, tolerance: f32) -> CachedOutline {
        if let Some(cached) = self.entries.get(&kind.id) {
            self.hits += 1;
            return cached.clone();
        }
        self.misses += 1;

        let outline = if kind.is_full_cube() {
            CachedOutline::Full
        } else {
            CachedOutline::Boxes(decompose(kind, tolerance).into())
        };
        self.entries.insert(kind.id, outline.clone());
        outline
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Convert a complex outline into boxes, dropping slivers below `tolerance`
fn decompose(kind: &VoxelType, tolerance: f32) -> Vec<UnitBox> {
    let boxes: Vec<UnitBox> = kind
        .sub_boxes()
        .into_iter()
        .map(|b| UnitBox::new(b.min.clamp(Vec3::ZERO, Vec3::ONE), b.max.clamp(Vec3::ZERO, Vec3::ONE)))
        .filter(|b| b.min_extent() >= tolerance)
        .collect();

    if boxes.is_empty() {
        tracing::debug!(kind = %kind.id, name = %kind.name, "outline decomposed to nothing; using token box");
        let center = Vec3::splat(0.5);
        return vec![UnitBox::new(
            center - Vec3::splat(TOKEN_HALF_EXTENT),
            center + Vec3::splat(TOKEN_HALF_EXTENT),
        )];
    }
    boxes
}

/// Integer local-space bounds of a grid (inclusive voxel coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalBounds {
    pub min: IVec3,
    pub max: IVec3,
}

impl LocalBounds {
    /// Bounds of a lone voxel at `position`
    pub fn single(position: IVec3) -> Self {
        Self {
            min: position,
            max: position,
        }
    }

    pub fn from_positions(positions: impl IntoIterator<Item = IVec3>) -> Option<Self> {
        positions.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self::single(p),
                Some(b) => Self {
                    min: b.min.min(p),
                    max: b.max.max(p),
                },
            })
        })
    }

    pub fn contains(&self, position: IVec3) -> bool {
        position.cmpge(self.min).all() && position.cmple(self.max).all()
    }

    /// Continuous local-space box covering every voxel cube
    pub fn to_aabb(&self) -> Aabb {
        Aabb::new(self.min.as_vec3(), (self.max + IVec3::ONE).as_vec3())
    }
}

/// Total mass and mass-weighted centroid of voxel centres
///
/// Falls back to the origin for an empty or massless set.
pub fn mass_and_centroid(voxels: &[VoxelSample]) -> (f32, Vec3) {
    // Accumulate in f64
    let mut mass = 0.0f64;
    let mut weighted = DVec3::ZERO;
    for voxel in voxels {
        let m = f64::from(voxel.mass);
        mass += m;
        weighted += (voxel.position.as_dvec3() + DVec3::splat(0.5)) * m;
    }
    if mass > 0.0 {
        (mass as f32, (weighted / mass).as_vec3())
    } else {
        (mass as f32, Vec3::ZERO)
    }
}

/// Output of one full rebuild
#[derive(Clone)]
pub struct GridShape {
    /// Compound shape in centroid-relative coordinates
    pub shape: SharedShape,
    /// Mass properties handed to the rigid body (inertia already scaled)
    pub mass_properties: MassProperties,
    /// Total mass
    pub mass: f32,
    /// Centroid in local voxel coordinates
    pub centroid: Vec3,
    /// Integer local bounds
    pub bounds: LocalBounds,
    /// Voxels that went through the merger
    pub simple_voxels: usize,
    /// Voxels decomposed individually
    pub complex_voxels: usize,
}

impl GridShape {
    /// Number of primitives in the collision shape
    ///
    /// The placeholder for an empty grid is a single ball, not a compound.
    pub fn primitive_count(&self) -> usize {
        match self.shape.as_compound() {
            Some(compound) => compound.shapes().len(),
            None => 1,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.shape.as_ball().is_some()
    }
}

/// Builds grid collision shapes and mass properties
pub struct GridShapeBuilder {
    cache: ShapeCache,
    merger: Box<dyn BoxMerger>,
    tolerance: f32,
    inertia_multiplier: f32,
}

impl GridShapeBuilder {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            cache: ShapeCache::new(),
            merger: Box::new(GreedyBoxMerger),
            tolerance: config.decomposition_tolerance,
            inertia_multiplier: config.inertia_multiplier,
        }
    }

    /// Replace the merger used for full-cube voxels
    pub fn with_merger(mut self, merger: impl BoxMerger + 'static) -> Self {
        self.merger = Box::new(merger);
        self
    }

    pub fn cache(&self) -> &ShapeCache {
        &self.cache
    }

    /// Regenerate shape and mass properties from the full voxel map
    pub fn build(&mut self, voxels: &[VoxelSample]) -> GridShape {
        let (mass, centroid) = mass_and_centroid(voxels);
        let bounds = LocalBounds::from_positions(voxels.iter().map(|v| v.position))
            .unwrap_or(LocalBounds::single(IVec3::ZERO));

        let mut simple = Vec::new();
        let mut parts: Vec<(Isometry<Real>, SharedShape)> = Vec::new();
        let mut complex_voxels = 0;

        for voxel in voxels {
            match self.cache.outline(&voxel.kind, self.tolerance) {
                CachedOutline::Full => simple.push(voxel.position),
                CachedOutline::Boxes(boxes) => {
                    complex_voxels += 1;
                    let base = voxel.position.as_vec3();
                    for b in boxes.iter() {
                        parts.push(cuboid_part(base + b.center() - centroid, b.size() * 0.5));
                    }
                }
            }
        }

        let simple_voxels = simple.len();
        for merged in self.merger.merge(&simple) {
            let half = merged.size.as_vec3() * 0.5;
            parts.push(cuboid_part(merged.min.as_vec3() + half - centroid, half));
        }

        let shape = if parts.is_empty() {
            SharedShape::ball(PLACEHOLDER_RADIUS)
        } else {
            SharedShape::compound(parts)
        };
        let mass_properties = self.mass_properties(&shape, mass);

        tracing::trace!(
            voxels = voxels.len(),
            simple_voxels,
            complex_voxels,
            mass,
            ?centroid,
            "built grid shape"
        );

        GridShape {
            shape,
            mass_properties,
            mass,
            centroid,
            bounds,
            simple_voxels,
            complex_voxels,
        }
    }

    /// Shape-derived inertia at the grid mass, scaled by the stability multiplier
    fn mass_properties(&self, shape: &SharedShape, mass: f32) -> MassProperties {
        let unit = shape.mass_properties(1.0);
        let density = if unit.mass() > 0.0 { mass / unit.mass() } else { 0.0 };
        let inertia = unit.principal_inertia() * (density * self.inertia_multiplier);
        MassProperties::with_principal_inertia_frame(
            Point::origin(),
            mass,
            inertia,
            unit.principal_inertia_local_frame,
        )
    }
}

fn cuboid_part(center: Vec3, half_extents: Vec3) -> (Isometry<Real>, SharedShape) {
    (
        Isometry::translation(center.x, center.y, center.z),
        SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel::VoxelOutline;

    fn stone() -> Arc<VoxelType> {
        Arc::new(VoxelType::solid(1, "stone"))
    }

    fn slab() -> Arc<VoxelType> {
        Arc::new(VoxelType::new(
            VoxelTypeId(2),
            "slab",
            VoxelOutline::Boxes(vec![UnitBox::new(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0))]),
        ))
    }

    fn sample(position: IVec3, kind: &Arc<VoxelType>) -> VoxelSample {
        VoxelSample {
            position,
            kind: kind.clone(),
            mass: 1.0,
        }
    }

    fn builder() -> GridShapeBuilder {
        GridShapeBuilder::new(&PhysicsConfig::default())
    }

    #[test]
    fn test_greedy_merge_fills_block() {
        let cells: Vec<IVec3> = (0..2)
            .flat_map(|z| (0..2).flat_map(move |y| (0..2).map(move |x| IVec3::new(x, y, z))))
            .collect();
        let boxes = GreedyBoxMerger.merge(&cells);
        assert_eq!(boxes, vec![MergedBox { min: IVec3::ZERO, size: IVec3::splat(2) }]);
    }

    #[test]
    fn test_greedy_merge_preserves_volume() {
        // L shape plus a detached voxel
        let cells = vec![
            IVec3::new(0, 0, 0),
            IVec3::new(1, 0, 0),
            IVec3::new(2, 0, 0),
            IVec3::new(0, 1, 0),
            IVec3::new(5, 5, 5),
        ];
        let boxes = GreedyBoxMerger.merge(&cells);
        let volume: i32 = boxes.iter().map(MergedBox::volume).sum();
        assert_eq!(volume, cells.len() as i32);
        assert_eq!(boxes.len(), 3);

        for cell in &cells {
            let covering = boxes
                .iter()
                .filter(|b| cell.cmpge(b.min).all() && cell.cmplt(b.min + b.size).all())
                .count();
            assert_eq!(covering, 1, "cell {cell} must be covered exactly once");
        }
    }

    struct PerCellMerger;

    impl BoxMerger for PerCellMerger {
        fn merge(&self, cells: &[IVec3]) -> Vec<MergedBox> {
            cells.iter().map(|&min| MergedBox { min, size: IVec3::ONE }).collect()
        }
    }

    #[test]
    fn test_custom_merger_is_used() {
        let kind = stone();
        let voxels = [sample(IVec3::ZERO, &kind), sample(IVec3::X, &kind)];
        assert_eq!(builder().build(&voxels).primitive_count(), 1);

        let shape = builder().with_merger(PerCellMerger).build(&voxels);
        assert_eq!(shape.primitive_count(), 2);
        assert_eq!(shape.mass, 2.0);
    }

    #[test]
    fn test_single_voxel_mass_and_centroid() {
        let shape = builder().build(&[sample(IVec3::ZERO, &stone())]);
        assert_eq!(shape.mass, 1.0);
        assert!(shape.centroid.abs_diff_eq(Vec3::splat(0.5), 1e-6));
        assert_eq!(shape.primitive_count(), 1);
        assert_eq!(shape.bounds, LocalBounds::single(IVec3::ZERO));
    }

    #[test]
    fn test_adjacent_voxels_merge_into_one_box() {
        let kind = stone();
        let shape = builder().build(&[sample(IVec3::ZERO, &kind), sample(IVec3::X, &kind)]);
        assert_eq!(shape.mass, 2.0);
        assert!(shape.centroid.abs_diff_eq(Vec3::new(1.0, 0.5, 0.5), 1e-6));
        assert_eq!(shape.primitive_count(), 1);
        assert_eq!(shape.simple_voxels, 2);
    }

    #[test]
    fn test_complex_voxels_use_cache() {
        let kind = slab();
        let mut builder = builder();
        let voxels: Vec<_> = (0..4).map(|x| sample(IVec3::new(x, 0, 0), &kind)).collect();

        let shape = builder.build(&voxels);
        assert_eq!(shape.complex_voxels, 4);
        assert_eq!(shape.primitive_count(), 4);
        assert_eq!(builder.cache().len(), 1);
        assert_eq!(builder.cache().misses(), 1);
        assert_eq!(builder.cache().hits(), 3);

        builder.build(&voxels);
        assert_eq!(builder.cache().misses(), 1);
    }

    #[test]
    fn test_slivers_fall_back_to_token_box() {
        let carpet = Arc::new(VoxelType::new(
            VoxelTypeId(9),
            "carpet",
            VoxelOutline::Boxes(vec![UnitBox::new(Vec3::ZERO, Vec3::new(1.0, 0.0005, 1.0))]),
        ));
        let shape = builder().build(&[sample(IVec3::ZERO, &carpet)]);
        let compound = shape.shape.as_compound().expect("compound shape");
        assert_eq!(compound.shapes().len(), 1);
        let cuboid = compound.shapes()[0].1.as_cuboid().expect("token cuboid");
        assert!((cuboid.half_extents.x - TOKEN_HALF_EXTENT).abs() < 1e-6);
    }

    #[test]
    fn test_empty_map_yields_placeholder() {
        let shape = builder().build(&[]);
        assert!(shape.is_placeholder());
        assert_eq!(shape.primitive_count(), 1);
        assert_eq!(shape.mass, 0.0);
        assert_eq!(shape.centroid, Vec3::ZERO);
    }

    #[test]
    fn test_parts_are_centroid_relative() {
        let kind = stone();
        let shape = builder().build(&[sample(IVec3::ZERO, &kind), sample(IVec3::X, &kind)]);
        let aabb = shape.shape.compute_local_aabb();
        assert!((aabb.mins.x + 1.0).abs() < 1e-5);
        assert!((aabb.maxs.x - 1.0).abs() < 1e-5);
        assert!((aabb.mins.y + 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_inertia_is_scaled() {
        let kind = stone();
        let voxels = [sample(IVec3::ZERO, &kind)];

        let config = PhysicsConfig::default();
        let shape = GridShapeBuilder::new(&config).build(&voxels);
        let plain = GridShapeBuilder::new(&PhysicsConfig {
            inertia_multiplier: 1.0,
            ..config.clone()
        })
        .build(&voxels);

        let scaled = shape.mass_properties.principal_inertia();
        let exact = plain.mass_properties.principal_inertia();
        // Unit cube of mass 1: I = m * (1 + 1) / 12 per axis
        assert!((exact.x - 1.0 / 6.0).abs() < 1e-4);
        assert!((scaled.x - exact.x * config.inertia_multiplier).abs() < 1e-4);
        assert!((shape.mass_properties.mass() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_local_bounds_aabb_covers_cubes() {
        let bounds = LocalBounds::from_positions([IVec3::new(-1, 0, 2), IVec3::new(3, 1, 2)]).unwrap();
        assert!(bounds.contains(IVec3::new(0, 1, 2)));
        assert!(!bounds.contains(IVec3::new(0, 2, 2)));
        let aabb = bounds.to_aabb();
        assert_eq!(aabb.min, Vec3::new(-1.0, 0.0, 2.0));
        assert_eq!(aabb.max, Vec3::new(4.0, 2.0, 3.0));
    }
}
