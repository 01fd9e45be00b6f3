//! Voxel types and their outline geometry

use crate::payload::VoxelPayload;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Mass carried by every voxel unless the host says otherwise
pub const DEFAULT_VOXEL_MASS: f32 = 1.0;

/// Tolerance used when comparing an outline against the unit cube
const FULL_CUBE_TOLERANCE: f32 = 1e-4;

/// Stable identity of a voxel type within a session's catalog
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoxelTypeId(pub u32);

impl fmt::Display for VoxelTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned box in unit-cube-relative coordinates (`[0,1]³`)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl UnitBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The whole unit cube
    pub fn unit() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        }
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Smallest extent along any axis
    pub fn min_extent(&self) -> f32 {
        self.size().min_element()
    }

    /// Check whether this box covers the unit cube within `tolerance`
    pub fn is_unit(&self, tolerance: f32) -> bool {
        self.min.abs_diff_eq(Vec3::ZERO, tolerance) && self.max.abs_diff_eq(Vec3::ONE, tolerance)
    }
}

/// Declared collision outline of a voxel type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VoxelOutline {
    /// Occupies the full unit cube
    FullCube,
    /// No collision geometry at all (e.g. decorative plants)
    Empty,
    /// Union of axis-aligned sub-boxes
    Boxes(Vec<UnitBox>),
}

/// A voxel type from the host catalog
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoxelType {
    pub id: VoxelTypeId,
    pub name: String,
    pub outline: VoxelOutline,
}

impl VoxelType {
    pub fn new(id: VoxelTypeId, name: impl Into<String>, outline: VoxelOutline) -> Self {
        Self {
            id,
            name: name.into(),
            outline,
        }
    }

    /// Convenience constructor for a plain full-cube type
    pub fn solid(id: u32, name: impl Into<String>) -> Self {
        Self::new(VoxelTypeId(id), name, VoxelOutline::FullCube)
    }

    /// Whether this type occupies the whole unit cube
    ///
    /// Trusts the declared outline first. A `Boxes` outline still counts as a
    /// full cube when it is a single box matching the unit cube, or when its
    /// boxes are pairwise disjoint, span the unit cube and sum to unit volume.
    pub fn is_full_cube(&self) -> bool {
        match &self.outline {
            VoxelOutline::FullCube => true,
            VoxelOutline::Empty => false,
            VoxelOutline::Boxes(boxes) => {
                let Some(bounds) = bounding_box(boxes) else {
                    return false;
                };
                if !bounds.is_unit(FULL_CUBE_TOLERANCE) {
                    return false;
                }
                let volume: f32 = boxes
                    .iter()
                    .map(|b| {
                        let size = b.size().max(Vec3::ZERO);
                        size.x * size.y * size.z
                    })
                    .sum();
                if boxes.len() == 1 {
                    return true;
                }
                // Disjoint boxes inside the unit cube with unit total volume tile it
                let disjoint = boxes.iter().enumerate().all(|(i, a)| {
                    boxes[i + 1..]
                        .iter()
                        .all(|b| overlap_volume(a, b) <= FULL_CUBE_TOLERANCE)
                });
                disjoint && (volume - 1.0).abs() <= FULL_CUBE_TOLERANCE
            }
        }
    }

    /// Sub-boxes making up the outline
    pub fn sub_boxes(&self) -> Vec<UnitBox> {
        match &self.outline {
            VoxelOutline::FullCube => vec![UnitBox::unit()],
            VoxelOutline::Empty => Vec::new(),
            VoxelOutline::Boxes(boxes) => boxes.clone(),
        }
    }
}

fn overlap_volume(a: &UnitBox, b: &UnitBox) -> f32 {
    let size = (a.max.min(b.max) - a.min.max(b.min)).max(Vec3::ZERO);
    size.x * size.y * size.z
}

fn bounding_box(boxes: &[UnitBox]) -> Option<UnitBox> {
    let first = boxes.first()?;
    Some(boxes[1..].iter().fold(*first, |acc, b| UnitBox {
        min: acc.min.min(b.min),
        max: acc.max.max(b.max),
    }))
}

/// One voxel placed in a grid
#[derive(Clone, Debug)]
pub struct Voxel {
    pub kind: Arc<VoxelType>,
    pub mass: f32,
    pub payload: Option<VoxelPayload>,
}

impl Voxel {
    pub fn new(kind: Arc<VoxelType>) -> Self {
        Self {
            kind,
            mass: DEFAULT_VOXEL_MASS,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: VoxelPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn type_id(&self) -> VoxelTypeId {
        self.kind.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slab() -> VoxelType {
        VoxelType::new(
            VoxelTypeId(2),
            "slab",
            VoxelOutline::Boxes(vec![UnitBox::new(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0))]),
        )
    }

    #[test]
    fn test_declared_full_cube() {
        assert!(VoxelType::solid(1, "stone").is_full_cube());
        assert!(!slab().is_full_cube());
    }

    #[test]
    fn test_full_cube_numeric_fallback() {
        let almost = VoxelType::new(
            VoxelTypeId(3),
            "boxed stone",
            VoxelOutline::Boxes(vec![UnitBox::new(
                Vec3::splat(0.00001),
                Vec3::splat(0.99999),
            )]),
        );
        assert!(almost.is_full_cube());
    }

    #[test]
    fn test_split_halves_count_as_full() {
        let halves = VoxelType::new(
            VoxelTypeId(4),
            "double slab",
            VoxelOutline::Boxes(vec![
                UnitBox::new(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0)),
                UnitBox::new(Vec3::new(0.0, 0.5, 0.0), Vec3::ONE),
            ]),
        );
        assert!(halves.is_full_cube());
    }

    #[test]
    fn test_overlapping_boxes_with_gap_are_not_full() {
        // Volumes sum to one and the bounds are the unit cube, but the two
        // slabs overlap in the middle and leave the top quarter open
        let gappy = VoxelType::new(
            VoxelTypeId(6),
            "gappy",
            VoxelOutline::Boxes(vec![
                UnitBox::new(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0)),
                UnitBox::new(Vec3::new(0.0, 0.25, 0.0), Vec3::new(1.0, 0.75, 1.0)),
                UnitBox::new(Vec3::new(0.0, 0.75, 0.0), Vec3::new(0.0, 1.0, 1.0)),
            ]),
        );
        assert!(!gappy.is_full_cube());
    }

    #[test]
    fn test_stairs_are_not_full() {
        let stairs = VoxelType::new(
            VoxelTypeId(5),
            "stairs",
            VoxelOutline::Boxes(vec![
                UnitBox::new(Vec3::ZERO, Vec3::new(1.0, 0.5, 1.0)),
                UnitBox::new(Vec3::new(0.0, 0.5, 0.5), Vec3::ONE),
            ]),
        );
        assert!(!stairs.is_full_cube());
        assert_eq!(stairs.sub_boxes().len(), 2);
    }

    #[test]
    fn test_empty_outline() {
        let air = VoxelType::new(VoxelTypeId(0), "air", VoxelOutline::Empty);
        assert!(!air.is_full_cube());
        assert!(air.sub_boxes().is_empty());
    }

    #[test]
    fn test_voxel_defaults() {
        let voxel = Voxel::new(Arc::new(slab()));
        assert_eq!(voxel.mass, DEFAULT_VOXEL_MASS);
        assert_eq!(voxel.type_id(), VoxelTypeId(2));
        assert!(voxel.payload.is_none());
    }
}
