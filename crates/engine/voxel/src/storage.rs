//! Storage frame: where grid voxels live as ordinary addressable world voxels
//!
//! The physics engine keeps its own sparse voxel map per grid and mirrors every
//! change into a storage frame so that host code can query grid voxels the same
//! way it queries the static world. Writes are fallible; the engine rolls back
//! its own map when the storage frame refuses a write.

use crate::kind::VoxelTypeId;
use glam::IVec3;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Backend trait for the storage-frame collaborator
pub trait StorageFrame: Send + Sync {
    /// Write a voxel; `false` if the write was refused
    fn place(&self, position: IVec3, kind: VoxelTypeId) -> bool;

    /// Clear a voxel; `false` if nothing was cleared
    fn remove(&self, position: IVec3) -> bool;

    /// Write many voxels, returning how many were accepted
    fn place_batch(&self, voxels: &[(IVec3, VoxelTypeId)]) -> usize;
}

/// In-memory storage frame
///
/// A fence can be raised over a box of positions; writes inside it are refused.
/// Hosts use this for protected areas, tests use it to provoke rollbacks.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    voxels: RwLock<HashMap<IVec3, VoxelTypeId>>,
    fence: RwLock<Option<(IVec3, IVec3)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse writes to every position in the inclusive box `min..=max`
    pub fn set_fence(&self, min: IVec3, max: IVec3) {
        *self.fence.write() = Some((min.min(max), min.max(max)));
    }

    pub fn clear_fence(&self) {
        *self.fence.write() = None;
    }

    pub fn get(&self, position: IVec3) -> Option<VoxelTypeId> {
        self.voxels.read().get(&position).copied()
    }

    pub fn len(&self) -> usize {
        self.voxels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.read().is_empty()
    }

    fn fenced(&self, position: IVec3) -> bool {
        match *self.fence.read() {
            Some((min, max)) => position.cmpge(min).all() && position.cmple(max).all(),
            None => false,
        }
    }
}

impl StorageFrame for MemoryStorage {
    fn place(&self, position: IVec3, kind: VoxelTypeId) -> bool {
        if self.fenced(position) {
            tracing::trace!(?position, "storage write refused by fence");
            return false;
        }
        self.voxels.write().insert(position, kind);
        true
    }

    fn remove(&self, position: IVec3) -> bool {
        if self.fenced(position) {
            return false;
        }
        self.voxels.write().remove(&position).is_some()
    }

    fn place_batch(&self, voxels: &[(IVec3, VoxelTypeId)]) -> usize {
        voxels
            .iter()
            .filter(|(position, kind)| self.place(*position, *kind))
            .count()
    }
}
