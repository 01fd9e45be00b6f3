//! Host voxel-world model shared with the grid physics engine
//!
//! This crate describes what the host world knows about voxels: the catalog of
//! voxel types and their outline geometry, the payloads that may be attached to
//! individual voxels, and the storage frame in which grid voxels are persisted
//! as if they were ordinary world voxels.

mod catalog;
mod kind;
mod payload;
mod storage;

pub use catalog::{CatalogError, VoxelCatalog};
pub use kind::{UnitBox, Voxel, VoxelOutline, VoxelType, VoxelTypeId, DEFAULT_VOXEL_MASS};
pub use payload::VoxelPayload;
pub use storage::{MemoryStorage, StorageFrame};

// Re-export for convenience
pub use glam;
