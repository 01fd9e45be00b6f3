mod aabb;
mod activation;
mod body;
mod config;
mod engine;
mod error;
mod frames;
mod grid;
mod math;
mod region;
mod shape;
mod transform;
mod world;

pub use aabb::Aabb;
pub use activation::{ActivationDelta, NoopListener, SubchunkListener, SubchunkTracker};
pub use body::{BodyHandles, BodySnapshot, GridBody, SettleOutcome, SpawnPose};
pub use config::PhysicsConfig;
pub use engine::{GridEngine, TickReport};
pub use error::{GridError, Result};
pub use frames::{GridFrame, GridRayHit};
pub use grid::{GridId, GridState, PhysicsGrid, VoxelMapView};
pub use region::{RegionAllocator, StorageRegion};
pub use shape::{
    mass_and_centroid, BoxMerger, CachedOutline, GreedyBoxMerger, GridShape, GridShapeBuilder,
    LocalBounds, MergedBox, ShapeCache, VoxelSample,
};
pub use transform::{GridTransform, TransformFrame};
pub use world::PhysicsWorld;

// Re-export for convenience
pub use glam;
pub use rapier3d;
pub use voxel;
