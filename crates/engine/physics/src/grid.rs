use crate::activation::SubchunkTracker;
use crate::body::{GridBody, SpawnPose};
use crate::config::PhysicsConfig;
use crate::error::{GridError, Result};
use crate::frames::GridFrame;
use crate::region::StorageRegion;
use crate::shape::{GridShapeBuilder, LocalBounds, VoxelSample};
use crate::transform::{GridTransform, TransformFrame};
use crate::world::PhysicsWorld;
use dashmap::DashMap;
use glam::IVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use voxel::Voxel;

/// Stable identity of a grid, fixed at spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridId(Uuid);

impl GridId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rebuild state of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridState {
    /// Shape matches the voxel map
    Clean,
    /// Voxels changed since the last rebuild
    Dirty,
    /// A rebuild is running
    RebuildInProgress,
}

/// Read-only handle on a grid's voxel map
///
/// Reads do not take the engine lock. The map is only guaranteed to match
/// the collision shape right after a tick's rebuild.
#[derive(Clone)]
pub struct VoxelMapView {
    voxels: Arc<DashMap<IVec3, Voxel>>,
}

impl VoxelMapView {
    pub fn get(&self, position: IVec3) -> Option<Voxel> {
        self.voxels.get(&position).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, position: IVec3) -> bool {
        self.voxels.contains_key(&position)
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn positions(&self) -> Vec<IVec3> {
        self.voxels.iter().map(|entry| *entry.key()).collect()
    }

    /// Copy of every voxel
    pub fn snapshot(&self) -> Vec<(IVec3, Voxel)> {
        self.voxels
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

/// One freely moving voxel cluster
///
/// Everything but the voxel map is only touched under the engine lock.
pub struct PhysicsGrid {
    id: GridId,
    pub(crate) voxels: Arc<DashMap<IVec3, Voxel>>,
    pub(crate) body: GridBody,
    pub(crate) region: StorageRegion,
    pub(crate) history: TransformFrame,
    pub(crate) tracker: SubchunkTracker,
    state: GridState,
    last_tick: Option<u64>,
}

impl PhysicsGrid {
    pub(crate) fn new(id: GridId, region: StorageRegion, spawn: SpawnPose, config: &PhysicsConfig) -> Self {
        Self {
            id,
            voxels: Arc::new(DashMap::new()),
            body: GridBody::new(spawn),
            region,
            history: TransformFrame::new(GridTransform::new(spawn.origin, spawn.rotation), 0),
            tracker: SubchunkTracker::new(config.subchunk_size),
            state: GridState::Dirty,
            last_tick: None,
        }
    }

    pub fn id(&self) -> GridId {
        self.id
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    pub(crate) fn view(&self) -> VoxelMapView {
        VoxelMapView {
            voxels: self.voxels.clone(),
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.state = GridState::Dirty;
    }

    /// Claim this tick's bookkeeping
    ///
    /// # Returns
    /// `false` when the grid was already processed for `tick`
    pub(crate) fn begin_tick(&mut self, tick: u64) -> bool {
        if self.last_tick == Some(tick) {
            return false;
        }
        self.last_tick = Some(tick);
        true
    }

    /// Voxel map as builder input
    pub(crate) fn samples(&self) -> Vec<VoxelSample> {
        self.voxels
            .iter()
            .map(|entry| VoxelSample {
                position: *entry.key(),
                kind: entry.value().kind.clone(),
                mass: entry.value().mass,
            })
            .collect()
    }

    /// Regenerate the body from the voxel map
    ///
    /// Falls back to dirty on failure, with no body attached.
    pub(crate) fn rebuild(
        &mut self,
        world: &mut PhysicsWorld,
        builder: &mut GridShapeBuilder,
        config: &PhysicsConfig,
    ) -> Result<()> {
        self.state = GridState::RebuildInProgress;
        let samples = self.samples();
        match self.body.rebuild(world, builder, &samples, config) {
            Ok(_) => {
                self.state = GridState::Clean;
                Ok(())
            }
            Err(err) => {
                self.state = GridState::Dirty;
                Err(err)
            }
        }
    }

    /// Integer local bounds from the last rebuild
    pub fn local_bounds(&self) -> LocalBounds {
        self.body
            .shape()
            .map_or(LocalBounds::single(IVec3::ZERO), |shape| shape.bounds)
    }

    /// Frame data from the live body
    pub(crate) fn frame(&self, world: &PhysicsWorld) -> Result<GridFrame> {
        let transform = self.body.transform(world).ok_or(GridError::Detached(self.id))?;
        let shape = self.body.shape().ok_or(GridError::Detached(self.id))?;
        Ok(GridFrame::new(
            transform,
            shape.centroid,
            shape.bounds,
            self.region,
            shape.shape.clone(),
        ))
    }

    /// Check that `position` maps into this grid's storage region
    pub(crate) fn check_range(&self, position: IVec3) -> Result<()> {
        if self.region.contains_local(position) {
            Ok(())
        } else {
            Err(GridError::OutOfRange { position })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionAllocator;
    use glam::Vec3;
    use voxel::VoxelType;

    fn grid(config: &PhysicsConfig) -> PhysicsGrid {
        let region = RegionAllocator::new(config).allocate().unwrap();
        PhysicsGrid::new(GridId::generate(), region, SpawnPose::at(Vec3::ZERO), config)
    }

    #[test]
    fn test_grid_ids_are_unique() {
        assert_ne!(GridId::generate(), GridId::generate());
    }

    #[test]
    fn test_tick_guard() {
        let mut grid = grid(&PhysicsConfig::default());
        assert!(grid.begin_tick(7));
        assert!(!grid.begin_tick(7));
        assert!(grid.begin_tick(8));
    }

    #[test]
    fn test_state_transitions() {
        let config = PhysicsConfig::weightless();
        let mut world = PhysicsWorld::new(config.gravity);
        let mut builder = GridShapeBuilder::new(&config);
        let mut grid = grid(&config);
        grid.voxels
            .insert(IVec3::ZERO, Voxel::new(Arc::new(VoxelType::solid(1, "stone"))));

        assert_eq!(grid.state(), GridState::Dirty);
        grid.rebuild(&mut world, &mut builder, &config).unwrap();
        assert_eq!(grid.state(), GridState::Clean);
        grid.mark_dirty();
        assert_eq!(grid.state(), GridState::Dirty);
    }

    #[test]
    fn test_view_reads_live_map() {
        let grid = grid(&PhysicsConfig::default());
        let view = grid.view();
        assert!(view.is_empty());

        grid.voxels
            .insert(IVec3::new(1, 2, 3), Voxel::new(Arc::new(VoxelType::solid(4, "wood"))));
        assert!(view.contains(IVec3::new(1, 2, 3)));
        assert_eq!(view.get(IVec3::new(1, 2, 3)).map(|v| v.type_id().0), Some(4));
        assert_eq!(view.positions(), vec![IVec3::new(1, 2, 3)]);
    }

    #[test]
    fn test_range_check() {
        let grid = grid(&PhysicsConfig::default());
        assert!(grid.check_range(IVec3::new(511, -512, 0)).is_ok());
        assert_eq!(
            grid.check_range(IVec3::new(512, 0, 0)),
            Err(GridError::OutOfRange { position: IVec3::new(512, 0, 0) })
        );
    }
}
