//! Tick and concurrency coordinator
//!
//! One process-wide mutex guards the shared simulation world together with
//! every grid's body, history and activation state. Stepping, rebuilds,
//! voxel edits and transform reads all take it for bounded, synchronous work.
//! Voxel maps are also readable without it through [`VoxelMapView`].

use crate::aabb::Aabb;
use crate::activation::{notify, NoopListener, SubchunkListener};
use crate::body::SpawnPose;
use crate::config::PhysicsConfig;
use crate::error::{GridError, Result};
use crate::frames::{GridFrame, GridRayHit};
use crate::grid::{GridId, GridState, PhysicsGrid, VoxelMapView};
use crate::region::{RegionAllocator, StorageRegion};
use crate::shape::{GridShapeBuilder, LocalBounds};
use crate::transform::{GridTransform, TransformFrame};
use crate::world::PhysicsWorld;
use glam::{IVec3, Vec3};
use parking_lot::Mutex;
use rapier3d::prelude::{Collider, ColliderHandle};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use voxel::{StorageFrame, Voxel, VoxelType, VoxelTypeId};

/// Summary of one [`GridEngine::tick`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Fixed simulation steps taken; zero on a repeated call for the same tick
    pub substeps: u32,
    /// Grids whose bookkeeping ran
    pub grids: usize,
    pub rebuilds: usize,
    pub failed_rebuilds: usize,
    /// Grids asleep after this tick
    pub sleeping: usize,
    /// Grids whose published transform changed
    pub moved: usize,
    pub activated: usize,
    pub deactivated: usize,
}

/// State behind the engine lock
struct EngineState {
    world: PhysicsWorld,
    builder: GridShapeBuilder,
    regions: RegionAllocator,
    grids: HashMap<GridId, PhysicsGrid>,
    /// Region slot → owning grid
    slots: HashMap<u32, GridId>,
    destroyed: HashSet<GridId>,
    last_tick: Option<u64>,
}

impl EngineState {
    fn grid(&self, id: GridId) -> Result<&PhysicsGrid> {
        match self.grids.get(&id) {
            Some(grid) => Ok(grid),
            None => Err(self.missing(id)),
        }
    }

    fn grid_mut(&mut self, id: GridId) -> Result<&mut PhysicsGrid> {
        if self.destroyed.contains(&id) {
            return Err(GridError::Destroyed(id));
        }
        self.grids.get_mut(&id).ok_or(GridError::UnknownGrid(id))
    }

    fn missing(&self, id: GridId) -> GridError {
        if self.destroyed.contains(&id) {
            GridError::Destroyed(id)
        } else {
            GridError::UnknownGrid(id)
        }
    }

    /// Live grid and the world it simulates in, borrowed side by side
    fn grid_and_world(&mut self, id: GridId) -> Result<(&mut PhysicsGrid, &mut PhysicsWorld)> {
        if self.destroyed.contains(&id) {
            return Err(GridError::Destroyed(id));
        }
        let grid = self.grids.get_mut(&id).ok_or(GridError::UnknownGrid(id))?;
        Ok((grid, &mut self.world))
    }

    fn frame(&self, id: GridId) -> Result<GridFrame> {
        self.grid(id)?.frame(&self.world)
    }
}

/// Reject an invalid voxel mass before anything changes
fn check_mass(position: IVec3, voxel: &Voxel) -> Result<()> {
    if voxel.mass.is_finite() && voxel.mass > 0.0 {
        Ok(())
    } else {
        Err(GridError::InvalidMass { position })
    }
}

/// Validate a whole batch up front: range, mass, and no occupied or repeated cells
fn check_batch(
    voxels: &[(IVec3, Voxel)],
    region: &StorageRegion,
    occupied: impl Fn(IVec3) -> bool,
) -> Result<()> {
    let mut seen = HashSet::with_capacity(voxels.len());
    for (position, voxel) in voxels {
        let position = *position;
        if !region.contains_local(position) {
            return Err(GridError::OutOfRange { position });
        }
        check_mass(position, voxel)?;
        if occupied(position) || !seen.insert(position) {
            return Err(GridError::Occupied { position });
        }
    }
    Ok(())
}

fn storage_batch(region: &StorageRegion, voxels: &[(IVec3, Voxel)]) -> Vec<(IVec3, VoxelTypeId)> {
    voxels
        .iter()
        .map(|(position, voxel)| (region.local_to_storage(*position), voxel.type_id()))
        .collect()
}

/// Owns the shared simulation world and every grid in it
///
/// Cloning is cheap; clones share the same world.
#[derive(Clone)]
pub struct GridEngine {
    config: Arc<PhysicsConfig>,
    state: Arc<Mutex<EngineState>>,
    storage: Arc<dyn StorageFrame>,
    listener: Arc<dyn SubchunkListener>,
}

impl GridEngine {
    /// Create an engine writing grid voxels to `storage`
    pub fn new(config: PhysicsConfig, storage: Arc<dyn StorageFrame>) -> Self {
        Self::with_listener(config, storage, Arc::new(NoopListener))
    }

    /// Create an engine that reports subchunk activation to `listener`
    pub fn with_listener(
        config: PhysicsConfig,
        storage: Arc<dyn StorageFrame>,
        listener: Arc<dyn SubchunkListener>,
    ) -> Self {
        let state = EngineState {
            world: PhysicsWorld::new(config.gravity),
            builder: GridShapeBuilder::new(&config),
            regions: RegionAllocator::new(&config),
            grids: HashMap::new(),
            slots: HashMap::new(),
            destroyed: HashSet::new(),
            last_tick: None,
        };
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
            storage,
            listener,
        }
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// A voxel of `kind` with the configured per-voxel mass
    pub fn voxel(&self, kind: Arc<VoxelType>) -> Voxel {
        Voxel {
            mass: self.config.voxel_mass,
            ..Voxel::new(kind)
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Spawn a grid holding one voxel at local (0,0,0)
    ///
    /// # Arguments
    /// * `pose` - World placement of local (0,0,0)
    /// * `first` - The initial voxel
    pub fn spawn(&self, pose: SpawnPose, first: Voxel) -> Result<GridId> {
        self.spawn_grid(pose, vec![(IVec3::ZERO, first)])
    }

    /// Spawn a grid from a set of voxels
    ///
    /// Positions are shifted so the first entry lands on local (0,0,0). Either
    /// the whole grid is spawned or nothing is left behind.
    pub fn spawn_with_voxels(
        &self,
        pose: SpawnPose,
        voxels: impl IntoIterator<Item = (IVec3, Voxel)>,
    ) -> Result<GridId> {
        let mut voxels = voxels.into_iter();
        let (anchor, first) = voxels.next().ok_or(GridError::EmptyGrid)?;
        let mut rebased = vec![(IVec3::ZERO, first)];
        rebased.extend(voxels.map(|(p, v)| (p - anchor, v)));

        let origin = pose.origin + pose.rotation * anchor.as_vec3();
        self.spawn_grid(SpawnPose::new(origin, pose.rotation), rebased)
    }

    fn spawn_grid(&self, pose: SpawnPose, voxels: Vec<(IVec3, Voxel)>) -> Result<GridId> {
        if !pose.origin.is_finite() || !pose.rotation.is_finite() {
            return Err(GridError::DegenerateTransform);
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let region = state.regions.allocate()?;
        if let Err(err) = check_batch(&voxels, &region, |_| false) {
            state.regions.release(&region);
            return Err(err);
        }

        let batch = storage_batch(&region, &voxels);
        let requested = batch.len();
        let placed = self.storage.place_batch(&batch);
        if placed != requested {
            self.discard_spawn(state, &region, &batch);
            tracing::warn!(placed, requested, "storage refused spawn voxels");
            return Err(if requested == 1 {
                GridError::StorageRejected {
                    position: IVec3::ZERO,
                }
            } else {
                GridError::BatchRejected { placed, requested }
            });
        }

        let id = GridId::generate();
        let mut grid = PhysicsGrid::new(id, region, pose, &self.config);
        for (position, voxel) in voxels {
            grid.voxels.insert(position, voxel);
        }

        if let Err(err) = grid.rebuild(&mut state.world, &mut state.builder, &self.config) {
            self.discard_spawn(state, &region, &batch);
            return Err(err);
        }
        let frame = match grid.frame(&state.world) {
            Ok(frame) => frame,
            Err(err) => {
                grid.body.detach(&mut state.world);
                self.discard_spawn(state, &region, &batch);
                return Err(err);
            }
        };

        let tick = state.last_tick.unwrap_or(0);
        grid.history = TransformFrame::new(frame.transform(), tick);
        let delta = grid.tracker.update(&frame.world_aabb());
        notify(self.listener.as_ref(), id, &delta);

        tracing::info!(
            grid = %id,
            slot = region.slot,
            voxels = requested,
            origin = ?pose.origin,
            "spawned grid"
        );
        state.slots.insert(region.slot, id);
        state.grids.insert(id, grid);
        Ok(id)
    }

    /// Undo the storage writes and region of a spawn that did not complete
    fn discard_spawn(
        &self,
        state: &mut EngineState,
        region: &StorageRegion,
        batch: &[(IVec3, VoxelTypeId)],
    ) {
        for (storage_pos, _) in batch {
            self.storage.remove(*storage_pos);
        }
        state.regions.release(region);
    }

    /// Detach the body, clear storage, release the region
    ///
    /// Terminal: every later call naming `id` fails with
    /// [`GridError::Destroyed`].
    pub fn destroy(&self, id: GridId) -> Result<()> {
        let mut guard = self.state.lock();
        self.teardown(&mut guard, id)
    }

    fn teardown(&self, state: &mut EngineState, id: GridId) -> Result<()> {
        if state.destroyed.contains(&id) {
            return Err(GridError::Destroyed(id));
        }
        let mut grid = state.grids.remove(&id).ok_or(GridError::UnknownGrid(id))?;
        state.destroyed.insert(id);

        grid.body.detach(&mut state.world);

        let mut stranded = 0;
        for position in grid.voxels.iter().map(|entry| *entry.key()) {
            if !self.storage.remove(grid.region.local_to_storage(position)) {
                stranded += 1;
            }
        }
        if stranded > 0 {
            tracing::warn!(grid = %id, stranded, "storage kept voxels of a destroyed grid");
        }
        grid.voxels.clear();

        state.slots.remove(&grid.region.slot);
        state.regions.release(&grid.region);

        let delta = grid.tracker.clear();
        notify(self.listener.as_ref(), id, &delta);

        tracing::info!(grid = %id, "destroyed grid");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Place a voxel at a local position
    ///
    /// The map change is undone if the storage frame refuses the write.
    pub fn add_voxel(&self, id: GridId, position: IVec3, voxel: Voxel) -> Result<()> {
        let mut guard = self.state.lock();
        let grid = guard.grid_mut(id)?;
        grid.check_range(position)?;
        check_mass(position, &voxel)?;
        if grid.voxels.contains_key(&position) {
            return Err(GridError::Occupied { position });
        }

        let kind = voxel.type_id();
        grid.voxels.insert(position, voxel);
        let storage_pos = grid.region.local_to_storage(position);
        if !self.storage.place(storage_pos, kind) {
            grid.voxels.remove(&position);
            tracing::warn!(grid = %id, ?position, ?storage_pos, "storage refused voxel; rolled back");
            return Err(GridError::StorageRejected { position });
        }

        grid.mark_dirty();
        tracing::trace!(grid = %id, ?position, %kind, "added voxel");
        Ok(())
    }

    /// Remove the voxel at a local position
    ///
    /// The last voxel of a grid cannot be removed; destroy the grid instead.
    ///
    /// # Returns
    /// The removed voxel
    pub fn remove_voxel(&self, id: GridId, position: IVec3) -> Result<Voxel> {
        let mut guard = self.state.lock();
        let grid = guard.grid_mut(id)?;
        if !grid.voxels.contains_key(&position) {
            return Err(GridError::Vacant { position });
        }
        if grid.voxels.len() == 1 {
            return Err(GridError::LastVoxel);
        }

        let Some((_, voxel)) = grid.voxels.remove(&position) else {
            return Err(GridError::Vacant { position });
        };
        let storage_pos = grid.region.local_to_storage(position);
        if !self.storage.remove(storage_pos) {
            grid.voxels.insert(position, voxel);
            tracing::warn!(grid = %id, ?position, ?storage_pos, "storage refused removal; rolled back");
            return Err(GridError::StorageRejected { position });
        }

        grid.mark_dirty();
        tracing::trace!(grid = %id, ?position, "removed voxel");
        Ok(voxel)
    }

    /// Add many voxels in one storage batch
    ///
    /// All positions are validated before anything changes. If the storage
    /// frame accepts only part of the batch, every voxel of the batch is
    /// taken back out of both the map and storage.
    ///
    /// # Returns
    /// Number of voxels added
    pub fn import_voxels(
        &self,
        id: GridId,
        voxels: impl IntoIterator<Item = (IVec3, Voxel)>,
    ) -> Result<usize> {
        let voxels: Vec<(IVec3, Voxel)> = voxels.into_iter().collect();
        let mut guard = self.state.lock();
        let grid = guard.grid_mut(id)?;

        check_batch(&voxels, &grid.region, |position| grid.voxels.contains_key(&position))?;
        if voxels.is_empty() {
            return Ok(0);
        }

        let batch = storage_batch(&grid.region, &voxels);
        let requested = voxels.len();
        for (position, voxel) in voxels {
            grid.voxels.insert(position, voxel);
        }

        let placed = self.storage.place_batch(&batch);
        if placed != requested {
            for (storage_pos, _) in &batch {
                grid.voxels.remove(&grid.region.storage_to_local(*storage_pos));
                self.storage.remove(*storage_pos);
            }
            tracing::warn!(grid = %id, placed, requested, "storage accepted partial batch; rolled back");
            return Err(GridError::BatchRejected { placed, requested });
        }

        grid.mark_dirty();
        tracing::debug!(grid = %id, count = requested, "imported voxels");
        Ok(requested)
    }

    /// Apply an instantaneous impulse at the grid centroid
    pub fn apply_impulse(&self, id: GridId, impulse: Vec3) -> Result<()> {
        let mut guard = self.state.lock();
        let (grid, world) = guard.grid_and_world(id)?;
        grid.body.apply_impulse(world, impulse);
        Ok(())
    }

    /// Apply a torque for the next tick
    pub fn apply_torque(&self, id: GridId, torque: Vec3) -> Result<()> {
        let mut guard = self.state.lock();
        let (grid, world) = guard.grid_and_world(id)?;
        grid.body.add_torque(world, torque);
        Ok(())
    }

    /// Move a grid so local (0,0,0) sits at `pose`, keeping its velocities
    pub fn teleport(&self, id: GridId, pose: SpawnPose) -> Result<()> {
        if !pose.origin.is_finite() || !pose.rotation.is_finite() {
            return Err(GridError::DegenerateTransform);
        }
        let mut guard = self.state.lock();
        let (grid, world) = guard.grid_and_world(id)?;
        if !grid.body.teleport(world, pose.origin, pose.rotation) {
            return Err(GridError::Detached(id));
        }
        Ok(())
    }

    /// Add immobile host geometry to the shared world
    pub fn add_static_collider(&self, collider: Collider) -> ColliderHandle {
        self.state.lock().world.add_static_collider(collider)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the simulation by one host tick
    ///
    /// The world steps once per distinct `tick`; each grid's bookkeeping also
    /// runs at most once per `tick`, so repeated calls are harmless.
    pub fn tick(&self, tick: u64) -> TickReport {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        if state.last_tick != Some(tick) {
            report.substeps = state.world.advance(
                self.config.tick_duration,
                self.config.fixed_timestep,
                self.config.max_substeps,
            );
            state.last_tick = Some(tick);
        }

        let mut failed = Vec::new();
        for (id, grid) in state.grids.iter_mut() {
            if !grid.begin_tick(tick) {
                continue;
            }
            report.grids += 1;

            grid.body.settle(&mut state.world, &self.config);

            if grid.state() == GridState::Dirty {
                match grid.rebuild(&mut state.world, &mut state.builder, &self.config) {
                    Ok(()) => report.rebuilds += 1,
                    Err(err) => {
                        report.failed_rebuilds += 1;
                        tracing::error!(grid = %id, %err, "grid rebuild failed; destroying grid");
                        failed.push(*id);
                        continue;
                    }
                }
            }

            if grid.body.is_sleeping() {
                report.sleeping += 1;
            }

            let frame = match grid.frame(&state.world) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(grid = %id, %err, "no frame to publish");
                    continue;
                }
            };
            if grid.history.publish(frame.transform(), tick) {
                report.moved += 1;
            }

            let delta = grid.tracker.update(&frame.world_aabb());
            report.activated += delta.entered.len();
            report.deactivated += delta.exited.len();
            notify(self.listener.as_ref(), *id, &delta);

            grid.body.clear_forces(&mut state.world);
        }

        // A grid without a body is never left live
        for id in failed {
            if let Err(err) = self.teardown(state, id) {
                tracing::warn!(grid = %id, %err, "could not destroy grid after failed rebuild");
            }
        }

        tracing::debug!(
            tick,
            substeps = report.substeps,
            grids = report.grids,
            rebuilds = report.rebuilds,
            "tick complete"
        );
        report
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Copy of the published previous/current pair
    pub fn transform_frame(&self, id: GridId) -> Result<TransformFrame> {
        Ok(self.state.lock().grid(id)?.history)
    }

    pub fn current_transform(&self, id: GridId) -> Result<GridTransform> {
        Ok(self.transform_frame(id)?.current)
    }

    pub fn previous_transform(&self, id: GridId) -> Result<GridTransform> {
        Ok(self.transform_frame(id)?.previous)
    }

    /// Pose between the last two published transforms
    ///
    /// # Arguments
    /// * `fraction` - Progress from previous (0.0) to current (1.0)
    pub fn interpolated_transform(&self, id: GridId, fraction: f32) -> Result<GridTransform> {
        Ok(self.transform_frame(id)?.interpolate(fraction))
    }

    /// Frame data at the live body pose, for coordinate conversion
    pub fn frame(&self, id: GridId) -> Result<GridFrame> {
        self.state.lock().frame(id)
    }

    /// World-space bounding box at the live body pose
    pub fn bounding_box(&self, id: GridId) -> Result<Aabb> {
        Ok(self.frame(id)?.world_aabb())
    }

    /// Integer local bounds from the last rebuild
    pub fn local_bounds(&self, id: GridId) -> Result<LocalBounds> {
        Ok(self.state.lock().grid(id)?.local_bounds())
    }

    pub fn voxel_map(&self, id: GridId) -> Result<VoxelMapView> {
        Ok(self.state.lock().grid(id)?.view())
    }

    /// Cast the segment `origin → end` against one grid
    pub fn raycast(&self, id: GridId, origin: Vec3, end: Vec3) -> Result<Option<GridRayHit>> {
        Ok(self.frame(id)?.raycast(origin, end))
    }

    /// Closest hit of the segment `origin → end` over every grid
    pub fn raycast_any(&self, origin: Vec3, end: Vec3) -> Option<(GridId, GridRayHit)> {
        let state = self.state.lock();
        state
            .grids
            .iter()
            .filter_map(|(id, grid)| {
                let hit = grid.frame(&state.world).ok()?.raycast(origin, end)?;
                Some((*id, hit))
            })
            .min_by(|a, b| a.1.fraction.total_cmp(&b.1.fraction))
    }

    /// Voxel occupying a world point, if it belongs to the grid
    ///
    /// # Returns
    /// Local position and voxel
    pub fn voxel_at_world(&self, id: GridId, point: Vec3) -> Result<Option<(IVec3, Voxel)>> {
        let state = self.state.lock();
        let grid = state.grid(id)?;
        let frame = grid.frame(&state.world)?;
        if !frame.contains_world_point(point) {
            return Ok(None);
        }
        let cell = frame.local_cell(point);
        Ok(grid.voxels.get(&cell).map(|entry| (cell, entry.value().clone())))
    }

    /// Grid and local position owning a storage-frame position
    pub fn grid_at_storage(&self, storage: IVec3) -> Option<(GridId, IVec3)> {
        let state = self.state.lock();
        let slot = state.regions.slot_at(storage)?;
        let id = *state.slots.get(&slot)?;
        let grid = state.grids.get(&id)?;
        grid.region
            .contains_storage(storage)
            .then(|| (id, grid.region.storage_to_local(storage)))
    }

    pub fn linear_velocity(&self, id: GridId) -> Result<Vec3> {
        let state = self.state.lock();
        state
            .grid(id)?
            .body
            .linear_velocity(&state.world)
            .ok_or(GridError::Detached(id))
    }

    pub fn angular_velocity(&self, id: GridId) -> Result<Vec3> {
        let state = self.state.lock();
        state
            .grid(id)?
            .body
            .angular_velocity(&state.world)
            .ok_or(GridError::Detached(id))
    }

    pub fn is_sleeping(&self, id: GridId) -> Result<bool> {
        Ok(self.state.lock().grid(id)?.body.is_sleeping())
    }

    /// Total mass from the last rebuild
    pub fn mass(&self, id: GridId) -> Result<f32> {
        Ok(self.state.lock().grid(id)?.body.mass())
    }

    /// Local centroid from the last rebuild
    pub fn centroid(&self, id: GridId) -> Result<Vec3> {
        Ok(self.state.lock().grid(id)?.body.centroid())
    }

    pub fn state(&self, id: GridId) -> Result<GridState> {
        Ok(self.state.lock().grid(id)?.state())
    }

    /// Number of completed rebuilds of a grid
    pub fn rebuild_count(&self, id: GridId) -> Result<u64> {
        Ok(self.state.lock().grid(id)?.body.rebuild_count())
    }

    pub fn is_destroyed(&self, id: GridId) -> bool {
        self.state.lock().destroyed.contains(&id)
    }

    pub fn grid_ids(&self) -> Vec<GridId> {
        self.state.lock().grids.keys().copied().collect()
    }

    pub fn grid_count(&self) -> usize {
        self.state.lock().grids.len()
    }

    /// Bodies in the shared world, static host body included
    pub fn body_count(&self) -> usize {
        self.state.lock().world.body_count()
    }
}
