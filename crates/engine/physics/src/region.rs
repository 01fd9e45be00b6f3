//! Storage-frame regions
//!
//! Every grid owns one cubic block of storage-frame space so its voxels can be
//! persisted and queried like ordinary world voxels. Slot `n` starts at
//! `storage_base + (n * region_size, 0, 0)`; local (0,0,0) maps to the block
//! midpoint.

use crate::config::PhysicsConfig;
use crate::error::{GridError, Result};
use glam::IVec3;
use std::collections::BTreeSet;

/// One allocated block of storage-frame space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageRegion {
    pub slot: u32,
    /// Storage position of the block's minimum corner
    pub origin: IVec3,
    /// Offset from `origin` to local (0,0,0)
    pub center_offset: IVec3,
    /// Edge length
    pub size: i32,
}

impl StorageRegion {
    pub fn local_to_storage(&self, local: IVec3) -> IVec3 {
        local + self.center_offset + self.origin
    }

    pub fn storage_to_local(&self, storage: IVec3) -> IVec3 {
        storage - self.origin - self.center_offset
    }

    /// Whether `local` maps inside this block
    pub fn contains_local(&self, local: IVec3) -> bool {
        let offset = local + self.center_offset;
        offset.cmpge(IVec3::ZERO).all() && offset.cmplt(IVec3::splat(self.size)).all()
    }

    pub fn contains_storage(&self, storage: IVec3) -> bool {
        self.contains_local(self.storage_to_local(storage))
    }
}

/// Hands out storage regions; released slots are reused lowest first
#[derive(Debug)]
pub struct RegionAllocator {
    base: IVec3,
    size: i32,
    capacity: u32,
    /// Slots below this have been handed out at least once
    high_water: u32,
    free: BTreeSet<u32>,
    live: BTreeSet<u32>,
}

impl RegionAllocator {
    pub fn new(config: &PhysicsConfig) -> Self {
        Self {
            base: config.storage_base,
            size: config.region_size.max(2),
            capacity: config.region_capacity,
            high_water: 0,
            free: BTreeSet::new(),
            live: BTreeSet::new(),
        }
    }

    pub fn allocate(&mut self) -> Result<StorageRegion> {
        let slot = match self.free.pop_first() {
            Some(slot) => slot,
            None if self.high_water < self.capacity => {
                self.high_water += 1;
                self.high_water - 1
            }
            None => return Err(GridError::RegionsExhausted),
        };

        let Some(region) = self.region(slot) else {
            // Slot offset does not fit the storage coordinate range
            self.free.insert(slot);
            return Err(GridError::RegionsExhausted);
        };
        self.live.insert(slot);
        tracing::trace!(slot, origin = ?region.origin, "allocated storage region");
        Ok(region)
    }

    /// Return a region to the pool
    ///
    /// # Returns
    /// `false` if the region was not allocated
    pub fn release(&mut self, region: &StorageRegion) -> bool {
        if !self.live.remove(&region.slot) {
            return false;
        }
        self.free.insert(region.slot);
        tracing::trace!(slot = region.slot, "released storage region");
        true
    }

    /// Slot of the live region covering a storage position
    pub fn slot_at(&self, storage: IVec3) -> Option<u32> {
        let offset = storage - self.base;
        if offset.x < 0 || !(0..self.size).contains(&offset.y) || !(0..self.size).contains(&offset.z) {
            return None;
        }
        let slot = u32::try_from(offset.x / self.size).ok()?;
        self.live.contains(&slot).then_some(slot)
    }

    fn region(&self, slot: u32) -> Option<StorageRegion> {
        let x = i32::try_from(slot).ok()?.checked_mul(self.size)?;
        let origin = IVec3::new(self.base.x.checked_add(x)?, self.base.y, self.base.z);
        Some(StorageRegion {
            slot,
            origin,
            center_offset: IVec3::splat(self.size / 2),
            size: self.size,
        })
    }
}
