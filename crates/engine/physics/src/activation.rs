//! Subchunk activation tracking
//!
//! A moving grid overlaps a handful of coarse world cells (subchunks). The
//! host keeps special bookkeeping for those cells, so each tick the tracker
//! reports which cells the grid entered and which it left.

use crate::aabb::Aabb;
use crate::grid::GridId;
use glam::IVec3;
use std::collections::HashSet;

/// Cells entered and vacated by one grid during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationDelta {
    pub entered: Vec<IVec3>,
    pub exited: Vec<IVec3>,
}

impl ActivationDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

/// Receives subchunk activation changes
///
/// Called under the engine lock; implementations must not call back into
/// the engine.
pub trait SubchunkListener: Send + Sync {
    fn activate(&self, grid: GridId, cell: IVec3);
    fn deactivate(&self, grid: GridId, cell: IVec3);
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SubchunkListener for NoopListener {
    fn activate(&self, _grid: GridId, _cell: IVec3) {}
    fn deactivate(&self, _grid: GridId, _cell: IVec3) {}
}

/// Overlap set of one grid
#[derive(Debug, Clone)]
pub struct SubchunkTracker {
    cell_size: i32,
    active: HashSet<IVec3>,
}

impl SubchunkTracker {
    pub fn new(cell_size: i32) -> Self {
        Self {
            cell_size: cell_size.max(1),
            active: HashSet::new(),
        }
    }

    /// Cells overlapped by `bounds`, inclusive on both corners
    pub fn cells_for(&self, bounds: &Aabb) -> HashSet<IVec3> {
        let (min, max) = bounds.cell_range(self.cell_size);
        let mut cells = HashSet::new();
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    cells.insert(IVec3::new(x, y, z));
                }
            }
        }
        cells
    }

    /// Replace the overlap set with the cells under `bounds`
    pub fn update(&mut self, bounds: &Aabb) -> ActivationDelta {
        let next = self.cells_for(bounds);
        let delta = ActivationDelta {
            entered: sorted(next.difference(&self.active).copied()),
            exited: sorted(self.active.difference(&next).copied()),
        };
        self.active = next;
        delta
    }

    /// Vacate every cell
    pub fn clear(&mut self) -> ActivationDelta {
        ActivationDelta {
            entered: Vec::new(),
            exited: sorted(std::mem::take(&mut self.active).into_iter()),
        }
    }
}

fn sorted(cells: impl Iterator<Item = IVec3>) -> Vec<IVec3> {
    let mut cells: Vec<IVec3> = cells.collect();
    cells.sort_unstable_by_key(|c| (c.x, c.y, c.z));
    cells
}

/// Forward a delta to a listener
pub(crate) fn notify(listener: &dyn SubchunkListener, grid: GridId, delta: &ActivationDelta) {
    for &cell in &delta.exited {
        listener.deactivate(grid, cell);
    }
    for &cell in &delta.entered {
        listener.activate(grid, cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_box_inside_one_cell() {
        let mut tracker = SubchunkTracker::new(16);
        let delta = tracker.update(&Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0)));
        assert_eq!(delta.entered, vec![IVec3::ZERO]);
        assert!(delta.exited.is_empty());
    }

    #[test]
    fn test_box_straddling_cells() {
        let tracker = SubchunkTracker::new(16);
        let cells = tracker.cells_for(&Aabb::new(Vec3::new(-1.0, 15.0, 0.0), Vec3::new(1.0, 17.0, 1.0)));
        assert_eq!(cells.len(), 4);
        assert!(cells.contains(&IVec3::new(-1, 0, 0)));
        assert!(cells.contains(&IVec3::new(0, 1, 0)));
    }

    #[test]
    fn test_moving_box_enters_and_exits() {
        let mut tracker = SubchunkTracker::new(16);
        tracker.update(&Aabb::new(Vec3::new(14.0, 0.0, 0.0), Vec3::new(15.0, 1.0, 1.0)));

        let delta = tracker.update(&Aabb::new(Vec3::new(15.5, 0.0, 0.0), Vec3::new(16.5, 1.0, 1.0)));
        assert_eq!(delta.entered, vec![IVec3::new(1, 0, 0)]);
        assert!(delta.exited.is_empty());

        let delta = tracker.update(&Aabb::new(Vec3::new(17.0, 0.0, 0.0), Vec3::new(18.0, 1.0, 1.0)));
        assert!(delta.entered.is_empty());
        assert_eq!(delta.exited, vec![IVec3::ZERO]);

        // Same place again: nothing to report
        let delta = tracker.update(&Aabb::new(Vec3::new(17.0, 0.0, 0.0), Vec3::new(18.0, 1.0, 1.0)));
        assert!(delta.is_empty());
    }

    #[test]
    fn test_clear_exits_everything() {
        let mut tracker = SubchunkTracker::new(16);
        tracker.update(&Aabb::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)));
        let delta = tracker.clear();
        assert_eq!(delta.exited.len(), 2);
        assert!(tracker.clear().is_empty());
    }
}
