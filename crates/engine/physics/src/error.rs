//! Error types for grid physics

use crate::grid::GridId;
use glam::IVec3;
use thiserror::Error;

/// Result type for grid operations
pub type Result<T> = std::result::Result<T, GridError>;

/// Errors returned by grid operations
///
/// None of these are fatal. Mutations that fail leave the grid exactly as it
/// was before the call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// The grid was destroyed; it accepts no further mutation or query
    #[error("grid {0} has been destroyed")]
    Destroyed(GridId),

    /// No grid with this id was ever spawned here
    #[error("unknown grid {0}")]
    UnknownGrid(GridId),

    /// The grid has no simulated body attached
    #[error("grid {0} has no simulated body")]
    Detached(GridId),

    /// A grid was requested without any voxels
    #[error("a grid needs at least one voxel")]
    EmptyGrid,

    /// Local position does not fit in the grid's storage region
    #[error("local position {position} is outside the storage region")]
    OutOfRange { position: IVec3 },

    /// Voxel mass must be finite and positive
    #[error("voxel at local position {position} has an invalid mass")]
    InvalidMass { position: IVec3 },

    /// A voxel already occupies the position
    #[error("local position {position} is already occupied")]
    Occupied { position: IVec3 },

    /// No voxel at the position
    #[error("no voxel at local position {position}")]
    Vacant { position: IVec3 },

    /// Removing the only voxel would leave an empty simulated body
    #[error("cannot remove the last voxel of a grid; destroy it instead")]
    LastVoxel,

    /// The storage frame refused a write; the voxel map was rolled back
    #[error("storage frame refused write at {position}")]
    StorageRejected { position: IVec3 },

    /// The storage frame accepted only part of a batch; the batch was rolled back
    #[error("storage frame accepted {placed} of {requested} voxels")]
    BatchRejected { placed: usize, requested: usize },

    /// Every storage region is in use
    #[error("no free storage region")]
    RegionsExhausted,

    /// A pose or rebuild result was not finite; nothing was attached
    #[error("rebuild produced a non-finite transform or mass")]
    DegenerateTransform,
}

impl GridError {
    /// Whether the failure came from the storage frame
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            GridError::StorageRejected { .. } | GridError::BatchRejected { .. }
        )
    }
}
