//! Catalog of voxel types known to the host

use crate::kind::{VoxelType, VoxelTypeId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("duplicate voxel type id {0}")]
    DuplicateId(VoxelTypeId),
}

/// Registry of voxel types, static for the lifetime of a session
#[derive(Debug, Default, Clone)]
pub struct VoxelCatalog {
    types: HashMap<VoxelTypeId, Arc<VoxelType>>,
}

impl VoxelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog from a RON list of voxel types
    ///
    /// ```ignore
    /// [
    ///     (id: 1, name: "stone", outline: FullCube),
    ///     (id: 2, name: "torch", outline: Empty),
    /// ]
    /// ```
    pub fn from_ron(text: &str) -> Result<Self, CatalogError> {
        let entries: Vec<VoxelType> = ron::from_str(text)?;
        let mut catalog = Self::new();
        for entry in entries {
            catalog.register(entry)?;
        }
        tracing::debug!(types = catalog.len(), "loaded voxel catalog");
        Ok(catalog)
    }

    /// Add a type, returning the shared handle used by voxels
    pub fn register(&mut self, kind: VoxelType) -> Result<Arc<VoxelType>, CatalogError> {
        if self.types.contains_key(&kind.id) {
            return Err(CatalogError::DuplicateId(kind.id));
        }
        let kind = Arc::new(kind);
        self.types.insert(kind.id, kind.clone());
        Ok(kind)
    }

    pub fn get(&self, id: VoxelTypeId) -> Option<Arc<VoxelType>> {
        self.types.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
