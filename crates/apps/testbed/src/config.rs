//! Loading of physics settings and the voxel catalog

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use voxel::VoxelCatalog;
use voxship_physics::PhysicsConfig;

/// Catalog used when no file is given
const DEFAULT_CATALOG: &str = include_str!("../assets/catalog.ron");

/// Read a physics configuration, falling back to defaults when no path is set
///
/// Missing fields in the file keep their default values.
pub fn load_physics(path: Option<&Path>) -> Result<PhysicsConfig> {
    let Some(path) = path else {
        return Ok(PhysicsConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read physics config {}", path.display()))?;
    let config = ron::from_str(&text)
        .with_context(|| format!("failed to parse physics config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded physics config");
    Ok(config)
}

pub fn load_catalog(path: Option<&Path>) -> Result<VoxelCatalog> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read catalog {}", path.display()))?;
            VoxelCatalog::from_ron(&text)
                .with_context(|| format!("failed to parse catalog {}", path.display()))
        }
        None => VoxelCatalog::from_ron(DEFAULT_CATALOG).context("built-in catalog is invalid"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = load_catalog(None).unwrap();
        assert_eq!(catalog.len(), 4);
        assert!(catalog.get(voxel::VoxelTypeId(1)).unwrap().is_full_cube());
    }

    #[test]
    fn test_sample_physics_config_parses() {
        let text = include_str!("../assets/physics.ron");
        let config: PhysicsConfig = ron::from_str(text).unwrap();
        assert_eq!(config.subchunk_size, 16);
        assert_eq!(config.region_size, PhysicsConfig::default().region_size);
    }

    #[test]
    fn test_missing_config_falls_back_to_default() {
        assert_eq!(load_physics(None).unwrap(), PhysicsConfig::default());
    }
}
