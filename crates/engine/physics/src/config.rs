use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Tunable constants for grid simulation
///
/// The damping factors, sleep threshold and inertia multiplier are empirical
/// stabilizers for voxel-edge contact noise. They are tuned for unit voxels of
/// roughly unit mass and should be re-tuned for other scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector applied by the shared world
    pub gravity: Vec3,
    /// Wall time covered by one host tick in seconds
    pub tick_duration: f32,
    /// Simulation sub-step in seconds
    pub fixed_timestep: f32,
    /// Maximum sub-steps taken per tick
    pub max_substeps: u32,
    /// Mass of a single voxel
    pub voxel_mass: f32,
    /// Scale applied to shape-derived rotational inertia
    pub inertia_multiplier: f32,
    /// Below this linear and angular speed a grid is put to sleep
    pub sleep_threshold: f32,
    /// Per-tick multiplier on linear velocity while awake
    pub linear_damping_factor: f32,
    /// Per-tick multiplier on angular velocity while awake
    pub angular_damping_factor: f32,
    /// Rapier linear damping on grid bodies
    pub linear_damping: f32,
    /// Rapier angular damping on grid bodies
    pub angular_damping: f32,
    /// Velocities at or below this are not carried across a rebuild
    pub velocity_restore_threshold: f32,
    /// Sub-boxes thinner than this are dropped from complex voxels
    pub decomposition_tolerance: f32,
    /// Edge length of the activation cells (subchunks)
    pub subchunk_size: i32,
    /// Edge length of one storage region
    pub region_size: i32,
    /// Maximum number of regions allocated at once
    pub region_capacity: u32,
    /// Storage-frame origin of region slot 0
    pub storage_base: IVec3,
    /// Collision group memberships of grid colliders
    pub collision_group: u32,
    /// Collision groups grid colliders interact with
    pub collision_mask: u32,
    /// Contact friction of grid colliders
    pub friction: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            tick_duration: 1.0 / 20.0,
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 10,
            voxel_mass: voxel::DEFAULT_VOXEL_MASS,
            inertia_multiplier: 3.0,
            sleep_threshold: 0.05,
            linear_damping_factor: 0.95,
            angular_damping_factor: 0.90,
            linear_damping: 0.1,
            angular_damping: 0.1,
            velocity_restore_threshold: 0.01,
            decomposition_tolerance: 1e-3,
            subchunk_size: 16,
            region_size: 1024,
            region_capacity: 4096,
            storage_base: IVec3::ZERO,
            collision_group: 0x0000_0001,
            collision_mask: u32::MAX,
            friction: 0.7,
        }
    }
}

impl PhysicsConfig {
    /// Offset from a region's origin to local (0,0,0)
    pub fn center_offset(&self) -> IVec3 {
        IVec3::splat(self.region_size / 2)
    }

    /// Same configuration without gravity, handy for isolated simulations
    pub fn weightless() -> Self {
        Self {
            gravity: Vec3::ZERO,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_offset_is_region_midpoint() {
        let config = PhysicsConfig::default();
        assert_eq!(config.center_offset(), IVec3::splat(512));
    }

    #[test]
    fn test_inertia_multiplier_in_stable_range() {
        let config = PhysicsConfig::default();
        assert!((2.0..=5.0).contains(&config.inertia_multiplier));
    }
}
