//! Rigid body lifecycle for one grid
//!
//! A [`GridBody`] owns at most one live Rapier body. Rebuilding swaps the old
//! body out and the new one in; at no point are two bodies for the same grid
//! attached to the world.

use crate::config::PhysicsConfig;
use crate::error::{GridError, Result};
use crate::math::{from_rotation, from_vector, to_isometry, to_vector};
use crate::shape::{GridShape, GridShapeBuilder, VoxelSample};
use crate::transform::GridTransform;
use crate::world::PhysicsWorld;
use glam::{Quat, Vec3};
use rapier3d::prelude::*;

/// Handles of an attached grid body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyHandles {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
}

/// Declared world placement of local (0,0,0) at spawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPose {
    pub origin: Vec3,
    pub rotation: Quat,
}

impl SpawnPose {
    pub fn new(origin: Vec3, rotation: Quat) -> Self {
        Self {
            origin,
            rotation: rotation.normalize(),
        }
    }

    pub fn at(origin: Vec3) -> Self {
        Self::new(origin, Quat::IDENTITY)
    }
}

/// Simulation state carried across a rebuild
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySnapshot {
    /// World position of the body origin (old centroid)
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    /// Centroid the body was built around
    pub centroid: Vec3,
    pub dynamic: bool,
}

impl BodySnapshot {
    fn capture(body: &RigidBody, centroid: Vec3) -> Self {
        Self {
            position: from_vector(body.translation()),
            rotation: from_rotation(body.rotation()),
            linear_velocity: from_vector(body.linvel()),
            angular_velocity: from_vector(body.angvel()),
            centroid,
            dynamic: body.is_dynamic(),
        }
    }

    /// World position of local (0,0,0)
    pub fn local_origin(&self) -> Vec3 {
        self.position - self.rotation * self.centroid
    }
}

/// Result of the per-tick damping/sleep pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Velocities fell below the threshold; the body was put to sleep
    FellAsleep,
    /// Already sleeping; velocities held at zero
    Sleeping,
    /// Awake; velocities damped
    Damped,
    /// No body attached
    Detached,
}

/// The simulated body of one grid
pub struct GridBody {
    handles: Option<BodyHandles>,
    spawn: SpawnPose,
    shape: Option<GridShape>,
    asleep: bool,
    dynamic: bool,
    rebuilds: u64,
}

impl GridBody {
    /// A body that is not yet attached; the first [`rebuild`](Self::rebuild)
    /// places it at `spawn`
    pub fn new(spawn: SpawnPose) -> Self {
        Self {
            handles: None,
            spawn,
            shape: None,
            asleep: false,
            dynamic: true,
            rebuilds: 0,
        }
    }

    /// Replace the live handles, returning the old ones
    fn swap_handles(&mut self, next: Option<BodyHandles>) -> Option<BodyHandles> {
        std::mem::replace(&mut self.handles, next)
    }

    /// Regenerate shape and mass, keeping position, rotation and velocity
    ///
    /// On success the new body is attached; on error no body is attached.
    ///
    /// # Arguments
    /// * `world` - Shared simulation world
    /// * `builder` - Shape builder (owns the per-type cache)
    /// * `voxels` - Full voxel map of the grid
    /// * `config` - Damping, filter and threshold constants
    pub fn rebuild(
        &mut self,
        world: &mut PhysicsWorld,
        builder: &mut GridShapeBuilder,
        voxels: &[VoxelSample],
        config: &PhysicsConfig,
    ) -> Result<&GridShape> {
        // 1. Snapshot
        let old_centroid = self.centroid();
        let snapshot = self
            .handles
            .and_then(|h| world.get_rigid_body(h.body))
            .map(|body| BodySnapshot::capture(body, old_centroid));
        if let Some(snapshot) = &snapshot {
            self.dynamic = snapshot.dynamic;
        }

        // 2. Freeze and detach
        self.detach(world);

        // 3. Shape and mass
        let shape = builder.build(voxels);

        // 4. Target pose
        let (position, rotation) = match &snapshot {
            Some(s) => (s.local_origin() + s.rotation * shape.centroid, s.rotation),
            None => (
                self.spawn.origin + self.spawn.rotation * shape.centroid,
                self.spawn.rotation,
            ),
        };
        if !position.is_finite() || !rotation.is_finite() || !shape.mass.is_finite() {
            tracing::error!(
                ?position,
                ?rotation,
                mass = shape.mass,
                "grid rebuild produced a degenerate pose"
            );
            self.shape = None;
            return Err(GridError::DegenerateTransform);
        }

        // 5. New body, kinematic until attached
        let body = RigidBodyBuilder::kinematic_position_based()
            .position(to_isometry(position, rotation))
            .additional_mass_properties(shape.mass_properties)
            .linear_damping(config.linear_damping)
            .angular_damping(config.angular_damping)
            .build();
        let collider = ColliderBuilder::new(shape.shape.clone())
            .density(0.0)
            .friction(config.friction)
            .collision_groups(InteractionGroups::new(
                Group::from_bits_truncate(config.collision_group),
                Group::from_bits_truncate(config.collision_mask),
            ))
            .build();

        // 7. Attach, restore dynamics, clear forces
        let body_handle = world.add_rigid_body(body);
        let collider_handle = world.add_collider(collider, body_handle);
        if self.dynamic {
            if let Some(body) = world.get_rigid_body_mut(body_handle) {
                body.set_body_type(RigidBodyType::Dynamic, true);
            }
        }
        world.refresh_mass_properties(body_handle);
        if let Some(body) = world.get_rigid_body_mut(body_handle) {
            // 6. Restore velocity above the noise threshold
            if let Some(s) = &snapshot {
                if s.linear_velocity.length() > config.velocity_restore_threshold {
                    body.set_linvel(to_vector(s.linear_velocity), true);
                }
                if s.angular_velocity.length() > config.velocity_restore_threshold {
                    body.set_angvel(to_vector(s.angular_velocity), true);
                }
            }

            body.reset_forces(false);
            body.reset_torques(false);
        }

        let previous = self.swap_handles(Some(BodyHandles {
            body: body_handle,
            collider: collider_handle,
        }));
        debug_assert!(previous.is_none(), "rebuild found a body still attached");

        self.asleep = false;
        self.rebuilds += 1;
        tracing::debug!(
            mass = shape.mass,
            centroid = ?shape.centroid,
            primitives = shape.primitive_count(),
            restored = snapshot.is_some(),
            "grid body rebuilt"
        );

        Ok(self.shape.insert(shape))
    }

    /// Make the body kinematic and remove it from the world
    pub fn detach(&mut self, world: &mut PhysicsWorld) {
        if let Some(handles) = self.swap_handles(None) {
            if let Some(body) = world.get_rigid_body_mut(handles.body) {
                body.set_body_type(RigidBodyType::KinematicPositionBased, false);
            }
            world.remove_rigid_body(handles.body);
        }
    }

    /// Artificial damping and sleep
    ///
    /// Below `sleep_threshold` in both linear and angular speed the velocities
    /// are forced to zero and the body sleeps. Otherwise velocities are scaled
    /// by the damping factors and the body is kept awake.
    pub fn settle(&mut self, world: &mut PhysicsWorld, config: &PhysicsConfig) -> SettleOutcome {
        let Some(body) = self.handles.and_then(|h| world.get_rigid_body_mut(h.body)) else {
            return SettleOutcome::Detached;
        };

        let linear = body.linvel().norm();
        let angular = body.angvel().norm();

        if linear < config.sleep_threshold && angular < config.sleep_threshold {
            body.set_linvel(Vector::zeros(), false);
            body.set_angvel(Vector::zeros(), false);
            if self.asleep {
                return SettleOutcome::Sleeping;
            }
            body.sleep();
            self.asleep = true;
            SettleOutcome::FellAsleep
        } else {
            let linvel = *body.linvel() * config.linear_damping_factor;
            let angvel = *body.angvel() * config.angular_damping_factor;
            body.set_linvel(linvel, true);
            body.set_angvel(angvel, true);
            body.wake_up(true);
            self.asleep = false;
            SettleOutcome::Damped
        }
    }

    /// Apply an instantaneous impulse at the centroid
    pub fn apply_impulse(&mut self, world: &mut PhysicsWorld, impulse: Vec3) {
        if let Some(body) = self.handles.and_then(|h| world.get_rigid_body_mut(h.body)) {
            body.apply_impulse(to_vector(impulse), true);
            self.asleep = false;
        }
    }

    /// Add a torque that acts until forces are next cleared
    pub fn add_torque(&mut self, world: &mut PhysicsWorld, torque: Vec3) {
        if let Some(body) = self.handles.and_then(|h| world.get_rigid_body_mut(h.body)) {
            body.add_torque(to_vector(torque), true);
            self.asleep = false;
        }
    }

    /// Place local (0,0,0) at `origin` with `rotation`, keeping velocities
    ///
    /// # Returns
    /// `false` when no body is attached
    pub fn teleport(&mut self, world: &mut PhysicsWorld, origin: Vec3, rotation: Quat) -> bool {
        let centroid = self.centroid();
        let Some(body) = self.handles.and_then(|h| world.get_rigid_body_mut(h.body)) else {
            return false;
        };
        body.set_position(to_isometry(origin + rotation * centroid, rotation), true);
        self.asleep = false;
        true
    }

    /// Drop accumulated user forces and torques
    pub fn clear_forces(&self, world: &mut PhysicsWorld) {
        if let Some(body) = self.handles.and_then(|h| world.get_rigid_body_mut(h.body)) {
            body.reset_forces(false);
            body.reset_torques(false);
        }
    }

    /// Live pose of the rigid body, which sits on the centroid
    pub fn transform(&self, world: &PhysicsWorld) -> Option<GridTransform> {
        let body = world.get_rigid_body(self.handles?.body)?;
        Some(GridTransform::new(
            from_vector(body.translation()),
            from_rotation(body.rotation()),
        ))
    }

    pub fn linear_velocity(&self, world: &PhysicsWorld) -> Option<Vec3> {
        let body = world.get_rigid_body(self.handles?.body)?;
        Some(from_vector(body.linvel()))
    }

    pub fn angular_velocity(&self, world: &PhysicsWorld) -> Option<Vec3> {
        let body = world.get_rigid_body(self.handles?.body)?;
        Some(from_vector(body.angvel()))
    }

    pub fn handles(&self) -> Option<BodyHandles> {
        self.handles
    }

    pub fn is_attached(&self) -> bool {
        self.handles.is_some()
    }

    pub fn is_sleeping(&self) -> bool {
        self.asleep
    }

    /// Shape from the last successful rebuild
    pub fn shape(&self) -> Option<&GridShape> {
        self.shape.as_ref()
    }

    pub fn centroid(&self) -> Vec3 {
        self.shape.as_ref().map_or(Vec3::ZERO, |s| s.centroid)
    }

    pub fn mass(&self) -> f32 {
        self.shape.as_ref().map_or(0.0, |s| s.mass)
    }

    /// Number of completed rebuilds
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}
