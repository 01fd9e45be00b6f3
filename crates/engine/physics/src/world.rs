use crate::math::to_vector;
use glam::Vec3;
use rapier3d::prelude::*;

/// Shared physics simulation world
///
/// Owns every rigid body and collider the grids place into the simulation,
/// plus any static host geometry. This is a wrapper around Rapier's physics
/// pipeline with a fixed-timestep accumulator on top.
pub struct PhysicsWorld {
    pub(crate) rigid_body_set: RigidBodySet,
    pub(crate) collider_set: ColliderSet,
    pub(crate) impulse_joint_set: ImpulseJointSet,
    pub(crate) multibody_joint_set: MultibodyJointSet,
    pub(crate) integration_parameters: IntegrationParameters,
    pub(crate) physics_pipeline: PhysicsPipeline,
    pub(crate) island_manager: IslandManager,
    pub(crate) broad_phase: DefaultBroadPhase,
    pub(crate) narrow_phase: NarrowPhase,
    pub(crate) ccd_solver: CCDSolver,
    gravity: Vector<Real>,
    /// Simulated time not yet consumed by a fixed step
    accumulator: f32,
    /// Body holding static host colliders
    static_body: Option<RigidBodyHandle>,
}

impl PhysicsWorld {
    /// Create a new physics world with specified gravity
    ///
    /// # Arguments
    /// * `gravity` - Gravity vector (e.g., Vec3::new(0.0, -9.81, 0.0))
    pub fn new(gravity: Vec3) -> Self {
        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            gravity: to_vector(gravity),
            accumulator: 0.0,
            static_body: None,
        }
    }

    /// Step the physics simulation forward by dt seconds
    ///
    /// # Arguments
    /// * `dt` - Time step in seconds (typically 1/60 = 0.016666...)
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    /// Advance simulated time by `elapsed` seconds in fixed steps
    ///
    /// Runs at most `max_substeps` steps of `fixed_dt`. Time left over once the
    /// cap is reached is discarded so a slow host never falls further behind.
    ///
    /// # Returns
    /// Number of fixed steps taken
    pub fn advance(&mut self, elapsed: f32, fixed_dt: f32, max_substeps: u32) -> u32 {
        if fixed_dt <= 0.0 || !elapsed.is_finite() {
            return 0;
        }

        self.accumulator += elapsed.max(0.0);
        let mut steps = 0;
        while self.accumulator >= fixed_dt && steps < max_substeps {
            self.step(fixed_dt);
            self.accumulator -= fixed_dt;
            steps += 1;
        }

        if self.accumulator >= fixed_dt {
            tracing::warn!(
                dropped = self.accumulator,
                max_substeps,
                "simulation fell behind; dropping accumulated time"
            );
            self.accumulator = 0.0;
        }

        steps
    }

    /// Add a rigid body to the world
    ///
    /// # Returns
    /// Handle to the added rigid body
    pub fn add_rigid_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(body)
    }

    /// Remove a rigid body from the world
    ///
    /// Also removes all associated colliders automatically.
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) -> Option<RigidBody> {
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        )
    }

    /// Add a collider to the world, attached to a rigid body
    ///
    /// # Returns
    /// Handle to the added collider
    pub fn add_collider(&mut self, collider: Collider, parent: RigidBodyHandle) -> ColliderHandle {
        self.collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set)
    }

    /// Add immobile host geometry (ground, static world voxels)
    pub fn add_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        let parent = match self.static_body {
            Some(handle) => handle,
            None => {
                let handle = self.add_rigid_body(RigidBodyBuilder::fixed().build());
                self.static_body = Some(handle);
                handle
            }
        };
        self.add_collider(collider, parent)
    }

    /// Bring a body's effective mass up to date with its colliders and type
    ///
    /// Rapier otherwise defers this to the next step.
    pub fn refresh_mass_properties(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.recompute_mass_properties_from_colliders(&self.collider_set);
        }
    }

    /// Get a reference to a rigid body
    pub fn get_rigid_body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.rigid_body_set.get(handle)
    }

    /// Get a mutable reference to a rigid body
    pub fn get_rigid_body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.rigid_body_set.get_mut(handle)
    }

    /// Number of bodies currently in the simulation
    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }
}
