use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// World-space pose of a grid
///
/// `position` is where local (0,0,0) lands. A local position `p` lands at
/// `position + rotation * p`, so the pose does not move when a rebuild shifts
/// the centroid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl GridTransform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Blend towards `other`: lerp for position, slerp for rotation
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation.slerp(other.rotation, t),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }

    /// Equal within `epsilon` in position and rotation
    pub fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && (self.rotation.abs_diff_eq(other.rotation, epsilon)
                || self.rotation.abs_diff_eq(-other.rotation, epsilon))
    }
}

impl Default for GridTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Pose differences below this are rebuild rounding, not motion
const PUBLISH_EPSILON: f32 = 1e-4;

/// Previous/current transform pair for interpolated presentation
///
/// Both halves move together, once per tick in which the pose changed.
/// Readers copy the pair out; it is never borrowed across a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformFrame {
    pub previous: GridTransform,
    pub current: GridTransform,
    /// Tick that last changed the pair
    pub tick: u64,
}

impl TransformFrame {
    /// Both halves at `initial`
    pub fn new(initial: GridTransform, tick: u64) -> Self {
        Self {
            previous: initial,
            current: initial,
            tick,
        }
    }

    /// Publish a fresh pose
    ///
    /// # Returns
    /// `true` when the pair changed. A pose within rounding noise of
    /// `current` leaves the pair untouched.
    pub fn publish(&mut self, next: GridTransform, tick: u64) -> bool {
        if next.abs_diff_eq(&self.current, PUBLISH_EPSILON) {
            return false;
        }
        self.previous = self.current;
        self.current = next;
        self.tick = tick;
        true
    }

    /// Pose between the two halves; `fraction` is clamped to [0, 1]
    pub fn interpolate(&self, fraction: f32) -> GridTransform {
        let t = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.previous.lerp(&self.current, t)
    }
}
