use crate::avatar::constants::physics::NORMAL_DEDUPE_EPSILON;
use crate::avatar::math::{self, Point, Quat, Vec3};
use crate::avatar::physics::{CollisionFlags, ObjectId};

/// Physical state of one avatar. Positions and velocities are subworld-relative,
/// or world-relative outside a subworld.
#[derive(Debug, Clone)]
pub struct ControllerState {
    /// Feet position
    pub position: Point,
    pub last_position: Point,
    pub rotation: Quat,
    /// Requested velocity. Avatar-local until the controller converts it in `apply`.
    pub linear_velocity: Vec3,
    /// Requested turn rate about Z
    pub angular_velocity: f32,
    achieved_linear_velocity: Vec3,
    pub enabled: bool,
    pub kinematic: bool,
    pub subworld: Option<ObjectId>,
    /// Sliding normals from this frame's move
    pub contact_normals: Vec<Vec3>,
    /// Sliding normals from the previous move
    pub prev_contact_normals: Vec<Vec3>,
    pub collision_flags: CollisionFlags,
    /// While seeking, exclude regions stop blocking the avatar
    pub seeking: bool,
    /// Length of the step the last `apply` simulated
    pub sim_length: f32,
    normal_epsilon: f32,
}

impl ControllerState {
    pub fn new(position: Point, rotation: Quat) -> Self {
        Self {
            position,
            last_position: position,
            rotation,
            linear_velocity: Vec3::zeros(),
            angular_velocity: 0.0,
            achieved_linear_velocity: Vec3::zeros(),
            enabled: true,
            kinematic: false,
            subworld: None,
            contact_normals: Vec::new(),
            prev_contact_normals: Vec::new(),
            collision_flags: CollisionFlags::default(),
            seeking: false,
            sim_length: 0.0,
            normal_epsilon: NORMAL_DEDUPE_EPSILON,
        }
    }

    pub fn with_normal_epsilon(mut self, epsilon: f32) -> Self {
        self.normal_epsilon = epsilon;
        self
    }

    pub fn achieved_linear_velocity(&self) -> Vec3 {
        self.achieved_linear_velocity
    }

    pub fn override_achieved_linear_velocity(&mut self, velocity: Vec3) {
        self.achieved_linear_velocity = velocity;
    }

    /// Records where the move ended and derives the achieved velocity from it.
    pub fn commit_position(&mut self, position: Point, dt: f32) {
        self.last_position = self.position;
        self.position = position;
        self.achieved_linear_velocity = if dt > 0.0 {
            (self.position - self.last_position) / dt
        } else {
            Vec3::zeros()
        };
    }

    pub fn increment_angle(&mut self, delta: f32) {
        self.rotation = math::increment_angle(&self.rotation, delta);
    }

    /// Adds a sliding normal unless an equal one (per component, within epsilon) is present.
    pub fn add_sliding_normal(&mut self, normal: Vec3) {
        let eps = self.normal_epsilon;
        let duplicate = self
            .contact_normals
            .iter()
            .any(|n| (n - normal).iter().all(|d| d.abs() <= eps));
        if !duplicate {
            self.contact_normals.push(normal);
        }
    }

    /// Moves this frame's normals into the previous set before a new move.
    pub fn rotate_contact_normals(&mut self) {
        std::mem::swap(&mut self.contact_normals, &mut self.prev_contact_normals);
        self.contact_normals.clear();
    }

    pub fn clear_contact_normals(&mut self) {
        self.contact_normals.clear();
        self.prev_contact_normals.clear();
    }
}

/// Enable and kinematic requests waiting for the next reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PendingChanges {
    pub enable: bool,
    pub leave_kinematic: bool,
    pub kinematic_enable_next_update: bool,
}

impl PendingChanges {
    pub fn any(&self) -> bool {
        self.enable || self.leave_kinematic || self.kinematic_enable_next_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_duplicate_normals_are_dropped() {
        let mut state = ControllerState::new(Point::origin(), Quat::identity());
        state.add_sliding_normal(Vec3::new(1.0, 0.0, 0.0));
        state.add_sliding_normal(Vec3::new(0.995, 0.005, 0.0));
        state.add_sliding_normal(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(state.contact_normals.len(), 2);
    }

    #[test]
    fn test_rotate_keeps_one_frame_of_history() {
        let mut state = ControllerState::new(Point::origin(), Quat::identity());
        state.add_sliding_normal(Vec3::x());
        state.rotate_contact_normals();
        assert!(state.contact_normals.is_empty());
        assert_eq!(state.prev_contact_normals, vec![Vec3::x()]);
        state.rotate_contact_normals();
        assert!(state.prev_contact_normals.is_empty());
    }

    #[test]
    fn test_commit_position_derives_velocity() {
        let mut state = ControllerState::new(Point::origin(), Quat::identity());
        state.commit_position(Point::new(1.0, 0.0, -0.5), 0.5);
        assert_eq!(state.achieved_linear_velocity(), Vec3::new(2.0, 0.0, -1.0));
        state.commit_position(Point::new(1.0, 0.0, -0.5), 0.0);
        assert_eq!(state.achieved_linear_velocity(), Vec3::zeros());
    }
}
