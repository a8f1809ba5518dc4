use tracing::trace;

use super::walking::WalkingStrategy;
use super::StepEnv;
use crate::avatar::constants::physics::EPSILON;
use crate::avatar::controller::ControllerState;
use crate::avatar::math::{horizontal, up};
use crate::avatar::physics::CollisionMask;

/// Walking on top of moving geometry. The avatar inherits the fastest vertical
/// velocity of whatever it stands on and gets nudged over small rises.
#[derive(Debug, Clone)]
pub struct RidingStrategy {
    walking: WalkingStrategy,
    start_jump: bool,
    need_nudge: bool,
    ground_velocity: Option<f32>,
}

impl RidingStrategy {
    pub fn new(walking: WalkingStrategy) -> Self {
        Self {
            walking,
            start_jump: false,
            need_nudge: false,
            ground_velocity: None,
        }
    }

    pub fn walking(&self) -> &WalkingStrategy {
        &self.walking
    }

    pub fn walking_mut(&mut self) -> &mut WalkingStrategy {
        &mut self.walking
    }

    pub fn into_walking(self) -> WalkingStrategy {
        self.walking
    }

    /// Vertical velocity of the ground found by the last sweep.
    pub fn ground_velocity(&self) -> Option<f32> {
        self.ground_velocity
    }

    pub fn needed_nudge(&self) -> bool {
        self.need_nudge
    }

    pub fn apply(&mut self, state: &mut ControllerState, env: &mut StepEnv<'_>) {
        let dt = env.dt;
        let walk = &mut self.walking;
        let achieved = state.achieved_linear_velocity();
        let requested = state.linear_velocity;
        let mut velocity = requested;

        // A grounded brain asking for upward speed is starting a jump
        if walk.is_on_ground() && requested.z > EPSILON {
            self.start_jump = true;
        }

        walk.add_gravity(&mut velocity, &achieved, dt);
        if velocity.z < walk.tunables.terminal_velocity {
            velocity.z = walk.tunables.terminal_velocity;
        }

        walk.clear_move_flags();
        state.rotate_contact_normals();

        let ground_mask =
            CollisionMask::STATIC | CollisionMask::AVATAR_BLOCKER | CollisionMask::DYNAMIC;
        let margin = walk.tunables.ride_sweep_margin;
        let foot_center = state.position + up() * env.radius;
        let hits = env.sweep(
            foot_center + up() * margin,
            foot_center - up() * margin,
            env.radius,
            ground_mask,
        );
        self.ground_velocity = hits
            .iter()
            .filter(|hit| hit.normal.dot(&up()) >= walk.tunables.slope_limit)
            .filter_map(|hit| env.object_velocity(hit.object))
            .map(|v| v.z)
            .reduce(f32::max);

        if let Some(ground_z) = self.ground_velocity {
            if !self.start_jump {
                walk.ground_hit = true;
                velocity.z += ground_z;
            }
        }

        // Probe down at the destination for a rise low enough to step onto
        self.need_nudge = false;
        let travel = horizontal(&(velocity * dt));
        if self.ground_velocity.is_some() && travel.norm_squared() > 0.0 {
            let dest = foot_center + travel;
            let rise = env
                .sweep(
                    dest + up() * walk.tunables.step_height,
                    dest,
                    env.radius,
                    CollisionMask::STATIC | CollisionMask::AVATAR_BLOCKER,
                )
                .iter()
                .filter(|hit| hit.normal.dot(&up()) >= walk.tunables.slope_limit)
                .map(|hit| hit.point.z - state.position.z)
                .filter(|rise| *rise > EPSILON && *rise <= walk.tunables.step_height)
                .reduce(f32::max);
            if let Some(rise) = rise {
                self.need_nudge = true;
                velocity.z = velocity.z.max(rise / dt);
            }
        }

        walk.applied_velocity = velocity;
        let result = env.move_proxy(velocity * dt, CollisionMask::avatar_movement(state.seeking));
        walk.process_move(state, &result);
        trace!(
            ground_velocity = self.ground_velocity,
            nudge = self.need_nudge,
            start_jump = self.start_jump,
            "riding step"
        );
    }

    /// Consumes the jump latch so the avatar leaves the platform this frame.
    pub fn post_step(&mut self) {
        if self.start_jump {
            self.walking.ground_hit = false;
            self.walking.false_ground = false;
            self.start_jump = false;
        }
    }

    pub fn update(&mut self, state: &mut ControllerState, dt: f32) {
        self.walking.update(state, dt);
    }
}
