use crate::avatar::animation::RootMotion;
use crate::avatar::constants::physics::TURN_EPSILON;
use crate::avatar::controller::ControllerState;

/// Turns root motion plus a brain-supplied turn rate into controller velocity.
/// Embedded in every strategy.
#[derive(Debug, Clone, Default)]
pub struct AnimatedMotion {
    turn_strength: f32,
}

impl AnimatedMotion {
    pub fn turn_strength(&self) -> f32 {
        self.turn_strength
    }

    pub fn set_turn_strength(&mut self, strength: f32) {
        self.turn_strength = if strength.is_finite() { strength } else { 0.0 };
    }

    pub fn recalc_velocity(&self, state: &mut ControllerState, motion: RootMotion, dt: f32) {
        let z_rot = motion.angular + self.turn_strength;
        if z_rot.abs() > TURN_EPSILON {
            state.increment_angle(z_rot * dt);
        }
        state.linear_velocity = motion.linear;
    }
}
