//! Movement strategies: how a controller turns requested velocity into motion.
//!
//! Strategies work in subworld-relative coordinates. [`StepEnv`] converts to and from
//! world space at the backend boundary.

pub mod animated;
pub mod riding;
pub mod swimming;
pub mod walking;

pub use animated::AnimatedMotion;
pub use riding::RidingStrategy;
pub use swimming::{SwimTunables, SwimmingStrategy};
pub use walking::{PushContact, WalkingStrategy, WalkingTunables};

use std::fmt;

use super::animation::RootMotion;
use super::controller::ControllerState;
use super::math::{Point, Transform, Vec3};
use super::physics::{CollisionBackend, CollisionMask, MoveResult, ObjectId, SweepHit};

/// Backend access for one strategy step, expressed in the controller's frame.
pub struct StepEnv<'a> {
    backend: &'a mut dyn CollisionBackend,
    pub proxy: ObjectId,
    /// Subworld local-to-world; identity outside a subworld
    pub frame: Transform,
    pub dt: f32,
    pub radius: f32,
    pub height: f32,
}

impl<'a> StepEnv<'a> {
    pub fn new(
        backend: &'a mut dyn CollisionBackend,
        proxy: ObjectId,
        frame: Transform,
        dt: f32,
        radius: f32,
        height: f32,
    ) -> Self {
        Self {
            backend,
            proxy,
            frame,
            dt,
            radius,
            height,
        }
    }

    pub fn move_proxy(&mut self, displacement: Vec3, mask: CollisionMask) -> MoveResult {
        let world = self.frame.transform_vector(&displacement);
        let mut result = self.backend.move_proxy(self.proxy, world, mask, self.dt);
        result.translation = self.frame.inverse_transform_vector(&result.translation);
        for contact in &mut result.contacts {
            contact.normal = self.frame.inverse_transform_vector(&contact.normal);
        }
        result
    }

    pub fn sweep(&self, start: Point, end: Point, radius: f32, mask: CollisionMask) -> Vec<SweepHit> {
        let mut hits = self.backend.sweep_path(
            self.frame * start,
            self.frame * end,
            radius,
            mask,
            Some(self.proxy),
        );
        for hit in &mut hits {
            hit.point = self.frame.inverse_transform_point(&hit.point);
            hit.normal = self.frame.inverse_transform_vector(&hit.normal);
        }
        hits
    }

    pub fn object_velocity(&self, object: ObjectId) -> Option<Vec3> {
        self.backend
            .object_velocity(object)
            .map(|v| self.frame.inverse_transform_vector(&v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Walking,
    Swimming,
    Riding,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Walking => write!(f, "walking"),
            StrategyKind::Swimming => write!(f, "swimming"),
            StrategyKind::Riding => write!(f, "riding"),
        }
    }
}

/// The strategy bound to a controller.
#[derive(Debug, Clone)]
pub enum MovementStrategy {
    Walking(WalkingStrategy),
    Swimming(SwimmingStrategy),
    Riding(RidingStrategy),
}

impl MovementStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            MovementStrategy::Walking(_) => StrategyKind::Walking,
            MovementStrategy::Swimming(_) => StrategyKind::Swimming,
            MovementStrategy::Riding(_) => StrategyKind::Riding,
        }
    }

    pub fn apply(&mut self, state: &mut ControllerState, env: &mut StepEnv<'_>) {
        match self {
            MovementStrategy::Walking(s) => s.apply(state, env),
            MovementStrategy::Swimming(s) => s.apply(state, env),
            MovementStrategy::Riding(s) => s.apply(state, env),
        }
    }

    pub fn update(&mut self, state: &mut ControllerState, dt: f32) {
        match self {
            MovementStrategy::Walking(s) => s.update(state, dt),
            MovementStrategy::Swimming(s) => s.update(state),
            MovementStrategy::Riding(s) => s.update(state, dt),
        }
    }

    pub fn post_step(&mut self) {
        if let MovementStrategy::Riding(s) = self {
            s.post_step();
        }
    }

    pub fn reset(&mut self, state: &mut ControllerState, new_age: bool) {
        match self {
            MovementStrategy::Walking(s) => s.reset(state, new_age),
            MovementStrategy::Riding(s) => s.walking_mut().reset(state, new_age),
            MovementStrategy::Swimming(_) => {
                if new_age {
                    state.clear_contact_normals();
                }
            }
        }
    }

    pub fn recalc_velocity(&mut self, state: &mut ControllerState, motion: RootMotion, dt: f32) {
        match self {
            MovementStrategy::Walking(s) => s.recalc_velocity(state, motion, dt),
            MovementStrategy::Riding(s) => s.walking_mut().recalc_velocity(state, motion, dt),
            MovementStrategy::Swimming(s) => s.motion.recalc_velocity(state, motion, dt),
        }
    }

    pub fn is_on_ground(&self) -> bool {
        match self {
            MovementStrategy::Walking(s) => s.is_on_ground(),
            MovementStrategy::Riding(s) => s.walking().is_on_ground(),
            MovementStrategy::Swimming(s) => s.is_on_ground(),
        }
    }

    pub fn is_on_false_ground(&self) -> bool {
        match self {
            MovementStrategy::Walking(s) => s.is_on_false_ground(),
            MovementStrategy::Riding(s) => s.walking().is_on_false_ground(),
            MovementStrategy::Swimming(_) => false,
        }
    }

    pub fn motion_mut(&mut self) -> &mut AnimatedMotion {
        match self {
            MovementStrategy::Walking(s) => s.motion_mut(),
            MovementStrategy::Riding(s) => s.walking_mut().motion_mut(),
            MovementStrategy::Swimming(s) => s.motion_mut(),
        }
    }

    pub fn turn_strength(&self) -> f32 {
        match self {
            MovementStrategy::Walking(s) => s.motion().turn_strength(),
            MovementStrategy::Riding(s) => s.walking().motion().turn_strength(),
            MovementStrategy::Swimming(s) => s.motion().turn_strength(),
        }
    }

    /// Walking state, including the walker embedded in a riding strategy.
    pub fn walking(&self) -> Option<&WalkingStrategy> {
        match self {
            MovementStrategy::Walking(s) => Some(s),
            MovementStrategy::Riding(s) => Some(s.walking()),
            MovementStrategy::Swimming(_) => None,
        }
    }

    pub fn walking_mut(&mut self) -> Option<&mut WalkingStrategy> {
        match self {
            MovementStrategy::Walking(s) => Some(s),
            MovementStrategy::Riding(s) => Some(s.walking_mut()),
            MovementStrategy::Swimming(_) => None,
        }
    }

    pub fn swimming(&self) -> Option<&SwimmingStrategy> {
        match self {
            MovementStrategy::Swimming(s) => Some(s),
            _ => None,
        }
    }

    pub fn swimming_mut(&mut self) -> Option<&mut SwimmingStrategy> {
        match self {
            MovementStrategy::Swimming(s) => Some(s),
            _ => None,
        }
    }

    pub fn riding(&self) -> Option<&RidingStrategy> {
        match self {
            MovementStrategy::Riding(s) => Some(s),
            _ => None,
        }
    }
}
