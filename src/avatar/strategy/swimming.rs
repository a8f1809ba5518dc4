use tracing::debug;

use super::animated::AnimatedMotion;
use super::StepEnv;
use crate::avatar::constants::physics::TURN_EPSILON;
use crate::avatar::controller::ControllerState;
use crate::avatar::math::{up, Vec3};
use crate::avatar::physics::CollisionMask;
use crate::avatar::swim_region::SwimRegion;
use crate::config::LocomotionConfig;

#[derive(Debug, Clone)]
pub struct SwimTunables {
    pub gravity: f32,
    pub terminal_velocity: f32,
    pub slope_limit: f32,
    pub full_buoyancy_depth: f32,
    pub buoyancy_divisor: f32,
    pub max_buoyancy: f32,
    pub bob_damping: f32,
    pub bob_speed_threshold: f32,
}

impl SwimTunables {
    pub fn from_config(config: &LocomotionConfig) -> Self {
        Self {
            gravity: config.physics.gravity,
            terminal_velocity: config.physics.terminal_velocity,
            slope_limit: config.physics.swimming_slope_limit,
            full_buoyancy_depth: config.swimming.full_buoyancy_depth,
            buoyancy_divisor: config.swimming.buoyancy_divisor,
            max_buoyancy: config.swimming.max_buoyancy,
            bob_damping: config.swimming.bob_damping,
            bob_speed_threshold: config.swimming.bob_speed_threshold,
        }
    }

    /// 0 is plain gravity, 1 is neutral, above 1 floats upward.
    pub fn buoyancy_at_depth(&self, depth: f32) -> f32 {
        if depth <= 0.0 {
            0.0
        } else if depth >= self.full_buoyancy_depth {
            self.max_buoyancy
        } else {
            depth / self.buoyancy_divisor
        }
    }
}

/// Buoyant movement inside a swim region, with optional water current.
#[derive(Debug, Clone)]
pub struct SwimmingStrategy {
    pub(super) motion: AnimatedMotion,
    tunables: SwimTunables,
    buoyancy: f32,
    region: Option<SwimRegion>,
    on_ground: bool,
    had_contacts: bool,
    applied_velocity: Vec3,
}

impl SwimmingStrategy {
    pub fn new(tunables: SwimTunables) -> Self {
        Self {
            motion: AnimatedMotion::default(),
            tunables,
            buoyancy: 0.0,
            region: None,
            on_ground: false,
            had_contacts: false,
            applied_velocity: Vec3::zeros(),
        }
    }

    pub fn from_config(config: &LocomotionConfig) -> Self {
        Self::new(SwimTunables::from_config(config))
    }

    pub fn set_surface(&mut self, region: Option<SwimRegion>) {
        debug!(surface = region.as_ref().map(|r| r.surface_height), "swim surface changed");
        self.region = region;
    }

    pub fn region(&self) -> Option<&SwimRegion> {
        self.region.as_ref()
    }

    pub fn surface_height(&self) -> Option<f32> {
        self.region.as_ref().map(|r| r.surface_height)
    }

    pub fn buoyancy(&self) -> f32 {
        self.buoyancy
    }

    pub fn is_on_ground(&self) -> bool {
        self.on_ground
    }

    pub fn had_contacts(&self) -> bool {
        self.had_contacts
    }

    pub fn applied_velocity(&self) -> Vec3 {
        self.applied_velocity
    }

    pub fn motion(&self) -> &AnimatedMotion {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut AnimatedMotion {
        &mut self.motion
    }

    fn adjust_buoyancy(&mut self, world_z: f32) {
        self.buoyancy = match &self.region {
            None => 0.0,
            Some(region) => self.tunables.buoyancy_at_depth(region.surface_height - world_z),
        };
    }

    pub fn apply(&mut self, state: &mut ControllerState, env: &mut StepEnv<'_>) {
        let dt = env.dt;
        let mut velocity = state.linear_velocity;
        let achieved = state.achieved_linear_velocity();
        let world_feet = env.frame * state.position;

        self.adjust_buoyancy(world_feet.z);

        // Damp bobbing at the surface
        let retardant = if achieved.z.abs() > self.tunables.bob_speed_threshold {
            achieved.z * -self.tunables.bob_damping
        } else {
            0.0
        };
        let z_acc = (1.0 - self.buoyancy) * self.tunables.gravity + retardant;
        velocity.z += z_acc * dt;
        velocity.z += achieved.z;

        if let Some(region) = &self.region {
            let current = region.current_at(&world_feet);
            if current.angular.abs() > TURN_EPSILON {
                state.increment_angle(current.angular * dt);
            }
            velocity += env.frame.inverse_transform_vector(&current.linear);
            if velocity.z > region.max_upward_velocity {
                velocity.z = region.max_upward_velocity;
            }
        }

        if velocity.z < self.tunables.terminal_velocity {
            velocity.z = self.tunables.terminal_velocity;
        }
        self.applied_velocity = velocity;

        self.had_contacts = false;
        self.on_ground = false;
        state.rotate_contact_normals();

        let result = env.move_proxy(velocity * dt, CollisionMask::avatar_movement(state.seeking));
        self.had_contacts = result.flags.bottom || result.flags.sides;
        for contact in &result.contacts {
            if contact.normal.dot(&up()) >= self.tunables.slope_limit {
                self.on_ground = true;
            }
        }
        state.collision_flags = result.flags;
    }

    pub fn update(&mut self, state: &mut ControllerState) {
        state.linear_velocity = Vec3::zeros();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::math::{Point, Quat, Transform};
    use crate::avatar::physics::{CollisionBackend, ObjectId, PlaneWorld};
    use crate::avatar::swim_region::{Current, Falloff};

    const AVATAR: ObjectId = ObjectId(7);
    const DT: f32 = 1.0 / 60.0;

    fn tunables() -> SwimTunables {
        SwimTunables::from_config(&LocomotionConfig::default())
    }

    #[test]
    fn test_buoyancy_by_depth() {
        let t = tunables();
        assert_eq!(t.buoyancy_at_depth(-1.0), 0.0);
        assert_eq!(t.buoyancy_at_depth(0.0), 0.0);
        assert_eq!(t.buoyancy_at_depth(2.0), 0.5);
        assert_eq!(t.buoyancy_at_depth(5.0), 3.0);
        assert_eq!(t.buoyancy_at_depth(6.0), 3.0);
    }

    #[test]
    fn test_buoyancy_never_decreases_with_depth() {
        let t = tunables();
        let mut last = t.buoyancy_at_depth(-10.0);
        let mut depth = -10.0;
        while depth < 20.0 {
            let b = t.buoyancy_at_depth(depth);
            assert!(b >= last, "buoyancy dropped at depth {depth}");
            last = b;
            depth += 0.1;
        }
    }

    #[test]
    fn test_no_region_means_plain_gravity() {
        let mut world = PlaneWorld::new();
        world.add_avatar_proxy(AVATAR, Point::new(0.0, 0.0, 50.0), 1.1, 6.0);
        let mut state = ControllerState::new(Point::new(0.0, 0.0, 50.0), Quat::identity());
        let mut swim = SwimmingStrategy::new(tunables());

        let mut env = StepEnv::new(&mut world, AVATAR, Transform::identity(), DT, 1.1, 6.0);
        swim.apply(&mut state, &mut env);
        assert_eq!(swim.buoyancy(), 0.0);
        assert!((swim.applied_velocity().z - tunables().gravity * DT).abs() < 1e-5);
    }

    #[test]
    fn test_deep_swimmer_rises_toward_surface() {
        let mut world = PlaneWorld::new();
        let feet = Point::new(0.0, 0.0, -20.0);
        world.add_avatar_proxy(AVATAR, feet, 1.1, 6.0);
        let mut state = ControllerState::new(feet, Quat::identity());
        let mut swim = SwimmingStrategy::new(tunables());
        swim.set_surface(Some(SwimRegion::still(0.0)));

        for _ in 0..30 {
            let mut env = StepEnv::new(&mut world, AVATAR, Transform::identity(), DT, 1.1, 6.0);
            swim.apply(&mut state, &mut env);
            state.commit_position(world.proxy_position(AVATAR).unwrap(), DT);
            swim.update(&mut state);
        }
        assert_eq!(swim.buoyancy(), 3.0);
        assert!(state.position.z > -20.0, "buoyancy should lift the swimmer");
        assert!(
            state.achieved_linear_velocity().z <= 5.0 + 1e-3,
            "rise is capped by the region's upward limit"
        );
    }

    #[test]
    fn test_current_turns_and_pushes_swimmer() {
        let mut world = PlaneWorld::new();
        let feet = Point::new(6.0, 0.0, -4.0);
        world.add_avatar_proxy(AVATAR, feet, 1.1, 6.0);
        let mut state = ControllerState::new(feet, Quat::identity());
        let mut swim = SwimmingStrategy::new(tunables());
        swim.set_surface(Some(SwimRegion {
            surface_height: 0.0,
            max_upward_velocity: 5.0,
            current: Current::Circular {
                center: Point::origin(),
                rotation: 1.0,
                pull: Falloff {
                    near_distance: 0.0,
                    near_velocity: 0.0,
                    far_distance: 1.0,
                    far_velocity: 0.0,
                },
            },
        }));

        let mut env = StepEnv::new(&mut world, AVATAR, Transform::identity(), DT, 1.1, 6.0);
        swim.apply(&mut state, &mut env);
        let heading = crate::avatar::math::heading(&state.rotation);
        assert!((heading - DT).abs() < 1e-4, "current spins the avatar, got {heading}");
        assert!((swim.applied_velocity().y - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_seafloor_contact_counts_as_ground() {
        let mut world = PlaneWorld::with_ground(-10.0);
        let feet = Point::new(0.0, 0.0, -10.0);
        world.add_avatar_proxy(AVATAR, feet, 1.1, 6.0);
        let mut state = ControllerState::new(feet, Quat::identity());
        let mut swim = SwimmingStrategy::new(tunables());
        // Surface right at the head so buoyancy stays below neutral
        swim.set_surface(Some(SwimRegion::still(-7.0)));

        let mut env = StepEnv::new(&mut world, AVATAR, Transform::identity(), DT, 1.1, 6.0);
        swim.apply(&mut state, &mut env);
        assert!(swim.is_on_ground());
        assert!(swim.had_contacts());
    }
}
