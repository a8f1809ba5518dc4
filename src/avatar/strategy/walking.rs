use tracing::trace;

use super::animated::AnimatedMotion;
use super::StepEnv;
use crate::avatar::constants::physics::{GRAVITY_APPLY_EPSILON, MIN_GROUND_PROBE};
use crate::avatar::controller::{false_ground, ControllerState};
use crate::avatar::math::{up, Vec3};
use crate::avatar::physics::{CollisionFlags, CollisionMask, MoveResult, ObjectId};
use crate::config::LocomotionConfig;

/// Tunables the walking strategy reads every step.
#[derive(Debug, Clone)]
pub struct WalkingTunables {
    pub gravity: f32,
    pub terminal_velocity: f32,
    pub slope_limit: f32,
    pub push_out_speed: f32,
    pub air_time_threshold: f32,
    pub max_controlled_flight: f32,
    pub false_ground_threshold: f32,
    pub false_ground_min_normals: usize,
    pub step_height: f32,
    pub ride_sweep_margin: f32,
}

impl WalkingTunables {
    pub fn from_config(config: &LocomotionConfig) -> Self {
        Self {
            gravity: config.physics.gravity,
            terminal_velocity: config.physics.terminal_velocity,
            slope_limit: config.physics.walking_slope_limit,
            push_out_speed: config.physics.push_out_speed,
            air_time_threshold: config.walking.air_time_threshold,
            max_controlled_flight: config.walking.max_controlled_flight,
            false_ground_threshold: config.false_ground.gap_threshold_rad(),
            false_ground_min_normals: config.false_ground.min_normals,
            step_height: config.physics.step_height,
            ride_sweep_margin: config.walking.ride_sweep_margin,
        }
    }
}

/// A dynamic object the avatar shoved during its last move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushContact {
    pub object: Option<ObjectId>,
    pub normal: Vec3,
    /// Whether the avatar faces into the object
    pub facing: bool,
}

/// Gravity-bound ground locomotion: momentum in the air, sliding off steep
/// contacts, and ground / false-ground / head-hit classification.
#[derive(Debug, Clone)]
pub struct WalkingStrategy {
    pub(super) motion: AnimatedMotion,
    pub(super) tunables: WalkingTunables,
    pub(super) ground_hit: bool,
    pub(super) false_ground: bool,
    pub(super) head_hit: bool,
    time_in_air: f32,
    hit_ground_in_this_age: bool,
    impact_time: f32,
    impact_velocity: Vec3,
    clear_impact: bool,
    controlled_flight: u32,
    controlled_flight_time: f32,
    pub(super) pushing: Option<PushContact>,
    /// Velocity the last `apply` turned into displacement
    pub(super) applied_velocity: Vec3,
}

impl WalkingStrategy {
    pub fn new(tunables: WalkingTunables) -> Self {
        Self {
            motion: AnimatedMotion::default(),
            tunables,
            ground_hit: false,
            false_ground: false,
            head_hit: false,
            time_in_air: 0.0,
            hit_ground_in_this_age: false,
            impact_time: 0.0,
            impact_velocity: Vec3::zeros(),
            clear_impact: false,
            controlled_flight: 0,
            controlled_flight_time: 0.0,
            pushing: None,
            applied_velocity: Vec3::zeros(),
        }
    }

    pub fn from_config(config: &LocomotionConfig) -> Self {
        Self::new(WalkingTunables::from_config(config))
    }

    pub fn is_on_ground(&self) -> bool {
        self.time_in_air < self.tunables.air_time_threshold || self.false_ground
    }

    pub fn is_on_false_ground(&self) -> bool {
        self.false_ground && !self.ground_hit
    }

    pub fn ground_hit(&self) -> bool {
        self.ground_hit
    }

    pub fn head_hit(&self) -> bool {
        self.head_hit
    }

    pub fn time_in_air(&self) -> f32 {
        self.time_in_air
    }

    pub fn hit_ground_in_this_age(&self) -> bool {
        self.hit_ground_in_this_age
    }

    pub fn impact_time(&self) -> f32 {
        self.impact_time
    }

    /// Last airborne achieved velocity, avatar-local.
    pub fn impact_velocity(&self) -> Vec3 {
        self.impact_velocity
    }

    pub fn pushing(&self) -> Option<PushContact> {
        self.pushing
    }

    pub fn applied_velocity(&self) -> Vec3 {
        self.applied_velocity
    }

    pub fn is_controlled_flight(&self) -> bool {
        self.controlled_flight != 0
    }

    /// Nested enable/disable; flight stays on until every enable is matched.
    pub fn enable_controlled_flight(&mut self, status: bool) -> bool {
        if status {
            if self.controlled_flight == 0 {
                self.controlled_flight_time = 0.0;
            }
            self.controlled_flight += 1;
        } else {
            self.controlled_flight = self.controlled_flight.saturating_sub(1);
        }
        status
    }

    pub fn motion(&self) -> &AnimatedMotion {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut AnimatedMotion {
        &mut self.motion
    }

    /// Gravity increment for one step, never smaller than the ground probe.
    fn gravity_step(&self, dt: f32) -> f32 {
        (self.tunables.gravity * dt).min(-MIN_GROUND_PROBE / dt.max(f32::EPSILON))
    }

    /// Adds gravity unless the brain set vertical velocity explicitly.
    pub(super) fn add_gravity(&self, velocity: &mut Vec3, achieved: &Vec3, dt: f32) {
        if velocity.z.abs() < GRAVITY_APPLY_EPSILON {
            // On the ground, never carry upward speed so running uphill can't launch us
            let prev_z = if self.is_on_ground() {
                achieved.z.min(0.0)
            } else {
                achieved.z
            };
            velocity.z = prev_z + self.gravity_step(dt);
        }
    }

    pub(super) fn clear_move_flags(&mut self) {
        self.ground_hit = false;
        self.false_ground = false;
        self.head_hit = false;
        self.pushing = None;
    }

    pub fn apply(&mut self, state: &mut ControllerState, env: &mut StepEnv<'_>) {
        let dt = env.dt;
        let achieved = state.achieved_linear_velocity();
        let mut velocity = state.linear_velocity;
        let on_ground = self.is_on_ground();

        self.add_gravity(&mut velocity, &achieved, dt);

        // Airborne with no horizontal request keeps last frame's momentum
        if !on_ground && velocity.x == 0.0 && velocity.y == 0.0 {
            velocity.x = achieved.x;
            velocity.y = achieved.y;
        }

        if !on_ground || self.is_on_false_ground() {
            velocity = slide_off_normals(velocity, &state.contact_normals, self.tunables.push_out_speed);
        }

        if velocity.z < self.tunables.terminal_velocity {
            velocity.z = self.tunables.terminal_velocity;
        }
        self.applied_velocity = velocity;

        self.clear_move_flags();
        state.rotate_contact_normals();

        let mask = CollisionMask::avatar_movement(state.seeking);
        let result = env.move_proxy(velocity * dt, mask);
        self.process_move(state, &result);
    }

    /// Classifies the contacts of a finished move.
    pub(super) fn process_move(&mut self, state: &mut ControllerState, result: &MoveResult) {
        let forward = state.rotation * Vec3::y();
        for contact in &result.contacts {
            if contact.normal.dot(&up()) >= self.tunables.slope_limit {
                self.ground_hit = true;
            } else {
                state.add_sliding_normal(contact.normal);
            }
            if contact.dynamic && self.pushing.is_none() {
                self.pushing = Some(PushContact {
                    object: contact.object,
                    normal: contact.normal,
                    facing: forward.dot(&-contact.normal) > 0.7,
                });
            }
        }
        state.collision_flags = result.flags;

        if !self.ground_hit {
            self.false_ground = false_ground::is_false_ground(
                &state.contact_normals,
                &state.prev_contact_normals,
                self.tunables.false_ground_threshold,
                self.tunables.false_ground_min_normals,
            );
        }
        self.apply_collision_flags(result.flags);
        trace!(
            ground = self.ground_hit,
            false_ground = self.false_ground,
            head = self.head_hit,
            "walking move resolved"
        );
    }

    fn apply_collision_flags(&mut self, flags: CollisionFlags) {
        // Bottom contact that wasn't classified as ground: resting on something steep
        if !self.ground_hit && flags.bottom {
            self.false_ground = true;
        }
        if flags.top {
            self.head_hit = true;
        }
    }

    pub fn update(&mut self, state: &mut ControllerState, dt: f32) {
        if self.ground_hit || self.false_ground {
            self.time_in_air = 0.0;
        } else {
            self.time_in_air += dt;
            if self.head_hit {
                // Airborne head bump: drop sideways drift and any upward speed
                let velocity = state.linear_velocity;
                let mut achieved = state.achieved_linear_velocity();
                achieved.x = velocity.x;
                achieved.y = velocity.y;
                if achieved.z > 0.0 {
                    achieved.z = 0.0;
                }
                state.override_achieved_linear_velocity(achieved);
            }
        }

        state.linear_velocity = Vec3::zeros();

        if !self.hit_ground_in_this_age && self.is_on_ground() {
            self.hit_ground_in_this_age = true;
        }

        if self.clear_impact {
            self.impact_time = 0.0;
            self.impact_velocity = Vec3::zeros();
        }

        if self.is_on_ground() {
            self.clear_impact = true;
        } else {
            self.impact_time = self.time_in_air;
            self.impact_velocity = state.rotation.inverse() * state.achieved_linear_velocity();
            self.clear_impact = false;
        }
    }

    pub fn reset(&mut self, state: &mut ControllerState, new_age: bool) {
        self.impact_velocity = Vec3::zeros();
        self.impact_time = 0.0;
        if new_age {
            self.time_in_air = 0.0;
            self.clear_impact = true;
            self.hit_ground_in_this_age = false;
            state.clear_contact_normals();
        }
    }

    /// Expires controlled flight, then applies root motion.
    pub fn recalc_velocity(
        &mut self,
        state: &mut ControllerState,
        motion: crate::avatar::animation::RootMotion,
        dt: f32,
    ) {
        if self.controlled_flight != 0 {
            if self.is_on_ground() {
                self.controlled_flight_time = self.time_in_air;
            }
            if self.controlled_flight_time > self.tunables.max_controlled_flight {
                self.enable_controlled_flight(false);
            }
        }
        self.motion.recalc_velocity(state, motion, dt);
    }
}

/// Projects `velocity` off every normal it pushes into, then adds a push-out
/// along the summed normals.
///
/// Some backends report wall contacts without the floor beneath; the push-out
/// keeps an avatar from sticking in that case.
pub fn slide_off_normals(mut velocity: Vec3, normals: &[Vec3], push_out_speed: f32) -> Vec3 {
    if normals.is_empty() {
        return velocity;
    }
    let mut offset = Vec3::zeros();
    for normal in normals {
        offset += normal;
        let speed = velocity.norm();
        let vel_norm = if speed > 0.0 { velocity / speed } else { velocity };

        if vel_norm.dot(normal) < 0.0 {
            let mut proj = vel_norm.cross(normal).cross(normal);
            if vel_norm.dot(&proj) < 0.0 {
                proj = -proj;
            }
            velocity = proj * speed;
        }
    }
    if offset.norm_squared() > 0.0 {
        velocity += offset.normalize() * push_out_speed;
    }
    velocity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::math::{Point, Quat, Transform};
    use crate::avatar::physics::{CollisionBackend, PlaneWorld};

    const AVATAR: ObjectId = ObjectId(1);
    const DT: f32 = 1.0 / 60.0;

    fn setup(feet: Point) -> (WalkingStrategy, ControllerState, PlaneWorld) {
        let config = LocomotionConfig::default();
        let mut world = PlaneWorld::with_ground(0.0);
        world.add_avatar_proxy(AVATAR, feet, config.physics.capsule_radius, config.physics.capsule_height);
        (
            WalkingStrategy::from_config(&config),
            ControllerState::new(feet, Quat::identity()),
            world,
        )
    }

    fn step(walk: &mut WalkingStrategy, state: &mut ControllerState, world: &mut PlaneWorld) {
        let mut env = StepEnv::new(world, AVATAR, Transform::identity(), DT, 1.1, 6.0);
        walk.apply(state, &mut env);
        let feet = world.proxy_position(AVATAR).unwrap();
        state.commit_position(feet, DT);
        walk.update(state, DT);
    }

    #[test]
    fn test_airborne_keeps_horizontal_momentum() {
        let (mut walk, mut state, mut world) = setup(Point::new(0.0, 0.0, 20.0));
        // Long enough in the air to count as airborne
        walk.time_in_air = 1.0;
        state.override_achieved_linear_velocity(Vec3::new(2.0, 0.0, -1.0));
        state.linear_velocity = Vec3::zeros();

        let mut env = StepEnv::new(&mut world, AVATAR, Transform::identity(), DT, 1.1, 6.0);
        walk.apply(&mut state, &mut env);
        let v = walk.applied_velocity();
        assert_eq!((v.x, v.y), (2.0, 0.0), "horizontal momentum should carry over");
        assert!(v.z < -1.0, "gravity adds to previous fall speed, got {}", v.z);
    }

    #[test]
    fn test_grounded_input_is_not_replaced_by_momentum() {
        let (mut walk, mut state, mut world) = setup(Point::new(0.0, 0.0, 0.0));
        state.override_achieved_linear_velocity(Vec3::new(2.0, 0.0, 0.0));
        let mut env = StepEnv::new(&mut world, AVATAR, Transform::identity(), DT, 1.1, 6.0);
        walk.apply(&mut state, &mut env);
        assert_eq!(walk.applied_velocity().x, 0.0);
        assert!(walk.ground_hit(), "standing still still touches the floor");
    }

    #[test]
    fn test_falling_reaches_ground_and_resets_air_time() {
        let (mut walk, mut state, mut world) = setup(Point::new(0.0, 0.0, 3.0));
        let mut landed = false;
        for _ in 0..120 {
            step(&mut walk, &mut state, &mut world);
            if walk.ground_hit() {
                landed = true;
                break;
            }
        }
        assert!(landed, "avatar should land within two seconds");
        assert_eq!(walk.time_in_air(), 0.0);
        assert!(walk.hit_ground_in_this_age());
        assert!(state.position.z.abs() < 1e-3);
    }

    #[test]
    fn test_vertical_velocity_never_below_terminal() {
        let (mut walk, mut state, mut world) = setup(Point::new(0.0, 0.0, 500.0));
        for _ in 0..300 {
            step(&mut walk, &mut state, &mut world);
            let achieved = state.achieved_linear_velocity();
            // Tolerance covers f32 rounding of positions far from the origin
            assert!(
                achieved.z >= walk.tunables.terminal_velocity - 0.01,
                "achieved z {} fell below terminal",
                achieved.z
            );
        }
        assert!(
            (state.achieved_linear_velocity().z - walk.tunables.terminal_velocity).abs() < 0.01,
            "five seconds of falling should reach terminal velocity"
        );
    }

    #[test]
    fn test_head_hit_damps_achieved_velocity() {
        let (mut walk, mut state, mut world) = setup(Point::new(0.0, 0.0, 5.0));
        world.add_ceiling(11.05);
        walk.time_in_air = 1.0;
        state.override_achieved_linear_velocity(Vec3::new(3.0, 0.0, 10.0));
        state.linear_velocity = Vec3::new(0.0, 0.0, 10.0);

        let mut env = StepEnv::new(&mut world, AVATAR, Transform::identity(), DT, 1.1, 6.0);
        walk.apply(&mut state, &mut env);
        assert!(walk.head_hit(), "rising into the ceiling should flag a head hit");
        let feet = world.proxy_position(AVATAR).unwrap();
        state.commit_position(feet, DT);
        walk.update(&mut state, DT);

        let achieved = state.achieved_linear_velocity();
        assert_eq!(achieved.x, 0.0, "sideways drift replaced by requested velocity");
        assert!(achieved.z <= 0.0, "upward speed is dropped after a head hit");
    }

    #[test]
    fn test_slide_removes_into_wall_component() {
        let wall = Vec3::new(-1.0, 0.0, 0.0);
        let v = slide_off_normals(Vec3::new(3.0, 4.0, 0.0), &[wall], 0.0);
        assert!(v.x.abs() < 1e-5, "no motion left into the wall, got {:?}", v);
        assert!((v.y - 4.0).abs() < 1e-5);

        let pushed = slide_off_normals(Vec3::new(3.0, 4.0, 0.0), &[wall], 5.0);
        assert!((pushed.x + 5.0).abs() < 1e-5, "push-out moves away from the wall");
    }

    #[test]
    fn test_slide_leaves_separating_velocity_alone() {
        let v = slide_off_normals(Vec3::new(-2.0, 0.0, 0.0), &[Vec3::new(-1.0, 0.0, 0.0)], 0.0);
        assert_eq!(v, Vec3::new(-2.0, 0.0, 0.0));
    }

    #[test]
    fn test_wedged_between_steep_walls_counts_as_ground() {
        let (mut walk, mut state, mut world) = setup(Point::new(0.0, 0.0, 5.0));
        // A V-shaped trough of steep slopes; the floor far below never touches
        world.add_wall(Point::new(-0.9, 0.0, 5.0), Vec3::new(0.94, 0.0, 0.34), CollisionMask::STATIC);
        world.add_wall(Point::new(0.9, 0.0, 5.0), Vec3::new(-0.94, 0.0, 0.34), CollisionMask::STATIC);
        walk.time_in_air = 1.0;

        let mut saw_false_ground = false;
        let mut max_air = 0.0_f32;
        for i in 0..120 {
            step(&mut walk, &mut state, &mut world);
            assert!(!walk.ground_hit(), "slopes this steep are not ground");
            saw_false_ground |= walk.is_on_false_ground();
            if i > 30 {
                max_air = max_air.max(walk.time_in_air());
            }
        }
        assert!(saw_false_ground, "wedged avatar should be false-grounded");
        assert!(max_air < 0.5, "wedged avatar kept falling for {max_air}s");
    }

    #[test]
    fn test_controlled_flight_nests() {
        let (mut walk, _, _) = setup(Point::origin());
        walk.enable_controlled_flight(true);
        walk.enable_controlled_flight(true);
        walk.enable_controlled_flight(false);
        assert!(walk.is_controlled_flight());
        walk.enable_controlled_flight(false);
        walk.enable_controlled_flight(false);
        assert!(!walk.is_controlled_flight());
    }

    #[test]
    fn test_reset_new_age_clears_history() {
        let (mut walk, mut state, mut world) = setup(Point::new(0.0, 0.0, 0.0));
        step(&mut walk, &mut state, &mut world);
        assert!(walk.hit_ground_in_this_age());
        state.add_sliding_normal(Vec3::new(1.0, 0.0, 0.0));
        walk.reset(&mut state, true);
        assert!(!walk.hit_ground_in_this_age());
        assert!(state.contact_normals.is_empty());
    }
}
